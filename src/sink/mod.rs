//! Per-category sinks
//!
//! A sink receives the flattened rows of one category from every shard,
//! keeps them in per-shard disk buffers and, once all workers are done,
//! merges the buffers in shard order into the final artifact.
//!
//! ## Output modes
//!
//! - **csv**: header line plus RFC 4180 escaped rows
//! - **sql**: one CREATE (or ALTER) statement plus one INSERT per row, with
//!   column types inferred from the data

pub mod csv;
pub mod spool;
pub mod sql;

pub use self::csv::{escape_csv, CsvSink};
pub use self::spool::{RowSpool, ShardSpools, SpoolReader};
pub use self::sql::{SqlDialect, SqlGenerator, SqlSink};

use crate::error::Result;
use crate::melt::plan::ColumnSchema;
use crate::melt::types::{OutputMode, Row, SmeltConfig};
use chrono::{DateTime, Local, Utc};
use spool::lock;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Accumulates one category's rows and renders its artifact
#[derive(Debug)]
pub enum CategorySink {
    Csv(CsvSink),
    Sql(SqlSink),
}

impl CategorySink {
    /// Create an empty sink for the configured output mode
    pub fn new(config: Arc<SmeltConfig>) -> Self {
        match config.output {
            OutputMode::Csv => CategorySink::Csv(CsvSink::new(config)),
            OutputMode::Sql => CategorySink::Sql(SqlSink::new(config)),
        }
    }

    /// Fix the column order; must happen before the first `add_item`
    pub fn set_header(&mut self, category: &str, header: &[String]) {
        match self {
            CategorySink::Csv(sink) => sink.set_header(category, header),
            CategorySink::Sql(sink) => sink.set_header(category, header),
        }
    }

    /// Buffer a row under the shard it was read by
    pub fn add_item(&self, shard: usize, row: Row) -> Result<()> {
        match self {
            CategorySink::Csv(sink) => sink.add_item(shard, row),
            CategorySink::Sql(sink) => sink.add_item(shard, row),
        }
    }

    /// Merge the shard buffers into `<stem>.<ext>` and return its path
    pub fn finish(&self, stem: &Path) -> Result<PathBuf> {
        match self {
            CategorySink::Csv(sink) => sink.finish(stem),
            CategorySink::Sql(sink) => sink.finish(stem),
        }
    }

    pub fn rows(&self) -> usize {
        match self {
            CategorySink::Csv(sink) => sink.rows(),
            CategorySink::Sql(sink) => sink.rows(),
        }
    }
}

/// Sinks by category, created on first use
#[derive(Debug)]
pub struct SinkRegistry {
    config: Arc<SmeltConfig>,
    sinks: Mutex<HashMap<String, Arc<CategorySink>>>,
}

impl SinkRegistry {
    pub fn new(config: Arc<SmeltConfig>) -> Self {
        SinkRegistry {
            config,
            sinks: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the sink for a schema's category, creating it and setting its
    /// header under the registry lock if this is the first row
    pub fn get_or_create(&self, schema: &ColumnSchema) -> Arc<CategorySink> {
        let mut sinks = lock(&self.sinks);
        if let Some(sink) = sinks.get(schema.category()) {
            return Arc::clone(sink);
        }

        let mut sink = CategorySink::new(Arc::clone(&self.config));
        sink.set_header(schema.category(), &schema.header());
        debug!(category = schema.category(), "created {} sink", self.config.output);

        let sink = Arc::new(sink);
        sinks.insert(schema.category().to_string(), Arc::clone(&sink));
        sink
    }

    /// Finish every sink into `output_dir`, in category order
    ///
    /// Stops at the first failure; artifacts finished before it stay valid.
    pub fn finish_all(&self, output_dir: &Path) -> Result<Vec<PathBuf>> {
        let sinks: Vec<(String, Arc<CategorySink>)> = {
            let guard = lock(&self.sinks);
            let mut sinks: Vec<_> = guard
                .iter()
                .map(|(name, sink)| (name.clone(), Arc::clone(sink)))
                .collect();
            sinks.sort_by(|a, b| a.0.cmp(&b.0));
            sinks
        };

        let mut written = Vec::with_capacity(sinks.len());
        for (category, sink) in sinks {
            let rows = sink.rows();
            let path = sink.finish(&output_dir.join(&category))?;
            info!(category = %category, rows, path = %path.display(), "wrote artifact");
            written.push(path);
        }
        Ok(written)
    }
}

/// `<stem>.<ext>` without touching dots already in the stem
pub(crate) fn artifact_path(stem: &Path, extension: &str) -> PathBuf {
    let mut name = OsString::from(stem.as_os_str());
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

fn parse_epoch(value: &str) -> Option<DateTime<Utc>> {
    let seconds = value.trim().parse::<f64>().ok().filter(|s| s.is_finite())?;
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

/// Epoch seconds as `YYYY-MM-DD HH:MM:SS` in UTC
pub fn epoch_to_utc(value: &str) -> Option<String> {
    parse_epoch(value).map(|dt| dt.format(TIMESTAMP_FORMAT).to_string())
}

/// Epoch seconds as `YYYY-MM-DD HH:MM:SS` in the local time zone
pub fn epoch_to_local(value: &str) -> Option<String> {
    parse_epoch(value).map(|dt| dt.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string())
}
