//! Sharded, concurrent processing of an event stream
//!
//! The input lines are split into contiguous shards, one worker thread per
//! shard. Each worker routes its rows to the category sinks under its shard
//! id (the shard's first line), so that concatenating the shard buffers in
//! ascending id order restores the input order.

use crate::error::{Error, Result};
use crate::melt::extractor::{lookup_str, RecordFlattener};
use crate::melt::plan::SchemaRegistry;
use crate::melt::types::SmeltConfig;
use crate::sink::{CategorySink, SinkRegistry};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// A contiguous range of input lines handled by one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardRange {
    pub index: usize,
    pub start: usize,
    pub end: usize,
}

impl ShardRange {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Split `[0, total)` into `shards` contiguous ranges
///
/// Every range but the last holds `total / shards` lines; the last one also
/// takes the remainder.
pub fn shard_ranges(total: usize, shards: usize) -> Vec<ShardRange> {
    if shards == 0 {
        return Vec::new();
    }

    let per_shard = total / shards;
    (0..shards)
        .map(|index| {
            let start = index * per_shard;
            let end = if index == shards - 1 {
                total
            } else {
                start + per_shard
            };
            ShardRange { index, start, end }
        })
        .collect()
}

/// Counts reported by a processing run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    /// Input lines handled
    pub lines: usize,
    /// Rows flattened into sinks
    pub rows: u64,
    /// Records skipped for an unknown or missing category
    pub skipped: u64,
    /// Rows per category
    pub categories: BTreeMap<String, u64>,
}

impl ProcessSummary {
    fn absorb(&mut self, other: ProcessSummary) {
        self.rows += other.rows;
        self.skipped += other.skipped;
        for (category, rows) in other.categories {
            *self.categories.entry(category).or_insert(0) += rows;
        }
    }
}

/// Runs the sharded flatten phase and owns the category sinks
pub struct Processor {
    config: Arc<SmeltConfig>,
    schemas: SchemaRegistry,
    sinks: SinkRegistry,
    processed: AtomicU64,
    lines_seen: AtomicUsize,
}

impl Processor {
    pub fn new(config: SmeltConfig, schemas: SchemaRegistry) -> Result<Self> {
        config.validate()?;
        if schemas.is_empty() {
            return Err(Error::invalid_config("no event categories registered"));
        }

        let config = Arc::new(config);
        Ok(Processor {
            sinks: SinkRegistry::new(Arc::clone(&config)),
            config,
            schemas,
            processed: AtomicU64::new(0),
            lines_seen: AtomicUsize::new(0),
        })
    }

    /// Rows flattened so far; approximate while workers are running
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Read a newline-delimited JSON file and process every line
    pub fn process_file<P: AsRef<Path>>(&self, path: P) -> Result<ProcessSummary> {
        let path = path.as_ref();
        let input_err = |source| Error::Input {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(input_err)?;
        let lines = BufReader::new(file)
            .lines()
            .collect::<std::io::Result<Vec<String>>>()
            .map_err(input_err)?;

        info!(path = %path.display(), lines = lines.len(), "read input");
        self.process_lines(&lines)
    }

    /// Flatten `lines` across the configured number of shards
    ///
    /// Blocks until every worker is done. When a worker fails, the workers of
    /// higher shards stop at their next line while lower shards run on, so the
    /// error returned is always the one of the lowest failing shard.
    pub fn process_lines<S: AsRef<str> + Sync>(&self, lines: &[S]) -> Result<ProcessSummary> {
        // shard ids keep increasing across calls so later batches sort after earlier ones
        let base = self.lines_seen.fetch_add(lines.len(), Ordering::SeqCst);
        let ranges = shard_ranges(lines.len(), self.config.concurrency);
        // index of the lowest shard that failed so far
        let failed = AtomicUsize::new(usize::MAX);
        let progress = self.progress_bar();

        let results: Vec<Result<ProcessSummary>> = thread::scope(|scope| {
            let handles: Vec<_> = ranges
                .iter()
                .map(|&range| {
                    let failed = &failed;
                    scope.spawn(move || {
                        let result = self.process_shard(lines, base, range, failed);
                        if result.is_err() {
                            failed.fetch_min(range.index, Ordering::SeqCst);
                        }
                        result
                    })
                })
                .collect();

            while !handles.iter().all(|h| h.is_finished()) {
                progress.set_position(self.processed());
                thread::sleep(PROGRESS_INTERVAL);
            }

            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        });

        progress.set_position(self.processed());
        progress.finish();

        let mut summary = ProcessSummary {
            lines: lines.len(),
            ..ProcessSummary::default()
        };
        for result in results {
            summary.absorb(result?);
        }

        info!(
            lines = summary.lines,
            rows = summary.rows,
            skipped = summary.skipped,
            "processing finished"
        );
        Ok(summary)
    }

    fn process_shard<'a, S: AsRef<str>>(
        &'a self,
        lines: &[S],
        base: usize,
        range: ShardRange,
        failed: &AtomicUsize,
    ) -> Result<ProcessSummary> {
        let shard = base + range.start;
        debug!(shard = range.index, start = shard, lines = range.len(), "worker started");

        // worker-local cache so the registry lock is only taken once per category
        let mut local: HashMap<&'a str, (Arc<CategorySink>, RecordFlattener<'a>)> =
            HashMap::new();
        let mut unknown: HashSet<String> = HashSet::new();
        let mut summary = ProcessSummary::default();

        for index in range.start..range.end {
            if failed.load(Ordering::SeqCst) < range.index {
                debug!(shard = range.index, "lower shard failed, worker aborted");
                break;
            }

            let line = lines[index].as_ref().trim();
            if line.is_empty() {
                continue;
            }

            let line_number = base + index + 1;
            let record = parse_record(line, line_number)?;

            let Some(category) = lookup_str(&record, &self.config.category_field) else {
                debug!(line = line_number, "record has no category, skipping");
                summary.skipped += 1;
                continue;
            };

            let Some(schema) = self.schemas.get(category) else {
                if unknown.insert(category.to_string()) {
                    warn!(category, line = line_number, "unknown event type, skipping");
                }
                summary.skipped += 1;
                continue;
            };

            let (sink, flattener) = local.entry(schema.category()).or_insert_with(|| {
                (self.sinks.get_or_create(schema), RecordFlattener::new(schema))
            });

            let row = flattener.flatten(&record);
            sink.add_item(shard, row)?;

            summary.rows += 1;
            *summary.categories.entry(schema.category().to_string()).or_insert(0) += 1;
            self.processed.fetch_add(1, Ordering::Relaxed);
        }

        debug!(shard = range.index, rows = summary.rows, "worker finished");
        Ok(summary)
    }

    /// Write one artifact per category into the output directory
    pub fn finish(&self) -> Result<Vec<PathBuf>> {
        info!(dir = %self.config.output_dir.display(), "writing artifacts");
        let written = self.sinks.finish_all(&self.config.output_dir)?;
        info!(artifacts = written.len(), "output finished");
        Ok(written)
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }

        let bar = ProgressBar::new_spinner();
        if let Ok(style) =
            ProgressStyle::with_template("{spinner} {pos} rows processed [{elapsed_precise}]")
        {
            bar.set_style(style);
        }
        bar.enable_steady_tick(PROGRESS_INTERVAL);
        bar
    }
}

/// Parse one input line, which must hold a JSON object
fn parse_record(line: &str, line_number: usize) -> Result<Map<String, Value>> {
    let mut bytes = line.as_bytes().to_vec();
    let value: Value =
        simd_json::serde::from_slice(&mut bytes).map_err(|e| Error::MalformedRecord {
            line: line_number,
            message: e.to_string(),
        })?;

    match value {
        Value::Object(record) => Ok(record),
        other => Err(Error::MalformedRecord {
            line: line_number,
            message: format!("expected an object, found {}", json_kind(&other)),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
