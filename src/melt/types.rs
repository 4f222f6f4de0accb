use crate::error::{Error, Result};
use crate::sink::sql::SqlDialect;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// One flattened record: one string per schema column, "" when absent
pub type Row = Vec<String>;

/// Serialization used for the per-category artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Csv,
    Sql,
}

impl OutputMode {
    /// File extension of artifacts written in this mode
    pub fn extension(self) -> &'static str {
        match self {
            OutputMode::Csv => "csv",
            OutputMode::Sql => "sql",
        }
    }
}

impl FromStr for OutputMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(OutputMode::Csv),
            "sql" => Ok(OutputMode::Sql),
            _ => Err(Error::UnsupportedOutputMode(s.to_string())),
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Configuration for a smelting run
#[derive(Debug, Clone)]
pub struct SmeltConfig {
    /// Artifact serialization
    pub output: OutputMode,

    /// Directory receiving `<category>.<ext>` artifacts
    pub output_dir: PathBuf,

    /// Convert timestamp columns to local time in CSV artifacts
    pub csv_convert_timestamps: bool,

    /// Prefix prepended to the category when naming SQL tables
    pub sql_table_prefix: String,

    /// Size text columns as VARCHAR(n) instead of TEXT
    pub sql_text_as_varchar: bool,

    /// Emit ALTER statements instead of CREATE TABLE
    pub sql_generate_alter: bool,

    /// Target DBMS for SQL artifacts
    pub sql_dialect: SqlDialect,

    /// Number of shards (and worker threads)
    pub concurrency: usize,

    /// Dotted path of the field holding each record's category
    pub category_field: String,

    /// Column names ending with this suffix hold epoch-second timestamps
    pub timestamp_suffix: String,

    /// Column names starting with this prefix hold epoch-second timestamps
    pub cohort_prefix: String,

    /// Directory for shard buffers (system temp dir when unset)
    pub spool_dir: Option<PathBuf>,

    /// Draw a progress spinner while processing
    pub show_progress: bool,
}

impl Default for SmeltConfig {
    fn default() -> Self {
        SmeltConfig {
            output: OutputMode::Csv,
            output_dir: PathBuf::from("output"),
            csv_convert_timestamps: true,
            sql_table_prefix: String::new(),
            sql_text_as_varchar: true,
            sql_generate_alter: false,
            sql_dialect: SqlDialect::Postgres,
            concurrency: 4,
            category_field: String::from("data.category"),
            timestamp_suffix: String::from("_ts"),
            cohort_prefix: String::from("user_meta.cohort"),
            spool_dir: None,
            show_progress: false,
        }
    }
}

impl SmeltConfig {
    /// Check the settings that cannot be expressed through the types alone
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::invalid_config("concurrency must be at least 1"));
        }
        if self.category_field.is_empty() {
            return Err(Error::invalid_config("category field must not be empty"));
        }
        Ok(())
    }

    /// Whether a column (by its schema path) carries epoch-second timestamps
    pub fn is_timestamp_column(&self, name: &str) -> bool {
        (!self.timestamp_suffix.is_empty() && name.ends_with(&self.timestamp_suffix))
            || (!self.cohort_prefix.is_empty() && name.starts_with(&self.cohort_prefix))
    }
}
