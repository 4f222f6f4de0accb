//! Error types for smelter
//!
//! Record-level problems (unknown categories, missing paths, unmatched
//! wildcards) never surface here: they flatten to empty values or are
//! skipped and logged. Everything in this enum aborts the run.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for smelter
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Structural errors
    // ========================================================================
    #[error("Line {line} is not a JSON object: {message}")]
    MalformedRecord { line: usize, message: String },

    #[error("Unsupported output mode '{0}' (expected csv or sql)")]
    UnsupportedOutputMode(String),

    #[error("Unsupported SQL dialect '{0}' (expected postgres, sqlserver or mysql)")]
    UnsupportedDialect(String),

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Invalid column path '{path}': {message}")]
    InvalidColumnPath { path: String, message: String },

    #[error("Failed to load schema file '{path}': {message}")]
    SchemaFile { path: PathBuf, message: String },

    // ========================================================================
    // Resource errors
    // ========================================================================
    #[error("Failed to read input '{path}': {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Shard buffer failure for category '{category}', shard {shard}: {source}")]
    Spool {
        category: String,
        shard: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write artifact '{path}': {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt buffered row for category '{category}', shard {shard}: {source}")]
    CorruptRow {
        category: String,
        shard: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type alias using the smelter Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Error::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn invalid_path(path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidColumnPath {
            path: path.into(),
            message: message.into(),
        }
    }
}
