//! # Smelter - event stream to table converter
//!
//! Turns a large newline-delimited stream of categorized JSON events into
//! one table per event category, written as CSV or as a SQL script with an
//! inferred schema.
//!
//! ## Modules
//!
//! - **melt**: column schemas, record flattening and the sharded processor
//! - **sink**: per-category shard buffers, CSV output, SQL type inference
//!   and dialect generation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use smelter::{OutputMode, SchemaRegistry, SmeltConfig};
//!
//! # fn main() -> smelter::Result<()> {
//! let config = SmeltConfig {
//!     output: OutputMode::Sql,
//!     output_dir: "tables".into(),
//!     ..SmeltConfig::default()
//! };
//!
//! let (summary, artifacts) =
//!     smelter::smelt_file("events.jsonl", config, SchemaRegistry::game_analytics()?)?;
//!
//! // one `<category>.sql` per category seen in the input
//! println!("{} rows into {} tables", summary.rows, artifacts.len());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

pub mod error;
pub mod melt;
pub mod sink;

// Re-export commonly used types for convenience
pub use error::{Error, Result};
pub use melt::{
    ColumnSchema, ColumnSpec, OutputMode, ProcessSummary, Processor, RecordFlattener, Row,
    SchemaRegistry, SmeltConfig,
};
pub use sink::{CategorySink, SqlDialect};

/// Main entry point: process one input file and write every category's artifact
///
/// The output directory must already exist.
pub fn smelt_file<P: AsRef<Path>>(
    input: P,
    config: SmeltConfig,
    schemas: SchemaRegistry,
) -> Result<(ProcessSummary, Vec<PathBuf>)> {
    let processor = Processor::new(config, schemas)?;
    let summary = processor.process_file(input)?;
    let artifacts = processor.finish()?;
    Ok((summary, artifacts))
}
