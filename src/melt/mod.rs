//! Event melting - flatten categorized JSON events into fixed-width rows
//!
//! Each event category owns a column schema of dotted paths. Records are
//! flattened against their category's schema and routed to that category's
//! sink by a pool of shard workers.
//!
//! ## Wildcard columns
//!
//! A path segment may contain `*`, e.g. `data.*_app_version`, to pick up a
//! key whose name varies between producers. Workers remember the last key
//! each wildcard column matched and re-check it on every record.

pub mod types;
pub mod plan;
pub mod extractor;
pub mod scheduler;

pub use types::{OutputMode, Row, SmeltConfig};
pub use plan::{ColumnSchema, ColumnSpec, KeyPattern, SchemaRegistry};
pub use extractor::{flatten, RecordFlattener, WildcardMemo};
pub use scheduler::{shard_ranges, ProcessSummary, Processor, ShardRange};
