//! SQL script output with inferred column types

pub mod column;
pub mod dialect;

pub use column::{determine_type, ColumnProfile, ColumnType};
pub use dialect::{SqlDialect, SqlGenerator};

use crate::error::{Error, Result};
use crate::melt::types::{Row, SmeltConfig};
use crate::sink::artifact_path;
use crate::sink::spool::{lock, ShardSpools};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

static UNDERSCORE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new("_+").unwrap());

/// Turn a column path into a SQL identifier: `data.*_app_version` -> `data_app_version`
pub fn sanitize_identifier(path: &str) -> String {
    let replaced = path.replace(['.', '*'], "_");
    UNDERSCORE_RUN.replace_all(&replaced, "_").into_owned()
}

/// Writes one category as a SQL script
///
/// Rows are buffered as JSON arrays so that the schema statement can be
/// rendered from the final column profiles before any INSERT.
#[derive(Debug)]
pub struct SqlSink {
    config: Arc<SmeltConfig>,
    generator: SqlGenerator,
    table: String,
    columns: Mutex<Vec<ColumnProfile>>,
    spools: ShardSpools,
}

impl SqlSink {
    pub fn new(config: Arc<SmeltConfig>) -> Self {
        let generator = SqlGenerator::new(config.sql_dialect, config.sql_text_as_varchar);
        let spools = ShardSpools::new("", config.spool_dir.clone());
        SqlSink {
            config,
            generator,
            table: String::new(),
            columns: Mutex::new(Vec::new()),
            spools,
        }
    }

    pub fn set_header(&mut self, category: &str, header: &[String]) {
        self.spools.set_category(category);
        self.table = format!("{}{}", self.config.sql_table_prefix, category);
        let profiles = header
            .iter()
            .map(|name| {
                ColumnProfile::new(
                    sanitize_identifier(name),
                    self.config.is_timestamp_column(name),
                )
            })
            .collect();
        *lock(&self.columns) = profiles;
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn add_item(&self, shard: usize, row: Row) -> Result<()> {
        let line = serde_json::to_string(&row).map_err(|e| self.corrupt_row(shard, e))?;
        self.spools.append(shard, &line)?;

        let mut columns = lock(&self.columns);
        for (profile, value) in columns.iter_mut().zip(&row) {
            profile.observe(value);
        }
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.spools.rows()
    }

    /// Snapshot of the current column profiles
    pub fn columns(&self) -> Vec<ColumnProfile> {
        lock(&self.columns).clone()
    }

    /// Write `<stem>.sql`: schema statement, then one INSERT per row
    pub fn finish(&self, stem: &Path) -> Result<PathBuf> {
        let path = artifact_path(stem, "sql");
        let artifact_err = |source| Error::Artifact {
            path: path.clone(),
            source,
        };

        let columns = self.columns();
        let readers = self.spools.drain()?;
        let file = File::create(&path).map_err(artifact_err)?;
        let mut out = BufWriter::new(file);

        let schema = if self.config.sql_generate_alter {
            self.generator.alter_statement(&self.table, &columns)
        } else {
            self.generator.create_statement(&self.table, &columns)
        };
        writeln!(out, "{}", schema).map_err(artifact_err)?;

        for reader in readers {
            let shard = reader.shard();
            debug!(table = %self.table, shard, rows = reader.rows(), "rendering shard buffer");
            for line in reader.lines() {
                let row: Vec<String> =
                    serde_json::from_str(&line?).map_err(|e| self.corrupt_row(shard, e))?;
                let insert = self.generator.insert_statement(&self.table, &row, &columns);
                writeln!(out, "{}", insert).map_err(artifact_err)?;
            }
        }
        out.flush().map_err(artifact_err)?;

        Ok(path)
    }

    fn corrupt_row(&self, shard: usize, source: serde_json::Error) -> Error {
        Error::CorruptRow {
            category: self.spools.category().to_string(),
            shard,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sink(config: SmeltConfig, header: &[&str]) -> SqlSink {
        let mut sink = SqlSink::new(Arc::new(config));
        let header: Vec<String> = header.iter().map(|h| h.to_string()).collect();
        sink.set_header("design", &header);
        sink
    }

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("data.*_app_version"), "data_app_version");
        assert_eq!(sanitize_identifier("user_meta.cohort_week"), "user_meta_cohort_week");
        assert_eq!(sanitize_identifier("a..__b"), "a_b");
        assert_eq!(sanitize_identifier("game_id"), "game_id");
    }

    #[test]
    fn test_set_header_names_table_and_columns() {
        let config = SmeltConfig {
            sql_table_prefix: "ga_".into(),
            ..SmeltConfig::default()
        };
        let sink = sink(config, &["data.event_id", "user_meta.cohort_week"]);
        assert_eq!(sink.table(), "ga_design");

        let columns = sink.columns();
        assert_eq!(columns[0].name, "data_event_id");
        assert!(!columns[0].is_timestamp);
        assert_eq!(columns[1].name, "user_meta_cohort_week");
        assert!(columns[1].is_timestamp);
    }

    #[test]
    fn test_corrupt_row_names_category_not_table() {
        let config = SmeltConfig {
            sql_table_prefix: "ga_".into(),
            ..SmeltConfig::default()
        };
        let sink = sink(config, &["data.event_id"]);
        let source = serde_json::from_str::<Vec<String>>("[\"a\"").unwrap_err();

        match sink.corrupt_row(7, source) {
            Error::CorruptRow { category, shard, .. } => {
                assert_eq!(category, "design");
                assert_eq!(shard, 7);
            }
            other => panic!("expected a corrupt row error, got {:?}", other),
        }
    }

    #[test]
    fn test_profiles_shared_across_shards() {
        let sink = sink(SmeltConfig::default(), &["data.value", "data.event_id"]);
        sink.add_item(0, vec!["1".into(), "a".into()]).unwrap();
        sink.add_item(5, vec!["2.5".into(), "".into()]).unwrap();

        let columns = sink.columns();
        assert_eq!(columns[0].column_type, ColumnType::Float);
        assert_eq!(columns[1].column_type, ColumnType::Text);
        assert_eq!(columns[1].max_length, 1);
    }

    #[test]
    fn test_finish_writes_create_then_inserts_in_shard_order() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink(SmeltConfig::default(), &["data.session_num", "data.event_id"]);

        sink.add_item(3, vec!["3".into(), "c".into()]).unwrap();
        sink.add_item(0, vec!["1".into(), "a".into()]).unwrap();
        sink.add_item(0, vec!["".into(), "it's".into()]).unwrap();

        let path = sink.finish(&dir.path().join("design")).unwrap();
        assert_eq!(path.file_name().unwrap(), "design.sql");

        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(
            content,
            "CREATE TABLE design (data_session_num INTEGER, data_event_id VARCHAR(4));\n\
             INSERT INTO design VALUES(1, 'a');\n\
             INSERT INTO design VALUES(0, 'it''s');\n\
             INSERT INTO design VALUES(3, 'c');\n"
        );
    }

    #[test]
    fn test_finish_with_alter() {
        let dir = tempfile::tempdir().unwrap();
        let config = SmeltConfig {
            sql_generate_alter: true,
            sql_dialect: SqlDialect::MySql,
            ..SmeltConfig::default()
        };
        let sink = sink(config, &["data.length"]);
        sink.add_item(0, vec!["42".into()]).unwrap();

        let path = sink.finish(&dir.path().join("design")).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(
            content,
            "ALTER TABLE design MODIFY COLUMN data_length INTEGER;\n\
             INSERT INTO design VALUES(42);\n"
        );
    }
}
