//! SQL statement generation per DBMS

use crate::error::{Error, Result};
use crate::sink::sql::column::{ColumnProfile, ColumnType};
use crate::sink::{epoch_to_local, epoch_to_utc};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Target database for SQL artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqlDialect {
    /// TIMESTAMP WITH TIME ZONE, UUID
    #[default]
    Postgres,
    /// DATETIMEOFFSET, uniqueidentifier
    SqlServer,
    /// Local-time TIMESTAMP, VARCHAR(36) for UUIDs
    MySql,
}

impl FromStr for SqlDialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(SqlDialect::Postgres),
            "sqlserver" | "mssql" => Ok(SqlDialect::SqlServer),
            "mysql" => Ok(SqlDialect::MySql),
            _ => Err(Error::UnsupportedDialect(s.to_string())),
        }
    }
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SqlDialect::Postgres => "postgres",
            SqlDialect::SqlServer => "sqlserver",
            SqlDialect::MySql => "mysql",
        })
    }
}

/// Renders CREATE/ALTER/INSERT statements for one dialect
#[derive(Debug, Clone, Copy)]
pub struct SqlGenerator {
    dialect: SqlDialect,
    text_as_varchar: bool,
}

impl SqlGenerator {
    pub fn new(dialect: SqlDialect, text_as_varchar: bool) -> Self {
        SqlGenerator {
            dialect,
            text_as_varchar,
        }
    }

    pub fn create_statement(&self, table: &str, columns: &[ColumnProfile]) -> String {
        let fields: Vec<String> = columns
            .iter()
            .map(|c| format!("{} {}", c.name, self.type_name(c)))
            .collect();
        format!("CREATE TABLE {} ({});", table, fields.join(", "))
    }

    /// One ALTER statement per column, newline separated
    pub fn alter_statement(&self, table: &str, columns: &[ColumnProfile]) -> String {
        columns
            .iter()
            .map(|c| {
                let ty = self.type_name(c);
                match self.dialect {
                    SqlDialect::Postgres => {
                        format!("ALTER TABLE {} ALTER COLUMN {} TYPE {};", table, c.name, ty)
                    }
                    SqlDialect::SqlServer => {
                        format!("ALTER TABLE {} ALTER COLUMN {} {};", table, c.name, ty)
                    }
                    SqlDialect::MySql => {
                        format!("ALTER TABLE {} MODIFY COLUMN {} {};", table, c.name, ty)
                    }
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn insert_statement(
        &self,
        table: &str,
        row: &[String],
        columns: &[ColumnProfile],
    ) -> String {
        let values: Vec<String> = columns
            .iter()
            .zip(row)
            .map(|(column, value)| self.render_value(column, value))
            .collect();
        format!("INSERT INTO {} VALUES({});", table, values.join(", "))
    }

    pub fn type_name(&self, column: &ColumnProfile) -> String {
        match column.effective_type() {
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::Float => "FLOAT".to_string(),
            ColumnType::Unknown | ColumnType::Text => {
                if self.text_as_varchar {
                    format!("VARCHAR({})", column.max_length.max(1))
                } else {
                    "TEXT".to_string()
                }
            }
            ColumnType::Timestamp => match self.dialect {
                SqlDialect::Postgres => "TIMESTAMP WITH TIME ZONE",
                SqlDialect::SqlServer => "DATETIMEOFFSET",
                SqlDialect::MySql => "TIMESTAMP",
            }
            .to_string(),
            ColumnType::UniqueIdentifier => match self.dialect {
                SqlDialect::Postgres => "UUID",
                SqlDialect::SqlServer => "uniqueidentifier",
                SqlDialect::MySql => "VARCHAR(36)",
            }
            .to_string(),
        }
    }

    /// Literal for one value of a column
    ///
    /// Empty strings: Postgres keeps '' for text but NULL for UUIDs, SQL
    /// Server always quotes, MySQL always emits NULL.
    pub fn render_value(&self, column: &ColumnProfile, value: &str) -> String {
        match column.effective_type() {
            ColumnType::Integer | ColumnType::Float => {
                if value.is_empty() {
                    "0".to_string()
                } else {
                    value.to_string()
                }
            }
            ColumnType::Unknown | ColumnType::Text => {
                if value.is_empty() && self.dialect == SqlDialect::MySql {
                    "NULL".to_string()
                } else {
                    quote(value)
                }
            }
            ColumnType::UniqueIdentifier => {
                if value.is_empty() && self.dialect != SqlDialect::SqlServer {
                    "NULL".to_string()
                } else {
                    quote(value)
                }
            }
            ColumnType::Timestamp => {
                if value.is_empty() {
                    return "NULL".to_string();
                }
                let rendered = match self.dialect {
                    SqlDialect::Postgres | SqlDialect::SqlServer => {
                        epoch_to_utc(value).map(|ts| format!("{}+00:00", ts))
                    }
                    SqlDialect::MySql => epoch_to_local(value),
                };
                match rendered {
                    Some(ts) => quote(&ts),
                    None => {
                        warn!(
                            column = %column.name,
                            value,
                            "value is not an epoch timestamp, writing NULL"
                        );
                        "NULL".to_string()
                    }
                }
            }
        }
    }
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn column(name: &str, column_type: ColumnType, max_length: usize) -> ColumnProfile {
        ColumnProfile {
            name: name.to_string(),
            is_timestamp: column_type == ColumnType::Timestamp,
            column_type,
            max_length,
        }
    }

    fn columns() -> Vec<ColumnProfile> {
        vec![
            column("data_session_num", ColumnType::Integer, 2),
            column("data_value", ColumnType::Float, 4),
            column("data_event_id", ColumnType::Text, 11),
            column("arrival_ts", ColumnType::Timestamp, 10),
            column("data_user_id", ColumnType::UniqueIdentifier, 36),
        ]
    }

    #[test]
    fn test_dialect_parsing() {
        assert_eq!("Postgres".parse::<SqlDialect>().unwrap(), SqlDialect::Postgres);
        assert_eq!("sqlserver".parse::<SqlDialect>().unwrap(), SqlDialect::SqlServer);
        assert_eq!("MYSQL".parse::<SqlDialect>().unwrap(), SqlDialect::MySql);
        assert!(matches!(
            "oracle".parse::<SqlDialect>(),
            Err(Error::UnsupportedDialect(_))
        ));
    }

    #[test]
    fn test_create_statements() {
        let pg = SqlGenerator::new(SqlDialect::Postgres, true);
        assert_eq!(
            pg.create_statement("ga_design", &columns()),
            "CREATE TABLE ga_design (data_session_num INTEGER, data_value FLOAT, \
             data_event_id VARCHAR(11), arrival_ts TIMESTAMP WITH TIME ZONE, data_user_id UUID);"
        );

        let ms = SqlGenerator::new(SqlDialect::SqlServer, false);
        let create = ms.create_statement("design", &columns());
        assert!(create.contains("data_event_id TEXT"));
        assert!(create.contains("arrival_ts DATETIMEOFFSET"));
        assert!(create.contains("data_user_id uniqueidentifier"));

        let my = SqlGenerator::new(SqlDialect::MySql, true);
        let create = my.create_statement("design", &columns());
        assert!(create.contains("arrival_ts TIMESTAMP,"));
        assert!(create.contains("data_user_id VARCHAR(36)"));
    }

    #[test]
    fn test_alter_statements() {
        let cols = &columns()[..1];
        assert_eq!(
            SqlGenerator::new(SqlDialect::Postgres, true).alter_statement("t", cols),
            "ALTER TABLE t ALTER COLUMN data_session_num TYPE INTEGER;"
        );
        assert_eq!(
            SqlGenerator::new(SqlDialect::SqlServer, true).alter_statement("t", cols),
            "ALTER TABLE t ALTER COLUMN data_session_num INTEGER;"
        );
        assert_eq!(
            SqlGenerator::new(SqlDialect::MySql, true).alter_statement("t", &columns()[..2]),
            "ALTER TABLE t MODIFY COLUMN data_session_num INTEGER;\n\
             ALTER TABLE t MODIFY COLUMN data_value FLOAT;"
        );
    }

    #[test]
    fn test_insert_statement() {
        let pg = SqlGenerator::new(SqlDialect::Postgres, true);
        let row: Vec<String> = vec![
            "".into(),
            "2.5".into(),
            "it's".into(),
            "1609459200".into(),
            "0f8fad5b-d9cb-469f-a165-70867728950e".into(),
        ];
        assert_eq!(
            pg.insert_statement("design", &row, &columns()),
            "INSERT INTO design VALUES(0, 2.5, 'it''s', '2021-01-01 00:00:00+00:00', \
             '0f8fad5b-d9cb-469f-a165-70867728950e');"
        );
    }

    #[test]
    fn test_timestamp_rendering_per_dialect() {
        let ts = column("arrival_ts", ColumnType::Timestamp, 10);

        let pg = SqlGenerator::new(SqlDialect::Postgres, true).render_value(&ts, "1609459200");
        assert!(pg.ends_with("+00:00'"));
        assert_eq!(pg, "'2021-01-01 00:00:00+00:00'");

        let ms = SqlGenerator::new(SqlDialect::SqlServer, true).render_value(&ts, "1609459200");
        assert_eq!(ms, "'2021-01-01 00:00:00+00:00'");

        let my = SqlGenerator::new(SqlDialect::MySql, true).render_value(&ts, "1609459200");
        assert!(!my.contains('+'));
        assert_eq!(my, format!("'{}'", epoch_to_local("1609459200").unwrap()));

        for dialect in [SqlDialect::Postgres, SqlDialect::SqlServer, SqlDialect::MySql] {
            let generator = SqlGenerator::new(dialect, true);
            assert_eq!(generator.render_value(&ts, ""), "NULL");
            assert_eq!(generator.render_value(&ts, "soon"), "NULL");
        }
    }

    #[test]
    fn test_empty_value_rendering_per_dialect() {
        let text = column("label", ColumnType::Text, 3);
        let uuid = column("id", ColumnType::UniqueIdentifier, 36);

        let pg = SqlGenerator::new(SqlDialect::Postgres, true);
        assert_eq!(pg.render_value(&text, ""), "''");
        assert_eq!(pg.render_value(&uuid, ""), "NULL");

        let ms = SqlGenerator::new(SqlDialect::SqlServer, true);
        assert_eq!(ms.render_value(&text, ""), "''");
        assert_eq!(ms.render_value(&uuid, ""), "''");

        let my = SqlGenerator::new(SqlDialect::MySql, true);
        assert_eq!(my.render_value(&text, ""), "NULL");
        assert_eq!(my.render_value(&uuid, ""), "NULL");
    }

    #[test]
    fn test_unobserved_column_renders_as_text() {
        let unknown = column("never_seen", ColumnType::Unknown, 0);
        let generator = SqlGenerator::new(SqlDialect::Postgres, true);
        assert_eq!(generator.type_name(&unknown), "VARCHAR(1)");
        assert_eq!(generator.render_value(&unknown, ""), "''");
    }
}
