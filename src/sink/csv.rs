use crate::error::{Error, Result};
use crate::melt::types::{Row, SmeltConfig};
use crate::sink::spool::ShardSpools;
use crate::sink::{artifact_path, epoch_to_local};
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Writes one category as a CSV file with a header line
#[derive(Debug)]
pub struct CsvSink {
    config: Arc<SmeltConfig>,
    header: Vec<String>,
    timestamp_columns: Vec<usize>,
    spools: ShardSpools,
}

impl CsvSink {
    pub fn new(config: Arc<SmeltConfig>) -> Self {
        let spools = ShardSpools::new("", config.spool_dir.clone());
        CsvSink {
            config,
            header: Vec::new(),
            timestamp_columns: Vec::new(),
            spools,
        }
    }

    pub fn set_header(&mut self, category: &str, header: &[String]) {
        self.spools.set_category(category);
        self.header = header.to_vec();
        self.timestamp_columns = header
            .iter()
            .enumerate()
            .filter(|(_, name)| self.config.is_timestamp_column(name))
            .map(|(i, _)| i)
            .collect();
    }

    pub fn add_item(&self, shard: usize, mut row: Row) -> Result<()> {
        if self.config.csv_convert_timestamps {
            for &i in &self.timestamp_columns {
                if let Some(converted) = row.get(i).and_then(|v| epoch_to_local(v)) {
                    row[i] = converted;
                }
            }
        }

        self.spools.append(shard, &csv_line(&row))
    }

    pub fn rows(&self) -> usize {
        self.spools.rows()
    }

    /// Write `<stem>.csv`: header, then every shard buffer in shard order
    pub fn finish(&self, stem: &Path) -> Result<PathBuf> {
        let path = artifact_path(stem, "csv");
        let artifact_err = |source| Error::Artifact {
            path: path.clone(),
            source,
        };

        let readers = self.spools.drain()?;
        let file = File::create(&path).map_err(artifact_err)?;
        let mut out = BufWriter::new(file);

        writeln!(out, "{}", csv_line(&self.header)).map_err(artifact_err)?;
        for mut reader in readers {
            debug!(shard = reader.shard(), rows = reader.rows(), "merging shard buffer");
            reader.copy_to(&mut out, &path)?;
        }
        out.flush().map_err(artifact_err)?;

        Ok(path)
    }
}

/// Join values into one CSV record (without the line terminator)
pub fn csv_line<S: AsRef<str>>(values: &[S]) -> String {
    values
        .iter()
        .map(|v| escape_csv(v.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Quote a value if it contains a comma, quote, CR or LF; double inner quotes
pub fn escape_csv(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\r', '\n']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sink(convert: bool) -> CsvSink {
        let config = SmeltConfig {
            csv_convert_timestamps: convert,
            ..SmeltConfig::default()
        };
        let mut sink = CsvSink::new(Arc::new(config));
        sink.set_header(
            "design",
            &["data.event_id".to_string(), "arrival_ts".to_string()],
        );
        sink
    }

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("He said, \"hi\""), "\"He said, \"\"hi\"\"\"");
        assert_eq!(escape_csv("line\nbreak"), "\"line\nbreak\"");
        assert_eq!(escape_csv(""), "");
    }

    #[test]
    fn test_escaped_value_reparses() {
        let original = "He said, \"hi\"";
        let line = csv_line(&[original, "x"]);

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(line.as_bytes());
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(&record[0], original);
        assert_eq!(&record[1], "x");
    }

    #[test]
    fn test_finish_merges_shards_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink(false);

        sink.add_item(4, vec!["c".into(), "3".into()]).unwrap();
        sink.add_item(0, vec!["a".into(), "1".into()]).unwrap();
        sink.add_item(0, vec!["b".into(), "2".into()]).unwrap();
        assert_eq!(sink.rows(), 3);

        let path = sink.finish(&dir.path().join("design")).unwrap();
        assert_eq!(path.file_name().unwrap(), "design.csv");

        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content, "data.event_id,arrival_ts\na,1\nb,2\nc,3\n");
    }

    #[test]
    fn test_timestamp_conversion_toggle() {
        let dir = tempfile::tempdir().unwrap();

        let converting = sink(true);
        converting
            .add_item(0, vec!["a".into(), "1609459200".into()])
            .unwrap();
        converting.add_item(0, vec!["b".into(), "".into()]).unwrap();
        let path = converting.finish(&dir.path().join("on")).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[1], format!("a,{}", epoch_to_local("1609459200").unwrap()));
        assert_eq!(lines[2], "b,");

        let raw = sink(false);
        raw.add_item(0, vec!["a".into(), "1609459200".into()]).unwrap();
        let path = raw.finish(&dir.path().join("off")).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("a,1609459200"));
    }
}
