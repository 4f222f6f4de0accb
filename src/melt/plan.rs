//! Column schemas: which paths of an event become which output columns
//!
//! Each category registers an ordered list of dotted paths once. The order
//! is the output column order and never changes afterwards.

use crate::error::{Error, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Columns present on every analytics event except `sdk_error`
const SHARED_COLUMNS: &[&str] = &[
    "data.session_id",
    "data.session_num",
    "data.user_id",
    "data.platform",
    "data.os_version",
    "data.sdk_version",
    "data.device",
    "data.manufacturer",
    "data.*_app_version",
    "data.connection_type",
    "country_code",
    "arrival_ts",
    "game_id",
    "user_meta.install_ts",
    "user_meta.cohort_week",
];

const SDK_ERROR_COLUMNS: &[&str] = &[
    "data.os_version",
    "data.manufacturer",
    "data.device",
    "data.platform",
    "data.type",
    "country_code",
    "arrival_ts",
    "game_id",
];

/// Matcher for a single path segment
#[derive(Debug, Clone)]
pub enum KeyPattern {
    /// Exact key name
    Literal(String),
    /// Glob where `*` matches zero or more characters, anchored at both ends
    Glob { pattern: String, regex: Regex },
}

impl KeyPattern {
    fn parse(path: &str, segment: &str) -> Result<Self> {
        if !segment.contains('*') {
            return Ok(KeyPattern::Literal(segment.to_string()));
        }

        let body = segment
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("(?s)^{}$", body))
            .map_err(|e| Error::invalid_path(path, e.to_string()))?;

        Ok(KeyPattern::Glob {
            pattern: segment.to_string(),
            regex,
        })
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, KeyPattern::Glob { .. })
    }

    /// Whether an object key satisfies this segment
    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyPattern::Literal(name) => name == key,
            KeyPattern::Glob { regex, .. } => regex.is_match(key),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            KeyPattern::Literal(name) => name,
            KeyPattern::Glob { pattern, .. } => pattern,
        }
    }
}

/// One output column: the dotted path it is read from
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    path: String,
    segments: Vec<KeyPattern>,
}

impl ColumnSpec {
    /// Parse a dotted path such as `data.*_app_version`
    pub fn parse(path: &str) -> Result<Self> {
        if path.is_empty() {
            return Err(Error::invalid_path(path, "path is empty"));
        }

        let segments = path
            .split('.')
            .map(|segment| {
                if segment.is_empty() {
                    Err(Error::invalid_path(path, "path contains an empty segment"))
                } else {
                    KeyPattern::parse(path, segment)
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ColumnSpec {
            path: path.to_string(),
            segments,
        })
    }

    /// The path as registered; doubles as the column name
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Object lookups performed before reaching the final key
    pub fn parents(&self) -> &[KeyPattern] {
        &self.segments[..self.segments.len() - 1]
    }

    /// The final segment naming the value's key
    pub fn leaf(&self) -> &KeyPattern {
        // parse() guarantees at least one segment
        &self.segments[self.segments.len() - 1]
    }

}

/// The ordered, immutable column layout of one category
#[derive(Debug, Clone)]
pub struct ColumnSchema {
    category: String,
    columns: Vec<ColumnSpec>,
}

impl ColumnSchema {
    pub fn new<I, S>(category: impl Into<String>, paths: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ColumnSchema {
            category: category.into(),
            columns: Vec::new(),
        }
        .with_columns(paths)
    }

    /// Append columns after the ones already registered
    pub fn with_columns<I, S>(mut self, paths: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for path in paths {
            self.columns.push(ColumnSpec::parse(path.as_ref())?);
        }
        Ok(self)
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column names in output order
    pub fn header(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.path.clone()).collect()
    }
}

/// On-disk schema file: a JSON object mapping each category to its column paths
#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct SchemaDocument {
    categories: BTreeMap<String, Vec<String>>,
}

/// All registered categories and their schemas
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, ColumnSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema, replacing any previous one for the same category
    pub fn register(&mut self, schema: ColumnSchema) {
        self.schemas.insert(schema.category.clone(), schema);
    }

    pub fn get(&self, category: &str) -> Option<&ColumnSchema> {
        self.schemas.get(category)
    }

    /// Registered category names, sorted
    pub fn categories(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// The built-in catalogue of game analytics event categories
    pub fn game_analytics() -> Result<Self> {
        let mut registry = SchemaRegistry::new();

        let shared = |category: &str, extra: &[&str]| -> Result<ColumnSchema> {
            ColumnSchema::new(category, SHARED_COLUMNS)?.with_columns(extra)
        };

        registry.register(shared("design", &["data.event_id", "data.value"])?);
        registry.register(shared("error", &["data.severity", "data.message"])?);
        registry.register(shared("progression", &["data.event_id"])?);
        registry.register(shared("user", &["data.install"])?);
        registry.register(shared("session_end", &["data.length"])?);
        registry.register(ColumnSchema::new("sdk_error", SDK_ERROR_COLUMNS)?);

        Ok(registry)
    }

    /// Load schemas from a JSON object mapping category to column paths
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::SchemaFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Self::from_json_str(&text).map_err(|e| match e {
            Error::SchemaFile { message, .. } => Error::SchemaFile {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let parsed: SchemaDocument = serde_json::from_str(text).map_err(|e| Error::SchemaFile {
            path: "<inline>".into(),
            message: e.to_string(),
        })?;

        let mut registry = SchemaRegistry::new();
        for (category, paths) in parsed.categories {
            registry.register(ColumnSchema::new(category, paths)?);
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_path_segments() {
        let spec = ColumnSpec::parse("user_meta.install_ts").unwrap();
        assert_eq!(spec.parents().len(), 1);
        assert_eq!(spec.parents()[0].as_str(), "user_meta");
        assert_eq!(spec.leaf().as_str(), "install_ts");
        assert!(!spec.leaf().is_wildcard());
    }

    #[test]
    fn test_glob_segment_is_anchored() {
        let spec = ColumnSpec::parse("data.*_app_version").unwrap();
        let leaf = spec.leaf();
        assert!(leaf.is_wildcard());
        assert!(leaf.matches("ios_app_version"));
        assert!(leaf.matches("_app_version"));
        assert!(!leaf.matches("ios_app_version_code"));
        assert!(!leaf.matches("app_version"));
    }

    #[test]
    fn test_glob_escapes_regex_metacharacters() {
        let pattern = KeyPattern::parse("x", "v1.*+").unwrap();
        assert!(pattern.matches("v1.abc+"));
        assert!(!pattern.matches("v1xabc+"));
    }

    #[test]
    fn test_multiple_wildcards_in_segment() {
        let pattern = KeyPattern::parse("x", "a*b*c").unwrap();
        assert!(pattern.matches("abc"));
        assert!(pattern.matches("a-b-c"));
        assert!(!pattern.matches("acb"));
    }

    #[test]
    fn test_invalid_paths_rejected() {
        assert!(ColumnSpec::parse("").is_err());
        assert!(ColumnSpec::parse("data..value").is_err());
        assert!(ColumnSpec::parse("data.").is_err());
    }

    #[test]
    fn test_header_preserves_registration_order() {
        let schema = ColumnSchema::new("design", ["b", "a"])
            .unwrap()
            .with_columns(["c"])
            .unwrap();
        assert_eq!(schema.header(), vec!["b", "a", "c"]);
        assert_eq!(schema.len(), 3);
    }

    #[test]
    fn test_game_analytics_catalogue() {
        let registry = SchemaRegistry::game_analytics().unwrap();
        assert_eq!(
            registry.categories(),
            vec!["design", "error", "progression", "sdk_error", "session_end", "user"]
        );

        let design = registry.get("design").unwrap();
        assert_eq!(design.len(), SHARED_COLUMNS.len() + 2);
        assert_eq!(design.header().last().unwrap(), "data.value");

        let sdk_error = registry.get("sdk_error").unwrap();
        assert_eq!(sdk_error.header()[0], "data.os_version");
        assert_eq!(sdk_error.len(), 8);
    }

    #[test]
    fn test_registry_from_json() {
        let registry = SchemaRegistry::from_json_str(
            r#"{"purchase": ["data.amount", "data.currency"], "login": ["user"]}"#,
        )
        .unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.get("purchase").unwrap().header(),
            vec!["data.amount", "data.currency"]
        );
    }

    #[test]
    fn test_registry_from_bad_json() {
        let err = SchemaRegistry::from_json_str(r#"{"purchase": "data.amount"}"#).unwrap_err();
        assert!(matches!(err, Error::SchemaFile { .. }));
    }
}
