//! Column type inference for SQL output
//!
//! Types are inferred from the string values of each column as rows arrive
//! and only ever move up the lattice: Integer and Float merge into Float,
//! any other disagreement ends in Text.

use once_cell::sync::Lazy;
use regex::Regex;

const HYPHENATED_UUID: &str = "[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}";

// Hyphenated, braced or bare 32-digit forms
static UUID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)^(?:{uuid}|\{{{uuid}\}}|[0-9a-f]{{32}})$",
        uuid = HYPHENATED_UUID
    ))
    .unwrap()
});

/// Inferred SQL type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// No non-empty value seen yet
    Unknown,
    Integer,
    Float,
    Timestamp,
    UniqueIdentifier,
    Text,
}

impl ColumnType {
    fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }
}

/// Infer the type of a single value
///
/// Timestamp columns are recognised by name alone, whatever they contain.
pub fn determine_type(is_timestamp: bool, value: &str) -> ColumnType {
    if is_timestamp {
        ColumnType::Timestamp
    } else if UUID_REGEX.is_match(value) {
        ColumnType::UniqueIdentifier
    } else if value.parse::<i32>().is_ok() {
        ColumnType::Integer
    } else if value.parse::<f64>().is_ok_and(f64::is_finite) {
        ColumnType::Float
    } else {
        ColumnType::Text
    }
}

/// Running type and width of one output column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnProfile {
    /// Sanitized SQL identifier
    pub name: String,
    pub is_timestamp: bool,
    pub column_type: ColumnType,
    /// Longest value observed, in characters
    pub max_length: usize,
}

impl ColumnProfile {
    pub fn new(name: impl Into<String>, is_timestamp: bool) -> Self {
        ColumnProfile {
            name: name.into(),
            is_timestamp,
            column_type: ColumnType::Unknown,
            max_length: 0,
        }
    }

    /// Fold one observed value into the profile
    ///
    /// An empty value means the path was absent and never changes the type.
    /// A genuinely empty string in the input is indistinguishable from that.
    pub fn observe(&mut self, value: &str) {
        self.max_length = self.max_length.max(value.chars().count());
        if value.is_empty() {
            return;
        }

        self.column_type = match self.column_type {
            ColumnType::Unknown => determine_type(self.is_timestamp, value),
            ColumnType::Text => ColumnType::Text,
            current => {
                let observed = determine_type(self.is_timestamp, value);
                if observed == current {
                    current
                } else if current.is_numeric() && observed.is_numeric() {
                    ColumnType::Float
                } else {
                    ColumnType::Text
                }
            }
        };
    }

    /// The type used for rendering; columns never observed become Text
    pub fn effective_type(&self) -> ColumnType {
        match self.column_type {
            ColumnType::Unknown => ColumnType::Text,
            other => other,
        }
    }
}
