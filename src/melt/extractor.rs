use crate::melt::plan::{ColumnSchema, KeyPattern};
use crate::melt::types::Row;
use serde_json::{Map, Value};

/// Last key each wildcard column resolved to, owned by a single worker
///
/// Sibling records of a category usually carry the same dynamic key, so the
/// previous match is tried before scanning the object's keys again. A stale
/// entry is simply replaced; it never decides a value on its own.
#[derive(Debug, Default, Clone)]
pub struct WildcardMemo {
    keys: Vec<Option<String>>,
}

impl WildcardMemo {
    pub fn new(columns: usize) -> Self {
        WildcardMemo {
            keys: vec![None; columns],
        }
    }

    pub fn get(&self, column: usize) -> Option<&str> {
        self.keys.get(column).and_then(|k| k.as_deref())
    }

    fn set(&mut self, column: usize, key: &str) {
        if column >= self.keys.len() {
            self.keys.resize(column + 1, None);
        }
        self.keys[column] = Some(key.to_string());
    }
}

/// Flattens records of one category into rows, keeping its own wildcard memo
pub struct RecordFlattener<'a> {
    schema: &'a ColumnSchema,
    memo: WildcardMemo,
}

impl<'a> RecordFlattener<'a> {
    pub fn new(schema: &'a ColumnSchema) -> Self {
        RecordFlattener {
            schema,
            memo: WildcardMemo::new(schema.len()),
        }
    }

    /// Flatten one record into a row of `schema.len()` values
    pub fn flatten(&mut self, record: &Map<String, Value>) -> Row {
        flatten(self.schema, record, &mut self.memo)
    }
}

/// Flatten a parsed record according to a column schema
///
/// Missing intermediates, non-object intermediates and unmatched wildcards
/// only blank their own column.
pub fn flatten(schema: &ColumnSchema, record: &Map<String, Value>, memo: &mut WildcardMemo) -> Row {
    schema
        .columns()
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let mut current = record;
            for segment in column.parents() {
                match descend(current, segment) {
                    Some(next) => current = next,
                    None => return String::new(),
                }
            }

            match column.leaf() {
                KeyPattern::Literal(key) => {
                    current.get(key).map(value_to_string).unwrap_or_default()
                }
                leaf @ KeyPattern::Glob { .. } => {
                    let remembered = memo.get(i).is_some_and(|k| current.contains_key(k));
                    if !remembered {
                        match current.keys().find(|k| leaf.matches(k)) {
                            Some(key) => memo.set(i, key),
                            None => return String::new(),
                        }
                    }
                    memo.get(i)
                        .and_then(|key| current.get(key))
                        .map(value_to_string)
                        .unwrap_or_default()
                }
            }
        })
        .collect()
}

/// Step into a nested object; `None` when the key is absent or not an object
fn descend<'v>(
    object: &'v Map<String, Value>,
    segment: &KeyPattern,
) -> Option<&'v Map<String, Value>> {
    let value = match segment {
        KeyPattern::Literal(key) => object.get(key),
        KeyPattern::Glob { .. } => object
            .iter()
            .find(|(key, _)| segment.matches(key))
            .map(|(_, value)| value),
    };
    value.and_then(Value::as_object)
}

/// String form of a scalar JSON value
///
/// Nested objects and arrays are not representable as a column and yield "".
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    }
}

/// Read a dotted literal path (e.g. the category field) as a string
pub fn lookup_str<'v>(record: &'v Map<String, Value>, path: &str) -> Option<&'v str> {
    let mut parts = path.split('.').peekable();
    let mut current = record;
    while let Some(part) = parts.next() {
        let value = current.get(part)?;
        if parts.peek().is_none() {
            return value.as_str();
        }
        current = value.as_object()?;
    }
    None
}
