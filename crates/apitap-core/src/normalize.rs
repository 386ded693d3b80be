//! Shape dispatch for ingested JSON.
//!
//! Two rule sets exist:
//!
//! - single-record ingestion ([`Ingestible::into_record`]) always produces
//!   exactly one row, wrapping non-object values under [`VALUE_COLUMN`]
//! - bulk loads ([`bulk_rows`]) look for a list of objects, descending into
//!   the first list-valued field of a wrapper object such as
//!   `{"data": [...]}`, and ignore everything that is not an object

use serde_json::{Map, Value};

/// Column used for values that are not JSON objects.
pub const VALUE_COLUMN: &str = "$value";

/// The closed set of top-level JSON shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Ingestible {
    /// A JSON object; each key becomes a column.
    Object(Map<String, Value>),
    /// A top-level JSON array.
    Array(Vec<Value>),
    /// A string, number, boolean, or null.
    Scalar(Value),
}

impl From<Value> for Ingestible {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Ingestible::Object(map),
            Value::Array(items) => Ingestible::Array(items),
            scalar => Ingestible::Scalar(scalar),
        }
    }
}

impl Ingestible {
    /// Turns the value into exactly one row record.
    pub fn into_record(self) -> Map<String, Value> {
        match self {
            Ingestible::Object(map) => map,
            Ingestible::Array(items) => wrap(Value::Array(items)),
            Ingestible::Scalar(value) => wrap(value),
        }
    }

    /// Returns true for the object shape.
    pub fn is_object(&self) -> bool {
        matches!(self, Ingestible::Object(_))
    }
}

fn wrap(value: Value) -> Map<String, Value> {
    tracing::debug!("wrapping non-object value under {}", VALUE_COLUMN);
    let mut record = Map::new();
    record.insert(VALUE_COLUMN.to_string(), value);
    record
}

/// Extracts the row records of a bulk value.
///
/// - an array yields one record per object element; other elements are
///   skipped
/// - an object yields the records of its first array-valued field, or
///   itself as a single record when it has no array field
/// - a scalar yields nothing
pub fn bulk_rows(value: Value) -> Vec<Map<String, Value>> {
    match Ingestible::from(value) {
        Ingestible::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect(),
        Ingestible::Object(map) => match map.values().position(Value::is_array) {
            Some(index) => match map.into_iter().nth(index) {
                Some((_, nested)) => bulk_rows(nested),
                None => Vec::new(),
            },
            None => vec![map],
        },
        Ingestible::Scalar(_) => Vec::new(),
    }
}
