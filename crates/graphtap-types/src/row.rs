//! Normalized output rows.

use serde_json::Value;

/// A fully normalized record: a flat field-to-value mapping that always
/// carries the stream's primary key and, when declared, its replication key.
/// Field insertion order is preserved through to the sink.
pub type Row = serde_json::Map<String, Value>;

/// Read a row field as a string slice.
#[must_use]
pub fn field_str<'a>(row: &'a Row, key: &str) -> Option<&'a str> {
    row.get(key).and_then(Value::as_str)
}
