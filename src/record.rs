//! The decoded unit of telemetry data.
//!
//! A [`Record`] is an ordered JSON object. Values may be scalars, nested objects,
//! or arrays of either, exactly as they appeared in the source file (CSV cells are
//! kept as strings). Keys starting with [`METADATA_PREFIX`] are annotations added by
//! this crate and are never treated as measurements.

use serde_json::{Map, Value};
use std::path::Path;

/// An ordered mapping from field names to JSON values.
///
/// Insertion order is preserved, so "first matching key" rules are stable across runs.
pub type Record = Map<String, Value>;

/// Prefix marking a key as crate-owned metadata rather than payload.
pub const METADATA_PREFIX: char = '_';

/// Key holding the path of the file a record was decoded from.
pub const SOURCE_FILE_KEY: &str = "_source_file";

/// Key holding the device key a record was loaded under (set by the full loader).
pub const DEVICE_KEY_KEY: &str = "_device_key";

/// Whether `key` is a metadata key.
#[inline]
#[must_use]
pub fn is_metadata_key(key: &str) -> bool {
    key.starts_with(METADATA_PREFIX)
}

/// Stamp the origin file on a record.
pub fn annotate_source(record: &mut Record, path: &Path) {
    record.insert(
        SOURCE_FILE_KEY.to_string(),
        Value::String(path.display().to_string()),
    );
}

/// The origin file recorded on `record`, if any.
#[must_use]
pub fn source_file(record: &Record) -> Option<&str> {
    record.get(SOURCE_FILE_KEY).and_then(Value::as_str)
}

/// Whether `record` carries at least one non-metadata field.
#[must_use]
pub fn has_payload(record: &Record) -> bool {
    record.keys().any(|k| !is_metadata_key(k))
}

/// Render a scalar as an identifier-like string.
///
/// Strings are trimmed and must be non-empty; numbers and booleans are stringified.
/// Nulls, arrays, and objects yield `None`.
#[must_use]
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn metadata_keys_are_prefixed() {
        assert!(is_metadata_key(SOURCE_FILE_KEY));
        assert!(is_metadata_key(DEVICE_KEY_KEY));
        assert!(!is_metadata_key("rssi"));
    }

    #[test]
    fn annotate_and_read_back() {
        let mut r = Record::new();
        r.insert("t".into(), json!(1));
        annotate_source(&mut r, Path::new("a/b.json"));
        assert_eq!(source_file(&r), Some("a/b.json"));
        assert!(has_payload(&r));
    }

    #[test]
    fn metadata_only_record_has_no_payload() {
        let mut r = Record::new();
        annotate_source(&mut r, Path::new("x.csv"));
        assert!(!has_payload(&r));
    }

    #[test]
    fn scalar_rendering() {
        assert_eq!(scalar_to_string(&json!("  ab ")), Some("ab".into()));
        assert_eq!(scalar_to_string(&json!("   ")), None);
        assert_eq!(scalar_to_string(&json!(42)), Some("42".into()));
        assert_eq!(scalar_to_string(&json!(null)), None);
        assert_eq!(scalar_to_string(&json!({"a": 1})), None);
    }
}
