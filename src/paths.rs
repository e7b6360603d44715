//! Nested Path Resolver.
//!
//! Telemetry payloads nest freely: `{"object": {"temperature": 21}}`, or radio
//! metadata as a list of per-gateway reports, `{"rxInfo": [{"rssi": -80}, ...]}`.
//! A measurement path addresses a value inside such a record by joining keys with
//! [`PATH_SEPARATOR`]: `object.temperature`, `rxInfo.rssi`.
//!
//! - [`enumerate_paths`] lists every addressable path of a record. Elements of a
//!   list of objects share their parent's path, so all gateway reports together
//!   contribute `rxInfo.rssi` once. A list holding scalars is a leaf.
//! - [`get_value`] resolves a path, descending into the first list element that
//!   has the next segment, with fallbacks for flattened (`rxInfo_rssi`) and
//!   differently-cased top-level keys.

use crate::record::{is_metadata_key, Record};
use serde_json::Value;
use std::collections::BTreeSet;

/// Separator between path segments.
pub const PATH_SEPARATOR: char = '.';

/// Every measurement path in `record`, metadata keys excluded.
#[must_use]
pub fn enumerate_paths(record: &Record) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    collect_object(record, None, &mut out);
    out
}

fn collect_object(obj: &Record, prefix: Option<&str>, out: &mut BTreeSet<String>) {
    for (k, v) in obj {
        if is_metadata_key(k) {
            continue;
        }
        let path = match prefix {
            Some(p) => format!("{p}{PATH_SEPARATOR}{k}"),
            None => k.clone(),
        };
        collect_value(v, path, out);
    }
}

fn collect_value(v: &Value, path: String, out: &mut BTreeSet<String>) {
    match v {
        Value::Object(obj) => collect_object(obj, Some(&path), out),
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::Object(obj) => collect_object(obj, Some(&path), out),
                    // scalar (or nested list) elements make the list itself a leaf
                    _ => {
                        out.insert(path.clone());
                    }
                }
            }
        }
        _ => {
            out.insert(path);
        }
    }
}

/// Resolve `path` in `record`.
///
/// Resolution order:
/// 1. an exact top-level key equal to `path`;
/// 2. a walk over the segments of `path`, descending objects by key and, at a
///    list, into the first object element holding the next segment;
/// 3. the top-level key with separators replaced by `_`;
/// 4. a case-insensitive top-level key match.
///
/// `None` means absent; a JSON `null` at the end of a walk also counts as absent.
#[must_use]
pub fn get_value<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    present(record.get(path))
        .or_else(|| present(walk(record, path)))
        .or_else(|| {
            path.contains(PATH_SEPARATOR)
                .then(|| present(record.get(&path.replace(PATH_SEPARATOR, "_"))))
                .flatten()
        })
        .or_else(|| {
            let lowered = path.to_lowercase();
            present(
                record
                    .iter()
                    .find(|(k, _)| k.to_lowercase() == lowered)
                    .map(|(_, v)| v),
            )
        })
}

fn present(v: Option<&Value>) -> Option<&Value> {
    v.filter(|v| !v.is_null())
}

fn walk<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let mut segments = path.split(PATH_SEPARATOR);
    let first = segments.next()?;
    let mut cur = record.get(first)?;
    for seg in segments {
        cur = match cur {
            Value::Object(obj) => obj.get(seg)?,
            Value::Array(items) => items
                .iter()
                .find_map(|it| it.as_object().and_then(|o| o.get(seg)))?,
            _ => return None,
        };
    }
    Some(cur)
}

/// Resolve `path` and render the value as a string (strings verbatim, everything
/// else as compact JSON).
#[must_use]
pub fn get_string(record: &Record, path: &str) -> Option<String> {
    get_value(record, path).map(|v| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

/// Union of [`enumerate_paths`] over several records.
#[must_use]
pub fn enumerate_paths_all<'a>(records: impl IntoIterator<Item = &'a Record>) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for r in records {
        collect_object(r, None, &mut out);
    }
    out
}
