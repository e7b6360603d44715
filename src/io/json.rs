//! Whole-document JSON decoding.
//!
//! The root must be an object (one record) or an array (every object element is a
//! record; scalars and nested arrays are skipped). Any other root, or a document
//! that fails to parse, fails the whole file.

use super::{open_reader, Parsed};
use crate::record::{annotate_source, Record};
use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::io::BufReader;
use std::path::Path;

/// Read up to `limit` records (all when `None`) from a JSON document.
///
/// The whole document is parsed even in sample mode; JSON offers no cheaper way to
/// validate the top level.
///
/// # Errors
/// Returns an error if the file cannot be opened, is not valid JSON, or its root is
/// neither an object nor an array.
pub(crate) fn read_json_records(path: &Path, limit: Option<usize>) -> Result<Parsed> {
    let rdr = BufReader::new(open_reader(path)?);
    let root: Value = serde_json::from_reader(rdr)
        .with_context(|| format!("parse JSON document {}", path.display()))?;

    let limit = limit.unwrap_or(usize::MAX);
    let mut out = Vec::<Record>::new();
    let mut skipped = 0usize;
    match root {
        Value::Object(mut obj) => {
            if limit > 0 {
                annotate_source(&mut obj, path);
                out.push(obj);
            }
        }
        Value::Array(items) => {
            for item in items {
                if out.len() >= limit {
                    break;
                }
                match item {
                    Value::Object(mut obj) => {
                        annotate_source(&mut obj, path);
                        out.push(obj);
                    }
                    _ => skipped += 1,
                }
            }
        }
        other => bail!(
            "JSON root in {} is a {}, expected object or array",
            path.display(),
            kind(&other)
        ),
    }
    Ok(Parsed {
        records: out,
        skipped,
        ..Parsed::default()
    })
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
