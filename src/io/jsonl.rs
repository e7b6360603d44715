//! Newline-delimited JSON (`.ndjson` / `.jsonl`) decoding.
//!
//! Each non-blank line is parsed on its own from raw bytes. A line that is not
//! valid UTF-8 or valid JSON, or that is valid JSON but not an object, is skipped
//! and counted; the rest of the file is still read. An I/O error mid-stream ends
//! the read: the records decoded up to that point are returned and the break is
//! reported alongside them.

use super::{open_reader, Parsed};
use crate::record::annotate_source;
use anyhow::Result;
use serde_json::Value;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::debug;

/// Read up to `limit` records (all when `None`) from an NDJSON file.
///
/// # Errors
/// Returns an error only if the file cannot be opened.
pub(crate) fn read_ndjson_records(path: &Path, limit: Option<usize>) -> Result<Parsed> {
    let mut rdr = BufReader::new(open_reader(path)?);
    let mut parsed = Parsed::default();
    let mut buf = Vec::new();
    let mut line_no = 0usize;
    loop {
        if limit.is_some_and(|n| parsed.records.len() >= n) {
            break;
        }
        buf.clear();
        line_no += 1;
        match rdr.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                // the partial line is lost along with the rest of the stream
                parsed.skipped += 1;
                parsed.truncated = Some(format!("read line {line_no} in {}: {err}", path.display()));
                break;
            }
        }
        let line = buf.trim_ascii();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_slice::<Value>(line) {
            Ok(Value::Object(mut obj)) => {
                annotate_source(&mut obj, path);
                parsed.records.push(obj);
            }
            Ok(_) => {
                debug!(file = %path.display(), line = line_no, "skipping non-object NDJSON line");
                parsed.skipped += 1;
            }
            Err(err) => {
                debug!(file = %path.display(), line = line_no, error = %err, "skipping malformed NDJSON line");
                parsed.skipped += 1;
            }
        }
    }
    Ok(parsed)
}
