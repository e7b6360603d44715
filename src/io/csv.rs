//! CSV decoding into [`Record`]s.
//!
//! The first row is the header; names are trimmed. Each data row becomes one record
//! whose cells are JSON strings keyed by header. Rows may be ragged: missing cells
//! are left out and cells beyond the header are dropped. A row the parser rejects
//! (e.g. invalid UTF-8) is skipped and counted. A leading UTF-8 byte order mark,
//! as written by spreadsheet exports, is not part of the first header name. An I/O
//! error mid-stream ends the read with the rows decoded so far.

use super::{open_reader, Parsed};
use crate::record::{annotate_source, Record};
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use tracing::debug;

/// Read up to `limit` records (all when `None`) from a CSV file.
///
/// An empty file yields no records.
///
/// # Errors
/// Returns an error if the file cannot be opened or its header row cannot be read.
pub(crate) fn read_csv_records(path: &Path, limit: Option<usize>) -> Result<Parsed> {
    let rdr = open_reader(path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(rdr);

    let headers: Vec<String> = rdr
        .headers()
        .with_context(|| format!("read CSV header in {}", path.display()))?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let h = if i == 0 { h.trim_start_matches('\u{feff}') } else { h };
            h.trim().to_string()
        })
        .collect();

    let mut parsed = Parsed::default();
    if headers.is_empty() || headers.iter().all(String::is_empty) {
        return Ok(parsed);
    }

    for (i, row) in rdr.records().enumerate() {
        if limit.is_some_and(|n| parsed.records.len() >= n) {
            break;
        }
        let row = match row {
            Ok(row) => row,
            Err(err) if err.is_io_error() => {
                parsed.skipped += 1;
                parsed.truncated = Some(format!("read row {} in {}: {err}", i + 1, path.display()));
                break;
            }
            Err(err) => {
                debug!(file = %path.display(), row = i + 1, error = %err, "skipping CSV row");
                parsed.skipped += 1;
                continue;
            }
        };
        let mut rec = Record::new();
        for (name, cell) in headers.iter().zip(row.iter()) {
            rec.insert(name.clone(), Value::String(cell.to_string()));
        }
        annotate_source(&mut rec, path);
        parsed.records.push(rec);
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::source_file;
    use std::fs;

    #[test]
    fn rows_become_string_records_with_trimmed_headers() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let f = dir.path().join("r.csv");
        fs::write(&f, " time , temp\nt0,21.5\nt1,22.0\n")?;
        let parsed = read_csv_records(&f, None)?;
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[0]["time"], Value::String("t0".into()));
        assert_eq!(parsed.records[1]["temp"], Value::String("22.0".into()));
        assert_eq!(source_file(&parsed.records[0]), Some(f.display().to_string().as_str()));
        Ok(())
    }

    #[test]
    fn empty_file_is_empty_not_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let f = dir.path().join("e.csv");
        fs::write(&f, "")?;
        let parsed = read_csv_records(&f, None)?;
        assert!(parsed.records.is_empty());
        Ok(())
    }

    #[test]
    fn sample_limit_reads_one_row() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let f = dir.path().join("r.csv");
        fs::write(&f, "a,b\n1,2\n3,4\n5,6\n")?;
        let parsed = read_csv_records(&f, Some(1))?;
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0]["a"], Value::String("1".into()));
        Ok(())
    }

    #[test]
    fn byte_order_mark_is_not_part_of_the_header() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let f = dir.path().join("excel.csv");
        fs::write(&f, "\u{feff}time,moisture\n2024-01-01 00:00:00,31.5\n")?;
        let parsed = read_csv_records(&f, None)?;
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(
            parsed.records[0].get("time"),
            Some(&Value::String("2024-01-01 00:00:00".into()))
        );
        assert!(parsed.records[0].keys().all(|k| !k.contains('\u{feff}')));
        Ok(())
    }

    #[test]
    fn ragged_rows_are_tolerated() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let f = dir.path().join("r.csv");
        fs::write(&f, "a,b,c\n1,2\n3,4,5,6\n")?;
        let parsed = read_csv_records(&f, None)?;
        assert_eq!(parsed.records.len(), 2);
        assert!(parsed.records[0].get("c").is_none());
        assert_eq!(parsed.records[1]["c"], Value::String("5".into()));
        Ok(())
    }
}
