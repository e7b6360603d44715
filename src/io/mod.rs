//! Record Decoder: turns one telemetry file into a sequence of [`Record`]s.
//!
//! Three format classes are recognised by extension (case-insensitive, after any
//! compression suffix is removed):
//! - **CSV** (`.csv`): one record per data row, header names trimmed.
//! - **JSON** (`.json`): a single object, or an array whose object elements each
//!   become a record.
//! - **NDJSON** (`.ndjson`, `.jsonl`): one JSON object per non-blank line.
//!
//! Decoding is fail-soft. [`decode_file`] never returns an error: a file that
//! cannot be opened or whose top-level JSON is malformed yields an empty
//! [`Decoded`] carrying a diagnostic, while bad NDJSON lines or CSV rows are
//! skipped individually and counted. A stream that breaks off mid-file (e.g. a
//! truncated `.gz`) keeps the records read before the break and notes it in
//! [`Decoded::truncated`].
//!
//! Every record is annotated with its origin under
//! [`SOURCE_FILE_KEY`](crate::record::SOURCE_FILE_KEY).

pub mod compression;
mod csv;
mod json;
mod jsonl;

use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::warn;

/// Format class of a telemetry file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FileFormat {
    /// Header row followed by data rows.
    Csv,
    /// One object or an array of objects.
    Json,
    /// Newline-delimited JSON (`.ndjson` / `.jsonl`).
    Ndjson,
}

impl FileFormat {
    /// Classify `path` by extension, looking through a compression suffix.
    ///
    /// Returns `None` for files this crate does not decode.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = compression::strip_compression_suffix(path)?;
        let ext = Path::new(&name).extension()?.to_str()?;
        match ext {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            "ndjson" | "jsonl" => Some(Self::Ndjson),
            _ => None,
        }
    }
}

/// How much of a file to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeMode {
    /// Only the first record: first CSV row, first array element or the single
    /// object, first non-blank NDJSON line.
    Sample,
    /// Every record in the file.
    #[default]
    Full,
}

impl DecodeMode {
    /// Maximum number of records this mode produces, `None` for unbounded.
    #[inline]
    #[must_use]
    pub fn limit(self) -> Option<usize> {
        match self {
            Self::Sample => Some(1),
            Self::Full => None,
        }
    }
}

/// Outcome of decoding one file.
#[derive(Debug, Clone, Default)]
pub struct Decoded {
    /// Records in file order, each annotated with its origin.
    pub records: Vec<Record>,
    /// Set when the whole file was skipped (unreadable, malformed top level,
    /// unsupported extension).
    pub diagnostic: Option<String>,
    /// Lines or rows skipped inside an otherwise readable file.
    pub skipped_lines: usize,
    /// Set when reading stopped early on an I/O error; the records decoded before
    /// it are kept.
    pub truncated: Option<String>,
}

impl Decoded {
    /// Whether the file was opened and parsed at the top level.
    #[inline]
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.diagnostic.is_none()
    }

    fn failed(diagnostic: String) -> Self {
        Self {
            records: Vec::new(),
            diagnostic: Some(diagnostic),
            skipped_lines: 0,
            truncated: None,
        }
    }
}

/// Records produced by one of the format readers plus skipped line/row count.
#[derive(Default)]
pub(crate) struct Parsed {
    pub records: Vec<Record>,
    pub skipped: usize,
    pub truncated: Option<String>,
}

/// Open `path` for reading with transparent decompression.
pub(crate) fn open_reader(path: &Path) -> anyhow::Result<Box<dyn Read>> {
    use anyhow::Context;
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    compression::auto_detect_reader(f, path)
        .with_context(|| format!("setup decompression for {}", path.display()))
}

/// Decode a single file. Never fails; see [`Decoded::diagnostic`].
pub fn decode_file(path: impl AsRef<Path>, mode: DecodeMode) -> Decoded {
    let path = path.as_ref();
    let Some(format) = FileFormat::from_path(path) else {
        return Decoded::failed(format!("unsupported file type: {}", path.display()));
    };
    decode_as(path, format, mode)
}

/// Decode `path` as `format`, ignoring its extension.
pub fn decode_as(path: impl AsRef<Path>, format: FileFormat, mode: DecodeMode) -> Decoded {
    let path = path.as_ref();
    let parsed = match format {
        FileFormat::Csv => self::csv::read_csv_records(path, mode.limit()),
        FileFormat::Json => self::json::read_json_records(path, mode.limit()),
        FileFormat::Ndjson => self::jsonl::read_ndjson_records(path, mode.limit()),
    };
    match parsed {
        Ok(Parsed {
            records,
            skipped,
            truncated,
        }) => {
            if let Some(reason) = &truncated {
                warn!(file = %path.display(), records = records.len(), error = %reason, "file truncated, keeping records read so far");
            }
            Decoded {
                records,
                diagnostic: None,
                skipped_lines: skipped,
                truncated,
            }
        }
        Err(err) => {
            warn!(file = %path.display(), error = %format!("{err:#}"), "skipping undecodable file");
            Decoded::failed(format!("{err:#}"))
        }
    }
}

/// Decode several files and concatenate their records in the given order.
///
/// Files that fail to decode contribute nothing; the returned count is the number
/// of such files.
pub fn decode_all<P: AsRef<Path>>(
    paths: impl IntoIterator<Item = P>,
    mode: DecodeMode,
) -> (Vec<Record>, usize) {
    let mut out = Vec::new();
    let mut failed = 0usize;
    for p in paths {
        let d = decode_file(p, mode);
        if !d.is_ok() {
            failed += 1;
        }
        out.extend(d.records);
    }
    (out, failed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_extension() {
        assert_eq!(FileFormat::from_path(Path::new("a/b.csv")), Some(FileFormat::Csv));
        assert_eq!(FileFormat::from_path(Path::new("a/B.JSON")), Some(FileFormat::Json));
        assert_eq!(FileFormat::from_path(Path::new("x.jsonl")), Some(FileFormat::Ndjson));
        assert_eq!(FileFormat::from_path(Path::new("x.ndjson")), Some(FileFormat::Ndjson));
        assert_eq!(FileFormat::from_path(Path::new("x.txt")), None);
        assert_eq!(FileFormat::from_path(Path::new("README")), None);
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn format_through_compression_suffix() {
        assert_eq!(
            FileFormat::from_path(Path::new("dump.ndjson.gz")),
            Some(FileFormat::Ndjson)
        );
    }

    #[test]
    fn unsupported_file_is_reported_not_raised() {
        let d = decode_file("nope.bin", DecodeMode::Full);
        assert!(d.records.is_empty());
        assert!(d.diagnostic.is_some());
    }

    #[test]
    fn missing_file_is_reported_not_raised() {
        let d = decode_file("/definitely/not/here.json", DecodeMode::Full);
        assert!(d.records.is_empty());
        assert!(!d.is_ok());
    }
}
