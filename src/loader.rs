//! Lazy Full Loader.
//!
//! The scan only looks at one record per file. Once a caller settles on a device,
//! [`load_full`] decodes every file in that key's file-set in [`DecodeMode::Full`]
//! and returns all records, normalized:
//!
//! - records with no payload field (only metadata) are dropped;
//! - every record is stamped with [`DEVICE_KEY_KEY`] set to the requested key.
//!
//! Files that fail to decode are skipped and counted in the [`LoadReport`]. A known
//! key whose files all fail yields an empty record list, which is distinct from the
//! [`IndexError::UnknownDeviceKey`] returned for a key the index has never seen.

use crate::error::IndexError;
use crate::index::DatasetIndex;
use crate::io::{decode_file, DecodeMode, Decoded};
use crate::record::{has_payload, Record, DEVICE_KEY_KEY};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::info;

/// Accounting for one full load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Files decoded successfully, in load order.
    pub files_loaded: Vec<PathBuf>,
    /// Files skipped as undecodable, with the reason.
    pub files_skipped: Vec<(PathBuf, String)>,
    /// Loaded files whose stream broke off early, with the reason. Their records up
    /// to the break are included.
    pub files_truncated: Vec<(PathBuf, String)>,
    /// NDJSON lines, CSV rows, or JSON array elements skipped inside loaded files.
    pub lines_skipped: usize,
    /// Records dropped during normalization.
    pub records_dropped: usize,
}

/// All records for one device plus the load accounting.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceLoad {
    /// The device key that was loaded.
    pub key: String,
    /// Normalized records, files in file-set order, records in file order.
    pub records: Vec<Record>,
    /// What happened per file.
    pub report: LoadReport,
}

impl DeviceLoad {
    /// Whether the load produced no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Fully decode every file attributed to `key`.
///
/// # Errors
/// Returns [`IndexError::UnknownDeviceKey`] if `key` is not in `index`.
pub fn load_full(key: &str, index: &DatasetIndex) -> Result<DeviceLoad, IndexError> {
    let files = file_set(key, index)?;
    let decoded = files.iter().map(|f| (f.as_path(), decode_file(f, DecodeMode::Full)));
    Ok(assemble(key, decoded))
}

/// Parallel [`load_full`]: files are decoded on the rayon pool and merged in
/// file-set order, so the result is identical to the sequential load.
///
/// # Errors
/// Returns [`IndexError::UnknownDeviceKey`] if `key` is not in `index`.
///
/// # Feature
/// Requires the `parallel-io` feature.
#[cfg(feature = "parallel-io")]
pub fn load_full_par(key: &str, index: &DatasetIndex) -> Result<DeviceLoad, IndexError> {
    use rayon::prelude::*;
    let files: Vec<&PathBuf> = file_set(key, index)?.iter().collect();
    let decoded: Vec<Decoded> = files
        .par_iter()
        .map(|f| decode_file(f, DecodeMode::Full))
        .collect();
    Ok(assemble(
        key,
        files.into_iter().map(PathBuf::as_path).zip(decoded),
    ))
}

fn file_set<'a>(key: &str, index: &'a DatasetIndex) -> Result<&'a BTreeSet<PathBuf>, IndexError> {
    index
        .files(key)
        .ok_or_else(|| IndexError::UnknownDeviceKey(key.to_string()))
}

fn assemble<'p>(key: &str, decoded: impl Iterator<Item = (&'p Path, Decoded)>) -> DeviceLoad {
    let mut out = DeviceLoad {
        key: key.to_string(),
        ..DeviceLoad::default()
    };
    for (path, d) in decoded {
        if let Some(reason) = d.diagnostic {
            out.report.files_skipped.push((path.to_path_buf(), reason));
            continue;
        }
        out.report.files_loaded.push(path.to_path_buf());
        out.report.lines_skipped += d.skipped_lines;
        if let Some(reason) = d.truncated {
            out.report.files_truncated.push((path.to_path_buf(), reason));
        }
        for mut rec in d.records {
            if !has_payload(&rec) {
                out.report.records_dropped += 1;
                continue;
            }
            rec.insert(DEVICE_KEY_KEY.to_string(), Value::String(key.to_string()));
            out.records.push(rec);
        }
    }
    info!(
        key,
        records = out.records.len(),
        loaded = out.report.files_loaded.len(),
        skipped = out.report.files_skipped.len(),
        truncated = out.report.files_truncated.len(),
        "device load complete"
    );
    out
}
