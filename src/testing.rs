//! Testing utilities: on-disk dataset fixtures and index invariant checks.
//!
//! Scanning is a filesystem operation, so realistic tests need realistic trees.
//! [`DatasetBuilder`] writes files under a temporary root that is removed when the
//! builder drops.
//!
//! ```
//! use telemetry_index::testing::{uplink, DatasetBuilder};
//! use telemetry_index::{scan, ScanOptions};
//!
//! # fn main() -> anyhow::Result<()> {
//! let ds = DatasetBuilder::new()?
//!     .ndjson("a84041000181c9e1/up.ndjson", &[uplink("a84041000181c9e1", "2024-01-01T00:00:00Z", -80)])?;
//! let index = scan(ds.root(), &ScanOptions::new())?;
//! assert!(index.contains("a84041000181c9e1"));
//! # Ok(())
//! # }
//! ```

use crate::index::DatasetIndex;
use crate::record::source_file;
use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::fs::{create_dir_all, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Writes dataset files under a temporary root.
pub struct DatasetBuilder {
    dir: TempDir,
}

impl DatasetBuilder {
    /// Create an empty dataset root.
    ///
    /// # Errors
    /// Returns an error if the temporary directory cannot be created.
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: TempDir::new().context("create dataset temp dir")?,
        })
    }

    /// The dataset root.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Absolute path of `rel` under the root.
    #[must_use]
    pub fn path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.dir.path().join(rel)
    }

    /// Write raw bytes to `rel`, creating parent directories.
    ///
    /// # Errors
    /// Returns an error if the file or its parents cannot be created.
    pub fn raw(self, rel: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Result<Self> {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
        }
        let mut f = File::create(&path).with_context(|| format!("create {}", path.display()))?;
        f.write_all(contents.as_ref())?;
        Ok(self)
    }

    /// Write `value` as a JSON document.
    ///
    /// # Errors
    /// See [`DatasetBuilder::raw`].
    pub fn json(self, rel: impl AsRef<Path>, value: &Value) -> Result<Self> {
        let body = serde_json::to_vec_pretty(value)?;
        self.raw(rel, body)
    }

    /// Write `lines` as NDJSON, one compact object per line.
    ///
    /// # Errors
    /// See [`DatasetBuilder::raw`].
    pub fn ndjson(self, rel: impl AsRef<Path>, lines: &[Value]) -> Result<Self> {
        let mut body = String::new();
        for l in lines {
            body.push_str(&serde_json::to_string(l)?);
            body.push('\n');
        }
        self.raw(rel, body)
    }

    /// Write a CSV file from a header and rows of cells.
    ///
    /// # Errors
    /// See [`DatasetBuilder::raw`].
    pub fn csv(self, rel: impl AsRef<Path>, header: &[&str], rows: &[&[&str]]) -> Result<Self> {
        let mut w = csv::WriterBuilder::new().flexible(true).from_writer(Vec::new());
        w.write_record(header)?;
        for row in rows {
            w.write_record(*row)?;
        }
        let body = w
            .into_inner()
            .map_err(|e| anyhow::anyhow!("flush CSV fixture: {}", e.error()))?;
        self.raw(rel, body)
    }

    /// Write `contents` gzip-compressed.
    ///
    /// # Errors
    /// See [`DatasetBuilder::raw`].
    #[cfg(feature = "compression-gzip")]
    pub fn gzip(self, rel: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Result<Self> {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(contents.as_ref())?;
        let body = enc.finish()?;
        self.raw(rel, body)
    }
}

/// A ChirpStack-style uplink event with one gateway report.
#[must_use]
pub fn uplink(dev_eui: &str, time: &str, rssi: i64) -> Value {
    let tail = dev_eui
        .char_indices()
        .rev()
        .nth(3)
        .map_or(dev_eui, |(i, _)| &dev_eui[i..]);
    json!({
        "time": time,
        "deviceInfo": {
            "deviceName": format!("sensor-{tail}"),
            "devEui": dev_eui,
        },
        "object": {"temperature": 20.5, "humidity": 41},
        "rxInfo": [{"gatewayId": "0016c001ff10a235", "rssi": rssi, "snr": 9.25}],
    })
}

/// An uplink whose only identifier is a UUID-shaped message id.
#[must_use]
pub fn uuid_uplink(time: &str, rssi: i64) -> Value {
    json!({
        "deduplicationId": "3c9e7a1b-5d2f-4e8a-9b0c-1d2e3f4a5b6c",
        "deviceId": "a1b2c3d4-e5f6-7890-abcd-ef0123456789",
        "time": time,
        "rxInfo": [{"rssi": rssi}, {"rssi": rssi - 10}],
    })
}

/// Check the invariants every index must hold:
/// each sample came from a file in its key's file-set, sample lists respect `cap`,
/// and every file-set member lies under the scan root.
///
/// # Panics
/// Panics with a description of the first violated invariant.
pub fn assert_index_invariants(index: &DatasetIndex, cap: usize) {
    for (key, entry) in index.devices() {
        assert!(
            entry.samples.len() <= cap,
            "key {key}: {} samples exceed cap {cap}",
            entry.samples.len()
        );
        for s in &entry.samples {
            let origin = source_file(s).map(PathBuf::from);
            assert!(
                origin.as_ref().is_some_and(|o| entry.files.contains(o)),
                "key {key}: sample from {origin:?} not in its file-set"
            );
        }
        for f in &entry.files {
            assert!(
                f.starts_with(index.root()),
                "key {key}: {} outside scan root",
                f.display()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uplink_names_device_after_last_four_chars() {
        let name = |eui: &str| uplink(eui, "t", -80)["deviceInfo"]["deviceName"].clone();
        assert_eq!(name("a84041000181c9e1"), json!("sensor-c9e1"));
        assert_eq!(name("ab"), json!("sensor-ab"));
        assert_eq!(name("gerät-äöüß"), json!("sensor-äöüß"));
    }
}
