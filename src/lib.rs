//! # telemetry-index
//!
//! An **indexing and device-resolution engine** for IoT telemetry scattered across an
//! unknown directory tree. Files may be CSV, JSON, or NDJSON, optionally compressed;
//! no schema is assumed. The crate answers three questions:
//!
//! - **Which device produced this record?** A rule chain looks for identifier
//!   fields in the payload and hex-looking device folders in the path, and
//!   prefers the folder when the payload only carries a UUID-shaped session id.
//! - **What is in this dataset?** A cheap scan reads one record per file and
//!   builds a [`DatasetIndex`] of device keys, sample records, and file-sets.
//! - **What can I plot?** Nested objects and lists of objects resolve to dot-paths
//!   such as `rxInfo.rssi`, which turn into time/value [`Series`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use telemetry_index::*;
//! # fn main() -> anyhow::Result<()> {
//!
//! // Lightweight scan: one record per file, at most 3 samples per device.
//! let index = scan("dataset/", &ScanOptions::new().with_sample_per_device(3))?;
//!
//! for (key, entry) in index.devices() {
//!     println!("{}: {} files", entry.label(key), entry.files.len());
//! }
//!
//! // Full parse, only for the device the user picked.
//! let key = index.keys().next().unwrap_or_default().to_string();
//! let load = load_full(&key, &index)?;
//!
//! for path in measurement_paths(&load.records) {
//!     let series = extract_series(&load.records, &path);
//!     println!("{path}: {} points ({} excluded)", series.points.len(), series.excluded);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Record
//!
//! A [`Record`] is an ordered JSON object. CSV rows become objects of strings,
//! JSON and NDJSON objects are kept as written. Every record carries its origin
//! file under the metadata key `_source_file`; keys starting with `_` are never
//! listed as measurements.
//!
//! ### Device identity
//!
//! The [`identity`] module runs an ordered chain of [`IdentityRule`]s. The first
//! rule to resolve wins; when none does, the scanner keys the file by its parent
//! folder name. See the module docs for the exact precedence.
//!
//! ### Scan, then load
//!
//! [`scan`] is bounded by a file budget and decodes only one record per file.
//! [`load_full`] is deferred until a device is selected and decodes every file in
//! that device's file-set. Both are fail-soft per file: unreadable files are
//! skipped and reported, never fatal. Only structural problems surface as
//! [`IndexError`].
//!
//! ## Feature Flags
//!
//! - `parallel-io` - Enable [`load_full_par`] on the rayon pool
//! - `compression-gzip`, `compression-zstd`, `compression-bzip2`, `compression-xz` -
//!   Transparent decompression of `.gz`, `.zst`, `.bz2`, `.xz` inputs
//! - `cli` - Build the `telemetry-index` command-line tool
//!
//! ## Module Overview
//!
//! - [`io`] - Record Decoder for CSV, JSON, NDJSON
//! - [`identity`] - Device Identity Resolver
//! - [`scanner`] - Dataset Indexer and [`ScanOptions`]
//! - [`index`] - [`DatasetIndex`] and per-device entries
//! - [`loader`] - Lazy Full Loader
//! - [`paths`] - Nested Path Resolver
//! - [`series`] - Time/value series extraction
//! - [`testing`] - Dataset fixtures for tests

pub mod error;
pub mod identity;
pub mod index;
pub mod io;
pub mod loader;
pub mod paths;
pub mod record;
pub mod scanner;
pub mod series;
pub mod testing;

// General re-exports
pub use error::IndexError;
pub use identity::{
    FolderIdPattern, Identity, IdentityResolver, IdentityRule, IdentitySource, RuleOutcome,
};
pub use index::{DatasetIndex, DeviceEntry, ScanStats};
pub use io::{decode_all, decode_file, DecodeMode, Decoded, FileFormat};
pub use loader::{load_full, DeviceLoad, LoadReport};
pub use paths::{enumerate_paths, get_value, PATH_SEPARATOR};
pub use record::{Record, METADATA_PREFIX, SOURCE_FILE_KEY};
pub use scanner::{scan, ScanOptions, Scanner};
pub use series::{extract_series, measurement_paths, Series, SeriesPoint};

// Gated re-exports
#[cfg(feature = "parallel-io")]
pub use loader::load_full_par;
