//! The output of one scan.
//!
//! A [`DatasetIndex`] maps each device key to a [`DeviceEntry`]: a small bounded list
//! of sample records, the full set of files attributed to the key, and the folder
//! the key was first seen in. It is built once by [`scan`](crate::scan), never
//! mutated afterwards, and threaded explicitly into
//! [`load_full`](crate::load_full). Re-scanning produces a new index.

use crate::identity::IdentitySource;
use crate::record::{is_metadata_key, scalar_to_string, Record};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Name-like fields consulted, in order, for a device display name.
const NAME_FIELDS: &[&str] = &[
    "deviceName",
    "deviceProfileName",
    "device_name",
    "device_label",
    "node_name",
    "name",
];

/// Network-server names that show up in name fields but do not name a device.
const NAME_BLACKLIST: &[&str] = &["chirpstack", "the things network", "ttn", "lorawan", "lora"];

/// Everything the index knows about one device key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceEntry {
    /// Sample records, at most `sample_per_device` of them, in scan order.
    pub samples: Vec<Record>,
    /// Every scanned file attributed to this key.
    pub files: BTreeSet<PathBuf>,
    /// Parent folder of the first file attributed to this key.
    pub folder: PathBuf,
    /// Rule that produced the key for the first file.
    pub source: IdentitySource,
}

impl DeviceEntry {
    pub(crate) fn new(folder: PathBuf, source: IdentitySource) -> Self {
        Self {
            samples: Vec::new(),
            files: BTreeSet::new(),
            folder,
            source,
        }
    }

    /// A human-friendly device name found in the first sample, if any.
    #[must_use]
    pub fn display_name(&self) -> Option<String> {
        self.samples.first().and_then(display_name)
    }

    /// `folder / name / key` label for selection lists; absent parts are omitted.
    #[must_use]
    pub fn label(&self, key: &str) -> String {
        let mut parts = Vec::with_capacity(3);
        if let Some(folder) = self.folder.file_name() {
            parts.push(folder.to_string_lossy().into_owned());
        }
        if let Some(name) = self.display_name() {
            parts.push(name);
        }
        parts.push(key.to_string());
        parts.dedup();
        parts.join(" / ")
    }
}

/// Counters collected while scanning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    /// Files counted against the budget.
    pub inspected: usize,
    /// Files that were opened and parsed.
    pub touched: usize,
    /// Files skipped because they could not be decoded.
    pub skipped: usize,
    /// Files that decoded but held no record (e.g. header-only CSV).
    pub without_record: usize,
}

/// The per-scan device index.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DatasetIndex {
    pub(crate) root: PathBuf,
    pub(crate) devices: BTreeMap<String, DeviceEntry>,
    pub(crate) touched: Vec<PathBuf>,
    pub(crate) stats: ScanStats,
}

impl DatasetIndex {
    pub(crate) fn new(root: PathBuf) -> Self {
        Self {
            root,
            ..Self::default()
        }
    }

    /// Register `file` (and, while below `cap`, its sample) under `key`.
    pub(crate) fn attribute(
        &mut self,
        key: String,
        source: IdentitySource,
        file: &Path,
        sample: Record,
        cap: usize,
    ) {
        let folder = file.parent().map(Path::to_path_buf).unwrap_or_default();
        let entry = self
            .devices
            .entry(key)
            .or_insert_with(|| DeviceEntry::new(folder, source));
        if entry.samples.len() < cap {
            entry.samples.push(sample);
        }
        entry.files.insert(file.to_path_buf());
    }

    /// Directory the scan started from.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of device keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether the scan found no devices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Device keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }

    /// Whether `key` is known.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.devices.contains_key(key)
    }

    /// The entry for `key`.
    #[must_use]
    pub fn device(&self, key: &str) -> Option<&DeviceEntry> {
        self.devices.get(key)
    }

    /// All entries in key order.
    pub fn devices(&self) -> impl Iterator<Item = (&str, &DeviceEntry)> {
        self.devices.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Cached samples for `key`.
    #[must_use]
    pub fn samples(&self, key: &str) -> Option<&[Record]> {
        self.devices.get(key).map(|e| e.samples.as_slice())
    }

    /// Files attributed to `key`.
    #[must_use]
    pub fn files(&self, key: &str) -> Option<&BTreeSet<PathBuf>> {
        self.devices.get(key).map(|e| &e.files)
    }

    /// Representative folder for `key`.
    #[must_use]
    pub fn folder(&self, key: &str) -> Option<&Path> {
        self.devices.get(key).map(|e| e.folder.as_path())
    }

    /// Device key to sample records, the shape a selection surface consumes.
    #[must_use]
    pub fn sample_map(&self) -> BTreeMap<&str, &[Record]> {
        self.devices
            .iter()
            .map(|(k, e)| (k.as_str(), e.samples.as_slice()))
            .collect()
    }

    /// Every file opened and parsed during the scan, in scan order.
    #[must_use]
    pub fn touched_files(&self) -> &[PathBuf] {
        &self.touched
    }

    /// Scan counters.
    #[must_use]
    pub fn stats(&self) -> ScanStats {
        self.stats
    }
}

/// A device name taken from a record's name-like fields, skipping network-server
/// names. Top-level fields are tried first, then nested objects depth-first
/// (ChirpStack nests the name under `deviceInfo`).
#[must_use]
pub fn display_name(record: &Record) -> Option<String> {
    name_at_top_level(record).or_else(|| {
        record
            .iter()
            .filter(|(k, _)| !is_metadata_key(k))
            .find_map(|(_, v)| v.as_object().and_then(display_name))
    })
}

fn name_at_top_level(record: &Record) -> Option<String> {
    let usable = |v: &serde_json::Value| {
        scalar_to_string(v).filter(|s| !NAME_BLACKLIST.contains(&s.to_lowercase().as_str()))
    };
    NAME_FIELDS
        .iter()
        .find_map(|f| record.get(*f).and_then(usable))
        .or_else(|| {
            record.iter().find_map(|(k, v)| {
                let lk = k.to_lowercase();
                (lk.contains("device") && lk.contains("name"))
                    .then(|| usable(v))
                    .flatten()
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(v: serde_json::Value) -> Record {
        v.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn cap_bounds_samples_but_not_files() {
        let mut idx = DatasetIndex::new(PathBuf::from("/ds"));
        for i in 0..4 {
            let f = PathBuf::from(format!("/ds/a/{i}.json"));
            idx.attribute("k".into(), IdentitySource::Payload, &f, rec(json!({"i": i})), 2);
        }
        let e = idx.device("k").unwrap();
        assert_eq!(e.samples.len(), 2);
        assert_eq!(e.files.len(), 4);
        assert_eq!(e.folder, PathBuf::from("/ds/a"));
    }

    #[test]
    fn first_folder_and_source_stick() {
        let mut idx = DatasetIndex::new(PathBuf::from("/ds"));
        idx.attribute("k".into(), IdentitySource::Folder, Path::new("/ds/a/1.csv"), rec(json!({})), 1);
        idx.attribute("k".into(), IdentitySource::Payload, Path::new("/ds/b/2.csv"), rec(json!({})), 1);
        let e = idx.device("k").unwrap();
        assert_eq!(e.folder, PathBuf::from("/ds/a"));
        assert_eq!(e.source, IdentitySource::Folder);
    }

    #[test]
    fn display_name_prefers_known_fields_and_skips_network_names() {
        assert_eq!(
            display_name(&rec(json!({"name": "ChirpStack", "deviceName": "soil-3"}))).as_deref(),
            Some("soil-3")
        );
        assert_eq!(
            display_name(&rec(json!({"name": "lora"}))),
            None
        );
        assert_eq!(
            display_name(&rec(json!({"Device Name ": "tank"}))).as_deref(),
            Some("tank")
        );
        assert_eq!(
            display_name(&rec(json!({"deviceInfo": {"deviceName": "em500"}}))).as_deref(),
            Some("em500")
        );
    }

    #[test]
    fn label_joins_folder_name_and_key() {
        let mut idx = DatasetIndex::new(PathBuf::from("/ds"));
        idx.attribute(
            "0011".into(),
            IdentitySource::Payload,
            Path::new("/ds/water/1.json"),
            rec(json!({"deviceName": "meter"})),
            1,
        );
        assert_eq!(idx.device("0011").unwrap().label("0011"), "water / meter / 0011");
    }
}
