//! Dataset Indexer: one cheap pass over a directory tree.
//!
//! The scanner walks `root` recursively in lexicographic order (entries sorted by
//! file name within each directory), considers only files whose extension marks
//! them as CSV, JSON, or NDJSON, and stops once `max_files` of them have been
//! inspected. For each inspected file it decodes a single record in
//! [`DecodeMode::Sample`], resolves a device key for it, and records the file under
//! that key. The sample itself is cached only while the key holds fewer than
//! `sample_per_device` samples; file-set membership is always recorded so that a
//! later full load sees every file.
//!
//! ```no_run
//! use telemetry_index::{scan, ScanOptions};
//!
//! let index = scan("dataset/", &ScanOptions::new().with_max_files(5_000))?;
//! for (key, entry) in index.devices() {
//!     println!("{} ({} files)", entry.label(key), entry.files.len());
//! }
//! # Ok::<(), telemetry_index::IndexError>(())
//! ```

use crate::error::IndexError;
use crate::identity::{FolderIdPattern, IdentityResolver, IdentitySource};
use crate::index::DatasetIndex;
use crate::io::{decode_file, DecodeMode, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Scan configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    /// Sample records cached per device key.
    pub sample_per_device: usize,
    /// Upper bound on files inspected; `None` walks the whole tree.
    pub max_files: Option<usize>,
    /// Follow symbolic links while walking.
    pub follow_links: bool,
    /// Which directory names count as device identifiers.
    pub folder_id_pattern: FolderIdPattern,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            sample_per_device: 1,
            max_files: None,
            follow_links: false,
            folder_id_pattern: FolderIdPattern::default(),
        }
    }
}

impl ScanOptions {
    /// Defaults: one sample per device, no file budget, links not followed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set how many samples are cached per device key.
    #[must_use]
    pub fn with_sample_per_device(mut self, n: usize) -> Self {
        self.sample_per_device = n;
        self
    }

    /// Cap the number of files inspected.
    #[must_use]
    pub fn with_max_files(mut self, n: usize) -> Self {
        self.max_files = Some(n);
        self
    }

    /// Control symlink traversal.
    #[must_use]
    pub fn with_follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    /// Choose the folder identifier pattern.
    #[must_use]
    pub fn with_folder_id_pattern(mut self, pattern: FolderIdPattern) -> Self {
        self.folder_id_pattern = pattern;
        self
    }
}

/// A configured scanner. Holds the compiled identity rule chain so it can be
/// reused across scans.
pub struct Scanner {
    options: ScanOptions,
    resolver: IdentityResolver,
}

impl Scanner {
    /// Build a scanner with the standard identity rules.
    ///
    /// # Errors
    /// Returns [`IndexError::InvalidFolderPattern`] if a custom folder pattern does
    /// not compile.
    pub fn new(options: ScanOptions) -> Result<Self, IndexError> {
        let resolver = IdentityResolver::new(&options.folder_id_pattern)
            .map_err(|e| IndexError::InvalidFolderPattern(e.to_string()))?;
        Ok(Self { options, resolver })
    }

    /// Build a scanner around an existing resolver (e.g. with custom rules).
    #[must_use]
    pub fn with_resolver(options: ScanOptions, resolver: IdentityResolver) -> Self {
        Self { options, resolver }
    }

    /// The options this scanner runs with.
    #[must_use]
    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Walk `root` and build a fresh [`DatasetIndex`].
    ///
    /// # Errors
    /// Returns [`IndexError::RootNotFound`] or [`IndexError::NotADirectory`] when
    /// `root` is unusable. Problems with individual files never fail the scan.
    pub fn scan(&self, root: impl AsRef<Path>) -> Result<DatasetIndex, IndexError> {
        let root = root.as_ref();
        if !root.exists() {
            return Err(IndexError::RootNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(IndexError::NotADirectory(root.to_path_buf()));
        }

        let mut index = DatasetIndex::new(root.to_path_buf());
        let budget = self.options.max_files.unwrap_or(usize::MAX);
        let cap = self.options.sample_per_device;

        for path in candidate_files(root, self.options.follow_links) {
            if index.stats.inspected >= budget {
                debug!(budget, "file budget reached, stopping scan");
                break;
            }
            index.stats.inspected += 1;

            let decoded = decode_file(&path, DecodeMode::Sample);
            if !decoded.is_ok() {
                index.stats.skipped += 1;
                continue;
            }
            index.touched.push(path.clone());

            let Some(sample) = decoded.records.into_iter().next() else {
                index.stats.without_record += 1;
                continue;
            };

            let (key, source) = match self.resolver.resolve(&sample, &path) {
                Some(id) => (id.key, id.source),
                None => (fallback_key(&path), IdentitySource::ParentFolder),
            };
            debug!(file = %path.display(), key = %key, source = %source, "attributed file");
            index.attribute(key, source, &path, sample, cap);
        }
        index.stats.touched = index.touched.len();

        info!(
            root = %root.display(),
            devices = index.len(),
            inspected = index.stats.inspected,
            skipped = index.stats.skipped,
            "scan complete"
        );
        Ok(index)
    }
}

/// Scan `root` with the standard identity rules.
///
/// # Errors
/// See [`Scanner::new`] and [`Scanner::scan`].
pub fn scan(root: impl AsRef<Path>, options: &ScanOptions) -> Result<DatasetIndex, IndexError> {
    Scanner::new(options.clone())?.scan(root)
}

/// Decodable files under `root`, lazily, in a stable order.
fn candidate_files(root: &Path, follow_links: bool) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(root)
        .follow_links(follow_links)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(error = %err, "error accessing entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| FileFormat::from_path(path).is_some())
}

/// Key for files no identity rule could place: the immediate parent folder name.
fn fallback_key(path: &Path) -> String {
    let parent = path.parent();
    parent
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
        .or_else(|| {
            // "." and similar relative parents have no name of their own
            parent
                .and_then(|p| p.canonicalize().ok())
                .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        })
        .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_builder() {
        let o = ScanOptions::new()
            .with_sample_per_device(3)
            .with_max_files(10)
            .with_follow_links(true)
            .with_folder_id_pattern(FolderIdPattern::Eui64);
        assert_eq!(o.sample_per_device, 3);
        assert_eq!(o.max_files, Some(10));
        assert!(o.follow_links);
        assert_eq!(o.folder_id_pattern, FolderIdPattern::Eui64);
    }

    #[test]
    fn options_deserialize_with_defaults() -> anyhow::Result<()> {
        let o: ScanOptions = serde_json::from_str(r#"{"max_files": 50}"#)?;
        assert_eq!(o.max_files, Some(50));
        assert_eq!(o.sample_per_device, 1);
        assert_eq!(o.folder_id_pattern, FolderIdPattern::Hex8To32);
        Ok(())
    }

    #[test]
    fn invalid_custom_pattern_is_a_structural_error() {
        let o = ScanOptions::new().with_folder_id_pattern(FolderIdPattern::Custom("[".into()));
        assert!(matches!(
            Scanner::new(o),
            Err(IndexError::InvalidFolderPattern(_))
        ));
    }

    #[test]
    fn fallback_is_parent_name() {
        assert_eq!(fallback_key(Path::new("/ds/site-a/up.json")), "site-a");
    }
}
