//! Structural failures surfaced to callers.
//!
//! Per-file, per-line, and per-record problems are absorbed where they happen and
//! never show up here. Only structural problems stop an operation.

use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by [`scan`](crate::scan) and [`load_full`](crate::load_full).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// The scan root does not exist.
    #[error("scan root not found: {}", .0.display())]
    RootNotFound(PathBuf),

    /// The scan root exists but is not a directory.
    #[error("scan root is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// The requested device key has no file-set in the index.
    #[error("unknown device key: {0}")]
    UnknownDeviceKey(String),

    /// A custom folder identifier pattern failed to compile.
    #[error("invalid folder id pattern: {0}")]
    InvalidFolderPattern(String),
}
