//! Pluggable decompression for telemetry files.
//!
//! Gateways and exporters frequently archive telemetry as `uplinks.ndjson.gz` or
//! `readings.csv.zst`. The decoder asks this module for two things:
//! - the file name with any compression suffix removed, so the format class
//!   (`csv`, `json`, `ndjson`) can be read off the inner extension, and
//! - a reader that transparently decompresses the stream.
//!
//! ## Built-in codecs
//!
//! When enabled via feature flags:
//! - **Gzip** (`.gz`) - via `flate2` (feature: `compression-gzip`)
//! - **Zstd** (`.zst`) - via `zstd` (feature: `compression-zstd`)
//! - **Bzip2** (`.bz2`) - via `bzip2` (feature: `compression-bzip2`)
//! - **Xz** (`.xz`) - via `xz2` (feature: `compression-xz`)
//!
//! ## Detection
//! Extensions are checked first. Magic bytes are only consulted when the
//! extension is not recognised, which keeps the common uncompressed path free of
//! header peeking beyond what `BufReader` already buffers.
//!
//! ## Custom codecs
//! ```
//! use telemetry_index::io::compression::{register_codec, CompressionCodec};
//! use std::io::Read;
//! use std::sync::Arc;
//!
//! struct Identity;
//!
//! impl CompressionCodec for Identity {
//!     fn name(&self) -> &str { "identity" }
//!     fn extensions(&self) -> &[&str] { &[".raw"] }
//!     fn magic_bytes(&self) -> Option<&[u8]> { None }
//!     fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
//!         Ok(reader)
//!     }
//! }
//!
//! register_codec(Arc::new(Identity));
//! ```

use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// Global codec registry.
static CODEC_REGISTRY: OnceLock<RwLock<Vec<Arc<dyn CompressionCodec>>>> = OnceLock::new();

fn init_registry() -> Vec<Arc<dyn CompressionCodec>> {
    vec![
        #[cfg(feature = "compression-gzip")]
        Arc::new(GzipCodec),
        #[cfg(feature = "compression-zstd")]
        Arc::new(ZstdCodec),
        #[cfg(feature = "compression-bzip2")]
        Arc::new(Bzip2Codec),
        #[cfg(feature = "compression-xz")]
        Arc::new(XzCodec),
    ]
}

fn registry() -> &'static RwLock<Vec<Arc<dyn CompressionCodec>>> {
    CODEC_REGISTRY.get_or_init(|| RwLock::new(init_registry()))
}

fn codecs() -> Vec<Arc<dyn CompressionCodec>> {
    registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Register a custom decompression codec globally.
///
/// Registered codecs take part in both suffix stripping and reader wrapping.
pub fn register_codec(codec: Arc<dyn CompressionCodec>) {
    registry()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .push(codec);
}

/// A decompression algorithm recognised by extension and, optionally, magic bytes.
///
/// Implementations live in a global registry and must be `Send + Sync`.
pub trait CompressionCodec: Send + Sync {
    /// Human-readable codec name (e.g., "gzip").
    fn name(&self) -> &str;

    /// File extensions associated with this codec, lowercase with the leading dot.
    fn extensions(&self) -> &[&str];

    /// Optional magic byte signature for content-based detection.
    fn magic_bytes(&self) -> Option<&[u8]>;

    /// Wrap a reader with decompression.
    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>>;
}

/// Detect a codec from the trailing extension of `path`, returning the codec and
/// the length of the matched suffix.
fn detect_from_extension(path: &Path) -> Option<(Arc<dyn CompressionCodec>, usize)> {
    let name = path.file_name()?.to_string_lossy().to_lowercase();
    for codec in codecs() {
        for ext in codec.extensions() {
            if name.len() > ext.len() && name.ends_with(ext) {
                return Some((codec.clone(), ext.len()));
            }
        }
    }
    None
}

fn detect_from_magic<R: BufRead>(reader: &mut R) -> Option<Arc<dyn CompressionCodec>> {
    let buf = reader.fill_buf().ok()?;
    if buf.is_empty() {
        return None;
    }
    codecs().into_iter().find(|codec| {
        codec
            .magic_bytes()
            .is_some_and(|magic| buf.len() >= magic.len() && buf.starts_with(magic))
    })
}

/// The lowercase file name of `path` with a recognised compression suffix removed.
///
/// `uplinks.NDJSON.gz` becomes `uplinks.ndjson`; `readings.csv` is returned as is
/// (lowercased).
#[must_use]
pub fn strip_compression_suffix(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_string_lossy().to_lowercase();
    match detect_from_extension(path) {
        Some((_, suffix_len)) => Some(name[..name.len() - suffix_len].to_string()),
        None => Some(name),
    }
}

/// Wrap `reader` with decompression when `path_hint` or the stream header call for it.
///
/// Returns a buffered pass-through when no codec matches.
///
/// # Errors
/// Returns an error if a matched codec fails to initialise its decoder.
pub fn auto_detect_reader<R: Read + 'static>(
    reader: R,
    path_hint: impl AsRef<Path>,
) -> Result<Box<dyn Read>> {
    if let Some((codec, _)) = detect_from_extension(path_hint.as_ref()) {
        return codec
            .wrap_reader_dyn(Box::new(reader))
            .with_context(|| format!("wrap reader with {} codec", codec.name()));
    }

    let mut buf_reader = BufReader::new(reader);
    if let Some(codec) = detect_from_magic(&mut buf_reader) {
        return codec
            .wrap_reader_dyn(Box::new(buf_reader))
            .with_context(|| format!("wrap reader with {} codec", codec.name()));
    }

    Ok(Box::new(buf_reader))
}

// ============================================================================
// Built-in Codec Implementations
// ============================================================================

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn extensions(&self) -> &[&str] {
        &[".gz", ".gzip"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x1f, 0x8b])
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        use flate2::read::MultiGzDecoder;
        Ok(Box::new(MultiGzDecoder::new(reader)))
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &str {
        "zstd"
    }

    fn extensions(&self) -> &[&str] {
        &[".zst", ".zstd"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x28, 0xb5, 0x2f, 0xfd])
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        zstd::stream::read::Decoder::new(reader).map(|d| Box::new(d) as Box<dyn Read>)
    }
}

#[cfg(feature = "compression-bzip2")]
struct Bzip2Codec;

#[cfg(feature = "compression-bzip2")]
impl CompressionCodec for Bzip2Codec {
    fn name(&self) -> &str {
        "bzip2"
    }

    fn extensions(&self) -> &[&str] {
        &[".bz2", ".bzip2"]
    }

    // "BZh": stream header plus block-size marker.
    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x42, 0x5a, 0x68])
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        use bzip2::read::BzDecoder;
        Ok(Box::new(BzDecoder::new(reader)))
    }
}

#[cfg(feature = "compression-xz")]
struct XzCodec;

#[cfg(feature = "compression-xz")]
impl CompressionCodec for XzCodec {
    fn name(&self) -> &str {
        "xz"
    }

    fn extensions(&self) -> &[&str] {
        &[".xz"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00])
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        use xz2::read::XzDecoder;
        Ok(Box::new(XzDecoder::new(reader)))
    }
}
