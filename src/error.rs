//! Error types for dump compression and decompression.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the codec, the CLI and the command service.
///
/// Every error is local to one compression or decompression job; the CLI maps
/// them to a non-zero exit code and the service logs them without taking down
/// the worker pool.
#[derive(Debug, Error)]
pub enum DedupError {
    /// An I/O operation on a dump or artifact file failed.
    #[error("failed to {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The inner compressor or decompressor failed on the artifact body.
    #[error("inner {op} failed: {source}")]
    Inner {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The dump file size is zero or not a multiple of the page size.
    #[error("{} has size {size} which is not a positive multiple of page size {page_size}", path.display())]
    BadDumpSize {
        path: PathBuf,
        size: u64,
        page_size: u32,
    },

    /// The artifact does not start with the expected magic bytes.
    #[error("magic number mismatch (expected \"MBCR\")")]
    BadMagic,

    /// The artifact was produced by an incompatible format version.
    #[error("unsupported major version {0} (this reader understands major version 2)")]
    UnsupportedVersion(u16),

    /// The method string could not be parsed.
    #[error("unrecognised method string {0:?}")]
    BadMethod(String),

    /// The artifact body ended in the middle of a field.
    #[error("truncated input while reading {what}")]
    Truncated { what: &'static str },

    /// A value does not fit the width its encoding allows.
    #[error("{what} {value} exceeds the encodable range")]
    ValueOutOfRange { what: &'static str, value: u64 },

    /// An interval list entry decoded to `left > right`.
    #[error("invalid interval [{left}, {right}]")]
    InvalidInterval { left: u32, right: u32 },

    /// A diff patch is longer than the format permits.
    #[error("patch of {0} bytes exceeds the 2048-byte limit")]
    PatchTooLong(usize),

    /// Applying a diff would write past the end of the page.
    #[error("diff overruns the page: patch ends at {end}, page size is {page_size}")]
    DiffOverrun { end: usize, page_size: u32 },

    /// The artifact references a page number the reference dump does not have.
    #[error("reference page {pagenr} is out of range for {}", path.display())]
    PageOutOfRange { pagenr: u32, path: PathBuf },

    /// The artifact body carries an empty reference dump path.
    #[error("artifact carries an empty reference dump path")]
    EmptyRefPath,

    /// The header declares a size that does not divide into whole pages.
    #[error("uncompressed size {size} is not a positive multiple of page size {page_size}")]
    BadUncompressedSize { size: u64, page_size: u32 },

    /// A cached reference dump was loaded with a different page size.
    #[error("{} is cached with page size {cached}, requested {requested}", path.display())]
    PageSizeMismatch {
        path: PathBuf,
        cached: u32,
        requested: u32,
    },

    /// An unknown inner compression method was requested.
    #[error("unknown inner compression method {0:?} (valid: gzip, bzip2, 7zip, 0)")]
    UnknownCompressor(String),

    /// A service request carried an invalid opcode or malformed payload.
    #[error("invalid request: {0}")]
    BadRequest(String),
}

impl DedupError {
    /// Wraps an I/O error with the operation and the path it failed on.
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for codec and service operations.
pub type DedupResult<T> = Result<T, DedupError>;
