//! The inter-dump deduplication codec.
//!
//! Encoding classifies source pages against a reference dump and writes the
//! artifact; decoding parses the artifact and rebuilds the source dump
//! byte-for-byte with the help of the reference.

pub mod compress;
pub mod decompress;
pub mod diff;
pub mod inner;
pub mod interval;
pub mod method;
pub mod pagenr;
pub mod wire;

pub use compress::compress_dump;
pub use decompress::decompress_dump;
pub use method::{ArtifactHeader, InnerCompression, Method};

use std::path::{Path, PathBuf};

/// Path an output file is assembled under before the final rename.
pub(crate) fn processing_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".processing");
    PathBuf::from(name)
}
