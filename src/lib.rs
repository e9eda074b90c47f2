//! memdedup: reference-based deduplicating compression for VM memory
//! snapshots.
//!
//! A source dump is encoded against a reference dump of the same page size as
//! a mix of deduplicated pages, byte-level diffs and genuinely new pages,
//! optionally wrapped in a generic inner compressor. Decompression needs the
//! artifact plus the reference dump it names and reproduces the source
//! byte-for-byte.
//!
//! # Example
//!
//! ```no_run
//! use memdedup::{compress_dump, InnerCompression, MemoryDump, Method};
//!
//! fn main() -> memdedup::DedupResult<()> {
//!     let reference = MemoryDump::load("ref.dump", 4096)?;
//!     let source = MemoryDump::load("src.dump", 4096)?;
//!     let method = Method {
//!         intra: true,
//!         diffing: true,
//!         inner: InnerCompression::Gzip,
//!     };
//!     compress_dump(&reference, &source, "out.mbcr".as_ref(), method)
//! }
//! ```

pub mod cache;
pub mod codec;
pub mod config;
pub mod dump;
pub mod error;
pub mod service;

// Re-exports for convenience
pub use cache::DumpCache;
pub use codec::{compress_dump, decompress_dump, ArtifactHeader, InnerCompression, Method};
pub use config::{Args, Command};
pub use dump::MemoryDump;
pub use error::{DedupError, DedupResult};
pub use service::CommandServer;
