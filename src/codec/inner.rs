//! Inner compression filters around the artifact body.
//!
//! The codec treats these as opaque byte-stream filters; the method string
//! records which one was used so the reader can pick the matching
//! decompressor. `7zip` artifacts carry an xz/LZMA stream.

use std::io::{Read, Write};

use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

use crate::codec::method::InnerCompression;
use crate::error::{DedupError, DedupResult};

fn compress_err(source: std::io::Error) -> DedupError {
    DedupError::Inner {
        op: "compression",
        source,
    }
}

fn decompress_err(source: std::io::Error) -> DedupError {
    DedupError::Inner {
        op: "decompression",
        source,
    }
}

/// Runs the chosen compressor over the body.
pub fn compress_body(body: &[u8], inner: InnerCompression) -> DedupResult<Vec<u8>> {
    match inner {
        InnerCompression::None => Ok(body.to_vec()),
        InnerCompression::Gzip => {
            let mut enc = GzEncoder::new(Vec::new(), flate2::Compression::default());
            enc.write_all(body).map_err(compress_err)?;
            enc.finish().map_err(compress_err)
        }
        InnerCompression::Bzip2 => {
            let mut enc = BzEncoder::new(Vec::new(), bzip2::Compression::default());
            enc.write_all(body).map_err(compress_err)?;
            enc.finish().map_err(compress_err)
        }
        InnerCompression::Lzma => {
            let mut enc = XzEncoder::new(Vec::new(), 6);
            enc.write_all(body).map_err(compress_err)?;
            enc.finish().map_err(compress_err)
        }
    }
}

/// Runs the matching decompressor over a compressed body.
pub fn decompress_body(body: &[u8], inner: InnerCompression) -> DedupResult<Vec<u8>> {
    let mut out = Vec::new();
    match inner {
        InnerCompression::None => out.extend_from_slice(body),
        InnerCompression::Gzip => {
            GzDecoder::new(body)
                .read_to_end(&mut out)
                .map_err(decompress_err)?;
        }
        InnerCompression::Bzip2 => {
            BzDecoder::new(body)
                .read_to_end(&mut out)
                .map_err(decompress_err)?;
        }
        InnerCompression::Lzma => {
            XzDecoder::new(body)
                .read_to_end(&mut out)
                .map_err(decompress_err)?;
        }
    }
    Ok(out)
}
