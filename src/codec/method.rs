//! Artifact header and method string.
//!
//! The header is plaintext even when the body is inner-compressed:
//! `"MBCR\0"`, the method string, a NUL, major and minor version (`u16` LE),
//! page size (`u32` LE) and the uncompressed source size (`u64` LE). The
//! method string concatenates `"interdedup"`, an optional `"nointra"`, an
//! optional `"delta"` and the inner compression token with no separators.

use std::fmt;

use crate::codec::wire::{put_cstr, put_uint_le, ByteReader};
use crate::error::{DedupError, DedupResult};

/// Leading magic bytes of every artifact.
pub const MAGIC: &[u8] = b"MBCR";

/// Format version written by this encoder.
pub const MAJOR_VERSION: u16 = 2;
pub const MINOR_VERSION: u16 = 1;

/// Inner byte-stream compressor wrapped around the artifact body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InnerCompression {
    Lzma,
    Gzip,
    Bzip2,
    None,
}

impl InnerCompression {
    /// Token used inside the method string; empty for no compression.
    pub fn method_token(self) -> &'static str {
        match self {
            InnerCompression::Gzip => "gzip",
            InnerCompression::Lzma => "7zip",
            InnerCompression::Bzip2 => "bzip2",
            InnerCompression::None => "",
        }
    }

    /// Parses the CLI argument form (`gzip`, `bzip2`, `7zip`, `0`).
    pub fn from_cli_token(token: &str) -> DedupResult<Self> {
        match token {
            "gzip" => Ok(InnerCompression::Gzip),
            "bzip2" => Ok(InnerCompression::Bzip2),
            "7zip" => Ok(InnerCompression::Lzma),
            "0" => Ok(InnerCompression::None),
            other => Err(DedupError::UnknownCompressor(other.to_string())),
        }
    }

    /// Parses the one-byte service protocol form.
    pub fn from_wire(byte: u8) -> DedupResult<Self> {
        match byte {
            0 => Ok(InnerCompression::Lzma),
            1 => Ok(InnerCompression::Gzip),
            2 => Ok(InnerCompression::Bzip2),
            3 => Ok(InnerCompression::None),
            other => Err(DedupError::BadRequest(format!(
                "invalid inner compression byte {other:#04x}"
            ))),
        }
    }
}

impl fmt::Display for InnerCompression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InnerCompression::None => f.write_str("none"),
            other => f.write_str(other.method_token()),
        }
    }
}

/// Encode-time options, recoverable from the method string on decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Method {
    pub intra: bool,
    pub diffing: bool,
    pub inner: InnerCompression,
}

impl Method {
    /// Renders the method string.
    pub fn to_method_string(self) -> String {
        let mut s = String::from("interdedup");
        if !self.intra {
            s.push_str("nointra");
        }
        if self.diffing {
            s.push_str("delta");
        }
        s.push_str(self.inner.method_token());
        s
    }

    /// Parses a method string back into options.
    pub fn parse(method: &str) -> DedupResult<Self> {
        let mut rest = method
            .strip_prefix("interdedup")
            .ok_or_else(|| DedupError::BadMethod(method.to_string()))?;

        let intra = match rest.strip_prefix("nointra") {
            Some(stripped) => {
                rest = stripped;
                false
            }
            None => true,
        };

        let diffing = match rest.strip_prefix("delta") {
            Some(stripped) => {
                rest = stripped;
                true
            }
            None => false,
        };

        let inner = match rest {
            "7zip" => InnerCompression::Lzma,
            "gzip" => InnerCompression::Gzip,
            "bzip2" => InnerCompression::Bzip2,
            "" => InnerCompression::None,
            _ => return Err(DedupError::BadMethod(method.to_string())),
        };

        Ok(Self {
            intra,
            diffing,
            inner,
        })
    }
}

/// Parsed artifact header.
#[derive(Debug, Clone)]
pub struct ArtifactHeader {
    pub method: Method,
    pub page_size: u32,
    pub uncompressed_size: u64,
}

impl ArtifactHeader {
    /// Serializes the header.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_cstr(&mut out, MAGIC);
        put_cstr(&mut out, self.method.to_method_string().as_bytes());
        put_uint_le(&mut out, u64::from(MAJOR_VERSION), 2);
        put_uint_le(&mut out, u64::from(MINOR_VERSION), 2);
        put_uint_le(&mut out, u64::from(self.page_size), 4);
        put_uint_le(&mut out, self.uncompressed_size, 8);
        out
    }

    /// Parses the header, leaving the reader positioned at the body.
    pub fn decode(r: &mut ByteReader<'_>) -> DedupResult<Self> {
        let magic = r.read_cstr("magic number")?;
        if magic != MAGIC {
            return Err(DedupError::BadMagic);
        }

        let method_bytes = r.read_cstr("method string")?;
        let method_str = std::str::from_utf8(method_bytes)
            .map_err(|_| DedupError::BadMethod(String::from_utf8_lossy(method_bytes).into_owned()))?;
        let method = Method::parse(method_str)?;

        let major = r.read_u16_le("major version")?;
        let _minor = r.read_u16_le("minor version")?;
        if major != MAJOR_VERSION {
            return Err(DedupError::UnsupportedVersion(major));
        }

        let page_size = r.read_u32_le("page size")?;
        let uncompressed_size = r.read_u64_le("uncompressed size")?;

        Ok(Self {
            method,
            page_size,
            uncompressed_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_string_grammar() {
        let m = Method {
            intra: true,
            diffing: false,
            inner: InnerCompression::None,
        };
        assert_eq!(m.to_method_string(), "interdedup");

        let m = Method {
            intra: false,
            diffing: true,
            inner: InnerCompression::Gzip,
        };
        assert_eq!(m.to_method_string(), "interdedupnointradeltagzip");

        let m = Method {
            intra: true,
            diffing: true,
            inner: InnerCompression::Lzma,
        };
        assert_eq!(m.to_method_string(), "interdedupdelta7zip");
    }

    #[test]
    fn method_parse_round_trips() {
        for intra in [false, true] {
            for diffing in [false, true] {
                for inner in [
                    InnerCompression::Lzma,
                    InnerCompression::Gzip,
                    InnerCompression::Bzip2,
                    InnerCompression::None,
                ] {
                    let m = Method {
                        intra,
                        diffing,
                        inner,
                    };
                    assert_eq!(Method::parse(&m.to_method_string()).unwrap(), m);
                }
            }
        }
    }

    #[test]
    fn malformed_methods_are_rejected() {
        assert!(Method::parse("intradedup").is_err());
        assert!(Method::parse("interdedupzstd").is_err());
        assert!(Method::parse("interdedupdeltanointra").is_err());
    }

    #[test]
    fn header_round_trips() {
        let header = ArtifactHeader {
            method: Method {
                intra: false,
                diffing: true,
                inner: InnerCompression::Bzip2,
            },
            page_size: 4096,
            uncompressed_size: 1 << 24,
        };

        let bytes = header.encode();
        let mut r = ByteReader::new(&bytes);
        let decoded = ArtifactHeader::decode(&mut r).unwrap();
        assert_eq!(r.remaining(), 0);
        assert_eq!(decoded.method, header.method);
        assert_eq!(decoded.page_size, 4096);
        assert_eq!(decoded.uncompressed_size, 1 << 24);
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let mut bytes = ArtifactHeader {
            method: Method {
                intra: true,
                diffing: false,
                inner: InnerCompression::None,
            },
            page_size: 8,
            uncompressed_size: 16,
        }
        .encode();
        bytes[0] = b'X';

        let mut r = ByteReader::new(&bytes);
        assert!(matches!(
            ArtifactHeader::decode(&mut r),
            Err(DedupError::BadMagic)
        ));
    }

    #[test]
    fn future_major_version_is_refused() {
        let mut bytes = ArtifactHeader {
            method: Method {
                intra: true,
                diffing: false,
                inner: InnerCompression::None,
            },
            page_size: 8,
            uncompressed_size: 16,
        }
        .encode();
        // major version sits right after the two NUL-terminated strings
        let ver_at = bytes.iter().position(|b| *b == 0).unwrap() + 1
            + bytes[MAGIC.len() + 1..]
                .iter()
                .position(|b| *b == 0)
                .unwrap()
            + 1;
        bytes[ver_at] = 3;

        let mut r = ByteReader::new(&bytes);
        assert!(matches!(
            ArtifactHeader::decode(&mut r),
            Err(DedupError::UnsupportedVersion(3))
        ));
    }
}
