//! Wire protocol of the command socket.
//!
//! Each request frame starts with a length byte `L` followed by exactly
//! `L * 8` bytes: a message id, an opcode, the opcode's arguments and NUL
//! padding up to the 8-byte boundary. The server acknowledges every frame
//! with `[msg_id, 0x01]` on acceptance or `[msg_id, 0x00]` on rejection.

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

use crate::codec::method::{InnerCompression, Method};
use crate::codec::wire::ByteReader;
use crate::error::{DedupError, DedupResult};

pub const OP_ADD_REFERENCE: u8 = 0x00;
pub const OP_COMPRESS: u8 = 0x01;
pub const OP_DECOMPRESS: u8 = 0x02;
pub const OP_DELETE_REFERENCE: u8 = 0x04;

/// ACK payload values.
pub const ACK_OK: u8 = 0x01;
pub const ACK_FAIL: u8 = 0x00;

/// A decoded service request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    AddReference {
        path: PathBuf,
        page_size: u32,
    },
    Compress {
        reference: PathBuf,
        source: PathBuf,
        out: PathBuf,
        page_size: u32,
        method: Method,
    },
    Decompress {
        input: PathBuf,
        out: PathBuf,
    },
    DeleteReference {
        path: PathBuf,
    },
}

fn bad_request(what: &str) -> DedupError {
    DedupError::BadRequest(what.to_string())
}

fn read_path(r: &mut ByteReader<'_>, what: &'static str) -> DedupResult<PathBuf> {
    let bytes = r.read_cstr(what).map_err(|_| bad_request(what))?;
    if bytes.is_empty() {
        return Err(bad_request(what));
    }
    Ok(PathBuf::from(OsStr::from_bytes(bytes)))
}

impl Request {
    /// Parses the frame bytes following the message id (opcode + arguments;
    /// trailing NUL padding is ignored).
    pub fn parse(payload: &[u8]) -> DedupResult<Self> {
        let mut r = ByteReader::new(payload);
        let opcode = r.read_u8("opcode").map_err(|_| bad_request("missing opcode"))?;

        match opcode {
            OP_ADD_REFERENCE => {
                let path = read_path(&mut r, "reference path")?;
                let page_size = r
                    .read_u32_le("page size")
                    .map_err(|_| bad_request("page size"))?;
                Ok(Request::AddReference { path, page_size })
            }
            OP_COMPRESS => {
                let reference = read_path(&mut r, "reference path")?;
                let source = read_path(&mut r, "source path")?;
                let out = read_path(&mut r, "output path")?;
                let page_size = r
                    .read_u32_le("page size")
                    .map_err(|_| bad_request("page size"))?;
                let intra = r.read_u8("intra flag").map_err(|_| bad_request("intra flag"))?;
                let diffing = r
                    .read_u8("diffing flag")
                    .map_err(|_| bad_request("diffing flag"))?;
                let inner = r
                    .read_u8("inner compression")
                    .map_err(|_| bad_request("inner compression"))?;

                Ok(Request::Compress {
                    reference,
                    source,
                    out,
                    page_size,
                    method: Method {
                        intra: intra == 1,
                        diffing: diffing == 1,
                        inner: InnerCompression::from_wire(inner)?,
                    },
                })
            }
            OP_DECOMPRESS => {
                let input = read_path(&mut r, "input path")?;
                let out = read_path(&mut r, "output path")?;
                Ok(Request::Decompress { input, out })
            }
            OP_DELETE_REFERENCE => {
                let path = read_path(&mut r, "reference path")?;
                Ok(Request::DeleteReference { path })
            }
            other => Err(DedupError::BadRequest(format!(
                "unknown opcode {other:#04x}"
            ))),
        }
    }
}

/// Builds a complete request frame, NUL-padded to the 8-byte boundary the
/// length byte requires. Used by clients and tests.
pub fn encode_frame(msg_id: u8, opcode: u8, args: &[u8]) -> Vec<u8> {
    let unpadded = 2 + args.len(); // msg id + opcode + args
    let len_units = unpadded.div_ceil(8);

    let mut frame = Vec::with_capacity(1 + len_units * 8);
    frame.push(len_units as u8);
    frame.push(msg_id);
    frame.push(opcode);
    frame.extend_from_slice(args);
    frame.resize(1 + len_units * 8, 0);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::wire::{put_cstr, put_uint_le};

    #[test]
    fn parses_add_reference() {
        let mut args = Vec::new();
        put_cstr(&mut args, b"/dumps/ref.bin");
        put_uint_le(&mut args, 4096, 4);

        let frame = encode_frame(7, OP_ADD_REFERENCE, &args);
        assert_eq!((frame.len() - 1) % 8, 0);

        let req = Request::parse(&frame[2..]).unwrap();
        assert_eq!(
            req,
            Request::AddReference {
                path: PathBuf::from("/dumps/ref.bin"),
                page_size: 4096,
            }
        );
    }

    #[test]
    fn parses_compress_with_method() {
        let mut args = Vec::new();
        put_cstr(&mut args, b"/dumps/ref.bin");
        put_cstr(&mut args, b"/dumps/src.bin");
        put_cstr(&mut args, b"/dumps/out.mbcr");
        put_uint_le(&mut args, 4096, 4);
        args.push(1); // intra
        args.push(0); // diffing
        args.push(2); // bzip2

        let frame = encode_frame(1, OP_COMPRESS, &args);
        let req = Request::parse(&frame[2..]).unwrap();

        match req {
            Request::Compress {
                page_size, method, ..
            } => {
                assert_eq!(page_size, 4096);
                assert!(method.intra);
                assert!(!method.diffing);
                assert_eq!(method.inner, InnerCompression::Bzip2);
            }
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn parses_decompress_and_delete() {
        let mut args = Vec::new();
        put_cstr(&mut args, b"/dumps/out.mbcr");
        put_cstr(&mut args, b"/dumps/restored.bin");
        let frame = encode_frame(2, OP_DECOMPRESS, &args);
        assert!(matches!(
            Request::parse(&frame[2..]).unwrap(),
            Request::Decompress { .. }
        ));

        let mut args = Vec::new();
        put_cstr(&mut args, b"/dumps/ref.bin");
        let frame = encode_frame(3, OP_DELETE_REFERENCE, &args);
        assert!(matches!(
            Request::parse(&frame[2..]).unwrap(),
            Request::DeleteReference { .. }
        ));
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        let frame = encode_frame(9, 0x03, &[]);
        assert!(matches!(
            Request::parse(&frame[2..]),
            Err(DedupError::BadRequest(_))
        ));
    }

    #[test]
    fn invalid_inner_byte_is_rejected() {
        let mut args = Vec::new();
        put_cstr(&mut args, b"/r");
        put_cstr(&mut args, b"/s");
        put_cstr(&mut args, b"/o");
        put_uint_le(&mut args, 8, 4);
        args.extend_from_slice(&[0, 0, 9]);

        let frame = encode_frame(4, OP_COMPRESS, &args);
        assert!(matches!(
            Request::parse(&frame[2..]),
            Err(DedupError::BadRequest(_))
        ));
    }
}
