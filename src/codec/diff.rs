//! Byte-patch diffs between a reference page and a source page.
//!
//! A diff is a 2-byte little-endian patch count followed by patches. Each
//! patch is a header plus raw replacement bytes; the header encodes the byte
//! length and the gap since the end of the previous patch (absolute for the
//! first) in either two bytes (MSB of the first byte clear) or three bytes
//! (MSB set, `(len - 1) << 12 | offset` big-endian). Patches never exceed
//! 2048 bytes; longer replacement runs are split into chunks.

use crate::codec::wire::{put_uint_be, put_uint_le, ByteReader};
use crate::error::{DedupError, DedupResult};

/// Upper bound on the byte run carried by a single patch.
pub const MAX_PATCH_LEN: usize = 2048;

/// One replacement run inside a diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    /// Gap since the end of the previous patch; absolute offset for the first.
    pub offset: u32,
    pub bytes: Vec<u8>,
}

/// Scans two equal-length pages and produces the patch list turning
/// `ref_page` into `src_page`.
///
/// A streak of up to two identical bytes between mismatches is folded into
/// the running patch: carrying the two bytes as payload is cheaper than the
/// header of a fresh patch. A trailing identical streak is dropped entirely.
fn generate_patches(ref_page: &[u8], src_page: &[u8]) -> Vec<Patch> {
    debug_assert_eq!(ref_page.len(), src_page.len());

    let mut patches: Vec<Patch> = Vec::new();
    // start index of the most recent patch, for gap computation
    let mut prev_start = 0usize;
    // identical bytes seen since the last mismatch
    let mut same_run = 0usize;

    for i in 0..src_page.len() {
        if ref_page[i] == src_page[i] {
            same_run += 1;
            continue;
        }

        match patches.last_mut() {
            Some(last) if same_run <= 2 => {
                last.bytes.extend_from_slice(&src_page[i - same_run..i]);
                last.bytes.push(src_page[i]);
            }
            _ => {
                let offset = if patches.is_empty() {
                    i
                } else {
                    i - prev_start - patches.last().map_or(0, |p| p.bytes.len())
                };
                prev_start = i;
                patches.push(Patch {
                    offset: offset as u32,
                    bytes: vec![src_page[i]],
                });
            }
        }
        same_run = 0;
    }

    // split over-long runs; only the first chunk keeps the offset
    let mut chunked = Vec::with_capacity(patches.len());
    for patch in patches {
        if patch.bytes.len() <= MAX_PATCH_LEN {
            chunked.push(patch);
            continue;
        }
        let mut offset = patch.offset;
        for chunk in patch.bytes.chunks(MAX_PATCH_LEN) {
            chunked.push(Patch {
                offset,
                bytes: chunk.to_vec(),
            });
            offset = 0;
        }
    }
    chunked
}

/// Encodes a patch header for `len` bytes at `offset`.
fn write_patch_header(out: &mut Vec<u8>, offset: u32, len: usize) -> DedupResult<()> {
    debug_assert!(len >= 1);
    let len_field = (len - 1) as u32;

    if offset < 256 && len_field < 128 {
        put_uint_be(out, len_field, 1);
        put_uint_be(out, offset, 1);
        return Ok(());
    }

    if offset >= 1 << 12 {
        return Err(DedupError::ValueOutOfRange {
            what: "patch offset",
            value: u64::from(offset),
        });
    }
    if len_field >= 1 << 12 {
        return Err(DedupError::ValueOutOfRange {
            what: "patch length",
            value: u64::from(len_field),
        });
    }

    let word = (len_field << 12) | offset;
    put_uint_be(out, ((word >> 16) & 0xFF) | 0x80, 1);
    put_uint_be(out, word & 0xFFFF, 2);
    Ok(())
}

/// Produces the full diff blob for `ref_page -> src_page`.
pub fn create_diff(ref_page: &[u8], src_page: &[u8]) -> DedupResult<Vec<u8>> {
    let patches = generate_patches(ref_page, src_page);
    if patches.len() > u16::MAX as usize {
        return Err(DedupError::ValueOutOfRange {
            what: "patch count",
            value: patches.len() as u64,
        });
    }

    let mut diff = Vec::new();
    put_uint_le(&mut diff, patches.len() as u64, 2);
    for patch in &patches {
        write_patch_header(&mut diff, patch.offset, patch.bytes.len())?;
        diff.extend_from_slice(&patch.bytes);
    }
    Ok(diff)
}

/// Parses one diff blob from the reader.
pub fn read_diff(r: &mut ByteReader<'_>) -> DedupResult<Vec<Patch>> {
    let count = r.read_u16_le("patch count")?;
    let mut patches = Vec::with_capacity(count as usize);

    for _ in 0..count {
        let first = r.read_u8("patch header")?;
        let (len, offset) = if first & 0x80 != 0 {
            let rest = r.read_exact(2, "patch header")?;
            let word = (u32::from(first & 0x7F) << 16)
                | (u32::from(rest[0]) << 8)
                | u32::from(rest[1]);
            ((word >> 12) as usize + 1, word & 0xFFF)
        } else {
            let offset = r.read_u8("patch header")?;
            (usize::from(first) + 1, u32::from(offset))
        };

        if len > MAX_PATCH_LEN {
            return Err(DedupError::PatchTooLong(len));
        }
        let bytes = r.read_exact(len, "patch bytes")?.to_vec();
        patches.push(Patch { offset, bytes });
    }
    Ok(patches)
}

/// Rebuilds a source page by applying `patches` on top of `ref_page`.
pub fn apply_diff(ref_page: &[u8], patches: &[Patch]) -> DedupResult<Vec<u8>> {
    let mut page = ref_page.to_vec();
    let mut cursor = 0usize;

    for patch in patches {
        cursor += patch.offset as usize;
        let end = cursor + patch.bytes.len();
        if end > page.len() {
            return Err(DedupError::DiffOverrun {
                end,
                page_size: page.len() as u32,
            });
        }
        page[cursor..end].copy_from_slice(&patch.bytes);
        cursor = end;
    }
    Ok(page)
}
