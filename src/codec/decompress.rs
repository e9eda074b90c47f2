//! Decode path: artifact parsing and page reconstruction.

use bytes::Bytes;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::io::{BufWriter, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::cache::DumpCache;
use crate::codec::diff::{apply_diff, read_diff, Patch};
use crate::codec::inner::decompress_body;
use crate::codec::interval::read_interval_list;
use crate::codec::method::ArtifactHeader;
use crate::codec::pagenr::read_pagenr_list;
use crate::codec::processing_path;
use crate::codec::wire::ByteReader;
use crate::dump::MemoryDump;
use crate::error::{DedupError, DedupResult};

/// Parsed body tables, ready for page-by-page reconstruction.
struct ParsedBody {
    ref_path: PathBuf,
    /// Source page number → reference page number to copy.
    fills: HashMap<u32, u32>,
    /// Source page number → patches against the same-index reference page.
    diffs: HashMap<u32, Vec<Patch>>,
    /// Source page number → new content.
    new_pages: HashMap<u32, Bytes>,
}

fn parse_body(body: &[u8], header: &ArtifactHeader) -> DedupResult<ParsedBody> {
    let mut r = ByteReader::new(body);
    let page_size = header.page_size as usize;

    let ref_path_bytes = r.read_cstr("reference dump path")?;
    if ref_path_bytes.is_empty() {
        return Err(DedupError::EmptyRefPath);
    }
    let ref_path = PathBuf::from(OsStr::from_bytes(ref_path_bytes));

    // deduplication fills: one interval list per representative
    let mut fills = HashMap::new();
    for rep in read_pagenr_list(&mut r)? {
        for (left, right) in read_interval_list(&mut r)? {
            for pagenr in left..=right {
                fills.insert(pagenr, rep);
            }
        }
    }

    let mut diffs = HashMap::new();
    if header.method.diffing {
        for pagenr in read_pagenr_list(&mut r)? {
            diffs.insert(pagenr, read_diff(&mut r)?);
        }
    }

    let mut new_pages = HashMap::new();
    if header.method.intra {
        let distinct = r.read_u32_le("distinct new page count")?;
        // every interval list consumes at least one byte, so the remaining
        // input bounds any honest count; cap the reservation rather than
        // trust the field
        let mut interval_lists = Vec::with_capacity((distinct as usize).min(r.remaining()));
        for _ in 0..distinct {
            interval_lists.push(read_interval_list(&mut r)?);
        }
        for intervals in interval_lists {
            let content = Bytes::copy_from_slice(r.read_exact(page_size, "new page content")?);
            for (left, right) in intervals {
                for pagenr in left..=right {
                    new_pages.insert(pagenr, content.clone());
                }
            }
        }
    } else if r.remaining() > 0 {
        // the whole section is absent when the source had no new pages
        for (left, right) in read_interval_list(&mut r)? {
            for pagenr in left..=right {
                let content = Bytes::copy_from_slice(r.read_exact(page_size, "new page content")?);
                new_pages.insert(pagenr, content);
            }
        }
    }

    Ok(ParsedBody {
        ref_path,
        fills,
        diffs,
        new_pages,
    })
}

fn ref_page<'a>(refdump: &'a MemoryDump, pagenr: u32) -> DedupResult<&'a Bytes> {
    refdump.page(pagenr).ok_or_else(|| DedupError::PageOutOfRange {
        pagenr,
        path: refdump.path().to_path_buf(),
    })
}

/// Reconstructs the source dump from an artifact and the reference dump it
/// names.
///
/// The output is written under an `.processing` suffix and renamed into place
/// once complete.
pub fn decompress_dump(input: &Path, out_path: &Path, cache: &DumpCache) -> DedupResult<()> {
    info!(
        input = %input.display(),
        out = %out_path.display(),
        "decompressing dump"
    );

    let raw = std::fs::read(input).map_err(|e| DedupError::io("read", input, e))?;
    let mut r = ByteReader::new(&raw);
    let header = ArtifactHeader::decode(&mut r)?;

    if header.page_size == 0
        || header.uncompressed_size == 0
        || header.uncompressed_size % u64::from(header.page_size) != 0
    {
        return Err(DedupError::BadUncompressedSize {
            size: header.uncompressed_size,
            page_size: header.page_size,
        });
    }
    let page_count = header.uncompressed_size / u64::from(header.page_size);
    if page_count > u64::from(u32::MAX) {
        return Err(DedupError::ValueOutOfRange {
            what: "page count",
            value: page_count,
        });
    }

    debug!(
        method = %header.method.to_method_string(),
        page_size = header.page_size,
        uncompressed_size = header.uncompressed_size,
        "parsed artifact header"
    );

    let compressed = r.read_exact(r.remaining(), "artifact body")?;
    let body = decompress_body(compressed, header.method.inner)?;
    let parsed = parse_body(&body, &header)?;

    debug!(reference = %parsed.ref_path.display(), "loading reference dump");
    let refdump = cache.get(&parsed.ref_path, header.page_size)?;

    let processing = processing_path(out_path);
    let file = std::fs::File::create(&processing)
        .map_err(|e| DedupError::io("create", &processing, e))?;
    let mut out = BufWriter::new(file);

    let write_err = |e| DedupError::io("write", &processing, e);
    for pagenr in 0..page_count as u32 {
        if let Some(&rep) = parsed.fills.get(&pagenr) {
            // deduplicated against a reference page elsewhere
            out.write_all(ref_page(&refdump, rep)?).map_err(write_err)?;
        } else if let Some(patches) = parsed.diffs.get(&pagenr) {
            let page = apply_diff(ref_page(&refdump, pagenr)?, patches)?;
            out.write_all(&page).map_err(write_err)?;
        } else if let Some(content) = parsed.new_pages.get(&pagenr) {
            out.write_all(content).map_err(write_err)?;
        } else {
            // implicit deduplication at the same page number
            out.write_all(ref_page(&refdump, pagenr)?).map_err(write_err)?;
        }
    }

    out.into_inner()
        .map_err(|e| DedupError::io("flush", &processing, e.into()))?
        .sync_all()
        .map_err(|e| DedupError::io("flush", &processing, e))?;

    let _ = std::fs::remove_file(out_path);
    std::fs::rename(&processing, out_path)
        .map_err(|e| DedupError::io("rename", &processing, e))?;

    info!(out = %out_path.display(), "finished decompressing");
    Ok(())
}
