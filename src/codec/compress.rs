//! Encode path: source page classification and artifact writing.

use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use tracing::{debug, info};

use crate::codec::diff::create_diff;
use crate::codec::inner::compress_body;
use crate::codec::interval::write_interval_list;
use crate::codec::method::{ArtifactHeader, Method};
use crate::codec::pagenr::write_pagenr_list;
use crate::codec::processing_path;
use crate::codec::wire::{put_cstr, put_uint_le};
use crate::dump::MemoryDump;
use crate::error::{DedupError, DedupResult};

/// How each source page is represented in the artifact.
///
/// A page number lands in exactly one table; source pages whose content sits
/// at the same numbers in the reference are left implicit and reconstructed
/// by the reader's same-index fallback.
#[derive(Default)]
struct Classification {
    /// Representative reference page number → source pages filled from it.
    dedups: BTreeMap<u32, BTreeSet<u32>>,
    /// Source page number → diff blob against the same-index reference page.
    diffs: BTreeMap<u32, Vec<u8>>,
    /// Source page number → content (intra deduplication disabled).
    new_pages: BTreeMap<u32, Bytes>,
    /// Distinct new content with its page numbers, keyed by the minimum page
    /// number so the emitted order is stable across runs.
    intra_pages: BTreeMap<u32, (Bytes, BTreeSet<u32>)>,
}

/// Partitions the source pages into dedups, diffs and new pages.
fn classify(refdump: &MemoryDump, src: &MemoryDump, method: Method) -> DedupResult<Classification> {
    let page_size = src.page_size() as usize;
    let mut classes = Classification::default();

    for (content, src_nums) in src.pages() {
        if let Some(ref_nums) = refdump.pages().get(content) {
            // Content exists in the reference: encode only the source page
            // numbers the reference does not already cover.
            let moved: BTreeSet<u32> = src_nums.difference(ref_nums).copied().collect();
            if moved.is_empty() {
                continue;
            }
            if let Some(&rep) = ref_nums.first() {
                classes.dedups.insert(rep, moved);
            }
            continue;
        }

        let mut undiffed = BTreeSet::new();
        for &pagenr in src_nums {
            if method.diffing {
                // Diff against the page at the same index, if the reference
                // has one, and keep the diff only when it beats storing the
                // page outright.
                if let Some(ref_page) = refdump.page(pagenr) {
                    let diff = create_diff(ref_page, content)?;
                    if diff.len() < page_size {
                        classes.diffs.insert(pagenr, diff);
                        continue;
                    }
                }
            }
            if method.intra {
                undiffed.insert(pagenr);
            } else {
                classes.new_pages.insert(pagenr, content.clone());
            }
        }

        if let Some(&min) = undiffed.first() {
            classes.intra_pages.insert(min, (content.clone(), undiffed));
        }
    }

    Ok(classes)
}

/// Serializes a classification into the artifact body.
fn write_body(
    refdump: &MemoryDump,
    classes: &Classification,
    method: Method,
) -> DedupResult<Vec<u8>> {
    let mut body = Vec::new();
    put_cstr(&mut body, refdump.path().as_os_str().as_bytes());

    let dedup_pagenrs: BTreeSet<u32> = classes.dedups.keys().copied().collect();
    write_pagenr_list(&mut body, &dedup_pagenrs)?;
    for nums in classes.dedups.values() {
        write_interval_list(&mut body, nums)?;
    }

    if method.diffing {
        let diff_pagenrs: BTreeSet<u32> = classes.diffs.keys().copied().collect();
        write_pagenr_list(&mut body, &diff_pagenrs)?;
        for blob in classes.diffs.values() {
            body.extend_from_slice(blob);
        }
    }

    if method.intra {
        put_uint_le(&mut body, classes.intra_pages.len() as u64, 4);
        for (_, nums) in classes.intra_pages.values() {
            write_interval_list(&mut body, nums)?;
        }
        for (content, _) in classes.intra_pages.values() {
            body.extend_from_slice(content);
        }
    } else {
        // an empty interval list is unencodable, so the whole section is
        // skipped when there are no new pages
        let new_pagenrs: BTreeSet<u32> = classes.new_pages.keys().copied().collect();
        if !new_pagenrs.is_empty() {
            write_interval_list(&mut body, &new_pagenrs)?;
            for content in classes.new_pages.values() {
                body.extend_from_slice(content);
            }
        }
    }

    Ok(body)
}

/// Compresses `src` against `refdump` into an artifact at `out_path`.
///
/// The artifact is assembled under an `.processing` suffix and renamed into
/// place only once fully written.
pub fn compress_dump(
    refdump: &MemoryDump,
    src: &MemoryDump,
    out_path: &Path,
    method: Method,
) -> DedupResult<()> {
    if refdump.page_size() != src.page_size() {
        return Err(DedupError::PageSizeMismatch {
            path: refdump.path().to_path_buf(),
            cached: refdump.page_size(),
            requested: src.page_size(),
        });
    }

    info!(
        reference = %refdump.path().display(),
        source = %src.path().display(),
        out = %out_path.display(),
        page_size = src.page_size(),
        intra = method.intra,
        diffing = method.diffing,
        inner = %method.inner,
        "compressing dump"
    );

    let classes = classify(refdump, src, method)?;
    debug!(
        dedup_groups = classes.dedups.len(),
        diffed = classes.diffs.len(),
        new = classes.new_pages.len(),
        distinct_new = classes.intra_pages.len(),
        "classified source pages"
    );

    let body = write_body(refdump, &classes, method)?;

    debug!("starting inner compression");
    let compressed = compress_body(&body, method.inner)?;
    debug!(
        body = body.len(),
        compressed = compressed.len(),
        "finished inner compression"
    );

    let header = ArtifactHeader {
        method,
        page_size: src.page_size(),
        uncompressed_size: u64::from(src.page_count()) * u64::from(src.page_size()),
    };

    let mut artifact = header.encode();
    artifact.extend_from_slice(&compressed);

    let processing = processing_path(out_path);
    std::fs::write(&processing, &artifact)
        .map_err(|e| DedupError::io("write", &processing, e))?;

    // replace any previous artifact; removing first is cheaper than
    // overwriting in place
    let _ = std::fs::remove_file(out_path);
    std::fs::rename(&processing, out_path)
        .map_err(|e| DedupError::io("rename", &processing, e))?;

    info!(out = %out_path.display(), bytes = artifact.len(), "finished compressing");
    Ok(())
}
