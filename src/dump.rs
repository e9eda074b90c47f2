//! Memory dump loading and page indexing.

use bytes::Bytes;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

use crate::error::{DedupError, DedupResult};

/// A memory dump loaded as fixed-size pages.
///
/// The primary index maps page content to the ordered set of page numbers at
/// which it occurs. The inverse index is built lazily because only the decode
/// and diff paths need it; once built it never changes, so concurrent jobs
/// sharing a reference dump can race the initialization safely.
pub struct MemoryDump {
    path: PathBuf,
    page_size: u32,
    page_count: u32,
    page_map: HashMap<Bytes, BTreeSet<u32>>,
    num_to_page: OnceLock<HashMap<u32, Bytes>>,
}

impl MemoryDump {
    /// Reads a dump file in `page_size`-byte chunks and indexes its pages.
    ///
    /// The file size must be a positive multiple of `page_size`.
    pub fn load(path: impl Into<PathBuf>, page_size: u32) -> DedupResult<Self> {
        let path = path.into();
        let data = std::fs::read(&path).map_err(|e| DedupError::io("read", &path, e))?;

        let size = data.len() as u64;
        if page_size == 0 || size == 0 || size % u64::from(page_size) != 0 {
            return Err(DedupError::BadDumpSize {
                path,
                size,
                page_size,
            });
        }
        let page_count = size / u64::from(page_size);
        if page_count > u64::from(u32::MAX) {
            return Err(DedupError::ValueOutOfRange {
                what: "page count",
                value: page_count,
            });
        }

        // Bytes slices share the single file buffer, so duplicate pages cost
        // one map entry and no copies.
        let data = Bytes::from(data);
        let mut page_map: HashMap<Bytes, BTreeSet<u32>> = HashMap::new();
        for pagenr in 0..page_count as u32 {
            let start = pagenr as usize * page_size as usize;
            let page = data.slice(start..start + page_size as usize);
            page_map.entry(page).or_default().insert(pagenr);
        }

        debug!(
            path = %path.display(),
            pages = page_count,
            distinct = page_map.len(),
            "loaded dump"
        );

        Ok(Self {
            path,
            page_size,
            page_count: page_count as u32,
            page_map,
            num_to_page: OnceLock::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Content → ordered page numbers.
    pub fn pages(&self) -> &HashMap<Bytes, BTreeSet<u32>> {
        &self.page_map
    }

    /// Page number → content, built on first use.
    pub fn by_number(&self) -> &HashMap<u32, Bytes> {
        self.num_to_page.get_or_init(|| {
            let mut inverse = HashMap::with_capacity(self.page_count as usize);
            for (content, nums) in &self.page_map {
                for &pagenr in nums {
                    inverse.insert(pagenr, content.clone());
                }
            }
            inverse
        })
    }

    /// Looks up one page by number.
    pub fn page(&self, pagenr: u32) -> Option<&Bytes> {
        self.by_number().get(&pagenr)
    }
}
