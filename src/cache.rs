//! Shared cache of loaded reference dumps.
//!
//! Service-mode jobs that compress against the same reference share one
//! loaded [`MemoryDump`]. Entries are immutable once inserted, so a dump can
//! be handed to concurrent jobs as a plain `Arc` with no further locking.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::dump::MemoryDump;
use crate::error::{DedupError, DedupResult};

/// Path-keyed registry of loaded reference dumps.
#[derive(Default)]
pub struct DumpCache {
    dumps: DashMap<PathBuf, Arc<MemoryDump>>,
}

impl DumpCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached dump for `path`, loading it on a miss.
    ///
    /// The load happens outside the map lock; when two jobs miss at the same
    /// time both load, and the first insert wins.
    pub fn get(&self, path: &Path, page_size: u32) -> DedupResult<Arc<MemoryDump>> {
        if let Some(entry) = self.dumps.get(path) {
            let dump = Arc::clone(&entry);
            drop(entry);
            if dump.page_size() != page_size {
                return Err(DedupError::PageSizeMismatch {
                    path: path.to_path_buf(),
                    cached: dump.page_size(),
                    requested: page_size,
                });
            }
            debug!(path = %path.display(), "reference dump already loaded");
            return Ok(dump);
        }

        let dump = Arc::new(MemoryDump::load(path, page_size)?);
        let entry = self.dumps.entry(path.to_path_buf()).or_insert(dump);
        let dump = Arc::clone(&entry);
        // the entry guard holds a shard lock; release it before len() takes
        // read locks on every shard
        drop(entry);
        debug!(
            path = %path.display(),
            cached = self.dumps.len(),
            "added reference dump"
        );
        Ok(dump)
    }

    /// Loads `path` and inserts it, replacing any existing entry.
    pub fn add(&self, path: &Path, page_size: u32) -> DedupResult<()> {
        let dump = Arc::new(MemoryDump::load(path, page_size)?);
        self.dumps.insert(path.to_path_buf(), dump);
        debug!(
            path = %path.display(),
            cached = self.dumps.len(),
            "replaced reference dump"
        );
        Ok(())
    }

    /// Removes the entry for `path` if present.
    pub fn remove(&self, path: &Path) -> bool {
        let removed = self.dumps.remove(path).is_some();
        debug!(
            path = %path.display(),
            cached = self.dumps.len(),
            "removed reference dump"
        );
        removed
    }

    pub fn len(&self) -> usize {
        self.dumps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dumps.is_empty()
    }
}
