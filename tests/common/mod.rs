//! Common test utilities.
#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use memdedup::{InnerCompression, Method};
use tempfile::TempDir;

/// Working directory holding dumps and artifacts for one test.
pub struct DumpLab {
    dir: TempDir,
}

impl DumpLab {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Writes pages concatenated into a dump file and returns its path.
    pub fn write_dump(&self, name: &str, pages: &[Vec<u8>]) -> PathBuf {
        let path = self.path(name);
        let data: Vec<u8> = pages.iter().flatten().copied().collect();
        fs::write(&path, data).unwrap();
        path
    }

    pub fn read(&self, name: &str) -> Vec<u8> {
        fs::read(self.path(name)).unwrap()
    }
}

pub fn method(intra: bool, diffing: bool, inner: InnerCompression) -> Method {
    Method {
        intra,
        diffing,
        inner,
    }
}

/// A page of `size` bytes filled with `byte`.
pub fn page(byte: u8, size: usize) -> Vec<u8> {
    vec![byte; size]
}

pub const ALL_INNER: [InnerCompression; 4] = [
    InnerCompression::None,
    InnerCompression::Gzip,
    InnerCompression::Bzip2,
    InnerCompression::Lzma,
];
