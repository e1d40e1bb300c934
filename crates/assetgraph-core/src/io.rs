//! Opening resources referenced by a document.

use crate::error::Result;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

/// Opens files referenced from inside a document.
pub trait ResourceLoader {
    /// Read the resource at `path`. `Ok(None)` means it cannot be opened.
    fn open(&self, path: &str) -> Result<Option<Vec<u8>>>;
}

/// Loads resources from disk, relative to the document's directory.
#[derive(Debug, Clone, Default)]
pub struct FsLoader {
    base_dir: PathBuf,
}

impl FsLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// A loader rooted at the directory containing `document`.
    pub fn for_document(document: &Path) -> Self {
        Self::new(document.parent().unwrap_or_else(|| Path::new("")))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

impl ResourceLoader for FsLoader {
    fn open(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let full = self.base_dir.join(path);
        match std::fs::read(&full) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory resources keyed by path.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    files: IndexMap<String, Vec<u8>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.insert(path, data);
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), data.into());
    }
}

impl ResourceLoader for MemoryLoader {
    fn open(&self, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.files.get(path).cloned())
    }
}

/// A loader that can open nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLoader;

impl ResourceLoader for NoLoader {
    fn open(&self, _path: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_loader() {
        let loader = MemoryLoader::new().with_file("a.bin", vec![1u8, 2, 3]);
        assert_eq!(loader.open("a.bin").unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(loader.open("b.bin").unwrap(), None);
    }

    #[test]
    fn test_fs_loader_missing_file_is_none() {
        let loader = FsLoader::new(std::env::temp_dir());
        assert_eq!(loader.open("assetgraph-no-such-file.bin").unwrap(), None);
    }

    #[test]
    fn test_fs_loader_base_dir() {
        let loader = FsLoader::for_document(Path::new("models/scene.gltf"));
        assert_eq!(loader.base_dir(), Path::new("models"));
    }
}
