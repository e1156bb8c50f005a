//! In-memory repository.

use bytes::Bytes;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use super::BinaryRepository;

/// Name → bytes map, filled before serving starts and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    files: HashMap<String, Bytes>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, data: impl Into<Bytes>) {
        self.files.insert(name.into(), data.into());
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.insert(name, data);
        self
    }

    /// Load every regular file directly inside `dir`, keyed by file name.
    ///
    /// Subdirectories and files whose names are not valid UTF-8 are skipped.
    pub fn from_dir(dir: &Path) -> io::Result<Self> {
        let mut repository = Self::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                tracing::warn!(path = %entry.path().display(), "skipping file with non UTF-8 name");
                continue;
            };
            let data = fs::read(entry.path())?;
            tracing::debug!(name = %name, size = data.len(), "loaded binary");
            repository.insert(name, data);
        }
        Ok(repository)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Stored names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.files.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl BinaryRepository for MemoryRepository {
    fn lookup(&self, name: &str) -> Option<Bytes> {
        self.files.get(name).cloned()
    }
}
