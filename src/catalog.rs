use crate::models::CatalogEntry;
use crate::store::{self, StoreError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Durable mirror of every designer listing scraped so far, keyed by
/// namespace slug. Append-only across runs: once a namespace is present —
/// even with zero entries — it is never fetched again.
#[derive(Debug)]
pub struct CatalogStore {
    path: PathBuf,
    namespaces: BTreeMap<String, Vec<CatalogEntry>>,
}

impl CatalogStore {
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let namespaces = store::read_json(path)?.unwrap_or_default();
        Ok(Self {
            path: path.to_path_buf(),
            namespaces,
        })
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.namespaces.contains_key(slug)
    }

    pub fn entries(&self, slug: &str) -> Option<&[CatalogEntry]> {
        self.namespaces.get(slug).map(Vec::as_slice)
    }

    pub fn insert(&mut self, slug: &str, entries: Vec<CatalogEntry>) {
        self.namespaces.insert(slug.to_string(), entries);
    }

    pub fn namespace_count(&self) -> usize {
        self.namespaces.len()
    }

    pub fn entry_count(&self) -> usize {
        self.namespaces.values().map(Vec::len).sum()
    }

    pub fn save(&self) -> Result<(), StoreError> {
        store::write_json_atomic(&self.path, &self.namespaces)
    }
}
