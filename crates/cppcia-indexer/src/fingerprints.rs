//! Content-fingerprint cache owned by the incremental builder
//!
//! Lifecycle: loaded from persisted state, read concurrently by pool workers,
//! updated only after a successful merge, invalidated when a parse fails and
//! dropped when a file is removed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use cppcia_core::{normalize_path, Fingerprint};
use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct FingerprintCache {
    entries: DashMap<PathBuf, Fingerprint>,
}

impl FingerprintCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: BTreeMap<PathBuf, Fingerprint>) -> Self {
        let entries = DashMap::with_capacity(map.len());
        for (path, fingerprint) in map {
            entries.insert(normalize_path(&path), fingerprint);
        }
        FingerprintCache { entries }
    }

    pub fn get(&self, path: &Path) -> Option<Fingerprint> {
        self.entries.get(&normalize_path(path)).map(|e| *e.value())
    }

    /// Whether `fingerprint` matches what was last merged for `path`.
    pub fn is_unchanged(&self, path: &Path, fingerprint: Fingerprint) -> bool {
        self.get(path) == Some(fingerprint)
    }

    pub fn record(&self, path: &Path, fingerprint: Fingerprint) {
        self.entries.insert(normalize_path(path), fingerprint);
    }

    /// Forget `path` so the next scan asks the adapter again.
    pub fn invalidate(&self, path: &Path) {
        self.entries.remove(&normalize_path(path));
    }

    /// Sorted copy for persistence.
    pub fn to_map(&self) -> BTreeMap<PathBuf, Fingerprint> {
        self.entries
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
