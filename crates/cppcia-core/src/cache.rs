//! Persisted graph state between runs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::graph::GraphStore;
use crate::model::Fingerprint;

/// Default cache directory under the analysed root: .cppcia/
pub const CACHE_DIR: &str = ".cppcia";

/// Graph state file inside the cache directory
pub const STATE_FILE: &str = "graph.bin";

/// Bumped whenever the encoded layout changes.
pub const FORMAT_VERSION: u32 = 1;

/// Everything needed to resume incremental indexing without re-parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Must stay the first field; read alone to reject stale layouts.
    pub format_version: u32,
    /// RFC 3339 timestamp.
    pub saved_at: String,
    pub store: GraphStore,
    /// Content fingerprint per indexed path.
    pub fingerprints: BTreeMap<PathBuf, Fingerprint>,
}

impl PersistedState {
    pub fn new(store: GraphStore, fingerprints: BTreeMap<PathBuf, Fingerprint>) -> Self {
        PersistedState {
            format_version: FORMAT_VERSION,
            saved_at: chrono::Utc::now().to_rfc3339(),
            store,
            fingerprints,
        }
    }
}

/// Default cache directory for a root.
pub fn cache_dir(root: &Path) -> PathBuf {
    root.join(CACHE_DIR)
}

/// State file inside a cache directory.
pub fn state_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(STATE_FILE)
}

/// Ensure cache directory exists
pub fn ensure_cache_dir(cache_dir: &Path) -> std::io::Result<()> {
    if !cache_dir.exists() {
        std::fs::create_dir_all(cache_dir)?;
    }
    Ok(())
}

/// Write the state atomically: temp file, then rename.
pub fn save_state(cache_dir: &Path, state: &PersistedState) -> Result<()> {
    ensure_cache_dir(cache_dir)?;
    let path = state_path(cache_dir);
    let temp_path = cache_dir.join(format!(".{}.tmp", STATE_FILE));

    let bytes = bincode::serialize(state)?;
    std::fs::write(&temp_path, &bytes)?;
    std::fs::rename(&temp_path, &path)?;

    tracing::debug!(
        path = %path.display(),
        bytes = bytes.len(),
        files = state.store.file_count(),
        "Graph state saved"
    );
    Ok(())
}

/// Load the state, or `None` when absent or written by another format version.
pub fn load_state(cache_dir: &Path) -> Result<Option<PersistedState>> {
    let path = state_path(cache_dir);
    if !path.exists() {
        return Ok(None);
    }

    let bytes = std::fs::read(&path)?;
    let version: u32 = bincode::deserialize(&bytes)?;
    if version != FORMAT_VERSION {
        tracing::warn!(
            path = %path.display(),
            found = version,
            expected = FORMAT_VERSION,
            "Ignoring graph state from another format version"
        );
        return Ok(None);
    }

    let state: PersistedState = bincode::deserialize(&bytes)?;
    tracing::debug!(
        path = %path.display(),
        saved_at = %state.saved_at,
        files = state.store.file_count(),
        "Graph state loaded"
    );
    Ok(Some(state))
}

/// Remove the persisted state. Other files in the cache directory (such as
/// facts documents) are left alone.
pub fn clear_cache(cache_dir: &Path) -> std::io::Result<()> {
    let path = state_path(cache_dir);
    if path.exists() {
        std::fs::remove_file(&path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::FileFacts;
    use tempfile::TempDir;

    #[test]
    fn test_missing_state_loads_as_none() {
        let dir = TempDir::new().unwrap();
        assert!(load_state(&cache_dir(dir.path())).unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let cache = cache_dir(dir.path());

        let mut store = GraphStore::new();
        store.upsert_file(&FileFacts::new("a.h", Fingerprint::of(b"a")));
        let fingerprints = [(PathBuf::from("a.h"), Fingerprint::of(b"a"))].into_iter().collect();
        let state = PersistedState::new(store, fingerprints);

        save_state(&cache, &state).unwrap();
        assert!(state_path(&cache).exists());
        assert!(!cache.join(format!(".{}.tmp", STATE_FILE)).exists());

        let loaded = load_state(&cache).unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_version_mismatch_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let cache = cache_dir(dir.path());
        let mut state = PersistedState::new(GraphStore::new(), BTreeMap::new());
        state.format_version = FORMAT_VERSION + 1;
        save_state(&cache, &state).unwrap();

        assert!(load_state(&cache).unwrap().is_none());
    }

    #[test]
    fn test_clear_cache() {
        let dir = TempDir::new().unwrap();
        let cache = cache_dir(dir.path());
        save_state(&cache, &PersistedState::new(GraphStore::new(), BTreeMap::new())).unwrap();

        std::fs::write(cache.join("keep.json"), "{}").unwrap();

        clear_cache(&cache).unwrap();
        assert!(!state_path(&cache).exists());
        assert!(cache.join("keep.json").exists());
        assert!(load_state(&cache).unwrap().is_none());
        clear_cache(&cache).unwrap();
    }
}
