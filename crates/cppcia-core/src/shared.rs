//! Snapshot-isolated access to a graph store shared between an updater and
//! concurrent impact queries.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::Result;
use crate::graph::GraphStore;

/// Single-writer handle around a [`GraphStore`].
///
/// Readers take an [`Arc`] snapshot and keep it for the whole query. Writers
/// are serialized and mutate a private copy which is published only when the
/// batch succeeds.
#[derive(Debug, Default)]
pub struct SharedStore {
    current: RwLock<Arc<GraphStore>>,
    writer: Mutex<()>,
}

impl SharedStore {
    pub fn new(store: GraphStore) -> Self {
        SharedStore {
            current: RwLock::new(Arc::new(store)),
            writer: Mutex::new(()),
        }
    }

    /// Point-in-time view, unaffected by later batches.
    pub fn snapshot(&self) -> Arc<GraphStore> {
        self.current.read().clone()
    }

    /// Run one mutation batch. On error the published store is left untouched.
    pub fn apply<T>(&self, batch: impl FnOnce(&mut GraphStore) -> Result<T>) -> Result<T> {
        let _writer = self.writer.lock();
        let mut working = (*self.snapshot()).clone();
        let value = batch(&mut working)?;
        *self.current.write() = Arc::new(working);
        Ok(value)
    }

    /// Replace the published store wholesale (e.g. after loading a cache).
    pub fn replace(&self, store: GraphStore) {
        let _writer = self.writer.lock();
        *self.current.write() = Arc::new(store);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::facts::FileFacts;
    use crate::model::Fingerprint;
    use std::path::Path;

    #[test]
    fn test_snapshot_survives_later_batches() {
        let shared = SharedStore::default();
        let before = shared.snapshot();

        shared
            .apply(|store| {
                store.upsert_file(&FileFacts::new("a.h", Fingerprint::of(b"a")));
                Ok(())
            })
            .unwrap();

        assert_eq!(before.file_count(), 0);
        assert_eq!(shared.snapshot().file_count(), 1);
    }

    #[test]
    fn test_failed_batch_is_not_published() {
        let shared = SharedStore::default();
        let result: Result<()> = shared.apply(|store| {
            store.upsert_file(&FileFacts::new("a.h", Fingerprint::of(b"a")));
            Err(CoreError::GraphInvariantViolation("injected".into()))
        });

        assert!(result.is_err());
        assert!(shared.snapshot().file(Path::new("a.h")).is_none());
    }

    #[test]
    fn test_concurrent_readers() {
        let shared = Arc::new(SharedStore::default());
        shared
            .apply(|store| {
                store.upsert_file(&FileFacts::new("a.h", Fingerprint::of(b"a")));
                Ok(())
            })
            .unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || shared.snapshot().file_count())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 1);
        }
    }
}
