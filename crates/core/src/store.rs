//! Thread-safe in-memory metadata store keyed by logical path.
//!
//! Reads vastly outnumber writes in a sync workload, so the store uses a
//! reader-writer lock: `get`/`exists`/`list_all`/`size`/`query` take the
//! shared side, mutations take the exclusive side. Every returned record is
//! a copy, safe to use after the lock is released.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{Result, SyncError};
use crate::types::FileMetadata;

/// Concurrent map from logical path to [`FileMetadata`].
#[derive(Debug, Default)]
pub struct MetadataStore {
    inner: RwLock<HashMap<String, FileMetadata>>,
}

impl MetadataStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, FileMetadata>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, FileMetadata>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a new record. Never overwrites.
    ///
    /// # Errors
    /// Returns [`SyncError::AlreadyExists`] if the path is already tracked.
    pub fn add(&self, metadata: FileMetadata) -> Result<()> {
        let mut map = self.write();
        if map.contains_key(&metadata.file_path) {
            return Err(SyncError::AlreadyExists(metadata.file_path));
        }
        map.insert(metadata.file_path.clone(), metadata);
        Ok(())
    }

    /// Fetch a copy of the record for `file_path`.
    ///
    /// # Errors
    /// Returns [`SyncError::NotFound`] if the path is not tracked.
    pub fn get(&self, file_path: &str) -> Result<FileMetadata> {
        self.read()
            .get(file_path)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(file_path.to_string()))
    }

    /// Replace an existing record. Never creates.
    ///
    /// # Errors
    /// Returns [`SyncError::NotFound`] if the path is not tracked.
    pub fn update(&self, metadata: FileMetadata) -> Result<()> {
        let mut map = self.write();
        match map.get_mut(&metadata.file_path) {
            Some(slot) => {
                *slot = metadata;
                Ok(())
            }
            None => Err(SyncError::NotFound(metadata.file_path)),
        }
    }

    /// Insert or replace; never fails.
    pub fn add_or_update(&self, metadata: FileMetadata) {
        self.write().insert(metadata.file_path.clone(), metadata);
    }

    /// Remove the record for `file_path`.
    ///
    /// # Errors
    /// Returns [`SyncError::NotFound`] if the path is not tracked.
    pub fn remove(&self, file_path: &str) -> Result<FileMetadata> {
        self.write()
            .remove(file_path)
            .ok_or_else(|| SyncError::NotFound(file_path.to_string()))
    }

    #[must_use]
    pub fn exists(&self, file_path: &str) -> bool {
        self.read().contains_key(file_path)
    }

    /// Snapshot copy of every tracked record.
    #[must_use]
    pub fn list_all(&self) -> Vec<FileMetadata> {
        self.read().values().cloned().collect()
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Drop every record.
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Snapshot copy of every record matching `predicate`.
    #[must_use]
    pub fn query<P>(&self, predicate: P) -> Vec<FileMetadata>
    where
        P: Fn(&FileMetadata) -> bool,
    {
        self.read()
            .values()
            .filter(|m| predicate(m))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SyncState;

    fn record(path: &str) -> FileMetadata {
        let mut m = FileMetadata::new(path);
        m.hash = crate::hash::digest_str(path);
        m.size = path.len() as u64;
        m
    }

    #[test]
    fn add_then_get_returns_same_record() {
        let store = MetadataStore::new();
        let m = record("/docs/a.txt");
        store.add(m.clone()).unwrap();
        assert_eq!(store.get("/docs/a.txt").unwrap(), m);
    }

    #[test]
    fn add_never_overwrites() {
        let store = MetadataStore::new();
        store.add(record("/a")).unwrap();
        assert!(matches!(
            store.add(record("/a")),
            Err(SyncError::AlreadyExists(_))
        ));
        assert_eq!(store.size(), 1);
    }

    #[test]
    fn update_never_creates() {
        let store = MetadataStore::new();
        assert!(matches!(
            store.update(record("/missing")),
            Err(SyncError::NotFound(_))
        ));

        store.add(record("/a")).unwrap();
        let mut changed = record("/a");
        changed.size = 999;
        store.update(changed).unwrap();
        assert_eq!(store.get("/a").unwrap().size, 999);
    }

    #[test]
    fn upsert_handles_both_cases() {
        let store = MetadataStore::new();
        store.add_or_update(record("/a"));
        assert_eq!(store.size(), 1);
        let mut changed = record("/a");
        changed.size = 5;
        store.add_or_update(changed);
        assert_eq!(store.size(), 1);
        assert_eq!(store.get("/a").unwrap().size, 5);
    }

    #[test]
    fn remove_and_exists() {
        let store = MetadataStore::new();
        store.add(record("/a")).unwrap();
        assert!(store.exists("/a"));
        store.remove("/a").unwrap();
        assert!(!store.exists("/a"));
        assert!(matches!(store.remove("/a"), Err(SyncError::NotFound(_))));
    }

    #[test]
    fn list_all_is_a_permutation_of_contents() {
        let store = MetadataStore::new();
        for path in ["/a", "/b", "/c"] {
            store.add(record(path)).unwrap();
        }
        let mut paths: Vec<_> = store.list_all().into_iter().map(|m| m.file_path).collect();
        paths.sort();
        assert_eq!(paths, vec!["/a", "/b", "/c"]);
    }

    #[test]
    fn query_filters_with_predicate() {
        let store = MetadataStore::new();
        let mut conflicted = record("/bad");
        conflicted.sync_state = SyncState::Conflict;
        store.add(conflicted).unwrap();
        store.add(record("/ok")).unwrap();

        let conflicts = store.query(|m| m.sync_state == SyncState::Conflict);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].file_path, "/bad");
    }

    #[test]
    fn clear_empties_the_store() {
        let store = MetadataStore::new();
        store.add(record("/a")).unwrap();
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn concurrent_readers_and_writers() {
        use std::sync::Arc;

        let store = Arc::new(MetadataStore::new());
        let mut handles = Vec::new();

        for i in 0..4 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                for j in 0..50 {
                    store.add_or_update(record(&format!("/t{i}/f{j}")));
                    let _ = store.list_all();
                    let _ = store.exists("/t0/f0");
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.size(), 200);
    }
}
