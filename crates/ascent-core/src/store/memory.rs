//! In-memory record store for tests and embedding.

use std::collections::BTreeMap;
use std::sync::Mutex;

use super::RecordStore;
use crate::error::StoreError;

/// Record store backed by an in-process map. Cheap to construct, shared
/// freely behind an `Arc`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::QueryFailed("store mutex poisoned".into()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::QueryFailed("store mutex poisoned".into()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::QueryFailed("store mutex poisoned".into()))?;
        entries.remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::QueryFailed("store mutex poisoned".into()))?;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let store = MemoryStore::new();
        store.set("a:1", "one").unwrap();
        assert_eq!(store.get("a:1").unwrap(), Some("one".to_string()));

        store.remove("a:1").unwrap();
        assert_eq!(store.get("a:1").unwrap(), None);
        // Removing again is fine
        store.remove("a:1").unwrap();
    }

    #[test]
    fn test_prefix_listing_is_sorted() {
        let store = MemoryStore::new();
        store.set("c:2", "x").unwrap();
        store.set("c:1", "x").unwrap();
        store.set("d:1", "x").unwrap();

        let keys = store.keys_with_prefix("c:").unwrap();
        assert_eq!(keys, vec!["c:1".to_string(), "c:2".to_string()]);
    }
}
