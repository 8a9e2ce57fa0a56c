//! In-memory key-value store.
//!
//! The store is the service's source of truth while running; durability comes
//! from the transaction log in [`crate::wal`]. Mutations are applied here
//! first and logged afterwards, so the map never waits on backend I/O.

use std::collections::HashMap;

use dashmap::DashMap;
use thiserror::Error;

/// Errors that can occur on store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("no such key: {0}")]
    KeyNotFound(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Concurrent map of keys to values, shared across connection handlers.
#[derive(Debug, Default)]
pub struct KeyValueStore {
    entries: DashMap<String, String>,
}

impl KeyValueStore {
    /// Create an empty store.
    pub fn new() -> Self {
        KeyValueStore {
            entries: DashMap::new(),
        }
    }

    /// Set `key` to `value`, overwriting any previous value.
    pub fn put(&self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    /// Look up the value stored under `key`.
    pub fn get(&self, key: &str) -> StoreResult<String> {
        self.entries
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::KeyNotFound(key.to_string()))
    }

    /// Remove `key` from the store.
    pub fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::KeyNotFound(key.to_string()))
    }

    /// Snapshot of every entry currently in the store.
    pub fn get_all(&self) -> HashMap<String, String> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_roundtrip() {
        let store = KeyValueStore::new();
        store.put("alpha", "1");
        assert_eq!(store.get("alpha").unwrap(), "1");
    }

    #[test]
    fn test_put_overwrites() {
        let store = KeyValueStore::new();
        store.put("alpha", "1");
        store.put("alpha", "2");
        assert_eq!(store.get("alpha").unwrap(), "2");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_missing_key() {
        let store = KeyValueStore::new();
        assert_eq!(
            store.get("ghost"),
            Err(StoreError::KeyNotFound("ghost".to_string()))
        );
    }

    #[test]
    fn test_delete() {
        let store = KeyValueStore::new();
        store.put("alpha", "1");
        store.delete("alpha").unwrap();
        assert!(store.is_empty());
        assert_eq!(
            store.delete("alpha"),
            Err(StoreError::KeyNotFound("alpha".to_string()))
        );
    }

    #[test]
    fn test_get_all_snapshot() {
        let store = KeyValueStore::new();
        store.put("a", "1");
        store.put("b", "2");
        let all = store.get_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all.get("a").map(String::as_str), Some("1"));
        assert_eq!(all.get("b").map(String::as_str), Some("2"));
    }
}
