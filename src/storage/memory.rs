//! In-memory storage for development and testing.
//!
//! Uses `DashMap` for concurrent access without external locks.
//! Not suitable for production: data is lost on restart and not shared
//! across processes or Lambda instances.

use dashmap::DashMap;

use super::{Storage, StorageError, check_key, immediate_children};

#[derive(Default)]
pub struct MemoryStorage {
    store: DashMap<String, Vec<u8>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl Storage for MemoryStorage {
    async fn load(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        check_key(key)?;
        self.store
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn save(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        check_key(key)?;
        self.store.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        check_key(key)?;
        self.store
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn exist(&self, key: &str) -> bool {
        self.store.contains_key(key)
    }

    async fn list(&self, location: &str) -> Result<Vec<String>, StorageError> {
        let keys: Vec<String> = self.store.iter().map(|e| e.key().clone()).collect();
        Ok(immediate_children(
            location,
            keys.iter().map(String::as_str),
        ))
    }

    fn location(&self, key: &str) -> String {
        key.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_load() {
        let storage = MemoryStorage::new();
        storage.save("k1", b"value").await.unwrap();
        assert_eq!(storage.load("k1").await.unwrap(), b"value");
    }

    #[tokio::test]
    async fn test_load_nonexistent() {
        let storage = MemoryStorage::new();
        let err = storage.load("nonexistent").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let storage = MemoryStorage::new();
        storage.save("k1", b"one").await.unwrap();
        storage.save("k1", b"two").await.unwrap();
        assert_eq!(storage.load("k1").await.unwrap(), b"two");
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn test_remove() {
        let storage = MemoryStorage::new();
        storage.save("k1", b"v").await.unwrap();
        assert!(storage.exist("k1").await);

        storage.remove("k1").await.unwrap();
        assert!(!storage.exist("k1").await);
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_remove_nonexistent_fails() {
        let storage = MemoryStorage::new();
        assert!(storage.remove("nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_list_immediate_children() {
        let storage = MemoryStorage::new();
        storage.save("sessions/a", b"1").await.unwrap();
        storage.save("sessions/b", b"2").await.unwrap();
        storage.save("sessions/old/c", b"3").await.unwrap();
        storage.save("accounts/x.json", b"4").await.unwrap();

        let mut names = storage.list("sessions").await.unwrap();
        names.sort();
        assert_eq!(names, vec!["a", "b", "old"]);
    }

    #[tokio::test]
    async fn test_rejects_traversal_key() {
        let storage = MemoryStorage::new();
        let err = storage.save("../escape", b"x").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }
}
