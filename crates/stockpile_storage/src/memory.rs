//! In-memory stores for testing.

use crate::error::{StorageError, StorageResult};
use crate::repository::{validate_name, BlobInfo, BlobRepository};
use crate::state::StateStore;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// An in-memory blob repository.
///
/// Suitable for unit and integration tests. The repository can be taken
/// offline with [`set_available`](Self::set_available) to simulate an
/// unreachable object store.
///
/// # Example
///
/// ```rust
/// use stockpile_storage::{BlobRepository, MemoryRepository, StorageError};
///
/// let repo = MemoryRepository::new();
/// repo.set_available(false);
/// assert!(matches!(repo.put("a", b"x"), Err(StorageError::Unavailable { .. })));
/// ```
#[derive(Debug)]
pub struct MemoryRepository {
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
    available: AtomicBool,
}

impl MemoryRepository {
    /// Creates a new empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(BTreeMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Sets whether the repository answers requests.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Overwrites a blob in place, bypassing availability checks.
    ///
    /// Useful for simulating corruption in tests.
    pub fn tamper(&self, name: &str, data: Vec<u8>) {
        self.blobs.write().insert(name.to_string(), data);
    }

    /// Returns the number of stored blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Returns true if no blobs are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::unavailable("memory repository is offline"))
        }
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobRepository for MemoryRepository {
    fn put(&self, name: &str, data: &[u8]) -> StorageResult<()> {
        self.check_available()?;
        validate_name(name)?;
        self.blobs.write().insert(name.to_string(), data.to_vec());
        Ok(())
    }

    fn get(&self, name: &str) -> StorageResult<Vec<u8>> {
        self.check_available()?;
        self.blobs
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::not_found(name))
    }

    fn list(&self) -> StorageResult<Vec<BlobInfo>> {
        self.check_available()?;
        Ok(self
            .blobs
            .read()
            .iter()
            .map(|(name, data)| BlobInfo {
                name: name.clone(),
                size: data.len() as u64,
            })
            .collect())
    }

    fn remove(&self, names: &[String]) -> StorageResult<usize> {
        self.check_available()?;
        let mut blobs = self.blobs.write();
        Ok(names.iter().filter(|n| blobs.remove(*n).is_some()).count())
    }

    fn signed_url(&self, name: &str, ttl: Duration) -> StorageResult<String> {
        self.check_available()?;
        if !self.blobs.read().contains_key(name) {
            return Err(StorageError::not_found(name));
        }
        Ok(format!("memory://{name}?ttl={}", ttl.as_secs()))
    }
}

/// An in-memory state store.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    values: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStateStore {
    /// Creates a new empty state store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_name(key)?;
        Ok(self.values.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        validate_name(key)?;
        self.values.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        validate_name(key)?;
        self.values.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_repository_starts_empty() {
        let repo = MemoryRepository::new();
        assert!(repo.is_empty());
        assert!(repo.list().unwrap().is_empty());
    }

    #[test]
    fn memory_put_get() {
        let repo = MemoryRepository::new();
        repo.put("a.bak", b"alpha").unwrap();
        assert_eq!(repo.get("a.bak").unwrap(), b"alpha");
    }

    #[test]
    fn memory_get_missing() {
        let repo = MemoryRepository::new();
        assert!(matches!(
            repo.get("nope"),
            Err(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn memory_list_is_sorted() {
        let repo = MemoryRepository::new();
        repo.put("snapshot-3", b"ccc").unwrap();
        repo.put("snapshot-1", b"a").unwrap();
        repo.put("snapshot-2", b"bb").unwrap();

        let list = repo.list().unwrap();
        let names: Vec<_> = list.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, ["snapshot-1", "snapshot-2", "snapshot-3"]);
        assert_eq!(list[2].size, 3);
    }

    #[test]
    fn memory_remove_counts_existing() {
        let repo = MemoryRepository::new();
        repo.put("a", b"1").unwrap();
        repo.put("b", b"2").unwrap();

        let removed = repo
            .remove(&["a".to_string(), "missing".to_string()])
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn memory_offline() {
        let repo = MemoryRepository::new();
        repo.put("a", b"1").unwrap();
        repo.set_available(false);

        assert!(repo.get("a").unwrap_err().is_transient());
        assert!(repo.list().is_err());

        repo.set_available(true);
        assert_eq!(repo.get("a").unwrap(), b"1");
    }

    #[test]
    fn memory_signed_url() {
        let repo = MemoryRepository::new();
        repo.put("a", b"1").unwrap();
        let url = repo.signed_url("a", Duration::from_secs(60)).unwrap();
        assert_eq!(url, "memory://a?ttl=60");
        assert!(repo.signed_url("b", Duration::from_secs(60)).is_err());
    }

    #[test]
    fn state_store_roundtrip() {
        let store = MemoryStateStore::new();
        assert!(store.get("ledger").unwrap().is_none());

        store.put("ledger", b"[]").unwrap();
        assert_eq!(store.get("ledger").unwrap().unwrap(), b"[]");

        store.remove("ledger").unwrap();
        assert!(store.get("ledger").unwrap().is_none());
        store.remove("ledger").unwrap();
    }

    #[test]
    fn state_store_rejects_bad_key() {
        let store = MemoryStateStore::new();
        assert!(store.put("a/b", b"x").is_err());
    }
}
