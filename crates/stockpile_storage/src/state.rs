//! Durable key/value state.

use crate::error::StorageResult;

/// Small keyed documents that survive process restarts.
///
/// Used for the version ledger, the rollback log and sync metadata. Each
/// `put` replaces the whole value atomically; readers never observe a
/// partially written value.
pub trait StateStore: Send + Sync {
    /// Reads the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the read fails.
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Replaces the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the write fails.
    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Removes `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal fails.
    fn remove(&self, key: &str) -> StorageResult<()>;
}
