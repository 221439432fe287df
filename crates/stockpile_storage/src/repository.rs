//! Blob repository trait definition.

use crate::error::{StorageError, StorageResult};
use std::time::Duration;

/// Metadata about a stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobInfo {
    /// Blob name, unique within the repository.
    pub name: String,
    /// Size of the blob in bytes.
    pub size: u64,
}

/// Durable storage for immutable snapshot blobs.
///
/// Repositories are **opaque byte stores**. The backup engine owns the
/// payload format; a repository only stores, lists and removes named blobs.
///
/// # Invariants
///
/// - `get` returns exactly the bytes last passed to `put` for that name
/// - `list` is sorted by name, so names embedding a sortable timestamp list
///   oldest first
/// - `remove` ignores names that do not exist
/// - Repositories must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::MemoryRepository`] - For testing
/// - [`super::FileRepository`] - Directory-backed storage
pub trait BlobRepository: Send + Sync {
    /// Stores `data` under `name`, replacing any previous blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or the write fails.
    fn put(&self, name: &str, data: &[u8]) -> StorageResult<()>;

    /// Reads the blob stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no such blob exists.
    fn get(&self, name: &str) -> StorageResult<Vec<u8>>;

    /// Lists all blobs, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository cannot be read.
    fn list(&self) -> StorageResult<Vec<BlobInfo>>;

    /// Removes the named blobs and returns how many existed.
    ///
    /// # Errors
    ///
    /// Returns an error if a removal fails.
    fn remove(&self, names: &[String]) -> StorageResult<usize>;

    /// Returns a URL granting read access to `name` for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no such blob exists.
    fn signed_url(&self, name: &str, ttl: Duration) -> StorageResult<String>;
}

/// Checks that `name` is usable as a blob name or state key.
///
/// Names are a single path component: non-empty, no separators, no `..`.
///
/// # Errors
///
/// Returns [`StorageError::InvalidName`] otherwise.
pub fn validate_name(name: &str) -> StorageResult<()> {
    let bad = name.is_empty()
        || name == "."
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\')
        || name.chars().any(char::is_control);

    if bad {
        return Err(StorageError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}
