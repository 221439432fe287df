//! # Stockpile Storage
//!
//! Durable byte storage used by the backup and sync engines.
//!
//! This crate provides two opaque stores. Neither interprets the bytes it
//! holds:
//!
//! - [`BlobRepository`] keeps named, immutable snapshot blobs
//!   (put, get, list, remove, signed URLs)
//! - [`StateStore`] keeps small keyed documents that must survive restarts
//!   (the version ledger, the rollback log, sync metadata)
//!
//! ## Available Implementations
//!
//! - [`MemoryRepository`] / [`MemoryStateStore`] - For testing, with failure injection
//! - [`FileRepository`] / [`FileStateStore`] - Directory-backed, atomic writes
//!
//! ## Example
//!
//! ```rust
//! use stockpile_storage::{BlobRepository, MemoryRepository};
//!
//! let repo = MemoryRepository::new();
//! repo.put("snapshot-a.bak", b"hello").unwrap();
//! assert_eq!(repo.get("snapshot-a.bak").unwrap(), b"hello");
//! assert_eq!(repo.list().unwrap().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod repository;
mod state;

pub use error::{StorageError, StorageResult};
pub use file::{FileRepository, FileStateStore};
pub use memory::{MemoryRepository, MemoryStateStore};
pub use repository::{validate_name, BlobInfo, BlobRepository};
pub use state::StateStore;
