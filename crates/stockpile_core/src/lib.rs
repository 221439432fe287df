//! # Stockpile Core
//!
//! Backup and versioning engine for the on-device store.
//!
//! This crate provides:
//! - A [`LocalStore`] adapter over the relational store, with SQLite and
//!   in-memory implementations
//! - A [`TransformPipeline`] that compresses and encrypts snapshot payloads,
//!   degrading to weaker forms rather than failing
//! - A [`SnapshotExporter`] that reads the tracked tables into a snapshot
//!   document
//! - A [`RestoreEngine`] that decodes any historical payload form and
//!   replaces table contents inside one transaction
//! - A [`VersionLedger`] that numbers snapshots, rolls back to them and
//!   keeps an audit log of every rollback
//!
//! ## Key Invariants
//!
//! - A restore either commits completely or leaves the store untouched
//! - Protected tables (the change log) are never replaced by a restore
//! - Version numbers are never reused
//! - No restore overlaps an export or a sync cycle ([`StoreGate`])
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use stockpile_codec::Row;
//! use stockpile_core::{
//!     BackupConfig, ColumnSpec, ColumnType, LocalStore, MemoryStore, RestoreEngine,
//!     SnapshotExporter, StoreGate, TransformPipeline, VersionLedger,
//! };
//! use stockpile_storage::{MemoryRepository, MemoryStateStore};
//!
//! let store = Arc::new(MemoryStore::new());
//! store
//!     .create_table(
//!         "items",
//!         &[ColumnSpec::auto_id("id"), ColumnSpec::new("name", ColumnType::Text)],
//!     )
//!     .unwrap();
//! store.insert("items", &Row::new().with("name", "hammer")).unwrap();
//!
//! let config = BackupConfig::new(["items"]);
//! let pipeline = Arc::new(TransformPipeline::plain());
//! let gate = Arc::new(StoreGate::new());
//! let exporter =
//!     SnapshotExporter::new(store.clone(), config.clone(), pipeline.clone(), gate.clone());
//! let restorer = RestoreEngine::new(store.clone(), config, pipeline, gate);
//! let ledger = VersionLedger::open(
//!     exporter,
//!     restorer,
//!     Arc::new(MemoryRepository::new()),
//!     Arc::new(MemoryStateStore::new()),
//! )
//! .unwrap();
//!
//! let v1 = ledger.create_version(Some("first")).unwrap();
//! assert_eq!(v1.version, 1);
//! assert_eq!(ledger.current_version(), Some(1));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod export;
mod gate;
mod ledger;
mod restore;
mod store;
mod transform;

pub use config::{BackupConfig, CHANGE_LOG_TABLE};
pub use error::{CoreError, CoreResult, DecodeAttempt, StoreError, StoreResult};
pub use export::SnapshotExporter;
pub use gate::{ExclusiveGuard, SharedGuard, StoreGate};
pub use ledger::{
    blob_name, CleanupReport, RollbackLogEntry, RollbackStatus, Snapshot, VersionLedger,
    VersionRecord, LEDGER_KEY, ROLLBACK_LOG_KEY,
};
pub use restore::{
    apply, apply_then, decode, decode_with, sanitize, DecodeStrategy, Decoded, RecordOutcome, RecordStatus,
    RestoreEngine, RestoreReport, TableOutcome, TableStatus, DECRYPT, DECRYPT_DECOMPRESS,
    DEFAULT_CHAIN, PLAINTEXT, SANITIZE,
};
pub use store::{ColumnSpec, ColumnType, Fault, LocalStore, MemoryStore, SqliteStore};
pub use transform::{
    compress, decompress, CryptoManager, Encoded, EncryptionKey, PayloadForm, TransformPipeline,
    KEY_SIZE, NONCE_SIZE, TAG_SIZE,
};
