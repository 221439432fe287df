//! # Stockpile Sync Engine
//!
//! Change-log replication between devices through a shared remote log.
//!
//! This crate provides:
//! - A local [`ChangeLog`] of every mutation, stored in the local store
//! - A [`RemoteLog`] abstraction with in-memory and REST implementations
//! - An [`EventApplier`] that replays other devices' events locally
//! - The [`SyncEngine`] state machine (disabled, idle, syncing)
//! - A tokio-driven [`SyncScheduler`] for periodic cycles
//!
//! ## Cycle
//!
//! 1. Push this device's unsynced events, oldest first, upserting by event id
//! 2. Pull other devices' synced events newer than the watermark
//! 3. Apply each pulled event not already logged, then log it as synced
//! 4. Advance the watermark to the cycle start if the pull succeeded
//!
//! ## Key Invariants
//!
//! - Events are never deleted; `synced` only goes from false to true
//! - Replaying a push or a pull never duplicates an event
//! - Events from one device apply in creation order
//! - Conflicting writes from different devices resolve by last-applied-wins
//! - No cycle runs while a restore holds the store
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use stockpile_codec::Row;
//! use stockpile_core::{MemoryStore, StoreGate};
//! use stockpile_storage::MemoryStateStore;
//! use stockpile_sync_engine::{MemoryRemoteLog, SyncConfig, SyncCycleOutcome, SyncEngine};
//! use stockpile_sync_protocol::Operation;
//!
//! let remote = Arc::new(MemoryRemoteLog::new());
//! let engine = SyncEngine::open(
//!     SyncConfig::new().with_device_id("phone"),
//!     Arc::new(MemoryStore::new()),
//!     remote.clone(),
//!     Arc::new(MemoryStateStore::new()),
//!     Arc::new(StoreGate::new()),
//! )
//! .unwrap();
//!
//! engine.enable().unwrap();
//! engine
//!     .log_change("inventory_items", Operation::Update, "SKU001", Row::new().with("quantity", 5i64))
//!     .unwrap();
//!
//! let outcome = engine.sync_once().unwrap();
//! assert!(matches!(outcome, SyncCycleOutcome::Completed(ref r) if r.pushed == 1));
//! assert_eq!(remote.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod applier;
mod change_log;
mod config;
mod error;
mod remote;
mod rest;
mod scheduler;
mod state;

pub use applier::{ApplyEffect, EventApplier};
pub use change_log::ChangeLog;
pub use config::{SyncConfig, DEFAULT_SYNC_INTERVAL};
pub use error::{SyncError, SyncResult};
pub use remote::{MemoryRemoteLog, RemoteLog};
pub use rest::{HttpClient, HttpResponse, RestRemoteLog};
pub use scheduler::SyncScheduler;
pub use state::{
    SkipReason, SyncCycleOutcome, SyncEngine, SyncReport, SyncState, SyncStats, METADATA_KEY,
};
