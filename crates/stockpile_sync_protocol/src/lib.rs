//! # Stockpile Sync Protocol
//!
//! Records exchanged by the change-log replication engine.
//!
//! This crate provides:
//! - [`ChangeEvent`], the unit of replication, and its local table row form
//! - [`Operation`] for the kind of mutation an event carries
//! - [`RemoteLogEntry`], the row shape of the remote change-log table
//! - [`SyncMetadata`], the per-device state that survives restarts
//! - Fixed-precision timestamp formatting shared by both logs
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod event;
mod metadata;
mod operation;
mod remote;
pub mod timestamp;

pub use error::{ProtocolError, ProtocolResult};
pub use event::{columns, ChangeEvent};
pub use metadata::SyncMetadata;
pub use operation::Operation;
pub use remote::RemoteLogEntry;
