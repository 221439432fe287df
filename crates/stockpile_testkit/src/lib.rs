//! # Stockpile Testkit
//!
//! Test utilities for stockpile.
//!
//! This crate provides:
//! - The inventory schema used across the test suites, and seeded stores
//! - Temporary workspaces with SQLite, blob and state directories
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use stockpile_core::LocalStore;
//! use stockpile_testkit::prelude::*;
//!
//! let store = inventory_store();
//! seed_inventory(store.as_ref(), 3);
//! assert_eq!(store.read_all(INVENTORY_TABLE).unwrap().len(), 3);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
