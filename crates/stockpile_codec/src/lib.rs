//! # Stockpile Codec
//!
//! Dynamically shaped rows and the canonical snapshot document.
//!
//! Local tables are read and written as [`Row`]s: an ordered mapping from
//! column name to a small tagged [`Value`]. Snapshots serialize every
//! tracked table into a self-describing [`SnapshotDocument`]:
//!
//! ```json
//! { "metadata": { "exportDate": "...", "version": 3 },
//!   "data": { "inventory_items": [ { "id": 1, "name": "Tea" } ] } }
//! ```
//!
//! ## Usage
//!
//! ```
//! use stockpile_codec::{Row, Value};
//!
//! let row = Row::new()
//!     .with("sku", "SKU001")
//!     .with("quantity", 5i64);
//! let json = row.to_json_string();
//! assert_eq!(json, r#"{"sku":"SKU001","quantity":5}"#);
//! assert_eq!(Row::from_json_str(&json).unwrap(), row);
//! assert_eq!(row.get("quantity"), Some(&Value::Integer(5)));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod document;
mod error;
mod row;
mod value;

pub use document::{parse_json, SnapshotDocument, SnapshotMetadata, TableData};
pub use error::{CodecError, CodecResult};
pub use row::Row;
pub use value::Value;
