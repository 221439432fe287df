//! Local store adapter.
//!
//! The backup and sync engines reach the on-device relational store only
//! through [`LocalStore`]. Two adapters ship with the crate:
//!
//! - [`MemoryStore`] - schema-checked tables in memory, with fault injection
//! - [`SqliteStore`] - a SQLite database via `rusqlite`

mod memory;
mod sqlite;

pub use memory::{Fault, MemoryStore};
pub use sqlite::SqliteStore;

use crate::error::StoreResult;
use stockpile_codec::{Row, Value};

/// Declared storage class of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Whole numbers (also used for booleans).
    Integer,
    /// Floating point numbers.
    Real,
    /// UTF-8 text.
    Text,
}

impl ColumnType {
    /// Maps a declared SQL type to a storage class, following SQLite's
    /// affinity rules. Types with numeric or blob affinity map to `None`.
    #[must_use]
    pub fn from_declared(declared: &str) -> Option<Self> {
        let upper = declared.to_ascii_uppercase();
        if upper.contains("INT") {
            Some(ColumnType::Integer)
        } else if ["CHAR", "CLOB", "TEXT"].iter().any(|t| upper.contains(t)) {
            Some(ColumnType::Text)
        } else if ["REAL", "FLOA", "DOUB"].iter().any(|t| upper.contains(t)) {
            Some(ColumnType::Real)
        } else {
            None
        }
    }

    /// SQL type name.
    #[must_use]
    pub fn sql_name(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }
}

/// Definition of one column for [`LocalStore::create_table`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Column name.
    pub name: String,
    /// Storage class.
    pub column_type: ColumnType,
    /// Whether this column is the primary key.
    pub primary_key: bool,
    /// Whether the primary key is assigned from a counter when absent.
    pub autoincrement: bool,
    /// Whether `NULL` is rejected.
    pub not_null: bool,
}

impl ColumnSpec {
    /// Creates a nullable column.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            primary_key: false,
            autoincrement: false,
            not_null: false,
        }
    }

    /// Creates an auto-incrementing integer primary key.
    pub fn auto_id(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Integer,
            primary_key: true,
            autoincrement: true,
            not_null: false,
        }
    }

    /// Marks the column as the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Marks the column as `NOT NULL`.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }
}

/// Access to the on-device relational store.
///
/// All methods take `&self`; adapters serialize access internally.
/// Transactions are connection-wide: between [`begin`](Self::begin) and
/// [`commit`](Self::commit)/[`rollback`](Self::rollback) every call is part
/// of the transaction. A failed statement inside a transaction does not
/// abort the transaction; only `rollback` undoes work.
///
/// # Implementors
///
/// - [`MemoryStore`] - For testing
/// - [`SqliteStore`] - For persistent storage
pub trait LocalStore: Send + Sync {
    /// Lists user tables, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be read.
    fn list_tables(&self) -> StoreResult<Vec<String>>;

    /// Returns true if `table` exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be read.
    fn table_exists(&self, table: &str) -> StoreResult<bool> {
        Ok(self.list_tables()?.iter().any(|t| t == table))
    }

    /// Creates `table` if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be created.
    fn create_table(&self, table: &str, columns: &[ColumnSpec]) -> StoreResult<()>;

    /// Reads every row of `table`, in storage order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TableNotFound`](crate::StoreError::TableNotFound)
    /// if the table does not exist.
    fn read_all(&self, table: &str) -> StoreResult<Vec<Row>>;

    /// Reads several tables as one consistent view.
    ///
    /// Entries come back in the order of `tables`; a table missing from the
    /// schema reads as `None`. No write on this store lands between the
    /// individual table reads.
    ///
    /// # Errors
    ///
    /// Returns an error if a table cannot be read.
    fn read_tables(&self, tables: &[String]) -> StoreResult<Vec<(String, Option<Vec<Row>>)>>;

    /// Returns the declared type of `column` in `table`.
    ///
    /// `None` if the table or column does not exist, or the declared type
    /// has no [`ColumnType`] counterpart.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be read.
    fn column_type(&self, table: &str, column: &str) -> StoreResult<Option<ColumnType>>;

    /// Reads the rows of `table` whose `column` equals `value`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table or column does not exist.
    fn select_eq(&self, table: &str, column: &str, value: &Value) -> StoreResult<Vec<Row>>;

    /// Reads the first row of `table` whose `column` equals `value`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table or column does not exist.
    fn find(&self, table: &str, column: &str, value: &Value) -> StoreResult<Option<Row>> {
        Ok(self.select_eq(table, column, value)?.into_iter().next())
    }

    /// Deletes every row of `table` and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist.
    fn delete_all(&self, table: &str) -> StoreResult<usize>;

    /// Resets the auto-increment counter of `table`, if it has one.
    ///
    /// # Errors
    ///
    /// Returns an error if the counter cannot be reset.
    fn reset_auto_increment(&self, table: &str) -> StoreResult<()>;

    /// Inserts one row. Columns not present in `row` take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown columns or violated constraints.
    fn insert(&self, table: &str, row: &Row) -> StoreResult<()>;

    /// Sets the columns of `changes` on rows where `key_column` equals `key`.
    ///
    /// Returns the number of rows updated.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown columns or violated constraints.
    fn update(&self, table: &str, key_column: &str, key: &Value, changes: &Row)
        -> StoreResult<usize>;

    /// Deletes rows where `key_column` equals `key` and returns the count.
    ///
    /// # Errors
    ///
    /// Returns an error if the table or column does not exist.
    fn delete(&self, table: &str, key_column: &str, key: &Value) -> StoreResult<usize>;

    /// Starts a transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if a transaction is already active.
    fn begin(&self) -> StoreResult<()>;

    /// Commits the active transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction is active or the commit fails.
    fn commit(&self) -> StoreResult<()>;

    /// Rolls back the active transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction is active.
    fn rollback(&self) -> StoreResult<()>;
}

/// Compares two values the way key lookups do.
///
/// Text `"42"` matches integer `42`, and booleans match `0`/`1`, mirroring
/// the column affinity rules of the SQLite adapter.
pub(crate) fn keys_match(a: &Value, b: &Value) -> bool {
    fn normalize(v: &Value) -> Option<String> {
        match v {
            Value::Bool(b) => Some(i64::from(*b).to_string()),
            other => other.to_key_string(),
        }
    }
    match (normalize(a), normalize(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_matching() {
        assert!(keys_match(&Value::Integer(42), &Value::from("42")));
        assert!(keys_match(&Value::Bool(false), &Value::Integer(0)));
        assert!(!keys_match(&Value::Null, &Value::Null));
        assert!(!keys_match(&Value::from("a"), &Value::from("b")));
    }

    #[test]
    fn column_spec_builders() {
        let id = ColumnSpec::auto_id("id");
        assert!(id.primary_key && id.autoincrement);

        let sku = ColumnSpec::new("sku", ColumnType::Text).primary_key().not_null();
        assert!(sku.primary_key && sku.not_null && !sku.autoincrement);
        assert_eq!(sku.column_type.sql_name(), "TEXT");
    }

    #[test]
    fn declared_type_affinity() {
        assert_eq!(ColumnType::from_declared("BIGINT"), Some(ColumnType::Integer));
        assert_eq!(ColumnType::from_declared("varchar(20)"), Some(ColumnType::Text));
        assert_eq!(ColumnType::from_declared("DOUBLE"), Some(ColumnType::Real));
        assert_eq!(ColumnType::from_declared("NUMERIC"), None);
        assert_eq!(ColumnType::from_declared(""), None);
    }
}
