//! Test fixtures and store helpers.
//!
//! The inventory schema mirrors a small point-of-sale app: items keyed by
//! SKU text, categories with an auto-increment id, and the change log.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use stockpile_codec::{Row, Value};
use stockpile_core::{
    BackupConfig, ColumnSpec, ColumnType, LocalStore, MemoryStore, SqliteStore, StoreResult,
    CHANGE_LOG_TABLE,
};
use stockpile_storage::{FileRepository, FileStateStore};
use tempfile::TempDir;

/// Inventory items table, keyed by text `id`.
pub const INVENTORY_TABLE: &str = "inventory_items";
/// Categories table, keyed by auto-increment `id`.
pub const CATEGORIES_TABLE: &str = "categories";

/// Returns the inventory schema as `(table, columns)` pairs.
pub fn inventory_schema() -> Vec<(&'static str, Vec<ColumnSpec>)> {
    vec![
        (
            INVENTORY_TABLE,
            vec![
                ColumnSpec::new("id", ColumnType::Text).primary_key(),
                ColumnSpec::new("name", ColumnType::Text),
                ColumnSpec::new("quantity", ColumnType::Integer),
                ColumnSpec::new("price", ColumnType::Real),
                ColumnSpec::new("category_id", ColumnType::Integer),
            ],
        ),
        (
            CATEGORIES_TABLE,
            vec![
                ColumnSpec::auto_id("id"),
                ColumnSpec::new("name", ColumnType::Text).not_null(),
            ],
        ),
    ]
}

/// Creates the inventory tables in `store`.
///
/// # Errors
///
/// Returns an error if a table cannot be created.
pub fn create_inventory_schema(store: &dyn LocalStore) -> StoreResult<()> {
    for (table, columns) in inventory_schema() {
        store.create_table(table, &columns)?;
    }
    Ok(())
}

/// Creates an in-memory store with the inventory schema.
pub fn inventory_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    create_inventory_schema(store.as_ref()).expect("Failed to create inventory schema");
    store
}

/// Builds the item row for SKU number `n`.
pub fn item(n: usize) -> Row {
    Row::new()
        .with("id", format!("SKU{n:03}"))
        .with("name", format!("Item {n}"))
        .with("quantity", n as i64)
        .with("price", 1.5 * n as f64)
        .with("category_id", Value::Null)
}

/// Inserts items `SKU001..=SKU{count}`.
pub fn seed_inventory(store: &dyn LocalStore, count: usize) {
    for n in 1..=count {
        store
            .insert(INVENTORY_TABLE, &item(n))
            .expect("Failed to seed inventory");
    }
}

/// Reads one item's quantity.
pub fn quantity_of(store: &dyn LocalStore, id: &str) -> Option<i64> {
    store
        .find(INVENTORY_TABLE, "id", &Value::from(id))
        .expect("Failed to read inventory")
        .and_then(|row| row.get("quantity").and_then(Value::as_i64))
}

/// Backup configuration tracking the inventory tables and the change log.
pub fn backup_config() -> BackupConfig {
    BackupConfig::new([INVENTORY_TABLE, CATEGORIES_TABLE, CHANGE_LOG_TABLE])
}

/// A temporary directory laid out like an app data directory.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    /// Creates an empty workspace.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Returns the workspace root.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Returns the SQLite database path.
    pub fn database_path(&self) -> PathBuf {
        self.path().join("stockpile.db")
    }

    /// Opens the SQLite store, creating the inventory schema.
    pub fn sqlite_store(&self) -> Arc<SqliteStore> {
        let store = SqliteStore::open(&self.database_path()).expect("Failed to open SQLite store");
        create_inventory_schema(&store).expect("Failed to create inventory schema");
        Arc::new(store)
    }

    /// Opens the blob repository.
    pub fn repository(&self) -> Arc<FileRepository> {
        Arc::new(FileRepository::open(&self.path().join("backups")).expect("Failed to open repository"))
    }

    /// Opens the state store.
    pub fn state_store(&self) -> Arc<FileStateStore> {
        Arc::new(FileStateStore::open(&self.path().join("state")).expect("Failed to open state store"))
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}
