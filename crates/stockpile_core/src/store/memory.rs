//! In-memory local store for testing.

use super::{keys_match, ColumnSpec, ColumnType, LocalStore};
use crate::error::{StoreError, StoreResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use stockpile_codec::{Row, Value};

/// An operation [`MemoryStore`] can be told to fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// `begin` fails.
    Begin,
    /// `commit` fails.
    Commit,
    /// `read_all` on the table fails.
    ReadAll(String),
    /// `delete_all` on the table fails.
    DeleteAll(String),
    /// `reset_auto_increment` on the table fails.
    ResetAutoIncrement(String),
    /// Every `insert` into the table fails.
    Insert(String),
}

#[derive(Debug, Clone)]
struct MemTable {
    columns: Vec<ColumnSpec>,
    rows: Vec<Row>,
    counter: i64,
}

impl MemTable {
    fn column(&self, table: &str, name: &str) -> StoreResult<&ColumnSpec> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| StoreError::UnknownColumn {
                table: table.to_string(),
                column: name.to_string(),
            })
    }

    fn check_columns(&self, table: &str, row: &Row) -> StoreResult<()> {
        for name in row.column_names() {
            self.column(table, name)?;
        }
        Ok(())
    }

    fn primary_key(&self) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.primary_key)
    }

    fn key_taken(&self, pk: &str, value: &Value, skip: Option<usize>) -> bool {
        self.rows.iter().enumerate().any(|(i, r)| {
            Some(i) != skip && r.get(pk).is_some_and(|existing| keys_match(existing, value))
        })
    }

    fn insert(&mut self, table: &str, row: &Row) -> StoreResult<()> {
        self.check_columns(table, row)?;

        let mut full = Row::new();
        for col in &self.columns {
            let mut value = row.get(&col.name).cloned().unwrap_or(Value::Null);
            if value.is_null() && col.primary_key && col.column_type == ColumnType::Integer {
                value = Value::Integer(self.counter + 1);
            }
            if value.is_null() && col.not_null {
                return Err(StoreError::Constraint {
                    table: table.to_string(),
                    message: format!("NOT NULL constraint failed: {}", col.name),
                });
            }
            full.insert(col.name.clone(), value);
        }

        if let Some(pk) = self.primary_key().map(|c| c.name.clone()) {
            if let Some(value) = full.get(&pk) {
                if self.key_taken(&pk, value, None) {
                    return Err(StoreError::Constraint {
                        table: table.to_string(),
                        message: format!("UNIQUE constraint failed: {pk}"),
                    });
                }
                if let Some(id) = value.as_i64() {
                    self.counter = self.counter.max(id);
                }
            }
        }

        self.rows.push(full);
        Ok(())
    }

    fn update(
        &mut self,
        table: &str,
        key_column: &str,
        key: &Value,
        changes: &Row,
    ) -> StoreResult<usize> {
        self.column(table, key_column)?;
        self.check_columns(table, changes)?;

        for (name, value) in changes.iter() {
            if value.is_null() && self.column(table, name)?.not_null {
                return Err(StoreError::Constraint {
                    table: table.to_string(),
                    message: format!("NOT NULL constraint failed: {name}"),
                });
            }
        }

        let targets: Vec<usize> = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.get(key_column).is_some_and(|v| keys_match(v, key)))
            .map(|(i, _)| i)
            .collect();

        if let Some(pk) = self.primary_key().map(|c| c.name.clone()) {
            if let Some(new_key) = changes.get(&pk) {
                let clash = targets.len() > 1
                    || targets.iter().any(|&i| self.key_taken(&pk, new_key, Some(i)));
                if clash {
                    return Err(StoreError::Constraint {
                        table: table.to_string(),
                        message: format!("UNIQUE constraint failed: {pk}"),
                    });
                }
            }
        }

        for &i in &targets {
            for (name, value) in changes.iter() {
                self.rows[i].insert(name, value.clone());
            }
        }
        Ok(targets.len())
    }
}

#[derive(Debug, Default)]
struct Inner {
    tables: BTreeMap<String, MemTable>,
    saved: Option<BTreeMap<String, MemTable>>,
}

impl Inner {
    fn table(&self, table: &str) -> StoreResult<&MemTable> {
        self.tables
            .get(table)
            .ok_or_else(|| StoreError::table_not_found(table))
    }

    fn table_mut(&mut self, table: &str) -> StoreResult<&mut MemTable> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| StoreError::table_not_found(table))
    }
}

/// An in-memory local store.
///
/// Enforces declared columns, primary key uniqueness and `NOT NULL`, so
/// malformed rows fail the same way they would against SQLite. A
/// transaction snapshots every table on `begin` and restores the snapshot
/// on `rollback`.
///
/// Faults registered with [`inject`](Self::inject) make the matching
/// operation fail until [`clear_faults`](Self::clear_faults) is called.
///
/// # Example
///
/// ```rust
/// use stockpile_core::{ColumnSpec, ColumnType, LocalStore, MemoryStore};
/// use stockpile_codec::Row;
///
/// let store = MemoryStore::new();
/// store
///     .create_table("items", &[ColumnSpec::auto_id("id"), ColumnSpec::new("name", ColumnType::Text)])
///     .unwrap();
/// store.insert("items", &Row::new().with("name", "Tea")).unwrap();
/// assert_eq!(store.read_all("items").unwrap().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    faults: Mutex<Vec<Fault>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the given operation fail.
    pub fn inject(&self, fault: Fault) {
        self.faults.lock().push(fault);
    }

    /// Removes all injected faults.
    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    /// Drops a table, simulating schema drift.
    pub fn drop_table(&self, table: &str) {
        self.inner.lock().tables.remove(table);
    }

    /// Returns true while a transaction is open.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.inner.lock().saved.is_some()
    }

    fn check_fault(&self, fault: &Fault) -> StoreResult<()> {
        if self.faults.lock().contains(fault) {
            return Err(StoreError::Fault {
                operation: format!("{fault:?}"),
            });
        }
        Ok(())
    }
}

impl LocalStore for MemoryStore {
    fn list_tables(&self) -> StoreResult<Vec<String>> {
        Ok(self.inner.lock().tables.keys().cloned().collect())
    }

    fn create_table(&self, table: &str, columns: &[ColumnSpec]) -> StoreResult<()> {
        self.inner
            .lock()
            .tables
            .entry(table.to_string())
            .or_insert_with(|| MemTable {
                columns: columns.to_vec(),
                rows: Vec::new(),
                counter: 0,
            });
        Ok(())
    }

    fn read_all(&self, table: &str) -> StoreResult<Vec<Row>> {
        self.check_fault(&Fault::ReadAll(table.to_string()))?;
        Ok(self.inner.lock().table(table)?.rows.clone())
    }

    fn read_tables(&self, tables: &[String]) -> StoreResult<Vec<(String, Option<Vec<Row>>)>> {
        for table in tables {
            self.check_fault(&Fault::ReadAll(table.clone()))?;
        }
        let inner = self.inner.lock();
        Ok(tables
            .iter()
            .map(|table| {
                let rows = inner.tables.get(table).map(|t| t.rows.clone());
                (table.clone(), rows)
            })
            .collect())
    }

    fn column_type(&self, table: &str, column: &str) -> StoreResult<Option<ColumnType>> {
        Ok(self
            .inner
            .lock()
            .tables
            .get(table)
            .and_then(|t| t.columns.iter().find(|c| c.name == column))
            .map(|c| c.column_type))
    }

    fn select_eq(&self, table: &str, column: &str, value: &Value) -> StoreResult<Vec<Row>> {
        let inner = self.inner.lock();
        let t = inner.table(table)?;
        t.column(table, column)?;
        Ok(t.rows
            .iter()
            .filter(|r| r.get(column).is_some_and(|v| keys_match(v, value)))
            .cloned()
            .collect())
    }

    fn delete_all(&self, table: &str) -> StoreResult<usize> {
        self.check_fault(&Fault::DeleteAll(table.to_string()))?;
        let mut inner = self.inner.lock();
        let t = inner.table_mut(table)?;
        let count = t.rows.len();
        t.rows.clear();
        Ok(count)
    }

    fn reset_auto_increment(&self, table: &str) -> StoreResult<()> {
        self.check_fault(&Fault::ResetAutoIncrement(table.to_string()))?;
        let mut inner = self.inner.lock();
        let t = inner.table_mut(table)?;
        t.counter = t
            .primary_key()
            .map(|pk| pk.name.clone())
            .and_then(|pk| t.rows.iter().filter_map(|r| r.get(&pk)?.as_i64()).max())
            .unwrap_or(0);
        Ok(())
    }

    fn insert(&self, table: &str, row: &Row) -> StoreResult<()> {
        self.check_fault(&Fault::Insert(table.to_string()))?;
        self.inner.lock().table_mut(table)?.insert(table, row)
    }

    fn update(
        &self,
        table: &str,
        key_column: &str,
        key: &Value,
        changes: &Row,
    ) -> StoreResult<usize> {
        self.inner
            .lock()
            .table_mut(table)?
            .update(table, key_column, key, changes)
    }

    fn delete(&self, table: &str, key_column: &str, key: &Value) -> StoreResult<usize> {
        let mut inner = self.inner.lock();
        let t = inner.table_mut(table)?;
        t.column(table, key_column)?;
        let before = t.rows.len();
        t.rows
            .retain(|r| !r.get(key_column).is_some_and(|v| keys_match(v, key)));
        Ok(before - t.rows.len())
    }

    fn begin(&self) -> StoreResult<()> {
        self.check_fault(&Fault::Begin)?;
        let mut inner = self.inner.lock();
        if inner.saved.is_some() {
            return Err(StoreError::transaction("transaction already active"));
        }
        inner.saved = Some(inner.tables.clone());
        Ok(())
    }

    fn commit(&self) -> StoreResult<()> {
        self.check_fault(&Fault::Commit)?;
        let mut inner = self.inner.lock();
        inner
            .saved
            .take()
            .map(|_| ())
            .ok_or_else(|| StoreError::transaction("no active transaction"))
    }

    fn rollback(&self) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let saved = inner
            .saved
            .take()
            .ok_or_else(|| StoreError::transaction("no active transaction"))?;
        inner.tables = saved;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .create_table(
                "items",
                &[
                    ColumnSpec::auto_id("id"),
                    ColumnSpec::new("name", ColumnType::Text).not_null(),
                    ColumnSpec::new("qty", ColumnType::Integer),
                ],
            )
            .unwrap();
        store
    }

    #[test]
    fn insert_assigns_ids() {
        let store = items();
        store.insert("items", &Row::new().with("name", "a")).unwrap();
        store.insert("items", &Row::new().with("name", "b")).unwrap();

        let rows = store.read_all("items").unwrap();
        assert_eq!(rows[0].get("id"), Some(&Value::Integer(1)));
        assert_eq!(rows[1].get("id"), Some(&Value::Integer(2)));
        assert!(rows[1].get("qty").unwrap().is_null());
    }

    #[test]
    fn insert_rejects_unknown_column() {
        let store = items();
        let err = store
            .insert("items", &Row::new().with("name", "a").with("colour", "red"))
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownColumn { .. }));
    }

    #[test]
    fn insert_rejects_duplicate_and_null() {
        let store = items();
        store
            .insert("items", &Row::new().with("id", 5i64).with("name", "a"))
            .unwrap();
        let dup = store
            .insert("items", &Row::new().with("id", 5i64).with("name", "b"))
            .unwrap_err();
        assert!(matches!(dup, StoreError::Constraint { .. }));

        let null = store
            .insert("items", &Row::new().with("name", Value::Null))
            .unwrap_err();
        assert!(matches!(null, StoreError::Constraint { .. }));
    }

    #[test]
    fn reset_auto_increment_restarts_counter() {
        let store = items();
        store.insert("items", &Row::new().with("name", "a")).unwrap();
        store.insert("items", &Row::new().with("name", "b")).unwrap();
        store.delete_all("items").unwrap();
        store.reset_auto_increment("items").unwrap();
        store.insert("items", &Row::new().with("name", "c")).unwrap();

        let rows = store.read_all("items").unwrap();
        assert_eq!(rows[0].get("id"), Some(&Value::Integer(1)));
    }

    #[test]
    fn update_and_delete_by_key() {
        let store = items();
        store.insert("items", &Row::new().with("name", "a")).unwrap();
        store.insert("items", &Row::new().with("name", "b")).unwrap();

        let updated = store
            .update("items", "id", &Value::from("2"), &Row::new().with("qty", 9i64))
            .unwrap();
        assert_eq!(updated, 1);
        let row = store.find("items", "id", &Value::Integer(2)).unwrap().unwrap();
        assert_eq!(row.get("qty"), Some(&Value::Integer(9)));

        assert_eq!(store.delete("items", "id", &Value::Integer(1)).unwrap(), 1);
        assert_eq!(store.delete("items", "id", &Value::Integer(1)).unwrap(), 0);
        assert_eq!(store.read_all("items").unwrap().len(), 1);
    }

    #[test]
    fn transaction_rollback_restores_tables() {
        let store = items();
        store.insert("items", &Row::new().with("name", "keep")).unwrap();

        store.begin().unwrap();
        store.delete_all("items").unwrap();
        store.insert("items", &Row::new().with("name", "new")).unwrap();
        store.rollback().unwrap();

        let rows = store.read_all("items").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("name"), Some(&Value::from("keep")));
        assert!(!store.in_transaction());
    }

    #[test]
    fn transaction_misuse() {
        let store = items();
        assert!(store.commit().is_err());
        assert!(store.rollback().is_err());
        store.begin().unwrap();
        assert!(store.begin().is_err());
        store.commit().unwrap();
    }

    #[test]
    fn injected_faults() {
        let store = items();
        store.inject(Fault::DeleteAll("items".into()));
        assert!(matches!(
            store.delete_all("items"),
            Err(StoreError::Fault { .. })
        ));
        store.clear_faults();
        assert!(store.delete_all("items").is_ok());
    }

    #[test]
    fn read_tables_marks_missing() {
        let store = items();
        store.insert("items", &Row::new().with("name", "a")).unwrap();
        let read = store
            .read_tables(&["items".to_string(), "gone".to_string()])
            .unwrap();
        assert_eq!(read[0].1.as_ref().map(Vec::len), Some(1));
        assert!(read[1].1.is_none());
        assert!(!store.in_transaction());
        assert_eq!(store.column_type("items", "qty").unwrap(), Some(ColumnType::Integer));
        assert_eq!(store.column_type("gone", "qty").unwrap(), None);
    }

    #[test]
    fn missing_table() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.read_all("nope"),
            Err(StoreError::TableNotFound { .. })
        ));
        assert!(!store.table_exists("nope").unwrap());
    }
}
