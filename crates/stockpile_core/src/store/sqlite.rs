//! SQLite local store.

use super::{ColumnSpec, ColumnType, LocalStore};
use crate::error::{StoreError, StoreResult};
use parking_lot::Mutex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use stockpile_codec::{Row, Value};

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) | ValueRef::Blob(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
    }
}

/// A local store backed by a SQLite database.
///
/// The connection is guarded by a mutex, so the store can be shared across
/// threads. Transactions use `BEGIN IMMEDIATE`; a failed statement inside a
/// transaction rolls back only that statement.
///
/// # Example
///
/// ```no_run
/// use stockpile_core::{LocalStore, SqliteStore};
/// use std::path::Path;
///
/// let store = SqliteStore::open(Path::new("pos.sqlite")).unwrap();
/// for table in store.list_tables().unwrap() {
///     println!("{table}");
/// }
/// ```
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens or creates a database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        // journal_mode answers with the resulting mode, so it is read as a row.
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self::from_connection(conn))
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the database.
    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    /// Wraps an existing connection.
    #[must_use]
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn ensure_table(conn: &Connection, table: &str) -> StoreResult<()> {
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get(0),
            )
            .optional()?;
        match exists {
            Some(_) => Ok(()),
            None => Err(StoreError::table_not_found(table)),
        }
    }

    fn table_present(conn: &Connection, table: &str) -> StoreResult<bool> {
        match Self::ensure_table(conn, table) {
            Ok(()) => Ok(true),
            Err(StoreError::TableNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn select_all(conn: &Connection, table: &str) -> StoreResult<Vec<Row>> {
        let sql = format!("SELECT * FROM {} ORDER BY rowid", quote_ident(table));
        Self::query_rows(conn, &sql, &[])
    }

    fn query_rows(
        conn: &Connection,
        sql: &str,
        params: &[SqlValue],
    ) -> StoreResult<Vec<Row>> {
        let mut stmt = conn.prepare(sql)?;
        let names: Vec<String> = stmt.column_names().iter().map(|n| n.to_string()).collect();
        let mut rows = stmt.query(params_from_iter(params.iter()))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Row::new();
            for (i, name) in names.iter().enumerate() {
                record.insert(name.clone(), from_sql(row.get_ref(i)?));
            }
            out.push(record);
        }
        Ok(out)
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl LocalStore for SqliteStore {
    fn list_tables(&self) -> StoreResult<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn create_table(&self, table: &str, columns: &[ColumnSpec]) -> StoreResult<()> {
        let defs: Vec<String> = columns
            .iter()
            .map(|c| {
                let mut def = format!("{} {}", quote_ident(&c.name), c.column_type.sql_name());
                if c.primary_key {
                    def.push_str(" PRIMARY KEY");
                    if c.autoincrement {
                        def.push_str(" AUTOINCREMENT");
                    }
                }
                if c.not_null {
                    def.push_str(" NOT NULL");
                }
                def
            })
            .collect();
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(table),
            defs.join(", ")
        );
        self.conn.lock().execute(&sql, [])?;
        Ok(())
    }

    fn read_all(&self, table: &str) -> StoreResult<Vec<Row>> {
        let conn = self.conn.lock();
        Self::ensure_table(&conn, table)?;
        Self::select_all(&conn, table)
    }

    fn read_tables(&self, tables: &[String]) -> StoreResult<Vec<(String, Option<Vec<Row>>)>> {
        let conn = self.conn.lock();
        let outer = conn.is_autocommit();
        // A savepoint nests inside an open transaction and otherwise opens a
        // deferred read transaction, so other connections cannot interleave.
        conn.execute_batch("SAVEPOINT stockpile_read")?;

        let result = tables
            .iter()
            .map(|table| {
                let rows = if Self::table_present(&conn, table)? {
                    Some(Self::select_all(&conn, table)?)
                } else {
                    None
                };
                Ok((table.clone(), rows))
            })
            .collect::<StoreResult<Vec<_>>>();

        if let Err(e) = conn.execute_batch("RELEASE stockpile_read") {
            if outer && !conn.is_autocommit() {
                if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                    tracing::error!(error = %rollback, "failed to close read transaction");
                }
            }
            return Err(e.into());
        }
        result
    }

    fn column_type(&self, table: &str, column: &str) -> StoreResult<Option<ColumnType>> {
        let conn = self.conn.lock();
        let declared: Option<String> = conn
            .query_row(
                "SELECT type FROM pragma_table_info(?1) WHERE name = ?2",
                [table, column],
                |row| row.get(0),
            )
            .optional()?;
        Ok(declared.as_deref().and_then(ColumnType::from_declared))
    }

    fn select_eq(&self, table: &str, column: &str, value: &Value) -> StoreResult<Vec<Row>> {
        let conn = self.conn.lock();
        Self::ensure_table(&conn, table)?;
        let sql = format!(
            "SELECT * FROM {} WHERE {} = ?1 ORDER BY rowid",
            quote_ident(table),
            quote_ident(column)
        );
        Self::query_rows(&conn, &sql, &[to_sql(value)])
    }

    fn delete_all(&self, table: &str) -> StoreResult<usize> {
        let conn = self.conn.lock();
        Self::ensure_table(&conn, table)?;
        Ok(conn.execute(&format!("DELETE FROM {}", quote_ident(table)), [])?)
    }

    fn reset_auto_increment(&self, table: &str) -> StoreResult<()> {
        let conn = self.conn.lock();
        let has_sequence: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'sqlite_sequence'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        if has_sequence.is_some() {
            conn.execute("DELETE FROM sqlite_sequence WHERE name = ?1", [table])?;
        }
        Ok(())
    }

    fn insert(&self, table: &str, row: &Row) -> StoreResult<()> {
        let conn = self.conn.lock();
        if row.is_empty() {
            conn.execute(
                &format!("INSERT INTO {} DEFAULT VALUES", quote_ident(table)),
                [],
            )?;
            return Ok(());
        }

        let columns: Vec<String> = row.column_names().map(quote_ident).collect();
        let placeholders: Vec<String> = (1..=row.len()).map(|i| format!("?{i}")).collect();
        let values: Vec<SqlValue> = row.iter().map(|(_, v)| to_sql(v)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            columns.join(", "),
            placeholders.join(", ")
        );
        conn.execute(&sql, params_from_iter(values.iter()))?;
        Ok(())
    }

    fn update(
        &self,
        table: &str,
        key_column: &str,
        key: &Value,
        changes: &Row,
    ) -> StoreResult<usize> {
        if changes.is_empty() {
            return Ok(0);
        }
        let assignments: Vec<String> = changes
            .column_names()
            .enumerate()
            .map(|(i, name)| format!("{} = ?{}", quote_ident(name), i + 1))
            .collect();
        let mut values: Vec<SqlValue> = changes.iter().map(|(_, v)| to_sql(v)).collect();
        values.push(to_sql(key));
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            quote_ident(table),
            assignments.join(", "),
            quote_ident(key_column),
            values.len()
        );
        Ok(self
            .conn
            .lock()
            .execute(&sql, params_from_iter(values.iter()))?)
    }

    fn delete(&self, table: &str, key_column: &str, key: &Value) -> StoreResult<usize> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1",
            quote_ident(table),
            quote_ident(key_column)
        );
        Ok(self.conn.lock().execute(&sql, [to_sql(key)])?)
    }

    fn begin(&self) -> StoreResult<()> {
        let conn = self.conn.lock();
        if !conn.is_autocommit() {
            return Err(StoreError::transaction("transaction already active"));
        }
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn commit(&self) -> StoreResult<()> {
        let conn = self.conn.lock();
        if conn.is_autocommit() {
            return Err(StoreError::transaction("no active transaction"));
        }
        conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&self) -> StoreResult<()> {
        let conn = self.conn.lock();
        if conn.is_autocommit() {
            return Err(StoreError::transaction("no active transaction"));
        }
        conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}
