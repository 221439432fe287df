//! Local change log.
//!
//! Every logged mutation and every applied remote event is kept as a row of
//! the change-log table. Rows are never deleted; the only update is the
//! one-way `synced` flag.

use crate::error::SyncResult;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use stockpile_codec::{Row, Value};
use stockpile_core::{ColumnSpec, ColumnType, LocalStore};
use stockpile_sync_protocol::{columns, ChangeEvent};

/// Change-log table access.
pub struct ChangeLog {
    store: Arc<dyn LocalStore>,
    table: String,
}

impl ChangeLog {
    /// Creates a change log over `table`.
    pub fn new(store: Arc<dyn LocalStore>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }

    /// Returns the table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Creates the table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be created.
    pub fn ensure_table(&self) -> SyncResult<()> {
        let schema = [
            ColumnSpec::new(columns::ID, ColumnType::Text).primary_key(),
            ColumnSpec::new(columns::TABLE_NAME, ColumnType::Text).not_null(),
            ColumnSpec::new(columns::OPERATION, ColumnType::Text).not_null(),
            ColumnSpec::new(columns::RECORD_ID, ColumnType::Text).not_null(),
            ColumnSpec::new(columns::DATA, ColumnType::Text),
            ColumnSpec::new(columns::TIMESTAMP, ColumnType::Text).not_null(),
            ColumnSpec::new(columns::DEVICE_ID, ColumnType::Text).not_null(),
            ColumnSpec::new(columns::SYNCED, ColumnType::Integer).not_null(),
        ];
        self.store.create_table(&self.table, &schema)?;
        Ok(())
    }

    /// Appends an event.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails, including for a duplicate id.
    pub fn append(&self, event: &ChangeEvent) -> SyncResult<()> {
        self.store.insert(&self.table, &event.to_row())?;
        Ok(())
    }

    /// Returns true if an event with this id is logged.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be read.
    pub fn contains(&self, id: &str) -> SyncResult<bool> {
        Ok(self
            .store
            .find(&self.table, columns::ID, &Value::from(id))?
            .is_some())
    }

    /// Returns up to `limit` unsynced events created on `device_id`, oldest
    /// first.
    ///
    /// Rows that cannot be read as events are logged and left out.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be read.
    pub fn pending(&self, device_id: &str, limit: usize) -> SyncResult<Vec<ChangeEvent>> {
        let rows = self
            .store
            .select_eq(&self.table, columns::SYNCED, &Value::Bool(false))?;
        let mut events: Vec<ChangeEvent> = self
            .decode_rows(rows)
            .into_iter()
            .filter(|e| e.origin_device_id == device_id)
            .collect();
        events.sort_by_key(|e| e.timestamp);
        events.truncate(limit);
        Ok(events)
    }

    /// Flips `synced` to true for one event.
    ///
    /// Returns false if no such event is logged.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn mark_synced(&self, id: &str) -> SyncResult<bool> {
        let changes = Row::new().with(columns::SYNCED, true);
        let updated = self
            .store
            .update(&self.table, columns::ID, &Value::from(id), &changes)?;
        Ok(updated > 0)
    }

    /// Returns every readable event, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be read.
    pub fn events(&self) -> SyncResult<Vec<ChangeEvent>> {
        let mut events = self.decode_rows(self.store.read_all(&self.table)?);
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    /// Returns the newest timestamp of an event created on `device_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be read.
    pub fn latest_timestamp(&self, device_id: &str) -> SyncResult<Option<DateTime<Utc>>> {
        let rows = self
            .store
            .select_eq(&self.table, columns::DEVICE_ID, &Value::from(device_id))?;
        Ok(self.decode_rows(rows).iter().map(|e| e.timestamp).max())
    }

    fn decode_rows(&self, rows: Vec<Row>) -> Vec<ChangeEvent> {
        rows.iter()
            .filter_map(|row| match ChangeEvent::from_row(row) {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::warn!(table = %self.table, error = %e, "ignoring unreadable change-log row");
                    None
                }
            })
            .collect()
    }
}

impl std::fmt::Debug for ChangeLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeLog")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use stockpile_core::MemoryStore;
    use stockpile_sync_protocol::Operation;

    fn log() -> ChangeLog {
        let log = ChangeLog::new(Arc::new(MemoryStore::new()), "sync_log");
        log.ensure_table().unwrap();
        log
    }

    fn event(device: &str, second: u32) -> ChangeEvent {
        ChangeEvent::new(
            "inventory_items",
            Operation::Update,
            "SKU001",
            Row::new().with("quantity", i64::from(second)),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, second).unwrap(),
            device,
        )
    }

    #[test]
    fn pending_is_own_unsynced_in_time_order() {
        let log = log();
        let late = event("a", 30);
        let early = event("a", 10);
        log.append(&late).unwrap();
        log.append(&early).unwrap();
        log.append(&event("b", 20)).unwrap();
        log.append(&event("a", 5).into_synced()).unwrap();

        let pending = log.pending("a", 10).unwrap();
        let ids: Vec<&str> = pending.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec![early.id.as_str(), late.id.as_str()]);
        assert_eq!(log.pending("a", 1).unwrap().len(), 1);
    }

    #[test]
    fn mark_synced_is_one_way() {
        let log = log();
        let e = event("a", 1);
        log.append(&e).unwrap();

        assert!(log.mark_synced(&e.id).unwrap());
        assert!(log.pending("a", 10).unwrap().is_empty());
        assert!(log.events().unwrap()[0].synced);
        assert!(!log.mark_synced("missing").unwrap());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let log = log();
        let e = event("a", 1);
        log.append(&e).unwrap();
        assert!(log.contains(&e.id).unwrap());
        assert!(log.append(&e).is_err());
        assert_eq!(log.events().unwrap().len(), 1);
    }

    #[test]
    fn latest_timestamp_per_device() {
        let log = log();
        log.append(&event("a", 7)).unwrap();
        log.append(&event("a", 3)).unwrap();
        log.append(&event("b", 50)).unwrap();
        assert_eq!(
            log.latest_timestamp("a").unwrap(),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 7).unwrap())
        );
        assert_eq!(log.latest_timestamp("c").unwrap(), None);
    }
}
