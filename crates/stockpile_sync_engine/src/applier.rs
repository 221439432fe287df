//! Applies pulled change events to the local store.

use crate::error::SyncResult;
use std::sync::Arc;
use stockpile_codec::{Row, Value};
use stockpile_core::{ColumnType, LocalStore};
use stockpile_sync_protocol::{ChangeEvent, Operation};

/// What applying an event did to its target table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyEffect {
    /// A row was inserted.
    Inserted,
    /// This many rows were updated.
    Updated(usize),
    /// This many rows were deleted.
    Deleted(usize),
}

/// Replays change events against the local store.
pub struct EventApplier {
    store: Arc<dyn LocalStore>,
    key_column: String,
}

impl EventApplier {
    /// Creates an applier that targets records by `key_column`.
    pub fn new(store: Arc<dyn LocalStore>, key_column: impl Into<String>) -> Self {
        Self {
            store,
            key_column: key_column.into(),
        }
    }

    /// Applies one event.
    ///
    /// - `Insert` writes the payload, adding the key column from the record
    ///   id when the payload lacks it
    /// - `Update` sets every payload column except the key column on the
    ///   record
    /// - `Delete` removes the record
    ///
    /// An update or delete that matches no row is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is missing or the statement fails.
    pub fn apply(&self, event: &ChangeEvent) -> SyncResult<ApplyEffect> {
        let table = event.table_name.as_str();
        let key = self.record_key(table, &event.record_id)?;
        let effect = match event.operation {
            Operation::Insert => {
                let mut row = event.payload.clone();
                if !row.contains(&self.key_column) {
                    row.insert(self.key_column.clone(), key);
                }
                self.store.insert(table, &row)?;
                ApplyEffect::Inserted
            }
            Operation::Update => {
                let changes: Row = event
                    .payload
                    .iter()
                    .filter(|(column, _)| *column != self.key_column)
                    .map(|(column, value)| (column.to_string(), value.clone()))
                    .collect();
                if changes.is_empty() {
                    ApplyEffect::Updated(0)
                } else {
                    ApplyEffect::Updated(self.store.update(table, &self.key_column, &key, &changes)?)
                }
            }
            Operation::Delete => {
                ApplyEffect::Deleted(self.store.delete(table, &self.key_column, &key)?)
            }
        };
        if matches!(effect, ApplyEffect::Updated(0) | ApplyEffect::Deleted(0)) {
            tracing::debug!(
                table,
                record_id = %event.record_id,
                operation = %event.operation,
                "change event matched no rows"
            );
        }
        Ok(effect)
    }

    /// Types the record id after the key column's declared type.
    ///
    /// Only integer key columns get an integer key; text keys such as
    /// `"007"` stay text so they match the stored value exactly.
    fn record_key(&self, table: &str, record_id: &str) -> SyncResult<Value> {
        let key_type = self.store.column_type(table, &self.key_column)?;
        Ok(match (key_type, record_id.parse::<i64>()) {
            (Some(ColumnType::Integer), Ok(id)) => Value::Integer(id),
            _ => Value::Text(record_id.to_string()),
        })
    }
}

impl std::fmt::Debug for EventApplier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventApplier")
            .field("key_column", &self.key_column)
            .finish_non_exhaustive()
    }
}
