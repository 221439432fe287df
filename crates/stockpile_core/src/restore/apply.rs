//! Transactional apply of a decoded snapshot.

use crate::config::BackupConfig;
use crate::error::{CoreError, CoreResult};
use crate::store::LocalStore;
use serde_json::Value as JsonValue;
use stockpile_codec::{Row, SnapshotDocument, TableData, Value};

/// What happened to one table of the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableStatus {
    /// Existing rows were replaced by the snapshot rows.
    Replaced {
        /// Rows deleted before inserting.
        deleted: usize,
        /// Snapshot rows inserted.
        inserted: usize,
        /// Snapshot rows that failed to insert.
        skipped: usize,
    },
    /// The table does not exist in the live schema.
    Missing,
    /// The table is protected from restores.
    Protected,
}

/// Outcome for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOutcome {
    /// Table name.
    pub table: String,
    /// What happened.
    pub status: TableStatus,
}

/// What happened to one snapshot row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordStatus {
    /// The row was inserted.
    Inserted,
    /// The row was skipped.
    Skipped {
        /// Why the insert failed.
        reason: String,
    },
}

/// Outcome for one snapshot row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    /// Table name.
    pub table: String,
    /// Position of the row in the snapshot table.
    pub index: usize,
    /// What happened.
    pub status: RecordStatus,
}

/// Result of a committed restore.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Decode strategy that read the payload.
    pub strategy: &'static str,
    /// One entry per snapshot table, in document order.
    pub tables: Vec<TableOutcome>,
    /// One entry per row of every replaced table.
    pub records: Vec<RecordOutcome>,
}

impl RestoreReport {
    /// Number of rows inserted.
    #[must_use]
    pub fn restored_rows(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.status == RecordStatus::Inserted)
            .count()
    }

    /// Number of rows skipped.
    #[must_use]
    pub fn skipped_rows(&self) -> usize {
        self.records.len() - self.restored_rows()
    }

    /// Names of tables left untouched (missing or protected).
    #[must_use]
    pub fn skipped_tables(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|t| !matches!(t.status, TableStatus::Replaced { .. }))
            .map(|t| t.table.as_str())
            .collect()
    }
}

/// Union of row keys in first-seen order.
fn column_union(rows: &[JsonValue]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        if let JsonValue::Object(object) = row {
            for key in object.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
    }
    columns
}

/// Builds the insert row; every column is bound, absent fields as `NULL`.
fn full_row(columns: &[String], json: &JsonValue) -> Option<Row> {
    let JsonValue::Object(object) = json else {
        return None;
    };
    Some(
        columns
            .iter()
            .map(|c| (c.clone(), object.get(c).map_or(Value::Null, Value::from_json)))
            .collect(),
    )
}

fn replace_table(
    store: &dyn LocalStore,
    data: &TableData,
    records: &mut Vec<RecordOutcome>,
) -> CoreResult<TableStatus> {
    let deleted = store.delete_all(&data.name)?;
    store.reset_auto_increment(&data.name)?;

    let columns = column_union(&data.rows);
    let mut inserted = 0;
    let mut skipped = 0;

    for (index, json) in data.rows.iter().enumerate() {
        let result = match full_row(&columns, json) {
            Some(row) => store.insert(&data.name, &row).map_err(|e| e.to_string()),
            None => Err("row is not an object".to_string()),
        };
        let status = match result {
            Ok(()) => {
                inserted += 1;
                RecordStatus::Inserted
            }
            Err(reason) => {
                skipped += 1;
                tracing::warn!(table = %data.name, index, %reason, "skipping snapshot row");
                RecordStatus::Skipped { reason }
            }
        };
        records.push(RecordOutcome {
            table: data.name.clone(),
            index,
            status,
        });
    }

    Ok(TableStatus::Replaced {
        deleted,
        inserted,
        skipped,
    })
}

fn apply_tables(
    store: &dyn LocalStore,
    config: &BackupConfig,
    document: &SnapshotDocument,
) -> CoreResult<RestoreReport> {
    let live = store.list_tables()?;
    let mut report = RestoreReport::default();

    for data in &document.tables {
        let status = if config.is_protected(&data.name) {
            tracing::info!(table = %data.name, "skipping protected table");
            TableStatus::Protected
        } else if !live.contains(&data.name) {
            tracing::warn!(table = %data.name, "table not in live schema, skipping");
            TableStatus::Missing
        } else {
            replace_table(store, data, &mut report.records)?
        };
        report.tables.push(TableOutcome {
            table: data.name.clone(),
            status,
        });
    }
    Ok(report)
}

/// Replaces table contents with the snapshot inside one transaction.
///
/// Row failures are recorded and skipped. Any other failure rolls the
/// transaction back, leaving every table as it was.
///
/// # Errors
///
/// Returns [`CoreError::Transaction`] if the transaction could not be
/// completed.
pub fn apply(
    store: &dyn LocalStore,
    config: &BackupConfig,
    document: &SnapshotDocument,
) -> CoreResult<RestoreReport> {
    apply_then(store, config, document, |_| Ok(()))
}

/// Like [`apply`], but runs `before_commit` once every table is replaced
/// and before the transaction commits. An error from `before_commit` rolls
/// the restore back.
///
/// # Errors
///
/// Returns [`CoreError::Transaction`] if the transaction could not be
/// completed or `before_commit` failed.
pub fn apply_then(
    store: &dyn LocalStore,
    config: &BackupConfig,
    document: &SnapshotDocument,
    before_commit: impl FnOnce(&RestoreReport) -> CoreResult<()>,
) -> CoreResult<RestoreReport> {
    store
        .begin()
        .map_err(|e| CoreError::transaction(format!("begin failed: {e}")))?;

    let outcome = apply_tables(store, config, document).and_then(|report| {
        before_commit(&report)?;
        store
            .commit()
            .map_err(|e| CoreError::transaction(format!("commit failed: {e}")))?;
        Ok(report)
    });

    match outcome {
        Ok(report) => Ok(report),
        Err(e) => {
            if let Err(rollback_err) = store.rollback() {
                tracing::error!(error = %rollback_err, "rollback after failed restore also failed");
            }
            Err(match e {
                CoreError::Transaction { .. } => e,
                other => CoreError::transaction(other.to_string()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ColumnSpec, ColumnType, Fault, MemoryStore};
    use serde_json::json;

    fn store() -> MemoryStore {
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
            .create_table(
                "categories",
                &[ColumnSpec::auto_id("id"), ColumnSpec::new("label", ColumnType::Text)],
            )
            .unwrap();
        store
            .create_table("sync_log", &[ColumnSpec::new("id", ColumnType::Text)])
            .unwrap();
        store.insert("items", &Row::new().with("name", "old")).unwrap();
        store.insert("categories", &Row::new().with("label", "old")).unwrap();
        store.insert("sync_log", &Row::new().with("id", "evt")).unwrap();
        store
    }

    fn doc(data: JsonValue) -> SnapshotDocument {
        SnapshotDocument::from_json(json!({ "data": data })).unwrap()
    }

    #[test]
    fn replaces_tables() {
        let store = store();
        let report = apply(
            &store,
            &BackupConfig::default(),
            &doc(json!({
                "items": [{"id": 4, "name": "Tea", "qty": 2}, {"id": 9, "name": "Milk"}],
                "categories": []
            })),
        )
        .unwrap();

        let items = store.read_all("items").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].get("qty"), Some(&Value::Null));
        assert!(store.read_all("categories").unwrap().is_empty());
        assert_eq!(report.restored_rows(), 2);
        assert_eq!(
            report.tables[0].status,
            TableStatus::Replaced { deleted: 1, inserted: 2, skipped: 0 }
        );
    }

    #[test]
    fn skips_missing_and_protected_tables() {
        let store = store();
        let report = apply(
            &store,
            &BackupConfig::default(),
            &doc(json!({"ghost": [{"a": 1}], "sync_log": [], "items": []})),
        )
        .unwrap();

        assert_eq!(report.skipped_tables(), ["ghost", "sync_log"]);
        assert_eq!(store.read_all("sync_log").unwrap().len(), 1);
        assert!(store.read_all("items").unwrap().is_empty());
    }

    #[test]
    fn bad_rows_are_skipped_not_fatal() {
        let store = store();
        let report = apply(
            &store,
            &BackupConfig::default(),
            &doc(json!({"items": [
                {"id": 1, "name": "ok"},
                {"id": 2, "name": null},
                "garbage",
                {"id": 1, "name": "dup"},
                {"id": 3, "name": "ok too"}
            ]})),
        )
        .unwrap();

        assert_eq!(report.restored_rows(), 2);
        assert_eq!(report.skipped_rows(), 3);
        let skipped: Vec<usize> = report
            .records
            .iter()
            .filter(|r| r.status != RecordStatus::Inserted)
            .map(|r| r.index)
            .collect();
        assert_eq!(skipped, [1, 2, 3]);
        assert_eq!(store.read_all("items").unwrap().len(), 2);
    }

    #[test]
    fn table_failure_rolls_back_everything() {
        let store = store();
        store.inject(Fault::DeleteAll("categories".into()));

        let err = apply(
            &store,
            &BackupConfig::default(),
            &doc(json!({
                "items": [{"name": "new"}],
                "categories": [{"label": "new"}]
            })),
        )
        .unwrap_err();

        assert!(matches!(err, CoreError::Transaction { .. }));
        let items = store.read_all("items").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].get("name"), Some(&Value::from("old")));
        assert_eq!(store.read_all("categories").unwrap().len(), 1);
        assert!(!store.in_transaction());
    }

    #[test]
    fn commit_failure_rolls_back() {
        let store = store();
        store.inject(Fault::Commit);
        let err = apply(&store, &BackupConfig::default(), &doc(json!({"items": []}))).unwrap_err();
        assert!(matches!(err, CoreError::Transaction { .. }));
        assert_eq!(store.read_all("items").unwrap().len(), 1);
    }

    #[test]
    fn before_commit_failure_rolls_back() {
        let store = store();
        let err = apply_then(
            &store,
            &BackupConfig::default(),
            &doc(json!({"items": [{"name": "new"}]})),
            |report| {
                assert_eq!(report.restored_rows(), 1);
                Err(CoreError::schema("pointer not saved"))
            },
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Transaction { .. }));
        let items = store.read_all("items").unwrap();
        assert_eq!(items[0].get("name"), Some(&Value::from("old")));
        assert!(!store.in_transaction());
    }

    #[test]
    fn begin_failure_touches_nothing() {
        let store = store();
        store.inject(Fault::Begin);
        assert!(apply(&store, &BackupConfig::default(), &doc(json!({"items": []}))).is_err());
        assert_eq!(store.read_all("items").unwrap().len(), 1);
    }

    #[test]
    fn column_union_first_seen() {
        let cols = column_union(&[json!({"b": 1, "a": 2}), json!("x"), json!({"c": 3, "a": 4})]);
        assert_eq!(cols, ["b", "a", "c"]);
    }
}
