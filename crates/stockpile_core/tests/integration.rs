//! Integration tests for the backup and versioning engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use stockpile_codec::{Row, Value};
use stockpile_core::{
    BackupConfig, ColumnSpec, ColumnType, CoreError, EncryptionKey, Fault, LocalStore,
    MemoryStore, RestoreEngine, RollbackStatus, SnapshotExporter, SqliteStore, StoreGate,
    TransformPipeline, VersionLedger, CHANGE_LOG_TABLE, LEDGER_KEY, PLAINTEXT,
};
use stockpile_storage::{
    BlobRepository, FileRepository, FileStateStore, MemoryRepository, MemoryStateStore,
    StateStore, StorageError, StorageResult,
};
use tempfile::tempdir;

struct Harness {
    store: Arc<MemoryStore>,
    repo: Arc<MemoryRepository>,
    state: Arc<MemoryStateStore>,
    ledger: VersionLedger,
}

fn create_schema(store: &dyn LocalStore) {
    store
        .create_table(
            "inventory_items",
            &[
                ColumnSpec::auto_id("id"),
                ColumnSpec::new("sku", ColumnType::Text).not_null(),
                ColumnSpec::new("quantity", ColumnType::Integer),
            ],
        )
        .unwrap();
    store
        .create_table(
            "categories",
            &[
                ColumnSpec::auto_id("id"),
                ColumnSpec::new("name", ColumnType::Text),
            ],
        )
        .unwrap();
    store
        .create_table(
            CHANGE_LOG_TABLE,
            &[
                ColumnSpec::new("id", ColumnType::Text).primary_key(),
                ColumnSpec::new("table_name", ColumnType::Text),
            ],
        )
        .unwrap();
}

fn config() -> BackupConfig {
    BackupConfig::new(["inventory_items", "categories", CHANGE_LOG_TABLE])
}

fn open_ledger(
    store: Arc<dyn LocalStore>,
    repo: Arc<dyn BlobRepository>,
    state: Arc<dyn StateStore>,
    pipeline: TransformPipeline,
) -> VersionLedger {
    let pipeline = Arc::new(pipeline);
    let gate = Arc::new(StoreGate::new());
    let exporter = SnapshotExporter::new(store.clone(), config(), pipeline.clone(), gate.clone());
    let restorer = RestoreEngine::new(store, config(), pipeline, gate);
    VersionLedger::open(exporter, restorer, repo, state).unwrap()
}

fn harness(pipeline: TransformPipeline) -> Harness {
    let store = Arc::new(MemoryStore::new());
    create_schema(store.as_ref());
    let repo = Arc::new(MemoryRepository::new());
    let state = Arc::new(MemoryStateStore::new());
    let ledger = open_ledger(store.clone(), repo.clone(), state.clone(), pipeline);
    Harness {
        store,
        repo,
        state,
        ledger,
    }
}

fn add_item(store: &dyn LocalStore, sku: &str, quantity: i64) {
    store
        .insert(
            "inventory_items",
            &Row::new().with("sku", sku).with("quantity", quantity),
        )
        .unwrap();
}

fn skus(store: &dyn LocalStore) -> Vec<String> {
    store
        .read_all("inventory_items")
        .unwrap()
        .iter()
        .filter_map(|r| r.get("sku").and_then(Value::as_text).map(str::to_string))
        .collect()
}

#[test]
fn first_versions_on_empty_store() {
    let h = harness(TransformPipeline::plain());

    let v1 = h.ledger.create_version(Some("initial")).unwrap();
    let v2 = h.ledger.create_version(None).unwrap();

    assert_eq!(v1.version, 1);
    assert_eq!(v1.description.as_deref(), Some("initial"));
    assert_eq!(v2.version, 2);
    assert_eq!(h.ledger.current_version(), Some(2));
    assert_eq!(h.repo.len(), 2);
}

#[test]
fn versions_strictly_increase() {
    let h = harness(TransformPipeline::plain());
    let versions: Vec<u64> = (0..5)
        .map(|_| h.ledger.create_version(None).unwrap().version)
        .collect();
    assert_eq!(versions, vec![1, 2, 3, 4, 5]);
}

#[test]
fn rollback_restores_older_snapshot() {
    let h = harness(TransformPipeline::plain());
    add_item(h.store.as_ref(), "SKU001", 10);
    h.ledger.create_version(Some("one item")).unwrap();
    add_item(h.store.as_ref(), "SKU002", 4);
    h.ledger.create_version(None).unwrap();
    add_item(h.store.as_ref(), "SKU003", 1);
    h.ledger.create_version(None).unwrap();

    let report = h.ledger.rollback_to(1).unwrap();

    assert_eq!(skus(h.store.as_ref()), vec!["SKU001"]);
    assert_eq!(report.strategy, PLAINTEXT);
    assert_eq!(h.ledger.current_version(), Some(1));
    assert_eq!(h.ledger.list().len(), 3);

    let history = h.ledger.rollback_history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].from_version, Some(3));
    assert_eq!(history[0].to_version, 1);
    assert_eq!(history[0].status, RollbackStatus::Success);
    assert!(history[0].error_message.is_none());
}

#[test]
fn version_after_rollback_is_never_reused() {
    let h = harness(TransformPipeline::plain());
    for _ in 0..3 {
        h.ledger.create_version(None).unwrap();
    }
    h.ledger.rollback_to(1).unwrap();

    let next = h.ledger.create_version(None).unwrap();
    assert_eq!(next.version, 4);
    assert_eq!(h.ledger.current_version(), Some(4));
}

#[test]
fn rollback_to_missing_version() {
    let h = harness(TransformPipeline::plain());
    h.ledger.create_version(None).unwrap();

    let err = h.ledger.rollback_to(9).unwrap_err();

    assert!(matches!(err, CoreError::VersionNotFound { version: 9 }));
    assert_eq!(h.ledger.current_version(), Some(1));
    let history = h.ledger.rollback_history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, RollbackStatus::Failed);
    assert!(history[0].error_message.is_some());
}

#[test]
fn failed_restore_leaves_pointer_and_store() {
    let h = harness(TransformPipeline::plain());
    add_item(h.store.as_ref(), "SKU001", 1);
    h.ledger.create_version(None).unwrap();
    add_item(h.store.as_ref(), "SKU002", 2);
    h.ledger.create_version(None).unwrap();

    h.store.inject(Fault::DeleteAll("categories".into()));
    let err = h.ledger.rollback_to(1).unwrap_err();

    assert!(matches!(err, CoreError::Rollback { from: Some(2), to: 1, .. }));
    assert_eq!(skus(h.store.as_ref()), vec!["SKU001", "SKU002"]);
    assert_eq!(h.ledger.current_version(), Some(2));
    assert_eq!(
        h.ledger.rollback_history()[0].status,
        RollbackStatus::Failed
    );
}

#[test]
fn tampered_blob_is_rejected() {
    let h = harness(TransformPipeline::plain());
    add_item(h.store.as_ref(), "SKU001", 1);
    let v1 = h.ledger.create_version(None).unwrap();
    add_item(h.store.as_ref(), "SKU002", 2);
    h.ledger.create_version(None).unwrap();

    let forged = br#"{"metadata":{},"data":{"inventory_items":[]}}"#.to_vec();
    h.repo.tamper(&v1.snapshot.blob_name, forged);

    assert!(h.ledger.rollback_to(1).is_err());
    assert_eq!(skus(h.store.as_ref()).len(), 2);
    assert_eq!(h.ledger.current_version(), Some(2));
}

#[test]
fn unreachable_repository_fails_rollback() {
    let h = harness(TransformPipeline::plain());
    h.ledger.create_version(None).unwrap();
    h.ledger.create_version(None).unwrap();

    h.repo.set_available(false);
    assert!(h.ledger.rollback_to(1).is_err());
    assert!(h.ledger.create_version(None).is_err());
    h.repo.set_available(true);

    assert_eq!(h.ledger.current_version(), Some(2));
    assert_eq!(h.ledger.list().len(), 2);
    assert_eq!(h.ledger.create_version(None).unwrap().version, 3);
}

#[test]
fn cleanup_keeps_highest_versions() {
    let h = harness(TransformPipeline::plain());
    for _ in 0..5 {
        h.ledger.create_version(None).unwrap();
    }

    let report = h.ledger.cleanup_old_versions(2).unwrap();

    assert_eq!(report.removed_versions, vec![1, 2, 3]);
    assert_eq!(report.removed_blobs, 3);
    let kept: Vec<u64> = h.ledger.list().iter().map(|r| r.version).collect();
    assert_eq!(kept, vec![4, 5]);
    assert_eq!(h.repo.len(), 2);
    for record in h.ledger.list() {
        assert!(h.repo.get(&record.snapshot.blob_name).is_ok());
    }
}

#[test]
fn cleanup_with_fewer_versions_than_keep() {
    let h = harness(TransformPipeline::plain());
    h.ledger.create_version(None).unwrap();
    h.ledger.create_version(None).unwrap();

    let report = h.ledger.cleanup_old_versions(10).unwrap();

    assert!(report.removed_versions.is_empty());
    assert_eq!(h.ledger.list().len(), 2);
}

#[test]
fn cleanup_does_not_move_current_pointer() {
    let h = harness(TransformPipeline::plain());
    for _ in 0..3 {
        h.ledger.create_version(None).unwrap();
    }
    h.ledger.rollback_to(1).unwrap();
    h.ledger.cleanup_old_versions(1).unwrap();

    assert_eq!(h.ledger.current_version(), Some(1));
    assert!(h.ledger.by_version(1).is_none());
    assert_eq!(h.ledger.latest().unwrap().version, 3);
}

#[test]
fn change_log_survives_rollback() {
    let h = harness(TransformPipeline::plain());
    h.ledger.create_version(None).unwrap();
    h.store
        .insert(
            CHANGE_LOG_TABLE,
            &Row::new()
                .with("id", "evt-1")
                .with("table_name", "inventory_items"),
        )
        .unwrap();

    h.ledger.rollback_to(1).unwrap();

    assert_eq!(h.store.read_all(CHANGE_LOG_TABLE).unwrap().len(), 1);
}

#[test]
fn encrypted_versions_round_trip() {
    let key = EncryptionKey::generate();
    let h = harness(TransformPipeline::encrypted(&key));
    add_item(h.store.as_ref(), "SKU001", 3);
    let v1 = h.ledger.create_version(None).unwrap();
    add_item(h.store.as_ref(), "SKU002", 3);

    let blob = h.repo.get(&v1.snapshot.blob_name).unwrap();
    assert!(stockpile_codec::parse_json(&blob).is_err());

    h.ledger.rollback_to(1).unwrap();
    assert_eq!(skus(h.store.as_ref()), vec!["SKU001"]);
}

#[test]
fn legacy_plain_snapshot_restores_with_key_configured() {
    let key = EncryptionKey::generate();
    let store = Arc::new(MemoryStore::new());
    create_schema(store.as_ref());
    let restorer = RestoreEngine::new(
        store.clone(),
        config(),
        Arc::new(TransformPipeline::encrypted(&key)),
        Arc::new(StoreGate::new()),
    );

    let legacy = br#"{"metadata":{"exportDate":"2023-05-01T10:00:00.000Z","version":1},
        "data":{"inventory_items":[{"id":7,"sku":"OLD","quantity":2}],"categories":[]}}"#;
    let report = restorer.restore(legacy).unwrap();

    assert_eq!(report.strategy, PLAINTEXT);
    assert_eq!(skus(store.as_ref()), vec!["OLD"]);
}

#[test]
fn ledger_state_survives_reopen() {
    let h = harness(TransformPipeline::plain());
    h.ledger.create_version(Some("keep me")).unwrap();
    h.ledger.create_version(None).unwrap();
    h.ledger.rollback_to(1).unwrap();

    let reopened = open_ledger(
        h.store.clone(),
        h.repo.clone(),
        h.state.clone(),
        TransformPipeline::plain(),
    );

    assert_eq!(reopened.current_version(), Some(1));
    assert_eq!(reopened.list().len(), 2);
    assert_eq!(
        reopened.by_version(1).unwrap().description.as_deref(),
        Some("keep me")
    );
    assert_eq!(reopened.rollback_history().len(), 1);
    assert_eq!(reopened.create_version(None).unwrap().version, 3);
}

#[test]
fn lookups_by_id_and_signed_url() {
    let h = harness(TransformPipeline::plain());
    let v1 = h.ledger.create_version(None).unwrap();

    let found = h.ledger.by_id(&v1.snapshot.id).unwrap();
    assert_eq!(found.version, 1);
    assert!(h.ledger.by_id("missing").is_none());

    let url = h.ledger.signed_url(1, None).unwrap();
    assert!(url.contains(&v1.snapshot.blob_name));
    assert!(matches!(
        h.ledger.signed_url(5, None),
        Err(CoreError::VersionNotFound { version: 5 })
    ));
}

#[test]
fn restore_latest_on_empty_ledger() {
    let h = harness(TransformPipeline::plain());
    assert!(matches!(
        h.ledger.restore_latest(),
        Err(CoreError::VersionNotFound { .. })
    ));
}

#[test]
fn sqlite_and_files_end_to_end() {
    let dir = tempdir().unwrap();
    let store: Arc<dyn LocalStore> =
        Arc::new(SqliteStore::open(&dir.path().join("app.db")).unwrap());
    create_schema(store.as_ref());
    let repo = Arc::new(FileRepository::open(&dir.path().join("blobs")).unwrap());
    let state = Arc::new(FileStateStore::open(&dir.path().join("state")).unwrap());
    let key = EncryptionKey::derive_from_passphrase(b"correct horse", b"stockpile-test").unwrap();

    let ledger = open_ledger(
        store.clone(),
        repo.clone(),
        state.clone(),
        TransformPipeline::encrypted(&key),
    );
    add_item(store.as_ref(), "SKU001", 5);
    ledger.create_version(None).unwrap();
    add_item(store.as_ref(), "SKU002", 6);
    ledger.create_version(None).unwrap();
    drop(ledger);

    let ledger = open_ledger(
        store.clone(),
        repo.clone(),
        state,
        TransformPipeline::encrypted(&key),
    );
    ledger.rollback_to(1).unwrap();

    assert_eq!(skus(store.as_ref()), vec!["SKU001"]);
    assert_eq!(repo.list().unwrap().len(), 2);

    add_item(store.as_ref(), "SKU009", 1);
    let rows = store.read_all("inventory_items").unwrap();
    assert_eq!(rows.last().unwrap().get("id"), Some(&Value::Integer(2)));
}

/// State store whose ledger writes can be made to fail.
#[derive(Default)]
struct FlakyState {
    inner: MemoryStateStore,
    fail_ledger: AtomicBool,
}

impl StateStore for FlakyState {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        if key == LEDGER_KEY && self.fail_ledger.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable("disk full"));
        }
        self.inner.put(key, value)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.inner.remove(key)
    }
}

#[test]
fn unsaved_pointer_rolls_restore_back() {
    let store = Arc::new(MemoryStore::new());
    create_schema(store.as_ref());
    let state = Arc::new(FlakyState::default());
    let ledger = open_ledger(
        store.clone(),
        Arc::new(MemoryRepository::new()),
        state.clone(),
        TransformPipeline::plain(),
    );
    add_item(store.as_ref(), "SKU001", 1);
    ledger.create_version(None).unwrap();
    add_item(store.as_ref(), "SKU002", 2);
    ledger.create_version(None).unwrap();

    state.fail_ledger.store(true, Ordering::SeqCst);
    let err = ledger.rollback_to(1).unwrap_err();

    assert!(matches!(err, CoreError::Rollback { from: Some(2), to: 1, .. }));
    assert_eq!(skus(store.as_ref()), vec!["SKU001", "SKU002"]);
    assert_eq!(ledger.current_version(), Some(2));
    assert_eq!(ledger.rollback_history()[0].status, RollbackStatus::Failed);
    assert!(!store.in_transaction());
}

#[test]
fn failed_commit_reverts_saved_pointer() {
    let h = harness(TransformPipeline::plain());
    add_item(h.store.as_ref(), "SKU001", 1);
    h.ledger.create_version(None).unwrap();
    add_item(h.store.as_ref(), "SKU002", 2);
    h.ledger.create_version(None).unwrap();

    h.store.inject(Fault::Commit);
    assert!(h.ledger.rollback_to(1).is_err());
    h.store.clear_faults();

    assert_eq!(skus(h.store.as_ref()), vec!["SKU001", "SKU002"]);
    let reopened = open_ledger(
        h.store.clone(),
        h.repo.clone(),
        h.state.clone(),
        TransformPipeline::plain(),
    );
    assert_eq!(reopened.current_version(), Some(2));
}

#[test]
fn exports_run_alongside_backups() {
    let store: Arc<dyn LocalStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
    create_schema(store.as_ref());
    for n in 0..20 {
        add_item(store.as_ref(), &format!("SKU{n:03}"), n);
    }
    let ledger = open_ledger(
        store.clone(),
        Arc::new(MemoryRepository::new()),
        Arc::new(MemoryStateStore::new()),
        TransformPipeline::plain(),
    );
    let exporter = SnapshotExporter::new(
        store.clone(),
        config(),
        Arc::new(TransformPipeline::plain()),
        Arc::new(StoreGate::new()),
    );

    thread::scope(|scope| {
        let backups = scope.spawn(|| {
            (0..5)
                .map(|_| ledger.create_version(None).map(|r| r.version))
                .collect::<Result<Vec<_>, _>>()
        });
        let exports: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| (0..5).try_for_each(|_| exporter.export_bytes().map(drop))))
            .collect();

        assert_eq!(backups.join().unwrap().unwrap(), vec![1, 2, 3, 4, 5]);
        for export in exports {
            export.join().unwrap().unwrap();
        }
    });
    // Nothing left open: a restore can still take its transaction.
    ledger.rollback_to(1).unwrap();
    assert_eq!(skus(store.as_ref()).len(), 20);
}

#[test]
fn export_waits_for_restore_to_finish() {
    let store = Arc::new(MemoryStore::new());
    create_schema(store.as_ref());
    add_item(store.as_ref(), "SKU001", 1);
    add_item(store.as_ref(), "SKU002", 2);
    let gate = Arc::new(StoreGate::new());
    let exporter = SnapshotExporter::new(
        store.clone(),
        config(),
        Arc::new(TransformPipeline::plain()),
        gate.clone(),
    );

    let (started_tx, started_rx) = mpsc::channel();
    let restore = {
        let store = store.clone();
        let gate = gate.clone();
        thread::spawn(move || {
            let _exclusive = gate.exclusive();
            store.begin().unwrap();
            store.delete_all("inventory_items").unwrap();
            started_tx.send(()).unwrap();
            thread::sleep(Duration::from_millis(100));
            store.rollback().unwrap();
        })
    };

    started_rx.recv().unwrap();
    let doc = exporter.export(None).unwrap();
    restore.join().unwrap();

    assert_eq!(doc.table("inventory_items").unwrap().rows.len(), 2);
}
