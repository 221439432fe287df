//! Wiring of stores, engines and the remote log for one CLI invocation.

use crate::config::AppConfig;
use crate::error::{CliError, CliResult};
use crate::http::ReqwestClient;
use std::sync::Arc;
use stockpile_core::{
    BackupConfig, EncryptionKey, LocalStore, RestoreEngine, SnapshotExporter, SqliteStore,
    StoreGate, TransformPipeline, VersionLedger,
};
use stockpile_storage::{FileRepository, FileStateStore};
use stockpile_sync_engine::{MemoryRemoteLog, RemoteLog, RestRemoteLog, SyncConfig, SyncEngine};

/// Salt for deriving the snapshot key from the configured passphrase.
pub const KEY_SALT: &[u8] = b"stockpile-snapshot-key-v1";

/// Everything a command needs, opened from an [`AppConfig`].
pub struct AppContext {
    config: AppConfig,
    backup: BackupConfig,
    store: Arc<SqliteStore>,
    pipeline: Arc<TransformPipeline>,
    gate: Arc<StoreGate>,
    state: Arc<FileStateStore>,
    ledger: VersionLedger,
}

impl AppContext {
    /// Opens the database, repository and ledger under the data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if any of them cannot be opened or the passphrase
    /// cannot be turned into a key.
    pub fn open(config: AppConfig) -> CliResult<Self> {
        std::fs::create_dir_all(&config.data_dir.value)?;
        if let Some(parent) = config.database_path.value.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Arc::new(SqliteStore::open(&config.database_path.value)?);
        let repository = Arc::new(FileRepository::open(&config.backups_dir())?);
        let state = Arc::new(FileStateStore::open(&config.state_dir())?);

        let backup = backup_config(&config, store.as_ref())?;
        let key = match &config.passphrase {
            Some(passphrase) => Some(EncryptionKey::derive_from_passphrase(
                passphrase.as_bytes(),
                KEY_SALT,
            )?),
            None => None,
        };
        let pipeline = Arc::new(TransformPipeline::from_config(&backup, key.as_ref()));
        let gate = Arc::new(StoreGate::new());

        let context = Self {
            ledger: VersionLedger::open(
                SnapshotExporter::new(store.clone(), backup.clone(), pipeline.clone(), gate.clone()),
                RestoreEngine::new(store.clone(), backup.clone(), pipeline.clone(), gate.clone()),
                repository,
                state.clone(),
            )?,
            config,
            backup,
            store,
            pipeline,
            gate,
            state,
        };
        tracing::debug!(
            database = %context.config.database_path.value.display(),
            tables = ?context.backup.tracked_tables,
            encrypting = context.pipeline.is_encrypting(),
            "opened context"
        );
        Ok(context)
    }

    /// Returns the effective configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Returns the backup settings in use.
    pub fn backup_config(&self) -> &BackupConfig {
        &self.backup
    }

    /// Returns the local store.
    #[cfg(test)]
    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.store
    }

    /// Returns the version ledger.
    pub fn ledger(&self) -> &VersionLedger {
        &self.ledger
    }

    /// Creates an exporter that bypasses the ledger.
    pub fn exporter(&self) -> SnapshotExporter {
        SnapshotExporter::new(
            self.store.clone(),
            self.backup.clone(),
            self.pipeline.clone(),
            self.gate.clone(),
        )
    }

    /// Creates a restore engine that bypasses the ledger.
    pub fn restorer(&self) -> RestoreEngine {
        RestoreEngine::new(
            self.store.clone(),
            self.backup.clone(),
            self.pipeline.clone(),
            self.gate.clone(),
        )
    }

    /// Opens the sync engine.
    ///
    /// Without a configured remote the engine talks to an offline log, so
    /// changes can still be recorded and inspected.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or the engine cannot be created.
    pub fn sync_engine(&self) -> CliResult<Arc<SyncEngine>> {
        let mut sync_config = SyncConfig::new().with_sync_interval(self.config.sync_interval.value);
        if let Some(device_id) = &self.config.device_id {
            sync_config = sync_config.with_device_id(device_id.clone());
        }
        let remote = self.remote_log(&sync_config)?;
        let engine = SyncEngine::open(
            sync_config,
            self.store.clone(),
            remote,
            self.state.clone(),
            self.gate.clone(),
        )?;
        Ok(Arc::new(engine))
    }

    fn remote_log(&self, sync_config: &SyncConfig) -> CliResult<Arc<dyn RemoteLog>> {
        match (&self.config.remote_url, &self.config.api_key) {
            (Some(url), Some(api_key)) => {
                let client = ReqwestClient::new()
                    .map_err(|e| CliError::invalid_setting("remote_url", e.to_string()))?;
                Ok(Arc::new(RestRemoteLog::new(
                    url.value.clone(),
                    api_key.clone(),
                    sync_config.remote_table.clone(),
                    client,
                )))
            }
            _ => {
                tracing::debug!("no remote configured; using an offline remote log");
                let offline = MemoryRemoteLog::new();
                offline.set_online(false);
                Ok(Arc::new(offline))
            }
        }
    }
}

/// Builds the backup settings, tracking every user table when none are
/// configured.
fn backup_config(config: &AppConfig, store: &dyn LocalStore) -> CliResult<BackupConfig> {
    let defaults = BackupConfig::default().compress(config.compress);
    let tables = if config.tracked_tables.is_empty() {
        store
            .list_tables()?
            .into_iter()
            .filter(|table| !defaults.is_protected(table))
            .collect()
    } else {
        config.tracked_tables.clone()
    };
    Ok(BackupConfig {
        tracked_tables: tables,
        ..defaults
    })
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("config", &self.config)
            .field("tracked_tables", &self.backup.tracked_tables)
            .finish_non_exhaustive()
    }
}
