//! Version ledger and rollback log.
//!
//! The ledger catalogs every retained snapshot under a version number and
//! tracks which version the local store currently reflects. Both the ledger
//! and the append-only rollback log are persisted in a [`StateStore`] so
//! they survive restarts.
//!
//! Version numbers always advance from the highest number ever assigned.
//! Rolling back to an older version moves the current pointer but never
//! frees a number for reuse, so every version identifies exactly one
//! snapshot for the lifetime of the ledger.

use crate::error::{CoreError, CoreResult};
use crate::export::SnapshotExporter;
use crate::restore::{RestoreEngine, RestoreReport};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use stockpile_storage::{BlobRepository, StateStore};
use uuid::Uuid;

/// State key of the version ledger.
pub const LEDGER_KEY: &str = "version_ledger";
/// State key of the rollback log.
pub const ROLLBACK_LOG_KEY: &str = "rollback_log";

/// An uploaded snapshot blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Unique snapshot id.
    pub id: String,
    /// Blob name in the repository.
    pub blob_name: String,
    /// When the snapshot was exported.
    pub created_at: DateTime<Utc>,
    /// Version the snapshot was taken for.
    pub version: u64,
    /// Uploaded size in bytes.
    #[serde(default)]
    pub size: u64,
    /// Lower-case hex SHA-256 of the uploaded bytes.
    #[serde(default)]
    pub checksum: Option<String>,
}

/// A snapshot registered under a version number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    /// Version number.
    pub version: u64,
    /// The snapshot.
    pub snapshot: Snapshot,
    /// Optional free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Status of a rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollbackStatus {
    /// The rollback began and has not finished.
    Started,
    /// The rollback completed.
    Success,
    /// The rollback failed; state is unchanged.
    Failed,
}

/// One audit entry of the rollback log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackLogEntry {
    /// Unique entry id.
    pub id: String,
    /// When the rollback started.
    pub timestamp: DateTime<Utc>,
    /// Current version when the rollback started.
    pub from_version: Option<u64>,
    /// Target version.
    pub to_version: u64,
    /// Outcome.
    pub status: RollbackStatus,
    /// Failure message, for failed rollbacks.
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Result of a retention pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Versions removed from the ledger, ascending.
    pub removed_versions: Vec<u64>,
    /// Blobs that existed and were deleted.
    pub removed_blobs: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LedgerState {
    counter: u64,
    current_version: Option<u64>,
    records: Vec<VersionRecord>,
}

impl LedgerState {
    fn next_version(&self) -> u64 {
        let highest = self.records.iter().map(|r| r.version).max().unwrap_or(0);
        self.counter.max(highest) + 1
    }
}

/// Builds the blob name for a snapshot.
///
/// The UTC timestamp comes first and is fixed-width, so lexical order of
/// names is creation order.
#[must_use]
pub fn blob_name(prefix: &str, created_at: DateTime<Utc>, version: u64) -> String {
    format!(
        "{prefix}-{}-v{version:06}.bak",
        created_at.format("%Y%m%dT%H%M%S%3fZ")
    )
}

fn sha256_hex(data: &[u8]) -> String {
    Sha256::digest(data)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn load<T: for<'de> Deserialize<'de> + Default>(
    state: &dyn StateStore,
    key: &str,
) -> CoreResult<T> {
    match state.get(key)? {
        Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
        None => Ok(T::default()),
    }
}

fn save<T: Serialize>(state: &dyn StateStore, key: &str, value: &T) -> CoreResult<()> {
    state.put(key, &serde_json::to_vec(value)?)?;
    Ok(())
}

/// Catalog of versioned snapshots.
///
/// Mutating operations (`create_version`, `rollback_to`,
/// `cleanup_old_versions`) exclude each other: one started while another is
/// running fails with [`CoreError::Busy`]. Queries read the in-memory copy
/// of the persisted ledger.
pub struct VersionLedger {
    exporter: SnapshotExporter,
    restorer: RestoreEngine,
    repository: Arc<dyn BlobRepository>,
    state: Arc<dyn StateStore>,
    ledger: Mutex<LedgerState>,
    rollback_log: Mutex<Vec<RollbackLogEntry>>,
    operation: Mutex<()>,
}

impl VersionLedger {
    /// Opens the ledger, loading persisted state.
    ///
    /// # Errors
    ///
    /// Returns an error if persisted state exists but cannot be read.
    pub fn open(
        exporter: SnapshotExporter,
        restorer: RestoreEngine,
        repository: Arc<dyn BlobRepository>,
        state: Arc<dyn StateStore>,
    ) -> CoreResult<Self> {
        let ledger: LedgerState = load(state.as_ref(), LEDGER_KEY)?;
        let rollback_log: Vec<RollbackLogEntry> = load(state.as_ref(), ROLLBACK_LOG_KEY)?;
        tracing::debug!(
            versions = ledger.records.len(),
            current = ?ledger.current_version,
            "opened version ledger"
        );
        Ok(Self {
            exporter,
            restorer,
            repository,
            state,
            ledger: Mutex::new(ledger),
            rollback_log: Mutex::new(rollback_log),
            operation: Mutex::new(()),
        })
    }

    /// Exports, encodes and uploads a snapshot under the next version.
    ///
    /// The new version becomes current.
    ///
    /// # Errors
    ///
    /// Returns an error if export, upload or persisting the ledger fails.
    /// On error the ledger is unchanged.
    pub fn create_version(&self, description: Option<&str>) -> CoreResult<VersionRecord> {
        let _op = self.begin_operation("create_version")?;
        let version = self.ledger.lock().next_version();
        let created_at = Utc::now();

        let document = self.exporter.export_at(created_at, Some(version))?;
        let encoded = self.exporter.pipeline().encode(&document.to_vec());
        let name = blob_name(&self.exporter.config().blob_prefix, created_at, version);
        self.repository.put(&name, &encoded.bytes)?;

        let record = VersionRecord {
            version,
            snapshot: Snapshot {
                id: Uuid::new_v4().to_string(),
                blob_name: name.clone(),
                created_at,
                version,
                size: encoded.bytes.len() as u64,
                checksum: Some(sha256_hex(&encoded.bytes)),
            },
            description: description.map(str::to_string),
        };

        let mut next = self.ledger.lock().clone();
        next.counter = version;
        next.current_version = Some(version);
        next.records.push(record.clone());
        if let Err(e) = save(self.state.as_ref(), LEDGER_KEY, &next) {
            if let Err(cleanup) = self.repository.remove(&[name]) {
                tracing::warn!(error = %cleanup, "failed to remove orphaned snapshot blob");
            }
            return Err(e);
        }
        *self.ledger.lock() = next;

        tracing::info!(
            version,
            blob = %record.snapshot.blob_name,
            bytes = record.snapshot.size,
            form = ?encoded.form,
            rows = document.row_count(),
            "created version"
        );
        Ok(record)
    }

    /// Restores the snapshot of `version` and makes it current.
    ///
    /// A `started` entry is logged first and finalized as `success` or
    /// `failed`. On failure the current pointer is unchanged. Newer versions
    /// are kept.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::VersionNotFound`] for an unknown version and
    /// [`CoreError::Rollback`] if fetching, verifying or restoring fails.
    pub fn rollback_to(&self, version: u64) -> CoreResult<RestoreReport> {
        let _op = self.begin_operation("rollback")?;
        let from = self.current_version();
        let entry_id = self.log_started(from, version)?;

        let Some(record) = self.by_version(version) else {
            self.log_finished(
                &entry_id,
                RollbackStatus::Failed,
                Some(format!("version {version} not found")),
            )?;
            tracing::warn!(version, "rollback target not found");
            return Err(CoreError::VersionNotFound { version });
        };

        // The pointer is persisted inside the restore transaction, so a
        // failed save rolls the data back and a failed commit reverts it.
        let previous = self.ledger.lock().clone();
        let mut next = previous.clone();
        next.current_version = Some(version);
        let mut pointer_saved = false;
        let outcome = self.restore_record(&record, || {
            save(self.state.as_ref(), LEDGER_KEY, &next)?;
            pointer_saved = true;
            Ok(())
        });
        match outcome {
            Ok(report) => {
                *self.ledger.lock() = next;
                self.log_finished(&entry_id, RollbackStatus::Success, None)?;
                tracing::info!(
                    ?from,
                    to = version,
                    restored = report.restored_rows(),
                    "rollback complete"
                );
                Ok(report)
            }
            Err(e) => {
                if pointer_saved {
                    if let Err(revert) = save(self.state.as_ref(), LEDGER_KEY, &previous) {
                        tracing::error!(error = %revert, "failed to revert current version");
                    }
                }
                let message = e.to_string();
                self.log_finished(&entry_id, RollbackStatus::Failed, Some(message.clone()))?;
                tracing::error!(?from, to = version, error = %message, "rollback failed");
                Err(CoreError::Rollback {
                    from,
                    to: version,
                    message,
                })
            }
        }
    }

    /// Rolls back to the highest retained version.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::VersionNotFound`] with version 0 if the ledger
    /// is empty, otherwise as [`rollback_to`](Self::rollback_to).
    pub fn restore_latest(&self) -> CoreResult<RestoreReport> {
        let latest = self
            .latest()
            .ok_or(CoreError::VersionNotFound { version: 0 })?;
        self.rollback_to(latest.version)
    }

    fn begin_operation(&self, operation: &str) -> CoreResult<MutexGuard<'_, ()>> {
        self.operation
            .try_lock()
            .ok_or_else(|| CoreError::busy(operation))
    }

    fn restore_record(
        &self,
        record: &VersionRecord,
        before_commit: impl FnOnce() -> CoreResult<()>,
    ) -> CoreResult<RestoreReport> {
        let bytes = self.repository.get(&record.snapshot.blob_name)?;
        if let Some(expected) = &record.snapshot.checksum {
            let actual = sha256_hex(&bytes);
            if &actual != expected {
                return Err(CoreError::schema(format!(
                    "checksum mismatch for {}: expected {expected}, found {actual}",
                    record.snapshot.blob_name
                )));
            }
        }
        self.restorer.restore_then(&bytes, |_| before_commit())
    }

    /// Keeps the `keep` highest versions and deletes the rest.
    ///
    /// The current pointer is left as-is even if it referred to a deleted
    /// version.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be persisted or a blob cannot
    /// be removed. Records are dropped before blobs, so a failed blob
    /// removal leaves an orphaned blob rather than a dangling record.
    pub fn cleanup_old_versions(&self, keep: usize) -> CoreResult<CleanupReport> {
        let _op = self.begin_operation("cleanup")?;
        let mut next = self.ledger.lock().clone();

        let mut versions: Vec<u64> = next.records.iter().map(|r| r.version).collect();
        versions.sort_unstable_by(|a, b| b.cmp(a));
        let cutoff: Vec<u64> = versions.into_iter().skip(keep).collect();
        if cutoff.is_empty() {
            return Ok(CleanupReport::default());
        }

        let (removed, kept): (Vec<VersionRecord>, Vec<VersionRecord>) = next
            .records
            .into_iter()
            .partition(|r| cutoff.contains(&r.version));
        next.records = kept;
        save(self.state.as_ref(), LEDGER_KEY, &next)?;
        *self.ledger.lock() = next;

        let names: Vec<String> = removed
            .iter()
            .map(|r| r.snapshot.blob_name.clone())
            .collect();
        let removed_blobs = self.repository.remove(&names)?;

        let mut removed_versions: Vec<u64> = removed.iter().map(|r| r.version).collect();
        removed_versions.sort_unstable();
        tracing::info!(keep, removed = ?removed_versions, removed_blobs, "cleaned up old versions");
        Ok(CleanupReport {
            removed_versions,
            removed_blobs,
        })
    }

    fn log_started(&self, from: Option<u64>, to: u64) -> CoreResult<String> {
        let entry = RollbackLogEntry {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            from_version: from,
            to_version: to,
            status: RollbackStatus::Started,
            error_message: None,
        };
        let id = entry.id.clone();
        let mut log = self.rollback_log.lock();
        let mut next = log.clone();
        next.push(entry);
        save(self.state.as_ref(), ROLLBACK_LOG_KEY, &next)?;
        *log = next;
        Ok(id)
    }

    fn log_finished(
        &self,
        id: &str,
        status: RollbackStatus,
        error_message: Option<String>,
    ) -> CoreResult<()> {
        let mut log = self.rollback_log.lock();
        let mut next = log.clone();
        if let Some(entry) = next
            .iter_mut()
            .find(|e| e.id == id && e.status == RollbackStatus::Started)
        {
            entry.status = status;
            entry.error_message = error_message;
        }
        save(self.state.as_ref(), ROLLBACK_LOG_KEY, &next)?;
        *log = next;
        Ok(())
    }

    /// Looks up a version.
    #[must_use]
    pub fn by_version(&self, version: u64) -> Option<VersionRecord> {
        self.ledger
            .lock()
            .records
            .iter()
            .find(|r| r.version == version)
            .cloned()
    }

    /// Looks up a version by snapshot id.
    #[must_use]
    pub fn by_id(&self, snapshot_id: &str) -> Option<VersionRecord> {
        self.ledger
            .lock()
            .records
            .iter()
            .find(|r| r.snapshot.id == snapshot_id)
            .cloned()
    }

    /// Returns the highest retained version.
    #[must_use]
    pub fn latest(&self) -> Option<VersionRecord> {
        self.ledger
            .lock()
            .records
            .iter()
            .max_by_key(|r| r.version)
            .cloned()
    }

    /// Returns all retained versions, ascending.
    #[must_use]
    pub fn list(&self) -> Vec<VersionRecord> {
        let mut records = self.ledger.lock().records.clone();
        records.sort_by_key(|r| r.version);
        records
    }

    /// Returns the version the store currently reflects.
    #[must_use]
    pub fn current_version(&self) -> Option<u64> {
        self.ledger.lock().current_version
    }

    /// Returns the rollback log, oldest first.
    #[must_use]
    pub fn rollback_history(&self) -> Vec<RollbackLogEntry> {
        self.rollback_log.lock().clone()
    }

    /// Returns a time-limited download URL for a version's blob.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::VersionNotFound`] for an unknown version.
    pub fn signed_url(&self, version: u64, ttl: Option<Duration>) -> CoreResult<String> {
        let record = self
            .by_version(version)
            .ok_or(CoreError::VersionNotFound { version })?;
        let ttl = ttl.unwrap_or(self.exporter.config().signed_url_ttl);
        Ok(self.repository.signed_url(&record.snapshot.blob_name, ttl)?)
    }
}

impl std::fmt::Debug for VersionLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ledger = self.ledger.lock();
        f.debug_struct("VersionLedger")
            .field("versions", &ledger.records.len())
            .field("current_version", &ledger.current_version)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn blob_names_sort_by_time() {
        let a = Utc.with_ymd_and_hms(2024, 1, 9, 23, 59, 59).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        let name_a = blob_name("snapshot", a, 12);
        let name_b = blob_name("snapshot", b, 3);
        assert_eq!(name_a, "snapshot-20240109T235959000Z-v000012.bak");
        assert!(name_a < name_b);
    }

    #[test]
    fn next_version_uses_historical_maximum() {
        let state = LedgerState {
            counter: 5,
            current_version: Some(1),
            records: Vec::new(),
        };
        assert_eq!(state.next_version(), 6);
        assert_eq!(LedgerState::default().next_version(), 1);
    }

    #[test]
    fn checksum_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn rollback_entry_json_shape() {
        let entry = RollbackLogEntry {
            id: "e1".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            from_version: Some(3),
            to_version: 1,
            status: RollbackStatus::Success,
            error_message: None,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["fromVersion"], 3);
        assert_eq!(json["toVersion"], 1);
        assert_eq!(json["status"], "success");
    }
}
