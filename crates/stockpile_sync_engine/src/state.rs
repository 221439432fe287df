//! Sync engine state machine.

use crate::applier::EventApplier;
use crate::change_log::ChangeLog;
use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::remote::RemoteLog;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use stockpile_codec::Row;
use stockpile_core::{LocalStore, StoreGate, CHANGE_LOG_TABLE};
use stockpile_storage::StateStore;
use stockpile_sync_protocol::{timestamp, ChangeEvent, Operation, RemoteLogEntry, SyncMetadata};

/// State key of the persisted [`SyncMetadata`].
pub const METADATA_KEY: &str = "sync_metadata";

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Sync is turned off; no cycles run.
    Disabled,
    /// Sync is on and no cycle is running.
    Idle,
    /// A cycle is running.
    Syncing,
}

/// Why a cycle did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Sync is disabled.
    Disabled,
    /// Another cycle is still running.
    AlreadyRunning,
    /// A restore holds the local store.
    RestoreInProgress,
}

/// What one completed cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Local events acknowledged by the remote log.
    pub pushed: usize,
    /// Local events the remote log did not accept; retried next cycle.
    pub push_failures: usize,
    /// Remote events received.
    pub pulled: usize,
    /// Remote events applied and logged.
    pub applied: usize,
    /// Remote events already present in the local log.
    pub duplicates: usize,
    /// Remote events that could not be applied.
    pub apply_failures: usize,
    /// Why the pull phase failed, if it did.
    pub pull_error: Option<String>,
    /// The watermark after the cycle.
    pub watermark: Option<DateTime<Utc>>,
    /// Whether the watermark moved.
    pub watermark_advanced: bool,
    /// Wall time of the cycle.
    pub duration: Duration,
}

/// Result of [`SyncEngine::sync_once`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncCycleOutcome {
    /// The cycle ran.
    Completed(SyncReport),
    /// The cycle was skipped.
    Skipped(SkipReason),
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Cycles that ran.
    pub cycles_completed: u64,
    /// Cycles that were skipped.
    pub cycles_skipped: u64,
    /// Events pushed.
    pub events_pushed: u64,
    /// Events pulled.
    pub events_pulled: u64,
    /// Pulled events applied.
    pub events_applied: u64,
    /// Failed pushes.
    pub push_failures: u64,
    /// Failed applies.
    pub apply_failures: u64,
    /// Last error message.
    pub last_error: Option<String>,
    /// When the last cycle started.
    pub last_cycle_at: Option<DateTime<Utc>>,
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Change-log replication engine for one device.
///
/// Local mutations are recorded with [`log_change`](Self::log_change). Each
/// [`sync_once`](Self::sync_once) pushes this device's unsynced events to the
/// remote log, then pulls and applies other devices' events newer than the
/// watermark.
pub struct SyncEngine {
    config: SyncConfig,
    change_log: ChangeLog,
    applier: EventApplier,
    remote: Arc<dyn RemoteLog>,
    state_store: Arc<dyn StateStore>,
    gate: Arc<StoreGate>,
    metadata: RwLock<SyncMetadata>,
    stats: RwLock<SyncStats>,
    running: AtomicBool,
    last_timestamp: Mutex<Option<DateTime<Utc>>>,
}

impl SyncEngine {
    /// Opens the engine, loading or creating the device's sync metadata and
    /// the local change-log table.
    ///
    /// # Errors
    ///
    /// Returns an error if metadata cannot be read or written, or the
    /// change-log table cannot be created.
    pub fn open(
        config: SyncConfig,
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteLog>,
        state_store: Arc<dyn StateStore>,
        gate: Arc<StoreGate>,
    ) -> SyncResult<Self> {
        let mut metadata = match state_store.get(METADATA_KEY)? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => SyncMetadata::generate(),
        };
        if let Some(device_id) = &config.device_id {
            metadata.device_id.clone_from(device_id);
        }
        state_store.put(METADATA_KEY, &serde_json::to_vec(&metadata)?)?;

        let change_log = ChangeLog::new(store.clone(), CHANGE_LOG_TABLE);
        change_log.ensure_table()?;
        let last_timestamp = change_log.latest_timestamp(&metadata.device_id)?;
        let applier = EventApplier::new(store, config.key_column.clone());

        tracing::debug!(
            device_id = %metadata.device_id,
            enabled = metadata.sync_enabled,
            watermark = ?metadata.last_sync_watermark,
            "opened sync engine"
        );

        Ok(Self {
            config,
            change_log,
            applier,
            remote,
            state_store,
            gate,
            metadata: RwLock::new(metadata),
            stats: RwLock::new(SyncStats::default()),
            running: AtomicBool::new(false),
            last_timestamp: Mutex::new(last_timestamp),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the local change log.
    pub fn change_log(&self) -> &ChangeLog {
        &self.change_log
    }

    /// Returns this device's id.
    pub fn device_id(&self) -> String {
        self.metadata.read().device_id.clone()
    }

    /// Returns a copy of the sync metadata.
    pub fn metadata(&self) -> SyncMetadata {
        self.metadata.read().clone()
    }

    /// Returns true if sync is enabled.
    pub fn is_enabled(&self) -> bool {
        self.metadata.read().sync_enabled
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        if self.running.load(Ordering::SeqCst) {
            SyncState::Syncing
        } else if self.is_enabled() {
            SyncState::Idle
        } else {
            SyncState::Disabled
        }
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Turns sync on. Changes logged from now on are replicated, along with
    /// any unsynced events already in the log.
    ///
    /// # Errors
    ///
    /// Returns an error if metadata cannot be persisted.
    pub fn enable(&self) -> SyncResult<()> {
        self.set_enabled(true)
    }

    /// Turns sync off. A running cycle is allowed to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if metadata cannot be persisted.
    pub fn disable(&self) -> SyncResult<()> {
        self.set_enabled(false)
    }

    fn set_enabled(&self, enabled: bool) -> SyncResult<()> {
        self.update_metadata(|m| m.sync_enabled = enabled)?;
        tracing::info!(enabled, "sync toggled");
        Ok(())
    }

    fn update_metadata(&self, change: impl FnOnce(&mut SyncMetadata)) -> SyncResult<()> {
        let mut metadata = self.metadata.write();
        let mut next = metadata.clone();
        change(&mut next);
        self.state_store
            .put(METADATA_KEY, &serde_json::to_vec(&next)?)?;
        *metadata = next;
        Ok(())
    }

    /// Records a local mutation as an unsynced event.
    ///
    /// While sync is disabled the event is still recorded, and is pushed by
    /// the first cycle after sync is enabled. With
    /// [`capture_while_disabled`](SyncConfig::capture_while_disabled) off,
    /// nothing is recorded while disabled and `None` is returned.
    ///
    /// Waits for a running restore to finish before writing, so the event
    /// never lands inside a restore transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be appended.
    pub fn log_change(
        &self,
        table: &str,
        operation: Operation,
        record_id: &str,
        payload: Row,
    ) -> SyncResult<Option<ChangeEvent>> {
        let device_id = {
            let metadata = self.metadata.read();
            if !metadata.sync_enabled && !self.config.capture_while_disabled {
                return Ok(None);
            }
            metadata.device_id.clone()
        };
        let _shared = self.gate.shared();
        let event = ChangeEvent::new(
            table,
            operation,
            record_id,
            payload,
            self.next_timestamp(),
            device_id,
        );
        self.change_log.append(&event)?;
        tracing::debug!(table, record_id, %operation, event_id = %event.id, "logged change");
        Ok(Some(event))
    }

    /// Returns a timestamp later than every one issued before.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let mut last = self.last_timestamp.lock();
        let now = timestamp::truncate(Utc::now());
        let next = match *last {
            Some(prev) if prev >= now => prev + ChronoDuration::microseconds(1),
            _ => now,
        };
        *last = Some(next);
        next
    }

    /// Runs one push-then-pull cycle.
    ///
    /// Remote failures never fail the cycle: failed pushes are retried next
    /// cycle, and a failed pull leaves the watermark where it was.
    ///
    /// # Errors
    ///
    /// Returns an error only for local failures (reading the change log or
    /// persisting the watermark).
    pub fn sync_once(&self) -> SyncResult<SyncCycleOutcome> {
        if !self.is_enabled() {
            return Ok(self.skip(SkipReason::Disabled));
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(self.skip(SkipReason::AlreadyRunning));
        }
        let _running = RunningGuard(&self.running);
        let Some(_shared) = self.gate.try_shared() else {
            return Ok(self.skip(SkipReason::RestoreInProgress));
        };

        let started = Instant::now();
        let cycle_start = timestamp::truncate(Utc::now());
        let result = self.run_cycle(cycle_start);

        let mut stats = self.stats.write();
        stats.last_cycle_at = Some(cycle_start);
        match result {
            Ok(mut report) => {
                report.duration = started.elapsed();
                stats.cycles_completed += 1;
                stats.events_pushed += report.pushed as u64;
                stats.events_pulled += report.pulled as u64;
                stats.events_applied += report.applied as u64;
                stats.push_failures += report.push_failures as u64;
                stats.apply_failures += report.apply_failures as u64;
                stats.last_error.clone_from(&report.pull_error);
                tracing::info!(
                    pushed = report.pushed,
                    push_failures = report.push_failures,
                    pulled = report.pulled,
                    applied = report.applied,
                    apply_failures = report.apply_failures,
                    watermark_advanced = report.watermark_advanced,
                    "sync cycle complete"
                );
                Ok(SyncCycleOutcome::Completed(report))
            }
            Err(e) => {
                stats.last_error = Some(e.to_string());
                tracing::error!(error = %e, "sync cycle failed");
                Err(e)
            }
        }
    }

    fn skip(&self, reason: SkipReason) -> SyncCycleOutcome {
        self.stats.write().cycles_skipped += 1;
        tracing::debug!(?reason, "sync cycle skipped");
        SyncCycleOutcome::Skipped(reason)
    }

    fn run_cycle(&self, cycle_start: DateTime<Utc>) -> SyncResult<SyncReport> {
        let metadata = self.metadata();
        let mut report = SyncReport {
            watermark: metadata.last_sync_watermark,
            ..SyncReport::default()
        };

        self.push(&metadata.device_id, &mut report)?;

        match self
            .remote
            .fetch_since(metadata.last_sync_watermark, &metadata.device_id)
        {
            Ok(entries) => self.apply_pulled(entries, &metadata.device_id, &mut report),
            Err(e) => {
                tracing::warn!(error = %e, "pull failed, keeping watermark");
                report.pull_error = Some(e.to_string());
            }
        }

        if report.pull_error.is_none() {
            self.update_metadata(|m| m.last_sync_watermark = Some(cycle_start))?;
            report.watermark = Some(cycle_start);
            report.watermark_advanced = true;
        }
        Ok(report)
    }

    fn push(&self, device_id: &str, report: &mut SyncReport) -> SyncResult<()> {
        let pending = self
            .change_log
            .pending(device_id, self.config.push_batch_size)?;
        for event in pending {
            if let Err(e) = self.remote.upsert(&RemoteLogEntry::published(&event)) {
                report.push_failures += 1;
                tracing::warn!(event_id = %event.id, error = %e, "push failed, will retry");
                continue;
            }
            match self.change_log.mark_synced(&event.id) {
                Ok(_) => report.pushed += 1,
                Err(e) => {
                    report.push_failures += 1;
                    tracing::warn!(event_id = %event.id, error = %e, "pushed event not marked synced");
                }
            }
        }
        Ok(())
    }

    fn apply_pulled(&self, entries: Vec<RemoteLogEntry>, device_id: &str, report: &mut SyncReport) {
        report.pulled = entries.len();
        for entry in entries {
            if entry.device_id == device_id {
                continue;
            }
            let id = entry.id.clone();
            let event = match entry.into_event() {
                Ok(event) => event,
                Err(e) => {
                    report.apply_failures += 1;
                    tracing::warn!(event_id = %id, error = %e, "unreadable remote event");
                    continue;
                }
            };
            match self.apply_one(event) {
                Ok(true) => report.applied += 1,
                Ok(false) => report.duplicates += 1,
                Err(e) => {
                    report.apply_failures += 1;
                    tracing::warn!(event_id = %id, error = %e, "failed to apply remote event");
                }
            }
        }
    }

    /// Applies a pulled event unless it is already logged. Returns false for
    /// a duplicate.
    fn apply_one(&self, event: ChangeEvent) -> SyncResult<bool> {
        if self.change_log.contains(&event.id)? {
            return Ok(false);
        }
        self.applier.apply(&event)?;
        self.change_log.append(&event.into_synced())?;
        Ok(true)
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("metadata", &*self.metadata.read())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
