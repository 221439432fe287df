//! Remote change-log abstraction.

use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use stockpile_sync_protocol::RemoteLogEntry;

/// Durable log of change events shared by all devices.
///
/// # Implementors
///
/// - [`MemoryRemoteLog`] - For testing, with failure injection
/// - [`RestRemoteLog`](crate::RestRemoteLog) - A PostgREST-style HTTP table
pub trait RemoteLog: Send + Sync {
    /// Inserts the entry, or replaces the entry with the same id.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Remote`] if the log cannot be reached or rejects
    /// the entry.
    fn upsert(&self, entry: &RemoteLogEntry) -> SyncResult<()>;

    /// Returns synced entries newer than `watermark` that did not originate
    /// on `exclude_device`, ordered by timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Remote`] if the log cannot be reached.
    fn fetch_since(
        &self,
        watermark: Option<DateTime<Utc>>,
        exclude_device: &str,
    ) -> SyncResult<Vec<RemoteLogEntry>>;
}

/// An in-memory remote log for testing.
#[derive(Debug)]
pub struct MemoryRemoteLog {
    entries: Mutex<BTreeMap<String, RemoteLogEntry>>,
    online: AtomicBool,
    rejected: Mutex<HashSet<String>>,
    upserts: AtomicUsize,
}

impl MemoryRemoteLog {
    /// Creates an empty, reachable log.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            online: AtomicBool::new(true),
            rejected: Mutex::new(HashSet::new()),
            upserts: AtomicUsize::new(0),
        }
    }

    /// Sets whether the log is reachable.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Makes upserts of the given event id fail until cleared.
    pub fn reject(&self, id: impl Into<String>) {
        self.rejected.lock().insert(id.into());
    }

    /// Clears all rejections.
    pub fn clear_rejections(&self) {
        self.rejected.lock().clear();
    }

    /// Returns all entries ordered by timestamp.
    pub fn entries(&self) -> Vec<RemoteLogEntry> {
        let mut entries: Vec<RemoteLogEntry> = self.entries.lock().values().cloned().collect();
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        entries
    }

    /// Returns the number of distinct entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if the log holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Returns how many upserts were accepted, replays included.
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> SyncResult<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::remote_retryable("remote log is offline"))
        }
    }
}

impl Default for MemoryRemoteLog {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteLog for MemoryRemoteLog {
    fn upsert(&self, entry: &RemoteLogEntry) -> SyncResult<()> {
        self.check_online()?;
        if self.rejected.lock().contains(&entry.id) {
            return Err(SyncError::remote_fatal(format!("entry {} rejected", entry.id)));
        }
        self.entries.lock().insert(entry.id.clone(), entry.clone());
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn fetch_since(
        &self,
        watermark: Option<DateTime<Utc>>,
        exclude_device: &str,
    ) -> SyncResult<Vec<RemoteLogEntry>> {
        self.check_online()?;
        Ok(self
            .entries()
            .into_iter()
            .filter(|e| e.synced && e.device_id != exclude_device)
            .filter(|e| watermark.map_or(true, |w| e.timestamp > w))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use stockpile_sync_protocol::Operation;

    fn entry(id: &str, device: &str, second: u32) -> RemoteLogEntry {
        RemoteLogEntry {
            id: id.into(),
            table_name: "inventory_items".into(),
            operation: Operation::Update,
            record_id: "1".into(),
            data: json!({"quantity": second}),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, second).unwrap(),
            device_id: device.into(),
            synced: true,
        }
    }

    #[test]
    fn upsert_replaces_by_id() {
        let log = MemoryRemoteLog::new();
        log.upsert(&entry("e1", "a", 1)).unwrap();
        log.upsert(&entry("e1", "a", 1)).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log.upsert_count(), 2);
    }

    #[test]
    fn fetch_filters_and_orders() {
        let log = MemoryRemoteLog::new();
        log.upsert(&entry("e3", "b", 30)).unwrap();
        log.upsert(&entry("e1", "b", 10)).unwrap();
        log.upsert(&entry("e2", "a", 20)).unwrap();
        let mut unsynced = entry("e4", "b", 40);
        unsynced.synced = false;
        log.upsert(&unsynced).unwrap();

        let all: Vec<String> = log
            .fetch_since(None, "a")
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(all, vec!["e1", "e3"]);

        let watermark = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 10).unwrap();
        assert_eq!(log.fetch_since(Some(watermark), "a").unwrap().len(), 1);
    }

    #[test]
    fn offline_and_rejected() {
        let log = MemoryRemoteLog::new();
        log.set_online(false);
        assert!(log.upsert(&entry("e1", "a", 1)).unwrap_err().is_retryable());
        assert!(log.fetch_since(None, "a").is_err());

        log.set_online(true);
        log.reject("e1");
        assert!(!log.upsert(&entry("e1", "a", 1)).unwrap_err().is_retryable());
        log.clear_rejections();
        assert!(log.upsert(&entry("e1", "a", 1)).is_ok());
    }
}
