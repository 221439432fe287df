//! Configuration for the sync engine.

use std::time::Duration;

/// Default interval between sync cycles.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Device id to use. `None` keeps the persisted id, or generates one.
    pub device_id: Option<String>,
    /// Interval between scheduled sync cycles.
    pub sync_interval: Duration,
    /// Name of the remote change-log table.
    pub remote_table: String,
    /// Column that identifies records in synced tables.
    pub key_column: String,
    /// Maximum number of events pushed per cycle.
    pub push_batch_size: usize,
    /// Whether changes are logged while sync is disabled. Captured events
    /// stay unsynced until sync is enabled.
    pub capture_while_disabled: bool,
}

impl SyncConfig {
    /// Creates a configuration with default settings.
    pub fn new() -> Self {
        Self {
            device_id: None,
            sync_interval: DEFAULT_SYNC_INTERVAL,
            remote_table: "sync_log".to_string(),
            key_column: "id".to_string(),
            push_batch_size: 500,
            capture_while_disabled: true,
        }
    }

    /// Sets the device id.
    #[must_use]
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// Sets the sync interval.
    #[must_use]
    pub const fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the remote table name.
    #[must_use]
    pub fn with_remote_table(mut self, table: impl Into<String>) -> Self {
        self.remote_table = table.into();
        self
    }

    /// Sets the identifying key column.
    #[must_use]
    pub fn with_key_column(mut self, column: impl Into<String>) -> Self {
        self.key_column = column.into();
        self
    }

    /// Sets the push batch size. Zero is treated as one.
    #[must_use]
    pub const fn with_push_batch_size(mut self, size: usize) -> Self {
        self.push_batch_size = if size == 0 { 1 } else { size };
        self
    }

    /// Sets whether changes are logged while sync is disabled.
    #[must_use]
    pub const fn with_capture_while_disabled(mut self, capture: bool) -> Self {
        self.capture_while_disabled = capture;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
