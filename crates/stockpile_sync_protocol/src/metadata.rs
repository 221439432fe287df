//! Per-device sync state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sync state that survives restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    /// This device's id, stamped on every event it logs.
    pub device_id: String,
    /// Remote entries at or before this time have been pulled.
    #[serde(default)]
    pub last_sync_watermark: Option<DateTime<Utc>>,
    /// Whether changes are logged and the sync cycle runs.
    #[serde(default)]
    pub sync_enabled: bool,
}

impl SyncMetadata {
    /// Creates disabled metadata for a device that has never synced.
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            last_sync_watermark: None,
            sync_enabled: false,
        }
    }

    /// Creates metadata with a random device id.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }
}
