//! Backup engine configuration.

use std::time::Duration;

/// Name of the local change-log table, which restores never touch.
pub const CHANGE_LOG_TABLE: &str = "sync_log";

/// Configuration for exporting, restoring and versioning snapshots.
#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Tables included in every snapshot, in export order.
    pub tracked_tables: Vec<String>,

    /// Tables a restore skips even when the snapshot contains them.
    pub protected_tables: Vec<String>,

    /// Whether to compress payloads before encrypting them.
    pub compress: bool,

    /// Zstd compression level.
    pub compression_level: i32,

    /// Prefix for snapshot blob names.
    pub blob_prefix: String,

    /// Lifetime of signed download URLs.
    pub signed_url_ttl: Duration,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            tracked_tables: Vec::new(),
            protected_tables: vec![CHANGE_LOG_TABLE.to_string()],
            compress: true,
            compression_level: 3,
            blob_prefix: "snapshot".to_string(),
            signed_url_ttl: Duration::from_secs(3600),
        }
    }
}

impl BackupConfig {
    /// Creates a configuration tracking `tables`.
    #[must_use]
    pub fn new<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tracked_tables: tables.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Adds a protected table.
    #[must_use]
    pub fn protect(mut self, table: impl Into<String>) -> Self {
        self.protected_tables.push(table.into());
        self
    }

    /// Sets whether payloads are compressed before encryption.
    #[must_use]
    pub const fn compress(mut self, value: bool) -> Self {
        self.compress = value;
        self
    }

    /// Sets the zstd compression level.
    #[must_use]
    pub const fn compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    /// Sets the blob name prefix.
    #[must_use]
    pub fn blob_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.blob_prefix = prefix.into();
        self
    }

    /// Sets the signed URL lifetime.
    #[must_use]
    pub const fn signed_url_ttl(mut self, ttl: Duration) -> Self {
        self.signed_url_ttl = ttl;
        self
    }

    /// Returns true if `table` is in the allow-list.
    #[must_use]
    pub fn is_tracked(&self, table: &str) -> bool {
        self.tracked_tables.iter().any(|t| t == table)
    }

    /// Returns true if restores must leave `table` alone.
    #[must_use]
    pub fn is_protected(&self, table: &str) -> bool {
        self.protected_tables.iter().any(|t| t == table)
    }
}
