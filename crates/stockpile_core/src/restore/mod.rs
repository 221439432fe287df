//! Restore engine.
//!
//! A restore runs in two phases. Decoding reads the payload through the
//! fallback chain and validates the document shape without touching the
//! store. Applying replaces table contents inside one transaction while
//! holding the [`StoreGate`] exclusively.

mod apply;
mod decode;

pub use apply::{apply, apply_then, RecordOutcome, RecordStatus, RestoreReport, TableOutcome, TableStatus};
pub use decode::{
    decode, decode_with, sanitize, Decoded, DecodeStrategy, DECRYPT, DECRYPT_DECOMPRESS,
    DEFAULT_CHAIN, PLAINTEXT, SANITIZE,
};

use crate::config::BackupConfig;
use crate::error::CoreResult;
use crate::gate::StoreGate;
use crate::store::LocalStore;
use crate::transform::TransformPipeline;
use std::sync::Arc;

/// Restores snapshots and ad-hoc imports into the local store.
pub struct RestoreEngine {
    store: Arc<dyn LocalStore>,
    config: BackupConfig,
    pipeline: Arc<TransformPipeline>,
    gate: Arc<StoreGate>,
}

impl RestoreEngine {
    /// Creates a restore engine.
    pub fn new(
        store: Arc<dyn LocalStore>,
        config: BackupConfig,
        pipeline: Arc<TransformPipeline>,
        gate: Arc<StoreGate>,
    ) -> Self {
        Self {
            store,
            config,
            pipeline,
            gate,
        }
    }

    /// Decodes a payload without applying it.
    ///
    /// # Errors
    ///
    /// Returns a decode or schema error.
    pub fn decode(&self, bytes: &[u8]) -> CoreResult<Decoded> {
        decode(&self.pipeline, bytes)
    }

    /// Decodes and applies a payload.
    ///
    /// Used for ledger rollbacks and for importing a snapshot file that was
    /// never recorded in the ledger.
    ///
    /// # Errors
    ///
    /// Returns a decode or schema error before touching the store, or a
    /// transaction error after rolling the store back.
    pub fn restore(&self, bytes: &[u8]) -> CoreResult<RestoreReport> {
        self.restore_then(bytes, |_| Ok(()))
    }

    /// Decodes and applies a payload, running `before_commit` inside the
    /// restore transaction once every table is replaced.
    ///
    /// An error from `before_commit` rolls the store back.
    ///
    /// # Errors
    ///
    /// As [`restore`](Self::restore).
    pub fn restore_then(
        &self,
        bytes: &[u8],
        before_commit: impl FnOnce(&RestoreReport) -> CoreResult<()>,
    ) -> CoreResult<RestoreReport> {
        let decoded = self.decode(bytes)?;

        let _exclusive = self.gate.exclusive();
        let mut report = apply_then(
            self.store.as_ref(),
            &self.config,
            &decoded.document,
            before_commit,
        )?;
        report.strategy = decoded.strategy;

        tracing::info!(
            strategy = report.strategy,
            restored = report.restored_rows(),
            skipped_rows = report.skipped_rows(),
            skipped_tables = report.skipped_tables().len(),
            "restore committed"
        );
        Ok(report)
    }
}

impl std::fmt::Debug for RestoreEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestoreEngine")
            .field("protected_tables", &self.config.protected_tables)
            .finish_non_exhaustive()
    }
}
