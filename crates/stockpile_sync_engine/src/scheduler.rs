//! Periodic sync driver.
//!
//! Runs [`SyncEngine::sync_once`] on a fixed interval. Cycles run on the
//! blocking pool one at a time; ticks that fire while a cycle is running
//! are dropped, not queued. Stopping waits for a running cycle to finish.

use crate::state::{SyncCycleOutcome, SyncEngine};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Handle to a running sync timer.
#[derive(Debug)]
pub struct SyncScheduler {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SyncScheduler {
    /// Starts the timer on the current tokio runtime.
    ///
    /// The first cycle runs immediately.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start(engine: Arc<SyncEngine>, interval: Duration) -> Self {
        let (stop, mut stopped) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!(interval_ms = interval.as_millis() as u64, "sync timer started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let engine = engine.clone();
                        match tokio::task::spawn_blocking(move || engine.sync_once()).await {
                            Ok(Ok(SyncCycleOutcome::Completed(_) | SyncCycleOutcome::Skipped(_))) => {}
                            Ok(Err(e)) => tracing::warn!(error = %e, "scheduled sync failed"),
                            Err(e) => tracing::error!(error = %e, "sync task panicked"),
                        }
                    }
                    _ = stopped.changed() => break,
                }
            }
            tracing::info!("sync timer stopped");
        });
        Self { stop, task }
    }

    /// Returns true while the timer task is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stops the timer and waits for a running cycle to finish.
    pub async fn stop(self) {
        if self.stop.send(true).is_err() {
            tracing::debug!("sync timer already exited");
        }
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "sync timer task failed");
        }
    }
}
