//! Sync commands.

use super::format_timestamp;
use crate::context::AppContext;
use crate::error::{CliError, CliResult};
use std::time::Duration;
use stockpile_codec::Row;
use stockpile_sync_engine::{SkipReason, SyncCycleOutcome, SyncEngine, SyncScheduler};
use stockpile_sync_protocol::Operation;
use tracing::info;

/// Runs one push-then-pull cycle.
pub fn once(ctx: &AppContext) -> CliResult<()> {
    if !ctx.config().remote_configured() {
        return Err(CliError::NotConfigured("remote_url and api_key"));
    }
    let engine = ctx.sync_engine()?;
    match engine.sync_once()? {
        SyncCycleOutcome::Completed(report) => {
            println!("✓ Sync cycle completed in {} ms", report.duration.as_millis());
            println!("  Pushed: {} ({} failed)", report.pushed, report.push_failures);
            println!(
                "  Pulled: {} (applied {}, duplicates {}, failed {})",
                report.pulled, report.applied, report.duplicates, report.apply_failures
            );
            if let Some(error) = &report.pull_error {
                println!("  Pull failed: {error}");
            }
            match report.watermark {
                Some(ts) => println!("  Watermark: {}", format_timestamp(ts)),
                None => println!("  Watermark: none"),
            }
        }
        SyncCycleOutcome::Skipped(reason) => println!("Sync skipped: {}", skip_reason(reason)),
    }
    Ok(())
}

/// Prints device, watermark and pending-event information.
pub fn status(ctx: &AppContext) -> CliResult<()> {
    let engine = ctx.sync_engine()?;
    let metadata = engine.metadata();
    let pending = engine
        .change_log()
        .pending(&metadata.device_id, usize::MAX)?
        .len();

    println!("Sync Status");
    println!("===========");
    println!("  Device: {}", metadata.device_id);
    println!("  Enabled: {}", if metadata.sync_enabled { "yes" } else { "no" });
    match metadata.last_sync_watermark {
        Some(ts) => println!("  Last sync: {}", format_timestamp(ts)),
        None => println!("  Last sync: never"),
    }
    println!("  Pending local changes: {pending}");
    println!(
        "  Remote: {}",
        ctx.config()
            .remote_url
            .as_ref()
            .map_or("not configured", |url| url.value.as_str())
    );
    Ok(())
}

/// Turns sync on.
pub fn enable(ctx: &AppContext) -> CliResult<()> {
    ctx.sync_engine()?.enable()?;
    println!("✓ Sync enabled");
    Ok(())
}

/// Turns sync off.
pub fn disable(ctx: &AppContext) -> CliResult<()> {
    ctx.sync_engine()?.disable()?;
    println!("✓ Sync disabled");
    Ok(())
}

/// Records a local mutation in the change log.
pub fn log_change(
    ctx: &AppContext,
    table: &str,
    operation: &str,
    record_id: &str,
    data: Option<&str>,
) -> CliResult<()> {
    let operation: Operation = operation
        .parse()
        .map_err(|e: stockpile_sync_protocol::ProtocolError| {
            CliError::InvalidArgument(e.to_string())
        })?;
    let payload = match data {
        Some(json) => Row::from_json_str(json)?,
        None => Row::new(),
    };

    let engine = ctx.sync_engine()?;
    match engine.log_change(table, operation, record_id, payload)? {
        Some(event) => {
            println!("✓ Change logged");
            println!("  Event: {}", event.id);
            println!("  Timestamp: {}", format_timestamp(event.timestamp));
            if !engine.is_enabled() {
                println!("  Sync is disabled; the change is pushed once it is enabled");
            }
        }
        None => println!("Sync is disabled; change not recorded"),
    }
    Ok(())
}

/// Runs sync cycles on a timer until interrupted.
pub fn run(ctx: &AppContext, interval: Option<Duration>) -> CliResult<()> {
    if !ctx.config().remote_configured() {
        return Err(CliError::NotConfigured("remote_url and api_key"));
    }
    let interval = interval.unwrap_or(ctx.config().sync_interval.value);
    // Built before the runtime: the blocking HTTP client must not be created
    // inside it.
    let engine = ctx.sync_engine()?;
    if !engine.is_enabled() {
        println!("Sync is disabled; cycles are skipped until `stockpile sync enable`");
    }

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(drive(engine.clone(), interval));
    drop(runtime);
    print_stats(&engine);
    result
}

async fn drive(engine: std::sync::Arc<SyncEngine>, interval: Duration) -> CliResult<()> {
    info!(interval_secs = interval.as_secs(), "starting sync loop");
    println!("Syncing every {}s, press Ctrl-C to stop", interval.as_secs());
    let scheduler = SyncScheduler::start(engine, interval);
    let signal = tokio::signal::ctrl_c().await;
    scheduler.stop().await;
    signal?;
    Ok(())
}

fn print_stats(engine: &SyncEngine) {
    let stats = engine.stats();
    println!("✓ Sync stopped");
    println!(
        "  Cycles: {} completed, {} skipped",
        stats.cycles_completed, stats.cycles_skipped
    );
    println!(
        "  Events: {} pushed, {} pulled, {} applied",
        stats.events_pushed, stats.events_pulled, stats.events_applied
    );
    if let Some(error) = &stats.last_error {
        println!("  Last error: {error}");
    }
}

fn skip_reason(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::Disabled => "sync is disabled",
        SkipReason::AlreadyRunning => "another cycle is running",
        SkipReason::RestoreInProgress => "a restore is in progress",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::seeded_context;
    use tempfile::tempdir;

    #[test]
    fn once_requires_remote() {
        let dir = tempdir().unwrap();
        let ctx = seeded_context(dir.path(), None, 1);
        assert!(matches!(once(&ctx), Err(CliError::NotConfigured(_))));
        assert!(matches!(run(&ctx, None), Err(CliError::NotConfigured(_))));
    }

    #[test]
    fn enable_persists_across_invocations() {
        let dir = tempdir().unwrap();
        let ctx = seeded_context(dir.path(), None, 1);
        enable(&ctx).unwrap();
        assert!(ctx.sync_engine().unwrap().is_enabled());
        disable(&ctx).unwrap();
        assert!(!ctx.sync_engine().unwrap().is_enabled());
        status(&ctx).unwrap();
    }

    #[test]
    fn logged_changes_are_pending() {
        let dir = tempdir().unwrap();
        let ctx = seeded_context(dir.path(), None, 1);
        log_change(
            &ctx,
            "inventory_items",
            "update",
            "SKU001",
            Some(r#"{"quantity": 4}"#),
        )
        .unwrap();

        let engine = ctx.sync_engine().unwrap();
        let pending = engine
            .change_log()
            .pending(&engine.device_id(), usize::MAX)
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].operation, Operation::Update);
        assert_eq!(pending[0].record_id, "SKU001");
    }

    #[test]
    fn log_change_rejects_unknown_operation() {
        let dir = tempdir().unwrap();
        let ctx = seeded_context(dir.path(), None, 1);
        let err = log_change(&ctx, "inventory_items", "upsert", "SKU001", None).unwrap_err();
        assert!(matches!(err, CliError::InvalidArgument(_)));
    }

    #[test]
    fn log_change_rejects_non_object_payload() {
        let dir = tempdir().unwrap();
        let ctx = seeded_context(dir.path(), None, 1);
        let err = log_change(&ctx, "inventory_items", "insert", "SKU001", Some("[1,2]")).unwrap_err();
        assert!(matches!(err, CliError::Codec(_)));
    }
}
