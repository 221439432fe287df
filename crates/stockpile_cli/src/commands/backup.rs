//! Versioned backup commands.
//!
//! Every command goes through the [`VersionLedger`](stockpile_core::VersionLedger),
//! so snapshots are numbered, checksummed and recorded in the rollback log.

use super::{format_size, format_timestamp};
use crate::context::AppContext;
use crate::error::CliResult;
use std::time::Duration;
use stockpile_core::{RestoreReport, RollbackStatus, TableStatus};
use tracing::info;

/// Creates a new backup version.
pub fn create(ctx: &AppContext, description: Option<&str>) -> CliResult<()> {
    info!(tables = ?ctx.backup_config().tracked_tables, "creating backup");
    let record = ctx.ledger().create_version(description)?;

    println!("✓ Backup version {} created", record.version);
    println!("  Blob: {}", record.snapshot.blob_name);
    println!("  Size: {}", format_size(record.snapshot.size));
    if let Some(checksum) = &record.snapshot.checksum {
        println!("  SHA-256: {checksum}");
    }
    println!("  Created: {}", format_timestamp(record.snapshot.created_at));
    Ok(())
}

/// Lists recorded versions, oldest first.
pub fn list(ctx: &AppContext) -> CliResult<()> {
    let records = ctx.ledger().list();
    if records.is_empty() {
        println!("No backups yet");
        return Ok(());
    }
    let current = ctx.ledger().current_version();

    println!("{:>3} {:>7}  {:<23}  {:>10}  Description", "", "Version", "Created", "Size");
    for record in records {
        let marker = if Some(record.version) == current { "*" } else { "" };
        println!(
            "{:>3} {:>7}  {:<23}  {:>10}  {}",
            marker,
            record.version,
            format_timestamp(record.snapshot.created_at),
            format_size(record.snapshot.size),
            record.description.as_deref().unwrap_or("-"),
        );
    }
    if let Some(version) = current {
        if ctx.ledger().by_version(version).is_none() {
            println!("  Current version {version} was removed by cleanup");
        }
    }
    Ok(())
}

/// Rolls the store back to `version`.
pub fn rollback(ctx: &AppContext, version: u64) -> CliResult<()> {
    info!(version, "rolling back");
    let report = ctx.ledger().rollback_to(version)?;
    println!("✓ Rolled back to version {version}");
    print_report(&report);
    Ok(())
}

/// Restores the highest recorded version.
pub fn restore_latest(ctx: &AppContext) -> CliResult<()> {
    let report = ctx.ledger().restore_latest()?;
    println!(
        "✓ Restored latest version {}",
        ctx.ledger().current_version().unwrap_or_default()
    );
    print_report(&report);
    Ok(())
}

/// Keeps the `keep` highest versions and deletes the rest.
pub fn cleanup(ctx: &AppContext, keep: Option<usize>) -> CliResult<()> {
    let keep = keep.unwrap_or(ctx.config().keep_versions);
    let report = ctx.ledger().cleanup_old_versions(keep)?;
    if report.removed_versions.is_empty() {
        println!("✓ Nothing to clean up (keeping {keep})");
        return Ok(());
    }
    let removed: Vec<String> = report.removed_versions.iter().map(u64::to_string).collect();
    println!("✓ Removed {} version(s): {}", removed.len(), removed.join(", "));
    println!("  Blobs deleted: {}", report.removed_blobs);
    Ok(())
}

/// Shows the rollback log, newest last.
pub fn history(ctx: &AppContext) -> CliResult<()> {
    let entries = ctx.ledger().rollback_history();
    if entries.is_empty() {
        println!("No rollbacks recorded");
        return Ok(());
    }
    for entry in entries {
        let from = entry
            .from_version
            .map_or_else(|| "-".to_string(), |v| v.to_string());
        let status = match entry.status {
            RollbackStatus::Started => "started",
            RollbackStatus::Success => "success",
            RollbackStatus::Failed => "failed",
        };
        println!(
            "{}  {} -> {}  {}",
            format_timestamp(entry.timestamp),
            from,
            entry.to_version,
            status
        );
        if let Some(message) = entry.error_message {
            println!("    {message}");
        }
    }
    Ok(())
}

/// Prints a time-limited download URL for `version`.
pub fn url(ctx: &AppContext, version: u64, ttl_secs: Option<u64>) -> CliResult<()> {
    let url = ctx
        .ledger()
        .signed_url(version, ttl_secs.map(Duration::from_secs))?;
    println!("{url}");
    Ok(())
}

pub(crate) fn print_report(report: &RestoreReport) {
    println!("  Decoded with: {}", report.strategy);
    println!("  Rows restored: {}", report.restored_rows());
    if report.skipped_rows() > 0 {
        println!("  Rows skipped: {}", report.skipped_rows());
    }
    for table in &report.tables {
        match &table.status {
            TableStatus::Replaced {
                deleted,
                inserted,
                skipped,
            } => println!(
                "    {}: {deleted} replaced by {inserted} ({skipped} skipped)",
                table.table
            ),
            TableStatus::Missing => println!("    {}: not in local schema, skipped", table.table),
            TableStatus::Protected => println!("    {}: protected, skipped", table.table),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::seeded_context;
    use stockpile_core::{CoreError, LocalStore};
    use stockpile_testkit::prelude::*;
    use tempfile::tempdir;

    #[test]
    fn create_list_and_rollback() {
        let dir = tempdir().unwrap();
        let ctx = seeded_context(dir.path(), None, 2);

        create(&ctx, Some("two items")).unwrap();
        for n in 3..=5 {
            ctx.store().insert(INVENTORY_TABLE, &item(n)).unwrap();
        }
        create(&ctx, None).unwrap();
        list(&ctx).unwrap();

        rollback(&ctx, 1).unwrap();
        let rows = ctx.store().read_all(INVENTORY_TABLE).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(ctx.ledger().current_version(), Some(1));
        history(&ctx).unwrap();
    }

    #[test]
    fn rollback_to_unknown_version_fails() {
        let dir = tempdir().unwrap();
        let ctx = seeded_context(dir.path(), None, 1);
        let err = rollback(&ctx, 9).unwrap_err();
        assert!(matches!(
            err,
            crate::error::CliError::Core(CoreError::VersionNotFound { version: 9 })
        ));
    }

    #[test]
    fn cleanup_uses_configured_retention() {
        let dir = tempdir().unwrap();
        let ctx = seeded_context(dir.path(), None, 1);
        for _ in 0..4 {
            create(&ctx, None).unwrap();
        }
        cleanup(&ctx, Some(2)).unwrap();
        let versions: Vec<u64> = ctx.ledger().list().iter().map(|r| r.version).collect();
        assert_eq!(versions, vec![3, 4]);
    }

    #[test]
    fn encrypted_backup_restores_latest() {
        let dir = tempdir().unwrap();
        let ctx = seeded_context(dir.path(), Some("pass"), 3);
        create(&ctx, None).unwrap();
        ctx.store().delete_all(INVENTORY_TABLE).unwrap();

        restore_latest(&ctx).unwrap();
        assert_eq!(ctx.store().read_all(INVENTORY_TABLE).unwrap().len(), 3);
    }

    #[test]
    fn url_points_into_backups_dir() {
        let dir = tempdir().unwrap();
        let ctx = seeded_context(dir.path(), None, 1);
        create(&ctx, None).unwrap();
        url(&ctx, 1, Some(60)).unwrap();
        let signed = ctx.ledger().signed_url(1, None).unwrap();
        assert!(signed.starts_with("file://"));
    }
}
