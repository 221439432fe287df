//! Ad-hoc snapshot files.
//!
//! `export` writes an encoded snapshot to a file and `import` restores one,
//! neither touching the version ledger.

use super::backup::print_report;
use super::format_size;
use crate::context::AppContext;
use crate::error::CliResult;
use std::fs;
use std::io::Write;
use std::path::Path;
use stockpile_core::PayloadForm;
use tracing::info;

/// Exports the tracked tables to `output_path`.
pub fn export(ctx: &AppContext, output_path: &Path) -> CliResult<()> {
    info!("Exporting snapshot to {:?}", output_path);
    let encoded = ctx.exporter().export_bytes()?;

    let mut file = fs::File::create(output_path)?;
    file.write_all(&encoded.bytes)?;
    file.sync_all()?;

    let form = match encoded.form {
        PayloadForm::Plain => "plain JSON",
        PayloadForm::Encrypted => "encrypted",
        PayloadForm::CompressedEncrypted => "compressed and encrypted",
    };
    println!("✓ Snapshot exported");
    println!("  Path: {:?}", output_path);
    println!("  Size: {}", format_size(encoded.bytes.len() as u64));
    println!("  Form: {form}");
    Ok(())
}

/// Restores the snapshot in `input_path`.
pub fn import(ctx: &AppContext, input_path: &Path) -> CliResult<()> {
    info!("Importing snapshot from {:?}", input_path);
    let bytes = fs::read(input_path)?;
    let report = ctx.restorer().restore(&bytes)?;

    println!("✓ Snapshot imported");
    print_report(&report);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::seeded_context;
    use stockpile_core::LocalStore;
    use stockpile_testkit::prelude::*;
    use tempfile::tempdir;

    #[test]
    fn export_then_import_restores_rows() {
        let dir = tempdir().unwrap();
        let ctx = seeded_context(dir.path(), Some("pass"), 4);
        let file = dir.path().join("snapshot.bin");

        export(&ctx, &file).unwrap();
        ctx.store().delete_all(INVENTORY_TABLE).unwrap();
        import(&ctx, &file).unwrap();

        assert_eq!(ctx.store().read_all(INVENTORY_TABLE).unwrap().len(), 4);
        assert!(ctx.ledger().list().is_empty());
    }

    #[test]
    fn imports_legacy_plain_json() {
        let dir = tempdir().unwrap();
        let ctx = seeded_context(dir.path(), Some("pass"), 1);
        let file = dir.path().join("legacy.json");
        fs::write(
            &file,
            r#"{"data":{"inventory_items":[{"id":"SKU900","name":"Legacy","quantity":9,"price":2.5}]}}"#,
        )
        .unwrap();

        import(&ctx, &file).unwrap();
        assert_eq!(quantity_of(ctx.store().as_ref(), "SKU900"), Some(9));
        assert_eq!(quantity_of(ctx.store().as_ref(), "SKU001"), None);
    }

    #[test]
    fn garbage_file_leaves_store_untouched() {
        let dir = tempdir().unwrap();
        let ctx = seeded_context(dir.path(), None, 2);
        let file = dir.path().join("garbage.bin");
        fs::write(&file, [0xde, 0xad, 0xbe, 0xef]).unwrap();

        assert!(import(&ctx, &file).is_err());
        assert_eq!(ctx.store().read_all(INVENTORY_TABLE).unwrap().len(), 2);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let ctx = seeded_context(dir.path(), None, 1);
        let err = import(&ctx, &dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, crate::error::CliError::Io(_)));
    }
}
