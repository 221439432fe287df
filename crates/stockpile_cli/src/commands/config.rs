//! Shows the effective configuration.

use crate::config::AppConfig;
use crate::error::CliResult;

/// Prints every setting with where it came from. Secrets are never shown.
pub fn show(config: &AppConfig) -> CliResult<()> {
    println!("Configuration");
    println!("=============");
    println!(
        "  Data dir: {} ({})",
        config.data_dir.value.display(),
        config.data_dir.source
    );
    println!(
        "  Database: {} ({})",
        config.database_path.value.display(),
        config.database_path.source
    );
    match &config.config_file {
        Some(path) => println!("  Config file: {}", path.display()),
        None => println!("  Config file: none"),
    }
    if config.tracked_tables.is_empty() {
        println!("  Tracked tables: all");
    } else {
        println!("  Tracked tables: {}", config.tracked_tables.join(", "));
    }
    println!("  Encryption: {}", if config.passphrase.is_some() { "on" } else { "off" });
    println!("  Compression: {}", if config.compress { "on" } else { "off" });
    println!("  Keep versions: {}", config.keep_versions);
    match &config.remote_url {
        Some(url) => println!("  Remote: {} ({})", url.value, url.source),
        None => println!("  Remote: not configured"),
    }
    println!("  API key: {}", if config.api_key.is_some() { "set" } else { "not set" });
    println!(
        "  Sync interval: {}s ({})",
        config.sync_interval.value.as_secs(),
        config.sync_interval.source
    );
    Ok(())
}
