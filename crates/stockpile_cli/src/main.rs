//! Stockpile CLI
//!
//! Command-line tools for versioned backups and change-log sync of a
//! stockpile SQLite store.
//!
//! # Commands
//!
//! - `backup` - Create, list, roll back and clean up versioned backups
//! - `export` / `import` - Write or restore a snapshot file outside the ledger
//! - `sync` - Push and pull the change log, toggle sync, record changes
//! - `config` - Show the effective configuration

mod commands;
mod config;
mod context;
mod error;
mod http;

use clap::{Parser, Subcommand};
use config::AppConfig;
use context::AppContext;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Stockpile backup and sync tools.
#[derive(Parser)]
#[command(name = "stockpile")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Data directory holding the database, backups and state
    #[arg(global = true, short, long)]
    data_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage versioned backups
    Backup {
        #[command(subcommand)]
        command: BackupCommand,
    },

    /// Export the tracked tables to a snapshot file
    Export {
        /// Output file
        file: PathBuf,
    },

    /// Restore a snapshot file into the store
    Import {
        /// Snapshot file
        file: PathBuf,
    },

    /// Replicate the change log
    Sync {
        #[command(subcommand)]
        command: SyncCommand,
    },

    /// Show the effective configuration
    Config,

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum BackupCommand {
    /// Create a new backup version
    Create {
        /// Description stored with the version
        #[arg(short = 'm', long)]
        description: Option<String>,
    },

    /// List backup versions
    List,

    /// Roll the store back to a version
    Rollback {
        /// Target version
        version: u64,
    },

    /// Restore the newest backup version
    RestoreLatest,

    /// Delete all but the newest versions
    Cleanup {
        /// Number of versions to keep
        #[arg(short, long)]
        keep: Option<usize>,
    },

    /// Show the rollback log
    History,

    /// Print a time-limited download URL for a version
    Url {
        /// Version
        version: u64,

        /// URL lifetime in seconds
        #[arg(short, long)]
        ttl: Option<u64>,
    },
}

#[derive(Subcommand)]
enum SyncCommand {
    /// Run one push-then-pull cycle
    Once,

    /// Show device and sync status
    Status,

    /// Turn sync on
    Enable,

    /// Turn sync off
    Disable,

    /// Sync on a timer until Ctrl-C
    Run {
        /// Seconds between cycles
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Record a local change in the change log
    LogChange {
        /// Table the change applies to
        #[arg(short, long)]
        table: String,

        /// Operation (insert, update, delete)
        #[arg(short, long)]
        operation: String,

        /// Identifier of the changed record
        #[arg(short, long)]
        record_id: String,

        /// Changed fields as a JSON object
        #[arg(long)]
        data: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = AppConfig::load(cli.data_dir)?;

    match cli.command {
        Commands::Config => commands::config::show(&config)?,
        Commands::Version => {
            println!("Stockpile CLI v{}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Backup { command } => {
            let ctx = AppContext::open(config)?;
            match command {
                BackupCommand::Create { description } => {
                    commands::backup::create(&ctx, description.as_deref())?;
                }
                BackupCommand::List => commands::backup::list(&ctx)?,
                BackupCommand::Rollback { version } => commands::backup::rollback(&ctx, version)?,
                BackupCommand::RestoreLatest => commands::backup::restore_latest(&ctx)?,
                BackupCommand::Cleanup { keep } => commands::backup::cleanup(&ctx, keep)?,
                BackupCommand::History => commands::backup::history(&ctx)?,
                BackupCommand::Url { version, ttl } => commands::backup::url(&ctx, version, ttl)?,
            }
        }
        Commands::Export { file } => {
            let ctx = AppContext::open(config)?;
            commands::transfer::export(&ctx, &file)?;
        }
        Commands::Import { file } => {
            let ctx = AppContext::open(config)?;
            commands::transfer::import(&ctx, &file)?;
        }
        Commands::Sync { command } => {
            let ctx = AppContext::open(config)?;
            match command {
                SyncCommand::Once => commands::sync::once(&ctx)?,
                SyncCommand::Status => commands::sync::status(&ctx)?,
                SyncCommand::Enable => commands::sync::enable(&ctx)?,
                SyncCommand::Disable => commands::sync::disable(&ctx)?,
                SyncCommand::Run { interval } => {
                    commands::sync::run(&ctx, interval.map(Duration::from_secs))?;
                }
                SyncCommand::LogChange {
                    table,
                    operation,
                    record_id,
                    data,
                } => commands::sync::log_change(
                    &ctx,
                    &table,
                    &operation,
                    &record_id,
                    data.as_deref(),
                )?,
            }
        }
    }

    Ok(())
}
