//! Application configuration.
//!
//! Values are layered as defaults < `<data_dir>/stockpile.json` <
//! environment variables, and each value remembers where it came from so
//! `stockpile config` can explain the effective setup.

use crate::error::{CliError, CliResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use stockpile_sync_engine::DEFAULT_SYNC_INTERVAL;

/// Name of the config file inside the data directory.
pub const CONFIG_FILE_NAME: &str = "stockpile.json";

/// Name of the SQLite database inside the data directory.
pub const DATABASE_FILE_NAME: &str = "stockpile.db";

/// Versions kept by `backup cleanup` when `--keep` is not given.
pub const DEFAULT_KEEP_VERSIONS: usize = 10;

const ENV_DATA_DIR: &str = "STOCKPILE_DATA_DIR";
const ENV_DATABASE_PATH: &str = "STOCKPILE_DATABASE_PATH";
const ENV_REMOTE_URL: &str = "STOCKPILE_REMOTE_URL";
const ENV_API_KEY: &str = "STOCKPILE_API_KEY";
const ENV_PASSPHRASE: &str = "STOCKPILE_PASSPHRASE";
const ENV_SYNC_INTERVAL: &str = "STOCKPILE_SYNC_INTERVAL_SECS";
const ENV_DEVICE_ID: &str = "STOCKPILE_DEVICE_ID";

/// Where a configuration value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    /// Built-in default.
    Default,
    /// Command-line flag.
    Flag,
    /// Config file.
    File,
    /// Environment variable.
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Default => "default",
            Self::Flag => "flag",
            Self::File => "file",
            Self::Environment => "environment",
        };
        f.write_str(name)
    }
}

/// A configuration value with its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigValue<T> {
    /// The value.
    pub value: T,
    /// Where it came from.
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    /// Wraps a value.
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// On-disk shape of `stockpile.json`. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    tracked_tables: Option<Vec<String>>,
    remote_url: Option<String>,
    api_key: Option<String>,
    passphrase: Option<String>,
    sync_interval_secs: Option<u64>,
    device_id: Option<String>,
    keep_versions: Option<usize>,
    compress: Option<bool>,
}

/// Effective configuration of the `stockpile` binary.
#[derive(Clone)]
pub struct AppConfig {
    /// Directory holding the database, backups and state.
    pub data_dir: ConfigValue<PathBuf>,
    /// SQLite database file.
    pub database_path: ConfigValue<PathBuf>,
    /// Tables included in snapshots. Empty means every user table.
    pub tracked_tables: Vec<String>,
    /// Base URL of the remote change log.
    pub remote_url: Option<ConfigValue<String>>,
    /// API key for the remote change log.
    pub api_key: Option<String>,
    /// Passphrase the snapshot key is derived from.
    pub passphrase: Option<String>,
    /// Interval of `sync run`.
    pub sync_interval: ConfigValue<Duration>,
    /// Fixed device id, overriding the generated one.
    pub device_id: Option<String>,
    /// Default retention of `backup cleanup`.
    pub keep_versions: usize,
    /// Whether snapshots are compressed before encryption.
    pub compress: bool,
    /// Config file that was read, if any.
    pub config_file: Option<PathBuf>,
}

impl AppConfig {
    /// Loads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or
    /// parsed, or an environment value is malformed.
    pub fn load(data_dir_flag: Option<PathBuf>) -> CliResult<Self> {
        Self::load_with(data_dir_flag, |key| std::env::var(key).ok())
    }

    /// Loads the configuration, reading environment variables through `env`.
    ///
    /// # Errors
    ///
    /// See [`load`](Self::load).
    pub fn load_with(
        data_dir_flag: Option<PathBuf>,
        env: impl Fn(&str) -> Option<String>,
    ) -> CliResult<Self> {
        let data_dir = match (data_dir_flag, env(ENV_DATA_DIR)) {
            (Some(dir), _) => ConfigValue::new(dir, ConfigSource::Flag),
            (None, Some(dir)) => ConfigValue::new(PathBuf::from(dir), ConfigSource::Environment),
            (None, None) => ConfigValue::new(Self::default_data_dir(), ConfigSource::Default),
        };

        let mut config = Self {
            database_path: ConfigValue::new(
                data_dir.value.join(DATABASE_FILE_NAME),
                ConfigSource::Default,
            ),
            data_dir,
            tracked_tables: Vec::new(),
            remote_url: None,
            api_key: None,
            passphrase: None,
            sync_interval: ConfigValue::new(DEFAULT_SYNC_INTERVAL, ConfigSource::Default),
            device_id: None,
            keep_versions: DEFAULT_KEEP_VERSIONS,
            compress: true,
            config_file: None,
        };

        let path = config.data_dir.value.join(CONFIG_FILE_NAME);
        if path.exists() {
            let file = Self::read_file(&path)?;
            config.apply_file(file, &path)?;
            config.config_file = Some(path);
        }
        config.apply_env(&env)?;
        Ok(config)
    }

    fn read_file(path: &Path) -> CliResult<ConfigFile> {
        let contents = std::fs::read_to_string(path).map_err(|source| CliError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| CliError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_file(&mut self, file: ConfigFile, path: &Path) -> CliResult<()> {
        if let Some(db_path) = file.database_path {
            // Relative paths are relative to the config file's directory.
            let resolved = if db_path.is_relative() {
                path.parent().map_or(db_path.clone(), |dir| dir.join(&db_path))
            } else {
                db_path
            };
            self.database_path = ConfigValue::new(resolved, ConfigSource::File);
        }
        if let Some(tables) = file.tracked_tables {
            self.tracked_tables = tables;
        }
        if let Some(url) = file.remote_url {
            self.remote_url = Some(ConfigValue::new(url, ConfigSource::File));
        }
        if file.api_key.is_some() {
            self.api_key = file.api_key;
        }
        if file.passphrase.is_some() {
            self.passphrase = file.passphrase;
        }
        if let Some(secs) = file.sync_interval_secs {
            self.sync_interval = ConfigValue::new(interval("sync_interval_secs", secs)?, ConfigSource::File);
        }
        if file.device_id.is_some() {
            self.device_id = file.device_id;
        }
        if let Some(keep) = file.keep_versions {
            self.keep_versions = keep;
        }
        if let Some(compress) = file.compress {
            self.compress = compress;
        }
        Ok(())
    }

    fn apply_env(&mut self, env: &impl Fn(&str) -> Option<String>) -> CliResult<()> {
        if let Some(path) = env(ENV_DATABASE_PATH) {
            self.database_path = ConfigValue::new(PathBuf::from(path), ConfigSource::Environment);
        }
        if let Some(url) = env(ENV_REMOTE_URL) {
            self.remote_url = Some(ConfigValue::new(url, ConfigSource::Environment));
        }
        if let Some(key) = env(ENV_API_KEY) {
            self.api_key = Some(key);
        }
        if let Some(passphrase) = env(ENV_PASSPHRASE) {
            self.passphrase = Some(passphrase);
        }
        if let Some(raw) = env(ENV_SYNC_INTERVAL) {
            let secs = raw
                .trim()
                .parse::<u64>()
                .map_err(|e| CliError::invalid_setting(ENV_SYNC_INTERVAL, e.to_string()))?;
            self.sync_interval =
                ConfigValue::new(interval(ENV_SYNC_INTERVAL, secs)?, ConfigSource::Environment);
        }
        if let Some(device_id) = env(ENV_DEVICE_ID) {
            self.device_id = Some(device_id);
        }
        Ok(())
    }

    /// Returns true if both the remote URL and API key are set.
    pub fn remote_configured(&self) -> bool {
        self.remote_url.is_some() && self.api_key.is_some()
    }

    /// Directory of the file blob repository.
    pub fn backups_dir(&self) -> PathBuf {
        self.data_dir.value.join("backups")
    }

    /// Directory of the file state store.
    pub fn state_dir(&self) -> PathBuf {
        self.data_dir.value.join("state")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/stockpile/
    /// - macOS: ~/Library/Application Support/stockpile/
    /// - Windows: %APPDATA%/stockpile/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stockpile")
    }
}

fn interval(key: &str, secs: u64) -> CliResult<Duration> {
    if secs == 0 {
        return Err(CliError::invalid_setting(key, "interval must be at least one second"));
    }
    Ok(Duration::from_secs(secs))
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("data_dir", &self.data_dir)
            .field("database_path", &self.database_path)
            .field("tracked_tables", &self.tracked_tables)
            .field("remote_url", &self.remote_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[REDACTED]"))
            .field("sync_interval", &self.sync_interval)
            .field("device_id", &self.device_id)
            .field("keep_versions", &self.keep_versions)
            .field("compress", &self.compress)
            .field("config_file", &self.config_file)
            .finish()
    }
}
