//! Configuration file support for the shell.
//!
//! Loads `CliConfig` from TOML files.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use sqlbridge_common::constants::IN_MEMORY_DATABASE_PATH;
use sqlbridge_common::{BridgeConfig, LogLevel};

/// Shell configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Database to open; relative paths resolve under `databases_path`.
    #[serde(default = "default_database")]
    pub database: String,

    /// Base directory for relative database paths.
    #[serde(default)]
    pub databases_path: Option<PathBuf>,

    /// Open the database read-only.
    #[serde(default)]
    pub read_only: bool,

    /// Default output format.
    #[serde(default = "default_format")]
    pub output_format: String,

    /// Enable timing by default.
    #[serde(default)]
    pub timing: bool,

    /// Native log level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Lock-wait warning threshold in milliseconds.
    #[serde(default)]
    pub lock_warning_ms: Option<u64>,

    /// History file path.
    #[serde(default)]
    pub history_file: Option<PathBuf>,

    /// Maximum history size.
    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

fn default_database() -> String {
    IN_MEMORY_DATABASE_PATH.to_string()
}

fn default_format() -> String {
    "table".to_string()
}

fn default_history_size() -> usize {
    1000
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            databases_path: None,
            read_only: false,
            output_format: default_format(),
            timing: false,
            log_level: LogLevel::None,
            lock_warning_ms: None,
            history_file: None,
            history_size: default_history_size(),
        }
    }
}

impl CliConfig {
    /// Loads configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Loads the default configuration file.
    ///
    /// Looks in the following locations:
    /// 1. ~/.config/sqlbridge/config.toml
    /// 2. ~/.sqlbridge/config.toml
    /// 3. Returns default if not found
    pub fn load_default() -> Result<Self> {
        if let Some(path) = Self::default_config_path() {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        if let Some(home) = dirs::home_dir() {
            let path = home.join(".sqlbridge").join("config.toml");
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Returns the default configuration file path.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("sqlbridge").join("config.toml"))
    }

    /// History file, defaulting to the local data directory.
    pub fn history_path(&self) -> Option<PathBuf> {
        self.history_file
            .clone()
            .or_else(|| dirs::data_local_dir().map(|dir| dir.join("sqlbridge").join("history")))
    }

    /// The gateway configuration this shell runs with.
    pub fn bridge_config(&self) -> BridgeConfig {
        let mut bridge = BridgeConfig::default();
        if let Some(path) = &self.databases_path {
            bridge.databases_path = path.clone();
        }
        if let Some(ms) = self.lock_warning_ms {
            bridge.lock_warning_duration_ms = ms;
        }
        bridge.log_level = self.log_level;
        bridge
    }
}
