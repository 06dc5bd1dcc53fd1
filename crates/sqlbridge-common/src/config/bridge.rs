//! Bridge configuration structures.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    LOCK_WARNING_DURATION_DEFAULT, QUERY_CURSOR_BUFFER_SIZE_DEFAULT, WORKER_QUEUE_CAPACITY_DEFAULT,
};

/// Native log level.
///
/// Encoded on the wire as an integer: `none` = 0, `sql` = 1, `verbose` = 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// No native logging.
    #[default]
    None,
    /// Log every SQL statement.
    Sql,
    /// Log statements plus open/close/cursor events.
    Verbose,
}

impl LogLevel {
    /// Wire encoding.
    pub fn as_i64(self) -> i64 {
        match self {
            LogLevel::None => 0,
            LogLevel::Sql => 1,
            LogLevel::Verbose => 2,
        }
    }

    /// Decodes the wire encoding; unknown values above 2 clamp to verbose.
    pub fn from_i64(level: i64) -> Self {
        match level {
            i64::MIN..=0 => LogLevel::None,
            1 => LogLevel::Sql,
            _ => LogLevel::Verbose,
        }
    }

    /// True if SQL statements should be logged.
    pub fn has_sql(self) -> bool {
        self >= LogLevel::Sql
    }

    /// True if lifecycle events should be logged.
    pub fn has_verbose(self) -> bool {
        self >= LogLevel::Verbose
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::None => write!(f, "none"),
            LogLevel::Sql => write!(f, "sql"),
            LogLevel::Verbose => write!(f, "verbose"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(LogLevel::None),
            "sql" => Ok(LogLevel::Sql),
            "verbose" => Ok(LogLevel::Verbose),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

/// Configuration of a gateway and the databases opened through it.
///
/// # Example
///
/// ```rust
/// use sqlbridge_common::BridgeConfig;
///
/// let config = BridgeConfig::default();
/// assert_eq!(config.worker_queue_capacity, 1024);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Base directory for relative database paths.
    pub databases_path: PathBuf,

    /// Capacity of the bounded worker queue.
    /// Default: 1024
    pub worker_queue_capacity: usize,

    /// Lock-wait duration after which the warning callback fires.
    /// Default: 10000 ms
    pub lock_warning_duration_ms: u64,

    /// Native log level.
    pub log_level: LogLevel,

    /// Default page size for query cursors.
    /// Default: 100
    pub cursor_page_size: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            databases_path: default_databases_path(),
            worker_queue_capacity: WORKER_QUEUE_CAPACITY_DEFAULT,
            lock_warning_duration_ms: LOCK_WARNING_DURATION_DEFAULT.as_millis() as u64,
            log_level: LogLevel::None,
            cursor_page_size: QUERY_CURSOR_BUFFER_SIZE_DEFAULT,
        }
    }
}

impl BridgeConfig {
    /// Creates a configuration rooted at `databases_path`.
    #[must_use]
    pub fn with_databases_path(databases_path: impl Into<PathBuf>) -> Self {
        Self {
            databases_path: databases_path.into(),
            ..Default::default()
        }
    }

    /// Creates a small configuration for testing.
    #[must_use]
    pub fn for_testing(databases_path: impl Into<PathBuf>) -> Self {
        Self {
            databases_path: databases_path.into(),
            worker_queue_capacity: 64,
            lock_warning_duration_ms: 200,
            log_level: LogLevel::Sql,
            cursor_page_size: 4,
        }
    }

    /// Lock-wait warning threshold as a duration.
    pub fn lock_warning_duration(&self) -> Duration {
        Duration::from_millis(self.lock_warning_duration_ms)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_queue_capacity == 0 {
            return Err("worker_queue_capacity must be greater than 0".to_string());
        }

        if self.cursor_page_size == 0 {
            return Err("cursor_page_size must be greater than 0".to_string());
        }

        if self.databases_path.as_os_str().is_empty() {
            return Err("databases_path must not be empty".to_string());
        }

        Ok(())
    }
}

fn default_databases_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("sqlbridge").join("databases"))
        .unwrap_or_else(|| PathBuf::from("./databases"))
}
