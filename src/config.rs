//! BallotBox Configuration
//!
//! This module provides configuration structures for the vote server,
//! its on-disk files, session limits and the live tally display.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main BallotBox configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BallotConfig {
    /// Network server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// File locations
    #[serde(default)]
    pub storage: StorageConfig,

    /// Per-connection protocol limits
    #[serde(default)]
    pub session: SessionConfig,

    /// Live tally display
    #[serde(default)]
    pub display: DisplayConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the vote server listens on
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Directory holding the ledger, snapshot and export files
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Read operator commands from stdin while serving
    #[serde(default = "default_true")]
    pub console: bool,
}

/// File names, resolved against `server.data_dir`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Account ledger
    #[serde(default = "default_ledger_file")]
    pub ledger_file: String,

    /// Election snapshot (roster + tally)
    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: String,

    /// Human-readable tally export
    #[serde(default = "default_export_file")]
    pub export_file: String,

    /// Held by a running server; offline roster changes are refused while it exists
    #[serde(default = "default_lock_file")]
    pub lock_file: String,
}

/// Per-connection protocol limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum length of a login or password token
    #[serde(default = "default_max_token_len")]
    pub max_token_len: usize,

    /// Maximum length of one request line
    #[serde(default = "default_max_line_len")]
    pub max_line_len: usize,

    /// How long to wait for each request before dropping the connection
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

/// Live tally display configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Re-render results on stdout while serving
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Refresh interval in milliseconds
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, compact)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:8888".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_ledger_file() -> String {
    "users.csv".to_string()
}

fn default_snapshot_file() -> String {
    "vote_data.txt".to_string()
}

fn default_export_file() -> String {
    "results.csv".to_string()
}

fn default_lock_file() -> String {
    "ballotbox.lock".to_string()
}

fn default_max_token_len() -> usize {
    64
}

fn default_max_line_len() -> usize {
    256
}

fn default_read_timeout_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

fn default_refresh_interval_ms() -> u64 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            data_dir: default_data_dir(),
            console: true,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            ledger_file: default_ledger_file(),
            snapshot_file: default_snapshot_file(),
            export_file: default_export_file(),
            lock_file: default_lock_file(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_token_len: default_max_token_len(),
            max_line_len: default_max_line_len(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            refresh_interval_ms: default_refresh_interval_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl SessionConfig {
    /// Get the per-request read timeout as Duration
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl BallotConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: BallotConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.server.bind_address.is_empty() {
            return Err(crate::Error::Config("server.bind_address cannot be empty".into()));
        }

        for (name, value) in [
            ("storage.ledger_file", &self.storage.ledger_file),
            ("storage.snapshot_file", &self.storage.snapshot_file),
            ("storage.export_file", &self.storage.export_file),
            ("storage.lock_file", &self.storage.lock_file),
        ] {
            if value.is_empty() {
                return Err(crate::Error::Config(format!("{} cannot be empty", name)));
            }
        }

        if self.session.max_token_len == 0 {
            return Err(crate::Error::Config("session.max_token_len must be positive".into()));
        }

        // "AUTH " + login + " " + password
        let min_line = 2 * self.session.max_token_len + 6;
        if self.session.max_line_len < min_line {
            return Err(crate::Error::Config(format!(
                "session.max_line_len must be at least {} to fit an AUTH request",
                min_line
            )));
        }

        if self.session.read_timeout_ms == 0 {
            return Err(crate::Error::Config("session.read_timeout_ms must be positive".into()));
        }

        if self.display.refresh_interval_ms == 0 {
            return Err(crate::Error::Config("display.refresh_interval_ms must be positive".into()));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "compact") {
            return Err(crate::Error::Config(format!(
                "logging.format must be pretty or compact, got {}",
                self.logging.format
            )));
        }

        Ok(())
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &PathBuf {
        &self.server.data_dir
    }

    /// Path of the account ledger
    pub fn ledger_path(&self) -> PathBuf {
        self.server.data_dir.join(&self.storage.ledger_file)
    }

    /// Path of the election snapshot
    pub fn snapshot_path(&self) -> PathBuf {
        self.server.data_dir.join(&self.storage.snapshot_file)
    }

    /// Path of the tally export
    pub fn export_path(&self) -> PathBuf {
        self.server.data_dir.join(&self.storage.export_file)
    }

    /// Path of the serve lock
    pub fn lock_path(&self) -> PathBuf {
        self.server.data_dir.join(&self.storage.lock_file)
    }

    /// Get display refresh interval as Duration
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.display.refresh_interval_ms)
    }
}
