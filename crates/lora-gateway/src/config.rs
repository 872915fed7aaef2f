// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Gateway configuration.
//!
//! Values come from built-in defaults, an optional TOML file, and finally
//! CLI flags / environment variables (applied by the binary).
//!
//! ```toml
//! tick_interval_ms = 100
//! persist_queue = 0
//!
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud_rate = 115200
//! read_timeout_ms = 1000
//! reconnect_backoff_ms = 5000
//!
//! [thresholds]
//! humidity = 40.0
//! temperature = 30.0
//!
//! [storage]
//! backend = "postgres"
//! table = "readings"
//!
//! [storage.database]
//! host = "localhost"
//! database = "irrigation"
//! user = "irrigation_app"
//! port = 5432
//! ```

use crate::classify::Thresholds;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Sleep between idle polls (milliseconds).
    pub tick_interval_ms: u64,

    /// Capacity of the hand-off queue to a persistence worker.
    /// 0 persists inline on the ingestion loop.
    pub persist_queue: usize,

    /// Serial device settings.
    pub serial: SerialConfig,

    /// Classification thresholds.
    pub thresholds: Thresholds,

    /// Storage sink settings.
    pub storage: StorageConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            persist_queue: 0,
            serial: SerialConfig::default(),
            thresholds: Thresholds::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a TOML file.
    ///
    /// The result is not validated; call [`GatewayConfig::validate`] once
    /// all overrides are applied.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Idle tick interval.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.serial.validate()?;

        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "tick_interval_ms must be greater than 0".into(),
            ));
        }

        if !self.thresholds.humidity.is_finite() || !self.thresholds.temperature.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "Thresholds must be finite (humidity={}, temperature={})",
                self.thresholds.humidity, self.thresholds.temperature
            )));
        }

        self.storage.validate()
    }
}

/// Serial device settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path (e.g. `/dev/ttyUSB0`, `COM3`).
    pub port: String,

    /// Baud rate.
    pub baud_rate: u32,

    /// Upper bound on a single blocking read (milliseconds).
    pub read_timeout_ms: u64,

    /// Delay before retrying after a failed open or a lost link (milliseconds).
    pub reconnect_backoff_ms: u64,

    /// Unterminated input longer than this is discarded.
    pub max_line_bytes: usize,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            read_timeout_ms: 1000,
            reconnect_backoff_ms: 5000,
            max_line_bytes: 4096,
        }
    }
}

impl SerialConfig {
    /// Read timeout.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Reconnect backoff.
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.port.trim().is_empty() {
            return Err(ConfigError::Invalid("Serial port path is empty".into()));
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid("Baud rate must be greater than 0".into()));
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "read_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.reconnect_backoff_ms == 0 {
            return Err(ConfigError::Invalid(
                "reconnect_backoff_ms must be greater than 0".into(),
            ));
        }
        if self.max_line_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_line_bytes must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Central PostgreSQL server.
    #[default]
    Postgres,
    /// Local SQLite file.
    Sqlite,
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::Postgres => f.write_str("postgres"),
            StorageBackend::Sqlite => f.write_str("sqlite"),
        }
    }
}

/// Storage sink settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend to write to.
    pub backend: StorageBackend,

    /// Table receiving one row per reading.
    pub table: String,

    /// SQLite database file.
    pub sqlite_path: PathBuf,

    /// PostgreSQL connection parameters.
    pub database: DbConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            table: "readings".to_string(),
            sqlite_path: PathBuf::from("gateway.db"),
            database: DbConfig::default(),
        }
    }
}

impl StorageConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !is_sql_identifier(&self.table) {
            return Err(ConfigError::Invalid(format!(
                "Table name '{}' is not a plain SQL identifier",
                self.table
            )));
        }

        match self.backend {
            StorageBackend::Postgres => {
                for (field, value) in [
                    ("host", &self.database.host),
                    ("database", &self.database.database),
                    ("user", &self.database.user),
                ] {
                    if value.trim().is_empty() {
                        return Err(ConfigError::Invalid(format!(
                            "Database {} must not be empty",
                            field
                        )));
                    }
                }
            }
            StorageBackend::Sqlite => {
                if self.sqlite_path.as_os_str().is_empty() {
                    return Err(ConfigError::Invalid("SQLite path is empty".into()));
                }
            }
        }

        Ok(())
    }
}

/// PostgreSQL connection parameters.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    pub host: String,
    pub database: String,
    pub user: String,
    pub password: String,
    pub port: u16,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            database: "irrigation".to_string(),
            user: "irrigation_app".to_string(),
            password: String::new(),
            port: 5432,
            connect_timeout_secs: 5,
        }
    }
}

impl DbConfig {
    /// Connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

// Keeps the password out of logs and `config` output.
impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("database", &self.database)
            .field("user", &self.user)
            .field(
                "password",
                &if self.password.is_empty() { "" } else { "***" },
            )
            .field("port", &self.port)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// Check that `name` can be spliced into SQL as a table name.
pub fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
