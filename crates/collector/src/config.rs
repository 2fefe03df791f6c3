//! Collector configuration.
//!
//! Hosts usually build a [`Config`] in code; it can also be read from TOML:
//!
//! ```toml
//! endpoint = "https://logs.example.com/ingest"
//! intercept_native_console_logs = true
//! flush_interval_ms = 5000
//! ```

use std::path::Path;
use std::time::Duration;

use flog_protocol::DEFAULT_FLUSH_INTERVAL;
use serde::{Deserialize, Serialize};

use crate::error::CollectorError;

/// Errors from loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Collector configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// URL that receives flushed batches. Required.
    #[serde(default)]
    pub endpoint: String,

    /// Forward `tracing` events into the capture queue.
    #[serde(default = "default_true")]
    pub intercept_native_console_logs: bool,

    /// Interval between periodic flushes, in milliseconds.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_flush_interval_ms() -> u64 {
    DEFAULT_FLUSH_INTERVAL.as_millis() as u64
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            intercept_native_console_logs: default_true(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

impl Config {
    /// Creates a configuration with defaults for everything but the endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Parses a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Reads a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Checks that the configuration can start a collector.
    pub fn validate(&self) -> Result<(), CollectorError> {
        if self.endpoint.trim().is_empty() {
            return Err(CollectorError::MissingEndpoint);
        }
        Ok(())
    }

    /// The flush interval, clamped to at least one millisecond.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }
}
