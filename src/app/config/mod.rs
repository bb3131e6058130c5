mod cli;
pub mod groups;
pub mod serde_helpers;
mod validation;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("File error: {0}")]
    FileError(#[from] std::io::Error),
    #[error("Environment error: {0}")]
    EnvError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Which of the two top-level workers this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// One-shot C6 backfill of every unsynced app, then exit.
    BulkSync,
    /// Long-running C5 loop watching for PICS changes.
    #[default]
    ChangeMonitor,
}

impl Mode {
    pub fn from_env_value(raw: &str) -> Result<Self, ConfigError> {
        match raw.to_lowercase().as_str() {
            "bulk_sync" | "bulk-sync" | "bulksync" => Ok(Mode::BulkSync),
            "change_monitor" | "change-monitor" | "changemonitor" => Ok(Mode::ChangeMonitor),
            other => Err(ConfigError::EnvError(format!(
                "Invalid MODE: {other}. Valid values: bulk_sync, change_monitor"
            ))),
        }
    }
}

// Re-export all public items for backward compatibility
pub use cli::Config;
pub use groups::{BulkConfig, MonitorConfig};
