//! Logging setup.
//!
//! Log output goes to stderr so stdout stays free for command payloads.
//! The filter comes from `LOGFLOW_LOG`, then `RUST_LOG`, then the
//! configured level.

use crate::errors::LogflowError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::IsTerminal;
use std::str::FromStr;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as fmt_layer, EnvFilter};

/// Environment variable holding a filter directive for this crate.
pub const LOG_ENV: &str = "LOGFLOW_LOG";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" | "text" => Ok(Self::Pretty),
            "json" | "jsonl" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Filter directive used when no environment filter is set.
    #[serde(default = "default_level")]
    pub level: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
    /// Whether pretty output carries timestamps.
    #[serde(default = "default_timestamps")]
    pub timestamps: bool,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_timestamps() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            timestamps: default_timestamps(),
        }
    }
}

impl LogConfig {
    /// Sets the level directive.
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Sets the output format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Resolves the filter from the environment, falling back to `level`.
    ///
    /// # Errors
    ///
    /// Returns an error if `level` is not a valid filter directive.
    pub fn env_filter(&self) -> Result<EnvFilter, LogflowError> {
        EnvFilter::try_from_env(LOG_ENV)
            .or_else(|_| EnvFilter::try_from_default_env())
            .or_else(|_| EnvFilter::try_new(&self.level))
            .map_err(|err| LogflowError::Internal(format!("invalid log filter '{}': {err}", self.level)))
    }
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns an error if the filter is invalid or a subscriber is already
/// installed.
pub fn init_logging(config: &LogConfig) -> Result<(), LogflowError> {
    let filter = config.env_filter()?;

    let result = match config.format {
        LogFormat::Pretty => {
            let layer = fmt_layer::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(std::io::stderr().is_terminal());
            if config.timestamps {
                tracing_subscriber::registry().with(filter).with(layer).try_init()
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(layer.without_time())
                    .try_init()
            }
        }
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt_layer::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(false),
            )
            .try_init(),
    };

    result.map_err(|err| LogflowError::Internal(format!("logging already initialized: {err}")))
}
