//! Feature rows and the log level vocabulary.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Log severity.
///
/// The numeric encoding returned by [`LogLevel::encoded`] is part of the
/// table schema and must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    /// DEBUG.
    Debug,
    /// INFO.
    Info,
    /// WARN (also WARNING).
    Warn,
    /// ERROR.
    Error,
    /// FATAL (also CRITICAL).
    Fatal,
    /// Anything else.
    Unknown,
}

impl LogLevel {
    /// Parses a level, ignoring case and surrounding whitespace.
    ///
    /// Unrecognized values map to [`LogLevel::Unknown`].
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Self::Debug,
            "INFO" => Self::Info,
            "WARN" | "WARNING" => Self::Warn,
            "ERROR" => Self::Error,
            "FATAL" | "CRITICAL" => Self::Fatal,
            _ => Self::Unknown,
        }
    }

    /// Stable ordinal: DEBUG=0, INFO=1, WARN=2, ERROR=3, FATAL=4, UNKNOWN=-1.
    #[must_use]
    pub fn encoded(self) -> i32 {
        match self {
            Self::Debug => 0,
            Self::Info => 1,
            Self::Warn => 2,
            Self::Error => 3,
            Self::Fatal => 4,
            Self::Unknown => -1,
        }
    }

    /// ERROR and FATAL count as errors.
    #[must_use]
    pub fn is_error(self) -> bool {
        matches!(self, Self::Error | Self::Fatal)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// A typed, ML-ready row derived from one log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    /// When the event happened.
    pub event_timestamp: DateTime<Utc>,
    /// Calendar date of the event in the reporting timezone.
    pub event_date: NaiveDate,
    /// Hour of the event in the reporting timezone (0-23).
    pub hour_of_day: u32,
    /// Emitting service.
    pub service: String,
    /// Parsed severity.
    pub log_level: LogLevel,
    /// Stable ordinal of `log_level`.
    pub log_level_encoded: i32,
    /// True for ERROR and FATAL.
    pub is_error: bool,
    /// Normalized message text.
    pub message: String,
    /// Number of characters in `message`.
    pub message_length: usize,
    /// Share of error rows for `service` within the batch.
    pub service_error_rate: f64,
    /// Optional user id.
    #[serde(default)]
    pub user_id: Option<i64>,
    /// Object the record was read from.
    pub source_object: String,
    /// 1-based line within `source_object`.
    pub line_offset: usize,
    /// Natural key used for idempotent writes.
    pub row_key: String,
}

/// Computes the natural key of a row: hex SHA-256 over source, line and
/// raw content.
#[must_use]
pub fn row_key(source: &str, line: usize, raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update([0u8]);
    hasher.update(line.to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}
