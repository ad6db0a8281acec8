//! Raw input records and rejections.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One delimited line of a source object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    source: String,
    line: usize,
    fields: Vec<String>,
    raw: String,
    #[serde(default)]
    invalid_encoding: bool,
}

impl RawRecord {
    /// Splits `raw` on `delimiter`.
    ///
    /// A field that starts with a double quote runs to the matching
    /// closing quote and may contain the delimiter; `""` inside a quoted
    /// field is a literal quote.
    #[must_use]
    pub fn from_line(source: impl Into<String>, line: usize, raw: impl Into<String>, delimiter: char) -> Self {
        let raw = raw.into();
        Self {
            source: source.into(),
            line,
            fields: split_fields(&raw, delimiter),
            raw,
            invalid_encoding: false,
        }
    }

    /// Creates a record from already split fields.
    #[must_use]
    pub fn from_fields(source: impl Into<String>, line: usize, fields: Vec<String>, delimiter: char) -> Self {
        let raw = fields.join(&delimiter.to_string());
        Self {
            source: source.into(),
            line,
            fields,
            raw,
            invalid_encoding: false,
        }
    }

    /// Marks the record as decoded from bytes that were not valid UTF-8.
    #[must_use]
    pub fn with_invalid_encoding(mut self) -> Self {
        self.invalid_encoding = true;
        self
    }

    /// The source object the line came from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The 1-based line number within the source object.
    #[must_use]
    pub fn line(&self) -> usize {
        self.line
    }

    /// All fields, in order.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// The field at `index`.
    #[must_use]
    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    /// The line as read, without the line terminator.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Whether the line was not valid UTF-8.
    #[must_use]
    pub fn has_invalid_encoding(&self) -> bool {
        self.invalid_encoding
    }
}

fn split_fields(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars().peekable();
    let mut in_quotes = false;
    let mut at_field_start = true;

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
            continue;
        }

        if c == delimiter {
            fields.push(std::mem::take(&mut current));
            at_field_start = true;
        } else if c == '"' && at_field_start {
            in_quotes = true;
            at_field_start = false;
        } else {
            current.push(c);
            at_field_start = false;
        }
    }
    fields.push(current);
    fields
}

/// Why a record was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    /// The record does not have exactly one field per schema column.
    #[error("expected {expected} fields, found {found}")]
    WrongFieldCount {
        /// Schema width.
        expected: usize,
        /// Fields present.
        found: usize,
    },

    /// The timestamp field could not be parsed.
    #[error("malformed timestamp")]
    MalformedTimestamp,

    /// The line was not valid UTF-8.
    #[error("invalid UTF-8")]
    InvalidEncoding,

    /// A mandatory field is empty.
    #[error("missing value for column '{column}'")]
    MissingValue {
        /// The empty column.
        column: String,
    },

    /// The user id is present but not an integer.
    #[error("user id is not an integer")]
    InvalidUserId,
}

impl RejectReason {
    /// Stable name used to count rejections by reason.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::WrongFieldCount { .. } => "wrong_field_count",
            Self::MalformedTimestamp => "malformed_timestamp",
            Self::InvalidEncoding => "invalid_encoding",
            Self::MissingValue { .. } => "missing_value",
            Self::InvalidUserId => "invalid_user_id",
        }
    }
}

/// A record the transform refused, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedRecord {
    /// The input record.
    pub record: RawRecord,
    /// Why it was rejected.
    pub reason: RejectReason,
}

impl RejectedRecord {
    /// Creates a rejection.
    #[must_use]
    pub fn new(record: RawRecord, reason: RejectReason) -> Self {
        Self { record, reason }
    }
}
