//! Column layout of input records.

use crate::errors::TaskError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A column the transform knows how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    /// Event timestamp. Required.
    Timestamp,
    /// Emitting service. Required.
    Service,
    /// Log level. Required.
    Level,
    /// Message text. Required.
    Message,
    /// Integer user id. Optional.
    UserId,
}

impl Column {
    /// Columns every schema must contain.
    pub const REQUIRED: [Self; 4] = [Self::Timestamp, Self::Service, Self::Level, Self::Message];

    /// Resolves a column name, ignoring case and surrounding whitespace.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "timestamp" => Some(Self::Timestamp),
            "service" => Some(Self::Service),
            "level" | "log_level" => Some(Self::Level),
            "message" => Some(Self::Message),
            "user_id" => Some(Self::UserId),
            _ => None,
        }
    }

    /// The canonical column name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Timestamp => "timestamp",
            Self::Service => "service",
            Self::Level => "level",
            Self::Message => "message",
            Self::UserId => "user_id",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors resolving a schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A required column is absent.
    #[error("missing required column '{column}' (found: {found:?})")]
    MissingColumn {
        /// The missing column.
        column: Column,
        /// The columns that were present.
        found: Vec<String>,
    },

    /// A column appears twice.
    #[error("column '{column}' appears more than once")]
    DuplicateColumn {
        /// The repeated column.
        column: Column,
    },
}

impl From<SchemaError> for TaskError {
    fn from(err: SchemaError) -> Self {
        Self::permanent(err.to_string())
    }
}

/// Maps record positions to columns.
///
/// Positions holding an unrecognized header name are kept so the field
/// count still has to match, but their values are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSchema {
    columns: Vec<Option<Column>>,
}

impl Default for RecordSchema {
    /// `timestamp, service, level, message`.
    fn default() -> Self {
        Self {
            columns: Column::REQUIRED.iter().copied().map(Some).collect(),
        }
    }
}

impl RecordSchema {
    /// Builds a schema from column names.
    ///
    /// # Errors
    ///
    /// Returns a `SchemaError` if a required column is missing or a known
    /// column repeats.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, SchemaError> {
        let columns: Vec<Option<Column>> = names.iter().map(|n| Column::from_name(n.as_ref())).collect();

        for (i, column) in columns.iter().enumerate() {
            if let Some(column) = column {
                if columns[..i].contains(&Some(*column)) {
                    return Err(SchemaError::DuplicateColumn { column: *column });
                }
            }
        }

        for required in Column::REQUIRED {
            if !columns.contains(&Some(required)) {
                return Err(SchemaError::MissingColumn {
                    column: required,
                    found: names.iter().map(|n| n.as_ref().trim().to_ascii_lowercase()).collect(),
                });
            }
        }

        Ok(Self { columns })
    }

    /// Number of fields a record must have.
    #[must_use]
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Position of `column`, if present.
    #[must_use]
    pub fn position(&self, column: Column) -> Option<usize> {
        self.columns.iter().position(|c| *c == Some(column))
    }

    /// Whether the schema contains `column`.
    #[must_use]
    pub fn has(&self, column: Column) -> bool {
        self.position(column).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_positional() {
        let schema = RecordSchema::default();
        assert_eq!(schema.width(), 4);
        assert_eq!(schema.position(Column::Timestamp), Some(0));
        assert_eq!(schema.position(Column::Message), Some(3));
        assert!(!schema.has(Column::UserId));
    }

    #[test]
    fn test_from_header_normalizes_names() {
        let schema = RecordSchema::from_names(&[" Timestamp", "LOG_LEVEL ", "service", "message", "user_id"]).unwrap();
        assert_eq!(schema.position(Column::Level), Some(1));
        assert_eq!(schema.position(Column::Service), Some(2));
        assert_eq!(schema.position(Column::UserId), Some(4));
    }

    #[test]
    fn test_unknown_columns_count_toward_width() {
        let schema = RecordSchema::from_names(&["timestamp", "host", "service", "level", "message"]).unwrap();
        assert_eq!(schema.width(), 5);
        assert_eq!(schema.position(Column::Service), Some(2));
    }

    #[test]
    fn test_missing_required_column() {
        let err = RecordSchema::from_names(&["timestamp", "service", "message"]).unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingColumn {
                column: Column::Level,
                found: vec!["timestamp".into(), "service".into(), "message".into()],
            }
        );
        assert!(matches!(TaskError::from(err), TaskError::Permanent { .. }));
    }

    #[test]
    fn test_duplicate_column() {
        let err = RecordSchema::from_names(&["timestamp", "level", "log_level", "service", "message"]).unwrap_err();
        assert_eq!(err, SchemaError::DuplicateColumn { column: Column::Level });
    }
}
