//! Error types for logflow.
//!
//! The taxonomy follows the four classes the executor distinguishes:
//! configuration errors (fatal before a run starts), task errors (retryable
//! or not), malformed records (never escape the transform, see
//! [`crate::transform::RejectReason`]) and terminal run failures (reported
//! through [`crate::dag::DagRunReport`]).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for logflow operations.
#[derive(Debug, Error)]
pub enum LogflowError {
    /// The DAG failed validation.
    #[error("{0}")]
    Validation(#[from] DagValidationError),

    /// A cycle was detected in the DAG.
    #[error("{0}")]
    CycleDetected(#[from] CycleDetectedError),

    /// Configuration could not be loaded or is invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A task read an upstream it did not declare.
    #[error("{0}")]
    UndeclaredUpstream(#[from] UndeclaredUpstreamError),

    /// The run was cancelled.
    #[error("Run cancelled: {0}")]
    Cancelled(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable error codes attached to validation errors.
pub mod codes {
    /// The graph contains a dependency cycle.
    pub const CYCLE: &str = "DAG-001-CYCLE";
    /// A task depends on a task that was never declared.
    pub const MISSING_DEP: &str = "DAG-002-MISSING_DEP";
    /// The graph has no tasks.
    pub const EMPTY: &str = "DAG-003-EMPTY";
    /// Two tasks share a name.
    pub const DUPLICATE: &str = "DAG-004-DUPLICATE";
    /// A task depends on itself.
    pub const SELF_DEP: &str = "DAG-005-SELF_DEP";
    /// The record schema cannot be resolved.
    pub const SCHEMA: &str = "DAG-006-SCHEMA";
}

/// Metadata about a configuration error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Error code (e.g., "DAG-001-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl ErrorInfo {
    /// Creates a new error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: BTreeMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when a DAG fails validation at construction.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DagValidationError {
    /// The error message.
    pub message: String,
    /// The tasks involved in the error.
    pub tasks: Vec<String>,
    /// Optional error info.
    pub error_info: Option<ErrorInfo>,
}

impl DagValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            tasks: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the tasks involved.
    #[must_use]
    pub fn with_tasks(mut self, tasks: Vec<String>) -> Self {
        self.tasks = tasks;
        self
    }

    /// Sets the error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Error raised when a cycle is detected in the task graph.
#[derive(Debug, Clone, Error)]
#[error("Cycle detected in DAG: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The path of tasks forming the cycle.
    pub cycle_path: Vec<String>,
    /// Error info.
    pub error_info: ErrorInfo,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = ErrorInfo::new(
            codes::CYCLE,
            format!("DAG contains a dependency cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("Remove one of the dependencies in the cycle to break it.");

        Self {
            cycle_path,
            error_info: info,
        }
    }
}

impl From<CycleDetectedError> for DagValidationError {
    fn from(err: CycleDetectedError) -> Self {
        Self {
            message: err.to_string(),
            tasks: err.cycle_path.clone(),
            error_info: Some(err.error_info),
        }
    }
}

/// Error raised when a task reads the output of a task it does not depend on.
#[derive(Debug, Clone, Error)]
#[error("Undeclared upstream: task '{task}' attempted to read '{upstream}' which is not one of its upstream tasks")]
pub struct UndeclaredUpstreamError {
    /// The task attempting access.
    pub task: String,
    /// The undeclared upstream name.
    pub upstream: String,
}

impl UndeclaredUpstreamError {
    /// Creates a new undeclared upstream error.
    #[must_use]
    pub fn new(task: impl Into<String>, upstream: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            upstream: upstream.into(),
        }
    }
}

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        /// The file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration could not be parsed.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A configuration value is invalid.
    #[error("Invalid config value for '{field}': {message}")]
    Invalid {
        /// The offending field (dotted path).
        field: String,
        /// What is wrong with it.
        message: String,
    },
}

impl ConfigError {
    /// Creates an invalid-value error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors returned by a task attempt.
///
/// The executor decides from the variant whether the attempt may be retried.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskError {
    /// A transient failure (network, throttling). Retryable.
    #[error("transient error: {message}")]
    Transient {
        /// Error description.
        message: String,
    },

    /// The requested resource does not exist. Never retried.
    #[error("not found: {message}")]
    NotFound {
        /// Error description.
        message: String,
    },

    /// A failure retrying cannot fix (bad schema, missing hand-off data).
    #[error("permanent error: {message}")]
    Permanent {
        /// Error description.
        message: String,
    },

    /// The attempt exceeded its timeout. Retryable.
    #[error("attempt timed out after {after_ms}ms")]
    Timeout {
        /// The timeout that elapsed.
        after_ms: u64,
    },
}

impl TaskError {
    /// Creates a transient error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a permanent error.
    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
        }
    }

    /// Returns true if the executor may retry after this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout { .. })
    }

    /// Returns a short name for the error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transient { .. } => "transient",
            Self::NotFound { .. } => "not_found",
            Self::Permanent { .. } => "permanent",
            Self::Timeout { .. } => "timeout",
        }
    }
}

impl From<UndeclaredUpstreamError> for TaskError {
    fn from(err: UndeclaredUpstreamError) -> Self {
        Self::permanent(err.to_string())
    }
}

impl From<serde_json::Error> for TaskError {
    fn from(err: serde_json::Error) -> Self {
        Self::permanent(format!("hand-off decoding failed: {err}"))
    }
}
