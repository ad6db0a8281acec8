//! Task state and run status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The state of a task within one DAG run.
///
/// Only the executor moves a task between states; tasks report results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Waiting for upstream tasks.
    #[default]
    Pending,
    /// All upstream tasks succeeded; waiting for an execution slot.
    Ready,
    /// An attempt is in flight.
    Running,
    /// Completed successfully.
    Succeeded,
    /// Failed and exhausted its retries (or hit a non-retryable error).
    Failed,
    /// Waiting out the backoff delay before the next attempt.
    Retrying,
    /// Never executed because an upstream task failed.
    UpstreamFailed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Ready => write!(f, "READY"),
            Self::Running => write!(f, "RUNNING"),
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Retrying => write!(f, "RETRYING"),
            Self::UpstreamFailed => write!(f, "UPSTREAM_FAILED"),
        }
    }
}

impl TaskState {
    /// Returns true if no further transition can happen in this run.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::UpstreamFailed)
    }

    /// Returns true if the state counts as a failure for the run.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::UpstreamFailed)
    }

    /// Returns true if the executor may move a task from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        use TaskState::{Failed, Pending, Ready, Retrying, Running, Succeeded, UpstreamFailed};
        matches!(
            (self, next),
            (Pending, Ready | UpstreamFailed)
                | (Ready, Running | UpstreamFailed)
                | (Running, Succeeded | Failed | Retrying)
                | (Retrying, Running | Failed)
        )
    }
}

/// The terminal status of a DAG run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Every task succeeded.
    Success,
    /// At least one task failed, or the run was cancelled.
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_state_display() {
        assert_eq!(TaskState::Pending.to_string(), "PENDING");
        assert_eq!(TaskState::UpstreamFailed.to_string(), "UPSTREAM_FAILED");
        assert_eq!(RunStatus::Success.to_string(), "SUCCESS");
    }

    #[test]
    fn test_task_state_is_terminal() {
        assert!(TaskState::Succeeded.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(TaskState::UpstreamFailed.is_terminal());
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::Retrying.is_terminal());
    }

    #[test]
    fn test_legal_transitions() {
        assert!(TaskState::Pending.can_transition_to(TaskState::Ready));
        assert!(TaskState::Ready.can_transition_to(TaskState::Running));
        assert!(TaskState::Running.can_transition_to(TaskState::Retrying));
        assert!(TaskState::Retrying.can_transition_to(TaskState::Running));
        assert!(TaskState::Retrying.can_transition_to(TaskState::Failed));
        assert!(TaskState::Pending.can_transition_to(TaskState::UpstreamFailed));
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!TaskState::Pending.can_transition_to(TaskState::Running));
        assert!(!TaskState::Succeeded.can_transition_to(TaskState::Running));
        assert!(!TaskState::Failed.can_transition_to(TaskState::Retrying));
        assert!(!TaskState::Running.can_transition_to(TaskState::UpstreamFailed));
    }

    #[test]
    fn test_task_state_serialize() {
        let json = serde_json::to_string(&TaskState::UpstreamFailed).unwrap();
        assert_eq!(json, r#""UPSTREAM_FAILED""#);

        let state: TaskState = serde_json::from_str(r#""RETRYING""#).unwrap();
        assert_eq!(state, TaskState::Retrying);
    }
}
