//! Failure notifications.
//!
//! The executor sends one [`FailureNotice`] per task that ends FAILED.
//! Delivery is fire-and-forget: a notifier error is logged and never
//! changes the outcome of the run.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

/// What a notifier receives when a task fails terminally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureNotice {
    /// The run the task belonged to.
    pub run_id: String,
    /// The DAG name.
    pub dag: String,
    /// The failed task.
    pub task: String,
    /// Number of attempts made.
    pub attempts: u32,
    /// Description of the last error.
    pub error: String,
}

impl FailureNotice {
    /// One-line summary suitable for a subject line or log message.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "[{}] task '{}' failed after {} attempt(s): {}",
            self.dag, self.task, self.attempts, self.error
        )
    }
}

/// Error returned by a notifier.
#[derive(Debug, Clone, Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Delivers failure notices.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers one notice.
    async fn notify(&self, notice: &FailureNotice) -> Result<(), NotifyError>;
}

/// Writes notices to the log at error level.
#[derive(Debug, Clone, Default)]
pub struct LoggingNotifier {
    recipients: Vec<String>,
}

impl LoggingNotifier {
    /// Creates a notifier addressed to `recipients`.
    #[must_use]
    pub fn new(recipients: Vec<String>) -> Self {
        Self { recipients }
    }
}

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, notice: &FailureNotice) -> Result<(), NotifyError> {
        error!(
            run_id = %notice.run_id,
            task = %notice.task,
            attempts = notice.attempts,
            recipients = ?self.recipients,
            "{}",
            notice.summary()
        );
        Ok(())
    }
}

/// Keeps every notice in memory.
#[derive(Debug, Default)]
pub struct CollectingNotifier {
    notices: Mutex<Vec<FailureNotice>>,
}

impl CollectingNotifier {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the notices received so far.
    #[must_use]
    pub fn notices(&self) -> Vec<FailureNotice> {
        self.notices.lock().clone()
    }
}

#[async_trait]
impl Notifier for CollectingNotifier {
    async fn notify(&self, notice: &FailureNotice) -> Result<(), NotifyError> {
        self.notices.lock().push(notice.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notice() -> FailureNotice {
        FailureNotice {
            run_id: "run-7".to_string(),
            dag: "logs".to_string(),
            task: "load_features".to_string(),
            attempts: 2,
            error: "transient error: 503".to_string(),
        }
    }

    #[test]
    fn test_summary() {
        assert_eq!(
            notice().summary(),
            "[logs] task 'load_features' failed after 2 attempt(s): transient error: 503"
        );
    }

    #[tokio::test]
    async fn test_logging_notifier_never_fails() {
        let notifier = LoggingNotifier::new(vec!["oncall@example.com".to_string()]);
        tokio_test::assert_ok!(notifier.notify(&notice()).await);
    }

    #[tokio::test]
    async fn test_collecting_notifier() {
        let notifier = CollectingNotifier::new();
        notifier.notify(&notice()).await.unwrap();
        notifier.notify(&notice()).await.unwrap();
        assert_eq!(notifier.notices().len(), 2);
        assert_eq!(notifier.notices()[0].task, "load_features");
    }
}
