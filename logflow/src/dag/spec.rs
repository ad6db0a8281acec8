//! Task specifications.

use super::RetryPolicy;
use crate::tasks::Task;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Specification for a single task in a DAG.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    /// The unique name of the task.
    pub name: String,
    /// The task implementation.
    pub runner: Arc<dyn Task>,
    /// Names of tasks that must succeed before this one runs.
    pub upstream: BTreeSet<String>,
    /// Retry policy.
    pub retry: RetryPolicy,
    /// Per-attempt timeout.
    pub timeout: Option<Duration>,
}

impl TaskSpec {
    /// Creates a new task specification with the default retry policy.
    #[must_use]
    pub fn new(name: impl Into<String>, runner: Arc<dyn Task>) -> Self {
        Self {
            name: name.into(),
            runner,
            upstream: BTreeSet::new(),
            retry: RetryPolicy::default(),
            timeout: None,
        }
    }

    /// Sets the upstream tasks.
    #[must_use]
    pub fn with_upstream(mut self, upstream: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.upstream = upstream.into_iter().map(Into::into).collect();
        self
    }

    /// Adds an upstream task.
    #[must_use]
    pub fn depends_on(mut self, upstream: impl Into<String>) -> Self {
        self.upstream.insert(upstream.into());
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::NoOpTask;

    #[test]
    fn test_task_spec_creation() {
        let spec = TaskSpec::new("transform", Arc::new(NoOpTask::new("transform")))
            .with_upstream(["extract", "log_files"])
            .depends_on("extract")
            .with_retry(RetryPolicy::no_retry())
            .with_timeout(Duration::from_secs(30));

        assert_eq!(spec.name, "transform");
        assert_eq!(spec.upstream.len(), 2);
        assert_eq!(spec.retry.max_attempts, 1);
        assert_eq!(spec.timeout, Some(Duration::from_secs(30)));
    }
}
