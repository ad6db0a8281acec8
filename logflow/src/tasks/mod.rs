//! Task trait and implementations.
//!
//! Tasks are the units of work the executor schedules. A task never sees or
//! changes its own state: it returns a [`TaskOutput`] or a [`TaskError`] and
//! the executor decides what happens next.

mod context;

pub use context::{TaskContext, UpstreamOutputs};

use crate::core::TaskOutput;
use crate::errors::TaskError;
use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;

/// Trait for DAG tasks.
///
/// Executions must be safe to repeat: a retry re-runs `execute` from
/// scratch with the same upstream outputs.
#[async_trait]
pub trait Task: Send + Sync + Debug {
    /// Returns the name of the task.
    fn name(&self) -> &str;

    /// Executes one attempt.
    async fn execute(&self, ctx: &TaskContext) -> Result<TaskOutput, TaskError>;
}

/// A task backed by an async closure.
pub struct FnTask<F> {
    name: String,
    func: F,
}

impl<F, Fut> FnTask<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<TaskOutput, TaskError>> + Send + 'static,
{
    /// Creates a new closure-backed task.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnTask<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTask").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F, Fut> Task for FnTask<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<TaskOutput, TaskError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<TaskOutput, TaskError> {
        (self.func)(ctx.clone()).await
    }
}

/// A task that succeeds immediately with no output.
#[derive(Debug, Clone)]
pub struct NoOpTask {
    name: String,
}

impl NoOpTask {
    /// Creates a new no-op task.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Task for NoOpTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &TaskContext) -> Result<TaskOutput, TaskError> {
        Ok(TaskOutput::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_task() {
        let task = FnTask::new("double", |ctx: TaskContext| async move {
            Ok(TaskOutput::value("attempt", serde_json::json!(ctx.attempt() * 2)))
        });

        assert_eq!(task.name(), "double");
        let output = task.execute(&TaskContext::detached("double")).await.unwrap();
        assert_eq!(output.get("attempt").unwrap(), 2);
    }

    #[tokio::test]
    async fn test_fn_task_error() {
        let task = FnTask::new("flaky", |_ctx: TaskContext| async move {
            Err::<TaskOutput, _>(TaskError::transient("connection reset"))
        });

        let err = task.execute(&TaskContext::detached("flaky")).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_noop_task() {
        let task = NoOpTask::new("noop");
        assert_eq!(task.name(), "noop");
        assert_eq!(task.execute(&TaskContext::detached("noop")).await.unwrap(), TaskOutput::empty());
    }
}
