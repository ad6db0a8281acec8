//! Execution context handed to a task attempt.

use crate::cancellation::CancellationToken;
use crate::core::TaskOutput;
use crate::errors::{TaskError, UndeclaredUpstreamError};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Read-only view of the outputs of a task's upstream tasks.
///
/// Only declared upstream tasks are visible, and only once they have
/// succeeded; reading any other task is an [`UndeclaredUpstreamError`].
#[derive(Debug, Clone, Default)]
pub struct UpstreamOutputs {
    outputs: BTreeMap<String, Arc<TaskOutput>>,
    declared: BTreeSet<String>,
    task: String,
}

impl UpstreamOutputs {
    /// Creates a view over `outputs` for `task`.
    ///
    /// Outputs of tasks outside `declared` are dropped from the view.
    #[must_use]
    pub fn new(
        task: impl Into<String>,
        declared: BTreeSet<String>,
        outputs: BTreeMap<String, Arc<TaskOutput>>,
    ) -> Self {
        let outputs = outputs
            .into_iter()
            .filter(|(name, _)| declared.contains(name))
            .collect();
        Self {
            outputs,
            declared,
            task: task.into(),
        }
    }

    /// Gets the output of an upstream task.
    ///
    /// # Errors
    ///
    /// Returns `UndeclaredUpstreamError` if `upstream` is not declared.
    pub fn get(&self, upstream: &str) -> Result<Option<&TaskOutput>, UndeclaredUpstreamError> {
        if !self.declared.contains(upstream) {
            return Err(UndeclaredUpstreamError::new(&self.task, upstream));
        }
        Ok(self.outputs.get(upstream).map(AsRef::as_ref))
    }

    /// Gets the output of an upstream task, failing if it is absent.
    ///
    /// # Errors
    ///
    /// Returns a permanent `TaskError` if the upstream is undeclared or has
    /// no output.
    pub fn require(&self, upstream: &str) -> Result<&TaskOutput, TaskError> {
        self.get(upstream)?.ok_or_else(|| {
            TaskError::permanent(format!(
                "task '{}' found no output from upstream '{upstream}'",
                self.task
            ))
        })
    }

    /// Returns the declared upstream names.
    #[must_use]
    pub fn declared(&self) -> &BTreeSet<String> {
        &self.declared
    }

    /// Returns the number of visible outputs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    /// Returns true if no upstream output is visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

/// Context passed to every task attempt.
#[derive(Debug, Clone)]
pub struct TaskContext {
    run_id: String,
    task_name: String,
    attempt: u32,
    upstream: UpstreamOutputs,
    cancel: Arc<CancellationToken>,
}

impl TaskContext {
    /// Creates a new task context.
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        task_name: impl Into<String>,
        attempt: u32,
        upstream: UpstreamOutputs,
        cancel: Arc<CancellationToken>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            task_name: task_name.into(),
            attempt,
            upstream,
            cancel,
        }
    }

    /// Creates a context with no upstream outputs, for running a task alone.
    #[must_use]
    pub fn detached(task_name: impl Into<String>) -> Self {
        let task_name = task_name.into();
        Self::new(
            crate::utils::generate_run_id(),
            task_name.clone(),
            1,
            UpstreamOutputs::new(task_name, BTreeSet::new(), BTreeMap::new()),
            Arc::new(CancellationToken::new()),
        )
    }

    /// Returns the run id.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Returns the task name.
    #[must_use]
    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    /// Returns the 1-based attempt number.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the upstream outputs.
    #[must_use]
    pub fn upstream(&self) -> &UpstreamOutputs {
        &self.upstream
    }

    /// Returns true if the run has been cancelled.
    ///
    /// Long-running tasks may check this to stop early; the executor lets
    /// in-flight attempts finish either way.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
