//! Scripted tasks for testing the executor.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::core::TaskOutput;
use crate::errors::TaskError;
use crate::tasks::{Task, TaskContext};

/// Tracks how many tasks run at the same time.
#[derive(Debug, Default)]
pub struct ConcurrencyProbe {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyProbe {
    /// Creates a new probe.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns the highest number of simultaneous attempts observed.
    #[must_use]
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// What a [`ScriptedTask`] saw during one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    /// The attempt number from the context.
    pub attempt: u32,
    /// Upstream tasks whose outputs were visible.
    pub visible_upstream: BTreeSet<String>,
}

/// A task that fails a fixed number of times, then succeeds.
///
/// Every attempt is recorded so tests can check attempt numbers and the
/// upstream outputs the task could see.
#[derive(Debug)]
pub struct ScriptedTask {
    name: String,
    failures: u32,
    error: TaskError,
    output: TaskOutput,
    delay: Option<Duration>,
    probe: Option<Arc<ConcurrencyProbe>>,
    attempts: Mutex<Vec<AttemptRecord>>,
}

impl ScriptedTask {
    /// A task that always succeeds with an empty output.
    #[must_use]
    pub fn succeeding(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failures: 0,
            error: TaskError::transient("scripted failure"),
            output: TaskOutput::empty(),
            delay: None,
            probe: None,
            attempts: Mutex::new(Vec::new()),
        }
    }

    /// A task that always fails with `error`.
    #[must_use]
    pub fn failing(name: impl Into<String>, error: TaskError) -> Self {
        Self::flaky(name, u32::MAX, error)
    }

    /// A task that fails `failures` times with `error`, then succeeds.
    #[must_use]
    pub fn flaky(name: impl Into<String>, failures: u32, error: TaskError) -> Self {
        Self {
            failures,
            error,
            ..Self::succeeding(name)
        }
    }

    /// Sets the output returned on success.
    #[must_use]
    pub fn with_output(mut self, output: TaskOutput) -> Self {
        self.output = output;
        self
    }

    /// Makes every attempt take `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Reports attempts to a concurrency probe.
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<ConcurrencyProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Returns the number of attempts started.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.attempts.lock().len()
    }

    /// Returns the recorded attempts.
    #[must_use]
    pub fn attempts(&self) -> Vec<AttemptRecord> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl Task for ScriptedTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<TaskOutput, TaskError> {
        let visible_upstream = ctx
            .upstream()
            .declared()
            .iter()
            .filter(|name| matches!(ctx.upstream().get(name), Ok(Some(_))))
            .cloned()
            .collect();
        let call = {
            let mut attempts = self.attempts.lock();
            attempts.push(AttemptRecord {
                attempt: ctx.attempt(),
                visible_upstream,
            });
            attempts.len()
        };

        if let Some(probe) = &self.probe {
            probe.enter();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(probe) = &self.probe {
            probe.exit();
        }

        if u32::try_from(call).unwrap_or(u32::MAX) <= self.failures {
            Err(self.error.clone())
        } else {
            Ok(self.output.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_flaky_task_recovers() {
        let task = ScriptedTask::flaky("flaky", 2, TaskError::transient("503"));
        let ctx = TaskContext::detached("flaky");

        assert!(task.execute(&ctx).await.is_err());
        assert!(task.execute(&ctx).await.is_err());
        assert!(task.execute(&ctx).await.is_ok());
        assert_eq!(task.call_count(), 3);
    }

    #[tokio::test]
    async fn test_failing_task_never_recovers() {
        let task = ScriptedTask::failing("broken", TaskError::permanent("bad schema"));
        let ctx = TaskContext::detached("broken");
        for _ in 0..5 {
            assert_eq!(
                task.execute(&ctx).await.unwrap_err(),
                TaskError::permanent("bad schema")
            );
        }
    }

    #[tokio::test]
    async fn test_probe_tracks_peak() {
        let probe = ConcurrencyProbe::new();
        let a = ScriptedTask::succeeding("a")
            .with_delay(Duration::from_millis(20))
            .with_probe(Arc::clone(&probe));
        let b = ScriptedTask::succeeding("b")
            .with_delay(Duration::from_millis(20))
            .with_probe(Arc::clone(&probe));
        let (ctx_a, ctx_b) = (TaskContext::detached("a"), TaskContext::detached("b"));

        let (ra, rb) = tokio::join!(a.execute(&ctx_a), b.execute(&ctx_b));
        assert!(ra.is_ok() && rb.is_ok());
        assert_eq!(probe.peak(), 2);
    }
}
