//! DAG executor.
//!
//! Every state transition happens in the executor loop. Attempts and
//! retry back-offs run as spawned futures that report back a [`Step`],
//! so the loop is the single writer of task state.

use super::{Dag, DagRunReport, RetryDecision, TaskRecord};
use crate::alert::{FailureNotice, LoggingNotifier, Notifier};
use crate::cancellation::CancellationToken;
use crate::core::{RunEvent, RunStatus, TaskOutput, TaskState, RUN_COMPLETED};
use crate::errors::TaskError;
use crate::events::{EventSink, NoOpEventSink};
use crate::state::{RunRecord, RunStore};
use crate::tasks::{TaskContext, UpstreamOutputs};
use crate::utils::{generate_run_id, now_utc};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// What a spawned future reports back to the executor loop.
enum Step {
    Attempted {
        task: String,
        result: Result<TaskOutput, TaskError>,
        elapsed: Duration,
    },
    BackoffElapsed {
        task: String,
    },
}

/// Runs a validated [`Dag`].
pub struct DagExecutor {
    dag: Arc<Dag>,
    event_sink: Arc<dyn EventSink>,
    notifier: Arc<dyn Notifier>,
    run_store: Option<Arc<dyn RunStore>>,
    max_concurrency: usize,
}

impl std::fmt::Debug for DagExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DagExecutor")
            .field("dag", &self.dag.name())
            .field("max_concurrency", &self.max_concurrency)
            .field("has_run_store", &self.run_store.is_some())
            .finish_non_exhaustive()
    }
}

impl DagExecutor {
    /// Creates an executor with no event sink, a logging notifier, and
    /// unbounded concurrency.
    #[must_use]
    pub fn new(dag: Dag) -> Self {
        Self {
            dag: Arc::new(dag),
            event_sink: Arc::new(NoOpEventSink),
            notifier: Arc::new(LoggingNotifier::default()),
            run_store: None,
            max_concurrency: 0,
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Sets the failure notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Persists the run record to `store` when the run finishes.
    #[must_use]
    pub fn with_run_store(mut self, store: Arc<dyn RunStore>) -> Self {
        self.run_store = Some(store);
        self
    }

    /// Caps the number of attempts running at once. Zero means unbounded.
    #[must_use]
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit;
        self
    }

    /// Returns the DAG.
    #[must_use]
    pub fn dag(&self) -> &Dag {
        &self.dag
    }

    /// Runs the DAG to completion.
    pub async fn run(&self) -> DagRunReport {
        self.run_with_cancel(Arc::new(CancellationToken::new())).await
    }

    /// Runs the DAG until it completes or `cancel` fires.
    ///
    /// After cancellation no new attempt starts. Attempts already running
    /// are allowed to finish; tasks waiting to retry become FAILED; tasks
    /// that never started keep their state. The run is then FAILED.
    pub async fn run_with_cancel(&self, cancel: Arc<CancellationToken>) -> DagRunReport {
        let mut run = RunState::new(Arc::clone(&self.dag), Arc::clone(&self.event_sink));
        let started_at = now_utc();

        info!(
            run_id = %run.run_id,
            dag = %self.dag.name(),
            tasks = self.dag.task_count(),
            "Starting DAG run"
        );
        self.event_sink
            .emit(&RunEvent::run_started(&run.run_id, self.dag.name(), self.dag.task_count()))
            .await;

        let mut in_flight: FuturesUnordered<BoxFuture<'static, Step>> = FuturesUnordered::new();
        let mut running = 0usize;
        let mut notifications: Vec<JoinHandle<()>> = Vec::new();

        for name in self.dag.execution_order() {
            if run.remaining_upstream[name] == 0 {
                run.transition(name, TaskState::Ready).await;
                run.ready.push_back(name.clone());
            }
        }

        loop {
            if !cancel.is_cancelled() {
                while self.max_concurrency == 0 || running < self.max_concurrency {
                    let Some((task, from)) = run.next_launch() else {
                        break;
                    };
                    debug_assert!(matches!(from, TaskState::Ready | TaskState::Retrying));
                    *run.attempts.entry(task.clone()).or_default() += 1;
                    run.transition(&task, TaskState::Running).await;
                    in_flight.push(self.spawn_attempt(&run, &task, &cancel));
                    running += 1;
                }
            }

            let Some(step) = in_flight.next().await else {
                break;
            };

            match step {
                Step::Attempted {
                    task,
                    result,
                    elapsed,
                } => {
                    running = running.saturating_sub(1);
                    *run.durations.entry(task.clone()).or_default() += elapsed;
                    match result {
                        Ok(output) => {
                            info!(
                                run_id = %run.run_id,
                                task = %task,
                                duration_ms = elapsed.as_secs_f64() * 1000.0,
                                "Task succeeded"
                            );
                            run.succeed(&task, output).await;
                        }
                        Err(err) => {
                            let attempts = run.attempts_of(&task);
                            let decision = self.dag.task(&task).map_or(RetryDecision::GiveUp, |spec| {
                                spec.retry.decide(attempts, &err)
                            });
                            run.last_errors.insert(task.clone(), err.clone());
                            match decision {
                                RetryDecision::Retry(delay) if !cancel.is_cancelled() => {
                                    warn!(
                                        run_id = %run.run_id,
                                        task = %task,
                                        attempt = attempts,
                                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                                        error = %err,
                                        "Task attempt failed, retrying"
                                    );
                                    run.transition(&task, TaskState::Retrying).await;
                                    in_flight.push(backoff(task, delay, Arc::clone(&cancel)));
                                }
                                _ => notifications.push(self.fail(&mut run, &task).await),
                            }
                        }
                    }
                }
                Step::BackoffElapsed { task } => {
                    run.retries.push_back(task);
                }
            }
        }

        // Only cancellation leaves tasks waiting to retry.
        while let Some(task) = run.retries.pop_front() {
            notifications.push(self.fail(&mut run, &task).await);
        }

        let (status, reason) = run.outcome(&cancel);
        let finished_at = now_utc();

        self.event_sink
            .emit(
                &RunEvent::new(RUN_COMPLETED)
                    .add_data("run_id", serde_json::json!(run.run_id))
                    .add_data("dag", serde_json::json!(self.dag.name()))
                    .add_data("status", serde_json::json!(status))
                    .add_data("reason", serde_json::json!(reason)),
            )
            .await;

        for handle in notifications {
            if let Err(err) = handle.await {
                warn!(run_id = %run.run_id, error = %err, "Notification task did not complete");
            }
        }

        match status {
            RunStatus::Success => info!(
                run_id = %run.run_id,
                dag = %self.dag.name(),
                duration_ms = (finished_at - started_at).num_milliseconds(),
                "DAG run succeeded"
            ),
            RunStatus::Failed => error!(
                run_id = %run.run_id,
                dag = %self.dag.name(),
                reason = reason.as_deref().unwrap_or_default(),
                "DAG run failed"
            ),
        }

        let report = run.into_report(started_at, finished_at, status, reason);

        if let Some(store) = &self.run_store {
            if let Err(err) = store.save(&RunRecord::from_report(&report)).await {
                error!(run_id = %report.run_id, error = %err, "Failed to persist run record");
            }
        }

        report
    }

    fn spawn_attempt(
        &self,
        run: &RunState,
        task: &str,
        cancel: &Arc<CancellationToken>,
    ) -> BoxFuture<'static, Step> {
        let name = task.to_string();
        let Some(spec) = self.dag.task(task) else {
            return Box::pin(async move {
                Step::Attempted {
                    result: Err(TaskError::permanent(format!("unknown task '{name}'"))),
                    task: name,
                    elapsed: Duration::ZERO,
                }
            });
        };

        let upstream = UpstreamOutputs::new(task, spec.upstream.clone(), run.upstream_outputs(spec.upstream.iter()));
        let ctx = TaskContext::new(
            run.run_id.clone(),
            task,
            run.attempts_of(task),
            upstream,
            Arc::clone(cancel),
        );
        let runner = Arc::clone(&spec.runner);
        let timeout = spec.timeout;

        debug!(run_id = %run.run_id, task = %task, attempt = ctx.attempt(), "Starting attempt");

        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let result = match timeout {
                Some(limit) => tokio::time::timeout(limit, runner.execute(&ctx))
                    .await
                    .unwrap_or_else(|_| {
                        Err(TaskError::Timeout {
                            after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                        })
                    }),
                None => runner.execute(&ctx).await,
            };
            (result, started.elapsed())
        });

        Box::pin(async move {
            let (result, elapsed) = match handle.await {
                Ok(finished) => finished,
                Err(err) => (Err(TaskError::permanent(format!("task aborted: {err}"))), Duration::ZERO),
            };
            Step::Attempted {
                task: name,
                result,
                elapsed,
            }
        })
    }

    /// Marks `task` FAILED and its pending descendants UPSTREAM_FAILED,
    /// then spawns the failure notification.
    async fn fail(&self, run: &mut RunState, task: &str) -> JoinHandle<()> {
        run.transition(task, TaskState::Failed).await;

        let descendants = self.dag.descendants(task);
        for descendant in &descendants {
            if run.state_of(descendant) == TaskState::Pending {
                run.transition(descendant, TaskState::UpstreamFailed).await;
            }
        }

        let error = run
            .last_errors
            .get(task)
            .map_or_else(|| "unknown error".to_string(), ToString::to_string);
        error!(
            run_id = %run.run_id,
            task = %task,
            attempts = run.attempts_of(task),
            error = %error,
            skipped = descendants.len(),
            "Task failed"
        );

        let notice = FailureNotice {
            run_id: run.run_id.clone(),
            dag: self.dag.name().to_string(),
            task: task.to_string(),
            attempts: run.attempts_of(task),
            error,
        };
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(err) = notifier.notify(&notice).await {
                warn!(run_id = %notice.run_id, task = %notice.task, error = %err, "Failure notification not delivered");
            }
        })
    }
}

/// Sleeps for `delay` unless the run is cancelled first.
fn backoff(task: String, delay: Duration, cancel: Arc<CancellationToken>) -> BoxFuture<'static, Step> {
    Box::pin(async move {
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = cancel.cancelled() => {}
        }
        Step::BackoffElapsed { task }
    })
}

/// Mutable bookkeeping of one run, owned by the executor loop.
struct RunState {
    run_id: String,
    dag: Arc<Dag>,
    sink: Arc<dyn EventSink>,
    states: HashMap<String, TaskState>,
    attempts: HashMap<String, u32>,
    durations: HashMap<String, Duration>,
    last_errors: HashMap<String, TaskError>,
    outputs: BTreeMap<String, Arc<TaskOutput>>,
    remaining_upstream: HashMap<String, usize>,
    ready: VecDeque<String>,
    retries: VecDeque<String>,
}

impl RunState {
    fn new(dag: Arc<Dag>, sink: Arc<dyn EventSink>) -> Self {
        let mut states = HashMap::new();
        let mut remaining_upstream = HashMap::new();
        for name in dag.execution_order() {
            states.insert(name.clone(), TaskState::Pending);
            let upstream = dag.task(name).map_or(0, |spec| spec.upstream.len());
            remaining_upstream.insert(name.clone(), upstream);
        }

        Self {
            run_id: generate_run_id(),
            dag,
            sink,
            states,
            attempts: HashMap::new(),
            durations: HashMap::new(),
            last_errors: HashMap::new(),
            outputs: BTreeMap::new(),
            remaining_upstream,
            ready: VecDeque::new(),
            retries: VecDeque::new(),
        }
    }

    fn state_of(&self, task: &str) -> TaskState {
        self.states.get(task).copied().unwrap_or_default()
    }

    fn attempts_of(&self, task: &str) -> u32 {
        self.attempts.get(task).copied().unwrap_or(0)
    }

    /// Pending retries go before newly ready tasks.
    fn next_launch(&mut self) -> Option<(String, TaskState)> {
        let task = self.retries.pop_front().or_else(|| self.ready.pop_front())?;
        let state = self.state_of(&task);
        Some((task, state))
    }

    async fn transition(&mut self, task: &str, to: TaskState) {
        let from = self.state_of(task);
        if !from.can_transition_to(to) {
            error!(run_id = %self.run_id, task = %task, %from, %to, "Illegal task state transition ignored");
            return;
        }
        self.states.insert(task.to_string(), to);
        debug!(run_id = %self.run_id, task = %task, %from, %to, "Task state changed");
        self.sink
            .emit(&RunEvent::state_changed(&self.run_id, task, from, to, self.attempts_of(task)))
            .await;
    }

    async fn succeed(&mut self, task: &str, output: TaskOutput) {
        self.transition(task, TaskState::Succeeded).await;
        self.outputs.insert(task.to_string(), Arc::new(output));

        let children: Vec<String> = self
            .dag
            .downstream_of(task)
            .map(|children| children.iter().cloned().collect())
            .unwrap_or_default();
        for child in children {
            let Some(remaining) = self.remaining_upstream.get_mut(&child) else {
                continue;
            };
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 && self.state_of(&child) == TaskState::Pending {
                self.transition(&child, TaskState::Ready).await;
                self.ready.push_back(child);
            }
        }
    }

    fn upstream_outputs<'a>(
        &self,
        names: impl Iterator<Item = &'a String>,
    ) -> BTreeMap<String, Arc<TaskOutput>> {
        names
            .filter_map(|name| {
                self.outputs
                    .get(name)
                    .map(|output| (name.clone(), Arc::clone(output)))
            })
            .collect()
    }

    fn outcome(&self, cancel: &CancellationToken) -> (RunStatus, Option<String>) {
        if cancel.is_cancelled() {
            let reason = cancel.reason().unwrap_or_else(|| "cancelled".to_string());
            return (RunStatus::Failed, Some(format!("cancelled: {reason}")));
        }

        let all_succeeded = self
            .states
            .values()
            .all(|state| *state == TaskState::Succeeded);
        if all_succeeded {
            return (RunStatus::Success, None);
        }

        let failed = self
            .dag
            .execution_order()
            .iter()
            .find(|name| self.state_of(name) == TaskState::Failed);
        let reason = match failed {
            Some(task) => {
                let error = self
                    .last_errors
                    .get(task)
                    .map_or_else(|| "unknown error".to_string(), ToString::to_string);
                format!(
                    "task '{task}' failed after {} attempt(s): {error}",
                    self.attempts_of(task)
                )
            }
            None => "run ended with unfinished tasks".to_string(),
        };
        (RunStatus::Failed, Some(reason))
    }

    fn into_report(
        self,
        started_at: crate::utils::Timestamp,
        finished_at: crate::utils::Timestamp,
        status: RunStatus,
        reason: Option<String>,
    ) -> DagRunReport {
        let tasks = self
            .dag
            .execution_order()
            .iter()
            .map(|name| {
                let record = TaskRecord {
                    state: self.state_of(name),
                    attempts: self.attempts_of(name),
                    last_error: self.last_errors.get(name).cloned(),
                    duration_ms: self
                        .durations
                        .get(name)
                        .map_or(0.0, |d| d.as_secs_f64() * 1000.0),
                    metrics: self
                        .outputs
                        .get(name)
                        .map(|output| output.metrics.clone())
                        .unwrap_or_default(),
                };
                (name.clone(), record)
            })
            .collect();

        DagRunReport {
            run_id: self.run_id,
            dag: self.dag.name().to_string(),
            started_at,
            finished_at,
            status,
            reason,
            tasks,
            outputs: self.outputs,
        }
    }
}
