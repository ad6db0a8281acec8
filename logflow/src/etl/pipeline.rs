//! Assembly of the log ETL DAG.
//!
//! ```text
//! list_log_files -> log_log_files -> transform_logs -> load_features
//! ```
//!
//! `transform_logs` also reads the object list of `list_log_files`, so it
//! declares both tasks as upstream.

use super::sink::TableSink;
use super::storage::ObjectStore;
use super::tasks::{
    ListObjectsTask, LoadFeaturesTask, LogObjectsTask, TransformLogsTask, LIST_LOG_FILES, LOAD_FEATURES,
    LOG_LOG_FILES, TRANSFORM_LOGS,
};
use crate::alert::LoggingNotifier;
use crate::config::EtlConfig;
use crate::dag::{Dag, DagBuilder, DagExecutor, TaskSpec};
use crate::errors::LogflowError;
use crate::tasks::Task;
use std::sync::Arc;
use tracing::debug;

/// The external systems the pipeline talks to.
#[derive(Clone)]
pub struct EtlCollaborators {
    /// Where raw logs are read from.
    pub store: Arc<dyn ObjectStore>,
    /// Where feature rows are written.
    pub sink: Arc<dyn TableSink>,
}

impl EtlCollaborators {
    /// Bundles a store and a sink.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, sink: Arc<dyn TableSink>) -> Self {
        Self { store, sink }
    }
}

impl std::fmt::Debug for EtlCollaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtlCollaborators").finish_non_exhaustive()
    }
}

/// Builds the validated four-task DAG from configuration.
///
/// # Errors
///
/// Returns `LogflowError::Config` if the configuration is invalid and
/// `LogflowError::Validation` if the graph is rejected.
pub fn build_log_etl_dag(config: &EtlConfig, collaborators: &EtlCollaborators) -> Result<Dag, LogflowError> {
    config.validate()?;
    let transform = config.transform_config()?;

    let dag = DagBuilder::new(&config.dag_name)
        .task(task_spec(config, Arc::new(ListObjectsTask::new(
            Arc::clone(&collaborators.store),
            &config.source.bucket,
            &config.source.prefix,
        ))))
        .task(task_spec(config, Arc::new(LogObjectsTask::new())).depends_on(LIST_LOG_FILES))
        .task(
            task_spec(config, Arc::new(TransformLogsTask::new(
                Arc::clone(&collaborators.store),
                &config.source.bucket,
                transform,
            )))
            .with_upstream([LIST_LOG_FILES, LOG_LOG_FILES]),
        )
        .task(
            task_spec(config, Arc::new(LoadFeaturesTask::new(
                Arc::clone(&collaborators.sink),
                config.table_ref(),
            )))
            .depends_on(TRANSFORM_LOGS),
        )
        .build()?;

    debug!(dag = %dag.name(), order = ?dag.execution_order(), "Built log ETL DAG");
    Ok(dag)
}

fn task_spec(config: &EtlConfig, runner: Arc<dyn Task>) -> TaskSpec {
    let spec = TaskSpec::new(runner.name(), Arc::clone(&runner)).with_retry(config.retry.clone());
    match config.task_timeout() {
        Some(timeout) => spec.with_timeout(timeout),
        None => spec,
    }
}

/// Builds the DAG and an executor configured for it.
///
/// Failures are reported through a [`LoggingNotifier`] addressed to the
/// configured recipients; callers may replace it.
///
/// # Errors
///
/// Same as [`build_log_etl_dag`].
pub fn build_log_etl_executor(
    config: &EtlConfig,
    collaborators: &EtlCollaborators,
) -> Result<DagExecutor, LogflowError> {
    let dag = build_log_etl_dag(config, collaborators)?;
    Ok(DagExecutor::new(dag)
        .with_notifier(Arc::new(LoggingNotifier::new(config.alert.recipients.clone())))
        .with_max_concurrency(config.max_concurrency))
}

/// Names of the pipeline tasks in execution order.
pub const TASK_ORDER: [&str; 4] = [LIST_LOG_FILES, LOG_LOG_FILES, TRANSFORM_LOGS, LOAD_FEATURES];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::CollectingNotifier;
    use crate::core::{RunStatus, TaskState};
    use crate::dag::RetryPolicy;
    use crate::errors::TaskError;
    use crate::etl::{InMemoryObjectStore, InMemoryTableSink, JsonlTableSink};
    use crate::state::{InMemoryRunStore, RunRecord};
    use crate::testing::{assert_run_failed, assert_run_succeeded, assert_task_attempts, SAMPLE_LOG_CSV, SAMPLE_LOG_TSV};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn fast_config() -> EtlConfig {
        let mut config = EtlConfig::default();
        config.source.bucket = "raw".to_string();
        config.retry = RetryPolicy::fixed(2, Duration::from_millis(5));
        config
    }

    fn memory(store: InMemoryObjectStore) -> (EtlCollaborators, Arc<InMemoryObjectStore>, Arc<InMemoryTableSink>) {
        let store = Arc::new(store);
        let sink = Arc::new(InMemoryTableSink::new());
        let collaborators = EtlCollaborators::new(store.clone(), sink.clone());
        (collaborators, store, sink)
    }

    #[test]
    fn test_dag_shape() {
        let (collaborators, _, _) = memory(InMemoryObjectStore::new());
        let dag = build_log_etl_dag(&EtlConfig::default(), &collaborators).unwrap();

        assert_eq!(dag.name(), "log_etl");
        assert_eq!(dag.execution_order(), TASK_ORDER);
        assert_eq!(dag.task(TRANSFORM_LOGS).unwrap().upstream.len(), 2);
        assert_eq!(dag.task(LOAD_FEATURES).unwrap().retry.max_attempts, 2);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let (collaborators, _, _) = memory(InMemoryObjectStore::new());
        let mut config = EtlConfig::default();
        config.transform.timezone = "Nowhere/Land".to_string();

        let err = build_log_etl_dag(&config, &collaborators).unwrap_err();
        assert!(matches!(err, LogflowError::Config(_)));
    }

    #[tokio::test]
    async fn test_end_to_end_success() {
        let (collaborators, _, sink) = memory(
            InMemoryObjectStore::new()
                .with_object("raw", "2024/01/01.csv", SAMPLE_LOG_CSV)
                .with_object("raw", "2024/01/02.csv", "2024-01-02T08:00:00Z,svcB,WARN,slow\n"),
        );
        let store = Arc::new(InMemoryRunStore::new());
        let executor = build_log_etl_executor(&fast_config(), &collaborators)
            .unwrap()
            .with_run_store(store.clone());

        let report = executor.run().await;

        assert_run_succeeded(&report);
        let rows = sink.rows("log_analytics.ai_log_features");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].hour_of_day, 10);
        assert_eq!(rows[1].hour_of_day, 11);

        let record = store.records().pop().unwrap();
        assert_eq!(record.status, RunStatus::Success);
        assert_eq!(record.records_accepted, 3);
        assert_eq!(record.records_rejected, 1);
        assert_eq!(record.rows_written, 3);
    }

    #[tokio::test]
    async fn test_header_tsv_with_user_ids() {
        let (collaborators, _, sink) = memory(InMemoryObjectStore::new().with_object("raw", "sample_logs.csv", SAMPLE_LOG_TSV));
        let mut config = fast_config();
        config.transform.delimiter = "tab".to_string();
        config.transform.has_header = true;

        let report = build_log_etl_executor(&config, &collaborators).unwrap().run().await;

        assert_run_succeeded(&report);
        let rows = sink.rows("log_analytics.ai_log_features");
        assert!(!rows.is_empty());
        assert!(rows.iter().all(|row| row.user_id.is_some()));
    }

    #[tokio::test]
    async fn test_transient_listing_failure_is_retried() {
        let (collaborators, store, sink) =
            memory(InMemoryObjectStore::new().with_object("raw", "a.csv", SAMPLE_LOG_CSV));
        store.fail_next_lists(1);

        let report = build_log_etl_executor(&fast_config(), &collaborators).unwrap().run().await;

        assert_run_succeeded(&report);
        assert_task_attempts(&report, LIST_LOG_FILES, 2);
        assert_eq!(sink.rows("log_analytics.ai_log_features").len(), 2);
    }

    #[tokio::test]
    async fn test_missing_bucket_fails_without_retry() {
        let (collaborators, _, sink) = memory(InMemoryObjectStore::new());
        let notifier = Arc::new(CollectingNotifier::new());
        let executor = build_log_etl_executor(&fast_config(), &collaborators)
            .unwrap()
            .with_notifier(notifier.clone());

        let report = executor.run().await;

        assert_run_failed(&report);
        assert_task_attempts(&report, LIST_LOG_FILES, 1);
        assert!(matches!(
            report.task(LIST_LOG_FILES).unwrap().last_error,
            Some(TaskError::NotFound { .. })
        ));
        for task in [LOG_LOG_FILES, TRANSFORM_LOGS, LOAD_FEATURES] {
            assert_eq!(report.state_of(task), Some(TaskState::UpstreamFailed));
        }
        assert_eq!(notifier.notices().len(), 1);
        assert_eq!(notifier.notices()[0].task, LIST_LOG_FILES);
        assert!(sink.rows("log_analytics.ai_log_features").is_empty());
    }

    #[tokio::test]
    async fn test_load_failure_exhausts_retries() {
        let (collaborators, _, sink) = memory(InMemoryObjectStore::new().with_object("raw", "a.csv", SAMPLE_LOG_CSV));
        sink.fail_next_appends(5);

        let report = build_log_etl_executor(&fast_config(), &collaborators).unwrap().run().await;

        assert_run_failed(&report);
        assert_task_attempts(&report, LOAD_FEATURES, 2);
        assert_eq!(report.state_of(TRANSFORM_LOGS), Some(TaskState::Succeeded));
        assert!(report
            .reason
            .as_deref()
            .unwrap()
            .starts_with("task 'load_features' failed after 2 attempt(s)"));

        let record = RunRecord::from_report(&report);
        assert_eq!(record.records_accepted, 2);
        assert_eq!(record.rows_written, 0);
    }

    #[tokio::test]
    async fn test_rerun_into_jsonl_sink_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("features.jsonl");
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new().with_object("raw", "a.csv", SAMPLE_LOG_CSV));

        for expected_written in [2, 0] {
            let sink = Arc::new(JsonlTableSink::open(&path).await.unwrap());
            let collaborators = EtlCollaborators::new(store.clone(), sink);
            let report = build_log_etl_executor(&fast_config(), &collaborators).unwrap().run().await;

            assert_run_succeeded(&report);
            assert_eq!(RunRecord::from_report(&report).rows_written, expected_written);
        }

        let lines = std::fs::read_to_string(&path).unwrap().lines().count();
        assert_eq!(lines, 2);
    }
}
