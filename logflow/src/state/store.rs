//! Run record stores.

use super::RunRecord;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Errors from a run store.
#[derive(Debug, Error)]
pub enum RunStoreError {
    /// Reading or writing the backing file failed.
    #[error("run store I/O error at {path}: {source}")]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A stored record could not be encoded or decoded.
    #[error("run store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Keeps the record of every run.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Stores a record, replacing any earlier record with the same run id.
    async fn save(&self, record: &RunRecord) -> Result<(), RunStoreError>;

    /// Loads the record of a run.
    async fn load(&self, run_id: &str) -> Result<Option<RunRecord>, RunStoreError>;

    /// Returns the most recently saved record.
    async fn latest(&self) -> Result<Option<RunRecord>, RunStoreError>;
}

/// A run store kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryRunStore {
    records: RwLock<Vec<RunRecord>>,
}

impl InMemoryRunStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every stored record in save order.
    #[must_use]
    pub fn records(&self) -> Vec<RunRecord> {
        self.records.read().clone()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn save(&self, record: &RunRecord) -> Result<(), RunStoreError> {
        let mut records = self.records.write();
        records.retain(|existing| existing.run_id != record.run_id);
        records.push(record.clone());
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<Option<RunRecord>, RunStoreError> {
        Ok(self
            .records
            .read()
            .iter()
            .find(|record| record.run_id == run_id)
            .cloned())
    }

    async fn latest(&self) -> Result<Option<RunRecord>, RunStoreError> {
        Ok(self.records.read().last().cloned())
    }
}

/// A run store appending one JSON record per line to a file.
///
/// A later line for the same run id wins over an earlier one.
#[derive(Debug, Clone)]
pub struct JsonlRunStore {
    path: PathBuf,
}

impl JsonlRunStore {
    /// Creates a store backed by `path`. The file is created on first save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> RunStoreError {
        RunStoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    async fn read_all(&self) -> Result<Vec<RunRecord>, RunStoreError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(self.io_error(err)),
        };

        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(RunStoreError::from))
            .collect()
    }
}

#[async_trait]
impl RunStore for JsonlRunStore {
    async fn save(&self, record: &RunRecord) -> Result<(), RunStoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| self.io_error(err))?;
        }

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|err| self.io_error(err))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|err| self.io_error(err))?;
        file.flush().await.map_err(|err| self.io_error(err))
    }

    async fn load(&self, run_id: &str) -> Result<Option<RunRecord>, RunStoreError> {
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .rev()
            .find(|record| record.run_id == run_id))
    }

    async fn latest(&self) -> Result<Option<RunRecord>, RunStoreError> {
        Ok(self.read_all().await?.pop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RunStatus;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn record(run_id: &str, status: RunStatus) -> RunRecord {
        let now = Utc::now();
        RunRecord {
            run_id: run_id.to_string(),
            dag: "log_etl".to_string(),
            started_at: now,
            finished_at: now,
            status,
            reason: None,
            tasks: BTreeMap::new(),
            records_accepted: 3,
            records_rejected: 0,
            rows_written: 3,
        }
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryRunStore::new();
        assert!(store.latest().await.unwrap().is_none());

        store.save(&record("a", RunStatus::Success)).await.unwrap();
        store.save(&record("b", RunStatus::Failed)).await.unwrap();
        store.save(&record("a", RunStatus::Failed)).await.unwrap();

        assert_eq!(store.records().len(), 2);
        assert_eq!(store.load("a").await.unwrap().unwrap().status, RunStatus::Failed);
        assert_eq!(store.latest().await.unwrap().unwrap().run_id, "a");
        assert!(store.load("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_jsonl_store_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlRunStore::new(dir.path().join("state").join("runs.jsonl"));

        assert!(store.latest().await.unwrap().is_none());

        store.save(&record("run-1", RunStatus::Success)).await.unwrap();
        store.save(&record("run-2", RunStatus::Failed)).await.unwrap();

        let reopened = JsonlRunStore::new(store.path());
        let latest = reopened.latest().await.unwrap().unwrap();
        assert_eq!(latest.run_id, "run-2");
        assert_eq!(latest.status, RunStatus::Failed);

        let first = reopened.load("run-1").await.unwrap().unwrap();
        assert_eq!(first.records_accepted, 3);
    }

    #[tokio::test]
    async fn test_jsonl_store_rejects_corrupt_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.jsonl");
        std::fs::write(&path, "{not json}\n").unwrap();

        let store = JsonlRunStore::new(path);
        assert!(matches!(
            store.latest().await,
            Err(RunStoreError::Serialization(_))
        ));
    }
}
