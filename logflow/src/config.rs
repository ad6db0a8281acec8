//! Pipeline configuration.
//!
//! Loaded from a JSON file (every field has a default), then overridden by
//! `LOGFLOW_*` environment variables, then validated.

use crate::dag::RetryPolicy;
use crate::errors::ConfigError;
use crate::etl::TableRef;
use crate::observability::{LogConfig, LogFormat};
use crate::transform::{RecordSchema, TransformConfig};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Where the raw logs live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Bucket to list.
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Only objects whose name starts with this prefix are read.
    #[serde(default)]
    pub prefix: String,
}

fn default_bucket() -> String {
    "raw-logs".to_string()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            prefix: String::new(),
        }
    }
}

/// How records are parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformSettings {
    /// Field delimiter: a single character, or `tab`.
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    /// Whether each object starts with a header line.
    #[serde(default)]
    pub has_header: bool,
    /// Column layout when there is no header.
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    /// IANA timezone for `event_date` and `hour_of_day`.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_delimiter() -> String {
    ",".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for TransformSettings {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            has_header: false,
            columns: None,
            timezone: default_timezone(),
        }
    }
}

/// The destination table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Fully qualified table name.
    #[serde(default = "default_table")]
    pub table: String,
    /// Partitioning column.
    #[serde(default = "default_partition_field")]
    pub partition_field: String,
    /// Clustering columns.
    #[serde(default = "default_cluster_fields")]
    pub cluster_fields: Vec<String>,
}

fn default_table() -> String {
    "log_analytics.ai_log_features".to_string()
}

fn default_partition_field() -> String {
    "event_date".to_string()
}

fn default_cluster_fields() -> Vec<String> {
    vec!["service".to_string(), "log_level".to_string()]
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            table: default_table(),
            partition_field: default_partition_field(),
            cluster_fields: default_cluster_fields(),
        }
    }
}

/// Failure alerting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Who is told about failed tasks.
    #[serde(default)]
    pub recipients: Vec<String>,
}

/// Full configuration of the log ETL pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtlConfig {
    /// DAG name.
    #[serde(default = "default_dag_name")]
    pub dag_name: String,
    /// Source bucket.
    #[serde(default)]
    pub source: SourceConfig,
    /// Record parsing.
    #[serde(default)]
    pub transform: TransformSettings,
    /// Destination table.
    #[serde(default)]
    pub sink: SinkConfig,
    /// Retry policy applied to every task.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Per-attempt timeout in seconds.
    #[serde(default)]
    pub task_timeout_secs: Option<u64>,
    /// Attempts running at once; zero is unbounded.
    #[serde(default)]
    pub max_concurrency: usize,
    /// Alerting.
    #[serde(default)]
    pub alert: AlertConfig,
    /// Logging.
    #[serde(default)]
    pub logging: LogConfig,
}

fn default_dag_name() -> String {
    "log_etl".to_string()
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            dag_name: default_dag_name(),
            source: SourceConfig::default(),
            transform: TransformSettings::default(),
            sink: SinkConfig::default(),
            retry: RetryPolicy::default(),
            task_timeout_secs: None,
            max_concurrency: 0,
            alert: AlertConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

impl EtlConfig {
    /// Parses a JSON document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed JSON.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Read` if the file cannot be read and
    /// `ConfigError::Parse` if it is not valid JSON.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    /// Loads the file if given (defaults otherwise), applies environment
    /// overrides and validates.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` from any of the three steps.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `LOGFLOW_*` overrides read through `lookup`.
    ///
    /// Empty values are ignored.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a numeric or boolean override
    /// does not parse.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = get("LOGFLOW_DAG_NAME") {
            self.dag_name = value;
        }
        if let Some(value) = get("LOGFLOW_BUCKET") {
            self.source.bucket = value;
        }
        if let Some(value) = get("LOGFLOW_PREFIX") {
            self.source.prefix = value;
        }
        if let Some(value) = get("LOGFLOW_DELIMITER") {
            self.transform.delimiter = value;
        }
        if let Some(value) = get("LOGFLOW_HAS_HEADER") {
            self.transform.has_header = parse_env("LOGFLOW_HAS_HEADER", &value)?;
        }
        if let Some(value) = get("LOGFLOW_TIMEZONE") {
            self.transform.timezone = value;
        }
        if let Some(value) = get("LOGFLOW_TABLE") {
            self.sink.table = value;
        }
        if let Some(value) = get("LOGFLOW_MAX_ATTEMPTS") {
            self.retry.max_attempts = parse_env("LOGFLOW_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = get("LOGFLOW_RETRY_DELAY_MS") {
            let delay: u64 = parse_env("LOGFLOW_RETRY_DELAY_MS", &value)?;
            self.retry.base_delay_ms = delay;
            self.retry.max_delay_ms = self.retry.max_delay_ms.max(delay);
        }
        if let Some(value) = get("LOGFLOW_TASK_TIMEOUT_SECS") {
            self.task_timeout_secs = Some(parse_env("LOGFLOW_TASK_TIMEOUT_SECS", &value)?);
        }
        if let Some(value) = get("LOGFLOW_MAX_CONCURRENCY") {
            self.max_concurrency = parse_env("LOGFLOW_MAX_CONCURRENCY", &value)?;
        }
        if let Some(value) = get("LOGFLOW_ALERT_RECIPIENTS") {
            self.alert.recipients = value
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(value) = get("LOGFLOW_LOG_FORMAT") {
            self.logging.format = value
                .parse::<LogFormat>()
                .map_err(|message| ConfigError::invalid("LOGFLOW_LOG_FORMAT", message))?;
        }

        Ok(())
    }

    /// Checks every field that cannot be checked by the type system.
    ///
    /// # Errors
    ///
    /// Returns the first `ConfigError::Invalid` found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dag_name.trim().is_empty() {
            return Err(ConfigError::invalid("dag_name", "must not be empty"));
        }
        if self.source.bucket.trim().is_empty() {
            return Err(ConfigError::invalid("source.bucket", "must not be empty"));
        }
        if self.sink.table.trim().is_empty() {
            return Err(ConfigError::invalid("sink.table", "must not be empty"));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::invalid("retry.max_attempts", "must be at least 1"));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(ConfigError::invalid(
                "retry.max_delay_ms",
                "must not be smaller than retry.base_delay_ms",
            ));
        }
        if self.task_timeout_secs == Some(0) {
            return Err(ConfigError::invalid("task_timeout_secs", "must be positive"));
        }
        self.transform_config().map(|_| ())
    }

    /// Builds the transform configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for a bad delimiter, an unknown
    /// timezone, or a column list missing a required column.
    pub fn transform_config(&self) -> Result<TransformConfig, ConfigError> {
        let settings = &self.transform;

        let delimiter = parse_delimiter(&settings.delimiter).ok_or_else(|| {
            ConfigError::invalid(
                "transform.delimiter",
                format!("expected a single character or 'tab', got '{}'", settings.delimiter),
            )
        })?;

        let timezone: Tz = settings.timezone.trim().parse().map_err(|_| {
            ConfigError::invalid(
                "transform.timezone",
                format!("unknown IANA timezone '{}'", settings.timezone),
            )
        })?;

        let schema = match &settings.columns {
            Some(columns) => RecordSchema::from_names(columns)
                .map_err(|err| ConfigError::invalid("transform.columns", err.to_string()))?,
            None => RecordSchema::default(),
        };

        Ok(TransformConfig::new()
            .with_delimiter(delimiter)
            .with_header(settings.has_header)
            .with_schema(schema)
            .with_timezone(timezone))
    }

    /// The destination table.
    #[must_use]
    pub fn table_ref(&self) -> TableRef {
        TableRef::new(&self.sink.table)
            .with_partition_field(&self.sink.partition_field)
            .with_cluster_fields(self.sink.cluster_fields.clone())
    }

    /// The per-attempt timeout.
    #[must_use]
    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_secs.map(Duration::from_secs)
    }
}

fn parse_delimiter(value: &str) -> Option<char> {
    match value {
        "tab" | "\\t" => Some('\t'),
        _ => {
            let mut chars = value.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(c),
                _ => None,
            }
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(key, format!("cannot parse '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::BackoffStrategy;
    use crate::transform::Column;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EtlConfig::default();
        assert_eq!(config.dag_name, "log_etl");
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.base_delay_ms, 300_000);
        assert_eq!(config.sink.partition_field, "event_date");
        assert_eq!(config.sink.cluster_fields, vec!["service", "log_level"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_json_equals_defaults() {
        assert_eq!(EtlConfig::from_json_str("{}").unwrap(), EtlConfig::default());
    }

    #[test]
    fn test_partial_json() {
        let config = EtlConfig::from_json_str(
            r#"{
                "source": {"bucket": "ai-log-raw-data", "prefix": "2024/"},
                "transform": {"delimiter": "tab", "has_header": true, "timezone": "Europe/Berlin"},
                "retry": {"max_attempts": 4, "base_delay_ms": 100, "backoff": "exponential"},
                "alert": {"recipients": ["oncall@example.com"]}
            }"#,
        )
        .unwrap();

        assert_eq!(config.source.bucket, "ai-log-raw-data");
        assert_eq!(config.source.prefix, "2024/");
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.backoff, BackoffStrategy::Exponential);
        assert_eq!(config.sink.table, "log_analytics.ai_log_features");

        let transform = config.transform_config().unwrap();
        assert_eq!(transform.delimiter, '\t');
        assert!(transform.has_header);
        assert_eq!(transform.timezone, chrono_tz::Europe::Berlin);
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            EtlConfig::from_json_str("{not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logflow.json");
        std::fs::write(&path, r#"{"dag_name": "nightly"}"#).unwrap();

        let config = EtlConfig::from_json_file(&path).unwrap();
        assert_eq!(config.dag_name, "nightly");

        let missing = EtlConfig::from_json_file(dir.path().join("missing.json"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = EtlConfig::default();
        config
            .apply_env_overrides(env(&[
                ("LOGFLOW_BUCKET", "other-bucket"),
                ("LOGFLOW_PREFIX", ""),
                ("LOGFLOW_MAX_ATTEMPTS", "5"),
                ("LOGFLOW_RETRY_DELAY_MS", "10"),
                ("LOGFLOW_HAS_HEADER", "true"),
                ("LOGFLOW_ALERT_RECIPIENTS", "a@example.com, b@example.com,"),
                ("LOGFLOW_LOG_FORMAT", "json"),
            ]))
            .unwrap();

        assert_eq!(config.source.bucket, "other-bucket");
        assert_eq!(config.source.prefix, "");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 10);
        assert!(config.transform.has_header);
        assert_eq!(config.alert.recipients, vec!["a@example.com", "b@example.com"]);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_env_override_parse_error() {
        let mut config = EtlConfig::default();
        let err = config
            .apply_env_overrides(env(&[("LOGFLOW_MAX_ATTEMPTS", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("LOGFLOW_MAX_ATTEMPTS"));
    }

    #[test]
    fn test_validation_errors() {
        let mut config = EtlConfig::default();
        config.source.bucket = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = EtlConfig::default();
        config.transform.timezone = "Mars/Olympus".to_string();
        assert!(config.validate().unwrap_err().to_string().contains("timezone"));

        let mut config = EtlConfig::default();
        config.transform.delimiter = ";;".to_string();
        assert!(config.validate().is_err());

        let mut config = EtlConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = EtlConfig::default();
        config.transform.columns = Some(vec!["timestamp".into(), "service".into()]);
        assert!(config.validate().unwrap_err().to_string().contains("level"));
    }

    #[test]
    fn test_configured_columns() {
        let mut config = EtlConfig::default();
        config.transform.columns = Some(
            ["timestamp", "log_level", "service", "message", "user_id"]
                .map(String::from)
                .to_vec(),
        );
        let transform = config.transform_config().unwrap();
        assert_eq!(transform.schema.position(Column::UserId), Some(4));
    }

    #[test]
    fn test_table_ref_and_timeout() {
        let mut config = EtlConfig::default();
        config.task_timeout_secs = Some(30);
        assert_eq!(config.task_timeout(), Some(Duration::from_secs(30)));
        let table = config.table_ref();
        assert_eq!(table.name(), "log_analytics.ai_log_features");
        assert_eq!(table.partition_field(), "event_date");
    }
}
