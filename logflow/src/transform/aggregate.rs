//! Batch aggregation and per-object processing.

use super::feature::FeatureRow;
use super::parse::{transform, TransformConfig};
use super::record::{RawRecord, RejectedRecord};
use super::schema::{RecordSchema, SchemaError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Counts for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    /// Records seen.
    pub total: usize,
    /// Records that became rows.
    pub accepted: usize,
    /// Records rejected.
    pub rejected: usize,
    /// Rejections by [`RejectReason::code`](super::RejectReason::code).
    pub rejected_by_reason: BTreeMap<String, usize>,
}

impl BatchStats {
    /// Adds the counts of another batch.
    pub fn merge(&mut self, other: &Self) {
        self.total += other.total;
        self.accepted += other.accepted;
        self.rejected += other.rejected;
        for (reason, count) in &other.rejected_by_reason {
            *self.rejected_by_reason.entry(reason.clone()).or_default() += count;
        }
    }
}

/// Output of one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    /// The source object.
    pub source: String,
    /// Accepted rows in input order, with batch error rates.
    pub rows: Vec<FeatureRow>,
    /// Rejected records in input order.
    pub rejected: Vec<RejectedRecord>,
    /// Counts.
    pub stats: BatchStats,
}

/// Collects transform outcomes and computes per-service error rates.
#[derive(Debug)]
pub struct BatchAggregator {
    source: String,
    rows: Vec<FeatureRow>,
    rejected: Vec<RejectedRecord>,
    stats: BatchStats,
    // service -> (errors, total)
    per_service: HashMap<String, (usize, usize)>,
}

impl BatchAggregator {
    /// Starts a batch for `source`.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            rows: Vec::new(),
            rejected: Vec::new(),
            stats: BatchStats::default(),
            per_service: HashMap::new(),
        }
    }

    /// Adds one transform outcome.
    pub fn push(&mut self, outcome: Result<FeatureRow, RejectedRecord>) {
        self.stats.total += 1;
        match outcome {
            Ok(row) => {
                let counts = self.per_service.entry(row.service.clone()).or_default();
                counts.0 += usize::from(row.is_error);
                counts.1 += 1;
                self.stats.accepted += 1;
                self.rows.push(row);
            }
            Err(rejected) => {
                warn!(
                    source = %rejected.record.source(),
                    line = rejected.record.line(),
                    reason = %rejected.reason,
                    "Rejected log record"
                );
                *self
                    .stats
                    .rejected_by_reason
                    .entry(rejected.reason.code().to_string())
                    .or_default() += 1;
                self.stats.rejected += 1;
                self.rejected.push(rejected);
            }
        }
    }

    /// Adds several outcomes.
    pub fn extend(&mut self, outcomes: impl IntoIterator<Item = Result<FeatureRow, RejectedRecord>>) {
        for outcome in outcomes {
            self.push(outcome);
        }
    }

    /// Sets every row's `service_error_rate` and returns the batch.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn finish(mut self) -> BatchResult {
        for row in &mut self.rows {
            let (errors, total) = self.per_service.get(&row.service).copied().unwrap_or((0, 0));
            row.service_error_rate = if total == 0 {
                0.0
            } else {
                errors as f64 / total as f64
            };
        }

        debug!(
            source = %self.source,
            accepted = self.stats.accepted,
            rejected = self.stats.rejected,
            services = self.per_service.len(),
            "Batch finished"
        );

        BatchResult {
            source: self.source,
            rows: self.rows,
            rejected: self.rejected,
            stats: self.stats,
        }
    }
}

/// Decodes, transforms and aggregates the contents of one object.
///
/// Lines are split on `\n` with a trailing `\r` removed. Blank lines are
/// skipped but still count toward line numbers. With a header configured,
/// the first non-blank line defines the schema.
///
/// # Errors
///
/// Returns a `SchemaError` if the header lacks a required column.
pub fn process_object(source: &str, bytes: &[u8], config: &TransformConfig) -> Result<BatchResult, SchemaError> {
    let bytes = bytes.strip_prefix("\u{feff}".as_bytes()).unwrap_or(bytes);
    let mut lines = decode_lines(source, bytes, config.delimiter);

    let header_config;
    let config = if config.has_header {
        match lines.next() {
            Some(header) => {
                let schema = RecordSchema::from_names(header.fields())?;
                header_config = config.clone().with_schema(schema);
                &header_config
            }
            None => config,
        }
    } else {
        config
    };

    let mut aggregator = BatchAggregator::new(source);
    aggregator.extend(lines.map(|record| transform(&record, config)));
    Ok(aggregator.finish())
}

fn decode_lines<'a>(source: &'a str, bytes: &'a [u8], delimiter: char) -> impl Iterator<Item = RawRecord> + 'a {
    bytes
        .split(|b| *b == b'\n')
        .enumerate()
        .filter_map(move |(index, line)| {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            let (text, valid) = match std::str::from_utf8(line) {
                Ok(text) => (text.to_string(), true),
                Err(_) => (String::from_utf8_lossy(line).into_owned(), false),
            };
            if text.trim().is_empty() {
                return None;
            }
            let record = RawRecord::from_line(source, index + 1, text, delimiter);
            Some(if valid { record } else { record.with_invalid_encoding() })
        })
}
