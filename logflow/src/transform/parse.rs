//! Record to feature row transform.

use super::feature::{row_key, FeatureRow, LogLevel};
use super::record::{RawRecord, RejectReason, RejectedRecord};
use super::schema::{Column, RecordSchema};
use crate::utils::parse_timestamp;
use chrono::Timelike;
use chrono_tz::Tz;

/// How records are read and where dates are computed.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformConfig {
    /// Field delimiter.
    pub delimiter: char,
    /// Whether the first line of each object is a header.
    pub has_header: bool,
    /// Column layout used when there is no header.
    pub schema: RecordSchema,
    /// Timezone for `event_date` and `hour_of_day`.
    pub timezone: Tz,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            delimiter: ',',
            has_header: false,
            schema: RecordSchema::default(),
            timezone: Tz::UTC,
        }
    }
}

impl TransformConfig {
    /// Creates the default configuration: comma separated, no header, UTC.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the delimiter.
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Reads the column layout from the first line of each object.
    #[must_use]
    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    /// Sets the column layout.
    #[must_use]
    pub fn with_schema(mut self, schema: RecordSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Sets the reporting timezone.
    #[must_use]
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }
}

/// Turns one record into a feature row, or says why it cannot.
///
/// The returned `service_error_rate` is that of a one-row batch; the
/// batch aggregator replaces it.
pub fn transform(record: &RawRecord, config: &TransformConfig) -> Result<FeatureRow, RejectedRecord> {
    let reject = |reason| RejectedRecord::new(record.clone(), reason);
    let schema = &config.schema;

    if record.has_invalid_encoding() {
        return Err(reject(RejectReason::InvalidEncoding));
    }
    if record.fields().len() != schema.width() {
        return Err(reject(RejectReason::WrongFieldCount {
            expected: schema.width(),
            found: record.fields().len(),
        }));
    }

    let field = |column| schema.position(column).and_then(|i| record.field(i)).unwrap_or_default();

    let event_timestamp = parse_timestamp(field(Column::Timestamp).trim_start_matches('\u{feff}'))
        .map_err(|_| reject(RejectReason::MalformedTimestamp))?;

    let service = field(Column::Service).trim();
    if service.is_empty() {
        return Err(reject(RejectReason::MissingValue {
            column: Column::Service.name().to_string(),
        }));
    }

    let user_id = match field(Column::UserId).trim() {
        "" => None,
        value => Some(
            value
                .parse::<i64>()
                .map_err(|_| reject(RejectReason::InvalidUserId))?,
        ),
    };

    let log_level = LogLevel::parse(field(Column::Level));
    let message = normalize_message(field(Column::Message));
    let local = event_timestamp.with_timezone(&config.timezone);

    Ok(FeatureRow {
        event_timestamp,
        event_date: local.date_naive(),
        hour_of_day: local.hour(),
        service: service.to_string(),
        log_level,
        log_level_encoded: log_level.encoded(),
        is_error: log_level.is_error(),
        message_length: message.chars().count(),
        message,
        service_error_rate: if log_level.is_error() { 1.0 } else { 0.0 },
        user_id,
        source_object: record.source().to_string(),
        line_offset: record.line(),
        row_key: row_key(record.source(), record.line(), record.raw()),
    })
}

/// Strips a leading BOM, turns control characters into spaces, and trims.
#[must_use]
pub fn normalize_message(message: &str) -> String {
    message
        .trim_start_matches('\u{feff}')
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}
