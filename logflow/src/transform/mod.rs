//! Log record to feature row transform.
//!
//! Pure functions only: no I/O happens here. [`transform`] maps one
//! [`RawRecord`] to a [`FeatureRow`] or a [`RejectedRecord`];
//! [`BatchAggregator`] collects the outcomes of one object and fills in
//! the batch-scoped `service_error_rate`. Malformed input never fails a
//! batch, it is rejected and counted.

mod aggregate;
mod feature;
mod parse;
mod record;
mod schema;

pub use aggregate::{process_object, BatchAggregator, BatchResult, BatchStats};
pub use feature::{row_key, FeatureRow, LogLevel};
pub use parse::{normalize_message, transform, TransformConfig};
pub use record::{RawRecord, RejectReason, RejectedRecord};
pub use schema::{Column, RecordSchema, SchemaError};
