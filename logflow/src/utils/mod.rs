//! Utility functions for run ids and timestamp handling.

pub mod timestamps;

pub use timestamps::{format_iso8601, iso_timestamp, now_utc, parse_timestamp, Timestamp, TimestampError};

use uuid::Uuid;

/// Generates a new run id (UUID v4).
#[must_use]
pub fn generate_run_id() -> String {
    Uuid::new_v4().to_string()
}
