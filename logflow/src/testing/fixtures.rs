//! Sample log objects and rows.

use crate::transform::{process_object, FeatureRow, TransformConfig};

/// Headerless comma-separated log: two valid records for `svcA` (one
/// ERROR, one INFO) and one malformed line.
pub const SAMPLE_LOG_CSV: &str = "\
2024-01-01T10:00:00Z,svcA,ERROR,boom
2024-01-01T11:05:00Z,svcA,INFO,ok
bad,line
";

/// Tab-separated log with a header, mixed-case column names and user ids.
pub const SAMPLE_LOG_TSV: &str = "\
Timestamp\tLog_Level\tService\tMessage\tUser_ID
2024-03-05 08:15:02\tINFO\tauth\tuser login succeeded\t1001
2024-03-05 08:15:09\tERROR\tauth\tinvalid credentials\t1002
2024-03-05 08:16:44\tWARN\tpayments\tretrying charge\t1003
2024-03-05 09:01:10\tINFO\tpayments\tcharge settled\t1003
2024-03-05 09:30:00\tFATAL\tsearch\tindex unavailable\t1004
";

/// The rows produced from [`SAMPLE_LOG_CSV`] read as `sample.csv`.
#[must_use]
pub fn sample_rows() -> Vec<FeatureRow> {
    process_object("sample.csv", SAMPLE_LOG_CSV.as_bytes(), &TransformConfig::new())
        .map(|batch| batch.rows)
        .unwrap_or_default()
}
