//! Run state persistence.
//!
//! Each finished run is summarized as a [`RunRecord`] and handed to a
//! [`RunStore`], so the outcome of earlier runs can be inspected later.

mod record;
mod store;

pub use record::{RunRecord, RECORDS_ACCEPTED, RECORDS_REJECTED, ROWS_WRITTEN};
pub use store::{InMemoryRunStore, JsonlRunStore, RunStore, RunStoreError};

#[cfg(test)]
pub use store::MockRunStore;
