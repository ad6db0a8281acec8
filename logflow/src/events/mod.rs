//! Event sink system for run observability.
//!
//! The executor reports every task state change through an [`EventSink`].
//! This is the only side channel a run produces besides the sink write.

mod sink;

pub use sink::{ChannelEventSink, CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
