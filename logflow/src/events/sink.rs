//! Event sink trait and implementations.

use crate::core::{RunEvent, TaskState, TASK_STATE_CHANGED};
use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, Level};

/// Trait for sinks receiving run progress events.
///
/// Event emission is a side channel: sinks must never fail the run.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event asynchronously.
    async fn emit(&self, event: &RunEvent);

    /// Emits an event without blocking.
    ///
    /// This method must never panic. Errors are logged but suppressed.
    fn try_emit(&self, event: &RunEvent);
}

/// A no-op event sink that discards all events.
///
/// Used as the default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: &RunEvent) {}

    fn try_emit(&self, _event: &RunEvent) {}
}

/// An event sink that logs events using the tracing framework.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a new logging event sink with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, event: &RunEvent) {
        let payload = event.payload();
        if self.level == Level::DEBUG {
            debug!(event_type = %event.event_type, event_data = %payload, "Event: {}", event.event_type);
        } else {
            info!(event_type = %event.event_type, event_data = %payload, "Event: {}", event.event_type);
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: &RunEvent) {
        self.log_event(event);
    }

    fn try_emit(&self, event: &RunEvent) {
        self.log_event(event);
    }
}

/// Forwards events to an unbounded channel for external observers.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<RunEvent>,
}

impl ChannelEventSink {
    /// Creates a sink and the receiving half of its channel.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RunEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventSink for ChannelEventSink {
    async fn emit(&self, event: &RunEvent) {
        self.try_emit(event);
    }

    fn try_emit(&self, event: &RunEvent) {
        if self.tx.send(event.clone()).is_err() {
            debug!(event_type = %event.event_type, "Event receiver dropped");
        }
    }
}

/// A collecting event sink for testing purposes.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<RunEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<RunEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Returns events matching a type prefix.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<RunEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type.starts_with(type_prefix))
            .cloned()
            .collect()
    }

    /// Returns the sequence of states a task passed through, starting with
    /// the state of its first recorded transition.
    #[must_use]
    pub fn state_path(&self, task: &str) -> Vec<TaskState> {
        let mut path = Vec::new();
        for event in self.events_of_type(TASK_STATE_CHANGED) {
            if event.data.get("task").and_then(|t| t.as_str()) != Some(task) {
                continue;
            }
            let from: Option<TaskState> = event.data.get("from").cloned().and_then(|v| serde_json::from_value(v).ok());
            let to: Option<TaskState> = event.data.get("to").cloned().and_then(|v| serde_json::from_value(v).ok());
            if let (Some(from), Some(to)) = (from, to) {
                if path.is_empty() {
                    path.push(from);
                }
                path.push(to);
            }
        }
        path
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: &RunEvent) {
        self.events.write().push(event.clone());
    }

    fn try_emit(&self, event: &RunEvent) {
        self.events.write().push(event.clone());
    }
}
