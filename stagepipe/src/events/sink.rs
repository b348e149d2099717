//! Event sink trait and implementations.

use crate::core::{EventType, ExecutionEvent};
use parking_lot::RwLock;
use tracing::{debug, info, warn, Level};
use uuid::Uuid;

/// Trait for event sinks that receive a copy of every logged event.
pub trait EventSink: Send + Sync {
    /// Receives an event without blocking.
    ///
    /// This method must never panic; errors are logged and suppressed.
    fn try_emit(&self, run_id: Uuid, event: &ExecutionEvent);
}

/// A no-op event sink that discards all events.
///
/// Used as the default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn try_emit(&self, _run_id: Uuid, _event: &ExecutionEvent) {}
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
}

impl EventSink for LoggingEventSink {
    fn try_emit(&self, run_id: Uuid, event: &ExecutionEvent) {
        // Exceptions are always surfaced, whatever the configured level.
        if event.event_type == EventType::Exception {
            warn!(
                run_id = %run_id,
                node_id = %event.node_id,
                event_type = %event.event_type,
                "{}", event.details
            );
            return;
        }

        if self.level == Level::DEBUG {
            debug!(
                run_id = %run_id,
                node_id = %event.node_id,
                event_type = %event.event_type,
                "{}", event.details
            );
        } else {
            info!(
                run_id = %run_id,
                node_id = %event.node_id,
                event_type = %event.event_type,
                "{}", event.details
            );
        }
    }
}

/// A collecting event sink for testing purposes.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<ExecutionEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<ExecutionEvent> {
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

    /// Returns events of the given type.
    #[must_use]
    pub fn events_of_type(&self, event_type: EventType) -> Vec<ExecutionEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }
}

impl EventSink for CollectingEventSink {
    fn try_emit(&self, _run_id: Uuid, event: &ExecutionEvent) {
        self.events.write().push(event.clone());
    }
}
