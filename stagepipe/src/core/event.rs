//! Event log records.

use super::EventType;
use crate::utils::{format_event_timestamp, now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One entry of an execution context's append-only event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionEvent {
    /// When the event was recorded.
    pub timestamp: Timestamp,
    /// The id of the node the event concerns.
    pub node_id: String,
    /// The kind of event.
    pub event_type: EventType,
    /// Free-form details (typically the operation or the error message).
    pub details: String,
}

impl ExecutionEvent {
    /// Creates a new event stamped with the current time.
    #[must_use]
    pub fn new(node_id: impl Into<String>, event_type: EventType, details: impl Into<String>) -> Self {
        Self {
            timestamp: now_utc(),
            node_id: node_id.into(),
            event_type,
            details: details.into(),
        }
    }

    /// Returns true if this event is for `node_id` and of `event_type`.
    #[must_use]
    pub fn is(&self, node_id: &str, event_type: EventType) -> bool {
        self.node_id == node_id && self.event_type == event_type
    }
}

impl fmt::Display for ExecutionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}: {}",
            format_event_timestamp(&self.timestamp),
            self.event_type,
            self.node_id,
            self.details
        )
    }
}
