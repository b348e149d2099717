//! Thread-safe object store and event log.

use crate::core::{EventType, ExecutionEvent};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;

/// A concurrent key/value store for passing data between stages.
///
/// Writes overwrite existing keys; absent keys read as `None`.
#[derive(Debug, Default)]
pub struct ObjectStore {
    data: DashMap<String, serde_json::Value>,
}

impl ObjectStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets a copy of a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.data.get(key).map(|entry| entry.value().clone())
    }

    /// Inserts or replaces a value.
    pub fn insert(&self, key: impl Into<String>, value: serde_json::Value) {
        self.data.insert(key.into(), value);
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.data.clear();
    }

    /// Returns a copy of all data.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        self.data
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// An append-only event log.
///
/// Appends from concurrent workers are serialised by a write lock; the log's
/// order is the order in which appends acquired that lock.
#[derive(Debug, Default)]
pub struct EventLog {
    events: RwLock<Vec<ExecutionEvent>>,
}

impl EventLog {
    /// Creates a new empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event.
    pub fn append(&self, event: ExecutionEvent) {
        self.events.write().push(event);
    }

    /// Appends an event, then hands it to `observe` before the log is
    /// unlocked, so observers see events in log order.
    ///
    /// `observe` must not touch this log.
    pub fn append_then(&self, event: ExecutionEvent, observe: impl FnOnce(&ExecutionEvent)) {
        let mut events = self.events.write();
        events.push(event);
        if let Some(last) = events.last() {
            observe(last);
        }
    }

    /// Returns a snapshot of every event, in log order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ExecutionEvent> {
        self.events.read().clone()
    }

    /// Returns every event recorded for `node_id`, in log order.
    #[must_use]
    pub fn for_node(&self, node_id: &str) -> Vec<ExecutionEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.node_id == node_id)
            .cloned()
            .collect()
    }

    /// Returns the most recent event recorded for `node_id`.
    #[must_use]
    pub fn last_for_node(&self, node_id: &str) -> Option<ExecutionEvent> {
        self.events
            .read()
            .iter()
            .rev()
            .find(|e| e.node_id == node_id)
            .cloned()
    }

    /// Returns every event of `event_type`, in log order.
    #[must_use]
    pub fn of_type(&self, event_type: EventType) -> Vec<ExecutionEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Returns the number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing has been logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}
