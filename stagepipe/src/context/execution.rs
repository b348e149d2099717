//! The execution context shared by every node of one invocation.

use super::{EventLog, ObjectStore};
use crate::core::{EventType, ExecutionEvent, ExecutionStatus};
use crate::events::{EventSink, NoOpEventSink};
use crate::utils::generate_run_id;
use parking_lot::RwLock;
use std::sync::Arc;
use uuid::Uuid;

/// Shared mutable state for one top-level pipeline invocation.
///
/// The context is created once per invocation, wrapped in an `Arc` and
/// handed to every node taking part; it is never copied mid-run. The object
/// store and the event log are safe for concurrent use from parallel
/// workers. Status transitions are reserved to the engine.
pub struct ExecutionContext {
    /// Identifies this invocation in logs and sink callbacks.
    run_id: Uuid,
    /// Current status.
    status: RwLock<ExecutionStatus>,
    /// Data passed between stages.
    objects: ObjectStore,
    /// Append-only event log.
    event_log: EventLog,
    /// Receives a copy of every logged event.
    event_sink: Arc<dyn EventSink>,
}

impl ExecutionContext {
    /// Creates a new, undefined context.
    #[must_use]
    pub fn new() -> Self {
        Self {
            run_id: generate_run_id(),
            status: RwLock::new(ExecutionStatus::Undefined),
            objects: ObjectStore::new(),
            event_log: EventLog::new(),
            event_sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Seeds an object before the run starts.
    #[must_use]
    pub fn with_object(self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.objects.insert(key, value.into());
        self
    }

    /// Wraps the context in a shareable handle.
    #[must_use]
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Returns the run id.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn add_object(&self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.objects.insert(key, value.into());
    }

    /// Returns the value under `key`, or `None` if absent.
    #[must_use]
    pub fn get_object(&self, key: &str) -> Option<serde_json::Value> {
        self.objects.get(key)
    }

    /// Removes every stored object.
    pub fn clear_all_objects(&self) {
        self.objects.clear();
    }

    /// Returns the object store.
    #[must_use]
    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> ExecutionStatus {
        *self.status.read()
    }

    /// Returns true if no root pipeline has started with this context.
    #[must_use]
    pub fn is_undefined(&self) -> bool {
        self.status() == ExecutionStatus::Undefined
    }

    /// Returns true while a root pipeline runs with this context.
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.status() == ExecutionStatus::InProgress
    }

    /// Returns true if the root pipeline succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status() == ExecutionStatus::Success
    }

    /// Returns true if the root pipeline failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status() == ExecutionStatus::Failure
    }

    /// Moves `Undefined` to `InProgress`. Returns false if the context was
    /// already used.
    pub(crate) fn set_in_progress(&self) -> bool {
        self.transition(ExecutionStatus::Undefined, ExecutionStatus::InProgress)
    }

    /// Moves `InProgress` to `Success`.
    pub(crate) fn set_success(&self) -> bool {
        self.transition(ExecutionStatus::InProgress, ExecutionStatus::Success)
    }

    /// Moves `InProgress` to `Failure`.
    pub(crate) fn set_failure(&self) -> bool {
        self.transition(ExecutionStatus::InProgress, ExecutionStatus::Failure)
    }

    fn transition(&self, from: ExecutionStatus, to: ExecutionStatus) -> bool {
        let mut status = self.status.write();
        if *status != from {
            tracing::debug!(
                run_id = %self.run_id,
                current = %*status,
                requested = %to,
                "Ignoring status transition"
            );
            return false;
        }
        *status = to;
        true
    }

    /// Appends an event to the log and forwards it to the sink.
    pub fn create_event(
        &self,
        node_id: impl Into<String>,
        event_type: EventType,
        details: impl Into<String>,
    ) -> &Self {
        let event = ExecutionEvent::new(node_id, event_type, details);
        tracing::debug!(
            run_id = %self.run_id,
            node_id = %event.node_id,
            event_type = %event.event_type,
            "{}", event.details
        );
        self.event_log
            .append_then(event, |logged| self.event_sink.try_emit(self.run_id, logged));
        self
    }

    /// Returns a snapshot of the event log.
    #[must_use]
    pub fn event_log(&self) -> Vec<ExecutionEvent> {
        self.event_log.snapshot()
    }

    /// Returns every event recorded for `node_id`.
    #[must_use]
    pub fn stage_events(&self, node_id: &str) -> Vec<ExecutionEvent> {
        self.event_log.for_node(node_id)
    }

    /// Returns the most recent event recorded for `node_id`.
    #[must_use]
    pub fn last_stage_event(&self, node_id: &str) -> Option<ExecutionEvent> {
        self.event_log.last_for_node(node_id)
    }

    /// Returns every `Exception` event.
    #[must_use]
    pub fn exception_events(&self) -> Vec<ExecutionEvent> {
        self.event_log.of_type(EventType::Exception)
    }

    /// Serialises the status and event log (not the object store).
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "runId": self.run_id.to_string(),
            "status": self.status(),
            "eventLog": self.event_log(),
        })
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("run_id", &self.run_id)
            .field("status", &self.status())
            .field("objects", &self.objects.len())
            .field("events", &self.event_log.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;

    #[test]
    fn test_context_starts_undefined() {
        let ctx = ExecutionContext::new();
        assert!(ctx.is_undefined());
        assert!(ctx.event_log().is_empty());
    }

    #[test]
    fn test_status_transitions_are_guarded() {
        let ctx = ExecutionContext::new();

        assert!(!ctx.set_success());
        assert!(ctx.set_in_progress());
        assert!(!ctx.set_in_progress());
        assert!(ctx.set_failure());
        assert!(ctx.is_failure());

        // Terminal: nothing moves it any more.
        assert!(!ctx.set_success());
        assert!(!ctx.set_in_progress());
        assert!(ctx.is_failure());
    }

    #[test]
    fn test_objects() {
        let ctx = ExecutionContext::new().with_object("seed", "x");
        ctx.add_object("count", 3);

        assert_eq!(ctx.get_object("seed"), Some(serde_json::json!("x")));
        assert_eq!(ctx.get_object("count"), Some(serde_json::json!(3)));
        assert_eq!(ctx.get_object("missing"), None);

        ctx.clear_all_objects();
        assert_eq!(ctx.get_object("seed"), None);
    }

    #[test]
    fn test_events_reach_sink() {
        let sink = Arc::new(CollectingEventSink::new());
        let ctx = ExecutionContext::new().with_event_sink(sink.clone());

        ctx.create_event("a", EventType::CallingStage, "a.do_work()")
            .create_event("a", EventType::CalledStage, "a.do_work()");

        assert_eq!(sink.len(), 2);
        assert_eq!(ctx.stage_events("a").len(), 2);
        assert_eq!(
            ctx.last_stage_event("a").map(|e| e.event_type),
            Some(EventType::CalledStage)
        );
    }

    #[test]
    fn test_to_json() {
        let ctx = ExecutionContext::new();
        ctx.create_event("a", EventType::Exception, "boom");

        let json = ctx.to_json();
        assert_eq!(json["status"], "UNDEFINED");
        assert_eq!(json["eventLog"][0]["eventType"], "EXCEPTION");
        assert_eq!(ctx.exception_events().len(), 1);
    }
}
