//! Assertions over a context's event log.

use crate::context::ExecutionContext;
use crate::core::{EventType, ExecutionStatus};

/// Asserts that `expected` appears in the event log in this order.
///
/// Other events may be interleaved; only the relative order of the listed
/// `(node_id, event_type)` pairs is checked.
pub fn assert_event_order(ctx: &ExecutionContext, expected: &[(&str, EventType)]) {
    let log = ctx.event_log();
    let mut remaining = expected.iter().peekable();
    for event in &log {
        if let Some((node_id, event_type)) = remaining.peek() {
            if event.is(node_id, *event_type) {
                remaining.next();
            }
        }
    }

    let missing: Vec<_> = remaining.collect();
    assert!(
        missing.is_empty(),
        "Expected events {:?} in order, missing from {:?}. Log:\n{}",
        expected,
        missing,
        log.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n")
    );
}

/// Asserts that `node_id` has no event of `event_type`, or no event at all
/// when `event_type` is `None`.
pub fn assert_no_event(ctx: &ExecutionContext, node_id: &str, event_type: Option<EventType>) {
    let found: Vec<EventType> = ctx
        .stage_events(node_id)
        .into_iter()
        .map(|e| e.event_type)
        .filter(|t| event_type.map_or(true, |expected| *t == expected))
        .collect();
    assert!(
        found.is_empty(),
        "Expected no events of type {event_type:?} for '{node_id}', found {found:?}"
    );
}

/// Asserts the context's status.
pub fn assert_status(ctx: &ExecutionContext, expected: ExecutionStatus) {
    assert_eq!(
        ctx.status(),
        expected,
        "Expected status {expected}, got {}",
        ctx.status()
    );
}
