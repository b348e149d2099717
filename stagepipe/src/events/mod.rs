//! Event sinks mirroring the context event log.
//!
//! Every event appended to an [`ExecutionContext`](crate::context::ExecutionContext)
//! is also handed to the context's sink, so hosts can stream events to logs
//! or collectors without polling the log.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
