//! Core domain model types for stagepipe.
//!
//! This module contains the fundamental value types shared by the engine:
//! - Context status and event type enums
//! - Event log records

mod event;
mod status;

pub use event::ExecutionEvent;
pub use status::{EventType, ExecutionStatus};
