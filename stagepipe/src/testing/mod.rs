//! Testing utilities for stagepipe pipelines.
//!
//! This module provides:
//! - Mock stages that record, fail or sleep
//! - Assertions over the event log

mod assertions;
mod mocks;

pub use assertions::{assert_event_order, assert_no_event, assert_status};
pub use mocks::{FailingStage, Journal, RecordingStage, SlowStage};
