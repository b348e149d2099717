//! Utility functions for identifiers and timestamps.

pub mod timestamps;

pub use timestamps::{format_event_timestamp, now_utc, Timestamp};

use uuid::Uuid;

/// Generates a new time-ordered UUID (v7) used to identify a run.
#[must_use]
pub fn generate_run_id() -> Uuid {
    Uuid::now_v7()
}
