//! Timestamp helpers for event records.

use chrono::{DateTime, Utc};

/// Represents a timestamp that can be serialized/deserialized.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Formats an event timestamp with millisecond precision
/// (`YYYY-MM-DD HH:MM:SS.mmm`), the form used in event log dumps.
#[must_use]
pub fn format_event_timestamp(ts: &Timestamp) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}
