//! Shared execution state threaded through a pipeline run.
//!
//! This module provides:
//! - The execution context handle shared by every node of one invocation
//! - A thread-safe key/value store for passing data between stages
//! - An append-only, thread-safe event log

mod bags;
#[cfg(test)]
mod context_tests;
mod execution;

pub use bags::{EventLog, ObjectStore};
pub use execution::ExecutionContext;
