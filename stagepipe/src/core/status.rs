//! Execution status and event type enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The status of an execution context.
///
/// `Success` and `Failure` are terminal: once reached, the status of that
/// context never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// No root pipeline has started with this context yet.
    #[default]
    Undefined,
    /// A root pipeline is running with this context.
    InProgress,
    /// The root pipeline completed without an escaping failure.
    Success,
    /// The root pipeline failed.
    Failure,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "UNDEFINED"),
            Self::InProgress => write!(f, "IN_PROGRESS"),
            Self::Success => write!(f, "SUCCESS"),
            Self::Failure => write!(f, "FAILURE"),
        }
    }
}

impl ExecutionStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }
}

/// The kind of an entry in the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// A root pipeline started running.
    PipelineInProgress,
    /// A node is about to do its work.
    CallingStage,
    /// A node finished its work without error.
    CalledStage,
    /// A root pipeline finished successfully.
    Success,
    /// A root pipeline failed.
    Failure,
    /// A node's work raised an error.
    Exception,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PipelineInProgress => write!(f, "PIPELINE_IN_PROGRESS"),
            Self::CallingStage => write!(f, "CALLING_STAGE"),
            Self::CalledStage => write!(f, "CALLED_STAGE"),
            Self::Success => write!(f, "SUCCESS"),
            Self::Failure => write!(f, "FAILURE"),
            Self::Exception => write!(f, "EXCEPTION"),
        }
    }
}
