//! Background root runs.

use crate::context::ExecutionContext;
use crate::errors::PipelineError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Marks a pipeline as having an outstanding detached run until dropped.
#[derive(Debug)]
pub(crate) struct OutstandingGuard {
    flag: Arc<AtomicBool>,
}

impl OutstandingGuard {
    /// Sets the flag, or returns `None` if it was already set.
    pub(crate) fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag: flag.clone() })
    }
}

impl Drop for OutstandingGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Handle to a pipeline running in the background.
///
/// Dropping the handle does not stop the run.
#[derive(Debug)]
pub struct DetachedRun {
    pipeline_id: String,
    handle: JoinHandle<Arc<ExecutionContext>>,
}

impl DetachedRun {
    pub(crate) fn new(pipeline_id: impl Into<String>, handle: JoinHandle<Arc<ExecutionContext>>) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            handle,
        }
    }

    /// Returns the id of the running pipeline.
    #[must_use]
    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    /// Returns true once the run has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the run and returns its context.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Internal`] if the worker panicked.
    pub async fn wait(self) -> Result<Arc<ExecutionContext>, PipelineError> {
        self.handle.await.map_err(|err| {
            PipelineError::Internal(format!(
                "Detached run of '{}' did not complete: {err}",
                self.pipeline_id
            ))
        })
    }
}
