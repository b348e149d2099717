//! Bounded worker pool for concurrent node execution.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// A fixed number of workers over the tokio runtime.
///
/// Submitted futures are spawned immediately and wait for a permit before
/// running, so at most `size` run at once. Dropping a returned handle
/// detaches the task; it is never cancelled.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Creates a pool with `size` workers (at least one).
    #[must_use]
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Returns the number of workers.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns how many workers are idle.
    #[must_use]
    pub fn idle_workers(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Submits a task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit<F, T>(&self, task: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let semaphore = self.semaphore.clone();
        tokio::spawn(async move {
            // The semaphore is never closed; a failed acquire just runs unbounded.
            let _permit = semaphore.acquire_owned().await.ok();
            task.await
        })
    }
}
