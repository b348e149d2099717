//! Parallel sections: child pipelines run concurrently on a worker pool.

use super::pool::WorkerPool;
use super::sequence::Pipeline;
use crate::config::EngineConfig;
use crate::context::ExecutionContext;
use crate::core::EventType;
use crate::errors::PipelineError;
use crate::node::{CallbackScope, Node, NodeKind, NodeRunner};
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// State of a parallel node.
#[derive(Debug)]
pub struct ParallelState {
    children: RwLock<Vec<Arc<Node>>>,
    fail_fast: bool,
    pool_size: usize,
    open_pools: Arc<AtomicUsize>,
}

impl ParallelState {
    fn new(fail_fast: bool, pool_size: usize) -> Self {
        Self {
            children: RwLock::new(Vec::new()),
            fail_fast,
            pool_size: pool_size.max(1),
            open_pools: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns a snapshot of the child pipelines, in submission order.
    #[must_use]
    pub fn children(&self) -> Vec<Arc<Node>> {
        self.children.read().clone()
    }

    /// Returns the fail-fast flag.
    #[must_use]
    pub fn fail_fast(&self) -> bool {
        self.fail_fast
    }

    /// Returns the worker pool size.
    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Returns how many invocations currently hold a pool.
    #[must_use]
    pub fn open_pools(&self) -> usize {
        self.open_pools.load(Ordering::Acquire)
    }

    fn open_pool(&self) -> PoolLease {
        self.open_pools.fetch_add(1, Ordering::AcqRel);
        PoolLease {
            pool: WorkerPool::new(self.pool_size),
            open_pools: self.open_pools.clone(),
        }
    }
}

/// A worker pool owned by one invocation; released when dropped.
struct PoolLease {
    pool: WorkerPool,
    open_pools: Arc<AtomicUsize>,
}

impl Drop for PoolLease {
    fn drop(&mut self) {
        self.open_pools.fetch_sub(1, Ordering::AcqRel);
    }
}

pub(crate) async fn execute_parallel(
    node: &Arc<Node>,
    state: &ParallelState,
    ctx: &Arc<ExecutionContext>,
    scope: &CallbackScope,
) -> Result<(), PipelineError> {
    let lease = state.open_pool();
    let pool = &lease.pool;
    let runner = NodeRunner::new(state.fail_fast);
    let mut pending = FuturesUnordered::new();

    for child in state.children() {
        let child_id = child.id().to_string();
        let ctx = ctx.clone();
        let scope = scope.clone();
        let handle = pool.submit(async move { runner.run(&child, &ctx, &scope).await });
        pending.push(async move { (child_id, handle.await) });
    }

    tracing::debug!(
        parallel_id = %node.id(),
        submitted = pending.len(),
        workers = pool.size(),
        "Submitted child pipelines"
    );

    while let Some((child_id, joined)) = pending.next().await {
        let result = joined.unwrap_or_else(|join_err| {
            let err = PipelineError::Internal(format!("Worker for '{child_id}' failed: {join_err}"));
            ctx.create_event(child_id.as_str(), EventType::Exception, err.to_string());
            if state.fail_fast {
                Err(PipelineError::execution(child_id.as_str(), err))
            } else {
                Ok(())
            }
        });

        if let Err(err) = result {
            tracing::error!(
                parallel_id = %node.id(),
                child_id = %child_id,
                still_running = pending.len(),
                "Child pipeline failed, not waiting for the others"
            );
            return Err(err);
        }
    }
    Ok(())
}

/// Child pipelines run concurrently on a bounded worker pool.
///
/// Every invocation opens its own pool and releases it when it returns, so
/// concurrent runs of one section never share workers.
/// Under fail-fast the first failure is reported at once; children already
/// submitted keep running and keep writing to the context.
#[derive(Debug, Clone)]
pub struct Parallel {
    node: Arc<Node>,
}

impl Parallel {
    /// Creates an empty parallel section.
    #[must_use]
    pub fn new(id: impl Into<String>, fail_fast: bool, pool_size: usize) -> Self {
        Self {
            node: Arc::new(Node::with_kind(
                id,
                NodeKind::Parallel(ParallelState::new(fail_fast, pool_size)),
            )),
        }
    }

    /// Creates an empty parallel section sized by the config.
    #[must_use]
    pub fn from_config(id: impl Into<String>, config: &EngineConfig) -> Self {
        Self::new(id, config.fail_fast, config.parallel_pool_size)
    }

    /// Wraps an existing parallel node.
    #[must_use]
    pub fn from_node(node: Arc<Node>) -> Option<Self> {
        node.is_parallel().then_some(Self { node })
    }

    fn state(&self) -> &ParallelState {
        match self.node.kind() {
            NodeKind::Parallel(state) => state,
            _ => unreachable!("Parallel always wraps a parallel node"),
        }
    }

    /// Returns the id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.node.id()
    }

    /// Returns the underlying node.
    #[must_use]
    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// Returns the fail-fast flag.
    #[must_use]
    pub fn fail_fast(&self) -> bool {
        self.state().fail_fast
    }

    /// Returns the worker pool size.
    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.state().pool_size
    }

    /// Returns how many invocations currently hold a pool.
    #[must_use]
    pub fn open_pools(&self) -> usize {
        self.state().open_pools()
    }

    /// Appends a child pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DuplicateChild`] if a child with the same id
    /// is already present.
    pub fn add_pipeline(&self, pipeline: &Pipeline) -> Result<&Self, PipelineError> {
        let mut children = self.state().children.write();
        if children.iter().any(|child| child.id() == pipeline.id()) {
            return Err(PipelineError::DuplicateChild {
                parent: self.id().to_string(),
                child: pipeline.id().to_string(),
            });
        }
        children.push(pipeline.node().clone());
        Ok(self)
    }

    /// Appends a child pipeline whose id is already known to be unique.
    pub(crate) fn attach_pipeline(&self, pipeline: &Pipeline) {
        self.state().children.write().push(pipeline.node().clone());
    }

    /// Returns the child pipelines.
    #[must_use]
    pub fn pipelines(&self) -> Vec<Pipeline> {
        self.state()
            .children()
            .into_iter()
            .filter_map(Pipeline::from_node)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{FnStage, NoOpStage};
    use crate::testing::SlowStage;
    use std::time::{Duration, Instant};

    fn child(id: &str, stage_id: &str, millis: u64) -> Pipeline {
        let pipeline = Pipeline::new(id, true);
        pipeline.add_stage(stage_id, Arc::new(SlowStage::new(Duration::from_millis(millis))));
        pipeline
    }

    #[test]
    fn test_duplicate_child_is_rejected() {
        let parallel = Parallel::new("par", true, 4);
        parallel.add_pipeline(&Pipeline::new("a", true)).unwrap();

        let err = parallel.add_pipeline(&Pipeline::new("a", true)).unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateChild { ref child, .. } if child == "a"));
        assert_eq!(parallel.pipelines().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_children_overlap_in_time() {
        let parallel = Parallel::new("par", true, 10);
        for (i, millis) in [40, 60, 80].into_iter().enumerate() {
            parallel
                .add_pipeline(&child(&format!("p{i}"), &format!("s{i}"), millis))
                .unwrap();
        }
        let root = Pipeline::new("root", true);
        root.add_parallel(&parallel);

        let start = Instant::now();
        let ctx = root.run_new().await;
        let elapsed = start.elapsed();

        assert!(ctx.is_success());
        assert!(elapsed >= Duration::from_millis(80));
        assert!(elapsed < Duration::from_millis(180));
        assert_eq!(parallel.open_pools(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_runs_get_their_own_pools() {
        let parallel = Parallel::new("par", true, 2);
        parallel.add_pipeline(&child("p0", "s0", 150)).unwrap();
        parallel.add_pipeline(&child("p1", "s1", 150)).unwrap();
        let root = Pipeline::new("root", true);
        root.add_parallel(&parallel);

        let start = Instant::now();
        let (first, second, pools_mid_run) = tokio::join!(root.run_new(), root.run_new(), async {
            tokio::time::sleep(Duration::from_millis(75)).await;
            parallel.open_pools()
        });
        let elapsed = start.elapsed();

        assert!(first.is_success());
        assert!(second.is_success());
        assert_eq!(pools_mid_run, 2);
        assert!(elapsed < Duration::from_millis(280), "runs were serialised: {elapsed:?}");
        assert_eq!(parallel.open_pools(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_single_worker_serialises_children() {
        let parallel = Parallel::new("par", true, 1);
        parallel.add_pipeline(&child("p0", "s0", 30)).unwrap();
        parallel.add_pipeline(&child("p1", "s1", 30)).unwrap();
        let root = Pipeline::new("root", true);
        root.add_parallel(&parallel);

        let start = Instant::now();
        let ctx = root.run_new().await;
        assert!(ctx.is_success());
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fail_fast_does_not_wait_for_slowest() {
        let parallel = Parallel::new("par", true, 10);
        parallel.add_pipeline(&child("slow", "slow-stage", 200)).unwrap();
        let failing = Pipeline::new("failing", true);
        failing.add_stage("boom", Arc::new(FnStage::new("Boom", |_| anyhow::bail!("boom"))));
        parallel.add_pipeline(&failing).unwrap();

        let root = Pipeline::new("root", true);
        root.add_parallel(&parallel);

        let start = Instant::now();
        let ctx = root.run_new().await;
        assert!(start.elapsed() < Duration::from_millis(200));
        assert!(ctx.is_failure());
        assert!(ctx.stage_events("slow-stage").len() < 2);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(
            ctx.last_stage_event("slow-stage").map(|e| e.event_type),
            Some(EventType::CalledStage)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_continue_mode_waits_for_every_child() {
        let parallel = Parallel::new("par", false, 10);
        let failing = Pipeline::new("failing", true);
        failing.add_stage("boom", Arc::new(FnStage::new("Boom", |_| anyhow::bail!("boom"))));
        parallel.add_pipeline(&failing).unwrap();
        parallel.add_pipeline(&child("slow", "slow-stage", 50)).unwrap();

        let root = Pipeline::new("root", true);
        root.add_parallel(&parallel);

        let ctx = root.run_new().await;
        assert!(ctx.is_success());
        assert_eq!(
            ctx.last_stage_event("slow-stage").map(|e| e.event_type),
            Some(EventType::CalledStage)
        );
        assert_eq!(
            ctx.last_stage_event("failing").map(|e| e.event_type),
            Some(EventType::Exception)
        );
    }

    #[tokio::test]
    async fn test_empty_parallel_completes() {
        let parallel = Parallel::from_config("par", &EngineConfig::default());
        assert_eq!(parallel.pool_size(), 10);
        let root = Pipeline::new("root", true);
        root.add_parallel(&parallel).add_stage("after", Arc::new(NoOpStage));

        let ctx = root.run_new().await;
        assert!(ctx.is_success());
        assert!(Parallel::from_node(root.node().clone()).is_none());
    }
}
