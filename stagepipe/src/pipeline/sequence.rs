//! Sequential pipelines.

use super::dag::IdGraph;
use super::detached::{DetachedRun, OutstandingGuard};
use super::graph::ExecutionGraph;
use super::parallel::Parallel;
use super::pool::WorkerPool;
use crate::config::EngineConfig;
use crate::context::ExecutionContext;
use crate::core::EventType;
use crate::errors::{CompilationError, PipelineError};
use crate::node::{execute, CallbackScope, Node, NodeKind, NodeRunner, StageCallback};
use crate::stages::Stage;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::Instrument;

/// State of a sequential pipeline node.
#[derive(Debug)]
pub struct PipelineState {
    children: RwLock<Vec<Arc<Node>>>,
    fail_fast: bool,
    detached: Arc<AtomicBool>,
}

impl PipelineState {
    fn new(fail_fast: bool) -> Self {
        Self {
            children: RwLock::new(Vec::new()),
            fail_fast,
            detached: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns a snapshot of the children, in list order.
    #[must_use]
    pub fn children(&self) -> Vec<Arc<Node>> {
        self.children.read().clone()
    }

    /// Returns the fail-fast flag governing the children.
    #[must_use]
    pub fn fail_fast(&self) -> bool {
        self.fail_fast
    }
}

/// Builds the runtime DAG of a pipeline's children.
///
/// Children are chained in list order. A child that contains the pipeline
/// itself gets a self-edge.
pub(crate) fn runtime_dag(node: &Node, children: &[Arc<Node>]) -> IdGraph {
    let mut dag = IdGraph::chain(children.iter().map(|child| child.id()));
    for child in children {
        if std::ptr::eq(Arc::as_ptr(child), node) || child.reaches(node) {
            dag.add_edge(child.id(), child.id());
        }
    }
    dag
}

pub(crate) async fn execute_sequence(
    node: &Arc<Node>,
    state: &PipelineState,
    ctx: &Arc<ExecutionContext>,
    scope: &CallbackScope,
) -> Result<(), PipelineError> {
    let children = state.children();
    let order = runtime_dag(node, &children)
        .topological_order()
        .map_err(CompilationError::from)?;

    let by_id: HashMap<&str, &Arc<Node>> = children.iter().map(|c| (c.id(), c)).collect();
    let runner = NodeRunner::new(state.fail_fast);

    for id in order {
        let Some(child) = by_id.get(id.as_str()) else {
            return Err(CompilationError::UnresolvedReference { id }.into());
        };
        runner.run(child, ctx, scope).await?;
    }
    Ok(())
}

/// A sequence of nodes run one after another.
///
/// `Pipeline` is a cheap handle; clones share the same node.
#[derive(Debug, Clone)]
pub struct Pipeline {
    node: Arc<Node>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new(id: impl Into<String>, fail_fast: bool) -> Self {
        Self {
            node: Arc::new(Node::with_kind(
                id,
                NodeKind::Pipeline(PipelineState::new(fail_fast)),
            )),
        }
    }

    /// Creates an empty pipeline with the config's fail-fast default.
    #[must_use]
    pub fn from_config(id: impl Into<String>, config: &EngineConfig) -> Self {
        Self::new(id, config.fail_fast)
    }

    /// Wraps an existing pipeline node.
    #[must_use]
    pub fn from_node(node: Arc<Node>) -> Option<Self> {
        node.is_pipeline().then_some(Self { node })
    }

    fn state(&self) -> &PipelineState {
        match self.node.kind() {
            NodeKind::Pipeline(state) => state,
            _ => unreachable!("Pipeline always wraps a pipeline node"),
        }
    }

    /// Returns the pipeline id.
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

    /// Returns a snapshot of the children.
    #[must_use]
    pub fn children(&self) -> Vec<Arc<Node>> {
        self.state().children()
    }

    /// Appends a child node.
    pub fn add_node(&self, node: Arc<Node>) -> &Self {
        self.state().children.write().push(node);
        self
    }

    /// Appends a stage wrapped in a new node.
    pub fn add_stage(&self, id: impl Into<String>, stage: Arc<dyn Stage>) -> &Self {
        self.add_node(Node::stage(id, stage))
    }

    /// Appends a nested pipeline.
    pub fn add_pipeline(&self, pipeline: &Self) -> &Self {
        self.add_node(pipeline.node.clone())
    }

    /// Appends a parallel section.
    pub fn add_parallel(&self, parallel: &Parallel) -> &Self {
        self.add_node(parallel.node().clone())
    }

    /// Registers a callback fired before the node `target_id` runs, anywhere
    /// below this pipeline.
    pub fn register_pre_stage_callback(
        &self,
        target_id: impl Into<String>,
        callback: impl StageCallback + 'static,
    ) -> &Self {
        self.node.register_pre_stage_callback(target_id, callback);
        self
    }

    /// Registers a callback fired after the node `target_id` runs, anywhere
    /// below this pipeline.
    pub fn register_post_stage_callback(
        &self,
        target_id: impl Into<String>,
        callback: impl StageCallback + 'static,
    ) -> &Self {
        self.node.register_post_stage_callback(target_id, callback);
        self
    }

    /// Builds the runtime DAG over the current children.
    #[must_use]
    pub fn dag(&self) -> IdGraph {
        runtime_dag(&self.node, &self.children())
    }

    /// Builds the id-labelled graph for renderers.
    #[must_use]
    pub fn graph(&self) -> ExecutionGraph {
        ExecutionGraph::build(self)
    }

    /// Runs the children in topological order without touching the status.
    ///
    /// # Errors
    ///
    /// Returns a compilation error if the children form a cycle, or the
    /// first failure under fail-fast.
    pub async fn do_work(&self, ctx: &Arc<ExecutionContext>) -> Result<(), PipelineError> {
        let scope = CallbackScope::root().enter(self.node.callbacks());
        execute(&self.node, ctx, &scope).await
    }

    /// Runs the pipeline as the root of an invocation.
    ///
    /// Marks the context in progress, records `PipelineInProgress`, runs the
    /// children, then marks the context `Success` unless the last event for
    /// this pipeline is an `Exception`. A context that was already used is
    /// left untouched apart from an `Exception` event.
    pub async fn run(&self, ctx: Arc<ExecutionContext>) -> Arc<ExecutionContext> {
        let span = tracing::info_span!(
            "pipeline.run",
            pipeline_id = %self.id(),
            run_id = %ctx.run_id()
        );
        self.run_root(ctx).instrument(span).await
    }

    /// Runs the pipeline with a fresh context.
    pub async fn run_new(&self) -> Arc<ExecutionContext> {
        self.run(ExecutionContext::new().shared()).await
    }

    async fn run_root(&self, ctx: Arc<ExecutionContext>) -> Arc<ExecutionContext> {
        let id = self.id();

        if !ctx.set_in_progress() {
            tracing::error!(status = %ctx.status(), "Execution context was already used");
            ctx.create_event(
                id,
                EventType::Exception,
                format!("Cannot run '{id}' with a context in status {}", ctx.status()),
            );
            return ctx;
        }

        tracing::info!("Pipeline started");
        ctx.create_event(id, EventType::PipelineInProgress, "Pipeline.run()");

        if let Err(err) = self.do_work(&ctx).await {
            ctx.create_event(id, EventType::Exception, err.to_string());
        }

        let failed = ctx
            .last_stage_event(id)
            .is_some_and(|event| event.event_type == EventType::Exception);

        if failed {
            ctx.set_failure();
            ctx.create_event(id, EventType::Failure, "Pipeline.run()");
            tracing::error!(exceptions = ctx.exception_events().len(), "Pipeline failed");
        } else {
            ctx.set_success();
            ctx.create_event(id, EventType::Success, "Pipeline.run()");
            tracing::info!("Pipeline succeeded");
        }
        ctx
    }

    /// Runs the pipeline on a single background worker.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DetachedRunOutstanding`] while a previous
    /// detached run of this pipeline has not finished, and
    /// [`PipelineError::Internal`] outside a tokio runtime.
    pub fn run_detached(&self, ctx: Arc<ExecutionContext>) -> Result<DetachedRun, PipelineError> {
        tokio::runtime::Handle::try_current()
            .map_err(|err| PipelineError::Internal(err.to_string()))?;

        let guard = OutstandingGuard::acquire(&self.state().detached)
            .ok_or_else(|| PipelineError::DetachedRunOutstanding(self.id().to_string()))?;

        let pool = WorkerPool::new(1);
        let pipeline = self.clone();
        let handle = pool.submit(async move {
            let _guard = guard;
            pipeline.run(ctx).await
        });

        Ok(DetachedRun::new(self.id(), handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{FnStage, NoOpStage};
    use pretty_assertions::assert_eq;

    fn types_for(ctx: &ExecutionContext, id: &str) -> Vec<EventType> {
        ctx.stage_events(id).into_iter().map(|e| e.event_type).collect()
    }

    #[tokio::test]
    async fn test_empty_pipeline_succeeds() {
        let ctx = Pipeline::new("p", true).run_new().await;
        assert!(ctx.is_success());
        assert_eq!(types_for(&ctx, "p"), vec![EventType::PipelineInProgress, EventType::Success]);
    }

    #[tokio::test]
    async fn test_children_run_in_list_order() {
        let pipeline = Pipeline::new("p", true);
        for id in ["c", "a", "b"] {
            pipeline.add_stage(id, Arc::new(FnStage::new(id, move |ctx| {
                let mut seen = ctx.get_object("seen").unwrap_or_else(|| serde_json::json!([]));
                if let Some(list) = seen.as_array_mut() {
                    list.push(serde_json::json!(id));
                }
                ctx.add_object("seen", seen);
                Ok(())
            })));
        }

        let ctx = pipeline.run_new().await;
        assert!(ctx.is_success());
        assert_eq!(ctx.get_object("seen"), Some(serde_json::json!(["c", "a", "b"])));
    }

    #[tokio::test]
    async fn test_duplicate_child_id_is_a_cycle() {
        let pipeline = Pipeline::new("p", true);
        pipeline.add_stage("a", Arc::new(NoOpStage)).add_stage("a", Arc::new(NoOpStage));

        let ctx = ExecutionContext::new().shared();
        let err = pipeline.do_work(&ctx).await.unwrap_err();
        assert!(err.is_compilation());
        assert!(err.to_string().contains("must be acyclic"));
        assert!(ctx.event_log().is_empty());
    }

    #[tokio::test]
    async fn test_self_containing_pipeline_fails_the_run() {
        let outer = Pipeline::new("outer", true);
        let inner = Pipeline::new("inner", true);
        inner.add_stage("a", Arc::new(NoOpStage));
        outer.add_pipeline(&inner);
        // Structure contributed after construction.
        inner.add_pipeline(&outer);

        let ctx = outer.run_new().await;
        assert!(ctx.is_failure());
        assert!(ctx
            .exception_events()
            .iter()
            .any(|e| e.details.contains("must be acyclic")));
        assert!(ctx.stage_events("a").is_empty());
    }

    #[tokio::test]
    async fn test_used_context_is_rejected() {
        let pipeline = Pipeline::new("p", true);
        let ctx = pipeline.run_new().await;
        assert!(ctx.is_success());

        let ctx = pipeline.run(ctx).await;
        assert!(ctx.is_success());
        assert_eq!(
            ctx.last_stage_event("p").map(|e| e.event_type),
            Some(EventType::Exception)
        );
    }

    #[tokio::test]
    async fn test_nested_fail_fast_child_inside_continue_parent() {
        let parent = Pipeline::new("parent", false);
        let child = Pipeline::new("child", true);
        child
            .add_stage("boom", Arc::new(FnStage::new("Boom", |_| anyhow::bail!("boom"))))
            .add_stage("skipped", Arc::new(NoOpStage));
        parent.add_pipeline(&child).add_stage("after", Arc::new(NoOpStage));

        let ctx = parent.run_new().await;

        assert!(ctx.stage_events("skipped").is_empty());
        assert_eq!(types_for(&ctx, "after"), vec![EventType::CallingStage, EventType::CalledStage]);
        assert_eq!(
            types_for(&ctx, "child"),
            vec![EventType::CallingStage, EventType::Exception]
        );
        assert!(ctx.is_success());
    }

    #[tokio::test]
    async fn test_root_callbacks_reach_nested_nodes() {
        let root = Pipeline::new("root", true);
        let nested = Pipeline::new("nested", true);
        nested.add_stage("deep", Arc::new(NoOpStage));
        root.add_pipeline(&nested);

        let hits = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let h = hits.clone();
        root.register_pre_stage_callback(
            "deep",
            move |id: &str, _: &Node, event: crate::node::CallbackEvent, _: &ExecutionContext| {
                h.lock().push(format!("{event} {id}"));
            },
        );

        let ctx = root.run_new().await;
        assert!(ctx.is_success());
        assert_eq!(*hits.lock(), vec!["PRE deep".to_string()]);
    }

    #[test]
    fn test_dag_chains_children() {
        let pipeline = Pipeline::new("p", true);
        pipeline
            .add_stage("a", Arc::new(NoOpStage))
            .add_stage("b", Arc::new(NoOpStage));

        let dag = pipeline.dag();
        assert_eq!(dag.edges(), vec![("a", "b")]);
        assert!(Pipeline::from_node(Node::noop("x")).is_none());
    }
}
