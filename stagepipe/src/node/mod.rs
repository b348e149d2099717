//! Nodes: the engine's unit of work.
//!
//! A node wraps either a stage, a sequential pipeline or a parallel section
//! and adds identity, lifecycle and callbacks. Execution is dispatched on
//! [`NodeKind`] by a single function; containers recurse through the
//! [`NodeRunner`].

mod callbacks;
mod runner;

pub use callbacks::{
    CallbackEvent, CallbackRegistry, CallbackScope, LifecycleHook, StageCallback,
};
#[cfg(test)]
pub use callbacks::MockStageCallback;
pub use runner::NodeRunner;

use crate::context::ExecutionContext;
use crate::errors::PipelineError;
use crate::pipeline::{ParallelState, PipelineState};
use crate::stages::Stage;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// What a node does when it runs.
pub enum NodeKind {
    /// A leaf wrapping a stage; `None` behaves as a no-op.
    Stage(Option<Arc<dyn Stage>>),
    /// An ordered sequence of children.
    Pipeline(PipelineState),
    /// Child pipelines run concurrently.
    Parallel(ParallelState),
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stage(stage) => f.debug_tuple("Stage").field(stage).finish(),
            Self::Pipeline(state) => f.debug_tuple("Pipeline").field(state).finish(),
            Self::Parallel(state) => f.debug_tuple("Parallel").field(state).finish(),
        }
    }
}

/// A unit of work with an id, lifecycle and callbacks.
#[derive(Debug)]
pub struct Node {
    id: String,
    kind: NodeKind,
    callbacks: Arc<CallbackRegistry>,
}

impl Node {
    pub(crate) fn with_kind(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            callbacks: Arc::new(CallbackRegistry::new()),
        }
    }

    /// Creates a leaf node wrapping `stage`.
    #[must_use]
    pub fn stage(id: impl Into<String>, stage: Arc<dyn Stage>) -> Arc<Self> {
        Arc::new(Self::with_kind(id, NodeKind::Stage(Some(stage))))
    }

    /// Creates a leaf node without a stage.
    #[must_use]
    pub fn noop(id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::with_kind(id, NodeKind::Stage(None)))
    }

    /// Returns the node id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns what the node does.
    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Returns the stage of a leaf node.
    #[must_use]
    pub fn inner_stage(&self) -> Option<&Arc<dyn Stage>> {
        match &self.kind {
            NodeKind::Stage(stage) => stage.as_ref(),
            _ => None,
        }
    }

    /// Returns true for a sequential pipeline.
    #[must_use]
    pub fn is_pipeline(&self) -> bool {
        matches!(self.kind, NodeKind::Pipeline(_))
    }

    /// Returns true for a parallel section.
    #[must_use]
    pub fn is_parallel(&self) -> bool {
        matches!(self.kind, NodeKind::Parallel(_))
    }

    /// Returns the callbacks registered on this node.
    #[must_use]
    pub fn callbacks(&self) -> &Arc<CallbackRegistry> {
        &self.callbacks
    }

    /// Registers a callback fired before the node `target_id` runs.
    ///
    /// Registered on a container, it reaches every descendant.
    pub fn register_pre_stage_callback(
        &self,
        target_id: impl Into<String>,
        callback: impl StageCallback + 'static,
    ) {
        self.callbacks.register_pre_stage(target_id, Arc::new(callback));
    }

    /// Registers a callback fired after the node `target_id` runs.
    pub fn register_post_stage_callback(
        &self,
        target_id: impl Into<String>,
        callback: impl StageCallback + 'static,
    ) {
        self.callbacks.register_post_stage(target_id, Arc::new(callback));
    }

    /// Adds a hook fired before this node does its work.
    pub fn on_pre_run(&self, hook: impl Fn(&Self, &ExecutionContext) + Send + Sync + 'static) {
        self.callbacks.add_pre_run(Arc::new(hook));
    }

    /// Adds a hook fired after this node did its work.
    pub fn on_post_run(&self, hook: impl Fn(&Self, &ExecutionContext) + Send + Sync + 'static) {
        self.callbacks.add_post_run(Arc::new(hook));
    }

    /// A short description used in event details.
    #[must_use]
    pub fn describe(&self) -> String {
        match &self.kind {
            NodeKind::Stage(Some(stage)) => stage.describe(),
            NodeKind::Stage(None) => "NoOp".to_string(),
            NodeKind::Pipeline(_) => "Pipeline".to_string(),
            NodeKind::Parallel(_) => "Parallel".to_string(),
        }
    }

    /// Returns a snapshot of the node's direct children.
    #[must_use]
    pub fn children(&self) -> Vec<Arc<Self>> {
        match &self.kind {
            NodeKind::Stage(_) => Vec::new(),
            NodeKind::Pipeline(state) => state.children(),
            NodeKind::Parallel(state) => state.children(),
        }
    }

    /// Returns true if `target` is reachable through this node's children.
    #[must_use]
    pub fn reaches(&self, target: &Self) -> bool {
        let mut visited = HashSet::new();
        self.reaches_inner(target, &mut visited)
    }

    fn reaches_inner(&self, target: &Self, visited: &mut HashSet<*const Self>) -> bool {
        for child in self.children() {
            let ptr = Arc::as_ptr(&child);
            if std::ptr::eq(ptr, target) {
                return true;
            }
            if visited.insert(ptr) && child.reaches_inner(target, visited) {
                return true;
            }
        }
        false
    }

    /// Called by the runner before any callback.
    pub(crate) fn init(&self, ctx: &ExecutionContext) {
        match &self.kind {
            NodeKind::Stage(Some(stage)) => stage.init(ctx),
            NodeKind::Stage(None) | NodeKind::Pipeline(_) | NodeKind::Parallel(_) => {}
        }
    }

    /// Called by the runner last, whatever the outcome.
    pub(crate) fn close(&self, ctx: &ExecutionContext) {
        match &self.kind {
            NodeKind::Stage(Some(stage)) => stage.close(ctx),
            NodeKind::Stage(None) | NodeKind::Pipeline(_) | NodeKind::Parallel(_) => {}
        }
    }
}

/// Does the node's work. `scope` already includes the node's own registry.
pub(crate) fn execute<'a>(
    node: &'a Arc<Node>,
    ctx: &'a Arc<ExecutionContext>,
    scope: &'a CallbackScope,
) -> BoxFuture<'a, Result<(), PipelineError>> {
    async move {
        match &node.kind {
            NodeKind::Stage(None) => Ok(()),
            NodeKind::Stage(Some(stage)) => {
                stage
                    .do_work(ctx)
                    .await
                    .map_err(|source| PipelineError::Stage {
                        node_id: node.id.clone(),
                        source,
                    })
            }
            NodeKind::Pipeline(state) => {
                crate::pipeline::execute_sequence(node, state, ctx, scope).await
            }
            NodeKind::Parallel(state) => {
                crate::pipeline::execute_parallel(node, state, ctx, scope).await
            }
        }
    }
    .boxed()
}
