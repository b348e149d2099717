//! Drives one node through its lifecycle.

use super::{execute, CallbackEvent, CallbackScope, Node};
use crate::context::ExecutionContext;
use crate::core::EventType;
use crate::errors::PipelineError;
use std::sync::Arc;
use tracing::Instrument;

/// Runs a node inside a scope with a given fail-fast policy.
///
/// The order is fixed: `init`, pre-run hooks, pre callbacks, `CallingStage`,
/// the work itself, `CalledStage` or `Exception`, post callbacks, post-run
/// hooks, `close`. `close` runs whatever the outcome.
#[derive(Debug, Clone, Copy)]
pub struct NodeRunner {
    fail_fast: bool,
}

impl NodeRunner {
    /// Creates a runner for a scope.
    #[must_use]
    pub fn new(fail_fast: bool) -> Self {
        Self { fail_fast }
    }

    /// Returns the scope's fail-fast flag.
    #[must_use]
    pub fn fail_fast(&self) -> bool {
        self.fail_fast
    }

    /// Runs `node`.
    ///
    /// # Errors
    ///
    /// Under fail-fast, returns the node's failure wrapped in
    /// [`PipelineError::Execution`]. Otherwise failures are only recorded.
    pub async fn run(
        &self,
        node: &Arc<Node>,
        ctx: &Arc<ExecutionContext>,
        scope: &CallbackScope,
    ) -> Result<(), PipelineError> {
        let span = tracing::debug_span!(
            "node.run",
            node_id = %node.id(),
            fail_fast = self.fail_fast,
            run_id = %ctx.run_id()
        );
        self.run_inner(node, ctx, scope).instrument(span).await
    }

    async fn run_inner(
        &self,
        node: &Arc<Node>,
        ctx: &Arc<ExecutionContext>,
        scope: &CallbackScope,
    ) -> Result<(), PipelineError> {
        let id = node.id();
        let node_ref: &Node = node;
        let ctx_ref: &ExecutionContext = ctx;
        let scope = scope.enter(node.callbacks());
        let operation = format!("{}.do_work()", node.describe());

        node.init(ctx);

        for hook in node.callbacks().pre_run_hooks() {
            hook(node_ref, ctx_ref);
        }
        for callback in scope.pre_stage_for(id) {
            callback.on_event(id, node_ref, CallbackEvent::Pre, ctx_ref);
        }

        ctx.create_event(id, EventType::CallingStage, operation.as_str());
        let result = execute(node, ctx, &scope).await;

        let event = match &result {
            Ok(()) => {
                ctx.create_event(id, EventType::CalledStage, operation.as_str());
                CallbackEvent::PostSuccess
            }
            Err(err) => {
                ctx.create_event(id, EventType::Exception, format!("{operation}: {err}"));
                CallbackEvent::PostError
            }
        };

        for callback in scope.post_stage_for(id) {
            callback.on_event(id, node_ref, event, ctx_ref);
        }
        for hook in node.callbacks().post_run_hooks() {
            hook(node_ref, ctx_ref);
        }

        node.close(ctx);

        match result {
            Ok(()) => Ok(()),
            Err(err) if self.fail_fast => {
                tracing::error!(node_id = %id, error = %err, "Node failed, aborting scope");
                Err(PipelineError::execution(id, err))
            }
            Err(err) => {
                tracing::warn!(node_id = %id, error = %err, "Node failed, continuing");
                Ok(())
            }
        }
    }
}

impl Default for NodeRunner {
    fn default() -> Self {
        Self::new(true)
    }
}
