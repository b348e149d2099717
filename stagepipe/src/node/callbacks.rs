//! Stage callbacks and lifecycle hooks.

use super::Node;
use crate::context::ExecutionContext;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The point in a node's lifecycle at which a stage callback fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallbackEvent {
    /// Before the node does its work.
    Pre,
    /// After the node's work succeeded.
    PostSuccess,
    /// After the node's work failed.
    PostError,
}

impl fmt::Display for CallbackEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pre => write!(f, "PRE"),
            Self::PostSuccess => write!(f, "POST_SUCCESS"),
            Self::PostError => write!(f, "POST_ERROR"),
        }
    }
}

/// Instrumentation attached to a node id from outside that node.
#[cfg_attr(test, mockall::automock)]
pub trait StageCallback: Send + Sync {
    /// Called with the target node's id, the node and the lifecycle point.
    fn on_event(&self, stage_id: &str, node: &Node, event: CallbackEvent, ctx: &ExecutionContext);
}

impl<F> StageCallback for F
where
    F: Fn(&str, &Node, CallbackEvent, &ExecutionContext) + Send + Sync,
{
    fn on_event(&self, stage_id: &str, node: &Node, event: CallbackEvent, ctx: &ExecutionContext) {
        self(stage_id, node, event, ctx);
    }
}

/// A hook fired around a node's own run.
pub type LifecycleHook = Arc<dyn Fn(&Node, &ExecutionContext) + Send + Sync>;

/// Callbacks registered on one node.
///
/// Stage callbacks are keyed by the id of the node they target, which may be
/// this node or any descendant. Lifecycle hooks apply to this node only.
#[derive(Default)]
pub struct CallbackRegistry {
    pre_stage: RwLock<HashMap<String, Vec<Arc<dyn StageCallback>>>>,
    post_stage: RwLock<HashMap<String, Vec<Arc<dyn StageCallback>>>>,
    pre_run: RwLock<Vec<LifecycleHook>>,
    post_run: RwLock<Vec<LifecycleHook>>,
}

impl CallbackRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback fired before `target_id` runs.
    pub fn register_pre_stage(&self, target_id: impl Into<String>, callback: Arc<dyn StageCallback>) {
        self.pre_stage
            .write()
            .entry(target_id.into())
            .or_default()
            .push(callback);
    }

    /// Registers a callback fired after `target_id` runs.
    pub fn register_post_stage(&self, target_id: impl Into<String>, callback: Arc<dyn StageCallback>) {
        self.post_stage
            .write()
            .entry(target_id.into())
            .or_default()
            .push(callback);
    }

    /// Adds a hook fired before this node's stage callbacks.
    pub fn add_pre_run(&self, hook: LifecycleHook) {
        self.pre_run.write().push(hook);
    }

    /// Adds a hook fired after this node's stage callbacks.
    pub fn add_post_run(&self, hook: LifecycleHook) {
        self.post_run.write().push(hook);
    }

    /// Returns the pre callbacks registered for `target_id`.
    #[must_use]
    pub fn pre_stage_for(&self, target_id: &str) -> Vec<Arc<dyn StageCallback>> {
        self.pre_stage.read().get(target_id).cloned().unwrap_or_default()
    }

    /// Returns the post callbacks registered for `target_id`.
    #[must_use]
    pub fn post_stage_for(&self, target_id: &str) -> Vec<Arc<dyn StageCallback>> {
        self.post_stage.read().get(target_id).cloned().unwrap_or_default()
    }

    /// Returns the pre-run hooks.
    #[must_use]
    pub fn pre_run_hooks(&self) -> Vec<LifecycleHook> {
        self.pre_run.read().clone()
    }

    /// Returns the post-run hooks.
    #[must_use]
    pub fn post_run_hooks(&self) -> Vec<LifecycleHook> {
        self.post_run.read().clone()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pre_stage.read().is_empty()
            && self.post_stage.read().is_empty()
            && self.pre_run.read().is_empty()
            && self.post_run.read().is_empty()
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("pre_stage_targets", &self.pre_stage.read().keys().collect::<Vec<_>>())
            .field("post_stage_targets", &self.post_stage.read().keys().collect::<Vec<_>>())
            .field("pre_run", &self.pre_run.read().len())
            .field("post_run", &self.post_run.read().len())
            .finish()
    }
}

/// The registries inherited from every enclosing container during a run.
///
/// Containers extend the scope with their own registry before running their
/// children, so a callback registered on the root reaches every descendant.
#[derive(Debug, Clone, Default)]
pub struct CallbackScope {
    registries: Vec<Arc<CallbackRegistry>>,
}

impl CallbackScope {
    /// Creates the empty scope of a root run.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Returns this scope extended with `registry`.
    #[must_use]
    pub fn enter(&self, registry: &Arc<CallbackRegistry>) -> Self {
        let mut registries = self.registries.clone();
        if !registry.is_empty() {
            registries.push(registry.clone());
        }
        Self { registries }
    }

    /// Collects the pre callbacks for `target_id`, outermost first.
    #[must_use]
    pub fn pre_stage_for(&self, target_id: &str) -> Vec<Arc<dyn StageCallback>> {
        self.registries
            .iter()
            .flat_map(|r| r.pre_stage_for(target_id))
            .collect()
    }

    /// Collects the post callbacks for `target_id`, outermost first.
    #[must_use]
    pub fn post_stage_for(&self, target_id: &str) -> Vec<Arc<dyn StageCallback>> {
        self.registries
            .iter()
            .flat_map(|r| r.post_stage_for(target_id))
            .collect()
    }

    /// Returns the number of registries in scope.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.registries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_registry_keyed_by_target() {
        let registry = CallbackRegistry::new();
        assert!(registry.is_empty());

        registry.register_pre_stage("a", Arc::new(|_: &str, _: &Node, _: CallbackEvent, _: &ExecutionContext| {}));
        registry.register_post_stage("b", Arc::new(|_: &str, _: &Node, _: CallbackEvent, _: &ExecutionContext| {}));

        assert_eq!(registry.pre_stage_for("a").len(), 1);
        assert!(registry.pre_stage_for("b").is_empty());
        assert_eq!(registry.post_stage_for("b").len(), 1);
        assert!(!registry.is_empty());
    }

    #[test]
    fn test_scope_collects_outermost_first() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let outer = Arc::new(CallbackRegistry::new());
        let inner = Arc::new(CallbackRegistry::new());

        let o = order.clone();
        outer.register_pre_stage("x", Arc::new(move |_: &str, _: &Node, _: CallbackEvent, _: &ExecutionContext| o.lock().push("outer")));
        let o = order.clone();
        inner.register_pre_stage("x", Arc::new(move |_: &str, _: &Node, _: CallbackEvent, _: &ExecutionContext| o.lock().push("inner")));

        let scope = CallbackScope::root().enter(&outer).enter(&inner);
        assert_eq!(scope.depth(), 2);

        let node = Node::noop("x");
        let ctx = ExecutionContext::new();
        for cb in scope.pre_stage_for("x") {
            cb.on_event("x", &node, CallbackEvent::Pre, &ctx);
        }
        assert_eq!(*order.lock(), vec!["outer", "inner"]);
    }

    #[test]
    fn test_empty_registry_does_not_deepen_scope() {
        let scope = CallbackScope::root().enter(&Arc::new(CallbackRegistry::new()));
        assert_eq!(scope.depth(), 0);
    }

    #[test]
    fn test_mock_callback() {
        let mut mock = MockStageCallback::new();
        mock.expect_on_event()
            .withf(|id, _, event, _| id == "x" && *event == CallbackEvent::PostSuccess)
            .times(1)
            .return_const(());

        let node = Node::noop("x");
        mock.on_event("x", &node, CallbackEvent::PostSuccess, &ExecutionContext::new());
    }

    #[test]
    fn test_lifecycle_hooks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = CallbackRegistry::new();
        let c = calls.clone();
        registry.add_pre_run(Arc::new(move |_: &Node, _: &ExecutionContext| {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        let node = Node::noop("x");
        let ctx = ExecutionContext::new();
        for hook in registry.pre_run_hooks() {
            hook(&node, &ctx);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.post_run_hooks().is_empty());
    }
}
