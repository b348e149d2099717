//! Stage trait and implementations.
//!
//! Stages are the leaf units of work in a pipeline. A stage reads and writes
//! the shared [`ExecutionContext`] and reports failure by returning an error.

use crate::context::ExecutionContext;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// Trait for pipeline stages.
///
/// Implementations must be safe to share across worker tasks: the same
/// stage instance may be referenced from several places in a graph.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Performs the stage's work.
    ///
    /// # Errors
    ///
    /// Any error is recorded as an `Exception` event for the owning node.
    async fn do_work(&self, ctx: &ExecutionContext) -> anyhow::Result<()>;

    /// Called before `do_work`.
    fn init(&self, _ctx: &ExecutionContext) {}

    /// Called after `do_work` and every post-callback, whatever the outcome.
    fn close(&self, _ctx: &ExecutionContext) {}

    /// A short human-readable description used in event details.
    fn describe(&self) -> String {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full).to_string()
    }
}

/// Creates fresh stage instances.
///
/// Registered in a [`StageRegistry`](crate::spec::StageRegistry) under a type
/// name; the compiler calls `build_stage` once per stage definition.
pub trait StageBuilder: Send + Sync {
    /// Builds a new stage instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage cannot be constructed.
    fn build_stage(&self) -> anyhow::Result<Arc<dyn Stage>>;
}

impl<F> StageBuilder for F
where
    F: Fn() -> anyhow::Result<Arc<dyn Stage>> + Send + Sync,
{
    fn build_stage(&self) -> anyhow::Result<Arc<dyn Stage>> {
        self()
    }
}

/// A function-based stage.
pub struct FnStage<F>
where
    F: Fn(&ExecutionContext) -> anyhow::Result<()> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&ExecutionContext) -> anyhow::Result<()> + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&ExecutionContext) -> anyhow::Result<()> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&ExecutionContext) -> anyhow::Result<()> + Send + Sync,
{
    async fn do_work(&self, ctx: &ExecutionContext) -> anyhow::Result<()> {
        (self.func)(ctx)
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// A stage that does nothing.
#[derive(Debug, Clone, Default)]
pub struct NoOpStage;

#[async_trait]
impl Stage for NoOpStage {
    async fn do_work(&self, _ctx: &ExecutionContext) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_stage() {
        let stage = FnStage::new("writer", |ctx| {
            ctx.add_object("written", true);
            Ok(())
        });

        assert_eq!(stage.describe(), "writer");

        let ctx = ExecutionContext::new();
        stage.do_work(&ctx).await.unwrap();
        assert_eq!(ctx.get_object("written"), Some(serde_json::json!(true)));
    }

    #[tokio::test]
    async fn test_fn_stage_error() {
        let stage = FnStage::new("broken", |_ctx| anyhow::bail!("nope"));
        let err = stage.do_work(&ExecutionContext::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "nope");
    }

    #[tokio::test]
    async fn test_noop_stage() {
        let stage = NoOpStage;
        assert_eq!(stage.describe(), "NoOpStage");
        assert!(stage.do_work(&ExecutionContext::new()).await.is_ok());
    }

    #[test]
    fn test_closure_builder() {
        let builder = || -> anyhow::Result<Arc<dyn Stage>> { Ok(Arc::new(NoOpStage)) };
        let a = builder.build_stage().unwrap();
        let b = builder.build_stage().unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
