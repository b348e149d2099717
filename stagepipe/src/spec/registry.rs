//! Registry of stage builders keyed by type name.

use crate::stages::{Stage, StageBuilder};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps the type names used in specifications to stage builders.
///
/// Populated by the host application before compiling.
#[derive(Default)]
pub struct StageRegistry {
    builders: RwLock<HashMap<String, Arc<dyn StageBuilder>>>,
}

impl StageRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a builder, replacing any previous one for the name.
    pub fn register(&self, type_name: impl Into<String>, builder: impl StageBuilder + 'static) -> &Self {
        let type_name = type_name.into();
        if self
            .builders
            .write()
            .insert(type_name.clone(), Arc::new(builder))
            .is_some()
        {
            tracing::warn!(type_name = %type_name, "Replaced stage builder");
        }
        self
    }

    /// Registers a closure producing a new stage on every call.
    pub fn register_fn<F, S>(&self, type_name: impl Into<String>, factory: F) -> &Self
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: Stage + 'static,
    {
        self.register(type_name, move || -> anyhow::Result<Arc<dyn Stage>> {
            Ok(Arc::new(factory()))
        })
    }

    /// Registers a stage type built with `Default::default`.
    pub fn register_default<S>(&self, type_name: impl Into<String>) -> &Self
    where
        S: Stage + Default + 'static,
    {
        self.register_fn(type_name, S::default)
    }

    /// Returns the builder for a type name.
    #[must_use]
    pub fn get(&self, type_name: &str) -> Option<Arc<dyn StageBuilder>> {
        self.builders.read().get(type_name).cloned()
    }

    /// Checks if a type name is registered.
    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.builders.read().contains_key(type_name)
    }

    /// Lists registered type names, sorted.
    #[must_use]
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.builders.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of registered builders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.builders.read().len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.builders.read().is_empty()
    }
}

impl std::fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRegistry")
            .field("type_names", &self.type_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::NoOpStage;

    #[test]
    fn test_register_and_build() {
        let registry = StageRegistry::new();
        registry
            .register_default::<NoOpStage>("Noop")
            .register_fn("Other", || NoOpStage);

        assert!(registry.contains("Noop"));
        assert_eq!(registry.type_names(), vec!["Noop", "Other"]);
        assert_eq!(registry.len(), 2);

        let builder = registry.get("Noop").unwrap();
        let a = builder.build_stage().unwrap();
        let b = builder.build_stage().unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_failing_builder() {
        let registry = StageRegistry::new();
        registry.register("Broken", || -> anyhow::Result<Arc<dyn Stage>> {
            anyhow::bail!("missing configuration")
        });

        let err = registry.get("Broken").unwrap().build_stage().unwrap_err();
        assert_eq!(err.to_string(), "missing configuration");
        assert!(registry.get("Unknown").is_none());
    }
}
