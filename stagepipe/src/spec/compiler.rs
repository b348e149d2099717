//! Compiles specifications into runnable pipelines.

use super::model::{PipelineDefinition, PipelineSpecification};
use super::registry::StageRegistry;
use super::validator::SpecValidator;
use crate::config::EngineConfig;
use crate::errors::{CompilationError, CycleDetectedError};
use crate::node::Node;
use crate::pipeline::{IdGraph, Parallel, Pipeline};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Checks the symbolic id graph of a specification for cycles.
///
/// Edges go from each nested pipeline to its steps and from each parallel to
/// its pipelines. A repeated id inside one step list also counts as a cycle.
/// A specification without root steps is trivially acyclic.
///
/// # Errors
///
/// Returns the first cycle found.
pub fn check_acyclic(spec: &PipelineSpecification) -> Result<(), CycleDetectedError> {
    if spec.steps.is_empty() {
        return Ok(());
    }

    IdGraph::chain(spec.steps.iter().map(String::as_str)).ensure_acyclic()?;

    let mut containment = IdGraph::new();
    for parallel in &spec.parallels {
        containment.add_vertex(parallel.id.as_str());
        for pipeline in &parallel.pipelines {
            IdGraph::chain(pipeline.steps.iter().map(String::as_str)).ensure_acyclic()?;
            containment.add_edge(parallel.id.as_str(), pipeline.id.as_str());
            for step in &pipeline.steps {
                containment.add_edge(pipeline.id.as_str(), step.as_str());
            }
        }
    }
    containment.ensure_acyclic()
}

/// Turns specifications into pipelines, instantiating stages through a
/// [`StageRegistry`].
///
/// The compiler also owns a cache of specification templates.
pub struct PipelineCompiler {
    registry: Arc<StageRegistry>,
    config: EngineConfig,
    validator: SpecValidator,
    templates: RwLock<HashMap<String, PipelineSpecification>>,
}

impl PipelineCompiler {
    /// Creates a compiler with the default config.
    #[must_use]
    pub fn new(registry: Arc<StageRegistry>) -> Self {
        Self {
            registry,
            config: EngineConfig::default(),
            validator: SpecValidator::new(),
            templates: RwLock::new(HashMap::new()),
        }
    }

    /// Sets the config.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the config.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the stage registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<StageRegistry> {
        &self.registry
    }

    /// Validates and compiles a specification.
    ///
    /// Every call instantiates fresh stages, so two pipelines compiled from
    /// the same specification share no state.
    ///
    /// # Errors
    ///
    /// Returns a [`CompilationError`] if the specification is malformed,
    /// cyclic, or a stage cannot be built. Nothing is instantiated before the
    /// structural checks pass.
    pub fn compile(&self, spec: &PipelineSpecification) -> Result<Pipeline, CompilationError> {
        let span = tracing::info_span!("pipeline.compile", spec_id = %spec.id);
        let _enter = span.enter();

        let mut spec = spec.clone();
        spec.assign_pipeline_ids();

        self.validator.validate(&spec)?;
        if let Err(err) = check_acyclic(&spec) {
            tracing::error!(error = %err, "Specification is cyclic");
            return Err(err.into());
        }

        let mut nodes: HashMap<&str, Arc<Node>> = HashMap::new();

        for stage in &spec.stages {
            let builder = self.registry.get(&stage.class_name).ok_or_else(|| {
                CompilationError::UnknownStageType {
                    id: stage.id.clone(),
                    type_name: stage.class_name.clone(),
                }
            })?;
            let instance = builder
                .build_stage()
                .map_err(|err| CompilationError::StageBuildFailed {
                    id: stage.id.clone(),
                    type_name: stage.class_name.clone(),
                    reason: err.to_string(),
                })?;
            nodes.insert(stage.id.as_str(), Node::stage(stage.id.as_str(), instance));
        }

        let mut pipelines: Vec<(&PipelineDefinition, Pipeline)> = Vec::new();
        for definition in &spec.parallels {
            let parallel = Parallel::new(
                definition.id.as_str(),
                spec.fast_fail,
                self.config.parallel_pool_size,
            );
            nodes.insert(definition.id.as_str(), parallel.node().clone());
            for nested in &definition.pipelines {
                let pipeline = Pipeline::new(nested.id.as_str(), spec.fast_fail);
                nodes.insert(nested.id.as_str(), pipeline.node().clone());
                parallel.attach_pipeline(&pipeline);
                pipelines.push((nested, pipeline));
            }
        }

        let resolve = |id: &str| -> Result<Arc<Node>, CompilationError> {
            nodes
                .get(id)
                .cloned()
                .ok_or_else(|| CompilationError::UnresolvedReference { id: id.to_string() })
        };

        for (definition, pipeline) in &pipelines {
            for step in &definition.steps {
                pipeline.add_node(resolve(step.as_str())?);
            }
        }

        let root = Pipeline::new(spec.id.as_str(), spec.fast_fail);
        for step in &spec.steps {
            root.add_node(resolve(step.as_str())?);
        }

        tracing::info!(
            stages = spec.stages.len(),
            parallels = spec.parallels.len(),
            steps = spec.steps.len(),
            "Compiled pipeline"
        );
        Ok(root)
    }

    /// Caches a specification under its id, replacing any previous one.
    pub fn register_template(&self, spec: PipelineSpecification) {
        self.templates.write().insert(spec.id.clone(), spec);
    }

    /// Returns a cached specification.
    #[must_use]
    pub fn template(&self, id: &str) -> Option<PipelineSpecification> {
        self.templates.read().get(id).cloned()
    }

    /// Lists cached template ids, sorted.
    #[must_use]
    pub fn template_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.templates.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Compiles a cached specification.
    ///
    /// # Errors
    ///
    /// Returns [`CompilationError::TemplateNotFound`] if nothing is cached
    /// under `id`, or any error of [`Self::compile`].
    pub fn compile_template(&self, id: &str) -> Result<Pipeline, CompilationError> {
        let spec = self
            .template(id)
            .ok_or_else(|| CompilationError::TemplateNotFound(id.to_string()))?;
        self.compile(&spec)
    }
}

impl std::fmt::Debug for PipelineCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineCompiler")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("templates", &self.template_ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::ParallelDefinition;
    use crate::stages::{NoOpStage, Stage};
    use pretty_assertions::assert_eq;

    fn compiler() -> PipelineCompiler {
        let registry = StageRegistry::new();
        registry.register_default::<NoOpStage>("Noop");
        registry.register("Broken", || -> anyhow::Result<Arc<dyn Stage>> {
            anyhow::bail!("no database")
        });
        PipelineCompiler::new(Arc::new(registry))
            .with_config(EngineConfig::new().with_parallel_pool_size(3))
    }

    #[test]
    fn test_zero_steps_is_acyclic() {
        let spec = PipelineSpecification::new("empty");
        assert!(check_acyclic(&spec).is_ok());

        let pipeline = compiler().compile(&spec).unwrap();
        assert!(pipeline.children().is_empty());
    }

    #[test]
    fn test_self_referencing_parallel_is_a_cycle() {
        let spec = PipelineSpecification::new("spec")
            .with_stage("a", "Noop")
            .with_parallel(ParallelDefinition::new("par").with_pipeline(["a", "par"]))
            .with_step("par");

        let err = compiler().compile(&spec).unwrap_err();
        match err {
            CompilationError::CycleDetected(cycle) => {
                assert_eq!(cycle.cycle_path, vec!["par", "par[0]", "par"]);
            }
            other => panic!("expected a cycle, got {other}"),
        }
    }

    #[test]
    fn test_repeated_root_step_is_a_cycle() {
        let spec = PipelineSpecification::new("spec")
            .with_stage("a", "Noop")
            .with_steps(["a", "a"]);
        assert!(matches!(
            compiler().compile(&spec),
            Err(CompilationError::CycleDetected(_))
        ));
    }

    #[test]
    fn test_shared_stage_across_pipelines_is_not_a_cycle() {
        let spec = PipelineSpecification::new("spec")
            .with_stage("a", "Noop")
            .with_parallel(ParallelDefinition::new("par").with_pipeline(["a"]).with_pipeline(["a"]))
            .with_steps(["a", "par"]);
        assert!(check_acyclic(&spec).is_ok());
    }

    #[test]
    fn test_validation_runs_first() {
        let spec = PipelineSpecification::new("spec").with_step("missing");
        assert!(matches!(
            compiler().compile(&spec),
            Err(CompilationError::Validation(_))
        ));
    }

    #[test]
    fn test_unknown_stage_type() {
        let spec = PipelineSpecification::new("spec")
            .with_stage("a", "Missing")
            .with_step("a");
        let err = compiler().compile(&spec).unwrap_err();
        assert!(matches!(err, CompilationError::UnknownStageType { ref id, .. } if id == "a"));
    }

    #[test]
    fn test_builder_failure_names_the_stage() {
        let spec = PipelineSpecification::new("spec")
            .with_stage("db", "Broken")
            .with_step("db");
        let err = compiler().compile(&spec).unwrap_err();
        assert!(err.to_string().contains("Stage 'db'"));
        assert!(err.to_string().contains("no database"));
    }

    #[test]
    fn test_structure_and_settings() {
        let spec = PipelineSpecification::new("spec")
            .with_stage("a", "Noop")
            .with_stage("b", "Noop")
            .with_parallel(ParallelDefinition::new("par").with_pipeline(["a"]).with_pipeline(["b", "a"]))
            .with_steps(["a", "par", "b"])
            .with_fast_fail(false);

        let root = compiler().compile(&spec).unwrap();
        assert_eq!(root.id(), "spec");
        assert!(!root.fail_fast());

        let ids: Vec<String> = root.children().iter().map(|n| n.id().to_string()).collect();
        assert_eq!(ids, vec!["a", "par", "b"]);

        let parallel = Parallel::from_node(root.children()[1].clone()).unwrap();
        assert_eq!(parallel.pool_size(), 3);
        assert!(!parallel.fail_fast());
        let nested: Vec<String> = parallel.pipelines().iter().map(|p| p.id().to_string()).collect();
        assert_eq!(nested, vec!["par[0]", "par[1]"]);
        assert_eq!(parallel.pipelines()[1].children().len(), 2);
    }

    #[test]
    fn test_compiling_twice_yields_distinct_stages() {
        let spec = PipelineSpecification::new("spec")
            .with_stage("a", "Noop")
            .with_step("a");
        let compiler = compiler();

        let first = compiler.compile(&spec).unwrap();
        let second = compiler.compile(&spec).unwrap();
        let a1 = first.children()[0].inner_stage().cloned().unwrap();
        let a2 = second.children()[0].inner_stage().cloned().unwrap();
        assert!(!Arc::ptr_eq(&a1, &a2));
    }

    #[test]
    fn test_templates() {
        let compiler = compiler();
        compiler.register_template(PipelineSpecification::new("tpl").with_stage("a", "Noop").with_step("a"));

        assert_eq!(compiler.template_ids(), vec!["tpl"]);
        assert!(compiler.template("tpl").is_some());
        assert_eq!(compiler.compile_template("tpl").unwrap().children().len(), 1);
        assert!(matches!(
            compiler.compile_template("nope"),
            Err(CompilationError::TemplateNotFound(ref id)) if id == "nope"
        ));
    }
}
