//! The declarative pipeline specification.
//!
//! Field names follow the exchange format (`className`, `fastFail`, ...), so
//! any serde format can produce a specification. Reading files is left to
//! the caller.

use serde::{Deserialize, Serialize};

fn default_fast_fail() -> bool {
    true
}

/// The type tag of an option value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OptionType {
    /// A string.
    String,
    /// An integer.
    Integer,
    /// A floating point number.
    Double,
    /// A date-time string.
    Datetime,
    /// Anything else.
    Custom,
}

/// A named option. Options are carried but never interpreted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionDefinition {
    /// Option name.
    pub name: String,
    /// Option type tag.
    #[serde(rename = "type")]
    pub option_type: OptionType,
    /// Option value.
    #[serde(default)]
    pub value: serde_json::Value,
}

/// A stage: an id bound to a registered stage type name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageDefinition {
    /// Stage id.
    pub id: String,
    /// Registered stage type name.
    #[serde(default)]
    pub class_name: String,
}

impl StageDefinition {
    /// Creates a stage definition.
    #[must_use]
    pub fn new(id: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            class_name: class_name.into(),
        }
    }
}

/// A pipeline nested in a parallel section.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// Pipeline id; assigned `"<parallel>[<index>]"` when left empty.
    #[serde(default)]
    pub id: String,
    /// Ordered step ids.
    #[serde(default)]
    pub steps: Vec<String>,
}

impl PipelineDefinition {
    /// Creates a pipeline definition.
    #[must_use]
    pub fn new<I, S>(id: impl Into<String>, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            steps: steps.into_iter().map(Into::into).collect(),
        }
    }
}

/// A parallel section and its child pipelines.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParallelDefinition {
    /// Parallel id.
    pub id: String,
    /// Child pipelines.
    #[serde(default, alias = "parallelPipelines")]
    pub pipelines: Vec<PipelineDefinition>,
}

impl ParallelDefinition {
    /// Creates an empty parallel definition.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pipelines: Vec::new(),
        }
    }

    fn next_pipeline_id(&self) -> String {
        format!("{}[{}]", self.id, self.pipelines.len())
    }

    /// Adds a child pipeline with an assigned id.
    #[must_use]
    pub fn with_pipeline<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_pipeline(steps);
        self
    }

    /// Adds a child pipeline, assigning it the id `"<parallel>[<index>]"`.
    pub fn add_pipeline<I, S>(&mut self, steps: I) -> &str
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = self.next_pipeline_id();
        self.pipelines.push(PipelineDefinition::new(id, steps));
        &self.pipelines[self.pipelines.len() - 1].id
    }

    /// Assigns `"<parallel>[<index>]"` to every child pipeline without an id.
    pub fn assign_pipeline_ids(&mut self) {
        for (index, pipeline) in self.pipelines.iter_mut().enumerate() {
            if pipeline.id.is_empty() {
                pipeline.id = format!("{}[{index}]", self.id);
            }
        }
    }
}

/// The blueprint of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSpecification {
    /// Root pipeline id.
    pub id: String,
    /// Opaque options.
    #[serde(default)]
    pub options: Vec<OptionDefinition>,
    /// Stage definitions.
    #[serde(default)]
    pub stages: Vec<StageDefinition>,
    /// Parallel definitions.
    #[serde(default)]
    pub parallels: Vec<ParallelDefinition>,
    /// Ordered root steps.
    #[serde(default)]
    pub steps: Vec<String>,
    /// Fail-fast flag of every container compiled from this specification.
    #[serde(default = "default_fast_fail")]
    pub fast_fail: bool,
}

impl PipelineSpecification {
    /// Creates an empty fail-fast specification.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            options: Vec::new(),
            stages: Vec::new(),
            parallels: Vec::new(),
            steps: Vec::new(),
            fast_fail: true,
        }
    }

    /// Adds a stage definition.
    #[must_use]
    pub fn with_stage(mut self, id: impl Into<String>, class_name: impl Into<String>) -> Self {
        self.stages.push(StageDefinition::new(id, class_name));
        self
    }

    /// Adds a parallel definition.
    #[must_use]
    pub fn with_parallel(mut self, parallel: ParallelDefinition) -> Self {
        self.parallels.push(parallel);
        self
    }

    /// Appends a root step.
    #[must_use]
    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.steps.push(step.into());
        self
    }

    /// Appends several root steps.
    #[must_use]
    pub fn with_steps<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps.extend(steps.into_iter().map(Into::into));
        self
    }

    /// Adds an option.
    #[must_use]
    pub fn with_option(
        mut self,
        name: impl Into<String>,
        option_type: OptionType,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.options.push(OptionDefinition {
            name: name.into(),
            option_type,
            value: value.into(),
        });
        self
    }

    /// Sets the fail-fast flag.
    #[must_use]
    pub fn with_fast_fail(mut self, fast_fail: bool) -> Self {
        self.fast_fail = fast_fail;
        self
    }

    /// Returns every pipeline nested in a parallel section.
    #[must_use]
    pub fn all_nested_pipelines(&self) -> Vec<&PipelineDefinition> {
        self.parallels.iter().flat_map(|p| p.pipelines.iter()).collect()
    }

    /// Returns every declared id: stages, parallels, nested pipelines.
    #[must_use]
    pub fn declared_ids(&self) -> Vec<&str> {
        self.stages
            .iter()
            .map(|s| s.id.as_str())
            .chain(self.parallels.iter().map(|p| p.id.as_str()))
            .chain(self.all_nested_pipelines().into_iter().map(|p| p.id.as_str()))
            .collect()
    }

    /// Assigns ids to nested pipelines declared without one.
    pub fn assign_pipeline_ids(&mut self) {
        for parallel in &mut self.parallels {
            parallel.assign_pipeline_ids();
        }
    }

    /// Looks up an option by name.
    #[must_use]
    pub fn option(&self, name: &str) -> Option<&OptionDefinition> {
        self.options.iter().find(|o| o.name == name)
    }
}
