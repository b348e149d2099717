//! Declarative pipeline specifications.
//!
//! A [`PipelineSpecification`] names stages by registered type, groups
//! pipelines under parallel sections and lists the root steps. The
//! [`PipelineCompiler`] validates it, rejects cycles and builds a runnable
//! [`Pipeline`](crate::pipeline::Pipeline) with fresh stage instances.

mod compiler;
mod model;
mod registry;
mod validator;

pub use compiler::{check_acyclic, PipelineCompiler};
pub use model::{
    OptionDefinition, OptionType, ParallelDefinition, PipelineDefinition, PipelineSpecification,
    StageDefinition,
};
pub use registry::StageRegistry;
pub use validator::SpecValidator;
