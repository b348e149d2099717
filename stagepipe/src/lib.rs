//! # Stagepipe
//!
//! Specification-driven pipeline orchestration.
//!
//! Stagepipe runs units of work ([`Stage`](stages::Stage)s) as a graph:
//!
//! - **Pipelines** run their children one after another, in the topological
//!   order of an id DAG
//! - **Parallel sections** run child pipelines concurrently on a bounded
//!   worker pool
//! - **Execution contexts** carry a key/value store, a status and an
//!   append-only event log through a run
//! - **Specifications** describe a graph declaratively; the compiler
//!   validates them, rejects cycles and instantiates stages from a registry
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stagepipe::prelude::*;
//! use std::sync::Arc;
//!
//! let registry = StageRegistry::new();
//! registry.register_default::<NoOpStage>("Noop");
//!
//! let spec = PipelineSpecification::new("hello")
//!     .with_stage("a", "Noop")
//!     .with_stage("b", "Noop")
//!     .with_steps(["a", "b"]);
//!
//! let pipeline = PipelineCompiler::new(Arc::new(registry)).compile(&spec)?;
//! let ctx = pipeline.run_new().await;
//! assert!(ctx.is_success());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod node;
pub mod observability;
pub mod pipeline;
pub mod spec;
pub mod stages;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::context::ExecutionContext;
    pub use crate::core::{EventType, ExecutionEvent, ExecutionStatus};
    pub use crate::errors::{
        CompilationError, CycleDetectedError, PipelineError, SpecValidationError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::node::{CallbackEvent, Node, NodeRunner, StageCallback};
    pub use crate::pipeline::{DetachedRun, Parallel, Pipeline};
    pub use crate::spec::{
        ParallelDefinition, PipelineCompiler, PipelineSpecification, StageRegistry,
    };
    pub use crate::stages::{FnStage, NoOpStage, Stage, StageBuilder};
}
