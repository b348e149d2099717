//! Pipeline building and execution.
//!
//! This module provides:
//! - Sequential pipelines ordered by an id DAG
//! - Parallel sections running child pipelines on a bounded worker pool
//! - Detached root runs
//! - The id-labelled execution graph used by renderers

mod dag;
mod detached;
mod graph;
mod parallel;
mod pool;
mod sequence;

pub use dag::IdGraph;
pub use detached::DetachedRun;
pub use graph::{ExecutionGraph, GraphVertex, VertexKind};
pub use parallel::{Parallel, ParallelState};
pub use pool::WorkerPool;
pub use sequence::{Pipeline, PipelineState};

pub(crate) use parallel::execute_parallel;
pub(crate) use sequence::execute_sequence;
