//! Id-labelled execution graph for renderers.

use super::dag::IdGraph;
use super::sequence::Pipeline;
use crate::context::ExecutionContext;
use crate::core::ExecutionEvent;
use crate::node::{Node, NodeKind};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// What a vertex of the execution graph stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VertexKind {
    /// Entry marker of a pipeline.
    PipelineStart,
    /// Exit marker of a pipeline.
    PipelineEnd,
    /// Fork marker of a parallel section.
    ParallelStart,
    /// Join marker of a parallel section.
    ParallelEnd,
    /// A leaf node.
    Stage,
}

/// A vertex of the execution graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphVertex {
    /// The unique vertex label.
    pub label: String,
    /// The id of the node whose events drive this vertex.
    pub node_id: String,
    /// What the vertex stands for.
    pub kind: VertexKind,
}

/// The structure a renderer needs: labelled vertices, edges, and a join with
/// the latest event of each node.
#[derive(Debug, Clone, Default)]
pub struct ExecutionGraph {
    dag: IdGraph,
    vertices: HashMap<String, GraphVertex>,
}

impl ExecutionGraph {
    /// Builds the graph of `pipeline` as it is now.
    #[must_use]
    pub fn build(pipeline: &Pipeline) -> Self {
        let mut graph = Self::default();
        let mut path = HashSet::new();
        graph.add_node(pipeline.node(), &mut path);
        graph
    }

    fn add_vertex(&mut self, label: String, node_id: &str, kind: VertexKind) -> String {
        self.dag.add_vertex(label.clone());
        self.vertices.entry(label.clone()).or_insert_with(|| GraphVertex {
            label: label.clone(),
            node_id: node_id.to_string(),
            kind,
        });
        label
    }

    /// Adds `node` and returns its entry and exit labels.
    fn add_node(&mut self, node: &Arc<Node>, path: &mut HashSet<*const Node>) -> (String, String) {
        let id = node.id();
        let ptr = Arc::as_ptr(node);
        if !path.insert(ptr) {
            let label = self.add_vertex(id.to_string(), id, VertexKind::Stage);
            return (label.clone(), label);
        }

        let bounds = match node.kind() {
            NodeKind::Stage(_) => {
                let label = self.add_vertex(id.to_string(), id, VertexKind::Stage);
                (label.clone(), label)
            }
            NodeKind::Pipeline(state) => {
                let start = self.add_vertex(format!("{id} - [Pipeline Start]"), id, VertexKind::PipelineStart);
                let end = self.add_vertex(format!("{id} - [Pipeline End]"), id, VertexKind::PipelineEnd);
                let mut previous = start.clone();
                for child in state.children() {
                    let (entry, exit) = self.add_node(&child, path);
                    self.dag.add_edge(previous, entry);
                    previous = exit;
                }
                self.dag.add_edge(previous, end.clone());
                (start, end)
            }
            NodeKind::Parallel(state) => {
                let fork = self.add_vertex(format!("{id} - <Parallel>"), id, VertexKind::ParallelStart);
                let join = self.add_vertex(format!("{id} - </Parallel>"), id, VertexKind::ParallelEnd);
                let children = state.children();
                if children.is_empty() {
                    self.dag.add_edge(fork.clone(), join.clone());
                }
                for child in children {
                    let (entry, exit) = self.add_node(&child, path);
                    self.dag.add_edge(fork.clone(), entry);
                    self.dag.add_edge(exit, join.clone());
                }
                (fork, join)
            }
        };

        path.remove(&ptr);
        bounds
    }

    /// Returns the underlying graph.
    #[must_use]
    pub fn dag(&self) -> &IdGraph {
        &self.dag
    }

    /// Returns the vertices in insertion order.
    #[must_use]
    pub fn vertices(&self) -> Vec<&GraphVertex> {
        self.dag
            .vertices()
            .into_iter()
            .filter_map(|label| self.vertices.get(label))
            .collect()
    }

    /// Returns a vertex by label.
    #[must_use]
    pub fn vertex(&self, label: &str) -> Option<&GraphVertex> {
        self.vertices.get(label)
    }

    /// Returns every edge as `(from, to)` labels.
    #[must_use]
    pub fn edges(&self) -> Vec<(&str, &str)> {
        self.dag.edges()
    }

    /// Joins every vertex with the latest event of its node.
    #[must_use]
    pub fn latest_events(&self, ctx: &ExecutionContext) -> Vec<(GraphVertex, Option<ExecutionEvent>)> {
        self.vertices()
            .into_iter()
            .map(|vertex| (vertex.clone(), ctx.last_stage_event(&vertex.node_id)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EventType;
    use crate::pipeline::Parallel;
    use crate::stages::NoOpStage;
    use pretty_assertions::assert_eq;

    fn sample() -> Pipeline {
        let root = Pipeline::new("root", true);
        let branch = Pipeline::new("branch", true);
        branch.add_stage("b1", Arc::new(NoOpStage));
        let parallel = Parallel::new("par", true, 2);
        parallel.add_pipeline(&branch).unwrap();
        root.add_stage("a", Arc::new(NoOpStage))
            .add_parallel(&parallel)
            .add_stage("z", Arc::new(NoOpStage));
        root
    }

    #[test]
    fn test_markers_and_edges() {
        let graph = sample().graph();

        assert_eq!(
            graph.edges(),
            vec![
                ("root - [Pipeline Start]", "a"),
                ("branch - [Pipeline Start]", "b1"),
                ("b1", "branch - [Pipeline End]"),
                ("par - <Parallel>", "branch - [Pipeline Start]"),
                ("branch - [Pipeline End]", "par - </Parallel>"),
                ("a", "par - <Parallel>"),
                ("par - </Parallel>", "z"),
                ("z", "root - [Pipeline End]"),
            ]
        );
        assert_eq!(graph.vertex("par - <Parallel>").unwrap().kind, VertexKind::ParallelStart);
        assert!(graph.dag().find_cycle().is_none());
    }

    #[tokio::test]
    async fn test_latest_events() {
        let pipeline = sample();
        let ctx = pipeline.run_new().await;
        let graph = pipeline.graph();

        let latest: HashMap<String, Option<EventType>> = graph
            .latest_events(&ctx)
            .into_iter()
            .map(|(v, e)| (v.label, e.map(|e| e.event_type)))
            .collect();

        assert_eq!(latest["a"], Some(EventType::CalledStage));
        assert_eq!(latest["root - [Pipeline End]"], Some(EventType::Success));
        assert_eq!(latest["par - </Parallel>"], Some(EventType::CalledStage));
    }

    #[test]
    fn test_self_reference_does_not_recurse_forever() {
        let root = Pipeline::new("root", true);
        let inner = Pipeline::new("inner", true);
        root.add_pipeline(&inner);
        inner.add_pipeline(&root);

        let graph = root.graph();
        assert!(graph.vertex("inner - [Pipeline Start]").is_some());
        assert!(graph.vertex("root").is_some());
    }
}
