//! Id-keyed directed graphs with cycle detection and topological ordering.

use crate::errors::CycleDetectedError;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap, HashSet};

/// A directed graph whose vertices are unique string ids.
///
/// Adding the same id twice yields the same vertex, so a repeated id in a
/// chain closes a cycle.
#[derive(Debug, Clone, Default)]
pub struct IdGraph {
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
}

impl IdGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a chain `ids[0] -> ids[1] -> ...` in list order.
    #[must_use]
    pub fn chain<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut graph = Self::new();
        let mut previous: Option<NodeIndex> = None;
        for id in ids {
            let current = graph.add_vertex(id);
            if let Some(prev) = previous {
                graph.graph.add_edge(prev, current, ());
            }
            previous = Some(current);
        }
        graph
    }

    /// Adds a vertex, returning the existing index if the id is known.
    pub fn add_vertex(&mut self, id: impl Into<String>) -> NodeIndex {
        let id = id.into();
        if let Some(&idx) = self.index.get(&id) {
            return idx;
        }
        let idx = self.graph.add_node(id.clone());
        self.index.insert(id, idx);
        idx
    }

    /// Adds an edge between two ids, creating missing vertices.
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) {
        let from = self.add_vertex(from);
        let to = self.add_vertex(to);
        self.graph.update_edge(from, to, ());
    }

    /// Returns true if the id is a vertex.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Returns the number of vertices.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns the vertex ids in insertion order.
    #[must_use]
    pub fn vertices(&self) -> Vec<&str> {
        self.graph.node_indices().map(|i| self.graph[i].as_str()).collect()
    }

    /// Returns the ids `id` has an edge to, in insertion order.
    #[must_use]
    pub fn successors(&self, id: &str) -> Vec<&str> {
        self.index.get(id).map_or_else(Vec::new, |&idx| {
            self.sorted_neighbors(idx)
                .into_iter()
                .map(|n| self.graph[n].as_str())
                .collect()
        })
    }

    /// Returns every edge as `(from, to)`.
    #[must_use]
    pub fn edges(&self) -> Vec<(&str, &str)> {
        self.graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(a, b)| (self.graph[a].as_str(), self.graph[b].as_str()))
            .collect()
    }

    fn sorted_neighbors(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut neighbors: Vec<NodeIndex> = self.graph.neighbors(idx).collect();
        neighbors.sort_unstable();
        neighbors.dedup();
        neighbors
    }

    /// Finds a cycle, returning its path with the first id repeated at the
    /// end (`a -> b -> a`). A self-edge yields `a -> a`.
    #[must_use]
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for idx in self.graph.node_indices() {
            if !visited.contains(&idx) {
                if let Some(cycle) = self.dfs_cycle(idx, &mut visited, &mut rec_stack, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn dfs_cycle(
        &self,
        node: NodeIndex,
        visited: &mut HashSet<NodeIndex>,
        rec_stack: &mut HashSet<NodeIndex>,
        path: &mut Vec<NodeIndex>,
    ) -> Option<Vec<String>> {
        visited.insert(node);
        rec_stack.insert(node);
        path.push(node);

        for next in self.sorted_neighbors(node) {
            if !visited.contains(&next) {
                if let Some(cycle) = self.dfs_cycle(next, visited, rec_stack, path) {
                    return Some(cycle);
                }
            } else if rec_stack.contains(&next) {
                let start = path.iter().position(|&n| n == next).unwrap_or(0);
                let mut cycle: Vec<String> =
                    path[start..].iter().map(|&n| self.graph[n].clone()).collect();
                cycle.push(self.graph[next].clone());
                return Some(cycle);
            }
        }

        path.pop();
        rec_stack.remove(&node);
        None
    }

    /// Checks the graph is acyclic.
    ///
    /// # Errors
    ///
    /// Returns the first cycle found.
    pub fn ensure_acyclic(&self) -> Result<(), CycleDetectedError> {
        self.find_cycle().map_or(Ok(()), |cycle| Err(CycleDetectedError::new(cycle)))
    }

    /// Computes a topological order with Kahn's algorithm.
    ///
    /// Ties are broken by insertion order, so a chain yields its list order.
    ///
    /// # Errors
    ///
    /// Returns the cycle that prevents ordering.
    pub fn topological_order(&self) -> Result<Vec<String>, CycleDetectedError> {
        self.ensure_acyclic()?;

        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|idx| {
                let degree = self
                    .graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .collect::<HashSet<_>>()
                    .len();
                (idx, degree)
            })
            .collect();

        let mut ready: BTreeSet<NodeIndex> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(&idx, _)| idx)
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(idx) = ready.pop_first() {
            order.push(self.graph[idx].clone());
            for next in self.sorted_neighbors(idx) {
                if let Some(degree) = in_degree.get_mut(&next) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(next);
                    }
                }
            }
        }
        Ok(order)
    }
}
