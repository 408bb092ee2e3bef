//! Service dependency graph
//!
//! Edges point from a dependency to its dependent: a parent points at its
//! child, a pick source at the service that picks from it. Cycles are found
//! with Tarjan's SCC algorithm; every member of a cycle is reported and left
//! out of the processing order, while the rest of the graph is still sorted.
//!
//! # Example
//!
//! ```
//! use cfgraph_core::graph::{EdgeKind, ServiceGraph};
//!
//! let mut graph = ServiceGraph::new();
//! graph.add_service("root");
//! graph.add_service("api");
//! graph.add_edge("root", "api", EdgeKind::Parent);
//! graph.analyze();
//!
//! assert_eq!(graph.topological_order(), ["root", "api"]);
//! assert!(graph.cycles().is_empty());
//! ```

use std::collections::{BTreeSet, HashMap};

use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

/// Why one service depends on another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Parent,
    Pick,
}

/// A dependency edge, `from` must be processed before `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEdge {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub kind: EdgeKind,
}

/// Directed graph over service names.
#[derive(Debug, Clone, Default)]
pub struct ServiceGraph {
    graph: DiGraph<String, EdgeKind>,
    index: HashMap<String, NodeIndex>,
    cycles: Vec<Vec<String>>,
    order: Vec<String>,
}

impl ServiceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service node. Adding an existing name is a no-op.
    pub fn add_service(&mut self, name: &str) {
        if !self.index.contains_key(name) {
            let idx = self.graph.add_node(name.to_string());
            self.index.insert(name.to_string(), idx);
        }
    }

    /// Declare that `to` depends on `from`.
    ///
    /// Edges naming unknown services are ignored; missing references are
    /// reported on the service that declared them.
    pub fn add_edge(&mut self, from: &str, to: &str, kind: EdgeKind) {
        let (Some(&a), Some(&b)) = (self.index.get(from), self.index.get(to)) else {
            tracing::trace!(%from, %to, "Skipping edge to unknown service");
            return;
        };
        let exists = self
            .graph
            .edges_connecting(a, b)
            .any(|edge| *edge.weight() == kind);
        if !exists {
            self.graph.add_edge(a, b, kind);
        }
    }

    pub fn service_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn edges(&self) -> Vec<ServiceEdge> {
        self.graph
            .edge_references()
            .map(|edge| ServiceEdge {
                from: self.graph[edge.source()].clone(),
                to: self.graph[edge.target()].clone(),
                kind: *edge.weight(),
            })
            .collect()
    }

    /// Services `name` directly depends on, sorted.
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        let Some(&idx) = self.index.get(name) else {
            return Vec::new();
        };
        let deps: BTreeSet<&str> = self
            .graph
            .neighbors_directed(idx, Direction::Incoming)
            .map(|n| self.graph[n].as_str())
            .collect();
        deps.into_iter().collect()
    }

    /// Detect cycles and compute the processing order.
    pub fn analyze(&mut self) {
        self.cycles = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0]))
            .map(|scc| {
                let mut members: Vec<String> =
                    scc.into_iter().map(|idx| self.graph[idx].clone()).collect();
                members.sort();
                members
            })
            .collect();
        self.cycles.sort();

        for cycle in &self.cycles {
            tracing::warn!(members = ?cycle, "Dependency cycle detected");
        }

        self.order = self.compute_order();
    }

    /// Kahn's algorithm over the acyclic part of the graph. Ready services
    /// are taken alphabetically so the order is deterministic.
    fn compute_order(&self) -> Vec<String> {
        let cyclic = self.cycle_members();
        let live = |idx: NodeIndex| !cyclic.contains(self.graph[idx].as_str());

        let mut in_degree: HashMap<NodeIndex, usize> = HashMap::new();
        for idx in self.graph.node_indices().filter(|&i| live(i)) {
            let degree = self
                .graph
                .edges_directed(idx, Direction::Incoming)
                .filter(|edge| live(edge.source()))
                .count();
            in_degree.insert(idx, degree);
        }

        let mut ready: BTreeSet<(&str, NodeIndex)> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(&idx, _)| (self.graph[idx].as_str(), idx))
            .collect();

        let mut order = Vec::with_capacity(in_degree.len());
        while let Some(entry) = ready.pop_first() {
            let (name, idx) = entry;
            order.push(name.to_string());
            for edge in self.graph.edges_directed(idx, Direction::Outgoing) {
                let target = edge.target();
                if let Some(degree) = in_degree.get_mut(&target) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        ready.insert((self.graph[target].as_str(), target));
                    }
                }
            }
        }
        order
    }

    /// Cycles found by the last [`analyze`](Self::analyze), members sorted.
    pub fn cycles(&self) -> &[Vec<String>] {
        &self.cycles
    }

    pub fn cycle_members(&self) -> BTreeSet<&str> {
        self.cycles
            .iter()
            .flat_map(|cycle| cycle.iter().map(String::as_str))
            .collect()
    }

    /// Cycle containing `name`, if any.
    pub fn cycle_of(&self, name: &str) -> Option<&[String]> {
        self.cycles
            .iter()
            .find(|cycle| cycle.iter().any(|member| member == name))
            .map(Vec::as_slice)
    }

    /// Dependencies-first order, excluding cycle members.
    pub fn topological_order(&self) -> &[String] {
        &self.order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn graph(services: &[&str], edges: &[(&str, &str, EdgeKind)]) -> ServiceGraph {
        let mut g = ServiceGraph::new();
        for s in services {
            g.add_service(s);
        }
        for (from, to, kind) in edges {
            g.add_edge(from, to, *kind);
        }
        g.analyze();
        g
    }

    #[test]
    fn test_empty_graph() {
        let g = graph(&[], &[]);
        assert!(g.topological_order().is_empty());
        assert!(g.cycles().is_empty());
    }

    #[test]
    fn test_dependencies_come_first() {
        let g = graph(
            &["web", "api", "root", "db"],
            &[
                ("root", "api", EdgeKind::Parent),
                ("root", "web", EdgeKind::Parent),
                ("root", "db", EdgeKind::Parent),
                ("db", "api", EdgeKind::Pick),
                ("api", "web", EdgeKind::Pick),
            ],
        );
        assert_eq!(g.topological_order(), ["root", "db", "api", "web"]);
        assert_eq!(g.dependencies_of("api"), vec!["db", "root"]);
    }

    #[test]
    fn test_order_is_alphabetical_among_ready() {
        let g = graph(&["c", "a", "b"], &[]);
        assert_eq!(g.topological_order(), ["a", "b", "c"]);
    }

    #[test]
    fn test_cycle_members_are_excluded() {
        // a's parent is b, b picks from c, c picks from a
        let g = graph(
            &["a", "b", "c", "d"],
            &[
                ("b", "a", EdgeKind::Parent),
                ("c", "b", EdgeKind::Pick),
                ("a", "c", EdgeKind::Pick),
            ],
        );
        assert_eq!(g.cycles(), [vec!["a", "b", "c"]]);
        assert_eq!(g.topological_order(), ["d"]);
        assert_eq!(g.cycle_of("b").unwrap().len(), 3);
        assert!(g.cycle_of("d").is_none());
    }

    #[test]
    fn test_dependents_of_a_cycle_are_still_ordered() {
        let g = graph(
            &["a", "b", "downstream"],
            &[
                ("a", "b", EdgeKind::Pick),
                ("b", "a", EdgeKind::Pick),
                ("a", "downstream", EdgeKind::Pick),
            ],
        );
        assert_eq!(g.topological_order(), ["downstream"]);
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let g = graph(&["solo"], &[("solo", "solo", EdgeKind::Pick)]);
        assert_eq!(g.cycles(), [vec!["solo"]]);
        assert!(g.topological_order().is_empty());
    }

    #[test]
    fn test_duplicate_edges_are_collapsed() {
        let g = graph(
            &["a", "b"],
            &[
                ("a", "b", EdgeKind::Pick),
                ("a", "b", EdgeKind::Pick),
                ("a", "b", EdgeKind::Parent),
            ],
        );
        assert_eq!(g.edge_count(), 2);
    }
}
