use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use atelier_core::types::StepDescriptor;

/// A directed edge from a dependency to its dependent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// A compiled task graph.
///
/// Nodes keep declaration order (not execution order); edges are derived
/// deterministically from declared dependencies, one per
/// `(dependency, node.id)` pair. Compilation is purely structural and always
/// succeeds — cycle detection belongs to the planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<StepDescriptor>,
    pub edges: Vec<Edge>,
}

impl Graph {
    /// Compile a step set into a graph.
    ///
    /// Self-references and dependencies on undeclared ids produce no edge
    /// (logged, not fatal), so every retained edge endpoint exists in
    /// `nodes` and no edge is duplicated.
    pub fn compile(nodes: Vec<StepDescriptor>) -> Self {
        let known: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut edges = Vec::new();

        for node in &nodes {
            for dep in &node.dependencies {
                if dep == &node.id {
                    warn!(node = %node.id, "Dropping self-dependency");
                    continue;
                }
                if !known.contains(dep.as_str()) {
                    warn!(node = %node.id, dependency = %dep, "Dropping edge from undeclared dependency");
                    continue;
                }
                if seen.insert((dep.clone(), node.id.clone())) {
                    edges.push(Edge::new(dep.clone(), node.id.clone()));
                }
            }
        }

        Self { nodes, edges }
    }

    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&StepDescriptor> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Edges leaving the given node.
    pub fn outgoing<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.from == id)
    }
}
