use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use atelier_core::error::{AtelierError, Result};
use atelier_core::types::{StepDescriptor, StepKind};

use crate::graph::Graph;

/// One ordered step of an execution plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub node_id: String,
    pub name: String,
    /// Scheduling-visualization weight in milliseconds, not a timing model.
    pub estimated_cost_ms: u64,
}

/// A batch of same-level steps that may run concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelGroup {
    pub group_id: String,
    pub node_ids: Vec<String>,
}

/// The compiled, ordered, and grouped representation of a graph.
///
/// `steps` is a permutation of the graph's node set in a valid topological
/// order. `parallel_groups` holds every dependency level (> 0) with at least
/// two members; group node order follows the topological order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub steps: Vec<PlanStep>,
    pub parallel_groups: Vec<ParallelGroup>,
}

/// Pluggable per-step cost estimator.
pub trait CostModel {
    fn estimate(&self, step: &StepDescriptor) -> u64;
}

/// Default weight: Process steps get a fixed non-zero cost, everything
/// else is free.
#[derive(Debug, Clone)]
pub struct FixedCostModel {
    pub process_cost_ms: u64,
}

impl Default for FixedCostModel {
    fn default() -> Self {
        Self {
            process_cost_ms: 1000,
        }
    }
}

impl CostModel for FixedCostModel {
    fn estimate(&self, step: &StepDescriptor) -> u64 {
        match step.kind {
            StepKind::Process => self.process_cost_ms,
            _ => 0,
        }
    }
}

/// Plan a graph with the default cost model.
pub fn plan(graph: &Graph) -> Result<ExecutionPlan> {
    plan_with(graph, &FixedCostModel::default())
}

/// Plan a graph: topological order, per-step cost estimates, and parallel
/// groups. Fails with `Structural` if two nodes share an id, or with
/// `CyclicDependency` naming a node on the cycle if the graph cannot be
/// fully ordered; the graph itself is left untouched.
pub fn plan_with(graph: &Graph, costs: &dyn CostModel) -> Result<ExecutionPlan> {
    let order = topological_order(graph)?;

    let steps = order
        .iter()
        .filter_map(|id| graph.node(id))
        .map(|node| PlanStep {
            node_id: node.id.clone(),
            name: node.name.clone(),
            estimated_cost_ms: costs.estimate(node),
        })
        .collect();

    let parallel_groups = parallel_groups(graph, &order);

    debug!(
        nodes = graph.nodes.len(),
        groups = parallel_groups.len(),
        "Execution plan ready"
    );

    Ok(ExecutionPlan {
        steps,
        parallel_groups,
    })
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    /// On the current recursion stack.
    Temporary,
    Done,
}

/// Depth-first topological sort.
///
/// Revisiting a temporarily-marked node means the recursion stack contains a
/// cycle through it; the traversal fails immediately naming that node.
fn topological_order(graph: &Graph) -> Result<Vec<String>> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &graph.edges {
        adjacency.entry(&edge.from).or_default().push(&edge.to);
    }

    let mut marks: HashMap<&str, Mark> = graph
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), Mark::Unvisited))
        .collect();
    // Duplicate ids collapse in the mark table and would make the plan a
    // strict subset of the node set
    if marks.len() != graph.nodes.len() {
        return Err(AtelierError::Structural(
            "duplicate node ids in graph".to_string(),
        ));
    }
    let mut finished: Vec<String> = Vec::with_capacity(graph.nodes.len());

    fn visit<'a>(
        id: &'a str,
        adjacency: &HashMap<&str, Vec<&'a str>>,
        marks: &mut HashMap<&'a str, Mark>,
        finished: &mut Vec<String>,
    ) -> Result<()> {
        match marks.get(id).copied() {
            Some(Mark::Done) | None => return Ok(()),
            Some(Mark::Temporary) => {
                return Err(AtelierError::CyclicDependency {
                    node: id.to_string(),
                })
            }
            Some(Mark::Unvisited) => {}
        }

        marks.insert(id, Mark::Temporary);
        if let Some(next) = adjacency.get(id) {
            for to in next {
                visit(to, adjacency, marks, finished)?;
            }
        }
        marks.insert(id, Mark::Done);
        finished.push(id.to_string());
        Ok(())
    }

    for node in &graph.nodes {
        if marks.get(node.id.as_str()) == Some(&Mark::Unvisited) {
            visit(&node.id, &adjacency, &mut marks, &mut finished)?;
        }
    }

    // Nodes finish after everything downstream of them, so reversing the
    // finish order places each node after all of its dependencies.
    finished.reverse();
    Ok(finished)
}

/// Assign each node its longest-path level from a root and group levels
/// holding more than one node.
///
/// Levels start at -1 (unassigned). Start-kind roots seed level 0; roots of
/// other kinds seed level 1 so graphs without an explicit start node still
/// partition (and never land in the never-grouped root level). Edge
/// relaxation runs at most once per node, which reaches the fixed point for
/// any acyclic graph.
fn parallel_groups(graph: &Graph, order: &[String]) -> Vec<ParallelGroup> {
    let mut levels: HashMap<&str, i64> =
        graph.nodes.iter().map(|n| (n.id.as_str(), -1)).collect();

    for node in &graph.nodes {
        let is_root = !graph.edges.iter().any(|e| e.to == node.id);
        if is_root {
            let seed = if node.kind == StepKind::Start { 0 } else { 1 };
            levels.insert(&node.id, seed);
        }
    }

    for _ in 0..graph.nodes.len() {
        let mut changed = false;
        for edge in &graph.edges {
            let from = levels.get(edge.from.as_str()).copied().unwrap_or(-1);
            let to = levels.get(edge.to.as_str()).copied().unwrap_or(-1);
            if from != -1 && (to == -1 || to < from + 1) {
                levels.insert(&edge.to, from + 1);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let mut by_level: HashMap<i64, Vec<String>> = HashMap::new();
    // Walk the topological order so group members keep a deterministic,
    // dependency-respecting order.
    for id in order {
        // Start nodes are entry points, never batch members, regardless of
        // where relaxation places them.
        let is_start = graph
            .node(id)
            .map(|n| n.kind == StepKind::Start)
            .unwrap_or(false);
        if is_start {
            continue;
        }
        if let Some(level) = levels.get(id.as_str()).copied() {
            if level > 0 {
                by_level.entry(level).or_default().push(id.clone());
            }
        }
    }

    let mut grouped: Vec<(i64, Vec<String>)> = by_level
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .collect();
    grouped.sort_by_key(|(level, _)| *level);

    grouped
        .into_iter()
        .map(|(level, node_ids)| ParallelGroup {
            group_id: format!("parallel_group_{}", level),
            node_ids,
        })
        .collect()
}
