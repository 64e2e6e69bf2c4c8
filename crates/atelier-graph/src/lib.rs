//! Task-graph compilation pipeline — brief → steps → DAG → execution plan.
//!
//! A `Brief` maps deterministically to a set of `StepDescriptor`s (builder),
//! which compile structurally into a `Graph` of nodes and derived edges
//! (graph). The planner topologically orders the graph, rejects cycles,
//! weighs steps with a pluggable `CostModel`, and batches independent
//! same-level steps into `ParallelGroup`s. `mermaid` renders a compiled
//! graph as a reproducible diagnostic diagram.

pub mod builder;
pub mod graph;
pub mod mermaid;
pub mod planner;

pub use builder::{build_steps, Brief};
pub use graph::{Edge, Graph};
pub use planner::{plan, plan_with, CostModel, ExecutionPlan, FixedCostModel, ParallelGroup, PlanStep};
