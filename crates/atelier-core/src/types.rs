use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique task identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of a node in the step graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Start,
    End,
    Process,
    Decision,
    Parallel,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepKind::Start => "start",
            StepKind::End => "end",
            StepKind::Process => "process",
            StepKind::Decision => "decision",
            StepKind::Parallel => "parallel",
        };
        write!(f, "{}", s)
    }
}

/// One unit of work in the task graph.
///
/// Descriptors are produced by the graph builder and immutable afterwards.
/// Dependencies reference other descriptor ids declared in the same set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDescriptor {
    /// Unique identifier within the step set.
    pub id: String,
    /// Node kind (shapes planning and cost estimation).
    pub kind: StepKind,
    /// Human-readable name.
    pub name: String,
    /// Optional longer description.
    #[serde(default)]
    pub description: Option<String>,
    /// Ids of steps that must complete before this one.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl StepDescriptor {
    /// Create a new descriptor with no dependencies.
    pub fn new(id: impl Into<String>, kind: StepKind, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            name: name.into(),
            description: None,
            dependencies: vec![],
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the dependency list.
    pub fn with_dependencies(mut self, deps: Vec<String>) -> Self {
        self.dependencies = deps;
        self
    }

    /// Convenience for a single dependency.
    pub fn depends_on(mut self, dep: impl Into<String>) -> Self {
        self.dependencies.push(dep.into());
        self
    }
}

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Terminal statuses can never be left.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// An immutable, timestamped audit record of task progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Step label (node id, or a derived marker like `{id}_completed`).
    pub step: String,
    /// When the checkpoint was appended.
    pub timestamp: DateTime<Utc>,
    /// Arbitrary snapshot payload.
    pub data: serde_json::Value,
}

/// A unit of submitted work with its full audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Task family discriminator (e.g. "logo", "code").
    pub task_type: String,
    /// Opaque submission payload.
    pub params: serde_json::Value,
    pub status: TaskStatus,
    /// Set only when the task completes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Set only when the task fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Optional correlation key for grouping tasks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Append-only progress log.
    #[serde(default)]
    pub checkpoints: Vec<Checkpoint>,
}

/// Payload published to the notifier when a task reaches a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub task_id: TaskId,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Final outcome of a workflow execution, as observed by the executor.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub task_id: TaskId,
    pub status: TaskStatus,
    /// Number of plan steps that were invoked (including a failing one).
    pub steps_run: usize,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// Live status event published on the event bus.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// Task accepted and queued for execution.
    TaskCreated { task_id: TaskId, task_type: String },
    /// A plan step started executing.
    StepStarted { task_id: TaskId, node_id: String },
    /// A plan step finished and its delta was merged.
    StepCompleted { task_id: TaskId, node_id: String },
    /// Task reached Completed.
    TaskCompleted { task_id: TaskId },
    /// Task reached Failed.
    TaskFailed { task_id: TaskId, error: String },
    /// Task was cancelled before finishing.
    TaskCancelled { task_id: TaskId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_unique() {
        let a = TaskId::new();
        let b = TaskId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_step_descriptor_builder() {
        let step = StepDescriptor::new("analyze_brief", StepKind::Process, "Analyze brief")
            .with_description("Analyze the design brief")
            .depends_on("start");

        assert_eq!(step.id, "analyze_brief");
        assert_eq!(step.kind, StepKind::Process);
        assert_eq!(step.dependencies, vec!["start"]);
        assert!(step.description.is_some());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_step_kind_serde() {
        let json = serde_json::to_string(&StepKind::Start).unwrap();
        assert_eq!(json, "\"start\"");
        let kind: StepKind = serde_json::from_str("\"process\"").unwrap();
        assert_eq!(kind, StepKind::Process);
    }
}
