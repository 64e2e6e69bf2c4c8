use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{Duration, Utc};
use tracing::{debug, warn};

use atelier_core::types::{Checkpoint, Task, TaskId, TaskStatus};

/// Sole owner and mutator of task state.
///
/// Constructed once at process start and passed by `Arc` handle; the
/// registry lock serializes all mutations while readers get cloned
/// snapshots. Illegal status transitions are rejected silently by returning
/// `None` — callers must check the return value.
pub struct TaskStore {
    tasks: RwLock<HashMap<String, Task>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Create a new Pending task and return a snapshot of it.
    pub fn create(
        &self,
        task_type: impl Into<String>,
        params: serde_json::Value,
        session_id: Option<String>,
    ) -> Task {
        let now = Utc::now();
        let task = Task {
            id: TaskId::new(),
            task_type: task_type.into(),
            params,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            session_id,
            created_at: now,
            updated_at: now,
            checkpoints: vec![],
        };

        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        tasks.insert(task.id.0.clone(), task.clone());
        debug!(task_id = %task.id, task_type = %task.task_type, "Task created");
        task
    }

    /// Snapshot a task by id.
    pub fn get(&self, id: &TaskId) -> Option<Task> {
        let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        tasks.get(&id.0).cloned()
    }

    /// Snapshot every task sharing a session id.
    pub fn session_tasks(&self, session_id: &str) -> Vec<Task> {
        let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        tasks
            .values()
            .filter(|t| t.session_id.as_deref() == Some(session_id))
            .cloned()
            .collect()
    }

    /// Apply a status transition.
    ///
    /// Legal transitions: Pending→Processing, Processing→Completed (with
    /// result), Processing→Failed (with error), any non-terminal→Cancelled.
    /// Unknown ids and illegal transitions return `None` without mutating
    /// anything; a task observes at most one terminal status, ever.
    pub fn update_status(
        &self,
        id: &TaskId,
        status: TaskStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Option<Task> {
        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        let task = tasks.get_mut(&id.0)?;

        let legal = match (task.status, status) {
            (TaskStatus::Pending, TaskStatus::Processing) => true,
            (TaskStatus::Processing, TaskStatus::Completed) => true,
            (TaskStatus::Processing, TaskStatus::Failed) => true,
            (from, TaskStatus::Cancelled) => !from.is_terminal(),
            _ => false,
        };
        if !legal {
            warn!(task_id = %id, from = %task.status, to = %status, "Rejected status transition");
            return None;
        }

        task.status = status;
        task.updated_at = Utc::now();
        if status == TaskStatus::Completed {
            task.result = result;
        }
        if status == TaskStatus::Failed {
            task.error = error;
        }

        debug!(task_id = %id, status = %status, "Task status updated");
        Some(task.clone())
    }

    /// Append a checkpoint to a task's audit trail.
    ///
    /// Appends unconditionally regardless of status — the trail stays
    /// writable after a terminal transition so late collaborator results are
    /// still auditable. `None` only for unknown ids (a tolerated no-op).
    pub fn add_checkpoint(
        &self,
        id: &TaskId,
        step: impl Into<String>,
        data: serde_json::Value,
    ) -> Option<Task> {
        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        let task = tasks.get_mut(&id.0)?;

        task.checkpoints.push(Checkpoint {
            step: step.into(),
            timestamp: Utc::now(),
            data,
        });
        task.updated_at = Utc::now();
        Some(task.clone())
    }

    /// Remove a task outright. Returns whether it existed.
    pub fn remove(&self, id: &TaskId) -> bool {
        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        tasks.remove(&id.0).is_some()
    }

    /// Delete tasks untouched for longer than `max_age`.
    /// Returns the number removed.
    pub fn sweep(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        let before = tasks.len();
        tasks.retain(|_, t| t.updated_at >= cutoff);
        let removed = before - tasks.len();
        if removed > 0 {
            debug!(removed, "Swept expired tasks");
        }
        removed
    }

    /// Number of tasks currently held.
    pub fn len(&self) -> usize {
        self.tasks.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}
