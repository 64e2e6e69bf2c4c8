use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use atelier_core::error::{AtelierError, Result};
use atelier_core::event::EventBus;
use atelier_core::state::WorkState;
use atelier_core::traits::{Notifier, StepExecutor};
use atelier_core::types::{StepKind, TaskEvent, TaskId, TaskOutcome, TaskStatus, TaskUpdate};
use atelier_graph::{ExecutionPlan, Graph};
use atelier_store::TaskStore;

/// Drives a compiled plan against the step executor collaborator.
///
/// Steps run sequentially in the plan's topological order; parallel groups
/// are informational for callers and visualizers. Each step boundary appends
/// a checkpoint, each returned delta merges into the running state (last
/// writer wins per key), and the first failure ends the task as Failed
/// without touching the remaining steps.
pub struct WorkflowExecutor {
    store: Arc<TaskStore>,
    steps: Arc<dyn StepExecutor>,
    notifier: Arc<dyn Notifier>,
    events: Arc<EventBus>,
}

impl WorkflowExecutor {
    pub fn new(
        store: Arc<TaskStore>,
        steps: Arc<dyn StepExecutor>,
        notifier: Arc<dyn Notifier>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            steps,
            notifier,
            events,
        }
    }

    /// Execute a plan for an already-created task.
    ///
    /// Cancellation is observed between steps, never mid-step; a cancelled
    /// run stops advancing without marking Completed or Failed. The notifier
    /// is published exactly once, for Completed and Failed outcomes only.
    pub async fn execute(
        &self,
        task_id: &TaskId,
        graph: &Graph,
        plan: &ExecutionPlan,
        initial_state: WorkState,
        cancel: CancellationToken,
    ) -> Result<TaskOutcome> {
        if self
            .store
            .update_status(task_id, TaskStatus::Processing, None, None)
            .is_none()
        {
            // Rejected: either the task never existed, or it went terminal
            // (e.g. cancelled) before execution started.
            return match self.store.get(task_id) {
                None => Err(AtelierError::UnknownTask(task_id.to_string())),
                Some(task) => {
                    debug!(task_id = %task_id, status = %task.status, "Skipping execution, task already settled");
                    Ok(TaskOutcome {
                        task_id: task_id.clone(),
                        status: task.status,
                        steps_run: 0,
                        result: None,
                        error: None,
                    })
                }
            };
        }

        info!(task_id = %task_id, steps = plan.steps.len(), "Workflow started");

        let mut state = initial_state;
        let mut steps_run = 0;

        for step in &plan.steps {
            if self.cancelled(task_id, &cancel) {
                debug!(task_id = %task_id, node_id = %step.node_id, "Workflow cancelled between steps");
                return Ok(TaskOutcome {
                    task_id: task_id.clone(),
                    status: TaskStatus::Cancelled,
                    steps_run,
                    result: None,
                    error: None,
                });
            }

            // Pre-step checkpoint records the state the step will observe
            self.store.add_checkpoint(
                task_id,
                step.node_id.clone(),
                serde_json::json!({ "state": state.to_json() }),
            );
            self.events.publish(TaskEvent::StepStarted {
                task_id: task_id.clone(),
                node_id: step.node_id.clone(),
            });

            let kind = graph
                .node(&step.node_id)
                .map(|n| n.kind)
                .unwrap_or(StepKind::Process);

            debug!(task_id = %task_id, node_id = %step.node_id, kind = %kind, "Executing step");
            steps_run += 1;

            match self.steps.invoke(kind, &step.name, &state).await {
                Ok(delta) => {
                    self.store.add_checkpoint(
                        task_id,
                        format!("{}_completed", step.node_id),
                        serde_json::json!({
                            "delta": serde_json::to_value(&delta).unwrap_or(serde_json::Value::Null)
                        }),
                    );
                    state.merge(delta);
                    self.events.publish(TaskEvent::StepCompleted {
                        task_id: task_id.clone(),
                        node_id: step.node_id.clone(),
                    });
                }
                Err(e) => {
                    let message = e.to_string();
                    error!(task_id = %task_id, node_id = %step.node_id, error = %message, "Step failed");

                    self.store.add_checkpoint(
                        task_id,
                        "workflow_failed",
                        serde_json::json!({ "node_id": step.node_id, "error": message }),
                    );
                    self.store.update_status(
                        task_id,
                        TaskStatus::Failed,
                        None,
                        Some(message.clone()),
                    );
                    self.events.publish(TaskEvent::TaskFailed {
                        task_id: task_id.clone(),
                        error: message.clone(),
                    });
                    self.notify(TaskUpdate {
                        task_id: task_id.clone(),
                        status: TaskStatus::Failed,
                        result: None,
                        error: Some(message.clone()),
                    })
                    .await;

                    return Ok(TaskOutcome {
                        task_id: task_id.clone(),
                        status: TaskStatus::Failed,
                        steps_run,
                        result: None,
                        error: Some(message),
                    });
                }
            }
        }

        let result = state.to_json();
        self.store
            .update_status(task_id, TaskStatus::Completed, Some(result.clone()), None);
        info!(task_id = %task_id, steps_run, "Workflow completed");

        self.events.publish(TaskEvent::TaskCompleted {
            task_id: task_id.clone(),
        });
        self.notify(TaskUpdate {
            task_id: task_id.clone(),
            status: TaskStatus::Completed,
            result: Some(result.clone()),
            error: None,
        })
        .await;

        Ok(TaskOutcome {
            task_id: task_id.clone(),
            status: TaskStatus::Completed,
            steps_run,
            result: Some(result),
            error: None,
        })
    }

    /// A run is cancelled if its token fired or an external caller already
    /// moved the task to Cancelled in the store.
    fn cancelled(&self, task_id: &TaskId, cancel: &CancellationToken) -> bool {
        cancel.is_cancelled()
            || matches!(
                self.store.get(task_id).map(|t| t.status),
                Some(TaskStatus::Cancelled)
            )
    }

    /// Best-effort publish: a notifier failure never fails the task.
    async fn notify(&self, update: TaskUpdate) {
        let task_id = update.task_id.clone();
        if let Err(e) = self.notifier.publish(update).await {
            warn!(task_id = %task_id, error = %e, "Notifier publish failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_graph::{build_steps, plan, Brief};
    use atelier_test_utils::{RecordingNotifier, ScriptedStepExecutor};

    struct Harness {
        store: Arc<TaskStore>,
        exec: Arc<ScriptedStepExecutor>,
        notifier: Arc<RecordingNotifier>,
        executor: WorkflowExecutor,
    }

    fn harness(exec: ScriptedStepExecutor, notifier: RecordingNotifier) -> Harness {
        let store = Arc::new(TaskStore::new());
        let exec = Arc::new(exec);
        let notifier = Arc::new(notifier);
        let executor = WorkflowExecutor::new(
            store.clone(),
            exec.clone(),
            notifier.clone(),
            Arc::new(EventBus::default()),
        );
        Harness {
            store,
            exec,
            notifier,
            executor,
        }
    }

    fn logo_plan() -> (Graph, ExecutionPlan) {
        let graph = Graph::compile(build_steps(&Brief::new("logo")));
        let plan = plan(&graph).unwrap();
        (graph, plan)
    }

    #[tokio::test]
    async fn test_full_run_completes() {
        let h = harness(ScriptedStepExecutor::new(), RecordingNotifier::new());
        let (graph, plan) = logo_plan();
        let task = h.store.create("logo", serde_json::json!({}), None);

        let outcome = h
            .executor
            .execute(
                &task.id,
                &graph,
                &plan,
                WorkState::new(),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, TaskStatus::Completed);
        assert_eq!(outcome.steps_run, 6);

        let task = h.store.get(&task.id).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        // Every step leaves a pre and a post checkpoint
        assert_eq!(task.checkpoints.len(), 12);
        // Result accumulates all deltas
        let result = task.result.unwrap();
        assert_eq!(result["Analyze brief_done"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn test_failure_stops_and_notifies_once() {
        // Third plan step of the logo chain is "generate_concepts"
        let h = harness(
            ScriptedStepExecutor::new().failing_on("Generate concepts"),
            RecordingNotifier::new(),
        );
        let (graph, plan) = logo_plan();
        let task = h.store.create("logo", serde_json::json!({}), None);

        let outcome = h
            .executor
            .execute(
                &task.id,
                &graph,
                &plan,
                WorkState::new(),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, TaskStatus::Failed);
        assert_eq!(outcome.steps_run, 3);

        let task = h.store.get(&task.id).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.error.as_deref().unwrap().contains("Generate concepts"));

        // Steps 1-2: pre and post. Step 3: pre only. Steps 4-5: nothing.
        let steps: Vec<&str> = task.checkpoints.iter().map(|c| c.step.as_str()).collect();
        assert_eq!(
            steps,
            vec![
                "start",
                "start_completed",
                "analyze_brief",
                "analyze_brief_completed",
                "generate_concepts",
                "workflow_failed",
            ]
        );
        assert_eq!(h.exec.invoked_names().len(), 3);

        let published = h.notifier.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].status, TaskStatus::Failed);
        assert!(published[0].error.is_some());
    }

    #[tokio::test]
    async fn test_completion_notifies_once_with_result() {
        let h = harness(ScriptedStepExecutor::new(), RecordingNotifier::new());
        let (graph, plan) = logo_plan();
        let task = h.store.create("logo", serde_json::json!({}), None);

        h.executor
            .execute(
                &task.id,
                &graph,
                &plan,
                WorkState::new(),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let published = h.notifier.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].status, TaskStatus::Completed);
        assert!(published[0].result.is_some());
    }

    #[tokio::test]
    async fn test_notifier_failure_does_not_fail_task() {
        let h = harness(ScriptedStepExecutor::new(), RecordingNotifier::failing());
        let (graph, plan) = logo_plan();
        let task = h.store.create("logo", serde_json::json!({}), None);

        let outcome = h
            .executor
            .execute(
                &task.id,
                &graph,
                &plan,
                WorkState::new(),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, TaskStatus::Completed);
        assert_eq!(h.store.get(&task.id).unwrap().status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_cancelled_token_before_start() {
        let h = harness(ScriptedStepExecutor::new(), RecordingNotifier::new());
        let (graph, plan) = logo_plan();
        let task = h.store.create("logo", serde_json::json!({}), None);

        let token = CancellationToken::new();
        token.cancel();

        let outcome = h
            .executor
            .execute(&task.id, &graph, &plan, WorkState::new(), token)
            .await
            .unwrap();

        assert_eq!(outcome.status, TaskStatus::Cancelled);
        assert_eq!(outcome.steps_run, 0);
        assert!(h.exec.invoked_names().is_empty());
        // Cancellation marks neither Completed nor Failed and stays silent
        assert_eq!(h.store.get(&task.id).unwrap().status, TaskStatus::Processing);
        assert!(h.notifier.published().is_empty());
    }

    #[tokio::test]
    async fn test_store_cancellation_observed_between_steps() {
        let h = harness(ScriptedStepExecutor::new(), RecordingNotifier::new());
        let (graph, plan) = logo_plan();
        let task = h.store.create("logo", serde_json::json!({}), None);

        // External cancel lands after the task was created but before the
        // run starts: Processing transition is rejected, execution skipped.
        h.store
            .update_status(&task.id, TaskStatus::Cancelled, None, None)
            .unwrap();

        let outcome = h
            .executor
            .execute(
                &task.id,
                &graph,
                &plan,
                WorkState::new(),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, TaskStatus::Cancelled);
        assert!(h.exec.invoked_names().is_empty());
        assert!(h.notifier.published().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_task_errors() {
        let h = harness(ScriptedStepExecutor::new(), RecordingNotifier::new());
        let (graph, plan) = logo_plan();

        let err = h
            .executor
            .execute(
                &TaskId::from_str("ghost"),
                &graph,
                &plan,
                WorkState::new(),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AtelierError::UnknownTask(_)));
    }

    #[tokio::test]
    async fn test_later_steps_see_merged_state() {
        let mut delta = atelier_core::state::StateDelta::new();
        delta.insert("palette".into(), serde_json::json!(["#102030", "#ffffff"]));
        let h = harness(
            ScriptedStepExecutor::new().with_delta("Generate colors", delta),
            RecordingNotifier::new(),
        );
        let (graph, plan) = logo_plan();
        let task = h.store.create("logo", serde_json::json!({}), None);

        let outcome = h
            .executor
            .execute(
                &task.id,
                &graph,
                &plan,
                WorkState::new(),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let result = outcome.result.unwrap();
        assert_eq!(result["palette"][0], serde_json::json!("#102030"));
        assert_eq!(result["Create logo_done"], serde_json::json!(true));
    }
}
