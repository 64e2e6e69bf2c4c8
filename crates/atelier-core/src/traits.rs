use futures::future::BoxFuture;

use crate::error::Result;
use crate::state::{StateDelta, WorkState};
use crate::types::{StepKind, TaskUpdate};

/// Step executor — turns one graph node into a partial-state update.
///
/// The core does not define what individual steps do; the collaborator
/// receives the node's kind and name plus the accumulated state and either
/// returns a delta or fails. Failures are contained per-task by the
/// workflow executor.
pub trait StepExecutor: Send + Sync + 'static {
    fn invoke(
        &self,
        kind: StepKind,
        name: &str,
        state: &WorkState,
    ) -> BoxFuture<'_, Result<StateDelta>>;
}

/// Notifier — publishes terminal task updates to external listeners.
///
/// Fire-and-forget: a failed publish must never fail the task, so callers
/// log and swallow errors.
pub trait Notifier: Send + Sync + 'static {
    fn publish(&self, update: TaskUpdate) -> BoxFuture<'_, Result<()>>;
}
