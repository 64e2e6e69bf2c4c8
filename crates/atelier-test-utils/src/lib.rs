//! Test doubles for the Atelier collaborator traits.
//!
//! `ScriptedStepExecutor` replays canned deltas per step name and can be
//! told to fail on a specific step; `RecordingNotifier` captures every
//! published update so tests can assert on count and payload.

use std::collections::HashMap;
use std::sync::Mutex;

use futures::future::BoxFuture;

use atelier_core::error::{AtelierError, Result};
use atelier_core::state::{StateDelta, WorkState};
use atelier_core::traits::{Notifier, StepExecutor};
use atelier_core::types::{StepKind, TaskUpdate};

/// One recorded collaborator invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub kind: StepKind,
    pub name: String,
}

/// Step executor that returns scripted deltas and records invocations.
///
/// Every step yields `{ "<name>_done": true }` unless a delta was scripted
/// for that name; a step named in `fail_on` fails instead.
pub struct ScriptedStepExecutor {
    deltas: Mutex<HashMap<String, StateDelta>>,
    fail_on: Mutex<Option<String>>,
    invocations: Mutex<Vec<Invocation>>,
}

impl ScriptedStepExecutor {
    pub fn new() -> Self {
        Self {
            deltas: Mutex::new(HashMap::new()),
            fail_on: Mutex::new(None),
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Script an explicit delta for a step name.
    pub fn with_delta(self, name: impl Into<String>, delta: StateDelta) -> Self {
        self.deltas.lock().unwrap().insert(name.into(), delta);
        self
    }

    /// Fail when the step with this name is invoked.
    pub fn failing_on(self, name: impl Into<String>) -> Self {
        *self.fail_on.lock().unwrap() = Some(name.into());
        self
    }

    /// Names of steps invoked so far, in order.
    pub fn invoked_names(&self) -> Vec<String> {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .map(|i| i.name.clone())
            .collect()
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }
}

impl Default for ScriptedStepExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl StepExecutor for ScriptedStepExecutor {
    fn invoke(
        &self,
        kind: StepKind,
        name: &str,
        _state: &WorkState,
    ) -> BoxFuture<'_, Result<StateDelta>> {
        let name = name.to_string();
        Box::pin(async move {
            self.invocations.lock().unwrap().push(Invocation {
                kind,
                name: name.clone(),
            });

            if self.fail_on.lock().unwrap().as_deref() == Some(name.as_str()) {
                return Err(AtelierError::StepExecution {
                    step: name.clone(),
                    message: format!("scripted failure in {}", name),
                });
            }

            if let Some(delta) = self.deltas.lock().unwrap().get(&name) {
                return Ok(delta.clone());
            }

            let mut delta = StateDelta::new();
            delta.insert(format!("{}_done", name), serde_json::json!(true));
            Ok(delta)
        })
    }
}

/// Notifier that records every update it receives.
pub struct RecordingNotifier {
    published: Mutex<Vec<TaskUpdate>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    /// A notifier whose publishes always fail (for best-effort tests).
    pub fn failing() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn published(&self) -> Vec<TaskUpdate> {
        self.published.lock().unwrap().clone()
    }
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for RecordingNotifier {
    fn publish(&self, update: TaskUpdate) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.published.lock().unwrap().push(update);
            if self.fail {
                return Err(AtelierError::Notify("scripted notifier failure".into()));
            }
            Ok(())
        })
    }
}
