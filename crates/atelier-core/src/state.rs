use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A partial state update returned by a single step.
pub type StateDelta = HashMap<String, serde_json::Value>;

/// Accumulated state shared between workflow steps.
///
/// Each step reads the union of all prior deltas and returns its own
/// `StateDelta`. Merging is shallow with last-writer-wins per key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkState {
    data: HashMap<String, serde_json::Value>,
}

impl WorkState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a WorkState from initial data.
    pub fn from_map(data: HashMap<String, serde_json::Value>) -> Self {
        Self { data }
    }

    /// Get a value by key.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Get a value as a string, if it's a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    /// Set a value.
    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.data.insert(key.into(), value);
    }

    /// Merge a step's delta into this state (overwrites on conflict).
    pub fn merge(&mut self, delta: StateDelta) {
        for (k, v) in delta {
            self.data.insert(k, v);
        }
    }

    /// Snapshot the state as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.data).unwrap_or(serde_json::Value::Null)
    }

    /// Get the underlying data map.
    pub fn data(&self) -> &HashMap<String, serde_json::Value> {
        &self.data
    }
}
