use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AtelierError, Result};

/// Top-level Atelier configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// Planner tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Estimated cost assigned to Process-kind steps (milliseconds).
    /// A scheduling-visualization weight, not a timing model.
    #[serde(default = "default_process_cost_ms")]
    pub process_cost_ms: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            process_cost_ms: default_process_cost_ms(),
        }
    }
}

/// Runtime housekeeping knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// How often the background sweeper runs.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Tasks untouched for longer than this are swept.
    #[serde(default = "default_task_max_age_secs")]
    pub task_max_age_secs: u64,
    /// Capacity of the broadcast event bus.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            task_max_age_secs: default_task_max_age_secs(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_process_cost_ms() -> u64 {
    1000
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

fn default_task_max_age_secs() -> u64 {
    24 * 60 * 60
}

fn default_event_capacity() -> usize {
    256
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| AtelierError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| AtelierError::Config(e.to_string()))
    }
}

fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}
