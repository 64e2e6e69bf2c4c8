use thiserror::Error;

#[derive(Debug, Error)]
pub enum AtelierError {
    // Graph errors
    #[error("Structural error in brief or graph: {0}")]
    Structural(String),

    #[error("Cyclic dependency detected at node: {node}")]
    CyclicDependency { node: String },

    // Execution errors
    #[error("Step execution failed: {step}: {message}")]
    StepExecution { step: String, message: String },

    #[error("Task not found: {0}")]
    UnknownTask(String),

    // Notifier errors
    #[error("Notifier error: {0}")]
    Notify(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AtelierError>;
