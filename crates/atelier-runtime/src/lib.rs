//! Asynchronous workflow runtime.
//!
//! `WorkflowRuntime` is the submission surface: it plans a brief, records
//! the task, spawns a `WorkflowExecutor` run on its own tokio task with a
//! structured cancellation token, and returns immediately. The `Sweeper`
//! handles time-based garbage collection of settled tasks.

pub mod executor;
pub mod runtime;
pub mod sweep;

pub use executor::WorkflowExecutor;
pub use runtime::{Submission, WorkflowRuntime};
pub use sweep::Sweeper;
