use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use atelier_store::TaskStore;

/// Periodic garbage collection of stale tasks.
///
/// The core never deletes tasks on its own; this sweeper removes tasks whose
/// `updated_at` is older than `max_age`, on a fixed interval, until
/// cancelled.
pub struct Sweeper {
    store: Arc<TaskStore>,
    interval: Duration,
    max_age: chrono::Duration,
}

impl Sweeper {
    pub fn new(store: Arc<TaskStore>, interval: Duration, max_age: chrono::Duration) -> Self {
        Self {
            store,
            interval,
            max_age,
        }
    }

    /// Run until the token fires. The first tick happens after one full
    /// interval, not immediately.
    pub async fn run(self, cancel: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "Task sweeper started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await; // first tick is immediate, skip it

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Task sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let removed = self.store.sweep(self.max_age);
                    debug!(removed, "Sweep pass finished");
                }
            }
        }
    }
}
