//! Pool of publish workers.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::SubmissionPublisher;

/// Configuration for a worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Number of concurrent pollers.
    pub workers: usize,
    /// Poll interval in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            poll_interval_ms: 5_000,
        }
    }
}

/// N independent pollers draining approved submissions.
///
/// Each worker claims one submission per tick and processes it to
/// completion. Cancellation is only observed between submissions, so a
/// submission is never abandoned half-updated.
pub struct PublishWorkerPool {
    config: WorkerPoolConfig,
    publisher: Arc<SubmissionPublisher>,
    cancellation_token: CancellationToken,
    tasks: parking_lot::Mutex<Option<JoinSet<()>>>,
}

impl PublishWorkerPool {
    pub fn new(
        config: WorkerPoolConfig,
        publisher: Arc<SubmissionPublisher>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            config,
            publisher,
            cancellation_token,
            tasks: parking_lot::Mutex::new(Some(JoinSet::new())),
        }
    }

    /// Spawn the workers.
    pub fn start(&self) {
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms.max(1));
        info!(
            workers = self.config.workers,
            poll_interval = ?poll_interval,
            "Starting publish worker pool"
        );

        let mut tasks = self.tasks.lock();
        let Some(join_set) = tasks.as_mut() else {
            return;
        };
        for worker_id in 0..self.config.workers {
            let publisher = self.publisher.clone();
            let cancellation_token = self.cancellation_token.clone();

            join_set.spawn(async move {
                debug!(worker_id, "Publish worker started");
                let mut ticker = tokio::time::interval(poll_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // Skip the immediate first tick.
                ticker.tick().await;

                loop {
                    tokio::select! {
                        _ = cancellation_token.cancelled() => break,
                        _ = ticker.tick() => {}
                    }
                    poll_once(worker_id, &publisher).await;
                }
                debug!(worker_id, "Publish worker stopped");
            });
        }
    }

    /// Stop polling and wait for in-flight submissions to finish.
    pub async fn stop(&self) {
        info!("Stopping publish worker pool");
        self.cancellation_token.cancel();

        let join_set = self.tasks.lock().take();
        if let Some(mut join_set) = join_set {
            while let Some(result) = join_set.join_next().await {
                if let Err(e) = result {
                    error!(error = %e, "Publish worker panicked");
                }
            }
        }
        info!("Publish worker pool stopped");
    }

    /// Check if the pool is running.
    pub fn is_running(&self) -> bool {
        !self.cancellation_token.is_cancelled()
    }
}

/// Claim and process at most one submission.
pub async fn poll_once(worker_id: usize, publisher: &SubmissionPublisher) {
    let submission = match publisher.store().fetch_one_approved().await {
        Ok(Some(submission)) => submission,
        Ok(None) => return,
        Err(e) => {
            error!(worker_id, error = %e, "Failed to claim a submission");
            return;
        }
    };
    info!(worker_id, submission_id = submission.id, "Processing submission");
    publisher.process(worker_id, submission).await;
}
