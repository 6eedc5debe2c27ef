//! Global publish rate limit.

use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::debug;

/// Spaces successful publishes at least `interval` apart across all workers.
///
/// The only state is the time of the last successful publish. A worker holds
/// the returned [`RatePermit`] for its whole attempt, so two workers can never
/// both observe an open window.
#[derive(Debug)]
pub struct PublishRateLimiter {
    interval: Duration,
    last_publish: Mutex<Option<Instant>>,
}

/// Exclusive right to attempt one publish.
pub struct RatePermit<'a> {
    last_publish: MutexGuard<'a, Option<Instant>>,
}

impl PublishRateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_publish: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until the window since the last successful publish has elapsed.
    pub async fn acquire(&self) -> RatePermit<'_> {
        let last_publish = self.last_publish.lock().await;
        if let Some(last) = *last_publish {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                let wait = self.interval - elapsed;
                debug!(wait = ?wait, "Rate limited; waiting");
                tokio::time::sleep(wait).await;
            }
        }
        RatePermit { last_publish }
    }

    /// Time of the last successful publish, if no permit is currently held.
    pub fn last_publish(&self) -> Option<Instant> {
        self.last_publish.try_lock().ok().and_then(|guard| *guard)
    }
}

impl RatePermit<'_> {
    /// Mark the attempt as published; the next permit waits a full interval.
    pub fn record_success(mut self) {
        *self.last_publish = Some(Instant::now());
    }
}
