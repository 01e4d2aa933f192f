//! Scheduled retry execution.
//!
//! Retries must not be ad-hoc timer callbacks: they need to be cancellable
//! and testable without real wall-clock sleeps. The scheduler owns every
//! pending delay; shutting it down releases all waiters immediately, and
//! individually scheduled jobs can be cancelled up until their deadline.
//! Under `tokio::time::pause` the delays are virtual, so tests drive them
//! without sleeping.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

/// Deadline queue for retry delays and deferred jobs.
#[derive(Debug)]
pub struct RetryScheduler {
    pending: Arc<DashMap<Uuid, ()>>,
    shutdown: watch::Sender<bool>,
}

impl RetryScheduler {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            pending: Arc::new(DashMap::new()),
            shutdown,
        }
    }

    /// Wait `duration`, returning `false` if the scheduler shut down first.
    pub async fn delay(&self, duration: Duration) -> bool {
        let mut rx = self.shutdown.subscribe();
        if *rx.borrow() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = rx.changed() => false,
        }
    }

    /// Schedule `job` to run after `delay`. Returns a handle usable with
    /// [`cancel`](Self::cancel) until the deadline passes.
    pub fn schedule<F>(&self, delay: Duration, job: F) -> Uuid
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = Uuid::new_v4();
        self.pending.insert(id, ());
        let pending = Arc::clone(&self.pending);
        let mut rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    // cancel() may have removed the entry while we slept
                    if pending.remove(&id).is_some() {
                        job.await;
                    }
                }
                _ = rx.changed() => {
                    pending.remove(&id);
                    debug!(job_id = %id, "Scheduled retry cancelled by shutdown");
                }
            }
        });
        id
    }

    /// Cancel a scheduled job; returns whether it was still pending.
    pub fn cancel(&self, id: Uuid) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Number of jobs waiting on their deadline.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Release every waiter and cancel all pending jobs.
    pub fn shutdown(&self) {
        // send_replace stores the value even with no live receivers, so a
        // delay() requested after shutdown still observes it
        self.shutdown.send_replace(true);
    }
}

impl Default for RetryScheduler {
    fn default() -> Self {
        Self::new()
    }
}
