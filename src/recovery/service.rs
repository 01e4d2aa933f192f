//! Policy-driven failure recovery.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::RecoveryConfig;
use crate::constants::events;
use crate::events::EventPublisher;

use super::backoff::{calculate_backoff, BackoffKind};
use super::classifier::{FailureEvent, FailureScope};
use super::scheduler::RetryScheduler;

/// What to do about a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    RetryWithBackoff,
    Escalate,
    Manual,
}

/// Recovery behavior for one failure-type key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryPolicy {
    pub strategy: RecoveryStrategy,
    pub max_retries: u32,
    pub backoff: BackoffKind,
    pub base_delay: Duration,
}

impl RecoveryPolicy {
    pub fn retry_with_backoff(backoff: BackoffKind, max_retries: u32, base_delay: Duration) -> Self {
        Self {
            strategy: RecoveryStrategy::RetryWithBackoff,
            max_retries,
            backoff,
            base_delay,
        }
    }

    pub fn escalate() -> Self {
        Self {
            strategy: RecoveryStrategy::Escalate,
            max_retries: 0,
            backoff: BackoffKind::Fixed,
            base_delay: Duration::ZERO,
        }
    }

    pub fn manual() -> Self {
        Self {
            strategy: RecoveryStrategy::Manual,
            max_retries: 0,
            backoff: BackoffKind::Fixed,
            base_delay: Duration::ZERO,
        }
    }
}

/// Lifecycle of one recovery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStatus {
    Running,
    Completed,
    Failed,
}

/// One entry in the append-only recovery history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryAttempt {
    pub id: Uuid,
    pub failure_type: String,
    pub status: RecoveryStatus,
    pub started_at: DateTime<Utc>,
    pub attempts: u32,
    pub strategy: RecoveryStrategy,
    pub scope: FailureScope,
    pub resolution: Option<String>,
}

/// Derived statistics over a history window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryStatistics {
    pub total_attempts: usize,
    /// Completed / (completed + failed); 0.0 with no terminal attempts.
    pub success_rate: f64,
    pub average_attempts: f64,
    /// Failure-type keys ranked by frequency, most common first.
    pub most_common_failures: Vec<(String, usize)>,
}

/// Re-invokes the failed operation: re-run a task or re-submit an
/// orchestration. `Ok(true)` means the operation succeeded this time.
#[async_trait]
pub trait RetryHandler: Send + Sync {
    async fn retry(&self, failure: &FailureEvent, attempt: u32) -> anyhow::Result<bool>;
}

/// Listens for failure events and drives the matching recovery policy.
pub struct FailureRecoveryService {
    policies: RwLock<HashMap<String, RecoveryPolicy>>,
    default_policy: RecoveryPolicy,
    history: RwLock<Vec<RecoveryAttempt>>,
    history_limit: usize,
    handler: Arc<dyn RetryHandler>,
    publisher: EventPublisher,
    scheduler: RetryScheduler,
}

impl FailureRecoveryService {
    pub fn new(
        handler: Arc<dyn RetryHandler>,
        publisher: EventPublisher,
        config: &RecoveryConfig,
    ) -> Self {
        Self {
            policies: RwLock::new(HashMap::new()),
            default_policy: RecoveryPolicy::retry_with_backoff(
                BackoffKind::Exponential,
                config.default_max_retries,
                config.default_base_delay(),
            ),
            history: RwLock::new(Vec::new()),
            history_limit: config.history_limit.max(1),
            handler,
            publisher,
            scheduler: RetryScheduler::new(),
        }
    }

    /// Register a policy for a failure-type key such as `task:timeout`.
    pub fn add_policy(&self, failure_type: impl Into<String>, policy: RecoveryPolicy) {
        let failure_type = failure_type.into();
        debug!(failure_type = %failure_type, strategy = ?policy.strategy, "Recovery policy added");
        self.policies.write().insert(failure_type, policy);
    }

    /// Remove a policy; the default applies afterwards.
    pub fn remove_policy(&self, failure_type: &str) -> bool {
        self.policies.write().remove(failure_type).is_some()
    }

    /// Policy for a failure-type key, falling back to the default.
    pub fn policy_for(&self, failure_type: &str) -> RecoveryPolicy {
        self.policies
            .read()
            .get(failure_type)
            .cloned()
            .unwrap_or_else(|| self.default_policy.clone())
    }

    /// Classify, select a policy, and execute it. Returns the recorded
    /// attempt in its final (or, for manual strategies, running) state.
    pub async fn handle_failure(&self, failure: FailureEvent) -> RecoveryAttempt {
        let failure_type = failure.failure_key();
        let policy = self.policy_for(&failure_type);

        info!(
            failure_type = %failure_type,
            strategy = ?policy.strategy,
            message = %failure.message,
            "🛠️ RECOVERY: Handling failure"
        );

        let mut attempt = RecoveryAttempt {
            id: Uuid::new_v4(),
            failure_type: failure_type.clone(),
            status: RecoveryStatus::Running,
            started_at: Utc::now(),
            attempts: 0,
            strategy: policy.strategy,
            scope: failure.scope,
            resolution: None,
        };

        match policy.strategy {
            RecoveryStrategy::RetryWithBackoff => {
                self.run_retries(&failure, &policy, &mut attempt).await;
            }
            RecoveryStrategy::Escalate => {
                attempt.status = RecoveryStatus::Failed;
                attempt.resolution = Some("escalated without retry".to_string());
                warn!(failure_type = %failure_type, "🚨 RECOVERY: Escalating failure");
                let _ = self.publisher.publish(
                    events::RECOVERY_ESCALATED,
                    serde_json::json!({
                        "failure_type": failure_type,
                        "message": failure.message,
                        "recovery_id": attempt.id.to_string(),
                    }),
                );
            }
            RecoveryStrategy::Manual => {
                attempt.resolution = Some("awaiting manual intervention".to_string());
                info!(failure_type = %failure_type, "RECOVERY: Holding for manual intervention");
            }
        }

        self.record(attempt.clone());
        attempt
    }

    async fn run_retries(
        &self,
        failure: &FailureEvent,
        policy: &RecoveryPolicy,
        attempt: &mut RecoveryAttempt,
    ) {
        for retry_number in 1..=policy.max_retries {
            attempt.attempts = retry_number;
            let delay = calculate_backoff(policy.backoff, policy.base_delay, retry_number);

            debug!(
                failure_type = %attempt.failure_type,
                retry_number,
                delay_ms = delay.as_millis() as u64,
                "RECOVERY: Waiting before retry"
            );

            if !self.scheduler.delay(delay).await {
                attempt.status = RecoveryStatus::Failed;
                attempt.resolution = Some("interrupted by shutdown".to_string());
                return;
            }

            match self.handler.retry(failure, retry_number).await {
                Ok(true) => {
                    attempt.status = RecoveryStatus::Completed;
                    attempt.resolution =
                        Some(format!("recovered after {retry_number} attempts"));
                    info!(
                        failure_type = %attempt.failure_type,
                        attempts = retry_number,
                        "✅ RECOVERY: Operation recovered"
                    );
                    let _ = self.publisher.publish(
                        events::RECOVERY_COMPLETED,
                        serde_json::json!({
                            "failure_type": attempt.failure_type,
                            "attempts": retry_number,
                            "recovery_id": attempt.id.to_string(),
                        }),
                    );
                    return;
                }
                Ok(false) => {
                    debug!(retry_number, "RECOVERY: Retry did not succeed");
                }
                Err(e) => {
                    warn!(retry_number, error = %e, "RECOVERY: Retry handler errored");
                }
            }
        }

        attempt.status = RecoveryStatus::Failed;
        attempt.resolution = Some(format!(
            "retries exhausted after {} attempts",
            attempt.attempts
        ));
        error!(
            failure_type = %attempt.failure_type,
            attempts = attempt.attempts,
            "🔴 RECOVERY: Retries exhausted"
        );
    }

    /// Close out a manual attempt with resolution metadata.
    pub fn resolve_manual(&self, attempt_id: Uuid, note: impl Into<String>) -> bool {
        let mut history = self.history.write();
        let Some(attempt) = history.iter_mut().find(|a| {
            a.id == attempt_id
                && a.strategy == RecoveryStrategy::Manual
                && a.status == RecoveryStatus::Running
        }) else {
            return false;
        };
        attempt.status = RecoveryStatus::Completed;
        attempt.resolution = Some(note.into());
        true
    }

    fn record(&self, attempt: RecoveryAttempt) {
        let mut history = self.history.write();
        history.push(attempt);
        let overflow = history.len().saturating_sub(self.history_limit);
        if overflow > 0 {
            history.drain(..overflow);
        }
    }

    /// Snapshot of the recovery history, oldest first.
    pub fn history(&self) -> Vec<RecoveryAttempt> {
        self.history.read().clone()
    }

    /// Aggregate statistics over attempts started within `window`.
    pub fn recovery_statistics(&self, window: Duration) -> RecoveryStatistics {
        let window = chrono::Duration::from_std(window)
            .unwrap_or_else(|_| chrono::Duration::days(365 * 100));
        let cutoff = Utc::now() - window;

        let history = self.history.read();
        let recent: Vec<&RecoveryAttempt> = history
            .iter()
            .filter(|a| a.started_at >= cutoff)
            .collect();

        let terminal: Vec<&&RecoveryAttempt> = recent
            .iter()
            .filter(|a| a.status != RecoveryStatus::Running)
            .collect();
        let completed = terminal
            .iter()
            .filter(|a| a.status == RecoveryStatus::Completed)
            .count();

        let success_rate = if terminal.is_empty() {
            0.0
        } else {
            completed as f64 / terminal.len() as f64
        };
        let average_attempts = if recent.is_empty() {
            0.0
        } else {
            recent.iter().map(|a| f64::from(a.attempts)).sum::<f64>() / recent.len() as f64
        };

        let mut counts: HashMap<String, usize> = HashMap::new();
        for attempt in &recent {
            *counts.entry(attempt.failure_type.clone()).or_default() += 1;
        }
        let mut most_common_failures: Vec<(String, usize)> = counts.into_iter().collect();
        most_common_failures.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        most_common_failures.truncate(5);

        RecoveryStatistics {
            total_attempts: recent.len(),
            success_rate,
            average_attempts,
            most_common_failures,
        }
    }

    /// Stop waiting on every pending retry delay.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    /// Subscribe to the event bus and recover from every failure event.
    ///
    /// The returned handle lives until the publisher is dropped or the task
    /// is aborted.
    pub fn attach(self: &Arc<Self>, publisher: &EventPublisher) -> JoinHandle<()> {
        let service = Arc::clone(self);
        let mut rx = publisher.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let failure = match event.name.as_str() {
                            events::TASK_FAILED => {
                                let message =
                                    event.context_str("error").unwrap_or("unknown error");
                                let mut failure =
                                    FailureEvent::from_message(FailureScope::Task, message);
                                if let (Some(task_id), Some(unit)) =
                                    (event.context_str("task_id"), event.context_str("unit"))
                                {
                                    failure = failure.with_task(task_id, unit);
                                }
                                if let Some(id) = event
                                    .context_str("orchestration_id")
                                    .and_then(|s| Uuid::parse_str(s).ok())
                                {
                                    failure = failure.with_orchestration(id);
                                }
                                Some(failure)
                            }
                            events::ORCHESTRATION_FAILED => {
                                let message =
                                    event.context_str("error").unwrap_or("unknown error");
                                let mut failure = FailureEvent::from_message(
                                    FailureScope::Orchestration,
                                    message,
                                );
                                if let Some(id) = event
                                    .context_str("orchestration_id")
                                    .and_then(|s| Uuid::parse_str(s).ok())
                                {
                                    failure = failure.with_orchestration(id);
                                }
                                Some(failure)
                            }
                            _ => None,
                        };

                        if let Some(failure) = failure {
                            let _ = service.handle_failure(failure).await;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "RECOVERY: Event subscriber lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct SucceedsOn {
        nth: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl RetryHandler for SucceedsOn {
        async fn retry(&self, _failure: &FailureEvent, _attempt: u32) -> anyhow::Result<bool> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(call >= self.nth)
        }
    }

    fn service_with(handler: Arc<dyn RetryHandler>) -> FailureRecoveryService {
        FailureRecoveryService::new(handler, EventPublisher::default(), &RecoveryConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_with_backoff_recovers_on_second_attempt() {
        let service = service_with(Arc::new(SucceedsOn {
            nth: 2,
            calls: AtomicU32::new(0),
        }));

        let failure = FailureEvent::from_message(FailureScope::Task, "timeout waiting for deploy");
        let attempt = service.handle_failure(failure).await;

        assert_eq!(attempt.status, RecoveryStatus::Completed);
        assert_eq!(attempt.attempts, 2);
        assert_eq!(attempt.failure_type, "task:timeout");
        assert_eq!(service.history().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_marks_failed() {
        let service = service_with(Arc::new(SucceedsOn {
            nth: u32::MAX,
            calls: AtomicU32::new(0),
        }));

        let failure = FailureEvent::from_message(FailureScope::Task, "exit status 1");
        let attempt = service.handle_failure(failure).await;

        assert_eq!(attempt.status, RecoveryStatus::Failed);
        assert_eq!(attempt.attempts, RecoveryConfig::default().default_max_retries);
        assert!(attempt.resolution.unwrap().contains("exhausted"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_escalation_emits_event_without_retrying() {
        let handler = Arc::new(SucceedsOn {
            nth: 1,
            calls: AtomicU32::new(0),
        });
        let publisher = EventPublisher::default();
        let mut rx = publisher.subscribe();
        let service = FailureRecoveryService::new(
            Arc::clone(&handler) as Arc<dyn RetryHandler>,
            publisher,
            &RecoveryConfig::default(),
        );
        service.add_policy("orchestration:execution_failure", RecoveryPolicy::escalate());

        let failure =
            FailureEvent::from_message(FailureScope::Orchestration, "stage blew up");
        let attempt = service.handle_failure(failure).await;

        assert_eq!(attempt.status, RecoveryStatus::Failed);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name, events::RECOVERY_ESCALATED);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_strategy_waits_for_resolution() {
        let service = service_with(Arc::new(SucceedsOn {
            nth: 1,
            calls: AtomicU32::new(0),
        }));
        service.add_policy("task:execution_failure", RecoveryPolicy::manual());

        let failure = FailureEvent::from_message(FailureScope::Task, "unexpected exit");
        let attempt = service.handle_failure(failure).await;
        assert_eq!(attempt.status, RecoveryStatus::Running);

        assert!(service.resolve_manual(attempt.id, "operator replayed the stage"));
        assert!(!service.resolve_manual(attempt.id, "double resolve"));

        let history = service.history();
        assert_eq!(history[0].status, RecoveryStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_statistics_over_history() {
        let service = service_with(Arc::new(SucceedsOn {
            nth: 1,
            calls: AtomicU32::new(0),
        }));

        for message in ["timeout a", "timeout b", "exit status 1"] {
            let failure = FailureEvent::from_message(FailureScope::Task, message);
            service.handle_failure(failure).await;
        }

        let stats = service.recovery_statistics(Duration::from_secs(3600));
        assert_eq!(stats.total_attempts, 3);
        assert!((stats.success_rate - 1.0).abs() < f64::EPSILON);
        assert_eq!(stats.most_common_failures[0].0, "task:timeout");
        assert_eq!(stats.most_common_failures[0].1, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_policy_add_remove_round_trip() {
        let service = service_with(Arc::new(SucceedsOn {
            nth: 1,
            calls: AtomicU32::new(0),
        }));

        service.add_policy("task:timeout", RecoveryPolicy::escalate());
        assert_eq!(
            service.policy_for("task:timeout").strategy,
            RecoveryStrategy::Escalate
        );

        assert!(service.remove_policy("task:timeout"));
        assert!(!service.remove_policy("task:timeout"));
        assert_eq!(
            service.policy_for("task:timeout").strategy,
            RecoveryStrategy::RetryWithBackoff
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_attached_listener_recovers_from_task_failed_event() {
        let publisher = EventPublisher::default();
        let service = Arc::new(FailureRecoveryService::new(
            Arc::new(SucceedsOn {
                nth: 1,
                calls: AtomicU32::new(0),
            }),
            publisher.clone(),
            &RecoveryConfig::default(),
        ));
        let _listener = service.attach(&publisher);
        tokio::task::yield_now().await;

        publisher
            .publish(
                events::TASK_FAILED,
                serde_json::json!({
                    "task_id": "t1",
                    "unit": "web",
                    "error": "timeout contacting registry",
                }),
            )
            .unwrap();

        // Give the listener a chance to classify, wait out the virtual
        // backoff delay, and record the attempt.
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_secs(2)).await;
            if !service.history().is_empty() {
                break;
            }
        }

        let history = service.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].failure_type, "task:timeout");
        assert_eq!(history[0].status, RecoveryStatus::Completed);
    }
}
