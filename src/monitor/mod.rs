//! # Orchestration Monitoring
//!
//! Periodic health checks and alerting over every registered orchestration.
//! The monitor loop counts active work, evaluates configured thresholds, and
//! manages the alert lifecycle (triggered, acknowledged, resolved). Health
//! checks never propagate internal failures; a broken check degrades the
//! snapshot instead.

pub mod alerts;

pub use alerts::{Alert, AlertSeverity, AlertStatus};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::MonitoringConfig;
use crate::constants::events;
use crate::events::EventPublisher;
use crate::orchestration::{Orchestration, OrchestrationStatus};

/// Errors raised by alert lifecycle operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MonitorError {
    #[error("unknown alert {id}")]
    UnknownAlert { id: Uuid },

    #[error("alert {id} is already acknowledged")]
    AlreadyAcknowledged { id: Uuid },

    #[error("alert {id} is already resolved")]
    AlreadyResolved { id: Uuid },
}

/// Overall health classification of the monitored system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Structured result of one health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub active_orchestrations: usize,
    pub failed_orchestrations: usize,
    pub total_tracked: usize,
    pub active_alerts: usize,
    /// Per-check pass/fail booleans.
    pub checks: HashMap<String, bool>,
    pub checked_at: chrono::DateTime<Utc>,
}

/// Windowed metrics over tracked orchestrations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorMetrics {
    pub total_tracked: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub average_duration_ms: Option<f64>,
    pub window: Duration,
}

/// Health and alert monitor over registered orchestrations.
pub struct OrchestrationMonitor {
    config: MonitoringConfig,
    publisher: EventPublisher,
    tracked: DashMap<Uuid, Orchestration>,
    alerts: RwLock<Vec<Alert>>,
    running: AtomicBool,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
}

impl OrchestrationMonitor {
    pub fn new(config: MonitoringConfig, publisher: EventPublisher) -> Self {
        Self {
            config,
            publisher,
            tracked: DashMap::new(),
            alerts: RwLock::new(Vec::new()),
            running: AtomicBool::new(false),
            shutdown: Mutex::new(None),
        }
    }

    /// Track an orchestration for health checks and windowed metrics.
    /// Re-registering the same id replaces the stored snapshot.
    pub fn register_orchestration(&self, orchestration: &Orchestration) {
        self.tracked
            .insert(orchestration.id, orchestration.clone());
    }

    /// Start the periodic monitoring loop. Returns `false` when the loop is
    /// already running.
    pub fn start_monitoring(self: &Arc<Self>) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            return false;
        }

        let (tx, mut rx) = watch::channel(false);
        *self.shutdown.lock() = Some(tx);

        let monitor = Arc::clone(self);
        let interval_period = self.config.health_check_interval();
        info!(
            interval_seconds = interval_period.as_secs(),
            "🏥 MONITOR: Starting periodic health checks"
        );

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval_period);
            // the first tick fires immediately; skip it so cycles are evenly spaced
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        monitor.run_cycle();
                    }
                    _ = rx.changed() => {
                        debug!("MONITOR: Loop stopped");
                        break;
                    }
                }
            }
        });
        true
    }

    /// Stop the periodic loop. Safe to call when not running.
    pub fn stop_monitoring(&self) {
        if let Some(tx) = self.shutdown.lock().take() {
            tx.send_replace(true);
        }
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn run_cycle(&self) {
        let snapshot = self.perform_health_check();
        self.evaluate_thresholds(&snapshot);

        let _ = self.publisher.publish(
            events::MONITORING_CYCLE_COMPLETE,
            serde_json::json!({
                "status": snapshot.status,
                "active_orchestrations": snapshot.active_orchestrations,
                "active_alerts": snapshot.active_alerts,
            }),
        );
    }

    /// Run a health check and return a structured snapshot.
    ///
    /// Never fails: individual check breakage flips the corresponding
    /// boolean and degrades the status instead of propagating.
    pub fn perform_health_check(&self) -> HealthSnapshot {
        let mut checks = HashMap::new();

        let total_tracked = self.tracked.len();
        let mut active = 0usize;
        let mut failed = 0usize;
        let mut terminal = 0usize;
        for entry in self.tracked.iter() {
            match entry.status {
                OrchestrationStatus::Pending | OrchestrationStatus::Running => active += 1,
                OrchestrationStatus::Failed => {
                    failed += 1;
                    terminal += 1;
                }
                OrchestrationStatus::Completed | OrchestrationStatus::Cancelled => terminal += 1,
            }
        }
        checks.insert("orchestration_tracking".to_string(), true);

        let active_alerts = {
            let alerts = self.alerts.read();
            alerts.iter().filter(|a| a.is_active()).count()
        };
        checks.insert("alerting".to_string(), true);

        let critical_alert_active = {
            let alerts = self.alerts.read();
            alerts
                .iter()
                .any(|a| a.is_active() && a.severity == AlertSeverity::Critical)
        };

        let failure_rate = if terminal > 0 {
            failed as f64 / terminal as f64
        } else {
            0.0
        };
        let within_capacity = active <= self.config.max_active_orchestrations;
        checks.insert("capacity".to_string(), within_capacity);
        checks.insert(
            "failure_rate".to_string(),
            failure_rate <= self.config.max_failure_rate,
        );

        let status = if failure_rate > self.config.max_failure_rate && terminal > 0 {
            HealthStatus::Unhealthy
        } else if critical_alert_active || !within_capacity {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthSnapshot {
            status,
            active_orchestrations: active,
            failed_orchestrations: failed,
            total_tracked,
            active_alerts,
            checks,
            checked_at: Utc::now(),
        }
    }

    fn evaluate_thresholds(&self, snapshot: &HealthSnapshot) {
        if snapshot.active_orchestrations > self.config.max_active_orchestrations
            && !self.has_active_alert("high_active_orchestrations")
        {
            self.trigger_alert(
                "high_active_orchestrations",
                AlertSeverity::Warning,
                format!(
                    "{} orchestrations active, threshold is {}",
                    snapshot.active_orchestrations, self.config.max_active_orchestrations
                ),
            );
        }

        if !snapshot.checks.get("failure_rate").copied().unwrap_or(true)
            && !self.has_active_alert("high_failure_rate")
        {
            self.trigger_alert(
                "high_failure_rate",
                AlertSeverity::Critical,
                format!(
                    "orchestration failure rate exceeded {:.0}%",
                    self.config.max_failure_rate * 100.0
                ),
            );
        }
    }

    fn has_active_alert(&self, alert_type: &str) -> bool {
        self.alerts
            .read()
            .iter()
            .any(|a| a.is_active() && a.alert_type == alert_type)
    }

    /// Create an alert and announce it on the event bus.
    pub fn trigger_alert(
        &self,
        alert_type: impl Into<String>,
        severity: AlertSeverity,
        message: impl Into<String>,
    ) -> Alert {
        let alert = Alert::new(alert_type, severity, message);
        warn!(
            alert_type = %alert.alert_type,
            severity = ?alert.severity,
            message = %alert.message,
            "🚨 MONITOR: Alert triggered"
        );

        {
            let mut alerts = self.alerts.write();
            alerts.push(alert.clone());
            let overflow = alerts.len().saturating_sub(self.config.alert_history_limit);
            if overflow > 0 {
                alerts.drain(..overflow);
            }
        }

        let _ = self.publisher.publish(
            events::ALERT_TRIGGERED,
            serde_json::json!({
                "alert_id": alert.id.to_string(),
                "alert_type": alert.alert_type,
                "severity": alert.severity,
                "message": alert.message,
            }),
        );
        alert
    }

    /// Mark an alert acknowledged. One-way; a second acknowledgement errors.
    pub fn acknowledge_alert(&self, id: Uuid) -> Result<Alert, MonitorError> {
        let mut alerts = self.alerts.write();
        let alert = alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(MonitorError::UnknownAlert { id })?;
        if alert.acknowledged {
            return Err(MonitorError::AlreadyAcknowledged { id });
        }
        alert.acknowledged = true;
        alert.acknowledged_at = Some(Utc::now());
        Ok(alert.clone())
    }

    /// Resolve an alert with a note. One-way; resolved alerts stay resolved.
    pub fn resolve_alert(&self, id: Uuid, note: impl Into<String>) -> Result<Alert, MonitorError> {
        let mut alerts = self.alerts.write();
        let alert = alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(MonitorError::UnknownAlert { id })?;
        if alert.status == AlertStatus::Resolved {
            return Err(MonitorError::AlreadyResolved { id });
        }
        alert.status = AlertStatus::Resolved;
        alert.resolution = Some(note.into());
        alert.resolved_at = Some(Utc::now());
        Ok(alert.clone())
    }

    /// Alerts still demanding attention.
    pub fn active_alerts(&self) -> Vec<Alert> {
        self.alerts
            .read()
            .iter()
            .filter(|a| a.is_active())
            .cloned()
            .collect()
    }

    /// Full retained alert history, oldest first.
    pub fn alert_history(&self) -> Vec<Alert> {
        self.alerts.read().clone()
    }

    /// Aggregate metrics over orchestrations started within `window`.
    pub fn metrics(&self, window: Duration) -> MonitorMetrics {
        let window_chrono = chrono::Duration::from_std(window)
            .unwrap_or_else(|_| chrono::Duration::days(365 * 100));
        let cutoff = Utc::now() - window_chrono;

        let mut running = 0usize;
        let mut completed = 0usize;
        let mut failed = 0usize;
        let mut cancelled = 0usize;
        let mut durations_ms: Vec<f64> = Vec::new();
        let mut total = 0usize;

        for entry in self.tracked.iter() {
            let in_window = entry
                .started_at
                .map(|started| started >= cutoff)
                // never-started orchestrations count toward the present
                .unwrap_or(true);
            if !in_window {
                continue;
            }
            total += 1;
            match entry.status {
                OrchestrationStatus::Pending | OrchestrationStatus::Running => running += 1,
                OrchestrationStatus::Completed => completed += 1,
                OrchestrationStatus::Failed => failed += 1,
                OrchestrationStatus::Cancelled => cancelled += 1,
            }
            if let (Some(started), Some(finished)) = (entry.started_at, entry.completed_at) {
                durations_ms.push((finished - started).num_milliseconds() as f64);
            }
        }

        let average_duration_ms = if durations_ms.is_empty() {
            None
        } else {
            Some(durations_ms.iter().sum::<f64>() / durations_ms.len() as f64)
        };

        MonitorMetrics {
            total_tracked: total,
            running,
            completed,
            failed,
            cancelled,
            average_duration_ms,
            window,
        }
    }
}
