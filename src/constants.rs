//! # System Constants
//!
//! Event names and system-wide defaults shared across orchestration components.
//! Event names follow the `subject:action` convention so subscribers can filter
//! on either half.

/// Lifecycle event names published on the event bus.
pub mod events {
    /// An orchestration was accepted and started running.
    pub const ORCHESTRATION_STARTED: &str = "orchestration:started";
    /// An orchestration completed all stages successfully.
    pub const ORCHESTRATION_COMPLETED: &str = "orchestration:completed";
    /// An orchestration reached a terminal failed status.
    pub const ORCHESTRATION_FAILED: &str = "orchestration:failed";
    /// An orchestration was cancelled before completion.
    pub const ORCHESTRATION_CANCELLED: &str = "orchestration:cancelled";

    /// A single task recorded a failure result.
    pub const TASK_FAILED: &str = "task:failed";

    /// An alert transitioned to active.
    pub const ALERT_TRIGGERED: &str = "alert:triggered";

    /// A recovery attempt finished successfully.
    pub const RECOVERY_COMPLETED: &str = "recovery:completed";
    /// A recovery attempt was escalated without retrying.
    pub const RECOVERY_ESCALATED: &str = "recovery:escalated";

    /// The monitor finished one periodic cycle.
    pub const MONITORING_CYCLE_COMPLETE: &str = "monitoring:cycle_complete";
}

/// Default values used when configuration does not override them.
pub mod defaults {
    use std::time::Duration;

    /// Batch size used by the batch execution strategy when a stage does not
    /// specify one.
    pub const BATCH_SIZE: usize = 5;

    /// Capacity of the broadcast event channel.
    pub const EVENT_CHANNEL_CAPACITY: usize = 1000;

    /// Interval between monitor health-check cycles.
    pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

    /// Default capacity for a newly registered shared resource.
    pub const RESOURCE_CAPACITY: usize = 1;

    /// Maximum retries applied by the fallback recovery policy.
    pub const MAX_RETRIES: u32 = 3;

    /// Base delay for the fallback recovery policy.
    pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

    /// Bounded length of the in-memory recovery history.
    pub const RECOVERY_HISTORY_LIMIT: usize = 1000;

    /// Bounded length of the in-memory alert history.
    pub const ALERT_HISTORY_LIMIT: usize = 500;

    /// Bounded length of the completed-orchestration index.
    pub const COMPLETED_ORCHESTRATION_LIMIT: usize = 200;
}
