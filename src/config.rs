//! # Orchestrator Configuration
//!
//! Layered configuration for all orchestration components: defaults first, an
//! optional TOML file on top, then `ROLLOUT_`-prefixed environment variables.
//! Loading validates the result so components never see a zero interval or an
//! empty channel.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rollout_core::config::OrchestratorConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = OrchestratorConfig::load()?;
//! assert!(config.execution.default_batch_size > 0);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::defaults;
use crate::error::{Result, RolloutError};

/// Root configuration for the orchestration core.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OrchestratorConfig {
    /// Event bus settings
    #[serde(default)]
    pub events: EventConfig,

    /// Task execution engine settings
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Health monitoring settings
    #[serde(default)]
    pub monitoring: MonitoringConfig,

    /// Failure recovery settings
    #[serde(default)]
    pub recovery: RecoveryConfig,
}

/// Event bus configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventConfig {
    /// Broadcast channel capacity; subscribers lag past this depth.
    pub channel_capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            channel_capacity: defaults::EVENT_CHANNEL_CAPACITY,
        }
    }
}

/// Task execution engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Chunk size for the batch strategy when a stage does not set one.
    pub default_batch_size: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_batch_size: defaults::BATCH_SIZE,
        }
    }
}

/// Orchestration monitor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Seconds between periodic health-check cycles.
    pub health_check_interval_seconds: u64,

    /// Active-orchestration count above which a warning alert fires.
    pub max_active_orchestrations: usize,

    /// Failure-rate threshold (0.0-1.0) above which a critical alert fires.
    pub max_failure_rate: f64,

    /// Bounded length of the retained alert history.
    pub alert_history_limit: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            health_check_interval_seconds: defaults::HEALTH_CHECK_INTERVAL.as_secs(),
            max_active_orchestrations: 50,
            max_failure_rate: 0.5,
            alert_history_limit: defaults::ALERT_HISTORY_LIMIT,
        }
    }
}

impl MonitoringConfig {
    /// Health-check interval as a [`Duration`].
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_seconds)
    }
}

/// Failure recovery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecoveryConfig {
    /// Maximum retries applied by the fallback policy.
    pub default_max_retries: u32,

    /// Base delay in milliseconds for the fallback policy.
    pub default_base_delay_ms: u64,

    /// Bounded length of the retained recovery history.
    pub history_limit: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            default_max_retries: defaults::MAX_RETRIES,
            default_base_delay_ms: defaults::RETRY_BASE_DELAY.as_millis() as u64,
            history_limit: defaults::RECOVERY_HISTORY_LIMIT,
        }
    }
}

impl RecoveryConfig {
    /// Base delay for the fallback policy as a [`Duration`].
    pub fn default_base_delay(&self) -> Duration {
        Duration::from_millis(self.default_base_delay_ms)
    }
}

impl OrchestratorConfig {
    /// Load configuration from `rollout.toml` (if present) merged with
    /// `ROLLOUT_`-prefixed environment overrides, e.g.
    /// `ROLLOUT_EXECUTION__DEFAULT_BATCH_SIZE=10`.
    pub fn load() -> Result<Self> {
        Self::load_from_file("rollout")
    }

    /// Load configuration from a specific file stem plus environment overrides.
    pub fn load_from_file(name: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(name).required(false))
            .add_source(
                config::Environment::with_prefix("ROLLOUT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| RolloutError::ConfigurationError(e.to_string()))?;

        let config: OrchestratorConfig = settings
            .try_deserialize()
            .map_err(|e| RolloutError::ConfigurationError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field invariants that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.events.channel_capacity == 0 {
            return Err(RolloutError::ConfigurationError(
                "events.channel_capacity must be greater than zero".to_string(),
            ));
        }
        if self.execution.default_batch_size == 0 {
            return Err(RolloutError::ConfigurationError(
                "execution.default_batch_size must be greater than zero".to_string(),
            ));
        }
        if self.monitoring.health_check_interval_seconds == 0 {
            return Err(RolloutError::ConfigurationError(
                "monitoring.health_check_interval_seconds must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.monitoring.max_failure_rate) {
            return Err(RolloutError::ConfigurationError(format!(
                "monitoring.max_failure_rate must be within 0.0-1.0, got {}",
                self.monitoring.max_failure_rate
            )));
        }
        Ok(())
    }
}
