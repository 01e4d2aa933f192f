//! Orchestration lifecycle types and configuration.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::AnalysisError;
use crate::execution::{ExecutionStrategy, StageDefinition, TaskDefinition, TaskResult};

/// Lifecycle states of an orchestration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationStatus {
    /// Accepted but not yet started
    Pending,
    /// Stages are being driven
    Running,
    /// Every stage completed successfully
    Completed,
    /// A stage failed or a precondition was violated
    Failed,
    /// Cancelled before completion
    Cancelled,
}

impl OrchestrationStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Check if the orchestration is still consuming scheduler attention
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

impl fmt::Display for OrchestrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for OrchestrationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid orchestration status: {s}")),
        }
    }
}

/// One end-to-end run of a staged deployment plan across units.
///
/// Mutated only by the orchestrator driving it through stages; immutable
/// once the status is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Orchestration {
    pub id: Uuid,
    pub name: String,
    pub stages: Vec<StageDefinition>,
    pub units: Vec<String>,
    pub status: OrchestrationStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Last-known result of every task that settled, failures included.
    pub task_results: HashMap<String, TaskResult>,
    /// Index of the stage currently (or last) driven.
    pub current_stage: usize,
}

impl Orchestration {
    pub fn new(
        name: impl Into<String>,
        units: Vec<String>,
        stages: Vec<StageDefinition>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            stages,
            units,
            status: OrchestrationStatus::Pending,
            started_at: None,
            completed_at: None,
            task_results: HashMap::new(),
            current_stage: 0,
        }
    }
}

/// Client-facing orchestration configuration.
///
/// Stage types arrive as strings from external configuration; validation
/// resolves them against the known strategies before anything runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    pub units: Vec<String>,
    pub stages: Vec<StageConfig>,
}

/// One stage as submitted by a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub stage_type: String,
    pub tasks: Vec<TaskDefinition>,
    #[serde(default)]
    pub batch_size: Option<usize>,
}

/// Errors raised by the orchestrator façade.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OrchestrationError {
    #[error("UnknownStageType: stage '{stage}' uses unknown type '{stage_type}'")]
    UnknownStageType { stage: String, stage_type: String },

    #[error("invalid orchestration configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("unknown orchestration {id}")]
    UnknownOrchestration { id: Uuid },
}

/// Validate a client configuration into executable stage definitions.
///
/// Fails fast: an unknown stage type or a duplicate task id rejects the
/// whole configuration before any task runs.
pub fn validate_config(config: &PipelineConfig) -> Result<Vec<StageDefinition>, OrchestrationError> {
    if config.name.trim().is_empty() {
        return Err(OrchestrationError::InvalidConfiguration {
            reason: "orchestration name must not be empty".to_string(),
        });
    }

    let mut seen_task_ids = std::collections::HashSet::new();
    let mut stages = Vec::with_capacity(config.stages.len());

    for stage in &config.stages {
        let strategy = ExecutionStrategy::from_str(&stage.stage_type).map_err(|_| {
            OrchestrationError::UnknownStageType {
                stage: stage.name.clone(),
                stage_type: stage.stage_type.clone(),
            }
        })?;

        for task in &stage.tasks {
            if !seen_task_ids.insert(task.id.clone()) {
                return Err(OrchestrationError::InvalidConfiguration {
                    reason: format!("duplicate task id '{}'", task.id),
                });
            }
        }

        stages.push(StageDefinition {
            name: stage.name.clone(),
            strategy,
            tasks: stage.tasks.clone(),
            batch_size: stage.batch_size,
        });
    }

    Ok(stages)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_stage_type(stage_type: &str) -> PipelineConfig {
        PipelineConfig {
            name: "release".to_string(),
            units: vec!["web".to_string()],
            stages: vec![StageConfig {
                name: "deploy".to_string(),
                stage_type: stage_type.to_string(),
                tasks: vec![TaskDefinition::new("t1", "deploy", "web")],
                batch_size: None,
            }],
        }
    }

    #[test]
    fn test_known_stage_types_validate() {
        for stage_type in ["parallel", "sequential", "dependency_ordered", "batch"] {
            assert!(validate_config(&config_with_stage_type(stage_type)).is_ok());
        }
    }

    #[test]
    fn test_unknown_stage_type_rejected() {
        let err = validate_config(&config_with_stage_type("round_robin")).unwrap_err();
        assert!(err.to_string().contains("UnknownStageType"));
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut config = config_with_stage_type("parallel");
        config.name = "  ".to_string();
        assert!(matches!(
            validate_config(&config),
            Err(OrchestrationError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_duplicate_task_ids_rejected() {
        let mut config = config_with_stage_type("parallel");
        config.stages.push(StageConfig {
            name: "verify".to_string(),
            stage_type: "sequential".to_string(),
            tasks: vec![TaskDefinition::new("t1", "validate", "web")],
            batch_size: None,
        });
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate task id"));
    }

    #[test]
    fn test_status_transitions_and_parsing() {
        assert!(OrchestrationStatus::Completed.is_terminal());
        assert!(OrchestrationStatus::Cancelled.is_terminal());
        assert!(OrchestrationStatus::Running.is_active());
        assert_eq!(
            "cancelled".parse::<OrchestrationStatus>().unwrap(),
            OrchestrationStatus::Cancelled
        );
        assert!("paused".parse::<OrchestrationStatus>().is_err());
    }
}
