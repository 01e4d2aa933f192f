//! Failure classification.
//!
//! Failures arrive as free-form error messages on `task:failed` and
//! `orchestration:failed` events. Classification applies ordered substring
//! rules to the message and produces a failure-type key scoped by context,
//! e.g. `task:timeout` or `orchestration:dependency_failure`, which is what
//! recovery policies are keyed by.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of failure the message describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    ResourceExhaustion,
    DependencyFailure,
    ExecutionFailure,
}

impl FailureKind {
    /// Classify an error message with ordered pattern rules; the first match
    /// wins, and anything unmatched is an execution failure.
    pub fn classify(message: &str) -> Self {
        let message = message.to_lowercase();
        if message.contains("timeout") {
            Self::Timeout
        } else if message.contains("memory") || message.contains("resource") {
            Self::ResourceExhaustion
        } else if message.contains("dependency") {
            Self::DependencyFailure
        } else {
            Self::ExecutionFailure
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ResourceExhaustion => "resource_exhaustion",
            Self::DependencyFailure => "dependency_failure",
            Self::ExecutionFailure => "execution_failure",
        }
    }
}

/// Which level of the system failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureScope {
    Task,
    Orchestration,
}

impl FailureScope {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Orchestration => "orchestration",
        }
    }
}

/// A classified failure ready for policy lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureEvent {
    pub scope: FailureScope,
    pub orchestration_id: Option<Uuid>,
    pub task_id: Option<String>,
    pub unit: Option<String>,
    pub message: String,
    pub kind: FailureKind,
}

impl FailureEvent {
    /// Build a classified failure from a raw error message.
    pub fn from_message(scope: FailureScope, message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = FailureKind::classify(&message);
        Self {
            scope,
            orchestration_id: None,
            task_id: None,
            unit: None,
            message,
            kind,
        }
    }

    pub fn with_orchestration(mut self, id: Uuid) -> Self {
        self.orchestration_id = Some(id);
        self
    }

    pub fn with_task(mut self, task_id: impl Into<String>, unit: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self.unit = Some(unit.into());
        self
    }

    /// Policy lookup key, scoped by context: `task:timeout`,
    /// `orchestration:execution_failure`, ...
    pub fn failure_key(&self) -> String {
        format!("{}:{}", self.scope.prefix(), self.kind.as_str())
    }
}
