//! Core execution data types: tasks, results, strategies, stages.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::DependencyAnalysis;

/// One unit of work dispatched to an action handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// Task identity, unique within its orchestration.
    pub id: String,
    /// Action discriminator resolved against the handler registry.
    pub task_type: String,
    /// Owning unit identifier.
    pub unit: String,
    /// Free-form parameters passed through to the handler.
    #[serde(default)]
    pub parameters: serde_json::Value,
    /// Attempt counter, starting at 1; recovery bumps it on retries.
    #[serde(default = "first_attempt")]
    pub attempt: u32,
}

fn first_attempt() -> u32 {
    1
}

impl TaskDefinition {
    pub fn new(id: impl Into<String>, task_type: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task_type: task_type.into(),
            unit: unit.into(),
            parameters: serde_json::Value::Null,
            attempt: 1,
        }
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Terminal status of a single task execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Success,
    Failure,
}

/// Immutable record of one task execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub status: TaskStatus,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub duration: Duration,
}

impl TaskResult {
    pub fn success(output: Option<serde_json::Value>, duration: Duration) -> Self {
        Self {
            status: TaskStatus::Success,
            output,
            error: None,
            duration,
        }
    }

    pub fn failure(error: impl Into<String>, duration: Duration) -> Self {
        Self {
            status: TaskStatus::Failure,
            output: None,
            error: Some(error.into()),
            duration,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }
}

/// How a stage's tasks are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    /// All tasks launch concurrently and all settle before the stage returns.
    Parallel,
    /// Tasks run strictly in list order; failures do not abort the list.
    Sequential,
    /// Topological layers from dependency analysis; parallel within a layer.
    DependencyOrdered,
    /// Fixed-size chunks; parallel within a chunk, sequential between chunks.
    Batch,
}

impl ExecutionStrategy {
    pub const ALL: [ExecutionStrategy; 4] = [
        ExecutionStrategy::Parallel,
        ExecutionStrategy::Sequential,
        ExecutionStrategy::DependencyOrdered,
        ExecutionStrategy::Batch,
    ];
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parallel => write!(f, "parallel"),
            Self::Sequential => write!(f, "sequential"),
            Self::DependencyOrdered => write!(f, "dependency_ordered"),
            Self::Batch => write!(f, "batch"),
        }
    }
}

impl std::str::FromStr for ExecutionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parallel" => Ok(Self::Parallel),
            "sequential" => Ok(Self::Sequential),
            "dependency_ordered" | "dependency-ordered" => Ok(Self::DependencyOrdered),
            "batch" => Ok(Self::Batch),
            _ => Err(format!("Unknown execution strategy: {s}")),
        }
    }
}

/// A named group of tasks executed under one strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDefinition {
    pub name: String,
    pub strategy: ExecutionStrategy,
    pub tasks: Vec<TaskDefinition>,
    /// Chunk size for [`ExecutionStrategy::Batch`]; engine default otherwise.
    #[serde(default)]
    pub batch_size: Option<usize>,
}

/// Cooperative cancellation flag shared between an orchestration driver and
/// the engine. Cancelling stops scheduling of not-yet-started work;
/// already-dispatched tasks run to completion.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Per-call execution options.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Chunk size override for the batch strategy.
    pub batch_size: Option<usize>,
    /// Run dependency analysis for the dependency-ordered strategy and attach
    /// the result to the outcome.
    pub analyze_dependencies: bool,
    /// Cancellation flag consulted before every dispatch.
    pub cancellation: Option<CancellationFlag>,
}

/// Overall status of one `execute_tasks` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    Failed,
    Cancelled,
}

/// Aggregated result of one `execute_tasks` call.
///
/// `results` contains the outcome of every task that settled, successes and
/// failures alike; callers must inspect it rather than rely on errors alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub status: ExecutionStatus,
    pub results: HashMap<String, TaskResult>,
    /// Attached when the dependency-ordered strategy ran the analyzer.
    pub dependency_analysis: Option<DependencyAnalysis>,
}

impl ExecutionOutcome {
    pub fn failed_count(&self) -> usize {
        self.results.values().filter(|r| !r.is_success()).count()
    }

    pub fn succeeded_count(&self) -> usize {
        self.results.values().filter(|r| r.is_success()).count()
    }
}

/// A task currently in flight, for introspection and cancellation bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveTask {
    pub task_id: String,
    pub unit: String,
    pub started_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_strategy_round_trips_through_strings() {
        for strategy in ExecutionStrategy::ALL {
            let parsed = ExecutionStrategy::from_str(&strategy.to_string()).unwrap();
            assert_eq!(parsed, strategy);
        }
        // the hyphenated spelling used by external configs is accepted too
        assert_eq!(
            ExecutionStrategy::from_str("dependency-ordered").unwrap(),
            ExecutionStrategy::DependencyOrdered
        );
        assert!(ExecutionStrategy::from_str("round_robin").is_err());
    }

    #[test]
    fn test_cancellation_flag_is_shared() {
        let flag = CancellationFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_outcome_counts() {
        let mut results = HashMap::new();
        results.insert(
            "a".to_string(),
            TaskResult::success(None, Duration::from_millis(5)),
        );
        results.insert(
            "b".to_string(),
            TaskResult::failure("boom", Duration::from_millis(3)),
        );
        let outcome = ExecutionOutcome {
            status: ExecutionStatus::Failed,
            results,
            dependency_analysis: None,
        };
        assert_eq!(outcome.failed_count(), 1);
        assert_eq!(outcome.succeeded_count(), 1);
    }
}
