//! Multi-strategy task execution.
//!
//! One engine instance serves every orchestration. Strategy semantics:
//!
//! - **parallel**: all tasks launch together and all settle; failures are
//!   summarized in an aggregate error after the full result map is built.
//! - **sequential**: strict list order; a failure is recorded and the list
//!   continues; only the final status reflects it.
//! - **dependency-ordered**: analyzer layers; parallel inside a layer,
//!   sequential between layers; cycles abort before any task runs.
//! - **batch**: fixed-size chunks with parallel semantics inside each chunk,
//!   chunks processed sequentially.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use futures::future::join_all;
use tracing::{debug, error, info};

use crate::analysis::{AnalysisError, DependencyAnalyzer};
use crate::constants::defaults;

use super::handler::ActionRegistry;
use super::types::{
    ActiveTask, CancellationFlag, ExecutionOptions, ExecutionOutcome, ExecutionStatus,
    ExecutionStrategy, TaskDefinition, TaskResult,
};

/// Errors raised by the execution engine.
///
/// A stage-level failure never discards task results: the aggregate variant
/// carries the complete outcome so callers can inspect every settled task.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutionEngineError {
    #[error("{failed} of {total} tasks failed")]
    Aggregate {
        failed: usize,
        total: usize,
        outcome: ExecutionOutcome,
    },

    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

impl ExecutionEngineError {
    /// The result map regardless of which variant was raised.
    pub fn outcome(&self) -> Option<&ExecutionOutcome> {
        match self {
            Self::Aggregate { outcome, .. } => Some(outcome),
            Self::Analysis(_) => None,
        }
    }
}

/// Strategy-driven task executor.
pub struct TaskExecutionEngine {
    registry: Arc<ActionRegistry>,
    analyzer: Option<Arc<DependencyAnalyzer>>,
    active: DashMap<String, ActiveTask>,
    default_batch_size: usize,
}

impl TaskExecutionEngine {
    pub fn new(registry: Arc<ActionRegistry>) -> Self {
        Self {
            registry,
            analyzer: None,
            active: DashMap::new(),
            default_batch_size: defaults::BATCH_SIZE,
        }
    }

    /// Create an engine sized by configuration.
    pub fn from_config(
        registry: Arc<ActionRegistry>,
        config: &crate::config::ExecutionConfig,
    ) -> Self {
        Self::new(registry).with_default_batch_size(config.default_batch_size)
    }

    /// Attach a dependency analyzer, enabling the dependency-ordered strategy
    /// to compute execution layers.
    pub fn with_analyzer(mut self, analyzer: Arc<DependencyAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn with_default_batch_size(mut self, batch_size: usize) -> Self {
        self.default_batch_size = batch_size.max(1);
        self
    }

    /// Tasks currently in flight. Empty before a call starts and after it
    /// returns; used for introspection and cancellation bookkeeping.
    pub fn active_tasks(&self) -> Vec<ActiveTask> {
        self.active
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Execute `tasks` under `strategy`.
    pub async fn execute_tasks(
        &self,
        tasks: &[TaskDefinition],
        strategy: ExecutionStrategy,
        options: ExecutionOptions,
    ) -> Result<ExecutionOutcome, ExecutionEngineError> {
        info!(
            strategy = %strategy,
            task_count = tasks.len(),
            "🚀 EXECUTION: Starting task set"
        );

        let outcome = match strategy {
            ExecutionStrategy::Parallel => self.execute_parallel(tasks, &options).await,
            ExecutionStrategy::Sequential => self.execute_sequential(tasks, &options).await,
            ExecutionStrategy::DependencyOrdered => {
                self.execute_dependency_ordered(tasks, &options).await?
            }
            ExecutionStrategy::Batch => self.execute_batch(tasks, &options).await,
        };

        match outcome.status {
            ExecutionStatus::Completed => {
                info!(
                    strategy = %strategy,
                    tasks = outcome.results.len(),
                    "✅ EXECUTION: Task set completed"
                );
            }
            ExecutionStatus::Failed => {
                error!(
                    strategy = %strategy,
                    failed = outcome.failed_count(),
                    total = outcome.results.len(),
                    "🔴 EXECUTION: Task set finished with failures"
                );
            }
            ExecutionStatus::Cancelled => {
                info!(strategy = %strategy, "EXECUTION: Task set cancelled");
            }
        }

        // Parallel-flavored strategies shout about failures at the end; the
        // complete result map still travels inside the error.
        let aggregate_on_failure = matches!(
            strategy,
            ExecutionStrategy::Parallel | ExecutionStrategy::Batch
        );
        let failed = outcome.failed_count();
        if aggregate_on_failure && outcome.status == ExecutionStatus::Failed && failed > 0 {
            return Err(ExecutionEngineError::Aggregate {
                failed,
                total: outcome.results.len(),
                outcome,
            });
        }
        Ok(outcome)
    }

    async fn execute_parallel(
        &self,
        tasks: &[TaskDefinition],
        options: &ExecutionOptions,
    ) -> ExecutionOutcome {
        if is_cancelled(options) {
            return cancelled_outcome(HashMap::new());
        }

        let results = self.settle_all(tasks).await;
        finish(results, None, false)
    }

    async fn execute_sequential(
        &self,
        tasks: &[TaskDefinition],
        options: &ExecutionOptions,
    ) -> ExecutionOutcome {
        let mut results = HashMap::new();
        let mut cancelled = false;

        for task in tasks {
            if is_cancelled(options) {
                cancelled = true;
                break;
            }
            let (task_id, result) = self.run_task(task.clone()).await;
            results.insert(task_id, result);
        }

        finish(results, None, cancelled)
    }

    async fn execute_dependency_ordered(
        &self,
        tasks: &[TaskDefinition],
        options: &ExecutionOptions,
    ) -> Result<ExecutionOutcome, ExecutionEngineError> {
        let analysis = if options.analyze_dependencies {
            if let Some(analyzer) = &self.analyzer {
                let units = unit_list(tasks);
                let analysis = analyzer.analyze(&units).await?;
                analysis.ensure_acyclic()?;
                Some(analysis)
            } else {
                None
            }
        } else {
            None
        };

        let layers: Vec<Vec<TaskDefinition>> = match &analysis {
            Some(analysis) => layer_tasks(tasks, &analysis.parallel_groups),
            // Without analysis there is no layering information; fall back to
            // strict list order.
            None => tasks.iter().map(|t| vec![t.clone()]).collect(),
        };

        let mut results = HashMap::new();
        let mut cancelled = false;
        for layer in layers {
            if is_cancelled(options) {
                cancelled = true;
                break;
            }
            debug!(layer_size = layer.len(), "EXECUTION: Running dependency layer");
            results.extend(self.settle_all(&layer).await);
        }

        Ok(finish(results, analysis, cancelled))
    }

    async fn execute_batch(
        &self,
        tasks: &[TaskDefinition],
        options: &ExecutionOptions,
    ) -> ExecutionOutcome {
        let batch_size = options
            .batch_size
            .unwrap_or(self.default_batch_size)
            .max(1);

        let mut results = HashMap::new();
        let mut cancelled = false;
        for chunk in tasks.chunks(batch_size) {
            if is_cancelled(options) {
                cancelled = true;
                break;
            }
            debug!(chunk_size = chunk.len(), batch_size, "EXECUTION: Running batch chunk");
            results.extend(self.settle_all(chunk).await);
        }

        finish(results, None, cancelled)
    }

    /// Launch every task concurrently and wait for all of them to settle.
    async fn settle_all(&self, tasks: &[TaskDefinition]) -> HashMap<String, TaskResult> {
        join_all(tasks.iter().cloned().map(|task| self.run_task(task)))
            .await
            .into_iter()
            .collect()
    }

    /// Run one task to a recorded result; never returns an error.
    async fn run_task(&self, task: TaskDefinition) -> (String, TaskResult) {
        let task_id = task.id.clone();
        self.active.insert(
            task_id.clone(),
            ActiveTask {
                task_id: task_id.clone(),
                unit: task.unit.clone(),
                started_at: chrono::Utc::now(),
            },
        );

        let started = Instant::now();
        let result = match self.registry.handler_for(&task.task_type) {
            None => {
                debug!(task_id = %task_id, task_type = %task.task_type, "Unknown task type");
                TaskResult::failure(
                    format!(
                        "UnknownTaskType: no handler registered for task type '{}'",
                        task.task_type
                    ),
                    started.elapsed(),
                )
            }
            Some(handler) => match handler.execute(&task).await {
                Ok(mut result) => {
                    result.duration = started.elapsed();
                    result
                }
                // Handler-internal faults are recorded like any other failure
                Err(e) => TaskResult::failure(e.to_string(), started.elapsed()),
            },
        };

        if !result.is_success() {
            debug!(
                task_id = %task_id,
                unit = %task.unit,
                error = result.error.as_deref().unwrap_or("unknown"),
                "Task recorded a failure"
            );
        }

        self.active.remove(&task_id);
        (task_id, result)
    }
}

fn is_cancelled(options: &ExecutionOptions) -> bool {
    options
        .cancellation
        .as_ref()
        .is_some_and(CancellationFlag::is_cancelled)
}

fn unit_list(tasks: &[TaskDefinition]) -> Vec<String> {
    let mut units = Vec::new();
    for task in tasks {
        if !units.contains(&task.unit) {
            units.push(task.unit.clone());
        }
    }
    units
}

/// Partition tasks into the analyzer's parallel groups, preserving task list
/// order within each layer. Tasks whose unit the analysis does not mention
/// run in a trailing layer so nothing is silently dropped.
fn layer_tasks(
    tasks: &[TaskDefinition],
    parallel_groups: &[Vec<String>],
) -> Vec<Vec<TaskDefinition>> {
    let mut layers: Vec<Vec<TaskDefinition>> = Vec::new();
    let mut placed = vec![false; tasks.len()];

    for group in parallel_groups {
        let layer: Vec<TaskDefinition> = tasks
            .iter()
            .enumerate()
            .filter(|(i, task)| !placed[*i] && group.contains(&task.unit))
            .map(|(_, task)| task.clone())
            .collect();
        for (i, task) in tasks.iter().enumerate() {
            if group.contains(&task.unit) {
                placed[i] = true;
            }
        }
        if !layer.is_empty() {
            layers.push(layer);
        }
    }

    let stragglers: Vec<TaskDefinition> = tasks
        .iter()
        .enumerate()
        .filter(|(i, _)| !placed[*i])
        .map(|(_, task)| task.clone())
        .collect();
    if !stragglers.is_empty() {
        layers.push(stragglers);
    }

    layers
}

fn cancelled_outcome(results: HashMap<String, TaskResult>) -> ExecutionOutcome {
    ExecutionOutcome {
        status: ExecutionStatus::Cancelled,
        results,
        dependency_analysis: None,
    }
}

fn finish(
    results: HashMap<String, TaskResult>,
    dependency_analysis: Option<crate::analysis::DependencyAnalysis>,
    cancelled: bool,
) -> ExecutionOutcome {
    let status = if cancelled {
        ExecutionStatus::Cancelled
    } else if results.values().any(|r| !r.is_success()) {
        ExecutionStatus::Failed
    } else {
        ExecutionStatus::Completed
    };
    ExecutionOutcome {
        status,
        results,
        dependency_analysis,
    }
}
