//! The pipeline orchestrator façade.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::analysis::DependencyAnalyzer;
use crate::constants::{defaults, events};
use crate::events::EventPublisher;
use crate::execution::{
    CancellationFlag, ExecutionEngineError, ExecutionOptions, ExecutionStatus, ExecutionStrategy,
    TaskExecutionEngine, TaskResult,
};

use super::types::{
    validate_config, Orchestration, OrchestrationError, OrchestrationStatus, PipelineConfig,
};

struct ActiveEntry {
    snapshot: Orchestration,
    cancellation: CancellationFlag,
}

/// Accepts orchestration configurations and drives them through their stages.
///
/// One orchestrator instance serves any number of concurrent orchestrations;
/// each gets its own cancellation flag and result map.
pub struct PipelineOrchestrator {
    engine: Arc<TaskExecutionEngine>,
    analyzer: Arc<DependencyAnalyzer>,
    publisher: EventPublisher,
    active: DashMap<Uuid, ActiveEntry>,
    completed: RwLock<Vec<Orchestration>>,
    completed_limit: usize,
}

impl PipelineOrchestrator {
    pub fn new(
        engine: Arc<TaskExecutionEngine>,
        analyzer: Arc<DependencyAnalyzer>,
        publisher: EventPublisher,
    ) -> Self {
        Self {
            engine,
            analyzer,
            publisher,
            active: DashMap::new(),
            completed: RwLock::new(Vec::new()),
            completed_limit: defaults::COMPLETED_ORCHESTRATION_LIMIT,
        }
    }

    pub fn with_completed_limit(mut self, limit: usize) -> Self {
        self.completed_limit = limit.max(1);
        self
    }

    /// Validate, analyze, and run an orchestration to its terminal status.
    ///
    /// Configuration errors and dependency cycles reject the submission
    /// before any task runs. The returned orchestration carries the
    /// last-known result of every task that settled, whatever the terminal
    /// status.
    pub async fn orchestrate_pipeline(
        &self,
        config: PipelineConfig,
    ) -> Result<Orchestration, OrchestrationError> {
        let stages = validate_config(&config)?;

        // Cycles block scheduling entirely; no partial execution against a
        // cyclic graph.
        if !config.units.is_empty() {
            let analysis = self.analyzer.analyze(&config.units).await?;
            analysis.ensure_acyclic()?;
        }

        let mut orchestration = Orchestration::new(config.name.clone(), config.units, stages);
        let cancellation = CancellationFlag::new();
        orchestration.status = OrchestrationStatus::Running;
        orchestration.started_at = Some(Utc::now());

        self.active.insert(
            orchestration.id,
            ActiveEntry {
                snapshot: orchestration.clone(),
                cancellation: cancellation.clone(),
            },
        );

        info!(
            orchestration_id = %orchestration.id,
            name = %orchestration.name,
            stages = orchestration.stages.len(),
            "🚀 ORCHESTRATION: Started"
        );
        let _ = self.publisher.publish(
            events::ORCHESTRATION_STARTED,
            json!({
                "orchestration_id": orchestration.id.to_string(),
                "name": orchestration.name,
                "stage_count": orchestration.stages.len(),
            }),
        );

        let mut failure_message: Option<String> = None;

        let stage_list = orchestration.stages.clone();
        for (index, stage) in stage_list.iter().enumerate() {
            if cancellation.is_cancelled() {
                break;
            }
            orchestration.current_stage = index;

            let options = ExecutionOptions {
                batch_size: stage.batch_size,
                analyze_dependencies: stage.strategy == ExecutionStrategy::DependencyOrdered,
                cancellation: Some(cancellation.clone()),
            };

            info!(
                orchestration_id = %orchestration.id,
                stage = %stage.name,
                strategy = %stage.strategy,
                tasks = stage.tasks.len(),
                "ORCHESTRATION: Driving stage"
            );

            let stage_failed = match self
                .engine
                .execute_tasks(&stage.tasks, stage.strategy, options)
                .await
            {
                Ok(outcome) => {
                    let failed = outcome.status == ExecutionStatus::Failed;
                    if failed {
                        failure_message = Some(format!(
                            "stage '{}' finished with {} failed tasks",
                            stage.name,
                            outcome.failed_count()
                        ));
                    }
                    self.absorb_results(&mut orchestration, outcome.results);
                    failed
                }
                Err(ExecutionEngineError::Aggregate {
                    failed,
                    total,
                    outcome,
                }) => {
                    failure_message = Some(format!(
                        "stage '{}' failed {failed} of {total} tasks",
                        stage.name
                    ));
                    self.absorb_results(&mut orchestration, outcome.results);
                    true
                }
                Err(ExecutionEngineError::Analysis(e)) => {
                    failure_message = Some(e.to_string());
                    true
                }
            };

            // Keep the active snapshot fresh for list/cancel callers
            if let Some(mut entry) = self.active.get_mut(&orchestration.id) {
                entry.snapshot = orchestration.clone();
            }

            // A failed stage stops subsequent stages; recovery may resubmit
            if stage_failed {
                break;
            }
        }

        orchestration.completed_at = Some(Utc::now());
        orchestration.status = if cancellation.is_cancelled() {
            OrchestrationStatus::Cancelled
        } else if failure_message.is_some() {
            OrchestrationStatus::Failed
        } else {
            OrchestrationStatus::Completed
        };

        match orchestration.status {
            OrchestrationStatus::Cancelled => {
                warn!(orchestration_id = %orchestration.id, "ORCHESTRATION: Cancelled");
                let _ = self.publisher.publish(
                    events::ORCHESTRATION_CANCELLED,
                    json!({
                        "orchestration_id": orchestration.id.to_string(),
                        "name": orchestration.name,
                    }),
                );
            }
            OrchestrationStatus::Failed => {
                let message = failure_message.unwrap_or_else(|| "unknown failure".to_string());
                error!(
                    orchestration_id = %orchestration.id,
                    error = %message,
                    "🔴 ORCHESTRATION: Failed"
                );
                let _ = self.publisher.publish(
                    events::ORCHESTRATION_FAILED,
                    json!({
                        "orchestration_id": orchestration.id.to_string(),
                        "name": orchestration.name,
                        "error": message,
                    }),
                );
            }
            _ => {
                info!(
                    orchestration_id = %orchestration.id,
                    duration_ms = duration_ms(&orchestration),
                    "✅ ORCHESTRATION: Completed"
                );
                let _ = self.publisher.publish(
                    events::ORCHESTRATION_COMPLETED,
                    json!({
                        "orchestration_id": orchestration.id.to_string(),
                        "name": orchestration.name,
                        "task_count": orchestration.task_results.len(),
                    }),
                );
            }
        }

        self.active.remove(&orchestration.id);
        self.retain_completed(orchestration.clone());
        Ok(orchestration)
    }

    /// Record stage results on the orchestration and announce every failure.
    fn absorb_results(
        &self,
        orchestration: &mut Orchestration,
        results: std::collections::HashMap<String, TaskResult>,
    ) {
        for (task_id, result) in results {
            if !result.is_success() {
                let unit = orchestration
                    .stages
                    .iter()
                    .flat_map(|s| &s.tasks)
                    .find(|t| t.id == task_id)
                    .map(|t| t.unit.clone())
                    .unwrap_or_default();
                let _ = self.publisher.publish(
                    events::TASK_FAILED,
                    json!({
                        "orchestration_id": orchestration.id.to_string(),
                        "task_id": task_id,
                        "unit": unit,
                        "error": result.error.clone().unwrap_or_default(),
                    }),
                );
            }
            orchestration.task_results.insert(task_id, result);
        }
    }

    /// Request cancellation of a running orchestration.
    ///
    /// Not-yet-started tasks and stages stop being scheduled; in-flight
    /// tasks settle but cannot advance further stages. The terminal status
    /// becomes cancelled regardless of their outcomes.
    pub fn cancel_orchestration(&self, id: Uuid) -> Result<(), OrchestrationError> {
        let entry = self
            .active
            .get(&id)
            .ok_or(OrchestrationError::UnknownOrchestration { id })?;
        info!(orchestration_id = %id, "ORCHESTRATION: Cancellation requested");
        entry.cancellation.cancel();
        Ok(())
    }

    /// Snapshots of every orchestration still running.
    pub fn list_active_orchestrations(&self) -> Vec<Orchestration> {
        let mut list: Vec<Orchestration> = self
            .active
            .iter()
            .map(|entry| entry.snapshot.clone())
            .collect();
        list.sort_by_key(|o| o.started_at);
        list
    }

    /// Look up an orchestration by id, active or completed.
    pub fn orchestration(&self, id: Uuid) -> Option<Orchestration> {
        if let Some(entry) = self.active.get(&id) {
            return Some(entry.snapshot.clone());
        }
        self.completed.read().iter().find(|o| o.id == id).cloned()
    }

    fn retain_completed(&self, orchestration: Orchestration) {
        let mut completed = self.completed.write();
        completed.push(orchestration);
        let overflow = completed.len().saturating_sub(self.completed_limit);
        if overflow > 0 {
            completed.drain(..overflow);
        }
    }
}

fn duration_ms(orchestration: &Orchestration) -> i64 {
    match (orchestration.started_at, orchestration.completed_at) {
        (Some(started), Some(finished)) => (finished - started).num_milliseconds(),
        _ => 0,
    }
}
