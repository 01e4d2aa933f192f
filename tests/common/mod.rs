//! Shared fixtures for integration tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use rollout_core::analysis::DependencyFactProvider;
use rollout_core::execution::{ActionHandler, TaskDefinition, TaskResult};

/// Fact provider backed by a static adjacency map.
pub struct StaticFactProvider {
    edges: HashMap<String, Vec<String>>,
}

impl StaticFactProvider {
    pub fn new(edges: &[(&str, &[&str])]) -> Self {
        Self {
            edges: edges
                .iter()
                .map(|(unit, deps)| {
                    (
                        unit.to_string(),
                        deps.iter().map(|d| d.to_string()).collect(),
                    )
                })
                .collect(),
        }
    }
}

#[async_trait]
impl DependencyFactProvider for StaticFactProvider {
    async fn edges_for(&self, unit: &str) -> anyhow::Result<Vec<String>> {
        Ok(self.edges.get(unit).cloned().unwrap_or_default())
    }
}

/// Handler that records the units it executed, in order.
pub struct RecordingHandler {
    pub log: Arc<Mutex<Vec<String>>>,
}

impl RecordingHandler {
    pub fn new() -> (Self, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                log: Arc::clone(&log),
            },
            log,
        )
    }
}

#[async_trait]
impl ActionHandler for RecordingHandler {
    async fn execute(&self, task: &TaskDefinition) -> anyhow::Result<TaskResult> {
        self.log.lock().push(task.unit.clone());
        Ok(TaskResult::success(
            Some(serde_json::json!({"unit": task.unit})),
            Duration::ZERO,
        ))
    }
}

/// Handler that always reports a business failure with the given message.
pub struct FailingHandler {
    pub message: String,
}

#[async_trait]
impl ActionHandler for FailingHandler {
    async fn execute(&self, _task: &TaskDefinition) -> anyhow::Result<TaskResult> {
        Ok(TaskResult::failure(self.message.clone(), Duration::ZERO))
    }
}

pub fn task(id: &str, task_type: &str, unit: &str) -> TaskDefinition {
    TaskDefinition::new(id, task_type, unit)
}
