//! Action handler registry.
//!
//! Handlers are the external collaborators that perform actual work
//! ("prepare", "apply-template", "validate"). The registry resolves a task's
//! `task_type` to a handler; an unresolved type is a per-task failure, never
//! a fatal engine error.
//!
//! Handlers return a failure [`TaskResult`] for expected business failures
//! and reserve `Err` for handler-internal faults. The engine records both the
//! same way so a stage always settles with a complete result map.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::types::{TaskDefinition, TaskResult};

/// External executor for one kind of task.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Perform the task and report its result.
    async fn execute(&self, task: &TaskDefinition) -> anyhow::Result<TaskResult>;
}

/// Maps task types to their handlers.
#[derive(Default)]
pub struct ActionRegistry {
    handlers: DashMap<String, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `task_type`, replacing any previous handler.
    pub fn register(&self, task_type: impl Into<String>, handler: Arc<dyn ActionHandler>) {
        let task_type = task_type.into();
        debug!(task_type = %task_type, "Action handler registered");
        self.handlers.insert(task_type, handler);
    }

    /// Resolve the handler for `task_type`.
    pub fn handler_for(&self, task_type: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers
            .get(task_type)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// All registered task types, sorted.
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        types.sort();
        types
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("registered_types", &self.registered_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct EchoHandler;

    #[async_trait]
    impl ActionHandler for EchoHandler {
        async fn execute(&self, task: &TaskDefinition) -> anyhow::Result<TaskResult> {
            Ok(TaskResult::success(
                Some(task.parameters.clone()),
                Duration::from_millis(1),
            ))
        }
    }

    #[tokio::test]
    async fn test_register_and_resolve() {
        let registry = ActionRegistry::new();
        registry.register("echo", Arc::new(EchoHandler));

        assert!(registry.handler_for("echo").is_some());
        assert!(registry.handler_for("unknown").is_none());
        assert_eq!(registry.registered_types(), vec!["echo".to_string()]);
    }

    #[tokio::test]
    async fn test_reregistration_replaces_handler() {
        let registry = ActionRegistry::new();
        registry.register("echo", Arc::new(EchoHandler));
        registry.register("echo", Arc::new(EchoHandler));
        assert_eq!(registry.registered_types().len(), 1);
    }
}
