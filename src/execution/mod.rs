//! # Task Execution Engine
//!
//! Executes a list of tasks under a chosen strategy, delegating the actual
//! work to registered action handlers. Whatever the strategy, the engine
//! never lets a single task's failure crash a stage: the returned outcome
//! always carries every settled task's result, and parallel-flavored
//! strategies additionally raise an aggregate error summarizing the failures.

pub mod engine;
pub mod handler;
pub mod types;

pub use engine::{ExecutionEngineError, TaskExecutionEngine};
pub use handler::{ActionHandler, ActionRegistry};
pub use types::{
    ActiveTask, CancellationFlag, ExecutionOptions, ExecutionOutcome, ExecutionStatus,
    ExecutionStrategy, StageDefinition, TaskDefinition, TaskResult, TaskStatus,
};
