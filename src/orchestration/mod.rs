//! # Pipeline Orchestration
//!
//! The façade over the whole core: accepts an orchestration configuration
//! (unit list plus staged task list), validates it up front, drives the
//! dependency analyzer and the execution engine through each stage, emits
//! lifecycle events, and exposes cancel/list operations.

pub mod orchestrator;
pub mod types;

pub use orchestrator::PipelineOrchestrator;
pub use types::{
    Orchestration, OrchestrationError, OrchestrationStatus, PipelineConfig, StageConfig,
};
