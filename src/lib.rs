#![allow(clippy::doc_markdown)] // Allow technical terms like DashMap, TOML in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Rollout Core
//!
//! Orchestration engine for coordinating deployment-style work across many
//! independent repositories ("units") with cross-dependencies: shared
//! infrastructure, shared ports and domains, and ordering constraints.
//!
//! ## Overview
//!
//! The core takes a staged deployment plan, analyzes the dependency structure
//! of the target units, and drives every stage through a strategy-aware task
//! execution engine while shared resources are claimed and released around
//! the work. Failures are classified and recovered under explicit policies,
//! and a monitor watches the whole system with health checks and alerts.
//!
//! Scheduling is in-process and single-instance: there is no consensus
//! protocol, no durable queue, and no cross-process coordination.
//!
//! ## Module Organization
//!
//! - [`analysis`] - Dependency graph construction, cycle detection, ordering,
//!   critical path, and risk assessment
//! - [`execution`] - Multi-strategy task execution engine and action registry
//! - [`resources`] - Shared resource claims and cross-unit configuration
//!   coordination
//! - [`recovery`] - Failure classification, recovery policies, and retry
//!   scheduling
//! - [`monitor`] - Periodic health checks, windowed metrics, and alerts
//! - [`orchestration`] - The pipeline orchestrator façade
//! - [`events`] - Broadcast lifecycle event bus
//! - [`config`] - Layered configuration with validation
//! - [`error`] - Crate-level error type
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rollout_core::analysis::{DependencyAnalyzer, DependencyFactProvider};
//! use rollout_core::events::EventPublisher;
//! use rollout_core::execution::{ActionRegistry, TaskExecutionEngine};
//! use rollout_core::orchestration::{PipelineConfig, PipelineOrchestrator};
//!
//! # async fn example(
//! #     provider: Arc<dyn DependencyFactProvider>,
//! #     registry: Arc<ActionRegistry>,
//! #     config: PipelineConfig,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let analyzer = Arc::new(DependencyAnalyzer::new(provider));
//! let engine = Arc::new(TaskExecutionEngine::new(registry).with_analyzer(Arc::clone(&analyzer)));
//! let publisher = EventPublisher::default();
//!
//! let orchestrator = PipelineOrchestrator::new(engine, analyzer, publisher);
//! let orchestration = orchestrator.orchestrate_pipeline(config).await?;
//! println!("finished with status {}", orchestration.status);
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod execution;
pub mod logging;
pub mod monitor;
pub mod orchestration;
pub mod recovery;
pub mod resources;

pub use config::{
    EventConfig, ExecutionConfig, MonitoringConfig, OrchestratorConfig, RecoveryConfig,
};
pub use error::{Result, RolloutError};
// Re-export constants events with a distinct name so callers can filter the bus
pub use constants::events as lifecycle_events;
pub use orchestration::{
    Orchestration, OrchestrationStatus, PipelineConfig, PipelineOrchestrator,
};
