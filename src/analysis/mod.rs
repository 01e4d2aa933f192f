//! # Dependency Analysis
//!
//! Builds a directed dependency graph over deployment units from an injected
//! fact provider, then answers the questions scheduling needs: is the graph
//! acyclic, what order do units execute in, which units can run concurrently,
//! which chain bounds total duration, and where are the structural weak
//! points.
//!
//! The graph used for execution ordering must be acyclic. Callers are
//! expected to reject any analysis with a non-empty cycle list before
//! scheduling a single task.

pub mod analyzer;
pub mod graph;

pub use analyzer::{
    AnalysisError, DependencyAnalysis, DependencyAnalyzer, DependencyFactProvider,
    RiskAssessment, RiskLevel, UnitRisk,
};
pub use graph::UnitGraph;
