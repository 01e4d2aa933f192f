//! Dependency analysis over an externally supplied fact source.
//!
//! The analyzer asks a [`DependencyFactProvider`] for each unit's outbound
//! depends-on edges, assembles a [`UnitGraph`], and derives everything the
//! scheduler and monitor consume: execution order, parallel groups, cycles,
//! critical path, and a structural risk assessment.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::graph::UnitGraph;

/// Source of raw dependency edges, typically extracted from infrastructure
/// manifests. Failures are per-unit: one unreadable manifest must not abort
/// the analysis of every other unit.
#[async_trait]
pub trait DependencyFactProvider: Send + Sync {
    /// Outbound depends-on edges for `unit`.
    async fn edges_for(&self, unit: &str) -> anyhow::Result<Vec<String>>;
}

/// Errors surfaced by dependency analysis.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AnalysisError {
    #[error("Circular dependencies detected: {}", format_cycles(.cycles))]
    CircularDependencies { cycles: Vec<Vec<String>> },

    #[error("no units supplied for analysis")]
    EmptyUnitSet,
}

fn format_cycles(cycles: &[Vec<String>]) -> String {
    cycles
        .iter()
        .map(|cycle| cycle.join(" -> "))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Structural risk rating for a unit or the whole graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Per-unit risk derived from fan-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitRisk {
    /// Normalized risk score in 0.0-1.0, driven by dependent count.
    pub score: f64,
    /// Number of units that directly depend on this one.
    pub dependents: usize,
    pub level: RiskLevel,
}

/// Graph-wide risk summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub unit_risks: HashMap<String, UnitRisk>,
    /// Units that are some other unit's only dependency; losing one strands
    /// at least one dependent.
    pub single_points_of_failure: Vec<String>,
    pub overall: Option<RiskLevel>,
}

/// Complete result of analyzing a unit set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyAnalysis {
    /// Adjacency map: unit -> units it depends on.
    pub dependencies: HashMap<String, Vec<String>>,
    /// Per-unit provider failures, keyed by unit.
    pub errors: HashMap<String, String>,
    /// Valid topological execution order; empty when cycles exist.
    pub execution_order: Vec<String>,
    /// Units grouped by dependency depth; same-group units are independent.
    pub parallel_groups: Vec<Vec<String>>,
    /// Detected cycles; non-empty blocks scheduling entirely.
    pub cycles: Vec<Vec<String>>,
    /// Longest depends-on chain by node count.
    pub critical_path: Vec<String>,
    pub risk_assessment: RiskAssessment,
}

impl DependencyAnalysis {
    /// Whether the analyzed graph permits scheduling.
    pub fn is_schedulable(&self) -> bool {
        self.cycles.is_empty()
    }

    /// Fail with [`AnalysisError::CircularDependencies`] when cycles exist.
    pub fn ensure_acyclic(&self) -> Result<(), AnalysisError> {
        if self.cycles.is_empty() {
            Ok(())
        } else {
            Err(AnalysisError::CircularDependencies {
                cycles: self.cycles.clone(),
            })
        }
    }
}

/// Analyzer over an injected fact provider.
pub struct DependencyAnalyzer {
    provider: std::sync::Arc<dyn DependencyFactProvider>,
}

impl DependencyAnalyzer {
    pub fn new(provider: std::sync::Arc<dyn DependencyFactProvider>) -> Self {
        Self { provider }
    }

    /// Analyze the dependency structure of `units`.
    ///
    /// Units are added to the graph in input order, which fixes tie-breaking
    /// everywhere downstream. Edges referencing units outside the input set
    /// are kept; the referenced unit joins the graph as a node of its own.
    pub async fn analyze(&self, units: &[String]) -> Result<DependencyAnalysis, AnalysisError> {
        if units.is_empty() {
            return Err(AnalysisError::EmptyUnitSet);
        }

        let mut graph = UnitGraph::new();
        let mut dependencies: HashMap<String, Vec<String>> = HashMap::new();
        let mut errors: HashMap<String, String> = HashMap::new();

        for unit in units {
            graph.add_unit(unit);
        }

        for unit in units {
            match self.provider.edges_for(unit).await {
                Ok(deps) => {
                    for dep in &deps {
                        graph.add_dependency(unit, dep);
                    }
                    dependencies.insert(unit.clone(), deps);
                }
                Err(e) => {
                    warn!(unit = %unit, error = %e, "Dependency facts unavailable for unit");
                    errors.insert(unit.clone(), e.to_string());
                    dependencies.insert(unit.clone(), Vec::new());
                }
            }
        }

        let cycles = graph.detect_cycles();
        if !cycles.is_empty() {
            warn!(
                cycle_count = cycles.len(),
                "🔴 Dependency graph contains cycles, scheduling is blocked"
            );
            return Ok(DependencyAnalysis {
                dependencies,
                errors,
                cycles,
                ..DependencyAnalysis::default()
            });
        }

        let execution_order = graph.toposort().unwrap_or_default();
        let parallel_groups = graph.depth_layers().unwrap_or_default();
        let critical_path = graph.critical_path().unwrap_or_default();
        let risk_assessment = assess_risk(&graph);

        debug!(
            units = units.len(),
            edges = graph.edge_count(),
            layers = parallel_groups.len(),
            critical_path_len = critical_path.len(),
            "Dependency analysis complete"
        );

        Ok(DependencyAnalysis {
            dependencies,
            errors,
            execution_order,
            parallel_groups,
            cycles,
            critical_path,
            risk_assessment,
        })
    }

    /// Transitive dependents of `unit` within the supplied unit set.
    ///
    /// Used for blast-radius reporting in alerts; an error in `unit` can
    /// affect every unit returned here.
    pub async fn impact_of(
        &self,
        units: &[String],
        unit: &str,
    ) -> Result<Vec<String>, AnalysisError> {
        let analysis = self.analyze(units).await?;
        let mut graph = UnitGraph::new();
        for u in units {
            graph.add_unit(u);
        }
        for (u, deps) in &analysis.dependencies {
            for dep in deps {
                graph.add_dependency(u, dep);
            }
        }
        Ok(graph.transitive_dependents(unit))
    }
}

/// Score every unit by fan-in and flag single points of failure.
fn assess_risk(graph: &UnitGraph) -> RiskAssessment {
    let units = graph.units();
    let total = units.len();
    let mut unit_risks = HashMap::new();
    let mut single_points_of_failure = Vec::new();
    let mut overall: Option<RiskLevel> = None;

    for unit in &units {
        let dependents = graph.dependents_of(unit).len();
        let divisor = total.saturating_sub(1).max(1);
        let score = dependents as f64 / divisor as f64;
        let level = if score > 0.66 {
            RiskLevel::High
        } else if score > 0.33 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        overall = Some(overall.map_or(level, |current| current.max(level)));
        unit_risks.insert(
            unit.clone(),
            UnitRisk {
                score,
                dependents,
                level,
            },
        );
    }

    // A unit is a single point of failure when some dependent has it as its
    // only dependency.
    for unit in &units {
        let is_spof = graph
            .dependents_of(unit)
            .iter()
            .any(|dependent| graph.dependencies_of(dependent) == vec![unit.clone()]);
        if is_spof {
            single_points_of_failure.push(unit.clone());
        }
    }

    RiskAssessment {
        unit_risks,
        single_points_of_failure,
        overall,
    }
}
