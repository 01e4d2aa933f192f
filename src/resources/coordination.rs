//! Cross-unit configuration coordination.
//!
//! Independent of the claim/lock mechanism, units declare the shared
//! configuration values they intend to use (ports, domains, volumes). The
//! scan reports values claimed by more than one unit and proposes ranked
//! resolution strategies for each conflict.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use super::SharedResourceManager;

/// Kinds of shared configuration values units can collide on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharedValueKind {
    Port,
    Domain,
    Volume,
    ServiceName,
}

impl SharedValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Port => "port",
            Self::Domain => "domain",
            Self::Volume => "volume",
            Self::ServiceName => "service_name",
        }
    }
}

/// One declared shared value, e.g. `port = "8080"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfigValue {
    pub kind: SharedValueKind,
    pub value: String,
}

/// A unit's declared shared configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitSharedConfig {
    pub unit: String,
    pub values: Vec<SharedConfigValue>,
}

/// A value claimed by more than one unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigConflict {
    pub kind: SharedValueKind,
    pub value: String,
    /// Units claiming the value, in scan order.
    pub units: Vec<String>,
}

/// Outcome of a coordination scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinationStatus {
    Coordinated,
    ConflictsDetected,
}

/// Full coordination result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationReport {
    pub status: CoordinationStatus,
    pub conflicts: Vec<ConfigConflict>,
}

/// A proposed way out of a conflict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionStrategy {
    pub name: String,
    pub description: String,
    /// Whether the strategy can be applied without operator involvement.
    pub automatic: bool,
    /// Confidence in 0.0-1.0; strategies are returned ranked by this.
    pub confidence: f64,
}

impl SharedResourceManager {
    /// Scan unit configurations for values claimed by more than one unit.
    pub fn coordinate_shared_configuration(
        &self,
        units: &[UnitSharedConfig],
    ) -> CoordinationReport {
        // BTreeMap keeps conflict ordering stable across runs
        let mut claims: BTreeMap<(SharedValueKind, String), Vec<String>> = BTreeMap::new();

        for unit in units {
            for value in &unit.values {
                let claimants = claims
                    .entry((value.kind, value.value.clone()))
                    .or_default();
                if !claimants.contains(&unit.unit) {
                    claimants.push(unit.unit.clone());
                }
            }
        }

        let conflicts: Vec<ConfigConflict> = claims
            .into_iter()
            .filter(|(_, claimants)| claimants.len() > 1)
            .map(|((kind, value), units)| ConfigConflict { kind, value, units })
            .collect();

        let status = if conflicts.is_empty() {
            CoordinationStatus::Coordinated
        } else {
            warn!(
                conflict_count = conflicts.len(),
                "⚠️ Shared configuration conflicts detected"
            );
            CoordinationStatus::ConflictsDetected
        };

        CoordinationReport { status, conflicts }
    }

    /// Propose resolution strategies for a conflict, ranked by confidence.
    pub fn generate_resolution(&self, conflict: &ConfigConflict) -> Vec<ResolutionStrategy> {
        let mut strategies = match conflict.kind {
            SharedValueKind::Port => vec![
                ResolutionStrategy {
                    name: "port-reassignment".to_string(),
                    description: format!(
                        "Assign each unit after '{}' the next free port above {}",
                        conflict.units[0], conflict.value
                    ),
                    automatic: true,
                    confidence: 0.9,
                },
                ResolutionStrategy {
                    name: "reverse-proxy-multiplexing".to_string(),
                    description: format!(
                        "Route all units through one listener on port {} keyed by hostname",
                        conflict.value
                    ),
                    automatic: false,
                    confidence: 0.55,
                },
            ],
            SharedValueKind::Domain => vec![
                ResolutionStrategy {
                    name: "subdomain-separation".to_string(),
                    description: format!(
                        "Move each conflicting unit to '<unit>.{}'",
                        conflict.value
                    ),
                    automatic: true,
                    confidence: 0.85,
                },
                ResolutionStrategy {
                    name: "path-prefix-routing".to_string(),
                    description: format!(
                        "Serve each unit under '{}/<unit>' behind a shared ingress",
                        conflict.value
                    ),
                    automatic: true,
                    confidence: 0.6,
                },
            ],
            SharedValueKind::Volume => vec![ResolutionStrategy {
                name: "volume-suffixing".to_string(),
                description: format!(
                    "Give each unit its own volume named '{}-<unit>'",
                    conflict.value
                ),
                automatic: true,
                confidence: 0.7,
            }],
            SharedValueKind::ServiceName => vec![ResolutionStrategy {
                name: "service-namespacing".to_string(),
                description: format!(
                    "Prefix the service name '{}' with the owning unit",
                    conflict.value
                ),
                automatic: true,
                confidence: 0.75,
            }],
        };

        strategies.push(ResolutionStrategy {
            name: "manual-review".to_string(),
            description: format!(
                "Operator review of the {} conflict on '{}' between {}",
                conflict.kind.as_str(),
                conflict.value,
                conflict.units.join(", ")
            ),
            automatic: false,
            confidence: 0.4,
        });

        strategies.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        strategies
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_config(unit: &str, values: &[(SharedValueKind, &str)]) -> UnitSharedConfig {
        UnitSharedConfig {
            unit: unit.to_string(),
            values: values
                .iter()
                .map(|(kind, value)| SharedConfigValue {
                    kind: *kind,
                    value: value.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_disjoint_configs_coordinate() {
        let manager = SharedResourceManager::new();
        let report = manager.coordinate_shared_configuration(&[
            unit_config("web", &[(SharedValueKind::Port, "8080")]),
            unit_config("api", &[(SharedValueKind::Port, "8081")]),
        ]);

        assert_eq!(report.status, CoordinationStatus::Coordinated);
        assert!(report.conflicts.is_empty());
    }

    #[test]
    fn test_colliding_domain_detected() {
        let manager = SharedResourceManager::new();
        let report = manager.coordinate_shared_configuration(&[
            unit_config("web", &[(SharedValueKind::Domain, "example.com")]),
            unit_config("blog", &[(SharedValueKind::Domain, "example.com")]),
            unit_config("api", &[(SharedValueKind::Domain, "api.example.com")]),
        ]);

        assert_eq!(report.status, CoordinationStatus::ConflictsDetected);
        assert_eq!(report.conflicts.len(), 1);
        let conflict = &report.conflicts[0];
        assert_eq!(conflict.value, "example.com");
        assert_eq!(conflict.units, vec!["web".to_string(), "blog".to_string()]);
    }

    #[test]
    fn test_same_value_different_kind_is_not_a_conflict() {
        let manager = SharedResourceManager::new();
        let report = manager.coordinate_shared_configuration(&[
            unit_config("web", &[(SharedValueKind::Port, "8080")]),
            unit_config("api", &[(SharedValueKind::ServiceName, "8080")]),
        ]);
        assert_eq!(report.status, CoordinationStatus::Coordinated);
    }

    #[test]
    fn test_port_resolution_ranked_with_automatic_top() {
        let manager = SharedResourceManager::new();
        let conflict = ConfigConflict {
            kind: SharedValueKind::Port,
            value: "8080".to_string(),
            units: vec!["web".to_string(), "api".to_string()],
        };

        let strategies = manager.generate_resolution(&conflict);
        assert_eq!(strategies[0].name, "port-reassignment");
        assert!(strategies[0].automatic);
        assert!(strategies
            .windows(2)
            .all(|pair| pair[0].confidence >= pair[1].confidence));
    }

    #[test]
    fn test_domain_resolution_prefers_subdomain_separation() {
        let manager = SharedResourceManager::new();
        let conflict = ConfigConflict {
            kind: SharedValueKind::Domain,
            value: "example.com".to_string(),
            units: vec!["web".to_string(), "blog".to_string()],
        };

        let strategies = manager.generate_resolution(&conflict);
        assert_eq!(strategies[0].name, "subdomain-separation");
        // manual review is always present as the last resort
        assert!(strategies.iter().any(|s| s.name == "manual-review"));
    }
}
