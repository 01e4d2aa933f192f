//! # Shared Resource Coordination
//!
//! Tracks named, capacity-bounded external resources (`port:8080`,
//! `domain:example.com`) and grants claims with shared-vs-exclusive
//! semantics. The orchestrator claims resources before dispatching task sets
//! so two concurrent deployments cannot collide on the same port or domain.
//!
//! Mutations to a resource's lock set are atomic per resource id; claims on
//! different resources never contend for the same entry.

pub mod coordination;

pub use coordination::{
    ConfigConflict, CoordinationReport, CoordinationStatus, ResolutionStrategy, SharedConfigValue,
    SharedValueKind, UnitSharedConfig,
};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::constants::defaults;

/// Errors raised by claim and release operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResourceError {
    #[error("unknown resource '{resource_id}'")]
    UnknownResource { resource_id: String },

    #[error("resource '{resource_id}' is at capacity ({capacity})")]
    AtCapacity { resource_id: String, capacity: usize },

    #[error("resource '{resource_id}' is exclusively locked")]
    ExclusivelyLocked { resource_id: String },

    #[error("resource capacity must be at least 1, got {capacity}")]
    InvalidCapacity { capacity: usize },
}

/// A grant of shared or exclusive access to one resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLock {
    pub claim_id: Uuid,
    pub holder: String,
    pub exclusive: bool,
    pub acquired_at: DateTime<Utc>,
}

/// One registered resource and its active locks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedResource {
    pub id: String,
    pub resource_type: String,
    pub identifier: String,
    pub capacity: usize,
    pub locks: Vec<ResourceLock>,
}

impl SharedResource {
    /// Current usage count; each lock counts once regardless of exclusivity.
    pub fn usage(&self) -> usize {
        self.locks.len()
    }

    fn has_exclusive_lock(&self) -> bool {
        self.locks.iter().any(|lock| lock.exclusive)
    }
}

/// Point-in-time usage snapshot for health reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub resource_id: String,
    pub capacity: usize,
    pub usage: usize,
    pub exclusively_locked: bool,
}

/// Registry of shared resources with claim/release coordination.
///
/// Keyed sharding gives every mutation exclusive access to its resource
/// entry, so concurrent claims on the same id serialize while claims on
/// different ids proceed independently.
#[derive(Debug, Default)]
pub struct SharedResourceManager {
    resources: DashMap<String, SharedResource>,
}

impl SharedResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compose the canonical id for a resource.
    pub fn resource_id(resource_type: &str, identifier: &str) -> String {
        format!("{resource_type}:{identifier}")
    }

    /// Register a resource, returning its id.
    ///
    /// Idempotent by id: re-registering adjusts capacity without disturbing
    /// existing locks.
    pub fn register_shared_resource(
        &self,
        resource_type: &str,
        identifier: &str,
        capacity: Option<usize>,
    ) -> Result<String, ResourceError> {
        let capacity = capacity.unwrap_or(defaults::RESOURCE_CAPACITY);
        if capacity == 0 {
            return Err(ResourceError::InvalidCapacity { capacity });
        }

        let id = Self::resource_id(resource_type, identifier);
        self.resources
            .entry(id.clone())
            .and_modify(|resource| {
                debug!(resource_id = %id, capacity, "Adjusting capacity of registered resource");
                resource.capacity = capacity;
            })
            .or_insert_with(|| {
                info!(resource_id = %id, capacity, "📦 Shared resource registered");
                SharedResource {
                    id: id.clone(),
                    resource_type: resource_type.to_string(),
                    identifier: identifier.to_string(),
                    capacity,
                    locks: Vec::new(),
                }
            });
        Ok(id)
    }

    /// Claim a resource for `holder`.
    ///
    /// Non-exclusive claims fail with [`ResourceError::AtCapacity`] when the
    /// resource is full; any claim fails with
    /// [`ResourceError::ExclusivelyLocked`] when an exclusive lock exists, and
    /// an exclusive claim fails the same way when any lock exists at all.
    pub fn claim_resource(
        &self,
        resource_id: &str,
        holder: &str,
        exclusive: bool,
    ) -> Result<Uuid, ResourceError> {
        let mut resource =
            self.resources
                .get_mut(resource_id)
                .ok_or_else(|| ResourceError::UnknownResource {
                    resource_id: resource_id.to_string(),
                })?;

        if resource.has_exclusive_lock() {
            return Err(ResourceError::ExclusivelyLocked {
                resource_id: resource_id.to_string(),
            });
        }
        if exclusive && !resource.locks.is_empty() {
            return Err(ResourceError::ExclusivelyLocked {
                resource_id: resource_id.to_string(),
            });
        }
        if !exclusive && resource.usage() + 1 > resource.capacity {
            return Err(ResourceError::AtCapacity {
                resource_id: resource_id.to_string(),
                capacity: resource.capacity,
            });
        }

        let claim_id = Uuid::new_v4();
        resource.locks.push(ResourceLock {
            claim_id,
            holder: holder.to_string(),
            exclusive,
            acquired_at: Utc::now(),
        });

        debug!(
            resource_id = %resource_id,
            holder = %holder,
            exclusive,
            usage = resource.usage(),
            capacity = resource.capacity,
            "🔒 Resource claimed"
        );
        Ok(claim_id)
    }

    /// Release a claim, returning whether a lock was actually removed.
    ///
    /// Unknown claim ids return `false` rather than an error so racing
    /// double-releases stay harmless.
    pub fn release_resource(&self, resource_id: &str, claim_id: Uuid) -> bool {
        let Some(mut resource) = self.resources.get_mut(resource_id) else {
            return false;
        };

        let before = resource.locks.len();
        resource.locks.retain(|lock| lock.claim_id != claim_id);
        let released = resource.locks.len() < before;
        if released {
            debug!(
                resource_id = %resource_id,
                claim_id = %claim_id,
                usage = resource.usage(),
                "🔓 Resource released"
            );
        }
        released
    }

    /// Snapshot of a single resource, if registered.
    pub fn resource(&self, resource_id: &str) -> Option<SharedResource> {
        self.resources
            .get(resource_id)
            .map(|entry| entry.value().clone())
    }

    /// Usage snapshot across all registered resources, for health checks.
    pub fn resource_usage(&self) -> Vec<ResourceUsage> {
        let mut usage: Vec<ResourceUsage> = self
            .resources
            .iter()
            .map(|entry| ResourceUsage {
                resource_id: entry.id.clone(),
                capacity: entry.capacity,
                usage: entry.usage(),
                exclusively_locked: entry.has_exclusive_lock(),
            })
            .collect();
        usage.sort_by(|a, b| a.resource_id.cmp(&b.resource_id));
        usage
    }

    /// Number of registered resources.
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent_and_keeps_locks() {
        let manager = SharedResourceManager::new();
        let id = manager
            .register_shared_resource("port", "8080", Some(2))
            .unwrap();
        assert_eq!(id, "port:8080");

        let claim = manager.claim_resource(&id, "web", false).unwrap();

        // Re-register with a new capacity; the existing lock survives
        manager
            .register_shared_resource("port", "8080", Some(3))
            .unwrap();
        let resource = manager.resource(&id).unwrap();
        assert_eq!(resource.capacity, 3);
        assert_eq!(resource.usage(), 1);

        assert!(manager.release_resource(&id, claim));
    }

    #[test]
    fn test_capacity_one_second_claim_fails_until_release() {
        let manager = SharedResourceManager::new();
        let id = manager
            .register_shared_resource("port", "8080", None)
            .unwrap();

        let first = manager.claim_resource(&id, "web", false).unwrap();
        let second = manager.claim_resource(&id, "api", false);
        assert!(matches!(second, Err(ResourceError::AtCapacity { .. })));
        assert!(second.unwrap_err().to_string().contains("at capacity"));

        assert!(manager.release_resource(&id, first));
        assert!(manager.claim_resource(&id, "api", false).is_ok());
    }

    #[test]
    fn test_exclusive_lock_blocks_all_claims() {
        let manager = SharedResourceManager::new();
        let id = manager
            .register_shared_resource("domain", "example.com", Some(5))
            .unwrap();

        let exclusive = manager.claim_resource(&id, "migrator", true).unwrap();

        let shared = manager.claim_resource(&id, "web", false);
        assert!(matches!(
            shared,
            Err(ResourceError::ExclusivelyLocked { .. })
        ));
        assert!(shared
            .unwrap_err()
            .to_string()
            .contains("exclusively locked"));

        let another_exclusive = manager.claim_resource(&id, "backup", true);
        assert!(matches!(
            another_exclusive,
            Err(ResourceError::ExclusivelyLocked { .. })
        ));

        assert!(manager.release_resource(&id, exclusive));
        assert!(manager.claim_resource(&id, "web", false).is_ok());
    }

    #[test]
    fn test_exclusive_claim_fails_when_shared_lock_exists() {
        let manager = SharedResourceManager::new();
        let id = manager
            .register_shared_resource("volume", "data", Some(4))
            .unwrap();

        let _shared = manager.claim_resource(&id, "reader", false).unwrap();
        let exclusive = manager.claim_resource(&id, "writer", true);
        assert!(matches!(
            exclusive,
            Err(ResourceError::ExclusivelyLocked { .. })
        ));
    }

    #[test]
    fn test_release_unknown_claim_returns_false() {
        let manager = SharedResourceManager::new();
        let id = manager
            .register_shared_resource("port", "9090", None)
            .unwrap();

        assert!(!manager.release_resource(&id, Uuid::new_v4()));
        assert!(!manager.release_resource("port:unknown", Uuid::new_v4()));
    }

    #[test]
    fn test_claim_release_round_trip_restores_usage() {
        let manager = SharedResourceManager::new();
        let id = manager
            .register_shared_resource("port", "8443", Some(2))
            .unwrap();

        let before = manager.resource(&id).unwrap().usage();
        let claim = manager.claim_resource(&id, "web", false).unwrap();
        assert_eq!(manager.resource(&id).unwrap().usage(), before + 1);

        assert!(manager.release_resource(&id, claim));
        assert_eq!(manager.resource(&id).unwrap().usage(), before);
        assert!(manager.claim_resource(&id, "web", false).is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let manager = SharedResourceManager::new();
        assert!(matches!(
            manager.register_shared_resource("port", "1", Some(0)),
            Err(ResourceError::InvalidCapacity { .. })
        ));
    }

    #[test]
    fn test_unknown_resource_claim_fails() {
        let manager = SharedResourceManager::new();
        assert!(matches!(
            manager.claim_resource("port:404", "web", false),
            Err(ResourceError::UnknownResource { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_claims_on_capacity_one_admit_exactly_one() {
        use std::sync::Arc;

        let manager = Arc::new(SharedResourceManager::new());
        let id = manager
            .register_shared_resource("port", "8080", None)
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let manager = Arc::clone(&manager);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                manager.claim_resource(&id, &format!("holder-{i}"), false)
            }));
        }

        let mut successes = 0;
        let mut at_capacity = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(ResourceError::AtCapacity { .. }) => at_capacity += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(at_capacity, 7);
    }
}
