//! Shared-resource coordination scenarios: claim/release semantics under
//! concurrency and configuration conflict resolution.

use std::sync::Arc;

use rollout_core::resources::{
    CoordinationStatus, SharedConfigValue, SharedResourceManager, SharedValueKind,
    UnitSharedConfig,
};

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

#[tokio::test]
async fn test_two_deployments_cannot_share_a_capacity_one_port() {
    let manager = Arc::new(SharedResourceManager::new());
    let id = manager
        .register_shared_resource("port", "8080", None)
        .unwrap();

    let blue = manager.claim_resource(&id, "blue-deploy", false).unwrap();
    let green = manager.claim_resource(&id, "green-deploy", false);
    assert!(green.unwrap_err().to_string().contains("at capacity"));

    assert!(manager.release_resource(&id, blue));
    assert!(manager.claim_resource(&id, "green-deploy", false).is_ok());
}

#[tokio::test]
async fn test_exclusive_migration_lock_excludes_everyone() {
    let manager = SharedResourceManager::new();
    let id = manager
        .register_shared_resource("domain", "example.com", Some(10))
        .unwrap();

    let migration = manager.claim_resource(&id, "schema-migration", true).unwrap();

    for holder in ["web", "api", "worker"] {
        let err = manager.claim_resource(&id, holder, false).unwrap_err();
        assert!(err.to_string().contains("exclusively locked"));
    }

    assert!(manager.release_resource(&id, migration));
    assert!(manager.claim_resource(&id, "web", false).is_ok());
}

#[tokio::test]
async fn test_claims_on_different_resources_are_independent() {
    let manager = Arc::new(SharedResourceManager::new());
    let mut ids = Vec::new();
    for port in 8080..8090 {
        ids.push(
            manager
                .register_shared_resource("port", &port.to_string(), None)
                .unwrap(),
        );
    }

    let mut handles = Vec::new();
    for id in &ids {
        let manager = Arc::clone(&manager);
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            manager.claim_resource(&id, "deploy", false)
        }));
    }

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    let usage = manager.resource_usage();
    assert_eq!(usage.len(), 10);
    assert!(usage.iter().all(|u| u.usage == 1));
}

#[tokio::test]
async fn test_conflicting_domains_produce_ranked_resolutions() {
    let manager = SharedResourceManager::new();
    let report = manager.coordinate_shared_configuration(&[
        unit_config(
            "storefront",
            &[
                (SharedValueKind::Domain, "shop.example.com"),
                (SharedValueKind::Port, "3000"),
            ],
        ),
        unit_config(
            "checkout",
            &[
                (SharedValueKind::Domain, "shop.example.com"),
                (SharedValueKind::Port, "3001"),
            ],
        ),
    ]);

    assert_eq!(report.status, CoordinationStatus::ConflictsDetected);
    assert_eq!(report.conflicts.len(), 1);

    let strategies = manager.generate_resolution(&report.conflicts[0]);
    assert_eq!(strategies[0].name, "subdomain-separation");
    assert!(strategies[0].automatic);
    assert!(strategies[0].confidence > strategies.last().unwrap().confidence);
}

#[tokio::test]
async fn test_round_trip_restores_pre_claim_state() {
    let manager = SharedResourceManager::new();
    let id = manager
        .register_shared_resource("volume", "shared-cache", Some(3))
        .unwrap();

    let before = manager.resource(&id).unwrap();
    let claim = manager.claim_resource(&id, "warmup", false).unwrap();
    let during = manager.resource(&id).unwrap();
    assert_eq!(during.usage(), before.usage() + 1);

    assert!(manager.release_resource(&id, claim));
    let after = manager.resource(&id).unwrap();
    assert_eq!(after.usage(), before.usage());

    // an equivalent claim succeeds again
    assert!(manager.claim_resource(&id, "warmup", false).is_ok());
}
