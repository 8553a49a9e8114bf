//! Stories about ownership: cascading deletes and objects controlled by others

use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

use kubeception_common::{Error, ResourceKind};

use super::helpers::*;

/// Story: deleting the ControlPlane garbage collects every component
/// resource and everything those components created
#[tokio::test]
async fn deleting_the_control_plane_removes_everything_it_created() {
    let harness = Harness::new();
    harness.provision("v1.26.1").await;
    assert_eq!(harness.store.keys_of(ResourceKind::Deployment).len(), 3);

    let removed = harness
        .store
        .delete(&key(ResourceKind::ControlPlane, INSTANCE));
    assert!(removed.len() > 1);

    for kind in [
        ResourceKind::ControlPlane,
        ResourceKind::Loadbalancer,
        ResourceKind::Pki,
        ResourceKind::KubeApiServer,
        ResourceKind::KubeControllerManager,
        ResourceKind::KubeScheduler,
        ResourceKind::Service,
        ResourceKind::Deployment,
        ResourceKind::ConfigMap,
        ResourceKind::Issuer,
        ResourceKind::Certificate,
    ] {
        assert!(
            harness.store.keys_of(kind).is_empty(),
            "{kind} objects survived the delete"
        );
    }
    for derived in [
        "demo-admin-kubeconfig",
        "demo-konnectivity-kubeconfig",
        "demo-kube-controller-manager-kubeconfig",
        "demo-kube-scheduler-config",
    ] {
        assert!(!harness.store.contains(&key(ResourceKind::Secret, derived)));
    }
}

/// Story: a component resource removed by hand is recreated on the next tick
#[tokio::test]
async fn deleted_component_is_recreated() {
    let harness = Harness::new();
    harness.provision("v1.26.1").await;

    harness
        .store
        .delete(&key(ResourceKind::KubeScheduler, INSTANCE));
    assert!(harness.deployment("demo-kube-scheduler").is_none());

    harness.settle().await;
    assert!(harness.deployment("demo-kube-scheduler").is_some());
}

/// Story: a Service with the load balancer's name already belongs to another
/// controller, so the reconciler refuses to take it over
#[tokio::test]
async fn foreign_service_is_not_adopted() {
    let harness = Harness::new();
    harness.apply(sample_control_plane("v1.26.1"));
    harness
        .reconcile(&key(ResourceKind::ControlPlane, INSTANCE))
        .await
        .unwrap();

    harness
        .store
        .insert(Service {
            metadata: ObjectMeta {
                name: Some(LB_SERVICE.to_string()),
                namespace: Some(NAMESPACE.to_string()),
                owner_references: Some(vec![OwnerReference {
                    api_version: "apps/v1".to_string(),
                    kind: "Deployment".to_string(),
                    name: "someone-else".to_string(),
                    uid: "0b6f6c55-1f0e-4d0b-9a57-6c7f0e3c8d21".to_string(),
                    controller: Some(true),
                    block_owner_deletion: None,
                }]),
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap();

    let err = harness
        .reconcile(&key(ResourceKind::Loadbalancer, INSTANCE))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Ownership { .. }));
    assert!(!err.is_transient());
}
