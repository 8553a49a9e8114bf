//! Stories about reconcilers waiting on prerequisites

use std::time::Duration;

use kubeception_common::crd::{Certificate, KubeApiServer, Loadbalancer, Pki};
use kubeception_common::{Error, Outcome, ResourceKind};

use super::helpers::*;

const REQUEUE: Outcome = Outcome::RequeueAfter(Duration::from_secs(3));

/// Story: until the cloud assigns an address, the PKI stops after the admin
/// certificate and no workload is deployed
#[tokio::test]
async fn nothing_past_the_admin_certificate_without_an_address() {
    let harness = Harness::new();
    harness.apply(sample_control_plane("v1.26.1"));
    harness.settle().await;

    let certificates: Vec<String> = harness
        .store
        .keys_of(ResourceKind::Certificate)
        .into_iter()
        .map(|k| k.name)
        .collect();
    assert_eq!(certificates, vec!["demo-admin", "demo-ca"]);
    assert_eq!(
        harness.store.keys_of(ResourceKind::Issuer).len(),
        2,
        "root and CA issuers"
    );

    let pki = harness.reconcile(&key(ResourceKind::Pki, INSTANCE)).await.unwrap();
    assert_eq!(pki, REQUEUE);
    assert!(harness.store.keys_of(ResourceKind::Deployment).is_empty());
    assert!(!harness
        .store
        .contains(&key(ResourceKind::Secret, "demo-admin-kubeconfig")));
}

/// Story: the API server reconciler finds none of its secrets, so it
/// requeues after the fixed delay without writing anything
#[tokio::test]
async fn api_server_waits_for_its_secrets() {
    let harness = Harness::new();
    harness.apply(sample_control_plane("v1.26.1"));
    harness
        .reconcile(&key(ResourceKind::ControlPlane, INSTANCE))
        .await
        .unwrap();

    let before = harness.store.write_count();
    let outcome = harness
        .reconcile(&key(ResourceKind::KubeApiServer, INSTANCE))
        .await
        .unwrap();
    assert_eq!(outcome, REQUEUE);
    assert_eq!(harness.store.write_count(), before);
    assert!(harness.deployment("demo-kube-apiserver").is_none());
}

/// Story: the CA secret is the one missing piece; the API server still waits
#[tokio::test]
async fn api_server_waits_for_the_ca_alone() {
    let harness = Harness::new();
    harness.apply(sample_control_plane("v1.26.1"));
    harness
        .reconcile(&key(ResourceKind::ControlPlane, INSTANCE))
        .await
        .unwrap();
    for name in [
        "demo-kube-apiserver",
        "demo-service-accounts",
        "demo-konnectivity",
    ] {
        harness
            .store
            .insert(tls_secret(name, CERTIFICATE_PEM))
            .unwrap();
    }

    let outcome = harness
        .reconcile(&key(ResourceKind::KubeApiServer, INSTANCE))
        .await
        .unwrap();
    assert_eq!(outcome, REQUEUE);
    assert!(harness.deployment("demo-kube-apiserver").is_none());

    harness.store.insert(tls_secret("demo-ca", CA_PEM)).unwrap();
    let outcome = harness
        .reconcile(&key(ResourceKind::KubeApiServer, INSTANCE))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Done);
    assert!(harness.deployment("demo-kube-apiserver").is_some());
}

/// Story: a scheduler secret without PEM material is a hard failure, not a wait
#[tokio::test]
async fn malformed_tls_material_is_fatal() {
    let harness = Harness::new();
    harness.apply(sample_control_plane("v1.26.1"));
    harness
        .reconcile(&key(ResourceKind::ControlPlane, INSTANCE))
        .await
        .unwrap();
    harness
        .store
        .insert(tls_secret("demo-kube-scheduler", "not a certificate"))
        .unwrap();

    let err = harness
        .reconcile(&key(ResourceKind::KubeScheduler, INSTANCE))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Credential { .. }));
    assert!(!err.is_transient());
    assert!(harness.deployment("demo-kube-scheduler").is_none());
}

/// Story: once the address arrives, the leaf certificates follow on the
/// next ticks
#[tokio::test]
async fn address_unblocks_leaf_certificates() {
    let harness = Harness::new();
    harness.apply(sample_control_plane("v1.26.1"));
    harness.settle().await;
    harness.assign_ingress(ADDRESS);
    harness.settle().await;

    for name in [
        "demo-kube-apiserver",
        "demo-service-accounts",
        "demo-kube-controller-manager",
        "demo-kube-scheduler",
        "demo-konnectivity",
    ] {
        let cert: Option<Certificate> = harness.store.fetch(NAMESPACE, name);
        let cert = cert.unwrap_or_else(|| panic!("{name} was requested"));
        assert_eq!(cert.spec.issuer_ref.name, "demo-ca");
    }
}

/// Story: the load balancer loses its ingress, so the published address is
/// cleared instead of a stale one flowing into the components
#[tokio::test]
async fn lost_ingress_clears_the_published_address() {
    let harness = Harness::new();
    harness.provision("v1.26.1").await;

    harness.withdraw_ingress();
    harness.settle().await;

    let lb: Loadbalancer = harness.store.fetch(NAMESPACE, INSTANCE).unwrap();
    assert_eq!(lb.observed_address(), None);
    let pki: Pki = harness.store.fetch(NAMESPACE, INSTANCE).unwrap();
    assert_eq!(pki.spec.address(), None);
    let kas: KubeApiServer = harness.store.fetch(NAMESPACE, INSTANCE).unwrap();
    assert_eq!(kas.spec.options.advertise_address, None);

    let outcome = harness.reconcile(&key(ResourceKind::Pki, INSTANCE)).await.unwrap();
    assert_eq!(outcome, REQUEUE);
}
