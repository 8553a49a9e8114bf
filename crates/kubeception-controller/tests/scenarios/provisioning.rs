//! Stories about a ControlPlane converging into running workloads

use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use kubeception_common::crd::{Certificate, KubeApiServer, Loadbalancer, Pki};
use kubeception_common::kubeconfig::Kubeconfig;
use kubeception_common::{ResourceKind, KUBECONFIG_KEY, LABEL_INSTANCE, LABEL_NAME};

use super::helpers::*;

/// Story: a platform engineer submits a ControlPlane and, once the cloud
/// assigns an address, all three workloads run the requested version
#[tokio::test]
async fn control_plane_comes_up_with_requested_version() {
    let harness = Harness::new();
    harness.provision("v1.26.1").await;

    assert_eq!(
        harness.image("demo-kube-apiserver", "kube-apiserver"),
        "registry.k8s.io/kube-apiserver:v1.26.1"
    );
    assert_eq!(
        harness.image("demo-kube-controller-manager", "kube-controller-manager"),
        "registry.k8s.io/kube-controller-manager:v1.26.1"
    );
    assert_eq!(
        harness.image("demo-kube-scheduler", "kube-scheduler"),
        "registry.k8s.io/kube-scheduler:v1.26.1"
    );

    let lb: Loadbalancer = harness.store.fetch(NAMESPACE, INSTANCE).unwrap();
    assert_eq!(lb.observed_address(), Some(ADDRESS));
}

/// Story: bumping the ControlPlane version rolls every workload forward
#[tokio::test]
async fn version_bump_propagates_to_every_workload() {
    let harness = Harness::new();
    harness.provision("v1.26.1").await;

    harness.edit_control_plane(|spec| spec.version = "v1.27.1".to_string());
    harness.settle().await;

    assert!(harness
        .image("demo-kube-apiserver", "kube-apiserver")
        .ends_with(":v1.27.1"));
    assert!(harness
        .image("demo-kube-controller-manager", "kube-controller-manager")
        .ends_with(":v1.27.1"));
    assert!(harness
        .image("demo-kube-scheduler", "kube-scheduler")
        .ends_with(":v1.27.1"));
}

/// Story: pinning the API server to an older version leaves the other
/// components on the ControlPlane version
#[tokio::test]
async fn component_override_is_isolated() {
    let harness = Harness::new();
    harness.provision("v1.26.1").await;

    harness.edit_control_plane(|spec| spec.kube_apiserver.version = "v1.25.1".to_string());
    harness.settle().await;

    assert!(harness
        .image("demo-kube-apiserver", "kube-apiserver")
        .ends_with(":v1.25.1"));
    assert!(harness
        .image("demo-kube-controller-manager", "kube-controller-manager")
        .ends_with(":v1.26.1"));
    assert!(harness
        .image("demo-kube-scheduler", "kube-scheduler")
        .ends_with(":v1.26.1"));

    let kas: KubeApiServer = harness.store.fetch(NAMESPACE, INSTANCE).unwrap();
    assert_eq!(kas.spec.version, "v1.25.1");
}

/// Story: once converged, another full round of reconciles changes nothing
#[tokio::test]
async fn converged_control_plane_issues_no_writes() {
    let harness = Harness::new();
    harness.provision("v1.26.1").await;

    let before = harness.store.write_count();
    for (key, result) in harness.reconcile_all().await {
        assert!(result.unwrap().is_done(), "{key} did not finish");
    }
    assert_eq!(harness.store.write_count(), before);
}

/// Story: the load balancer fronts API server pods on both the API and the
/// konnectivity agent port, selecting them by fixed labels plus the overlay
#[tokio::test]
async fn load_balancer_selects_api_server_pods() {
    let harness = Harness::new();
    harness.provision("v1.26.1").await;

    let svc: Service = harness.store.fetch(NAMESPACE, LB_SERVICE).unwrap();
    let spec = svc.spec.unwrap();
    assert_eq!(spec.type_.as_deref(), Some("LoadBalancer"));

    let ports: Vec<_> = spec
        .ports
        .unwrap()
        .into_iter()
        .map(|p| (p.port, p.target_port))
        .collect();
    assert_eq!(
        ports,
        vec![
            (6443, Some(IntOrString::Int(6443))),
            (8091, Some(IntOrString::Int(8091))),
        ]
    );

    let selector = spec.selector.unwrap();
    assert_eq!(selector[LABEL_NAME], "kube-apiserver");
    assert_eq!(selector[LABEL_INSTANCE], INSTANCE);
    assert_eq!(selector["team"], "a");

    let pod_labels = harness
        .deployment("demo-kube-apiserver")
        .unwrap()
        .spec
        .unwrap()
        .template
        .metadata
        .unwrap()
        .labels
        .unwrap();
    for (k, v) in &selector {
        assert_eq!(pod_labels.get(k), Some(v), "pods lack selector label {k}");
    }
}

/// Story: the address the cloud assigned ends up in the API server
/// certificate and the admin kubeconfig
#[tokio::test]
async fn address_flows_into_certificate_and_admin_kubeconfig() {
    let harness = Harness::new();
    harness.provision("v1.26.1").await;

    let pki: Pki = harness.store.fetch(NAMESPACE, INSTANCE).unwrap();
    assert_eq!(pki.spec.address(), Some(ADDRESS));

    let cert: Certificate = harness
        .store
        .fetch(NAMESPACE, "demo-kube-apiserver")
        .unwrap();
    assert!(cert.spec.ip_addresses.contains(&ADDRESS.to_string()));
    assert!(cert.spec.ip_addresses.contains(&"10.32.0.1".to_string()));
    assert!(cert.spec.dns_names.contains(&ADDRESS.to_string()));

    let document = harness
        .secret_entry("demo-admin-kubeconfig", KUBECONFIG_KEY)
        .expect("admin kubeconfig exists");
    let config = Kubeconfig::parse(&document).unwrap();
    assert_eq!(
        config.current_cluster().unwrap().server,
        format!("https://{}:6443", ADDRESS)
    );
}

/// Story: workloads reach the API server through its in-cluster service
#[tokio::test]
async fn component_credentials_target_the_api_server_service() {
    let harness = Harness::new();
    harness.provision("v1.26.1").await;

    for secret in [
        "demo-konnectivity-kubeconfig",
        "demo-kube-controller-manager-kubeconfig",
        "demo-kube-scheduler-config",
    ] {
        let document = harness
            .secret_entry(secret, KUBECONFIG_KEY)
            .unwrap_or_else(|| panic!("{secret} holds a kubeconfig"));
        let config = Kubeconfig::parse(&document).unwrap();
        assert_eq!(
            config.current_cluster().unwrap().server,
            "https://kube-apiserver:6443"
        );
    }

    assert!(harness
        .secret_entry("demo-kube-scheduler-config", "config.json")
        .is_some());
    assert!(harness
        .store
        .contains(&key(ResourceKind::ConfigMap, "demo-konnectivity-egress")));
}

/// Story: the cloud moves the load balancer to a new address, and every
/// derived artifact follows the address observed now, not the first one
#[tokio::test]
async fn new_address_replaces_the_old_one_everywhere() {
    const MOVED: &str = "198.51.100.7";
    let harness = Harness::new();
    harness.provision("v1.26.1").await;

    harness.assign_ingress(MOVED);
    harness.settle().await;

    let cert: Certificate = harness
        .store
        .fetch(NAMESPACE, "demo-kube-apiserver")
        .unwrap();
    assert_eq!(cert.spec.ip_addresses, vec!["10.32.0.1", MOVED]);
    assert!(cert.spec.dns_names.contains(&MOVED.to_string()));
    assert!(!cert.spec.dns_names.contains(&ADDRESS.to_string()));

    let document = harness
        .secret_entry("demo-admin-kubeconfig", KUBECONFIG_KEY)
        .expect("admin kubeconfig exists");
    let config = Kubeconfig::parse(&document).unwrap();
    assert_eq!(
        config.current_cluster().unwrap().server,
        format!("https://{}:6443", MOVED)
    );

    let kas: KubeApiServer = harness.store.fetch(NAMESPACE, INSTANCE).unwrap();
    assert_eq!(kas.spec.options.advertise_address.as_deref(), Some(MOVED));

    let command = harness
        .deployment("demo-kube-apiserver")
        .and_then(|d| d.spec)
        .and_then(|s| s.template.spec)
        .and_then(|pod| pod.containers.into_iter().find(|c| c.name == "kube-apiserver"))
        .and_then(|c| c.command)
        .unwrap();
    let advertised = command
        .iter()
        .position(|arg| arg == "--advertise-address")
        .map(|i| command[i + 1].as_str());
    assert_eq!(advertised, Some(MOVED));
}

/// Story: an IPv6 load balancer address still yields a usable admin kubeconfig
#[tokio::test]
async fn ipv6_address_is_bracketed_in_the_admin_kubeconfig() {
    const IPV6: &str = "2001:db8::10";
    let harness = Harness::new();
    harness.apply(sample_control_plane("v1.26.1"));
    harness.settle().await;
    harness.assign_ingress(IPV6);
    harness.settle().await;

    let document = harness
        .secret_entry("demo-admin-kubeconfig", KUBECONFIG_KEY)
        .expect("admin kubeconfig exists");
    let config = Kubeconfig::parse(&document).unwrap();
    assert_eq!(
        config.current_cluster().unwrap().server,
        "https://[2001:db8::10]:6443"
    );

    let cert: Certificate = harness
        .store
        .fetch(NAMESPACE, "demo-kube-apiserver")
        .unwrap();
    assert!(cert.spec.ip_addresses.contains(&IPV6.to_string()));
}

/// Story: dropping an overlay selector from the load balancer removes the
/// label from the API server pods as well as from the Service selector
#[tokio::test]
async fn removed_overlay_selector_leaves_the_api_server_pods() {
    let harness = Harness::new();
    harness.provision("v1.26.1").await;

    harness.edit_control_plane(|spec| spec.loadbalancer.selectors.clear());
    harness.settle().await;

    let svc: Service = harness.store.fetch(NAMESPACE, LB_SERVICE).unwrap();
    assert!(!svc.spec.unwrap().selector.unwrap().contains_key("team"));

    let deployment = harness.deployment("demo-kube-apiserver").unwrap();
    assert!(!deployment.metadata.labels.unwrap().contains_key("team"));
    let pod_labels = deployment
        .spec
        .unwrap()
        .template
        .metadata
        .unwrap()
        .labels
        .unwrap();
    assert!(!pod_labels.contains_key("team"));
    assert_eq!(pod_labels[LABEL_NAME], "kube-apiserver");
}
