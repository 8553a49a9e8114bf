//! API server reconciler
//!
//! Runs the API server with a konnectivity server sidecar. The sidecar talks
//! to the API server over a unix socket on a shared scratch volume and
//! authenticates back to it with a kubeconfig derived from the konnectivity
//! certificate.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Container, Secret};

use kubeception_common::converge::{converge, owner_reference};
use kubeception_common::crd::{validate_version, KubeApiServer, KubeApiServerSpec};
use kubeception_common::kubeconfig::{synthesize, TlsMaterial};
use kubeception_common::readiness::require;
use kubeception_common::resource::{component_labels, ResourceKind};
use kubeception_common::store::get_typed;
use kubeception_common::{
    kubeconfig_secret_name, ready, Error, ObjectKey, Outcome, API_SERVER_PORT,
    KONNECTIVITY_AGENT_PORT,
};

use crate::context::{Context, Images};
use crate::pki::converge_kubeconfig;
use crate::workload::{
    config_map_volume, empty_dir_volume, http_probe, merge_deployment, mount, secret_volume,
    strings, tcp_port, DeploymentTemplate,
};
use crate::COMPONENT_KUBE_APISERVER;

/// Key of the egress selector document in its ConfigMap
pub const EGRESS_CONFIG_KEY: &str = "egress.yaml";

/// Unix socket shared by the API server and the konnectivity server
pub const KONNECTIVITY_SOCKET: &str = "/etc/kubernetes/konnectivity-socket/konnectivity-server.socket";

const KONNECTIVITY_ADMIN_PORT: i32 = 8095;
const KONNECTIVITY_HEALTH_PORT: i32 = 8092;

const SOCKET_DIR: &str = "/etc/kubernetes/konnectivity-socket";
const EGRESS_DIR: &str = "/etc/kubernetes/konnectivity-egress";
const KONNECTIVITY_AUTH_DIR: &str = "/etc/kubernetes/konnectivity";
const KONNECTIVITY_TLS_DIR: &str = "/etc/kubernetes/tls";
const APISERVER_TLS_DIR: &str = "/var/lib/kubernetes/tls/kube-apiserver";
const SERVICE_ACCOUNT_TLS_DIR: &str = "/var/lib/kubernetes/tls/sa";

/// Reconcile the KubeAPIServer at `key`
pub async fn reconcile(ctx: &Context, key: &ObjectKey) -> Result<Outcome, Error> {
    let store = ctx.store();
    let delay = ctx.config.not_ready_requeue;
    let Some(kas) = get_typed::<KubeApiServer>(store, key).await? else {
        return Ok(Outcome::Done);
    };
    let spec = &kas.spec;
    validate_version(&key.name, "spec.version", &spec.version)?;
    spec.validate(&key.name)?;
    let owner = owner_reference(&kas)?;

    let tls = &spec.tls;
    let _ca: Secret = ready!(
        require(store, &tls.ca_secret_name.key(&key.namespace)).await?,
        delay
    );
    let _serving: Secret = ready!(
        require(store, &tls.kube_apiserver_secret_name.key(&key.namespace)).await?,
        delay
    );
    let _service_accounts: Secret = ready!(
        require(store, &tls.service_accounts_secret_name.key(&key.namespace)).await?,
        delay
    );
    let konnectivity: Secret = ready!(
        require(store, &tls.konnectivity_secret_name.key(&key.namespace)).await?,
        delay
    );

    let konnectivity_kubeconfig = synthesize(
        &TlsMaterial::from_secret(&konnectivity)?,
        &spec.kube_apiserver_service.server_url(),
    )?;
    converge_kubeconfig(
        store,
        &key.sibling(ResourceKind::Secret, konnectivity_kubeconfig_name(spec)),
        &owner,
        konnectivity_kubeconfig,
    )
    .await?;

    converge(
        store,
        &key.sibling(ResourceKind::ConfigMap, egress_config_map_name(&key.name)),
        &owner,
        |mut cm: ConfigMap| {
            cm.data = Some(BTreeMap::from([(
                EGRESS_CONFIG_KEY.to_string(),
                egress_selector_configuration(),
            )]));
            Ok(cm)
        },
    )
    .await?;

    let deployment_key = key.sibling(
        ResourceKind::Deployment,
        spec.deployment.name_for(&key.name, COMPONENT_KUBE_APISERVER),
    );
    let desired = deployment(spec, &key.name, &ctx.config.images).render();
    converge(store, &deployment_key, &owner, |current: Deployment| {
        Ok(merge_deployment(current, desired))
    })
    .await?;

    Ok(Outcome::Done)
}

/// Secret holding the konnectivity server's kubeconfig
pub fn konnectivity_kubeconfig_name(spec: &KubeApiServerSpec) -> String {
    kubeconfig_secret_name(spec.tls.konnectivity_secret_name.as_str())
}

/// ConfigMap holding the egress selector configuration of `instance`
pub fn egress_config_map_name(instance: &str) -> String {
    format!("{}-konnectivity-egress", instance)
}

/// Egress selector configuration routing cluster traffic through konnectivity
pub fn egress_selector_configuration() -> String {
    format!(
        "apiVersion: apiserver.k8s.io/v1beta1
kind: EgressSelectorConfiguration
egressSelections:
- name: cluster
  connection:
    proxyProtocol: GRPC
    transport:
      uds:
        udsName: {}
",
        KONNECTIVITY_SOCKET
    )
}

/// Desired API server Deployment for `instance`
pub fn deployment(
    spec: &KubeApiServerSpec,
    instance: &str,
    images: &Images,
) -> DeploymentTemplate {
    let tls = &spec.tls;
    DeploymentTemplate {
        labels: component_labels(COMPONENT_KUBE_APISERVER, instance, &spec.deployment.labels),
        replicas: spec.deployment.replicas,
        volumes: vec![
            secret_volume("ca", tls.ca_secret_name.as_str()),
            secret_volume("service-accounts", tls.service_accounts_secret_name.as_str()),
            secret_volume("kube-apiserver", tls.kube_apiserver_secret_name.as_str()),
            config_map_volume("konnectivity-egress", &egress_config_map_name(instance)),
            secret_volume("konnectivity-kubeconfig", &konnectivity_kubeconfig_name(spec)),
            empty_dir_volume("konnectivity-socket"),
        ],
        containers: vec![
            konnectivity_container(spec, images),
            apiserver_container(spec, images),
        ],
        rolling_max_unavailable: Some(1),
        automount_service_account_token: None,
    }
}

fn konnectivity_container(spec: &KubeApiServerSpec, images: &Images) -> Container {
    let mut args = strings([
        "--logtostderr=true",
        "--delete-existing-uds-file",
        "--mode=grpc",
        "--server-port=0",
        "--agent-namespace=kube-system",
        "--agent-service-account=konnectivity-agent",
        "--authentication-audience=system:konnectivity-server",
    ]);
    args.extend([
        format!("--uds-name={}", KONNECTIVITY_SOCKET),
        format!("--cluster-cert={}/tls.crt", KONNECTIVITY_TLS_DIR),
        format!("--cluster-key={}/tls.key", KONNECTIVITY_TLS_DIR),
        format!("--server-count={}", spec.deployment.replicas),
        format!("--kubeconfig={}/kubeconfig.yml", KONNECTIVITY_AUTH_DIR),
    ]);

    Container {
        name: "konnectivity".to_string(),
        image: Some(images.konnectivity_server.clone()),
        command: Some(strings(["/proxy-server"])),
        args: Some(args),
        ports: Some(vec![
            tcp_port("grpc", KONNECTIVITY_AGENT_PORT),
            tcp_port("admin", KONNECTIVITY_ADMIN_PORT),
            tcp_port("health", KONNECTIVITY_HEALTH_PORT),
        ]),
        volume_mounts: Some(vec![
            mount("konnectivity-socket", SOCKET_DIR),
            mount("konnectivity-kubeconfig", KONNECTIVITY_AUTH_DIR),
            mount("kube-apiserver", KONNECTIVITY_TLS_DIR),
        ]),
        liveness_probe: Some(http_probe("/healthz", KONNECTIVITY_HEALTH_PORT, "HTTP")),
        ..Default::default()
    }
}

/// Command line of the API server binary
pub fn apiserver_command(spec: &KubeApiServerSpec) -> Vec<String> {
    let serving_cert = format!("{}/tls.crt", APISERVER_TLS_DIR);
    let serving_key = format!("{}/tls.key", APISERVER_TLS_DIR);
    let client_ca = format!("{}/ca.crt", APISERVER_TLS_DIR);

    let mut command = strings(["/usr/local/bin/kube-apiserver"]);
    if let Some(address) = spec.options.advertise_address.as_deref().filter(|a| !a.is_empty()) {
        command.extend(["--advertise-address".to_string(), address.to_string()]);
    }
    let flags = [
        ("--runtime-config", "api/all=true".to_string()),
        (
            "--service-cluster-ip-range",
            spec.options.service_cluster_ip_range.clone(),
        ),
        ("--authorization-mode", "RBAC,Node".to_string()),
        ("--client-ca-file", client_ca.clone()),
        ("--etcd-servers", spec.etcd_servers.clone()),
        ("--service-account-issuer", "https://kube-apiserver".to_string()),
        (
            "--service-account-key-file",
            format!("{}/tls.crt", SERVICE_ACCOUNT_TLS_DIR),
        ),
        (
            "--service-account-signing-key-file",
            format!("{}/tls.key", SERVICE_ACCOUNT_TLS_DIR),
        ),
        ("--tls-cert-file", serving_cert.clone()),
        ("--tls-private-key-file", serving_key.clone()),
        (
            "--egress-selector-config-file",
            format!("{}/{}", EGRESS_DIR, EGRESS_CONFIG_KEY),
        ),
        (
            "--enable-admission-plugins",
            "NamespaceLifecycle,NodeRestriction,LimitRanger,ServiceAccount,DefaultStorageClass,ResourceQuota"
                .to_string(),
        ),
        (
            "--kubelet-preferred-address-types",
            "ExternalIP,InternalIP,Hostname".to_string(),
        ),
        ("--kubelet-client-certificate", serving_cert.clone()),
        ("--kubelet-client-key", serving_key.clone()),
    ];
    command.push("--allow-privileged".to_string());
    command.push("--enable-bootstrap-token-auth".to_string());
    for (flag, value) in flags {
        command.push(flag.to_string());
        command.push(value);
    }
    command.extend([
        format!("--requestheader-client-ca-file={}", client_ca),
        "--requestheader-allowed-names=front-proxy-client".to_string(),
        "--requestheader-extra-headers-prefix=X-Remote-Extra-".to_string(),
        "--requestheader-group-headers=X-Remote-Group".to_string(),
        "--requestheader-username-headers=X-Remote-User".to_string(),
        format!("--proxy-client-cert-file={}", serving_cert),
        format!("--proxy-client-key-file={}", serving_key),
    ]);
    command
}

fn apiserver_container(spec: &KubeApiServerSpec, images: &Images) -> Container {
    Container {
        name: COMPONENT_KUBE_APISERVER.to_string(),
        image: Some(format!("{}:{}", images.kube_apiserver, spec.version)),
        command: Some(apiserver_command(spec)),
        ports: Some(vec![tcp_port("https", API_SERVER_PORT)]),
        volume_mounts: Some(vec![
            mount("service-accounts", SERVICE_ACCOUNT_TLS_DIR),
            mount("kube-apiserver", APISERVER_TLS_DIR),
            mount("konnectivity-socket", SOCKET_DIR),
            mount("konnectivity-egress", EGRESS_DIR),
        ]),
        liveness_probe: Some(http_probe("/livez", API_SERVER_PORT, "HTTPS")),
        readiness_probe: Some(http_probe("/readyz", API_SERVER_PORT, "HTTPS")),
        ..Default::default()
    }
}
