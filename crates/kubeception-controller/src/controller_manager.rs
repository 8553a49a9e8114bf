//! Controller manager reconciler

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Container, Secret};

use kubeception_common::converge::{converge, owner_reference};
use kubeception_common::crd::{validate_version, KubeControllerManager, KubeControllerManagerSpec};
use kubeception_common::kubeconfig::{synthesize, TlsMaterial};
use kubeception_common::readiness::require;
use kubeception_common::resource::{component_labels, ResourceKind};
use kubeception_common::store::get_typed;
use kubeception_common::{ready, Error, ObjectKey, Outcome};

use crate::context::{Context, Images};
use crate::pki::converge_kubeconfig;
use crate::workload::{merge_deployment, mount, secret_volume, strings, tcp_port, DeploymentTemplate};
use crate::COMPONENT_KUBE_CONTROLLER_MANAGER;

/// Secure serving port of the controller manager
pub const SECURE_PORT: i32 = 10257;

const AUTH_DIR: &str = "/var/lib/kubernetes/auth";
const KCM_TLS_DIR: &str = "/var/lib/kubernetes/tls/kcm";
const CA_TLS_DIR: &str = "/var/lib/kubernetes/tls/ca";
const SERVICE_ACCOUNT_TLS_DIR: &str = "/var/lib/kubernetes/tls/sa";

/// Reconcile the KubeControllerManager at `key`
pub async fn reconcile(ctx: &Context, key: &ObjectKey) -> Result<Outcome, Error> {
    let store = ctx.store();
    let delay = ctx.config.not_ready_requeue;
    let Some(kcm) = get_typed::<KubeControllerManager>(store, key).await? else {
        return Ok(Outcome::Done);
    };
    let spec = &kcm.spec;
    validate_version(&key.name, "spec.version", &spec.version)?;
    spec.validate(&key.name)?;
    let owner = owner_reference(&kcm)?;

    let identity: Secret = ready!(
        require(store, &spec.tls.kube_controller_manager.key(&key.namespace)).await?,
        delay
    );
    let _service_accounts: Secret = ready!(
        require(store, &spec.tls.service_accounts.key(&key.namespace)).await?,
        delay
    );
    let _ca: Secret = ready!(require(store, &spec.tls.ca.key(&key.namespace)).await?, delay);

    let kubeconfig = synthesize(
        &TlsMaterial::from_secret(&identity)?,
        &spec.kube_apiserver_service.server_url(),
    )?;
    converge_kubeconfig(
        store,
        &key.sibling(ResourceKind::Secret, kubeconfig_name(&key.name)),
        &owner,
        kubeconfig,
    )
    .await?;

    let deployment_key = key.sibling(
        ResourceKind::Deployment,
        spec.deployment.name_for(&key.name, COMPONENT_KUBE_CONTROLLER_MANAGER),
    );
    let desired = deployment(spec, &key.name, &ctx.config.images).render();
    converge(store, &deployment_key, &owner, |current: Deployment| {
        Ok(merge_deployment(current, desired))
    })
    .await?;

    Ok(Outcome::Done)
}

/// Secret holding the controller manager kubeconfig of `instance`
pub fn kubeconfig_name(instance: &str) -> String {
    format!("{}-kube-controller-manager-kubeconfig", instance)
}

/// Desired controller manager Deployment for `instance`
pub fn deployment(
    spec: &KubeControllerManagerSpec,
    instance: &str,
    images: &Images,
) -> DeploymentTemplate {
    DeploymentTemplate {
        labels: component_labels(
            COMPONENT_KUBE_CONTROLLER_MANAGER,
            instance,
            &spec.deployment.labels,
        ),
        replicas: spec.deployment.replicas,
        volumes: vec![
            secret_volume("kubeconfig", &kubeconfig_name(instance)),
            secret_volume(
                "kube-controller-manager",
                spec.tls.kube_controller_manager.as_str(),
            ),
            secret_volume("service-accounts", spec.tls.service_accounts.as_str()),
            secret_volume("ca", spec.tls.ca.as_str()),
        ],
        containers: vec![Container {
            name: COMPONENT_KUBE_CONTROLLER_MANAGER.to_string(),
            image: Some(format!("{}:{}", images.kube_controller_manager, spec.version)),
            command: Some(command(spec)),
            ports: Some(vec![tcp_port("https", SECURE_PORT)]),
            volume_mounts: Some(vec![
                mount("kube-controller-manager", "/etc/ssl/certs"),
                mount("kube-controller-manager", KCM_TLS_DIR),
                mount("ca", CA_TLS_DIR),
                mount("kubeconfig", AUTH_DIR),
                mount("service-accounts", SERVICE_ACCOUNT_TLS_DIR),
            ]),
            ..Default::default()
        }],
        rolling_max_unavailable: None,
        automount_service_account_token: Some(false),
    }
}

/// Command line of the controller manager binary
pub fn command(spec: &KubeControllerManagerSpec) -> Vec<String> {
    let kubeconfig = format!("{}/kubeconfig.yml", AUTH_DIR);
    let ca = format!("{}/ca.crt", KCM_TLS_DIR);
    let mut command = strings([
        "/usr/local/bin/kube-controller-manager",
        "--authentication-skip-lookup",
        "--use-service-account-credentials",
    ]);
    let flags = [
        ("--cluster-cidr", spec.options.cluster_cidr.clone()),
        (
            "--service-cluster-ip-range",
            spec.options.service_cluster_ip_range.clone(),
        ),
        ("--tls-cert-file", format!("{}/tls.crt", KCM_TLS_DIR)),
        ("--tls-private-key-file", format!("{}/tls.key", KCM_TLS_DIR)),
        ("--kubeconfig", kubeconfig.clone()),
        ("--authentication-kubeconfig", kubeconfig.clone()),
        ("--authorization-kubeconfig", kubeconfig),
        ("--client-ca-file", ca.clone()),
        ("--root-ca-file", ca),
        (
            "--service-account-private-key-file",
            format!("{}/tls.key", SERVICE_ACCOUNT_TLS_DIR),
        ),
        ("--cloud-provider", "external".to_string()),
        ("--cluster-signing-cert-file", format!("{}/tls.crt", CA_TLS_DIR)),
        ("--cluster-signing-key-file", format!("{}/tls.key", CA_TLS_DIR)),
        ("--controllers", "*,bootstrapsigner,tokencleaner".to_string()),
    ];
    for (flag, value) in flags {
        command.push(flag.to_string());
        command.push(value);
    }
    command
}
