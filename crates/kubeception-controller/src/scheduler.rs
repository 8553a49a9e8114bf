//! Scheduler reconciler
//!
//! The scheduler reads its kubeconfig through a KubeSchedulerConfiguration,
//! so both documents live in one derived secret mounted at the same path.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Container, Secret};
use k8s_openapi::ByteString;
use serde_json::json;

use kubeception_common::converge::{converge, owner_reference};
use kubeception_common::crd::{validate_version, KubeScheduler, KubeSchedulerSpec};
use kubeception_common::kubeconfig::{synthesize, TlsMaterial};
use kubeception_common::readiness::require;
use kubeception_common::resource::{component_labels, ResourceKind};
use kubeception_common::store::get_typed;
use kubeception_common::{ready, Error, ObjectKey, Outcome, KUBECONFIG_KEY};

use crate::context::{Context, Images};
use crate::workload::{
    http_probe, merge_deployment, mount, secret_volume, strings, tcp_port, DeploymentTemplate,
};
use crate::COMPONENT_KUBE_SCHEDULER;

/// Secure serving port of the scheduler
pub const SECURE_PORT: i32 = 10259;

/// Key of the KubeSchedulerConfiguration document in the config secret
pub const CONFIG_KEY: &str = "config.json";

const AUTH_DIR: &str = "/var/lib/kubernetes/auth";
const TLS_DIR: &str = "/var/lib/kubernetes/tls/ks";

/// Reconcile the KubeScheduler at `key`
pub async fn reconcile(ctx: &Context, key: &ObjectKey) -> Result<Outcome, Error> {
    let store = ctx.store();
    let Some(ks) = get_typed::<KubeScheduler>(store, key).await? else {
        return Ok(Outcome::Done);
    };
    let spec = &ks.spec;
    validate_version(&key.name, "spec.version", &spec.version)?;
    spec.validate(&key.name)?;
    let owner = owner_reference(&ks)?;

    let identity: Secret = ready!(
        require(store, &spec.kube_scheduler_tls.key(&key.namespace)).await?,
        ctx.config.not_ready_requeue
    );

    let kubeconfig = synthesize(
        &TlsMaterial::from_secret(&identity)?,
        &spec.kube_apiserver_service.server_url(),
    )?;
    let config = scheduler_configuration()?;
    converge(
        store,
        &key.sibling(ResourceKind::Secret, config_secret_name(&key.name)),
        &owner,
        |mut secret: Secret| {
            secret.data = Some(
                [
                    (KUBECONFIG_KEY.to_string(), ByteString(kubeconfig.into_bytes())),
                    (CONFIG_KEY.to_string(), ByteString(config.into_bytes())),
                ]
                .into_iter()
                .collect(),
            );
            Ok(secret)
        },
    )
    .await?;

    let deployment_key = key.sibling(
        ResourceKind::Deployment,
        spec.deployment.name_for(&key.name, COMPONENT_KUBE_SCHEDULER),
    );
    let desired = deployment(spec, &key.name, &ctx.config.images).render();
    converge(store, &deployment_key, &owner, |current: Deployment| {
        Ok(merge_deployment(current, desired))
    })
    .await?;

    Ok(Outcome::Done)
}

/// Secret holding the scheduler kubeconfig and configuration of `instance`
pub fn config_secret_name(instance: &str) -> String {
    format!("{}-kube-scheduler-config", instance)
}

/// KubeSchedulerConfiguration pointing at the mounted kubeconfig
pub fn scheduler_configuration() -> Result<String, Error> {
    let config = json!({
        "apiVersion": "kubescheduler.config.k8s.io/v1",
        "kind": "KubeSchedulerConfiguration",
        "clientConnection": {
            "kubeconfig": format!("{}/{}", AUTH_DIR, KUBECONFIG_KEY),
        },
    });
    Ok(serde_json::to_string(&config)?)
}

/// Desired scheduler Deployment for `instance`
pub fn deployment(spec: &KubeSchedulerSpec, instance: &str, images: &Images) -> DeploymentTemplate {
    let kubeconfig = format!("{}/{}", AUTH_DIR, KUBECONFIG_KEY);
    let mut command = strings([
        "/usr/local/bin/kube-scheduler",
        "--authentication-skip-lookup",
    ]);
    let flags = [
        ("--config", format!("{}/{}", AUTH_DIR, CONFIG_KEY)),
        ("--authentication-kubeconfig", kubeconfig.clone()),
        ("--authorization-kubeconfig", kubeconfig),
        ("--tls-cert-file", format!("{}/tls.crt", TLS_DIR)),
        ("--tls-private-key-file", format!("{}/tls.key", TLS_DIR)),
        ("--client-ca-file", format!("{}/ca.crt", TLS_DIR)),
    ];
    for (flag, value) in flags {
        command.push(flag.to_string());
        command.push(value);
    }

    DeploymentTemplate {
        labels: component_labels(COMPONENT_KUBE_SCHEDULER, instance, &spec.deployment.labels),
        replicas: spec.deployment.replicas,
        volumes: vec![
            secret_volume("kubeconfig", &config_secret_name(instance)),
            secret_volume("kube-scheduler", spec.kube_scheduler_tls.as_str()),
        ],
        containers: vec![Container {
            name: COMPONENT_KUBE_SCHEDULER.to_string(),
            image: Some(format!("{}:{}", images.kube_scheduler, spec.version)),
            command: Some(command),
            ports: Some(vec![tcp_port("https", SECURE_PORT)]),
            volume_mounts: Some(vec![
                mount("kube-scheduler", "/etc/ssl/certs"),
                mount("kube-scheduler", TLS_DIR),
                mount("kubeconfig", AUTH_DIR),
            ]),
            liveness_probe: Some(http_probe("/healthz", SECURE_PORT, "HTTPS")),
            ..Default::default()
        }],
        rolling_max_unavailable: None,
        automount_service_account_token: Some(false),
    }
}
