//! Building blocks for workload manifests
//!
//! Reconcilers describe the full desired Deployment with the constructors
//! below, then [`merge_deployment`] folds the fields they own onto the live
//! object. Fields the API server defaults (image pull policy, termination
//! message path, rolling update surge, ...) are left alone, so a converged
//! Deployment compares equal on the next tick.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{
    Deployment, DeploymentSpec, DeploymentStrategy, RollingUpdateDeployment,
};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, HTTPGetAction,
    PodSpec, PodTemplateSpec, Probe, SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use kubeception_common::{LABEL_INSTANCE, LABEL_NAME};

/// Mode the API server assigns to projected secret and configmap files
const DEFAULT_FILE_MODE: i32 = 0o644;

/// Comma-separated label keys the operator last applied to an object
pub const MANAGED_LABELS_ANNOTATION: &str = "cluster.kubeception.ulfo.fr/managed-labels";

/// Volume backed by a secret
pub fn secret_volume(name: &str, secret_name: &str) -> Volume {
    Volume {
        name: name.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret_name.to_string()),
            default_mode: Some(DEFAULT_FILE_MODE),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Volume backed by a configmap
pub fn config_map_volume(name: &str, config_map_name: &str) -> Volume {
    Volume {
        name: name.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: config_map_name.to_string(),
            default_mode: Some(DEFAULT_FILE_MODE),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Scratch volume shared between containers of a pod
pub fn empty_dir_volume(name: &str) -> Volume {
    Volume {
        name: name.to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    }
}

/// Mount `volume` at `path`
pub fn mount(volume: &str, path: &str) -> VolumeMount {
    VolumeMount {
        name: volume.to_string(),
        mount_path: path.to_string(),
        ..Default::default()
    }
}

/// Named TCP container port
pub fn tcp_port(name: &str, port: i32) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_string()),
        container_port: port,
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

/// HTTP(S) GET probe with the timings every control plane component uses
pub fn http_probe(path: &str, port: i32, scheme: &str) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.to_string()),
            port: IntOrString::Int(port),
            scheme: Some(scheme.to_string()),
            ..Default::default()
        }),
        initial_delay_seconds: Some(10),
        timeout_seconds: Some(15),
        failure_threshold: Some(8),
        period_seconds: Some(10),
        success_threshold: Some(1),
        ..Default::default()
    }
}

/// Owned string list from literals
pub fn strings<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Selector labels: stable across spec changes because Deployment selectors
/// are immutable.
pub fn selector_labels(labels: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    labels
        .iter()
        .filter(|(k, _)| k.as_str() == LABEL_NAME || k.as_str() == LABEL_INSTANCE)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Desired shape of a control plane Deployment
pub struct DeploymentTemplate {
    /// Labels on the Deployment and its pods
    pub labels: BTreeMap<String, String>,
    /// Replica count
    pub replicas: i32,
    /// Pod volumes
    pub volumes: Vec<Volume>,
    /// Pod containers
    pub containers: Vec<Container>,
    /// Roll one pod at a time
    pub rolling_max_unavailable: Option<i32>,
    /// Whether to mount the service account token
    pub automount_service_account_token: Option<bool>,
}

impl DeploymentTemplate {
    /// Render as a standalone Deployment (no name or namespace)
    pub fn render(self) -> Deployment {
        Deployment {
            metadata: labelled_meta(&self.labels),
            spec: Some(DeploymentSpec {
                replicas: Some(self.replicas),
                selector: LabelSelector {
                    match_labels: Some(selector_labels(&self.labels)),
                    ..Default::default()
                },
                strategy: self.rolling_max_unavailable.map(|max| DeploymentStrategy {
                    type_: Some("RollingUpdate".to_string()),
                    rolling_update: Some(RollingUpdateDeployment {
                        max_unavailable: Some(IntOrString::Int(max)),
                        ..Default::default()
                    }),
                }),
                template: PodTemplateSpec {
                    metadata: Some(labelled_meta(&self.labels)),
                    spec: Some(PodSpec {
                        volumes: Some(self.volumes),
                        containers: self.containers,
                        automount_service_account_token: self.automount_service_account_token,
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// Fold the fields `desired` sets onto `current`
pub fn merge_deployment(mut current: Deployment, desired: Deployment) -> Deployment {
    merge_labels(&mut current.metadata, &desired.metadata);

    let Some(desired_spec) = desired.spec else {
        return current;
    };
    let spec = current.spec.get_or_insert_with(Default::default);
    spec.replicas = desired_spec.replicas;
    if spec.selector.match_labels.as_ref().map_or(true, |m| m.is_empty()) {
        spec.selector = desired_spec.selector;
    }
    if let Some(desired_strategy) = desired_spec.strategy {
        let strategy = spec.strategy.get_or_insert_with(Default::default);
        strategy.type_ = desired_strategy.type_;
        if let Some(desired_rolling) = desired_strategy.rolling_update {
            let rolling = strategy.rolling_update.get_or_insert_with(Default::default);
            rolling.max_unavailable = desired_rolling.max_unavailable;
        }
    }

    let template = &mut spec.template;
    if let Some(desired_meta) = &desired_spec.template.metadata {
        merge_labels(
            template.metadata.get_or_insert_with(Default::default),
            desired_meta,
        );
    }

    if let Some(desired_pod) = desired_spec.template.spec {
        let pod = template.spec.get_or_insert_with(Default::default);
        pod.volumes = desired_pod.volumes;
        if desired_pod.automount_service_account_token.is_some() {
            pod.automount_service_account_token = desired_pod.automount_service_account_token;
        }
        pod.containers = desired_pod
            .containers
            .into_iter()
            .map(|want| match pod.containers.iter().find(|c| c.name == want.name) {
                Some(have) => merge_container(have.clone(), want),
                None => want,
            })
            .collect();
    }
    current
}

fn merge_container(mut have: Container, want: Container) -> Container {
    have.image = want.image;
    have.command = want.command;
    have.args = want.args;
    have.ports = want.ports;
    have.volume_mounts = want.volume_mounts;
    have.liveness_probe = want.liveness_probe;
    have.readiness_probe = want.readiness_probe;
    have
}

/// Metadata carrying `labels` and the record of which keys are ours
fn labelled_meta(labels: &BTreeMap<String, String>) -> ObjectMeta {
    ObjectMeta {
        labels: Some(labels.clone()),
        annotations: Some(BTreeMap::from([(
            MANAGED_LABELS_ANNOTATION.to_string(),
            managed_keys(labels),
        )])),
        ..Default::default()
    }
}

fn managed_keys(labels: &BTreeMap<String, String>) -> String {
    labels.keys().map(String::as_str).collect::<Vec<_>>().join(",")
}

/// Apply `desired` labels to `current`
///
/// Keys recorded in the managed-labels annotation that `desired` no longer
/// carries are removed. Labels set by others are kept.
pub fn merge_labels(current: &mut ObjectMeta, desired: &ObjectMeta) {
    let Some(labels) = &desired.labels else {
        return;
    };
    let previous: Vec<String> = current
        .annotations
        .as_ref()
        .and_then(|a| a.get(MANAGED_LABELS_ANNOTATION))
        .map(|keys| {
            keys.split(',')
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let live = current.labels.get_or_insert_with(BTreeMap::new);
    for key in previous.iter().filter(|k| !labels.contains_key(*k)) {
        live.remove(key);
    }
    live.extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())));

    current
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(MANAGED_LABELS_ANNOTATION.to_string(), managed_keys(labels));
}
