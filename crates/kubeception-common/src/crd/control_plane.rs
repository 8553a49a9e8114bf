//! ControlPlane CRD: desired state of one virtual control plane

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::kube_apiserver::KubeApiServerSpec;
use super::kube_controller_manager::KubeControllerManagerSpec;
use super::kube_scheduler::KubeSchedulerSpec;
use super::loadbalancer::LoadbalancerSpec;
use super::pki::PkiSpec;
use super::types::{effective_version, validate_version};
use crate::Error;

/// ControlPlane decomposes into a Loadbalancer, a Pki and the three
/// control plane workloads, all named after the ControlPlane and owned by it.
///
/// Example:
/// ```yaml
/// apiVersion: cluster.kubeception.ulfo.fr/v1alpha1
/// kind: ControlPlane
/// metadata:
///   name: demo
/// spec:
///   version: v1.27.1
///   loadbalancer: { name: demo-lb }
///   pki: { ... }
///   kube-apiserver:
///     version: v1.26.4   # optional override
///     etcd-servers: https://etcd:2379
///     tls: { ... }
///   kube-controller-manager: { tls: { ... } }
///   kube-scheduler: { kube-scheduler-tls: kube-scheduler }
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cluster.kubeception.ulfo.fr",
    version = "v1alpha1",
    kind = "ControlPlane",
    plural = "controlplanes",
    shortname = "cp",
    namespaced,
    derive = "PartialEq",
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "kebab-case")]
pub struct ControlPlaneSpec {
    /// Kubernetes version inherited by every workload without an override
    pub version: String,

    /// Certificate hierarchy
    pub pki: PkiSpec,

    /// External entry point
    pub loadbalancer: LoadbalancerSpec,

    /// API server
    pub kube_apiserver: KubeApiServerSpec,

    /// Controller manager
    pub kube_controller_manager: KubeControllerManagerSpec,

    /// Scheduler
    pub kube_scheduler: KubeSchedulerSpec,
}

impl ControlPlaneSpec {
    /// Validate the whole tree before anything is derived from it
    pub fn validate(&self, resource: &str) -> Result<(), Error> {
        validate_version(resource, "spec.version", &self.version)?;
        let overrides = [
            ("spec.kube-apiserver.version", &self.kube_apiserver.version),
            (
                "spec.kube-controller-manager.version",
                &self.kube_controller_manager.version,
            ),
            ("spec.kube-scheduler.version", &self.kube_scheduler.version),
        ];
        for (field, version) in overrides {
            if !version.is_empty() {
                validate_version(resource, field, version)?;
            }
        }
        self.loadbalancer.validate(resource)?;
        self.pki.validate(resource)?;
        self.kube_apiserver.validate(resource)?;
        self.kube_controller_manager.validate(resource)?;
        self.kube_scheduler.validate(resource)
    }

    /// Version the API server runs this tick
    pub fn kube_apiserver_version(&self) -> String {
        effective_version(&self.kube_apiserver.version, &self.version)
    }

    /// Version the controller manager runs this tick
    pub fn kube_controller_manager_version(&self) -> String {
        effective_version(&self.kube_controller_manager.version, &self.version)
    }

    /// Version the scheduler runs this tick
    pub fn kube_scheduler_version(&self) -> String {
        effective_version(&self.kube_scheduler.version, &self.version)
    }
}
