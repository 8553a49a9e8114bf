//! KubeScheduler CRD

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ApiServerServiceRef, DeploymentShape, SecretRef};
use crate::Error;

/// KubeScheduler runs the scheduler against the API server's in-cluster service.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cluster.kubeception.ulfo.fr",
    version = "v1alpha1",
    kind = "KubeScheduler",
    plural = "kubeschedulers",
    namespaced,
    derive = "PartialEq",
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "kebab-case")]
pub struct KubeSchedulerSpec {
    /// Image tag; empty inherits the ControlPlane version
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,

    /// Deployment shape
    #[serde(default)]
    pub deployment: DeploymentShape,

    /// Scheduler certificate secret (carries the CA bundle too)
    #[serde(default)]
    pub kube_scheduler_tls: SecretRef,

    /// API server the scheduler talks to
    #[serde(default)]
    pub kube_apiserver_service: ApiServerServiceRef,
}

impl KubeSchedulerSpec {
    /// Validate references
    pub fn validate(&self, resource: &str) -> Result<(), Error> {
        self.kube_scheduler_tls
            .validate(resource, "spec.kube-scheduler-tls")?;
        self.deployment.validate(resource)?;
        self.kube_apiserver_service.validate(resource)
    }
}
