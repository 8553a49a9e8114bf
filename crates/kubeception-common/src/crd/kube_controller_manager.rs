//! KubeControllerManager CRD

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::kube_apiserver::default_service_cluster_ip_range;
use super::types::{ApiServerServiceRef, DeploymentShape, SecretRef};
use crate::Error;

/// KubeControllerManager runs the controller manager against the API server's
/// in-cluster service.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cluster.kubeception.ulfo.fr",
    version = "v1alpha1",
    kind = "KubeControllerManager",
    plural = "kubecontrollermanagers",
    namespaced,
    derive = "PartialEq",
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "kebab-case")]
pub struct KubeControllerManagerSpec {
    /// Image tag; empty inherits the ControlPlane version
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,

    /// Deployment shape
    #[serde(default)]
    pub deployment: DeploymentShape,

    /// Secrets holding the controller manager's TLS material
    #[serde(default)]
    pub tls: ControllerManagerTls,

    /// API server the controller manager talks to
    #[serde(default)]
    pub kube_apiserver_service: ApiServerServiceRef,

    /// Networking options
    #[serde(default)]
    pub options: ControllerManagerOptions,
}

/// TLS secrets consumed by the controller manager pod
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ControllerManagerTls {
    /// CA secret (also used as the cluster signing keypair)
    pub ca: SecretRef,
    /// Controller manager client/serving certificate
    pub kube_controller_manager: SecretRef,
    /// Service account signing keypair
    pub service_accounts: SecretRef,
}

/// Controller manager networking options
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ControllerManagerOptions {
    /// Pod CIDR
    #[serde(default = "default_cluster_cidr")]
    pub cluster_cidr: String,

    /// Service IP range
    #[serde(default = "default_service_cluster_ip_range")]
    pub service_cluster_ip_range: String,
}

fn default_cluster_cidr() -> String {
    "10.200.0.0/16".to_string()
}

impl Default for ControllerManagerOptions {
    fn default() -> Self {
        Self {
            cluster_cidr: default_cluster_cidr(),
            service_cluster_ip_range: default_service_cluster_ip_range(),
        }
    }
}

impl KubeControllerManagerSpec {
    /// Validate references and options
    pub fn validate(&self, resource: &str) -> Result<(), Error> {
        self.tls.ca.validate(resource, "spec.tls.ca")?;
        self.tls
            .kube_controller_manager
            .validate(resource, "spec.tls.kube-controller-manager")?;
        self.tls
            .service_accounts
            .validate(resource, "spec.tls.service-accounts")?;
        if self.options.cluster_cidr.trim().is_empty() {
            return Err(Error::validation_for_field(
                resource,
                "spec.options.cluster-cidr",
                "cluster CIDR cannot be empty",
            ));
        }
        self.deployment.validate(resource)?;
        self.kube_apiserver_service.validate(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn networking_defaults_match_reference_cluster() {
        let options = ControllerManagerOptions::default();
        assert_eq!(options.cluster_cidr, "10.200.0.0/16");
        assert_eq!(options.service_cluster_ip_range, "10.32.0.0/24");
    }

    #[test]
    fn tls_references_are_required() {
        let spec = KubeControllerManagerSpec::default();
        assert!(spec.validate("demo").is_err());

        let spec = KubeControllerManagerSpec {
            tls: ControllerManagerTls {
                ca: "ca".into(),
                kube_controller_manager: "kube-controller-manager".into(),
                service_accounts: "service-accounts".into(),
            },
            ..Default::default()
        };
        assert!(spec.validate("demo").is_ok());
    }
}
