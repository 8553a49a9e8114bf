//! KubeAPIServer CRD

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ApiServerServiceRef, DeploymentShape, SecretRef};
use crate::Error;

/// KubeAPIServer runs the API server with a konnectivity server sidecar.
///
/// Example:
/// ```yaml
/// apiVersion: cluster.kubeception.ulfo.fr/v1alpha1
/// kind: KubeAPIServer
/// metadata:
///   name: demo
/// spec:
///   version: v1.27.1
///   etcd-servers: https://etcd:2379
///   deployment: { replicas: 2 }
///   tls:
///     ca-secret-name: ca
///     kube-apiserver-secret-name: kube-apiserver
///     service-accounts-secret-name: service-accounts
///     konnectivity-secret-name: konnectivity
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cluster.kubeception.ulfo.fr",
    version = "v1alpha1",
    kind = "KubeAPIServer",
    plural = "kubeapiservers",
    namespaced,
    derive = "PartialEq",
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "kebab-case")]
pub struct KubeApiServerSpec {
    /// Image tag; empty inherits the ControlPlane version
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,

    /// Comma-separated etcd endpoints
    #[serde(default)]
    pub etcd_servers: String,

    /// Deployment shape
    #[serde(default)]
    pub deployment: DeploymentShape,

    /// Secrets holding the API server's TLS material
    #[serde(default)]
    pub tls: ApiServerTls,

    /// Networking options
    #[serde(default)]
    pub options: ApiServerOptions,

    /// In-cluster service the konnectivity server dials back into
    #[serde(default)]
    pub kube_apiserver_service: ApiServerServiceRef,
}

/// The generated `KubeAPIServer` resource under its Rust-cased name
pub type KubeApiServer = KubeAPIServer;

/// TLS secrets consumed by the API server pod
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ApiServerTls {
    /// CA secret
    pub ca_secret_name: SecretRef,
    /// Serving certificate secret
    pub kube_apiserver_secret_name: SecretRef,
    /// Service account signing keypair secret
    pub service_accounts_secret_name: SecretRef,
    /// Konnectivity server certificate secret
    pub konnectivity_secret_name: SecretRef,
}

/// API server networking options
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ApiServerOptions {
    /// Address advertised to cluster members; filled in from the load balancer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertise_address: Option<String>,

    /// Service IP range
    #[serde(default = "default_service_cluster_ip_range")]
    pub service_cluster_ip_range: String,
}

pub(crate) fn default_service_cluster_ip_range() -> String {
    "10.32.0.0/24".to_string()
}

impl Default for ApiServerOptions {
    fn default() -> Self {
        Self {
            advertise_address: None,
            service_cluster_ip_range: default_service_cluster_ip_range(),
        }
    }
}

impl KubeApiServerSpec {
    /// Validate references and options (the version is checked by the reconciler,
    /// since a ControlPlane may leave it empty to inherit)
    pub fn validate(&self, resource: &str) -> Result<(), Error> {
        if self.etcd_servers.trim().is_empty() {
            return Err(Error::validation_for_field(
                resource,
                "spec.etcd-servers",
                "at least one etcd server is required",
            ));
        }
        if self.options.service_cluster_ip_range.trim().is_empty() {
            return Err(Error::validation_for_field(
                resource,
                "spec.options.service-cluster-ip-range",
                "service cluster IP range cannot be empty",
            ));
        }
        self.tls
            .ca_secret_name
            .validate(resource, "spec.tls.ca-secret-name")?;
        self.tls
            .kube_apiserver_secret_name
            .validate(resource, "spec.tls.kube-apiserver-secret-name")?;
        self.tls
            .service_accounts_secret_name
            .validate(resource, "spec.tls.service-accounts-secret-name")?;
        self.tls
            .konnectivity_secret_name
            .validate(resource, "spec.tls.konnectivity-secret-name")?;
        self.deployment.validate(resource)?;
        self.kube_apiserver_service.validate(resource)
    }
}
