//! Pki CRD: the certificate hierarchy of one control plane

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{validate_dns_name, SecretRef};
use crate::Error;

/// Pki describes a self-signed root, a CA and the leaf certificates every
/// control plane component needs. Each certificate is written by
/// cert-manager into a secret of the same name.
///
/// Example:
/// ```yaml
/// apiVersion: cluster.kubeception.ulfo.fr/v1alpha1
/// kind: Pki
/// metadata:
///   name: demo
/// spec:
///   name: demo-root
///   ca: { name: ca }
///   admin: { name: admin }
///   service-accounts: { name: service-accounts }
///   kube-apiserver:
///     name: kube-apiserver
///     ip-addresses: [10.32.0.1]
///     dns-names: [kube-apiserver, kubernetes.default]
///   kube-controller-manager: { name: kube-controller-manager }
///   kube-scheduler: { name: kube-scheduler }
///   konnectivity: { name: konnectivity }
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cluster.kubeception.ulfo.fr",
    version = "v1alpha1",
    kind = "Pki",
    plural = "pkis",
    namespaced,
    derive = "PartialEq",
    printcolumn = r#"{"name":"Address","type":"string","jsonPath":".spec.control-plane-address"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "kebab-case")]
pub struct PkiSpec {
    /// Name of the self-signed root issuer
    pub name: String,

    /// Externally reachable address of the control plane.
    /// Filled in from the load balancer; leaf certificates wait for it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_address: Option<String>,

    /// Root CA certificate, also the name of the CA issuer
    pub ca: PkiCertificate,

    /// Cluster administrator client certificate
    pub admin: PkiCertificate,

    /// Service account token signing keypair
    pub service_accounts: PkiCertificate,

    /// API server serving certificate
    pub kube_apiserver: ApiServerCertificate,

    /// Controller manager certificate
    pub kube_controller_manager: PkiCertificate,

    /// Scheduler certificate
    pub kube_scheduler: PkiCertificate,

    /// Konnectivity server certificate
    pub konnectivity: PkiCertificate,
}

/// A certificate and the secret it lands in
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct PkiCertificate {
    /// Certificate and secret name
    pub name: SecretRef,
}

impl PkiCertificate {
    /// Certificate named `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: SecretRef::new(name),
        }
    }
}

/// API server certificate with its subject alternative names
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ApiServerCertificate {
    /// Certificate and secret name
    pub name: SecretRef,

    /// IP SANs (the control plane address is appended)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip_addresses: Vec<String>,

    /// DNS SANs (the control plane address is appended)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_names: Vec<String>,
}

impl PkiSpec {
    /// Reject empty or malformed certificate names
    pub fn validate(&self, resource: &str) -> Result<(), Error> {
        validate_dns_name(&self.name)
            .map_err(|msg| Error::validation_for_field(resource, "spec.name", msg))?;
        let certificates = [
            ("spec.ca.name", &self.ca.name),
            ("spec.admin.name", &self.admin.name),
            ("spec.service-accounts.name", &self.service_accounts.name),
            ("spec.kube-apiserver.name", &self.kube_apiserver.name),
            (
                "spec.kube-controller-manager.name",
                &self.kube_controller_manager.name,
            ),
            ("spec.kube-scheduler.name", &self.kube_scheduler.name),
            ("spec.konnectivity.name", &self.konnectivity.name),
        ];
        for (field, name) in certificates {
            name.validate(resource, field)?;
        }
        Ok(())
    }

    /// Control plane address, if the orchestrator has supplied one
    pub fn address(&self) -> Option<&str> {
        self.control_plane_address
            .as_deref()
            .filter(|addr| !addr.is_empty())
    }
}
