//! Loadbalancer CRD: the externally reachable entry point of a control plane

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{default_api_server_port, validate_dns_name, validate_port};
use crate::Error;

/// Loadbalancer exposes the API server and the konnectivity server through a
/// `LoadBalancer` Service and reports the address it was assigned.
///
/// Example:
/// ```yaml
/// apiVersion: cluster.kubeception.ulfo.fr/v1alpha1
/// kind: Loadbalancer
/// metadata:
///   name: demo
/// spec:
///   name: demo-lb
///   port: 6443
///   selectors:
///     team: a
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cluster.kubeception.ulfo.fr",
    version = "v1alpha1",
    kind = "Loadbalancer",
    plural = "loadbalancers",
    namespaced,
    derive = "PartialEq",
    status = "LoadbalancerStatus",
    printcolumn = r#"{"name":"IP","type":"string","jsonPath":".status.ip"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "kebab-case")]
pub struct LoadbalancerSpec {
    /// Name of the Service to create
    pub name: String,

    /// External port forwarded to the API server's 6443
    #[serde(default = "default_api_server_port")]
    pub port: i32,

    /// Extra pod selector labels (merged with the API server's name label)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selectors: BTreeMap<String, String>,
}

impl Default for LoadbalancerSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            port: default_api_server_port(),
            selectors: BTreeMap::new(),
        }
    }
}

impl LoadbalancerSpec {
    /// Reject an empty service name or an out-of-range port
    pub fn validate(&self, resource: &str) -> Result<(), Error> {
        validate_dns_name(&self.name)
            .map_err(|msg| Error::validation_for_field(resource, "spec.name", msg))?;
        validate_port(self.port)
            .map_err(|msg| Error::validation_for_field(resource, "spec.port", msg))
    }
}

/// Observed state of a Loadbalancer
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct LoadbalancerStatus {
    /// Address assigned by the infrastructure (IP or hostname)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

impl Loadbalancer {
    /// Currently observed address, if one has been assigned
    pub fn observed_address(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.ip.as_deref())
            .filter(|ip| !ip.is_empty())
    }
}
