//! Types shared by several CRD specs

use std::collections::BTreeMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::resource::{ObjectKey, ResourceKind};
use crate::{Error, API_SERVER_PORT};

/// Name of a Secret in the same namespace as the referencing object.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct SecretRef(pub String);

impl SecretRef {
    /// Wrap a secret name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The referenced secret name
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Typed key of the referenced secret in `namespace`
    pub fn key(&self, namespace: &str) -> ObjectKey {
        ObjectKey::new(ResourceKind::Secret, namespace, self.0.clone())
    }

    /// Reject empty or non DNS-1123 names
    pub fn validate(&self, resource: &str, field: &str) -> Result<(), Error> {
        validate_dns_name(&self.0).map_err(|msg| Error::validation_for_field(resource, field, msg))
    }
}

impl fmt::Display for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SecretRef {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Deployment shape shared by every workload.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct DeploymentShape {
    /// Deployment name; defaults to `<instance>-<component>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Number of pod replicas
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Extra labels applied to the deployment and its pods
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

fn default_replicas() -> i32 {
    1
}

impl Default for DeploymentShape {
    fn default() -> Self {
        Self {
            name: None,
            replicas: default_replicas(),
            labels: BTreeMap::new(),
        }
    }
}

impl DeploymentShape {
    /// Deployment name for `component` owned by `instance`
    pub fn name_for(&self, instance: &str, component: &str) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("{}-{}", instance, component),
        }
    }

    /// Reject a bad explicit name or a negative replica count
    pub fn validate(&self, resource: &str) -> Result<(), Error> {
        if let Some(name) = &self.name {
            validate_dns_name(name).map_err(|msg| {
                Error::validation_for_field(resource, "spec.deployment.name", msg)
            })?;
        }
        if self.replicas < 0 {
            return Err(Error::validation_for_field(
                resource,
                "spec.deployment.replicas",
                format!("replicas must not be negative, got {}", self.replicas),
            ));
        }
        Ok(())
    }
}

/// In-cluster address of the API server, as seen by other workloads.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ApiServerServiceRef {
    /// Service name
    #[serde(default = "default_api_server_service")]
    pub name: String,

    /// Service port
    #[serde(default = "default_api_server_port")]
    pub port: i32,
}

fn default_api_server_service() -> String {
    "kube-apiserver".to_string()
}

pub(crate) fn default_api_server_port() -> i32 {
    API_SERVER_PORT
}

impl Default for ApiServerServiceRef {
    fn default() -> Self {
        Self {
            name: default_api_server_service(),
            port: default_api_server_port(),
        }
    }
}

impl ApiServerServiceRef {
    /// HTTPS URL clients use to reach the API server
    pub fn server_url(&self) -> String {
        crate::kubeconfig::https_url(&self.name, self.port)
    }

    /// Reject a bad service name or out-of-range port
    pub fn validate(&self, resource: &str) -> Result<(), Error> {
        validate_dns_name(&self.name).map_err(|msg| {
            Error::validation_for_field(resource, "spec.kube-apiserver-service.name", msg)
        })?;
        validate_port(self.port).map_err(|msg| {
            Error::validation_for_field(resource, "spec.kube-apiserver-service.port", msg)
        })
    }
}

/// Effective image version: the override if set, the inherited version otherwise.
pub fn effective_version(override_version: &str, inherited: &str) -> String {
    if override_version.is_empty() {
        inherited.to_string()
    } else {
        override_version.to_string()
    }
}

/// Require a non-empty version without whitespace
pub fn validate_version(resource: &str, field: &str, version: &str) -> Result<(), Error> {
    if version.is_empty() {
        return Err(Error::validation_for_field(resource, field, "version cannot be empty"));
    }
    if version.chars().any(char::is_whitespace) {
        return Err(Error::validation_for_field(
            resource,
            field,
            format!("version cannot contain whitespace: {:?}", version),
        ));
    }
    Ok(())
}

/// Validate a DNS-1123 subdomain (the rule for Secret and Service names).
///
/// - At most 253 characters
/// - Lowercase alphanumerics, `-` and `.`
/// - Starts and ends with an alphanumeric
pub fn validate_dns_name(s: &str) -> Result<(), String> {
    if s.is_empty() {
        return Err("name cannot be empty".to_string());
    }
    if s.len() > 253 {
        return Err(format!("name is longer than 253 characters: {}", s));
    }
    if !s
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return Err(format!(
            "name must be lowercase alphanumeric with '-' or '.': {}",
            s
        ));
    }
    let alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    if !s.starts_with(alnum) || !s.ends_with(alnum) {
        return Err(format!(
            "name must start and end with an alphanumeric character: {}",
            s
        ));
    }
    Ok(())
}

pub(crate) fn validate_port(port: i32) -> Result<(), String> {
    if (1..=65535).contains(&port) {
        Ok(())
    } else {
        Err(format!("port must be between 1 and 65535, got {}", port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dns_names_follow_rfc1123_subdomains() {
        assert!(validate_dns_name("kube-apiserver").is_ok());
        assert!(validate_dns_name("ca.demo-1").is_ok());
        assert!(validate_dns_name("0ca").is_ok());

        assert!(validate_dns_name("").is_err());
        assert!(validate_dns_name("CA").is_err());
        assert!(validate_dns_name("-ca").is_err());
        assert!(validate_dns_name("ca-").is_err());
        assert!(validate_dns_name("ca_secret").is_err());
        assert!(validate_dns_name(&"a".repeat(254)).is_err());
    }

    #[test]
    fn secret_ref_is_a_bare_string_on_the_wire() {
        let r: SecretRef = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(r, SecretRef::new("admin"));
        assert_eq!(serde_json::to_string(&r).unwrap(), "\"admin\"");
        assert_eq!(r.key("tenants").to_string(), "Secret/tenants/admin");
    }

    #[test]
    fn empty_secret_ref_is_rejected_with_field_path() {
        let err = SecretRef::default()
            .validate("demo", "spec.tls.ca-secret-name")
            .unwrap_err();
        match err {
            Error::Validation { field, .. } => {
                assert_eq!(field.as_deref(), Some("spec.tls.ca-secret-name"))
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn deployment_name_defaults_to_instance_and_component() {
        let shape = DeploymentShape::default();
        assert_eq!(shape.name_for("demo", "kube-scheduler"), "demo-kube-scheduler");
        assert_eq!(shape.replicas, 1);

        let named = DeploymentShape {
            name: Some("sched".to_string()),
            ..Default::default()
        };
        assert_eq!(named.name_for("demo", "kube-scheduler"), "sched");
    }

    #[test]
    fn deployment_shape_defaults_apply_when_fields_are_omitted() {
        let shape: DeploymentShape = serde_json::from_str("{}").unwrap();
        assert_eq!(shape, DeploymentShape::default());

        let negative = DeploymentShape {
            replicas: -1,
            ..Default::default()
        };
        assert!(negative.validate("demo").is_err());
    }

    #[test]
    fn api_server_service_defaults_to_in_cluster_name() {
        let svc = ApiServerServiceRef::default();
        assert_eq!(svc.server_url(), "https://kube-apiserver:6443");
        assert!(svc.validate("demo").is_ok());

        let bad = ApiServerServiceRef {
            port: 0,
            ..Default::default()
        };
        assert!(bad.validate("demo").is_err());
    }

    #[test]
    fn override_wins_over_inherited_version() {
        assert_eq!(effective_version("", "v1.27.1"), "v1.27.1");
        assert_eq!(effective_version("v1.25.1", "v1.27.1"), "v1.25.1");
    }

    #[test]
    fn versions_must_be_non_empty_tokens() {
        assert!(validate_version("demo", "spec.version", "v1.27.1").is_ok());
        assert!(validate_version("demo", "spec.version", "").is_err());
        assert!(validate_version("demo", "spec.version", "v1 27").is_err());
    }
}
