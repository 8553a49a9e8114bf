//! Client configuration synthesis
//!
//! Turns the TLS material cert-manager writes into a secret (`tls.crt`,
//! `tls.key`, `ca.crt`) plus a server URL into a single-cluster kubeconfig.
//! Everything here is pure; the reconcilers decide where the result is stored.

use std::net::Ipv6Addr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};

use crate::{Error, CA_CERT_KEY, TLS_CERT_KEY, TLS_KEY_KEY};

/// Cluster entry name in synthesized kubeconfigs
pub const CLUSTER_NAME: &str = "default";
/// User entry name in synthesized kubeconfigs
pub const USER_NAME: &str = "default-user";
/// Context name in synthesized kubeconfigs
pub const CONTEXT_NAME: &str = "default";

const PEM_MARKER: &str = "-----BEGIN ";

/// Kubeconfig structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Kubeconfig {
    /// API version
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    /// Kind (always "Config")
    pub kind: String,
    /// Clusters
    pub clusters: Vec<KubeconfigCluster>,
    /// Users
    pub users: Vec<KubeconfigUser>,
    /// Contexts
    pub contexts: Vec<KubeconfigContext>,
    /// Current context
    pub current_context: String,
}

/// Cluster entry in kubeconfig
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KubeconfigCluster {
    /// Cluster name
    pub name: String,
    /// Cluster config
    pub cluster: ClusterConfig,
}

/// Cluster configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterConfig {
    /// API server URL
    pub server: String,
    /// CA certificate (base64 encoded)
    pub certificate_authority_data: String,
}

/// User entry in kubeconfig
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KubeconfigUser {
    /// User name
    pub name: String,
    /// User config
    pub user: UserConfig,
}

/// User configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserConfig {
    /// Client certificate (base64 encoded)
    pub client_certificate_data: String,
    /// Client key (base64 encoded)
    pub client_key_data: String,
}

/// Context entry in kubeconfig
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KubeconfigContext {
    /// Context name
    pub name: String,
    /// Context config
    pub context: ContextConfig,
}

/// Context configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Cluster name (reference)
    pub cluster: String,
    /// User name (reference)
    pub user: String,
}

impl Kubeconfig {
    /// Parse a kubeconfig document
    pub fn parse(document: &str) -> Result<Self, Error> {
        serde_yaml::from_str(document)
            .map_err(|e| Error::serialization_for_kind("Config", e.to_string()))
    }

    /// Cluster referenced by the current context
    pub fn current_cluster(&self) -> Option<&ClusterConfig> {
        let context = self
            .contexts
            .iter()
            .find(|c| c.name == self.current_context)?;
        self.clusters
            .iter()
            .find(|c| c.name == context.context.cluster)
            .map(|c| &c.cluster)
    }

    /// User referenced by the current context
    pub fn current_user(&self) -> Option<&UserConfig> {
        let context = self
            .contexts
            .iter()
            .find(|c| c.name == self.current_context)?;
        self.users
            .iter()
            .find(|u| u.name == context.context.user)
            .map(|u| &u.user)
    }
}

/// PEM material for one client identity
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TlsMaterial {
    /// Client certificate
    pub certificate: String,
    /// Client private key
    pub key: String,
    /// CA bundle the server certificate chains to
    pub ca: String,
}

impl TlsMaterial {
    /// Read `tls.crt`, `tls.key` and `ca.crt` from a cert-manager secret
    pub fn from_secret(secret: &Secret) -> Result<Self, Error> {
        let id = format!(
            "{}/{}",
            secret.namespace().unwrap_or_default(),
            secret.name_any()
        );
        Ok(Self {
            certificate: pem_entry(secret, &id, TLS_CERT_KEY)?,
            key: pem_entry(secret, &id, TLS_KEY_KEY)?,
            ca: pem_entry(secret, &id, CA_CERT_KEY)?,
        })
    }
}

fn pem_entry(secret: &Secret, id: &str, key: &str) -> Result<String, Error> {
    let bytes = secret
        .data
        .as_ref()
        .and_then(|d| d.get(key))
        .map(|b| b.0.clone())
        .ok_or_else(|| Error::credential(id, format!("missing key {}", key)))?;
    let text = String::from_utf8(bytes)
        .map_err(|_| Error::credential(id, format!("key {} is not valid UTF-8", key)))?;
    if !text.contains(PEM_MARKER) {
        return Err(Error::credential(
            id,
            format!("key {} does not contain PEM data", key),
        ));
    }
    Ok(text)
}

/// `https://host:port`, with IPv6 literals bracketed
pub fn https_url(host: &str, port: i32) -> String {
    if host.parse::<Ipv6Addr>().is_ok() {
        format!("https://[{}]:{}", host, port)
    } else {
        format!("https://{}:{}", host, port)
    }
}

/// Host part of an `https://` URL.
///
/// IPv6 literals must be bracketed; a bare one is ambiguous with the port.
fn server_host(server: &str) -> Option<&str> {
    let authority = server.strip_prefix("https://")?.split('/').next()?;
    let host = match authority.strip_prefix('[') {
        Some(rest) => {
            let (host, tail) = rest.split_once(']')?;
            host.parse::<Ipv6Addr>().ok()?;
            if !(tail.is_empty() || tail.starts_with(':')) {
                return None;
            }
            host
        }
        None if authority.matches(':').count() > 1 => return None,
        None => authority.split(':').next()?,
    };
    Some(host).filter(|h| !h.is_empty())
}

/// Build a single-cluster, single-user kubeconfig for `server`.
///
/// `server` must be an `https://` URL with a host.
pub fn synthesize(material: &TlsMaterial, server: &str) -> Result<String, Error> {
    if server_host(server).is_none() {
        return Err(Error::validation(format!(
            "kubeconfig server must be an https URL with a host, got {:?}",
            server
        )));
    }

    let config = Kubeconfig {
        api_version: "v1".to_string(),
        kind: "Config".to_string(),
        clusters: vec![KubeconfigCluster {
            name: CLUSTER_NAME.to_string(),
            cluster: ClusterConfig {
                server: server.to_string(),
                certificate_authority_data: STANDARD.encode(&material.ca),
            },
        }],
        users: vec![KubeconfigUser {
            name: USER_NAME.to_string(),
            user: UserConfig {
                client_certificate_data: STANDARD.encode(&material.certificate),
                client_key_data: STANDARD.encode(&material.key),
            },
        }],
        contexts: vec![KubeconfigContext {
            name: CONTEXT_NAME.to_string(),
            context: ContextConfig {
                cluster: CLUSTER_NAME.to_string(),
                user: USER_NAME.to_string(),
            },
        }],
        current_context: CONTEXT_NAME.to_string(),
    };

    serde_yaml::to_string(&config).map_err(|e| Error::serialization_for_kind("Config", e.to_string()))
}
