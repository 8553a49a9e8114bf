//! cert-manager request types
//!
//! Only the fields the PKI engine sets are modelled. cert-manager owns these
//! CRDs; they are declared here so they can be written through the same
//! typed store seam as everything else, never installed by this operator.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Issuer kind referenced by every certificate the PKI engine creates
pub const ISSUER_KIND: &str = "Issuer";

/// cert-manager Issuer: either self-signed or backed by a CA secret
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cert-manager.io",
    version = "v1",
    kind = "Issuer",
    plural = "issuers",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct IssuerSpec {
    /// Self-signed issuer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_signed: Option<SelfSignedIssuer>,

    /// CA-backed issuer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<CaIssuer>,
}

impl IssuerSpec {
    /// A self-signed issuer
    pub fn self_signed() -> Self {
        Self {
            self_signed: Some(SelfSignedIssuer {}),
            ca: None,
        }
    }

    /// An issuer signing with the keypair stored in `secret_name`
    pub fn ca(secret_name: impl Into<String>) -> Self {
        Self {
            self_signed: None,
            ca: Some(CaIssuer {
                secret_name: secret_name.into(),
            }),
        }
    }
}

/// Marker for a self-signed issuer (serialized as `{}`)
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct SelfSignedIssuer {}

/// CA issuer configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaIssuer {
    /// Secret holding the CA keypair
    pub secret_name: String,
}

/// cert-manager Certificate request
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cert-manager.io",
    version = "v1",
    kind = "Certificate",
    plural = "certificates",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSpec {
    /// Whether the certificate may sign others
    #[serde(rename = "isCA", default, skip_serializing_if = "std::ops::Not::not")]
    pub is_ca: bool,

    /// Subject common name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,

    /// Subject fields beyond the common name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<CertificateSubject>,

    /// DNS subject alternative names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_names: Vec<String>,

    /// IP subject alternative names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip_addresses: Vec<String>,

    /// Secret the signed keypair is written to
    pub secret_name: String,

    /// Private key parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<PrivateKeySpec>,

    /// Issuer that signs this certificate
    pub issuer_ref: IssuerRef,
}

/// Certificate subject
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSubject {
    /// Organizations (O=)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub organizations: Vec<String>,
}

/// Private key algorithm and size
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrivateKeySpec {
    /// Key algorithm (RSA, ECDSA, Ed25519)
    pub algorithm: String,
    /// Key size in bits
    pub size: i32,
}

impl Default for PrivateKeySpec {
    fn default() -> Self {
        Self {
            algorithm: "RSA".to_string(),
            size: 2048,
        }
    }
}

/// Reference to a cert-manager issuer
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IssuerRef {
    /// Issuer name
    pub name: String,
    /// Issuer kind (Issuer or ClusterIssuer)
    pub kind: String,
    /// Issuer group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl IssuerRef {
    /// Reference to a namespaced `Issuer` named `name`
    pub fn issuer(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ISSUER_KIND.to_string(),
            group: None,
        }
    }
}
