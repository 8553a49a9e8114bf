//! Common types for Kubeception: CRDs, errors, the object store seam and the
//! convergence primitives shared by every reconciler.
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions (ControlPlane, Pki, KubeAPIServer, ...)
//!   and the cert-manager request types the PKI engine emits
//! - [`resource`] - Typed identities (`ResourceKind`, `ObjectKey`) for managed objects
//! - [`store`] - The `ObjectStore` seam with kube-backed and in-memory implementations
//! - [`converge`] - Idempotent create-or-patch with ownership stamping
//! - [`readiness`] - Check-and-defer gating on prerequisite artifacts
//! - [`kubeconfig`] - Client configuration synthesis from TLS material
//! - [`reconcile`] - Reconcile outcomes and their mapping onto kube-runtime actions
//! - [`error`] - Error taxonomy (transient vs fatal)

#![deny(missing_docs)]

pub mod converge;
pub mod crd;
pub mod error;
pub mod kubeconfig;
pub mod readiness;
pub mod reconcile;
pub mod resource;
pub mod store;

pub use error::{Error, ErrorKind};
pub use reconcile::Outcome;
pub use resource::{ManagedResource, ObjectKey, ResourceKind};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// API group of every Kubeception custom resource
pub const API_GROUP: &str = "cluster.kubeception.ulfo.fr";

/// API version of every Kubeception custom resource
pub const API_VERSION: &str = "v1alpha1";

/// Field manager recorded on every write the operator issues
pub const FIELD_MANAGER: &str = "kubeception-operator";

/// Secret key holding a synthesized kubeconfig document
pub const KUBECONFIG_KEY: &str = "kubeconfig.yml";

/// Secret key holding a PEM certificate (written by cert-manager)
pub const TLS_CERT_KEY: &str = "tls.crt";

/// Secret key holding a PEM private key (written by cert-manager)
pub const TLS_KEY_KEY: &str = "tls.key";

/// Secret key holding the issuing CA bundle (written by cert-manager)
pub const CA_CERT_KEY: &str = "ca.crt";

/// Port the API server listens on inside its pod
pub const API_SERVER_PORT: i32 = 6443;

/// Port the konnectivity server accepts agent connections on
pub const KONNECTIVITY_AGENT_PORT: i32 = 8091;

/// Recommended label carrying the component name
pub const LABEL_NAME: &str = "app.kubernetes.io/name";

/// Recommended label carrying the owning instance name
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";

/// Name of the secret holding the kubeconfig derived from a certificate secret
pub fn kubeconfig_secret_name(secret_name: &str) -> String {
    format!("{}-kubeconfig", secret_name)
}
