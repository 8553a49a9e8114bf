//! Custom Resource Definitions for Kubeception
//!
//! The six Kubeception kinds plus the cert-manager request types the PKI
//! engine writes. All kinds are namespaced and share the
//! `cluster.kubeception.ulfo.fr/v1alpha1` API version.

mod cert_manager;
mod control_plane;
mod kube_apiserver;
mod kube_controller_manager;
mod kube_scheduler;
mod loadbalancer;
mod pki;
mod types;

pub use cert_manager::{
    CaIssuer, Certificate, CertificateSpec, CertificateSubject, Issuer, IssuerRef, IssuerSpec,
    PrivateKeySpec, SelfSignedIssuer,
};
pub use control_plane::{ControlPlane, ControlPlaneSpec};
pub use kube_apiserver::{ApiServerOptions, ApiServerTls, KubeApiServer, KubeApiServerSpec};
pub use kube_controller_manager::{
    ControllerManagerOptions, ControllerManagerTls, KubeControllerManager,
    KubeControllerManagerSpec,
};
pub use kube_scheduler::{KubeScheduler, KubeSchedulerSpec};
pub use loadbalancer::{Loadbalancer, LoadbalancerSpec, LoadbalancerStatus};
pub use pki::{ApiServerCertificate, Pki, PkiCertificate, PkiSpec};
pub use types::{
    effective_version, validate_dns_name, validate_version, ApiServerServiceRef, DeploymentShape,
    SecretRef,
};

use kube::CustomResourceExt;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;

/// CRD manifests for every kind this operator serves
pub fn all_crds() -> Vec<CustomResourceDefinition> {
    vec![
        ControlPlane::crd(),
        Loadbalancer::crd(),
        Pki::crd(),
        KubeApiServer::crd(),
        KubeControllerManager::crd(),
        KubeScheduler::crd(),
    ]
}
