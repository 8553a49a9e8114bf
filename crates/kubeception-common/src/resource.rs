//! Typed identities for every object the operator reads or writes
//!
//! Cross-resource references travel as [`ObjectKey`] values instead of bare
//! strings, so a reconciler can never look up a Secret where it meant a
//! ConfigMap, or forget which namespace a name lives in.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::discovery::ApiResource;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::crd::{
    Certificate, ControlPlane, Issuer, KubeApiServer, KubeControllerManager, KubeScheduler,
    Loadbalancer, Pki,
};
use crate::{API_GROUP, API_VERSION, LABEL_INSTANCE, LABEL_NAME};

/// Every resource kind the operator touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    /// core/v1 Secret
    Secret,
    /// core/v1 ConfigMap
    ConfigMap,
    /// core/v1 Service
    Service,
    /// apps/v1 Deployment
    Deployment,
    /// cert-manager.io Issuer
    Issuer,
    /// cert-manager.io Certificate
    Certificate,
    /// ControlPlane (top-level resource)
    ControlPlane,
    /// Loadbalancer
    Loadbalancer,
    /// Pki
    Pki,
    /// KubeAPIServer
    KubeApiServer,
    /// KubeControllerManager
    KubeControllerManager,
    /// KubeScheduler
    KubeScheduler,
}

impl ResourceKind {
    /// API group (empty for the core group).
    pub fn group(&self) -> &'static str {
        match self {
            Self::Secret | Self::ConfigMap | Self::Service => "",
            Self::Deployment => "apps",
            Self::Issuer | Self::Certificate => "cert-manager.io",
            Self::ControlPlane
            | Self::Loadbalancer
            | Self::Pki
            | Self::KubeApiServer
            | Self::KubeControllerManager
            | Self::KubeScheduler => API_GROUP,
        }
    }

    /// API version within the group.
    pub fn version(&self) -> &'static str {
        match self {
            Self::Secret | Self::ConfigMap | Self::Service | Self::Deployment => "v1",
            Self::Issuer | Self::Certificate => "v1",
            _ => API_VERSION,
        }
    }

    /// Full `apiVersion` string as it appears in manifests.
    pub fn api_version(&self) -> String {
        match self.group() {
            "" => self.version().to_string(),
            group => format!("{}/{}", group, self.version()),
        }
    }

    /// Kubernetes Kind string.
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::Secret => "Secret",
            Self::ConfigMap => "ConfigMap",
            Self::Service => "Service",
            Self::Deployment => "Deployment",
            Self::Issuer => "Issuer",
            Self::Certificate => "Certificate",
            Self::ControlPlane => "ControlPlane",
            Self::Loadbalancer => "Loadbalancer",
            Self::Pki => "Pki",
            Self::KubeApiServer => "KubeAPIServer",
            Self::KubeControllerManager => "KubeControllerManager",
            Self::KubeScheduler => "KubeScheduler",
        }
    }

    /// Plural resource name used in API paths.
    pub fn plural(&self) -> &'static str {
        match self {
            Self::Secret => "secrets",
            Self::ConfigMap => "configmaps",
            Self::Service => "services",
            Self::Deployment => "deployments",
            Self::Issuer => "issuers",
            Self::Certificate => "certificates",
            Self::ControlPlane => "controlplanes",
            Self::Loadbalancer => "loadbalancers",
            Self::Pki => "pkis",
            Self::KubeApiServer => "kubeapiservers",
            Self::KubeControllerManager => "kubecontrollermanagers",
            Self::KubeScheduler => "kubeschedulers",
        }
    }

    /// Dynamic API resource for untyped access through `kube::Api<DynamicObject>`.
    pub fn api_resource(&self) -> ApiResource {
        ApiResource {
            group: self.group().to_string(),
            version: self.version().to_string(),
            api_version: self.api_version(),
            kind: self.kind_str().to_string(),
            plural: self.plural().to_string(),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind_str())
    }
}

/// Identity of a namespaced object: kind + namespace + name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    /// Resource kind
    pub kind: ResourceKind,
    /// Namespace the object lives in
    pub namespace: String,
    /// Object name
    pub name: String,
}

impl ObjectKey {
    /// Build a key from its parts
    pub fn new(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a `K` named `name` in `namespace`
    pub fn of<K: ManagedResource>(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(K::KIND, namespace, name)
    }

    /// Key of an existing typed object
    pub fn for_object<K: ManagedResource>(obj: &K) -> Self {
        Self::new(
            K::KIND,
            obj.namespace().unwrap_or_default(),
            obj.name_any(),
        )
    }

    /// Same namespace, different kind and name
    pub fn sibling(&self, kind: ResourceKind, name: impl Into<String>) -> Self {
        Self::new(kind, self.namespace.clone(), name)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// A typed object the Convergence Primitive can manage.
///
/// Ties the Rust type to its [`ResourceKind`] and knows how to build an empty
/// instance for a given identity.
pub trait ManagedResource:
    Resource<DynamicType = ()> + Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Kind of this type
    const KIND: ResourceKind;

    /// An object carrying only `metadata` and an empty body
    fn blank(metadata: ObjectMeta) -> Self;
}

macro_rules! managed_builtin {
    ($ty:ty, $kind:ident) => {
        impl ManagedResource for $ty {
            const KIND: ResourceKind = ResourceKind::$kind;

            fn blank(metadata: ObjectMeta) -> Self {
                Self {
                    metadata,
                    ..Default::default()
                }
            }
        }
    };
}

macro_rules! managed_custom {
    ($ty:ty, $kind:ident) => {
        impl ManagedResource for $ty {
            const KIND: ResourceKind = ResourceKind::$kind;

            fn blank(metadata: ObjectMeta) -> Self {
                Self {
                    metadata,
                    spec: Default::default(),
                    status: None,
                }
            }
        }
    };
}

macro_rules! managed_custom_no_status {
    ($ty:ty, $kind:ident) => {
        impl ManagedResource for $ty {
            const KIND: ResourceKind = ResourceKind::$kind;

            fn blank(metadata: ObjectMeta) -> Self {
                Self {
                    metadata,
                    spec: Default::default(),
                }
            }
        }
    };
}

managed_builtin!(Secret, Secret);
managed_builtin!(ConfigMap, ConfigMap);
managed_builtin!(Service, Service);
managed_builtin!(Deployment, Deployment);
managed_custom_no_status!(Issuer, Issuer);
managed_custom_no_status!(Certificate, Certificate);
managed_custom_no_status!(ControlPlane, ControlPlane);
managed_custom!(Loadbalancer, Loadbalancer);
managed_custom_no_status!(Pki, Pki);
managed_custom_no_status!(KubeApiServer, KubeApiServer);
managed_custom_no_status!(KubeControllerManager, KubeControllerManager);
managed_custom_no_status!(KubeScheduler, KubeScheduler);

/// Standard labels for a component owned by `instance`, with `overlay` on top.
///
/// The overlay cannot replace the component name: selectors rely on it.
pub fn component_labels(
    component: &str,
    instance: &str,
    overlay: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut labels = overlay.clone();
    labels.insert(LABEL_NAME.to_string(), component.to_string());
    labels.insert(LABEL_INSTANCE.to_string(), instance.to_string());
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_kinds_have_bare_api_version() {
        assert_eq!(ResourceKind::Secret.api_version(), "v1");
        assert_eq!(ResourceKind::Deployment.api_version(), "apps/v1");
        assert_eq!(ResourceKind::Certificate.api_version(), "cert-manager.io/v1");
        assert_eq!(
            ResourceKind::KubeApiServer.api_version(),
            "cluster.kubeception.ulfo.fr/v1alpha1"
        );
    }

    #[test]
    fn api_resource_matches_kind() {
        let ar = ResourceKind::KubeControllerManager.api_resource();
        assert_eq!(ar.kind, "KubeControllerManager");
        assert_eq!(ar.plural, "kubecontrollermanagers");
        assert_eq!(ar.group, API_GROUP);
    }

    #[test]
    fn object_key_display_is_kind_namespace_name() {
        let key = ObjectKey::of::<Secret>("tenants", "ca");
        assert_eq!(key.to_string(), "Secret/tenants/ca");

        let sibling = key.sibling(ResourceKind::Issuer, "ca");
        assert_eq!(sibling.to_string(), "Issuer/tenants/ca");
    }

    #[test]
    fn managed_kinds_agree_with_kube_resource_metadata() {
        assert_eq!(Pki::kind(&()), ResourceKind::Pki.kind_str());
        assert_eq!(KubeApiServer::kind(&()), ResourceKind::KubeApiServer.kind_str());
        assert_eq!(Issuer::api_version(&()), ResourceKind::Issuer.api_version());
        assert_eq!(Deployment::plural(&()), ResourceKind::Deployment.plural());
        assert_eq!(Loadbalancer::plural(&()), ResourceKind::Loadbalancer.plural());
    }

    #[test]
    fn overlay_cannot_replace_component_name() {
        let overlay = BTreeMap::from([
            ("team".to_string(), "a".to_string()),
            (LABEL_NAME.to_string(), "spoofed".to_string()),
        ]);
        let labels = component_labels("kube-scheduler", "demo", &overlay);
        assert_eq!(labels[LABEL_NAME], "kube-scheduler");
        assert_eq!(labels[LABEL_INSTANCE], "demo");
        assert_eq!(labels["team"], "a");
    }
}
