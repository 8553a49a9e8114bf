//! Loadbalancer reconciler
//!
//! Converges a `LoadBalancer` Service in front of the API server pods and
//! publishes the address the infrastructure assigns to it.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use serde_json::json;
use tracing::info;

use kubeception_common::converge::{converge, owner_reference};
use kubeception_common::crd::{Loadbalancer, LoadbalancerSpec};
use kubeception_common::resource::{component_labels, ResourceKind};
use kubeception_common::store::get_typed;
use kubeception_common::{
    Error, ObjectKey, Outcome, API_SERVER_PORT, KONNECTIVITY_AGENT_PORT, LABEL_INSTANCE,
    LABEL_NAME,
};

use crate::context::Context;
use crate::{COMPONENT_KUBE_APISERVER, COMPONENT_LOADBALANCER};

/// Service port name for API server traffic
pub const HTTPS_PORT_NAME: &str = "https";
/// Service port name for konnectivity agent traffic
pub const KONNECTIVITY_PORT_NAME: &str = "konnectivity";

/// Reconcile the Loadbalancer at `key`
pub async fn reconcile(ctx: &Context, key: &ObjectKey) -> Result<Outcome, Error> {
    let store = ctx.store();
    let Some(lb) = get_typed::<Loadbalancer>(store, key).await? else {
        return Ok(Outcome::Done);
    };
    lb.spec.validate(&key.name)?;
    let owner = owner_reference(&lb)?;

    let service_key = key.sibling(ResourceKind::Service, lb.spec.name.clone());
    let service = converge(store, &service_key, &owner, |svc: Service| {
        Ok(desired_service(svc, &lb.spec, &key.name))
    })
    .await?
    .object;

    let observed = ingress_address(&service);
    if observed.as_deref() != lb.observed_address() {
        publish_address(ctx, key, &lb, observed.as_deref()).await?;
    }
    Ok(Outcome::Done)
}

/// Write the observed address to status, or clear it once the ingress is gone
async fn publish_address(
    ctx: &Context,
    key: &ObjectKey,
    lb: &Loadbalancer,
    address: Option<&str>,
) -> Result<(), Error> {
    let resource_version = lb.resource_version().ok_or_else(|| {
        Error::internal_with_context("loadbalancer", format!("{} has no resourceVersion", key))
    })?;
    ctx.store()
        .patch_status(key, &resource_version, json!({ "ip": address }))
        .await?;
    match address {
        Some(address) => info!(
            name = %key.name,
            namespace = %key.namespace,
            address = %address,
            "published load balancer address"
        ),
        None => info!(
            name = %key.name,
            namespace = %key.namespace,
            "load balancer lost its address, cleared status"
        ),
    }
    Ok(())
}

/// Pod selector: the API server's name label and owning instance, plus the overlay
pub fn selector(spec: &LoadbalancerSpec, instance: &str) -> BTreeMap<String, String> {
    let mut selector = spec.selectors.clone();
    selector.insert(LABEL_NAME.to_string(), COMPONENT_KUBE_APISERVER.to_string());
    selector.insert(LABEL_INSTANCE.to_string(), instance.to_string());
    selector
}

/// Desired ports, keeping node ports the API server already allocated
pub fn desired_ports(spec: &LoadbalancerSpec, existing: &[ServicePort]) -> Vec<ServicePort> {
    let port = |name: &str, port: i32, target: i32| {
        let node_port = existing
            .iter()
            .find(|p| p.name.as_deref() == Some(name))
            .and_then(|p| p.node_port);
        ServicePort {
            name: Some(name.to_string()),
            port,
            target_port: Some(IntOrString::Int(target)),
            protocol: Some("TCP".to_string()),
            node_port,
            ..Default::default()
        }
    };
    vec![
        port(HTTPS_PORT_NAME, spec.port, API_SERVER_PORT),
        port(
            KONNECTIVITY_PORT_NAME,
            KONNECTIVITY_AGENT_PORT,
            KONNECTIVITY_AGENT_PORT,
        ),
    ]
}

/// Fold the Service fields this reconciler owns onto `svc`
pub fn desired_service(mut svc: Service, spec: &LoadbalancerSpec, instance: &str) -> Service {
    svc.metadata
        .labels
        .get_or_insert_with(BTreeMap::new)
        .extend(component_labels(COMPONENT_LOADBALANCER, instance, &BTreeMap::new()));

    let svc_spec = svc.spec.get_or_insert_with(ServiceSpec::default);
    svc_spec.type_ = Some("LoadBalancer".to_string());
    svc_spec.selector = Some(selector(spec, instance));
    let existing = svc_spec.ports.take().unwrap_or_default();
    svc_spec.ports = Some(desired_ports(spec, &existing));
    svc
}

/// Address assigned by the infrastructure: the first ingress IP, or its
/// hostname for providers that publish DNS names
pub fn ingress_address(svc: &Service) -> Option<String> {
    let ingress = svc
        .status
        .as_ref()?
        .load_balancer
        .as_ref()?
        .ingress
        .as_ref()?
        .first()?;
    ingress
        .ip
        .clone()
        .filter(|ip| !ip.is_empty())
        .or_else(|| ingress.hostname.clone().filter(|h| !h.is_empty()))
}
