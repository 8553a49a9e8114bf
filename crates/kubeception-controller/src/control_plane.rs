//! ControlPlane orchestrator
//!
//! Fans a ControlPlane out into its component resources, each named after
//! the ControlPlane and controlled by it:
//!
//! ```text
//! ControlPlane ─┬─ Loadbalancer ── observed address ──┐
//!               ├─ Pki                  <─────────────┤ control-plane-address
//!               ├─ KubeAPIServer        <─────────────┘ advertise-address, selector labels
//!               ├─ KubeControllerManager
//!               └─ KubeScheduler
//! ```
//!
//! Each component has its own reconciler. The address flows through on the
//! tick after the Loadbalancer publishes it, since the watch on the owned
//! Loadbalancer requeues the ControlPlane.

use kube::ResourceExt;
use tracing::info;

use kubeception_common::converge::{converge, owner_reference, Operation};
use kubeception_common::crd::{
    ControlPlane, ControlPlaneSpec, KubeApiServer, KubeApiServerSpec, KubeControllerManager,
    KubeControllerManagerSpec, KubeScheduler, KubeSchedulerSpec, Loadbalancer, LoadbalancerSpec,
    Pki, PkiSpec,
};
use kubeception_common::resource::ResourceKind;
use kubeception_common::store::get_typed;
use kubeception_common::{Error, ObjectKey, Outcome};

use crate::context::Context;

/// Reconcile the ControlPlane at `key`
pub async fn reconcile(ctx: &Context, key: &ObjectKey) -> Result<Outcome, Error> {
    let store = ctx.store();
    let Some(cp) = get_typed::<ControlPlane>(store, key).await? else {
        return Ok(Outcome::Done);
    };
    let spec = &cp.spec;
    spec.validate(&key.name)?;
    let owner = owner_reference(&cp)?;
    let child = |kind| key.sibling(kind, key.name.clone());

    let lb = converge(
        store,
        &child(ResourceKind::Loadbalancer),
        &owner,
        |mut lb: Loadbalancer| {
            lb.spec = loadbalancer_spec(spec);
            Ok(lb)
        },
    )
    .await?;
    log_operation(key, "Loadbalancer", lb.op);
    let lb = lb.object;
    let address = lb.observed_address().map(str::to_string);

    let pki = converge(store, &child(ResourceKind::Pki), &owner, |mut pki: Pki| {
        pki.spec = pki_spec(spec, address.as_deref());
        Ok(pki)
    })
    .await?;
    log_operation(key, "Pki", pki.op);

    let kas = converge(
        store,
        &child(ResourceKind::KubeApiServer),
        &owner,
        |mut kas: KubeApiServer| {
            kas.spec = kube_apiserver_spec(spec, &lb.spec, address.as_deref());
            Ok(kas)
        },
    )
    .await?;
    log_operation(key, "KubeAPIServer", kas.op);

    let kcm = converge(
        store,
        &child(ResourceKind::KubeControllerManager),
        &owner,
        |mut kcm: KubeControllerManager| {
            kcm.spec = kube_controller_manager_spec(spec);
            Ok(kcm)
        },
    )
    .await?;
    log_operation(key, "KubeControllerManager", kcm.op);

    let ks = converge(
        store,
        &child(ResourceKind::KubeScheduler),
        &owner,
        |mut ks: KubeScheduler| {
            ks.spec = kube_scheduler_spec(spec);
            Ok(ks)
        },
    )
    .await?;
    log_operation(key, "KubeScheduler", ks.op);

    if address.is_none() {
        info!(
            name = %cp.name_any(),
            namespace = %key.namespace,
            "load balancer has no address yet"
        );
    }
    Ok(Outcome::Done)
}

fn log_operation(key: &ObjectKey, component: &str, op: Operation) {
    if op != Operation::Unchanged {
        info!(
            control_plane = %key.name,
            namespace = %key.namespace,
            component,
            operation = %op,
            "component resource converged"
        );
    }
}

/// Loadbalancer spec, copied as-is
pub fn loadbalancer_spec(spec: &ControlPlaneSpec) -> LoadbalancerSpec {
    spec.loadbalancer.clone()
}

/// Pki spec with the observed control plane address injected
pub fn pki_spec(spec: &ControlPlaneSpec, address: Option<&str>) -> PkiSpec {
    PkiSpec {
        control_plane_address: address.map(str::to_string),
        ..spec.pki.clone()
    }
}

/// KubeAPIServer spec with the effective version, the load balancer's
/// selector labels on its pods and the observed address advertised
pub fn kube_apiserver_spec(
    spec: &ControlPlaneSpec,
    lb: &LoadbalancerSpec,
    address: Option<&str>,
) -> KubeApiServerSpec {
    let mut kas = spec.kube_apiserver.clone();
    kas.version = spec.kube_apiserver_version();
    kas.deployment
        .labels
        .extend(lb.selectors.iter().map(|(k, v)| (k.clone(), v.clone())));
    kas.options.advertise_address = address.map(str::to_string);
    kas
}

/// KubeControllerManager spec with the effective version
pub fn kube_controller_manager_spec(spec: &ControlPlaneSpec) -> KubeControllerManagerSpec {
    KubeControllerManagerSpec {
        version: spec.kube_controller_manager_version(),
        ..spec.kube_controller_manager.clone()
    }
}

/// KubeScheduler spec with the effective version
pub fn kube_scheduler_spec(spec: &ControlPlaneSpec) -> KubeSchedulerSpec {
    KubeSchedulerSpec {
        version: spec.kube_scheduler_version(),
        ..spec.kube_scheduler.clone()
    }
}
