//! Controller runner - one kube-runtime controller per custom resource
//!
//! Each controller watches its own kind plus the children it creates, so an
//! edit or deletion of a child requeues the owner. Reconcile logic lives in
//! `kubeception_controller`; the functions here only translate between
//! kube-runtime's `Arc<K>` callbacks and the store-driven reconcilers.

use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use k8s_openapi::NamespaceResourceScope;
use kube::runtime::controller::Action;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;

use kubeception_common::crd::{
    Certificate, ControlPlane, Issuer, KubeApiServer, KubeControllerManager, KubeScheduler,
    Loadbalancer, Pki,
};
use kubeception_common::{Error, ErrorKind, ManagedResource, ObjectKey, Outcome};
use kubeception_controller::{
    apiserver, control_plane, controller_manager, loadbalancer, pki, scheduler, Context,
};

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
const WATCH_TIMEOUT_SECS: u32 = 25;

/// A controller future ready to be joined with the others
pub type ControllerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Requeue delays applied when a reconcile returns an error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequeuePolicy {
    /// Delay after a transient error
    pub transient: Duration,
    /// Delay after a fatal error
    pub fatal: Duration,
}

impl Default for RequeuePolicy {
    fn default() -> Self {
        Self {
            transient: Duration::from_secs(15),
            fatal: Duration::from_secs(60),
        }
    }
}

impl RequeuePolicy {
    /// Delay for an error of the given class
    pub fn delay_for(&self, kind: ErrorKind) -> Duration {
        match kind {
            ErrorKind::Transient => self.transient,
            ErrorKind::Fatal => self.fatal,
        }
    }
}

/// State shared by every controller
pub struct RunnerContext {
    /// Reconciler context (store + configuration)
    pub reconciler: Context,
    /// Error requeue delays
    pub requeue: RequeuePolicy,
}

/// Build one controller future per custom resource kind
pub fn build_controllers(
    client: Client,
    namespace: Option<String>,
    ctx: Arc<RunnerContext>,
) -> Vec<ControllerFuture> {
    let ns = namespace.as_deref();
    tracing::info!(namespace = ns.unwrap_or("<all>"), "starting controllers");

    tracing::info!("- ControlPlane controller");
    let control_planes = Controller::new(scoped::<ControlPlane>(&client, ns), watcher_config())
        .owns(scoped::<Loadbalancer>(&client, ns), watcher_config())
        .owns(scoped::<Pki>(&client, ns), watcher_config())
        .owns(scoped::<KubeApiServer>(&client, ns), watcher_config())
        .owns(scoped::<KubeControllerManager>(&client, ns), watcher_config())
        .owns(scoped::<KubeScheduler>(&client, ns), watcher_config())
        .shutdown_on_signal()
        .run(reconcile_control_plane, error_policy, ctx.clone())
        .for_each(log_reconcile_result("ControlPlane"));

    tracing::info!("- Loadbalancer controller");
    let loadbalancers = Controller::new(scoped::<Loadbalancer>(&client, ns), watcher_config())
        .owns(scoped::<Service>(&client, ns), watcher_config())
        .shutdown_on_signal()
        .run(reconcile_loadbalancer, error_policy, ctx.clone())
        .for_each(log_reconcile_result("Loadbalancer"));

    tracing::info!("- Pki controller");
    let pkis = Controller::new(scoped::<Pki>(&client, ns), watcher_config())
        .owns(scoped::<Issuer>(&client, ns), watcher_config())
        .owns(scoped::<Certificate>(&client, ns), watcher_config())
        .owns(scoped::<Secret>(&client, ns), watcher_config())
        .shutdown_on_signal()
        .run(reconcile_pki, error_policy, ctx.clone())
        .for_each(log_reconcile_result("Pki"));

    tracing::info!("- KubeAPIServer controller");
    let apiservers = Controller::new(scoped::<KubeApiServer>(&client, ns), watcher_config())
        .owns(scoped::<Deployment>(&client, ns), watcher_config())
        .owns(scoped::<Secret>(&client, ns), watcher_config())
        .owns(scoped::<ConfigMap>(&client, ns), watcher_config())
        .shutdown_on_signal()
        .run(reconcile_kube_apiserver, error_policy, ctx.clone())
        .for_each(log_reconcile_result("KubeAPIServer"));

    tracing::info!("- KubeControllerManager controller");
    let controller_managers = Controller::new(
        scoped::<KubeControllerManager>(&client, ns),
        watcher_config(),
    )
    .owns(scoped::<Deployment>(&client, ns), watcher_config())
    .owns(scoped::<Secret>(&client, ns), watcher_config())
    .shutdown_on_signal()
    .run(reconcile_kube_controller_manager, error_policy, ctx.clone())
    .for_each(log_reconcile_result("KubeControllerManager"));

    tracing::info!("- KubeScheduler controller");
    let schedulers = Controller::new(scoped::<KubeScheduler>(&client, ns), watcher_config())
        .owns(scoped::<Deployment>(&client, ns), watcher_config())
        .owns(scoped::<Secret>(&client, ns), watcher_config())
        .shutdown_on_signal()
        .run(reconcile_kube_scheduler, error_policy, ctx)
        .for_each(log_reconcile_result("KubeScheduler"));

    vec![
        Box::pin(control_planes),
        Box::pin(loadbalancers),
        Box::pin(pkis),
        Box::pin(apiservers),
        Box::pin(controller_managers),
        Box::pin(schedulers),
    ]
}

fn watcher_config() -> WatcherConfig {
    WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS)
}

/// Api for `K` in one namespace, or across the cluster
fn scoped<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

async fn reconcile_control_plane(
    obj: Arc<ControlPlane>,
    ctx: Arc<RunnerContext>,
) -> Result<Action, Error> {
    let key = ObjectKey::for_object(obj.as_ref());
    control_plane::reconcile(&ctx.reconciler, &key)
        .await
        .map(Outcome::into_action)
}

async fn reconcile_loadbalancer(
    obj: Arc<Loadbalancer>,
    ctx: Arc<RunnerContext>,
) -> Result<Action, Error> {
    let key = ObjectKey::for_object(obj.as_ref());
    loadbalancer::reconcile(&ctx.reconciler, &key)
        .await
        .map(Outcome::into_action)
}

async fn reconcile_pki(obj: Arc<Pki>, ctx: Arc<RunnerContext>) -> Result<Action, Error> {
    let key = ObjectKey::for_object(obj.as_ref());
    pki::reconcile(&ctx.reconciler, &key)
        .await
        .map(Outcome::into_action)
}

async fn reconcile_kube_apiserver(
    obj: Arc<KubeApiServer>,
    ctx: Arc<RunnerContext>,
) -> Result<Action, Error> {
    let key = ObjectKey::for_object(obj.as_ref());
    apiserver::reconcile(&ctx.reconciler, &key)
        .await
        .map(Outcome::into_action)
}

async fn reconcile_kube_controller_manager(
    obj: Arc<KubeControllerManager>,
    ctx: Arc<RunnerContext>,
) -> Result<Action, Error> {
    let key = ObjectKey::for_object(obj.as_ref());
    controller_manager::reconcile(&ctx.reconciler, &key)
        .await
        .map(Outcome::into_action)
}

async fn reconcile_kube_scheduler(
    obj: Arc<KubeScheduler>,
    ctx: Arc<RunnerContext>,
) -> Result<Action, Error> {
    let key = ObjectKey::for_object(obj.as_ref());
    scheduler::reconcile(&ctx.reconciler, &key)
        .await
        .map(Outcome::into_action)
}

/// Requeue failed reconciles by error class
fn error_policy<K: ManagedResource>(obj: Arc<K>, error: &Error, ctx: Arc<RunnerContext>) -> Action {
    let key = ObjectKey::for_object(obj.as_ref());
    let kind = error.kind();
    let delay = ctx.requeue.delay_for(kind);
    tracing::error!(
        object = %key,
        resource = error.resource().unwrap_or("-"),
        error = %error,
        class = ?kind,
        ?delay,
        "reconcile failed"
    );
    Action::requeue(delay)
}

/// Create a closure that logs reconciliation results
fn log_reconcile_result<T: Debug, E: Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_wait_longer_than_transient_ones() {
        let policy = RequeuePolicy::default();
        assert_eq!(policy.delay_for(ErrorKind::Transient), Duration::from_secs(15));
        assert_eq!(policy.delay_for(ErrorKind::Fatal), Duration::from_secs(60));
    }

    #[test]
    fn custom_delays_are_honoured() {
        let policy = RequeuePolicy {
            transient: Duration::from_secs(1),
            fatal: Duration::from_secs(2),
        };
        assert_eq!(policy.delay_for(ErrorKind::Transient), Duration::from_secs(1));
        assert_eq!(policy.delay_for(ErrorKind::Fatal), Duration::from_secs(2));
    }

    fn runner_context() -> Arc<RunnerContext> {
        use kubeception_common::store::{MemoryStore, ObjectStore};

        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
        Arc::new(RunnerContext {
            reconciler: Context::new(store),
            requeue: RequeuePolicy::default(),
        })
    }

    fn scheduler() -> Arc<KubeScheduler> {
        let mut ks = KubeScheduler::new("demo", Default::default());
        ks.metadata.namespace = Some("default".to_string());
        Arc::new(ks)
    }

    #[test]
    fn error_policy_requeues_by_error_class() {
        let ctx = runner_context();

        let fatal = Error::credential("demo-kube-scheduler", "tls.crt is not PEM");
        assert_eq!(
            error_policy(scheduler(), &fatal, ctx.clone()),
            Action::requeue(Duration::from_secs(60))
        );

        let transient = Error::conflict("KubeScheduler/default/demo", "stale resourceVersion");
        assert_eq!(
            error_policy(scheduler(), &transient, ctx),
            Action::requeue(Duration::from_secs(15))
        );
    }
}
