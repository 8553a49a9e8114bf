//! Shared reconciler context and configuration

use std::sync::Arc;
use std::time::Duration;

use kubeception_common::readiness::NOT_READY_REQUEUE;
use kubeception_common::store::ObjectStore;

/// Container images run by the workload reconcilers.
///
/// Control plane images are repositories; the tag is the effective version
/// of each workload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Images {
    /// API server repository
    pub kube_apiserver: String,
    /// Controller manager repository
    pub kube_controller_manager: String,
    /// Scheduler repository
    pub kube_scheduler: String,
    /// Fully qualified konnectivity server image
    pub konnectivity_server: String,
}

impl Default for Images {
    fn default() -> Self {
        Self {
            kube_apiserver: "registry.k8s.io/kube-apiserver".to_string(),
            kube_controller_manager: "registry.k8s.io/kube-controller-manager".to_string(),
            kube_scheduler: "registry.k8s.io/kube-scheduler".to_string(),
            konnectivity_server: "registry.k8s.io/kas-network-proxy/proxy-server:v0.0.37"
                .to_string(),
        }
    }
}

/// Knobs every reconciler reads instead of globals
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Delay before re-checking a missing prerequisite
    pub not_ready_requeue: Duration,
    /// Workload images
    pub images: Images,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            not_ready_requeue: NOT_READY_REQUEUE,
            images: Images::default(),
        }
    }
}

/// Context handed to every reconcile call
#[derive(Clone)]
pub struct Context {
    /// Object store
    pub store: Arc<dyn ObjectStore>,
    /// Reconciler configuration
    pub config: ReconcilerConfig,
}

impl Context {
    /// Context with the default configuration
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self::with_config(store, ReconcilerConfig::default())
    }

    /// Context with an explicit configuration
    pub fn with_config(store: Arc<dyn ObjectStore>, config: ReconcilerConfig) -> Self {
        Self { store, config }
    }

    /// Borrow the store as a trait object
    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }
}
