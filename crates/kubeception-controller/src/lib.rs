//! Reconcilers for Kubeception virtual control planes
//!
//! Every reconciler takes a [`Context`](context::Context) and the key of the
//! object to converge, reads the live state through the object store and
//! returns an [`Outcome`](kubeception_common::Outcome). They hold no state
//! between calls.

#![deny(missing_docs)]

/// API server workload, konnectivity credential and egress configuration
pub mod apiserver;
/// Reconciler context and configuration
pub mod context;
/// Orchestrator fanning a ControlPlane out into its component resources
pub mod control_plane;
/// Controller manager workload and credential
pub mod controller_manager;
/// Externally exposed Service and address publication
pub mod loadbalancer;
/// Certificate hierarchy and admin credential
pub mod pki;
/// Scheduler workload and configuration
pub mod scheduler;
/// Deployment building blocks shared by the workload reconcilers
pub mod workload;

pub use context::{Context, Images, ReconcilerConfig};

/// Component name of the API server workload
pub const COMPONENT_KUBE_APISERVER: &str = "kube-apiserver";
/// Component name of the controller manager workload
pub const COMPONENT_KUBE_CONTROLLER_MANAGER: &str = "kube-controller-manager";
/// Component name of the scheduler workload
pub const COMPONENT_KUBE_SCHEDULER: &str = "kube-scheduler";
/// Component name of the load balancer Service
pub const COMPONENT_LOADBALANCER: &str = "loadbalancer";
