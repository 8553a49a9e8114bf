//! Check-and-defer gating on prerequisite artifacts
//!
//! A missing prerequisite is not an error: the reconciler stops for this
//! tick and asks to be requeued after a fixed delay. Any other lookup
//! failure propagates with its own classification.

use std::time::Duration;

use tracing::info;

use crate::resource::{ManagedResource, ObjectKey};
use crate::store::{get_typed, ObjectStore};
use crate::Error;

/// Delay before re-checking a prerequisite that does not exist yet
pub const NOT_READY_REQUEUE: Duration = Duration::from_secs(3);

/// Outcome of a readiness lookup
#[derive(Clone, Debug, PartialEq)]
pub enum Readiness<T> {
    /// Prerequisite is present
    Ready(T),
    /// Prerequisite is absent; requeue and stop
    NotReady,
}

impl<T> Readiness<T> {
    /// Wrap an optional value, logging why it is not ready
    pub fn from_option(value: Option<T>, what: &str, owner: &ObjectKey) -> Self {
        match value {
            Some(v) => Readiness::Ready(v),
            None => {
                info!(
                    kind = %owner.kind,
                    name = %owner.name,
                    namespace = %owner.namespace,
                    waiting_for = what,
                    "prerequisite not ready, requeueing"
                );
                Readiness::NotReady
            }
        }
    }
}

/// Require the object at `key` to exist
pub async fn require<K: ManagedResource>(
    store: &dyn ObjectStore,
    key: &ObjectKey,
) -> Result<Readiness<K>, Error> {
    match get_typed::<K>(store, key).await? {
        Some(obj) => Ok(Readiness::Ready(obj)),
        None => {
            info!(
                kind = %key.kind,
                name = %key.name,
                namespace = %key.namespace,
                "prerequisite not found, requeueing"
            );
            Ok(Readiness::NotReady)
        }
    }
}

/// Unwrap a [`Readiness`], or return `Ok(Outcome::RequeueAfter(delay))` from
/// the enclosing reconciler.
///
/// ```ignore
/// let ca: Secret = ready!(require(store, &ca_key).await?, ctx.config.not_ready_requeue);
/// ```
#[macro_export]
macro_rules! ready {
    ($readiness:expr, $delay:expr) => {
        match $readiness {
            $crate::readiness::Readiness::Ready(value) => value,
            $crate::readiness::Readiness::NotReady => {
                return Ok($crate::reconcile::Outcome::RequeueAfter($delay));
            }
        }
    };
}
