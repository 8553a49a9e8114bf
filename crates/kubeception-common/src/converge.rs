//! Create-or-patch with ownership stamping
//!
//! Desired state is a pure function from the current object (or a blank one)
//! to the next object. [`converge`] diffs the two and issues at most one
//! write: a create when the object is absent, a replace when the function
//! changed something, nothing otherwise.

use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use tracing::{debug, info};

use crate::resource::{ManagedResource, ObjectKey};
use crate::store::{from_dynamic, get_typed, to_dynamic, ObjectStore};
use crate::Error;

/// What a convergence call did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Object did not exist and was created
    Created,
    /// Object existed and was rewritten
    Patched,
    /// Object already matched; no write issued
    Unchanged,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Patched => "patched",
            Self::Unchanged => "unchanged",
        })
    }
}

/// Result of a convergence call: the object as stored and what was done
#[derive(Clone, Debug)]
pub struct Converged<K> {
    /// Object after convergence
    pub object: K,
    /// Operation performed
    pub op: Operation,
}

/// Controller owner reference pointing at `owner`.
///
/// Fails if the owner has not been persisted yet (no UID).
pub fn owner_reference<K: Resource<DynamicType = ()>>(owner: &K) -> Result<OwnerReference, Error> {
    owner.controller_owner_ref(&()).ok_or_else(|| {
        Error::internal_with_context(
            "converge",
            format!(
                "{} {} has no uid and cannot own objects",
                K::kind(&()),
                owner.name_any()
            ),
        )
    })
}

/// Converge the object at `key` to `desired(current)`, owned by `owner`.
///
/// `desired` receives the live object (with ownership already stamped) or a
/// blank one when absent, and returns the next state. Safe to call repeatedly
/// with the same arguments.
pub async fn converge<K, F>(
    store: &dyn ObjectStore,
    key: &ObjectKey,
    owner: &OwnerReference,
    desired: F,
) -> Result<Converged<K>, Error>
where
    K: ManagedResource,
    F: FnOnce(K) -> Result<K, Error>,
{
    let current: Option<K> = get_typed(store, key).await?;

    let (object, op) = match current {
        None => {
            let blank = K::blank(ObjectMeta {
                name: Some(key.name.clone()),
                namespace: Some(key.namespace.clone()),
                ..Default::default()
            });
            let next = claim(key, desired(claim(key, blank, owner)?)?, owner)?;
            let created = store.create(key, to_dynamic(&next)?).await?;
            (from_dynamic(created)?, Operation::Created)
        }
        Some(current) => {
            let next = claim(key, desired(claim(key, current.clone(), owner)?)?, owner)?;
            if next == current {
                (current, Operation::Unchanged)
            } else {
                let replaced = store.replace(key, to_dynamic(&next)?).await?;
                (from_dynamic(replaced)?, Operation::Patched)
            }
        }
    };

    match op {
        Operation::Unchanged => debug!(
            kind = %key.kind,
            name = %key.name,
            namespace = %key.namespace,
            "already converged"
        ),
        _ => info!(
            kind = %key.kind,
            name = %key.name,
            namespace = %key.namespace,
            operation = %op,
            "converged"
        ),
    }
    Ok(Converged { object, op })
}

/// Pin identity and controller ownership on `obj`.
///
/// An object controlled by someone else is never adopted.
fn claim<K: ManagedResource>(
    key: &ObjectKey,
    mut obj: K,
    owner: &OwnerReference,
) -> Result<K, Error> {
    let meta = obj.meta_mut();
    meta.name = Some(key.name.clone());
    meta.namespace = Some(key.namespace.clone());

    let refs = meta.owner_references.get_or_insert_with(Vec::new);
    if let Some(other) = refs
        .iter()
        .find(|r| r.controller == Some(true) && r.uid != owner.uid)
    {
        return Err(Error::ownership(
            key.to_string(),
            format!("already controlled by {} {} ({})", other.kind, other.name, other.uid),
        ));
    }
    match refs.iter_mut().find(|r| r.uid == owner.uid) {
        Some(existing) if existing != owner => *existing = owner.clone(),
        Some(_) => {}
        None => refs.push(owner.clone()),
    }
    Ok(obj)
}
