//! Object store seam
//!
//! Reconcilers never talk to `kube::Api` directly. They go through
//! [`ObjectStore`], which moves untyped [`DynamicObject`]s keyed by
//! [`ObjectKey`]. Production wires in [`KubeStore`]; tests use the in-memory
//! arena [`MemoryStore`], which also models owner-reference garbage collection.

mod kube_store;
mod memory;

pub use kube_store::KubeStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use kube::api::{DynamicObject, TypeMeta};
use serde_json::Value;

#[cfg(test)]
use mockall::automock;

use crate::resource::{ManagedResource, ObjectKey};
use crate::Error;

/// Minimal read/write surface the reconcilers need.
///
/// Writes are guarded by `metadata.resourceVersion`: a stale version is
/// reported as [`Error::Conflict`] and never merged.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object; `Ok(None)` when it does not exist
    async fn get(&self, key: &ObjectKey) -> Result<Option<DynamicObject>, Error>;

    /// Create an object that does not exist yet
    async fn create(&self, key: &ObjectKey, obj: DynamicObject) -> Result<DynamicObject, Error>;

    /// Replace an existing object; `obj` must carry the resourceVersion it was read at
    async fn replace(&self, key: &ObjectKey, obj: DynamicObject) -> Result<DynamicObject, Error>;

    /// Overwrite the status subresource, guarded by `resource_version`
    async fn patch_status(
        &self,
        key: &ObjectKey,
        resource_version: &str,
        status: Value,
    ) -> Result<DynamicObject, Error>;
}

/// Fetch a typed object; `Ok(None)` when it does not exist
pub async fn get_typed<K: ManagedResource>(
    store: &dyn ObjectStore,
    key: &ObjectKey,
) -> Result<Option<K>, Error> {
    match store.get(key).await? {
        Some(obj) => from_dynamic(obj).map(Some),
        None => Ok(None),
    }
}

/// Convert a typed object to its untyped form
pub fn to_dynamic<K: ManagedResource>(obj: &K) -> Result<DynamicObject, Error> {
    let value = serde_json::to_value(obj)
        .map_err(|e| Error::serialization_for_kind(K::KIND.kind_str(), e.to_string()))?;
    let mut dynamic: DynamicObject = serde_json::from_value(value)
        .map_err(|e| Error::serialization_for_kind(K::KIND.kind_str(), e.to_string()))?;
    dynamic.types.get_or_insert_with(type_meta::<K>);
    Ok(dynamic)
}

/// Convert an untyped object to `K`
pub fn from_dynamic<K: ManagedResource>(mut obj: DynamicObject) -> Result<K, Error> {
    obj.types.get_or_insert_with(type_meta::<K>);
    let value = serde_json::to_value(&obj)
        .map_err(|e| Error::serialization_for_kind(K::KIND.kind_str(), e.to_string()))?;
    serde_json::from_value(value)
        .map_err(|e| Error::serialization_for_kind(K::KIND.kind_str(), e.to_string()))
}

fn type_meta<K: ManagedResource>() -> TypeMeta {
    TypeMeta {
        api_version: K::api_version(&()).to_string(),
        kind: K::kind(&()).to_string(),
    }
}
