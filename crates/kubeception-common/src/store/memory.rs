//! In-memory object store
//!
//! An explicit arena of objects keyed by [`ObjectKey`]. It behaves like the
//! API server where the reconcilers can observe a difference: UIDs and
//! resource versions are assigned on write, stale writes are rejected, the
//! status subresource is only written through `patch_status`, and deleting
//! an object sweeps everything whose owners are all gone.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use kube::api::DynamicObject;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use super::{from_dynamic, to_dynamic, ObjectStore};
use crate::resource::{ManagedResource, ObjectKey, ResourceKind};
use crate::Error;

#[derive(Default)]
struct Arena {
    objects: BTreeMap<ObjectKey, DynamicObject>,
    last_version: u64,
    writes: u64,
}

impl Arena {
    fn next_version(&mut self) -> String {
        self.last_version += 1;
        self.last_version.to_string()
    }

    /// Assign identity fields the way the API server does on write
    fn stamp(&mut self, key: &ObjectKey, obj: &mut DynamicObject, uid: Option<String>) {
        obj.metadata.name = Some(key.name.clone());
        obj.metadata.namespace = Some(key.namespace.clone());
        obj.metadata.uid = Some(uid.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()));
        obj.metadata.resource_version = Some(self.next_version());
    }

    fn check_version(
        &self,
        key: &ObjectKey,
        stored: &DynamicObject,
        resource_version: Option<&str>,
    ) -> Result<(), Error> {
        let current = stored.metadata.resource_version.as_deref();
        match resource_version {
            Some(rv) if Some(rv) == current => Ok(()),
            Some(rv) => Err(Error::conflict(
                key.to_string(),
                format!(
                    "resourceVersion {} is stale, current is {}",
                    rv,
                    current.unwrap_or("none")
                ),
            )),
            None => Err(Error::conflict(
                key.to_string(),
                "write without resourceVersion",
            )),
        }
    }

    /// Remove every object whose owners no longer exist, transitively
    fn sweep(&mut self) -> Vec<ObjectKey> {
        let mut removed = Vec::new();
        loop {
            let live: HashSet<&str> = self
                .objects
                .values()
                .filter_map(|o| o.metadata.uid.as_deref())
                .collect();
            let orphans: Vec<ObjectKey> = self
                .objects
                .iter()
                .filter(|(_, obj)| {
                    let owners = obj.metadata.owner_references.as_deref().unwrap_or_default();
                    !owners.is_empty() && owners.iter().all(|o| !live.contains(o.uid.as_str()))
                })
                .map(|(key, _)| key.clone())
                .collect();
            if orphans.is_empty() {
                return removed;
            }
            for key in orphans {
                debug!(object = %key, "garbage collecting orphan");
                self.objects.remove(&key);
                removed.push(key);
            }
        }
    }
}

fn set_status(obj: &mut DynamicObject, status: Option<Value>) {
    if !obj.data.is_object() {
        obj.data = Value::Object(Default::default());
    }
    if let Value::Object(map) = &mut obj.data {
        match status {
            Some(status) => {
                map.insert("status".to_string(), status);
            }
            None => {
                map.remove("status");
            }
        }
    }
}

fn not_found(key: &ObjectKey) -> Error {
    Error::from(kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{} not found", key),
        reason: "NotFound".to_string(),
        code: 404,
    }))
}

/// [`ObjectStore`] over an in-process arena
#[derive(Default)]
pub struct MemoryStore {
    arena: Mutex<Arena>,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Write an object as an external actor would (a user, cert-manager or a
    /// cloud controller): status included, not counted in [`write_count`].
    ///
    /// [`write_count`]: MemoryStore::write_count
    pub fn insert<K: ManagedResource>(&self, obj: K) -> Result<K, Error> {
        let mut dynamic = to_dynamic(&obj)?;
        let key = ObjectKey::new(
            K::KIND,
            dynamic.metadata.namespace.clone().unwrap_or_default(),
            dynamic.metadata.name.clone().unwrap_or_default(),
        );
        let mut arena = self.arena.lock();
        let uid = arena
            .objects
            .get(&key)
            .and_then(|existing| existing.metadata.uid.clone());
        arena.stamp(&key, &mut dynamic, uid);
        arena.objects.insert(key, dynamic.clone());
        from_dynamic(dynamic)
    }

    /// Typed read outside the reconcile path
    pub fn fetch<K: ManagedResource>(&self, namespace: &str, name: &str) -> Option<K> {
        let key = ObjectKey::of::<K>(namespace, name);
        let obj = self.arena.lock().objects.get(&key).cloned()?;
        from_dynamic(obj).ok()
    }

    /// Whether an object exists
    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.arena.lock().objects.contains_key(key)
    }

    /// Keys of every stored object of `kind`
    pub fn keys_of(&self, kind: ResourceKind) -> Vec<ObjectKey> {
        self.arena
            .lock()
            .objects
            .keys()
            .filter(|k| k.kind == kind)
            .cloned()
            .collect()
    }

    /// Number of create, replace and status writes issued through [`ObjectStore`]
    pub fn write_count(&self) -> u64 {
        self.arena.lock().writes
    }

    /// Delete an object and cascade to everything it (transitively) owns.
    ///
    /// Returns the keys removed, the deleted object first.
    pub fn delete(&self, key: &ObjectKey) -> Vec<ObjectKey> {
        let mut arena = self.arena.lock();
        if arena.objects.remove(key).is_none() {
            return Vec::new();
        }
        let mut removed = vec![key.clone()];
        removed.extend(arena.sweep());
        removed
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<DynamicObject>, Error> {
        Ok(self.arena.lock().objects.get(key).cloned())
    }

    async fn create(&self, key: &ObjectKey, mut obj: DynamicObject) -> Result<DynamicObject, Error> {
        let mut arena = self.arena.lock();
        if arena.objects.contains_key(key) {
            return Err(Error::conflict(key.to_string(), "object already exists"));
        }
        arena.stamp(key, &mut obj, None);
        arena.writes += 1;
        arena.objects.insert(key.clone(), obj.clone());
        Ok(obj)
    }

    async fn replace(&self, key: &ObjectKey, mut obj: DynamicObject) -> Result<DynamicObject, Error> {
        let mut arena = self.arena.lock();
        let stored = arena.objects.get(key).cloned().ok_or_else(|| not_found(key))?;
        arena.check_version(key, &stored, obj.metadata.resource_version.as_deref())?;

        set_status(&mut obj, stored.data.get("status").cloned());
        arena.stamp(key, &mut obj, stored.metadata.uid.clone());
        arena.writes += 1;
        arena.objects.insert(key.clone(), obj.clone());
        Ok(obj)
    }

    async fn patch_status(
        &self,
        key: &ObjectKey,
        resource_version: &str,
        status: Value,
    ) -> Result<DynamicObject, Error> {
        let mut arena = self.arena.lock();
        let mut obj = arena.objects.get(key).cloned().ok_or_else(|| not_found(key))?;
        arena.check_version(key, &obj, Some(resource_version))?;

        set_status(&mut obj, Some(status));
        let uid = obj.metadata.uid.clone();
        arena.stamp(key, &mut obj, uid);
        arena.writes += 1;
        arena.objects.insert(key.clone(), obj.clone());
        Ok(obj)
    }
}
