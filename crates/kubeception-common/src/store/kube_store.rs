//! Live API server implementation of the object store

use async_trait::async_trait;
use kube::api::{Api, DynamicObject, Patch, PatchParams, PostParams};
use kube::Client;
use serde_json::{json, Value};

use super::ObjectStore;
use crate::resource::ObjectKey;
use crate::{Error, FIELD_MANAGER};

/// [`ObjectStore`] backed by `kube::Api<DynamicObject>`
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    /// Wrap a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, key: &ObjectKey) -> Api<DynamicObject> {
        Api::namespaced_with(
            self.client.clone(),
            &key.namespace,
            &key.kind.api_resource(),
        )
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        }
    }
}

/// Map HTTP 409 to a store conflict so callers see one error for both backends
fn classify(key: &ObjectKey, err: kube::Error) -> Error {
    match err {
        kube::Error::Api(ae) if ae.code == 409 => Error::conflict(key.to_string(), ae.message),
        other => Error::from(other),
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<DynamicObject>, Error> {
        self.api(key)
            .get_opt(&key.name)
            .await
            .map_err(|e| classify(key, e))
    }

    async fn create(&self, key: &ObjectKey, obj: DynamicObject) -> Result<DynamicObject, Error> {
        self.api(key)
            .create(&Self::post_params(), &obj)
            .await
            .map_err(|e| classify(key, e))
    }

    async fn replace(&self, key: &ObjectKey, obj: DynamicObject) -> Result<DynamicObject, Error> {
        self.api(key)
            .replace(&key.name, &Self::post_params(), &obj)
            .await
            .map_err(|e| classify(key, e))
    }

    async fn patch_status(
        &self,
        key: &ObjectKey,
        resource_version: &str,
        status: Value,
    ) -> Result<DynamicObject, Error> {
        // A merge patch carrying resourceVersion is rejected with 409 when stale
        let patch = json!({
            "metadata": { "resourceVersion": resource_version },
            "status": status,
        });
        self.api(key)
            .patch_status(
                &key.name,
                &PatchParams {
                    field_manager: Some(FIELD_MANAGER.to_string()),
                    ..Default::default()
                },
                &Patch::Merge(&patch),
            )
            .await
            .map_err(|e| classify(key, e))
    }
}
