//! Kubernetes-backed [`ApiClient`] over dynamic objects.
//!
//! Resources are addressed by apiVersion/kind at runtime rather than typed
//! CRD structs, so check definitions stay configuration: adding a new
//! resource kind to watch needs no code change.

use async_trait::async_trait;
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, GroupVersionKind, ListParams, Patch,
    PatchParams, PostParams,
};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde_json::Value;
use tracing::debug;

use crate::client::{ApiClient, GetOutcome, PatchStrategy, ResourceKey};
use crate::error::{ClientError, Result};

/// Field manager name used for server-side apply.
const FIELD_MANAGER: &str = "drguard";

#[derive(Clone)]
pub struct KubeApiClient {
    client: Client,
}

impl KubeApiClient {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the ambient environment (in-cluster service
    /// account or local kubeconfig).
    pub async fn from_env() -> Result<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| ClientError::Config(format!("failed to build kube client: {e}")))?;
        Ok(Self::new(client))
    }

    /// Build a client from raw kubeconfig bytes, as stored in a hub secret.
    pub async fn from_kubeconfig_bytes(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ClientError::Config(format!("kubeconfig is not valid UTF-8: {e}")))?;
        let kubeconfig = Kubeconfig::from_yaml(text)
            .map_err(|e| ClientError::Config(format!("failed to parse kubeconfig: {e}")))?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| ClientError::Config(format!("failed to load kubeconfig: {e}")))?;
        let client = Client::try_from(config)
            .map_err(|e| ClientError::Config(format!("failed to build kube client: {e}")))?;
        Ok(Self::new(client))
    }

    fn dynamic_api(&self, api_version: &str, kind: &str, namespace: Option<&str>) -> Api<DynamicObject> {
        let (group, version) = match api_version.split_once('/') {
            Some((g, v)) => (g, v),
            None => ("", api_version),
        };
        let ar = ApiResource::from_gvk(&GroupVersionKind::gvk(group, version, kind));
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        }
    }

    fn api_for(&self, key: &ResourceKey) -> Api<DynamicObject> {
        self.dynamic_api(&key.api_version, &key.kind, key.namespace.as_deref())
    }

    /// Fill in apiVersion/kind/metadata from the key so manifests in check
    /// definitions can stay minimal.
    fn to_object(key: &ResourceKey, spec: &Value) -> Result<DynamicObject> {
        let mut doc = spec.clone();
        if let Some(map) = doc.as_object_mut() {
            map.entry("apiVersion")
                .or_insert_with(|| Value::String(key.api_version.clone()));
            map.entry("kind")
                .or_insert_with(|| Value::String(key.kind.clone()));
            let metadata = map
                .entry("metadata")
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            if let Some(meta) = metadata.as_object_mut() {
                meta.entry("name")
                    .or_insert_with(|| Value::String(key.name.clone()));
                if let Some(ns) = &key.namespace {
                    meta.entry("namespace")
                        .or_insert_with(|| Value::String(ns.clone()));
                }
            }
        }
        Ok(serde_json::from_value(doc)?)
    }
}

fn is_status(err: &kube::Error, code: u16) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == code)
}

#[async_trait]
impl ApiClient for KubeApiClient {
    async fn get(&self, key: &ResourceKey) -> Result<GetOutcome> {
        let api = self.api_for(key);
        match api.get_opt(&key.name).await.map_err(ClientError::from)? {
            Some(obj) => Ok(GetOutcome::Found(serde_json::to_value(obj)?)),
            None => Ok(GetOutcome::NotFound),
        }
    }

    async fn list(
        &self,
        api_version: &str,
        kind: &str,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<Value>> {
        let api = self.dynamic_api(api_version, kind, namespace);
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        let objects = api.list(&params).await.map_err(ClientError::from)?;
        objects
            .items
            .into_iter()
            .map(|o| serde_json::to_value(o).map_err(ClientError::from))
            .collect()
    }

    async fn patch(
        &self,
        key: &ResourceKey,
        patch: &Value,
        strategy: PatchStrategy,
    ) -> Result<Value> {
        let api = self.api_for(key);
        let obj = match strategy {
            PatchStrategy::Merge => {
                api.patch(&key.name, &PatchParams::default(), &Patch::Merge(patch))
                    .await
            }
            PatchStrategy::Json => {
                let ops: json_patch::Patch = serde_json::from_value(patch.clone())?;
                api.patch(
                    &key.name,
                    &PatchParams::default(),
                    &Patch::Json::<Value>(ops),
                )
                .await
            }
            PatchStrategy::Apply => {
                api.patch(
                    &key.name,
                    &PatchParams::apply(FIELD_MANAGER),
                    &Patch::Apply(patch),
                )
                .await
            }
        }
        .map_err(ClientError::from)?;
        Ok(serde_json::to_value(obj)?)
    }

    async fn create(&self, key: &ResourceKey, spec: &Value) -> Result<Value> {
        let api = self.api_for(key);
        let obj = Self::to_object(key, spec)?;
        match api.create(&PostParams::default(), &obj).await {
            Ok(created) => Ok(serde_json::to_value(created)?),
            Err(err) if is_status(&err, 409) => {
                // Replace-on-conflict: carry over the live resourceVersion.
                debug!("{} already exists, replacing", key);
                let existing = api.get(&key.name).await.map_err(ClientError::from)?;
                let mut replacement = obj;
                replacement.metadata.resource_version = existing.metadata.resource_version;
                let replaced = api
                    .replace(&key.name, &PostParams::default(), &replacement)
                    .await
                    .map_err(ClientError::from)?;
                Ok(serde_json::to_value(replaced)?)
            }
            Err(err) => Err(ClientError::from(err)),
        }
    }

    async fn delete(&self, key: &ResourceKey) -> Result<()> {
        let api = self.api_for(key);
        match api.delete(&key.name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(err) if is_status(&err, 404) => Ok(()),
            Err(err) => Err(ClientError::from(err)),
        }
    }
}
