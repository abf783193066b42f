//! kube-rs backed collaborators.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::{
    api::{Api, DeleteParams, ListParams, PostParams},
    core::{ApiResource, DynamicObject, GroupVersionKind},
    discovery::{Discovery, Scope},
    Client,
};
use metrics::counter;
use rollwave_core::{Resource, ResourceKey};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::{split_api_version, ClusterIdentity, NamespaceChecker, ResourceStore, TypeRegistry};

static CLIENT: OnceCell<Client> = OnceCell::const_new();

/// Shared client for the current kube context, built on first use.
pub async fn get_kube_client() -> Result<Client> {
    let client = CLIENT
        .get_or_try_init(|| async { Client::try_default().await.context("building kube client") })
        .await?;
    Ok(client.clone())
}

async fn find_api_resource(client: Client, gvk: &GroupVersionKind) -> Result<Option<(ApiResource, bool)>> {
    let discovery = Discovery::new(client).run().await.context("running API discovery")?;
    for group in discovery.groups() {
        for (ar, caps) in group.recommended_resources() {
            if ar.group == gvk.group && ar.version == gvk.version && ar.kind == gvk.kind {
                let namespaced = matches!(caps.scope, Scope::Namespaced);
                return Ok(Some((ar.clone(), namespaced)));
            }
        }
    }
    Ok(None)
}

fn gvk_for(api_version: &str, kind: &str) -> GroupVersionKind {
    let (group, version) = split_api_version(api_version);
    GroupVersionKind { group: group.to_string(), version: version.to_string(), kind: kind.to_string() }
}

fn to_resource(obj: &DynamicObject) -> Result<Resource> {
    let raw = serde_json::to_value(obj).context("serializing DynamicObject")?;
    Resource::from_json(raw)
}

fn to_dynamic(res: &Resource) -> Result<DynamicObject> {
    let raw = serde_json::to_value(res).context("serializing resource")?;
    Ok(serde_json::from_value(raw).context("building DynamicObject")?)
}

/// Dynamic-object store resolving kinds through discovery.
pub struct KubeStore {
    client: Client,
    resolved: Mutex<HashMap<(String, String), (ApiResource, bool)>>,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client, resolved: Mutex::new(HashMap::new()) }
    }

    async fn resolve(&self, api_version: &str, kind: &str) -> Result<(ApiResource, bool)> {
        let cache_key = (api_version.to_string(), kind.to_string());
        if let Some(hit) = self.resolved.lock().unwrap_or_else(|e| e.into_inner()).get(&cache_key) {
            return Ok(hit.clone());
        }
        let gvk = gvk_for(api_version, kind);
        let found = find_api_resource(self.client.clone(), &gvk)
            .await?
            .ok_or_else(|| anyhow!("GVK not found: {}/{}/{}", gvk.group, gvk.version, gvk.kind))?;
        self.resolved.lock().unwrap_or_else(|e| e.into_inner()).insert(cache_key, found.clone());
        Ok(found)
    }

    async fn api(&self, api_version: &str, kind: &str, namespace: Option<&str>, require_ns: bool) -> Result<Api<DynamicObject>> {
        let (ar, namespaced) = self.resolve(api_version, kind).await?;
        let api = if namespaced {
            match namespace {
                Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
                None if require_ns => return Err(anyhow!("namespace required for namespaced kind {}", kind)),
                None => Api::all_with(self.client.clone(), &ar),
            }
        } else {
            Api::all_with(self.client.clone(), &ar)
        };
        Ok(api)
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get(&self, key: &ResourceKey) -> Result<Option<Resource>> {
        let api = self.api(&key.api_version, &key.kind, key.namespace.as_deref(), true).await?;
        match api.get_opt(&key.name).await.with_context(|| format!("getting {}", key))? {
            Some(obj) => Ok(Some(to_resource(&obj)?)),
            None => Ok(None),
        }
    }

    async fn create(&self, resource: &Resource) -> Result<()> {
        let api = self.api(&resource.api_version, &resource.kind, resource.namespace(), true).await?;
        let obj = to_dynamic(resource)?;
        api.create(&PostParams::default(), &obj).await.with_context(|| format!("creating {}", resource.key()))?;
        counter!("kube_create_total", 1u64);
        Ok(())
    }

    async fn delete(&self, key: &ResourceKey) -> Result<()> {
        let api = self.api(&key.api_version, &key.kind, key.namespace.as_deref(), true).await?;
        api.delete(&key.name, &DeleteParams::default()).await.with_context(|| format!("deleting {}", key))?;
        counter!("kube_delete_total", 1u64);
        Ok(())
    }

    async fn list(&self, api_version: &str, kind: &str, namespace: Option<&str>, selector: Option<&str>) -> Result<Vec<Resource>> {
        let api = self.api(api_version, kind, namespace, false).await?;
        let mut lp = ListParams::default();
        if let Some(sel) = selector {
            lp = lp.labels(sel);
        }
        let list = api.list(&lp).await.with_context(|| format!("listing {}/{}", api_version, kind))?;
        debug!(kind = %kind, ns = ?namespace, count = list.items.len(), "listed objects");
        list.items.iter().map(to_resource).collect()
    }
}

/// Identifies the cluster by the UID of the `kube-system` namespace.
pub struct KubeClusterIdentity {
    client: Client,
}

impl KubeClusterIdentity {
    pub fn new(client: Client) -> Self { Self { client } }
}

#[async_trait]
impl ClusterIdentity for KubeClusterIdentity {
    async fn cluster_id(&self) -> Result<String> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let ns = api.get("kube-system").await.context("reading kube-system namespace")?;
        let uid = ns.metadata.uid.ok_or_else(|| anyhow!("kube-system namespace missing metadata.uid"))?;
        let parsed = uuid::Uuid::parse_str(&uid).context("parsing cluster id as uuid")?;
        Ok(parsed.hyphenated().to_string())
    }
}

/// Checks served kinds through API discovery.
pub struct KubeTypeRegistry {
    client: Client,
}

impl KubeTypeRegistry {
    pub fn new(client: Client) -> Self { Self { client } }
}

#[async_trait]
impl TypeRegistry for KubeTypeRegistry {
    async fn type_exists(&self, api_version: &str, kind: &str) -> Result<bool> {
        let gvk = gvk_for(api_version, kind);
        Ok(find_api_resource(self.client.clone(), &gvk).await?.is_some())
    }
}

pub struct KubeNamespaces {
    client: Client,
}

impl KubeNamespaces {
    pub fn new(client: Client) -> Self { Self { client } }
}

#[async_trait]
impl NamespaceChecker for KubeNamespaces {
    async fn namespace_exists(&self, name: &str) -> Result<bool> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await.with_context(|| format!("reading namespace {}", name))?.is_some())
    }
}
