//! Rollwave kubehub: the cluster-facing collaborators used by rollout and export passes.
//!
//! Every trait here is the whole surface the engine needs from the cluster. The
//! `live` module implements them on kube-rs; `memory` implements them in RAM.

#![forbid(unsafe_code)]

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rollwave_core::{ConfigMapRef, Error, Resource, ResourceKey};
use tokio_util::sync::CancellationToken;

pub mod live;
pub mod memory;

pub use live::{get_kube_client, KubeClusterIdentity, KubeNamespaces, KubeStore, KubeTypeRegistry};
pub use memory::MemoryStore;

/// Generic read/create/delete/list access to cluster objects.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// `Ok(None)` when the object does not exist.
    async fn get(&self, key: &ResourceKey) -> Result<Option<Resource>>;
    async fn create(&self, resource: &Resource) -> Result<()>;
    async fn delete(&self, key: &ResourceKey) -> Result<()>;
    /// `namespace = None` lists across all namespaces. `selector` is an equality label selector (`k=v,k2=v2`).
    async fn list(&self, api_version: &str, kind: &str, namespace: Option<&str>, selector: Option<&str>) -> Result<Vec<Resource>>;
}

#[async_trait]
pub trait ClusterIdentity: Send + Sync {
    async fn cluster_id(&self) -> Result<String>;
}

/// Whether a kind's defining type (a CRD for custom groups) is registered.
#[async_trait]
pub trait TypeRegistry: Send + Sync {
    async fn type_exists(&self, api_version: &str, kind: &str) -> Result<bool>;
}

#[async_trait]
pub trait NamespaceChecker: Send + Sync {
    async fn namespace_exists(&self, name: &str) -> Result<bool>;
}

/// Bundle of collaborators handed to the engines.
#[derive(Clone)]
pub struct Cluster {
    pub store: Arc<dyn ResourceStore>,
    pub identity: Arc<dyn ClusterIdentity>,
    pub types: Arc<dyn TypeRegistry>,
    pub namespaces: Arc<dyn NamespaceChecker>,
}

impl Cluster {
    /// Connect to the cluster of the current kube context.
    pub async fn connect() -> Result<Self> {
        let client = get_kube_client().await?;
        Ok(Self {
            store: Arc::new(KubeStore::new(client.clone())),
            identity: Arc::new(KubeClusterIdentity::new(client.clone())),
            types: Arc::new(KubeTypeRegistry::new(client.clone())),
            namespaces: Arc::new(KubeNamespaces::new(client)),
        })
    }

    pub fn from_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            store: store.clone(),
            identity: store.clone(),
            types: store.clone(),
            namespaces: store,
        }
    }
}

/// Race a cluster call against the caller's cancellation token.
///
/// An already-cancelled token wins before the call is polled.
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled.into()),
        res = fut => res,
    }
}

/// Fetch every referenced ConfigMap, failing with [`Error::NotFound`] on the first missing one.
pub async fn get_config_maps(store: &dyn ResourceStore, refs: &[ConfigMapRef], cancel: &CancellationToken) -> Result<Vec<Resource>> {
    let mut out = Vec::with_capacity(refs.len());
    for r in refs {
        match cancellable(cancel, store.get(&r.key())).await.with_context(|| format!("reading configmap {}", r))? {
            Some(cm) => out.push(cm),
            None => return Err(Error::NotFound { what: format!("configmap {}", r) }.into()),
        }
    }
    Ok(out)
}

/// Split `group/version` into its parts; the core group has an empty group.
pub fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.split_once('/') {
        Some((g, v)) => (g, v),
        None => ("", api_version),
    }
}

/// Parse an equality-only label selector into pairs.
pub fn parse_selector(selector: &str) -> Vec<(&str, &str)> {
    selector
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|term| match term.split_once('=') {
            Some((k, v)) => (k.trim(), v.trim_start_matches('=').trim()),
            None => (term, ""),
        })
        .collect()
}
