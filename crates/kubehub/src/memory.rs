//! In-memory cluster used by tests and dry runs.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rollwave_core::{Resource, ResourceKey};
use serde_json::Value as Json;

use crate::{parse_selector, ClusterIdentity, NamespaceChecker, ResourceStore, TypeRegistry};

#[derive(Default)]
struct State {
    objects: BTreeMap<ResourceKey, Resource>,
    types: BTreeSet<(String, String)>,
    namespaces: BTreeSet<String>,
    creates: Vec<ResourceKey>,
    deletes: Vec<ResourceKey>,
}

pub struct MemoryStore {
    cluster_id: String,
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new(cluster_id: &str) -> Self {
        Self { cluster_id: cluster_id.to_string(), state: Mutex::new(State::default()) }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed an object as if it already existed, status included.
    pub fn insert(&self, resource: Resource) {
        self.lock().objects.insert(resource.key(), resource);
    }

    pub fn register_type(&self, api_version: &str, kind: &str) {
        self.lock().types.insert((api_version.to_string(), kind.to_string()));
    }

    pub fn add_namespace(&self, name: &str) {
        self.lock().namespaces.insert(name.to_string());
    }

    /// Simulate the backend reporting progress on an object.
    pub fn set_status(&self, key: &ResourceKey, status: Json) -> Result<()> {
        let mut st = self.lock();
        let obj = st.objects.get_mut(key).ok_or_else(|| anyhow!("{} not found", key))?;
        obj.status = Some(status);
        Ok(())
    }

    pub fn object(&self, key: &ResourceKey) -> Option<Resource> {
        self.lock().objects.get(key).cloned()
    }

    /// Keys passed to `create`, in call order.
    pub fn creates(&self) -> Vec<ResourceKey> {
        self.lock().creates.clone()
    }

    pub fn deletes(&self) -> Vec<ResourceKey> {
        self.lock().deletes.clone()
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get(&self, key: &ResourceKey) -> Result<Option<Resource>> {
        Ok(self.lock().objects.get(key).cloned())
    }

    async fn create(&self, resource: &Resource) -> Result<()> {
        let key = resource.key();
        let mut st = self.lock();
        if st.objects.contains_key(&key) {
            return Err(anyhow!("{} already exists", key));
        }
        let mut stored = resource.clone();
        stored.status = None;
        st.objects.insert(key.clone(), stored);
        st.creates.push(key);
        Ok(())
    }

    async fn delete(&self, key: &ResourceKey) -> Result<()> {
        let mut st = self.lock();
        if st.objects.remove(key).is_none() {
            return Err(anyhow!("{} not found", key));
        }
        st.deletes.push(key.clone());
        Ok(())
    }

    async fn list(&self, api_version: &str, kind: &str, namespace: Option<&str>, selector: Option<&str>) -> Result<Vec<Resource>> {
        let terms = selector.map(parse_selector).unwrap_or_default();
        Ok(self
            .lock()
            .objects
            .values()
            .filter(|r| r.api_version == api_version && r.kind == kind)
            .filter(|r| namespace.map_or(true, |ns| r.namespace() == Some(ns)))
            .filter(|r| terms.iter().all(|(k, v)| r.label(k) == Some(*v)))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ClusterIdentity for MemoryStore {
    async fn cluster_id(&self) -> Result<String> {
        Ok(self.cluster_id.clone())
    }
}

#[async_trait]
impl TypeRegistry for MemoryStore {
    async fn type_exists(&self, api_version: &str, kind: &str) -> Result<bool> {
        Ok(self.lock().types.contains(&(api_version.to_string(), kind.to_string())))
    }
}

#[async_trait]
impl NamespaceChecker for MemoryStore {
    async fn namespace_exists(&self, name: &str) -> Result<bool> {
        Ok(self.lock().namespaces.contains(name))
    }
}
