//! Rollwave core types: resources, phases, decisions and the shared wave primitive.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

mod error;
mod phase;
pub mod version;
pub mod wave;
pub mod yaml;

pub use error::{Error, Result};
pub use phase::{ResourcePhase, RolloutStatus, ValidationOutcome, WaveDecision, WaveOutcome};
pub use wave::{group_into_waves, parse_wave_tag, Prioritized, Wave};

/// Annotation carrying the integer wave of a resource or manifest.
pub const APPLY_WAVE_ANNOTATION: &str = "rollwave.io/apply-wave";
/// Wave assigned when the annotation is missing or empty.
pub const DEFAULT_APPLY_WAVE: i64 = 100;
/// Label stamped on every resource this engine creates.
pub const CLUSTER_ID_LABEL: &str = "rollwave.io/cluster-id";
/// Label listing the target versions a manifest applies to (comma separated).
pub const TARGET_VERSION_LABEL: &str = "rollwave.io/target-version";
/// Annotation telling downstream appliers how to apply an exported manifest.
pub const APPLY_TYPE_ANNOTATION: &str = "rollwave.io/apply-type";
pub const APPLY_TYPE_MERGE: &str = "merge";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Declarative object as seen by the engine.
///
/// `spec` is the desired state compared by the re-creation policy, `status` is
/// whatever the backend last observed. Any other top-level field (for example a
/// ConfigMap's `data`) is kept in `rest` so objects round-trip untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Json::is_null")]
    pub spec: Json,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Json>,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, Json>,
}

impl Resource {
    pub fn new(api_version: &str, kind: &str, name: &str, namespace: Option<&str>) -> Self {
        Self {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            metadata: Metadata {
                name: name.to_string(),
                namespace: namespace.map(|s| s.to_string()),
                ..Default::default()
            },
            spec: Json::Null,
            status: None,
            rest: serde_json::Map::new(),
        }
    }

    pub fn with_spec(mut self, spec: Json) -> Self {
        self.spec = spec;
        self
    }

    pub fn with_status(mut self, status: Json) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_annotation(mut self, key: &str, value: &str) -> Self {
        self.metadata.annotations.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.metadata.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn name(&self) -> &str { &self.metadata.name }
    pub fn namespace(&self) -> Option<&str> { self.metadata.namespace.as_deref() }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata.annotations.get(key).map(|s| s.as_str())
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.metadata.labels.get(key).map(|s| s.as_str())
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            name: self.metadata.name.clone(),
            namespace: self.metadata.namespace.clone(),
        }
    }

    pub fn from_json(value: Json) -> anyhow::Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

/// Identity of a resource: kind, name and namespace, plus the apiVersion used to address it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
}

impl ResourceKey {
    pub fn new(api_version: &str, kind: &str, name: &str, namespace: Option<&str>) -> Self {
        Self {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            namespace: namespace.map(|s| s.to_string()),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}[{}/{}]", self.kind, ns, self.name),
            None => write!(f, "{}[{}]", self.kind, self.name),
        }
    }
}

/// Reference to a ConfigMap holding workload or manifest documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigMapRef {
    pub name: String,
    pub namespace: String,
}

impl ConfigMapRef {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self { name: name.to_string(), namespace: namespace.to_string() }
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new("v1", "ConfigMap", &self.name, Some(&self.namespace))
    }
}

impl FromStr for ConfigMapRef {
    type Err = Error;

    /// Parses `namespace/name`.
    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self::new(ns, name))
            }
            _ => Err(Error::Parse { what: "configmap reference", input: s.to_string(), expected: "namespace/name" }),
        }
    }
}

impl fmt::Display for ConfigMapRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

pub mod prelude {
    pub use super::{
        group_into_waves, ConfigMapRef, Error, Prioritized, Resource, ResourceKey, ResourcePhase, RolloutStatus,
        ValidationOutcome, Wave, WaveDecision, WaveOutcome,
    };
}
