//! Rollwave manifest: select, validate and export extra manifests by wave.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use rollwave_core::{Prioritized, APPLY_WAVE_ANNOTATION};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

mod pipeline;
mod policy;
mod select;
mod source;
mod validate;
mod writer;

pub use pipeline::{is_invalid_manifests, ExportSummary, ManifestPipeline};
pub use policy::{extract_policy_manifests, PolicyQuery};
pub use select::ManifestSelector;
pub use source::{decode_sources, sources_from_config_maps, ManifestSource};
pub use validate::{needs_defining_type, ClusterReadinessValidator, ValidationReport, ValidatorConfig};
pub use writer::{ManifestCategory, ManifestWriter};

/// Labels and annotations of the object a manifest was extracted from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnclosingGroup {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

/// One decoded manifest document plus where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    /// e.g. `sriov.yaml in the configMap extra-cm`
    pub origin: String,
    pub object: Json,
    pub group: Option<Arc<EnclosingGroup>>,
}

fn str_at<'a>(v: &'a Json, path: &[&str]) -> Option<&'a str> {
    path.iter().try_fold(v, |cur, k| cur.get(*k)).and_then(|v| v.as_str())
}

impl Manifest {
    pub fn new(origin: impl Into<String>, object: Json) -> Self {
        Self { origin: origin.into(), object, group: None }
    }

    pub fn in_group(mut self, group: Arc<EnclosingGroup>) -> Self {
        self.group = Some(group);
        self
    }

    pub fn api_version(&self) -> &str { str_at(&self.object, &["apiVersion"]).unwrap_or_default() }
    pub fn kind(&self) -> &str { str_at(&self.object, &["kind"]).unwrap_or_default() }
    pub fn name(&self) -> &str { str_at(&self.object, &["metadata", "name"]).unwrap_or_default() }

    pub fn namespace(&self) -> Option<&str> {
        str_at(&self.object, &["metadata", "namespace"]).filter(|s| !s.is_empty())
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        str_at(&self.object, &["metadata", "labels", key])
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        str_at(&self.object, &["metadata", "annotations", key])
    }
}

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind(), self.name())
    }
}

impl Prioritized for Manifest {
    /// Own annotation first, then the enclosing group's.
    fn wave_tag(&self) -> Option<&str> {
        self.annotation(APPLY_WAVE_ANNOTATION)
            .or_else(|| self.group.as_ref().and_then(|g| g.annotations.get(APPLY_WAVE_ANNOTATION)).map(|s| s.as_str()))
    }

    fn sort_name(&self) -> &str { self.name() }
}
