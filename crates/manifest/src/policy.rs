//! Manifests embedded in governance policies.
//!
//! Each `spec.policy-templates[].objectDefinition.spec.object-templates[].objectDefinition`
//! becomes one manifest whose enclosing group is the policy itself.

use std::sync::Arc;

use anyhow::{Context, Result};
use rollwave_core::{yaml::require_type_meta, Resource};
use rollwave_kubehub::{cancellable, ResourceStore};
use serde_json::Value as Json;
use tokio_util::sync::CancellationToken;

use crate::{EnclosingGroup, Manifest};

/// Which policies to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyQuery {
    pub api_version: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub selector: Option<String>,
}

impl Default for PolicyQuery {
    fn default() -> Self {
        Self {
            api_version: "policy.open-cluster-management.io/v1".to_string(),
            kind: "Policy".to_string(),
            namespace: None,
            selector: None,
        }
    }
}

impl PolicyQuery {
    pub async fn list(&self, store: &dyn ResourceStore, cancel: &CancellationToken) -> Result<Vec<Resource>> {
        let fut = store.list(&self.api_version, &self.kind, self.namespace.as_deref(), self.selector.as_deref());
        cancellable(cancel, fut).await.with_context(|| format!("listing {} objects", self.kind))
    }
}

fn array_at<'a>(v: &'a Json, key: &str) -> &'a [Json] {
    v.get(key).and_then(|a| a.as_array()).map(|a| a.as_slice()).unwrap_or_default()
}

/// Pull the object templates out of every policy.
pub fn extract_policy_manifests(policies: &[Resource]) -> (Vec<Manifest>, Vec<String>) {
    let mut manifests = Vec::new();
    let mut errors = Vec::new();
    for policy in policies {
        let group = Arc::new(EnclosingGroup {
            name: policy.name().to_string(),
            labels: policy.metadata.labels.clone(),
            annotations: policy.metadata.annotations.clone(),
        });
        let mut idx = 0usize;
        for template in array_at(&policy.spec, "policy-templates") {
            let Some(spec) = template.get("objectDefinition").and_then(|d| d.get("spec")) else { continue };
            for object_template in array_at(spec, "object-templates") {
                idx += 1;
                let origin = format!("object-template {} in the policy {}", idx, policy.name());
                let Some(def) = object_template.get("objectDefinition") else {
                    errors.push(format!("failed to decode {}: missing objectDefinition", origin));
                    continue;
                };
                if let Err(e) = require_type_meta(def) {
                    errors.push(format!("failed to decode {}: {}", origin, e));
                    continue;
                }
                manifests.push(Manifest::new(origin, def.clone()).in_group(group.clone()));
            }
        }
    }
    (manifests, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_templates_are_extracted_with_policy_group() {
        let policy = Resource::new("policy.open-cluster-management.io/v1", "Policy", "ztp-common.p1", Some("spoke"))
            .with_label("rollwave.io/target-version", "4.16.1")
            .with_spec(json!({
                "policy-templates": [
                    {"objectDefinition": {"kind": "ConfigurationPolicy", "spec": {"object-templates": [
                        {"complianceType": "musthave", "objectDefinition": {
                            "apiVersion": "operators.coreos.com/v1alpha1", "kind": "CatalogSource",
                            "metadata": {"name": "redhat-operators-new", "namespace": "openshift-marketplace"}
                        }},
                        {"complianceType": "musthave", "objectDefinition": {"metadata": {"name": "broken"}}}
                    ]}}},
                    {"objectDefinition": {"kind": "CertificatePolicy"}}
                ]
            }));
        let (manifests, errors) = extract_policy_manifests(&[policy]);
        assert_eq!(manifests.len(), 1);
        assert_eq!(manifests[0].to_string(), "CatalogSource[redhat-operators-new]");
        assert_eq!(manifests[0].group.as_ref().unwrap().name, "ztp-common.p1");
        assert_eq!(errors, vec!["failed to decode object-template 2 in the policy ztp-common.p1: document missing apiVersion"]);
    }
}
