//! Cluster-readiness checks for a batch of manifests.
//!
//! Hard errors (decode failures, disallowed kinds, empty names) are collected
//! across the whole batch and returned together. Missing CRDs and namespaces
//! that are neither on the cluster nor created earlier in the batch only warn.

use std::collections::{BTreeSet, HashSet};

use anyhow::Result;
use metrics::counter;
use rollwave_core::{Error, ValidationOutcome, Wave};
use rollwave_kubehub::{cancellable, Cluster};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::Manifest;

const DEFAULT_ALLOWED_KINDS: &[&str] = &[
    "Namespace",
    "ConfigMap",
    "Secret",
    "SriovNetwork",
    "SriovNetworkNodePolicy",
    "SriovOperatorConfig",
    "PerformanceProfile",
    "Tuned",
    "KubeletConfig",
    "ContainerRuntimeConfig",
    "ClusterLogForwarder",
    "StorageClass",
    "LocalVolume",
    "LVMCluster",
    "CatalogSource",
];

const BUILTIN_GROUPS: &[&str] = &["apps", "batch", "policy", "autoscaling"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorConfig {
    pub allowed_kinds: BTreeSet<String>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self { allowed_kinds: DEFAULT_ALLOWED_KINDS.iter().map(|s| s.to_string()).collect() }
    }
}

impl ValidatorConfig {
    /// Defaults plus `ROLLWAVE_EXTRA_ALLOWED_KINDS` (comma separated).
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(extra) = std::env::var("ROLLWAVE_EXTRA_ALLOWED_KINDS") {
            cfg.allowed_kinds.extend(extra.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from));
        }
        cfg
    }
}

/// Whether objects of `api_version` are served by a CRD rather than the API server itself.
pub fn needs_defining_type(api_version: &str) -> bool {
    match api_version.split_once('/') {
        None => false,
        Some((group, _)) => !(group.is_empty() || group.ends_with(".k8s.io") || BUILTIN_GROUPS.contains(&group)),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// Warnings joined with `"; "`, or `None` when clean.
    pub fn warning_text(&self) -> Option<String> {
        if self.warnings.is_empty() { None } else { Some(self.warnings.join("; ")) }
    }
}

pub struct ClusterReadinessValidator {
    cluster: Cluster,
    config: ValidatorConfig,
}

impl ClusterReadinessValidator {
    pub fn new(cluster: Cluster, config: ValidatorConfig) -> Self {
        Self { cluster, config }
    }

    /// Check one manifest. `introduced` holds namespaces created earlier in the batch.
    pub async fn check(&self, manifest: &Manifest, introduced: &HashSet<String>, cancel: &CancellationToken) -> Result<ValidationOutcome> {
        if manifest.name().is_empty() {
            return Ok(ValidationOutcome::Rejected(format!("{} resource name is empty", manifest.kind())));
        }
        if !self.config.allowed_kinds.contains(manifest.kind()) {
            return Ok(ValidationOutcome::Rejected(format!("{} is not an allowed kind", manifest)));
        }
        let mut warnings = Vec::new();
        if needs_defining_type(manifest.api_version()) {
            let exists = cancellable(cancel, self.cluster.types.type_exists(manifest.api_version(), manifest.kind())).await?;
            if !exists {
                warnings.push(format!("{} - CRD not deployed on cluster", manifest));
            }
        }
        if let Some(ns) = manifest.namespace() {
            if !introduced.contains(ns) && !cancellable(cancel, self.cluster.namespaces.namespace_exists(ns)).await? {
                warnings.push(format!(
                    "{} - namespace {} not found on cluster or not introduced earlier in the batch",
                    manifest, ns
                ));
            }
        }
        if warnings.is_empty() {
            Ok(ValidationOutcome::Accepted)
        } else {
            Ok(ValidationOutcome::Warned(warnings))
        }
    }

    /// Validate `waves` in order. `decode_errors` lead the combined error list.
    pub async fn validate(&self, waves: &[Wave<Manifest>], decode_errors: Vec<String>, cancel: &CancellationToken) -> Result<ValidationReport> {
        let mut errors = decode_errors;
        let mut report = ValidationReport::default();
        let mut introduced = HashSet::new();
        for manifest in waves.iter().flat_map(|w| w.items.iter()) {
            match self.check(manifest, &introduced, cancel).await? {
                ValidationOutcome::Accepted => debug!(manifest = %manifest, "accepted"),
                ValidationOutcome::Warned(ws) => {
                    for w in ws {
                        counter!("manifest_warned_total", 1u64);
                        warn!(origin = %manifest.origin, "{}", w);
                        report.warnings.push(w);
                    }
                }
                ValidationOutcome::Rejected(e) => {
                    counter!("manifest_rejected_total", 1u64);
                    errors.push(e);
                    continue;
                }
            }
            if manifest.kind() == "Namespace" {
                introduced.insert(manifest.name().to_string());
            }
        }
        if !errors.is_empty() {
            return Err(Error::InvalidManifests(errors).into());
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollwave_core::group_into_waves;
    use rollwave_kubehub::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    fn m(api_version: &str, kind: &str, name: &str, ns: Option<&str>, wave: &str) -> Manifest {
        let mut obj = json!({
            "apiVersion": api_version, "kind": kind,
            "metadata": {"name": name, "annotations": {rollwave_core::APPLY_WAVE_ANNOTATION: wave}}
        });
        if let Some(ns) = ns {
            obj["metadata"]["namespace"] = json!(ns);
        }
        Manifest::new(format!("{name}.yaml in the configMap cm"), obj)
    }

    fn validator(store: &Arc<MemoryStore>) -> ClusterReadinessValidator {
        ClusterReadinessValidator::new(Cluster::from_memory(store.clone()), ValidatorConfig::default())
    }

    #[test]
    fn builtin_groups_need_no_crd() {
        assert!(!needs_defining_type("v1"));
        assert!(!needs_defining_type("apps/v1"));
        assert!(!needs_defining_type("storage.k8s.io/v1"));
        assert!(needs_defining_type("sriovnetwork.openshift.io/v1"));
        assert!(needs_defining_type("policy.open-cluster-management.io/v1"));
    }

    #[tokio::test]
    async fn hard_errors_are_joined_after_decode_errors() {
        let store = Arc::new(MemoryStore::new("cid"));
        let waves = group_into_waves(vec![
            m("machineconfiguration.openshift.io/v1", "MachineConfig", "generic", None, "1"),
            m("sriovnetwork.openshift.io/v1", "SriovNetwork", "", Some("x"), "2"),
        ])
        .unwrap();
        let err = validator(&store)
            .validate(&waves, vec!["failed to decode a.yaml in the configMap cm: boom".into()], &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to decode a.yaml in the configMap cm: boom; MachineConfig[generic] is not an allowed kind; SriovNetwork resource name is empty"
        );
    }

    #[tokio::test]
    async fn missing_crd_and_namespace_only_warn() {
        let store = Arc::new(MemoryStore::new("cid"));
        store.register_type("sriovnetwork.openshift.io/v1", "SriovNetwork");
        store.add_namespace("openshift-sriov-network-operator");
        let waves = group_into_waves(vec![
            m("sriovnetwork.openshift.io/v1", "SriovNetworkNodePolicy", "sriov-nnp-mh", Some("openshift-sriov-network-operator"), "1"),
            m("sriovnetwork.openshift.io/v1", "SriovNetwork", "sriov-nw-mh", Some("openshift-sriov-network-operator"), "1"),
            m("sriovnetwork.openshift.io/v1", "SriovNetwork", "sriov-nw-fh", Some("sriov-test"), "10"),
        ])
        .unwrap();
        let report = validator(&store).validate(&waves, vec![], &CancellationToken::new()).await.unwrap();
        assert_eq!(
            report.warning_text().unwrap(),
            "SriovNetworkNodePolicy[sriov-nnp-mh] - CRD not deployed on cluster; \
             SriovNetwork[sriov-nw-fh] - namespace sriov-test not found on cluster or not introduced earlier in the batch"
        );
    }

    #[tokio::test]
    async fn missing_crd_does_not_hide_unknown_namespace() {
        let store = Arc::new(MemoryStore::new("cid"));
        let policy = m("sriovnetwork.openshift.io/v1", "SriovNetworkNodePolicy", "nnp", Some("sriov-test"), "1");
        let outcome = validator(&store).check(&policy, &HashSet::new(), &CancellationToken::new()).await.unwrap();
        assert_eq!(
            outcome,
            ValidationOutcome::Warned(vec![
                "SriovNetworkNodePolicy[nnp] - CRD not deployed on cluster".to_string(),
                "SriovNetworkNodePolicy[nnp] - namespace sriov-test not found on cluster or not introduced earlier in the batch".to_string(),
            ])
        );
        let report = validator(&store).validate(&group_into_waves(vec![policy]).unwrap(), vec![], &CancellationToken::new()).await.unwrap();
        assert_eq!(report.warnings.len(), 2);
    }

    #[tokio::test]
    async fn namespace_introduced_in_earlier_wave_is_accepted() {
        let store = Arc::new(MemoryStore::new("cid"));
        store.register_type("sriovnetwork.openshift.io/v1", "SriovNetwork");
        let ns = m("v1", "Namespace", "sriov-test", None, "1");
        let net = m("sriovnetwork.openshift.io/v1", "SriovNetwork", "nw", Some("sriov-test"), "2");

        let ordered = group_into_waves(vec![net.clone(), ns.clone()]).unwrap();
        let report = validator(&store).validate(&ordered, vec![], &CancellationToken::new()).await.unwrap();
        assert!(report.warning_text().is_none());

        // namespace arriving later does not count
        let late = m("v1", "Namespace", "sriov-test", None, "3");
        let reversed = group_into_waves(vec![net, late]).unwrap();
        let report = validator(&store).validate(&reversed, vec![], &CancellationToken::new()).await.unwrap();
        assert_eq!(report.warnings.len(), 1);
    }
}
