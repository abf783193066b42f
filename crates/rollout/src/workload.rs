//! Backup and restore passes fed from ConfigMaps, and restore export.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use rollwave_core::{group_into_waves, yaml::decode_documents, ConfigMapRef, Error, Resource, ResourcePhase, RolloutStatus, WaveOutcome};
use rollwave_kubehub::{get_config_maps, ResourceStore};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::WaveReconciler;

pub const VELERO_API_VERSION: &str = "velero.io/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkloadKind {
    Backup,
    Restore,
}

impl WorkloadKind {
    pub fn api_version(&self) -> &'static str { VELERO_API_VERSION }

    pub fn kind(&self) -> &'static str {
        match self {
            WorkloadKind::Backup => "Backup",
            WorkloadKind::Restore => "Restore",
        }
    }

    pub fn plural(&self) -> &'static str {
        match self {
            WorkloadKind::Backup => "backups",
            WorkloadKind::Restore => "restores",
        }
    }

    pub fn phase_of(&self, outcome: &WaveOutcome) -> ResourcePhase {
        match outcome {
            WaveOutcome::AllCompleted => ResourcePhase::Completed,
            WaveOutcome::HasFailed(_) => ResourcePhase::Failed,
            WaveOutcome::HasInProgress(_) => ResourcePhase::InProgress,
            WaveOutcome::HasFailedValidation(_) => ResourcePhase::FailedValidation,
            WaveOutcome::AllPending(_) => ResourcePhase::Pending,
        }
    }

    /// Human status line for a wave outcome.
    pub fn message(&self, outcome: &WaveOutcome) -> String {
        let p = self.plural();
        match outcome {
            WaveOutcome::AllCompleted => format!("All {} have completed", p),
            WaveOutcome::HasFailed(n) => format!("Failed {}: {}", p, n.join(",")),
            WaveOutcome::HasInProgress(n) => format!("Inprogress {}: {}", p, n.join(",")),
            WaveOutcome::HasFailedValidation(n) => {
                format!("Failed validation {}: {}. Please update the invalid {}.", p, n.join(","), p)
            }
            WaveOutcome::AllPending(n) => {
                format!("Pending {}: {}. Wait for object storage backend to be available.", p, n.join(","))
            }
        }
    }

    fn matches(&self, doc: &serde_json::Value) -> bool {
        doc.get("apiVersion").and_then(|v| v.as_str()) == Some(self.api_version())
            && doc.get("kind").and_then(|v| v.as_str()) == Some(self.kind())
    }
}

/// Pull every object of `kind` out of the ConfigMaps' `data` values.
///
/// Each value may hold several `---` separated documents; other kinds are ignored.
pub fn extract_workloads(config_maps: &[Resource], kind: WorkloadKind) -> Result<Vec<Resource>> {
    let mut out = Vec::new();
    for cm in config_maps {
        let Some(data) = cm.rest.get("data").and_then(|d| d.as_object()) else {
            warn!(configmap = %cm.name(), "configmap has no data");
            continue;
        };
        for (key, value) in data {
            let text = value.as_str().unwrap_or_default();
            let docs = decode_documents(text).with_context(|| format!("{} in the configMap {}", key, cm.name()))?;
            for doc in docs.into_iter().filter(|d| kind.matches(d)) {
                out.push(Resource::from_json(doc).with_context(|| format!("{} in the configMap {}", key, cm.name()))?);
            }
        }
    }
    Ok(out)
}

impl WaveReconciler {
    /// Full pass for backups or restores listed in `refs`.
    ///
    /// Missing input is reported as failed validation with a long requeue; any
    /// other store error propagates.
    pub async fn reconcile_workload(&self, kind: WorkloadKind, refs: &[ConfigMapRef], cancel: &CancellationToken) -> Result<RolloutStatus> {
        let long = Some(self.config().long_requeue);
        if refs.is_empty() {
            return Ok(RolloutStatus::new(ResourcePhase::FailedValidation, "No configmap is provided.", long));
        }
        let config_maps = match get_config_maps(self.cluster().store.as_ref(), refs, cancel).await {
            Ok(cms) => cms,
            Err(e) if Error::is_not_found(&e) => {
                return Ok(RolloutStatus::new(
                    ResourcePhase::FailedValidation,
                    format!("The configmap is not found: {:#}", e),
                    long,
                ));
            }
            Err(e) => return Err(e),
        };
        let workloads = extract_workloads(&config_maps, kind)?;
        info!(kind = kind.kind(), count = workloads.len(), "reconciling workloads");
        self.run_pass(kind, workloads, cancel).await
    }

    pub async fn reconcile_backups(&self, refs: &[ConfigMapRef], cancel: &CancellationToken) -> Result<RolloutStatus> {
        self.reconcile_workload(WorkloadKind::Backup, refs, cancel).await
    }

    pub async fn reconcile_restores(&self, refs: &[ConfigMapRef], cancel: &CancellationToken) -> Result<RolloutStatus> {
        self.reconcile_workload(WorkloadKind::Restore, refs, cancel).await
    }
}

/// Write restores as `<dir>/restores/restore<N>/restore<M>.yaml`, one directory
/// per wave, and return the namespace of the first restore.
pub async fn export_restores_to_dir(store: &dyn ResourceStore, refs: &[ConfigMapRef], dir: &Path, cancel: &CancellationToken) -> Result<String> {
    let config_maps = get_config_maps(store, refs, cancel).await?;
    let restores = extract_workloads(&config_maps, WorkloadKind::Restore)?;
    write_restore_waves(restores, dir)
}

fn write_restore_waves(restores: Vec<Resource>, dir: &Path) -> Result<String> {
    let waves = group_into_waves(restores)?;
    let first_ns = waves
        .first()
        .and_then(|w| w.items.first())
        .map(|r| r.namespace().unwrap_or_default().to_string())
        .ok_or_else(|| anyhow!("no restores found in the referenced configmaps"))?;
    for (i, wave) in waves.iter().enumerate() {
        let group = dir.join("restores").join(format!("restore{}", i + 1));
        fs::create_dir_all(&group).with_context(|| format!("creating {}", group.display()))?;
        for (j, restore) in wave.items.iter().enumerate() {
            let path = group.join(format!("restore{}.yaml", j + 1));
            let mut out = restore.clone();
            out.status = None;
            let text = serde_yaml::to_string(&out).context("serializing restore")?;
            fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
        }
    }
    info!(dir = %dir.display(), waves = waves.len(), "exported restores");
    Ok(first_ns)
}
