//! One-wave reconciliation and the pass loop that walks waves in order.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use metrics::{counter, histogram};
use rollwave_core::{group_into_waves, Resource, ResourcePhase, RolloutStatus, Wave, WaveOutcome, CLUSTER_ID_LABEL};
use rollwave_kubehub::{cancellable, Cluster};
use serde_json::Value as Json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{aggregate, PhaseTable, RolloutConfig, WorkloadKind};

/// Decides whether a resource stuck in failed validation must be resubmitted.
pub struct ReCreationPolicy;

impl ReCreationPolicy {
    /// Only `spec` is compared; status and metadata never trigger a re-creation.
    /// Null values and empty lists or maps count as absent, since the API
    /// server prunes them from stored objects.
    pub fn needs_recreate(existing: &Resource, desired: &Resource) -> bool {
        normalized(&existing.spec) != normalized(&desired.spec)
    }
}

/// `None` for values that carry nothing: null, `[]`, `{}`, or maps and lists
/// whose members all normalize away.
fn normalized(v: &Json) -> Option<Json> {
    match v {
        Json::Null => None,
        Json::Object(map) => {
            let kept: serde_json::Map<String, Json> =
                map.iter().filter_map(|(k, v)| normalized(v).map(|v| (k.clone(), v))).collect();
            (!kept.is_empty()).then_some(Json::Object(kept))
        }
        Json::Array(items) => {
            let kept: Vec<Json> = items.iter().map(|i| normalized(i).unwrap_or(Json::Null)).collect();
            (!kept.is_empty()).then_some(Json::Array(kept))
        }
        other => Some(other.clone()),
    }
}

/// Drives waves of workload resources against the cluster.
#[derive(Clone)]
pub struct WaveReconciler {
    cluster: Cluster,
    phases: Arc<PhaseTable>,
    config: RolloutConfig,
}

impl WaveReconciler {
    pub fn new(cluster: Cluster) -> Self {
        Self { cluster, phases: PhaseTable::velero(), config: RolloutConfig::from_env() }
    }

    pub fn with_phases(mut self, phases: Arc<PhaseTable>) -> Self {
        self.phases = phases;
        self
    }

    pub fn with_config(mut self, config: RolloutConfig) -> Self {
        self.config = config;
        self
    }

    pub fn cluster(&self) -> &Cluster { &self.cluster }
    pub fn config(&self) -> &RolloutConfig { &self.config }

    async fn create_labelled(&self, desired: &Resource, cancel: &CancellationToken) -> Result<()> {
        let cluster_id = cancellable(cancel, self.cluster.identity.cluster_id()).await.context("reading cluster id")?;
        let labelled = desired.clone().with_label(CLUSTER_ID_LABEL, &cluster_id);
        cancellable(cancel, self.cluster.store.create(&labelled)).await?;
        counter!("rollout_create_total", 1u64, "kind" => desired.kind.clone());
        info!(name = %desired.name(), namespace = ?desired.namespace(), kind = %desired.kind, "created");
        Ok(())
    }

    /// Create or observe every member of `wave`, in name order.
    ///
    /// Never-created resources are created and reported `InProgress`. Any store
    /// error ends the call; creates already issued stay in place.
    pub async fn reconcile_wave(&self, wave: &Wave<Resource>, cancel: &CancellationToken) -> Result<Vec<(String, ResourcePhase)>> {
        let mut results = Vec::with_capacity(wave.items.len());
        for desired in &wave.items {
            let key = desired.key();
            let existing = cancellable(cancel, self.cluster.store.get(&key)).await.with_context(|| format!("getting {}", key))?;
            let phase = match existing {
                None => {
                    self.create_labelled(desired, cancel).await.with_context(|| format!("creating {}", key))?;
                    ResourcePhase::InProgress
                }
                Some(existing) => match self.phases.classify(existing.status.as_ref()) {
                    ResourcePhase::FailedValidation if ReCreationPolicy::needs_recreate(&existing, desired) => {
                        info!(name = %desired.name(), "spec changed since failed validation; re-creating");
                        cancellable(cancel, self.cluster.store.delete(&key)).await.with_context(|| format!("deleting {}", key))?;
                        self.create_labelled(desired, cancel).await.with_context(|| format!("re-creating {}", key))?;
                        counter!("rollout_recreate_total", 1u64);
                        ResourcePhase::InProgress
                    }
                    phase => phase,
                },
            };
            debug!(name = %desired.name(), wave = wave.tag, phase = %phase, "observed");
            results.push((desired.name().to_string(), phase));
        }
        Ok(results)
    }

    /// One level-triggered pass: advance through completed waves and stop at the
    /// first one that still needs attention.
    pub async fn run_pass(&self, kind: WorkloadKind, resources: Vec<Resource>, cancel: &CancellationToken) -> Result<RolloutStatus> {
        let t0 = Instant::now();
        counter!("rollout_pass_total", 1u64, "kind" => kind.plural());
        let waves = group_into_waves(resources)?;
        let mut status = None;
        for wave in &waves {
            let results = self.reconcile_wave(wave, cancel).await?;
            let decision = aggregate(&results, &self.config);
            if decision.outcome == WaveOutcome::AllCompleted {
                debug!(wave = wave.tag, "wave completed");
                continue;
            }
            status = Some(RolloutStatus::new(kind.phase_of(&decision.outcome), kind.message(&decision.outcome), decision.requeue_after));
            break;
        }
        histogram!("rollout_pass_ms", t0.elapsed().as_secs_f64() * 1000.0);
        Ok(status.unwrap_or_else(|| {
            RolloutStatus::new(ResourcePhase::Completed, kind.message(&WaveOutcome::AllCompleted), None)
        }))
    }
}
