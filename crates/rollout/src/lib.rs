//! Rollwave rollout: drives velero Backup/Restore objects through ordered waves.
//!
//! A pass is one async call: group the desired objects into waves, reconcile the
//! first wave that is not fully completed, and hand back a [`RolloutStatus`] whose
//! `requeue_after` tells the caller's scheduler when to run the next pass.

#![forbid(unsafe_code)]

use std::time::Duration;

use serde::{Deserialize, Serialize};

mod aggregate;
mod oadp;
mod phases;
mod reconcile;
mod workload;

pub use aggregate::aggregate;
pub use oadp::{credential_secrets, export_oadp_to_dir, OadpExport, DEFAULT_STORAGE_SECRET, DPA_API_VERSION, DPA_KIND};
pub use phases::PhaseTable;
pub use reconcile::{ReCreationPolicy, WaveReconciler};
pub use workload::{export_restores_to_dir, extract_workloads, WorkloadKind, VELERO_API_VERSION};

pub use rollwave_core::{ResourcePhase, RolloutStatus, WaveDecision, WaveOutcome};

fn env_secs(name: &str, default: u64) -> u64 {
    std::env::var(name).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

/// Requeue delays handed back with non-terminal decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutConfig {
    pub short_requeue: Duration,
    pub long_requeue: Duration,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self { short_requeue: Duration::from_secs(2), long_requeue: Duration::from_secs(60) }
    }
}

impl RolloutConfig {
    /// `ROLLWAVE_SHORT_REQUEUE_SECS` / `ROLLWAVE_LONG_REQUEUE_SECS` over the defaults.
    pub fn from_env() -> Self {
        Self {
            short_requeue: Duration::from_secs(env_secs("ROLLWAVE_SHORT_REQUEUE_SECS", 2)),
            long_requeue: Duration::from_secs(env_secs("ROLLWAVE_LONG_REQUEUE_SECS", 60)),
        }
    }
}
