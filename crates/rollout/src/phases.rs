//! Observed status -> [`ResourcePhase`] classification table.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use rollwave_core::ResourcePhase;
use serde_json::Value as Json;
use tracing::warn;

static VELERO: Lazy<Arc<PhaseTable>> = Lazy::new(|| {
    let mut table = PhaseTable::new(ResourcePhase::InProgress)
        .with("Completed", ResourcePhase::Completed)
        .with("Failed", ResourcePhase::Failed)
        .with("PartiallyFailed", ResourcePhase::Failed)
        .with("FailedValidation", ResourcePhase::FailedValidation);
    if let Ok(raw) = std::env::var("ROLLWAVE_PHASE_OVERRIDES") {
        table.apply_overrides(&raw);
    }
    Arc::new(table)
});

/// Maps the backend's `status.phase` strings onto resource phases.
///
/// A missing status or empty phase is always [`ResourcePhase::Pending`]; unknown
/// strings fall back to the table's default.
#[derive(Debug, Clone)]
pub struct PhaseTable {
    entries: HashMap<String, ResourcePhase>,
    fallback: ResourcePhase,
}

impl PhaseTable {
    pub fn new(fallback: ResourcePhase) -> Self {
        Self { entries: HashMap::new(), fallback }
    }

    pub fn with(mut self, status: &str, phase: ResourcePhase) -> Self {
        self.entries.insert(status.to_string(), phase);
        self
    }

    /// Table for velero Backup/Restore objects, plus `ROLLWAVE_PHASE_OVERRIDES`
    /// (`Status=Phase,...`) read once per process.
    pub fn velero() -> Arc<PhaseTable> {
        VELERO.clone()
    }

    fn apply_overrides(&mut self, raw: &str) {
        for term in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let parsed = term
                .split_once('=')
                .and_then(|(status, phase)| phase.trim().parse::<ResourcePhase>().ok().map(|p| (status.trim(), p)));
            match parsed {
                Some((status, phase)) if !status.is_empty() => {
                    self.entries.insert(status.to_string(), phase);
                }
                _ => warn!(term = %term, "ignoring malformed phase override"),
            }
        }
    }

    pub fn classify_phase(&self, phase: &str) -> ResourcePhase {
        if phase.is_empty() {
            return ResourcePhase::Pending;
        }
        self.entries.get(phase).copied().unwrap_or(self.fallback)
    }

    /// Classify a whole observed `status` object.
    pub fn classify(&self, status: Option<&Json>) -> ResourcePhase {
        let phase = status.and_then(|s| s.get("phase")).and_then(|p| p.as_str()).unwrap_or("");
        self.classify_phase(phase)
    }
}
