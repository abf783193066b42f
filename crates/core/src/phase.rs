use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Progress classification of a single resource, derived fresh every pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourcePhase {
    Pending,
    InProgress,
    Completed,
    Failed,
    FailedValidation,
}

impl ResourcePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourcePhase::Pending => "Pending",
            ResourcePhase::InProgress => "InProgress",
            ResourcePhase::Completed => "Completed",
            ResourcePhase::Failed => "Failed",
            ResourcePhase::FailedValidation => "FailedValidation",
        }
    }
}

impl fmt::Display for ResourcePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourcePhase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "Pending" => Ok(ResourcePhase::Pending),
            "InProgress" => Ok(ResourcePhase::InProgress),
            "Completed" => Ok(ResourcePhase::Completed),
            "Failed" => Ok(ResourcePhase::Failed),
            "FailedValidation" => Ok(ResourcePhase::FailedValidation),
            other => Err(Error::Parse {
                what: "resource phase",
                input: other.to_string(),
                expected: "Pending, InProgress, Completed, Failed or FailedValidation",
            }),
        }
    }
}

/// Aggregated outcome of one wave. Names are listed in wave order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaveOutcome {
    AllCompleted,
    HasFailed(Vec<String>),
    HasInProgress(Vec<String>),
    HasFailedValidation(Vec<String>),
    AllPending(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveDecision {
    pub outcome: WaveOutcome,
    /// `None` means either advance to the next wave or stop for good.
    pub requeue_after: Option<Duration>,
}

/// Decision record handed back to the scheduler after a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutStatus {
    pub phase: ResourcePhase,
    pub message: String,
    pub requeue_after: Option<Duration>,
}

impl RolloutStatus {
    pub fn new(phase: ResourcePhase, message: impl Into<String>, requeue_after: Option<Duration>) -> Self {
        Self { phase, message: message.into(), requeue_after }
    }

    pub fn is_terminal(&self) -> bool {
        self.requeue_after.is_none()
    }
}

/// Result of checking one manifest against the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationOutcome {
    Accepted,
    Rejected(String),
    /// Advisory only; one entry per problem found.
    Warned(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_names_round_trip() {
        for p in [
            ResourcePhase::Pending,
            ResourcePhase::InProgress,
            ResourcePhase::Completed,
            ResourcePhase::Failed,
            ResourcePhase::FailedValidation,
        ] {
            assert_eq!(p.as_str().parse::<ResourcePhase>().unwrap(), p);
        }
        let err = "Done".parse::<ResourcePhase>().unwrap_err();
        assert!(matches!(err, Error::Parse { what: "resource phase", .. }), "{err}");
        assert!(!Error::is_not_found(&err.into()));
    }
}
