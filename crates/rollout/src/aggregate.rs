use rollwave_core::{ResourcePhase, WaveDecision, WaveOutcome};

use crate::RolloutConfig;

/// Fold one wave's per-resource phases into a single decision.
///
/// First match wins: all completed, any failed, any in progress, any failed
/// validation, otherwise pending. Names keep the order of `results`.
pub fn aggregate(results: &[(String, ResourcePhase)], config: &RolloutConfig) -> WaveDecision {
    let named = |want: ResourcePhase| -> Vec<String> {
        results.iter().filter(|(_, p)| *p == want).map(|(n, _)| n.clone()).collect()
    };

    if results.iter().all(|(_, p)| *p == ResourcePhase::Completed) {
        return WaveDecision { outcome: WaveOutcome::AllCompleted, requeue_after: None };
    }
    let failed = named(ResourcePhase::Failed);
    if !failed.is_empty() {
        return WaveDecision { outcome: WaveOutcome::HasFailed(failed), requeue_after: None };
    }
    let in_progress = named(ResourcePhase::InProgress);
    if !in_progress.is_empty() {
        return WaveDecision { outcome: WaveOutcome::HasInProgress(in_progress), requeue_after: Some(config.short_requeue) };
    }
    let invalid = named(ResourcePhase::FailedValidation);
    if !invalid.is_empty() {
        return WaveDecision { outcome: WaveOutcome::HasFailedValidation(invalid), requeue_after: Some(config.long_requeue) };
    }
    WaveDecision { outcome: WaveOutcome::AllPending(named(ResourcePhase::Pending)), requeue_after: Some(config.long_requeue) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use ResourcePhase::*;

    fn wave(items: &[(&str, ResourcePhase)]) -> Vec<(String, ResourcePhase)> {
        items.iter().map(|(n, p)| (n.to_string(), *p)).collect()
    }

    #[test]
    fn precedence_is_failed_then_progress_then_validation_then_pending() {
        let cfg = RolloutConfig::default();
        let d = aggregate(&wave(&[("a", Completed), ("b", Completed)]), &cfg);
        assert_eq!(d, WaveDecision { outcome: WaveOutcome::AllCompleted, requeue_after: None });

        let d = aggregate(&wave(&[("a", InProgress), ("b", Failed), ("c", Failed)]), &cfg);
        assert_eq!(d.outcome, WaveOutcome::HasFailed(vec!["b".into(), "c".into()]));
        assert_eq!(d.requeue_after, None);

        let d = aggregate(&wave(&[("a", FailedValidation), ("b", InProgress), ("c", Pending)]), &cfg);
        assert_eq!(d.outcome, WaveOutcome::HasInProgress(vec!["b".into()]));
        assert_eq!(d.requeue_after, Some(Duration::from_secs(2)));

        let d = aggregate(&wave(&[("a", FailedValidation), ("b", Completed), ("c", Pending)]), &cfg);
        assert_eq!(d.outcome, WaveOutcome::HasFailedValidation(vec!["a".into()]));
        assert_eq!(d.requeue_after, Some(Duration::from_secs(60)));

        let d = aggregate(&wave(&[("a", Completed), ("b", Pending)]), &cfg);
        assert_eq!(d.outcome, WaveOutcome::AllPending(vec!["b".into()]));
        assert_eq!(d.requeue_after, Some(Duration::from_secs(60)));
    }

    #[test]
    fn configured_delays_are_used() {
        let cfg = RolloutConfig { short_requeue: Duration::from_millis(5), long_requeue: Duration::from_secs(7) };
        assert_eq!(aggregate(&wave(&[("a", InProgress)]), &cfg).requeue_after, Some(Duration::from_millis(5)));
        assert_eq!(aggregate(&wave(&[("a", Pending)]), &cfg).requeue_after, Some(Duration::from_secs(7)));
    }
}
