use chrono::NaiveDateTime;
use resources::objects::{
    metrics::{MetricSample, MILLI_SCALE},
    scaling_intent::{FallbackBehavior, FallbackPolicy, MetricType},
};

/// Decides the replica count to use when the Scalers Cache has reported
/// enough consecutive metric failures to cross `failureThreshold` (§4.5).
/// `policy.replicas` is the "replicas" operand named in every one of the
/// four behaviours; `current_replicas` is read fresh from the workload,
/// never cached, matching the Scaling Executor's "treat the orchestrator
/// API as the source of truth" rule.
pub fn fallback_replicas(policy: &FallbackPolicy, current_replicas: u32) -> u32 {
    match policy.behavior {
        FallbackBehavior::Static => policy.replicas,
        FallbackBehavior::CurrentReplicas => current_replicas,
        FallbackBehavior::CurrentReplicasIfHigher => current_replicas.max(policy.replicas),
        FallbackBehavior::CurrentReplicasIfLower => current_replicas.min(policy.replicas),
    }
}

/// Whether accumulated metric failures for one trigger should trigger
/// fallback this tick.
pub fn should_fall_back(policy: &FallbackPolicy, consecutive_failures: u32) -> bool {
    consecutive_failures >= policy.failure_threshold
}

/// A trigger's metric-type (or its scaling-modifier's, when a modifier is
/// in play) must be `AverageValue` for fallback to apply at all — resource
/// triggers and `Value`/`Utilization` triggers always re-raise their
/// underlying error instead (§4.5 step 1, §3 invariant 3).
pub fn is_eligible(metric_type: MetricType) -> bool {
    metric_type == MetricType::AverageValue
}

/// The full Fallback Engine contract wrapping one failed `getMetrics` call
/// (§4.5): re-raises when ineligible or still under threshold, otherwise
/// synthesizes a milli-unit sample from the configured behaviour. Returns
/// `None` when the caller should propagate the original Scaler error
/// unchanged.
pub fn synthesize(
    policy: &FallbackPolicy,
    metric_type: MetricType,
    consecutive_failures: u32,
    current_replicas: u32,
    trigger_target: i64,
    metric_name: &str,
    now: NaiveDateTime,
) -> Option<MetricSample> {
    if !is_eligible(metric_type) {
        return None;
    }
    if !should_fall_back(policy, consecutive_failures) {
        return None;
    }
    let replicas = fallback_replicas(policy, current_replicas);
    let value = replicas as i64 * trigger_target * MILLI_SCALE;
    Some(MetricSample::new(metric_name, value, now))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(behavior: FallbackBehavior) -> FallbackPolicy {
        FallbackPolicy {
            failure_threshold: 3,
            replicas: 10,
            behavior,
        }
    }

    #[test]
    fn static_behavior_ignores_current_replicas() {
        assert_eq!(fallback_replicas(&policy(FallbackBehavior::Static), 2), 10);
    }

    #[test]
    fn current_replicas_if_higher_takes_the_max() {
        let p = policy(FallbackBehavior::CurrentReplicasIfHigher);
        assert_eq!(fallback_replicas(&p, 4), 10);
        assert_eq!(fallback_replicas(&p, 20), 20);
    }

    #[test]
    fn current_replicas_if_lower_takes_the_min() {
        let p = policy(FallbackBehavior::CurrentReplicasIfLower);
        assert_eq!(fallback_replicas(&p, 4), 4);
        assert_eq!(fallback_replicas(&p, 20), 10);
    }

    #[test]
    fn fires_only_once_threshold_is_reached() {
        let p = policy(FallbackBehavior::Static);
        assert!(!should_fall_back(&p, 2));
        assert!(should_fall_back(&p, 3));
    }

    #[test]
    fn ineligible_metric_type_never_synthesizes() {
        let p = policy(FallbackBehavior::Static);
        let result = synthesize(
            &p,
            MetricType::Value,
            5,
            4,
            10,
            "s0-x",
            chrono::Utc::now().naive_utc(),
        );
        assert!(result.is_none());
    }

    #[test]
    fn below_threshold_does_not_synthesize() {
        let p = policy(FallbackBehavior::Static);
        let result = synthesize(
            &p,
            MetricType::AverageValue,
            2,
            4,
            10,
            "s0-x",
            chrono::Utc::now().naive_utc(),
        );
        assert!(result.is_none());
    }

    /// §8 scenario 3: threshold=3, replicas=10, behavior=currentReplicasIfHigher,
    /// target=10, current replicas=4. After three failures the synthetic
    /// sample is `10 * 10 * 1000 = 100_000` milli-units.
    #[test]
    fn scenario_current_replicas_if_higher_synthetic_value() {
        let p = FallbackPolicy {
            failure_threshold: 3,
            replicas: 10,
            behavior: FallbackBehavior::CurrentReplicasIfHigher,
        };
        let sample = synthesize(
            &p,
            MetricType::AverageValue,
            3,
            4,
            10,
            "s0-queue",
            chrono::Utc::now().naive_utc(),
        )
        .unwrap();
        assert_eq!(sample.value, 100_000);
    }
}
