use chrono::NaiveDateTime;
use resources::objects::scaling_intent::{
    ConditionStatus, ConditionType, MetricHealth, MetricHealthStatus, ScalingIntentStatus,
};

use crate::executor::{ExecutorDecision, ExecutorState};

/// Folds one reconcile tick's outcome into the Intent's status block, ready
/// for the single-PATCH write the Reconciler issues at the end of the loop
/// (§4.6 step 9). Takes the previous status by value and returns the next
/// one rather than mutating in place, so the Reconciler can diff the two
/// before deciding whether a status PATCH is even needed.
pub fn apply_tick<E: std::fmt::Display>(
    mut status: ScalingIntentStatus,
    executor: &ExecutorDecision,
    is_active: bool,
    child_autoscaler_name: String,
    external_metric_names: Vec<String>,
    metric_errors: &[(String, E)],
    fell_back: &[String],
    now: NaiveDateTime,
) -> ScalingIntentStatus {
    status.hpa_name = Some(child_autoscaler_name);
    status.external_metric_names = external_metric_names;

    // §4.4's cooldown is measured from the last tick any Trigger was
    // active, not from the last tick the workload was in an active state —
    // only advance it forward, never clear it, so the elapsed-since check
    // in `executor::decide` keeps working across the ticks it's inactive.
    if is_active {
        status.last_active_time = Some(now);
    }

    for (trigger_name, _) in metric_errors {
        let health = status
            .health
            .entry(trigger_name.clone())
            .or_insert(MetricHealth {
                number_of_failures: 0,
                status: MetricHealthStatus::Happy,
            });
        health.number_of_failures += 1;
        health.status = MetricHealthStatus::Failing;
    }
    for (name, health) in status.health.iter_mut() {
        if !metric_errors.iter().any(|(failed, _)| failed == name) {
            health.number_of_failures = 0;
            health.status = MetricHealthStatus::Happy;
        }
    }

    status.set_condition(
        ConditionType::Active,
        condition_status(executor.state != ExecutorState::Zero),
        format!("{:?}", executor.state),
        now,
    );
    status.set_condition(
        ConditionType::Paused,
        condition_status(matches!(
            executor.state,
            ExecutorState::PausedPinned | ExecutorState::PausedWithReplicas
        )),
        format!("{:?}", executor.state),
        now,
    );
    status.set_condition(
        ConditionType::Ready,
        condition_status(metric_errors.is_empty()),
        if metric_errors.is_empty() {
            "ScalerReady".to_string()
        } else {
            "ScalerError".to_string()
        },
        now,
    );
    status.set_condition(
        ConditionType::Fallback,
        condition_status(!fell_back.is_empty()),
        if fell_back.is_empty() {
            "NoFallback".to_string()
        } else {
            "FallbackActive".to_string()
        },
        now,
    );
    status.paused_replica_count = executor.paused_replica_count;

    // §4.4 `Steady → PausedPinned`: "if the original replica count was not
    // yet recorded it is captured into status". Only `PausedPinned`
    // freezes at whatever the workload already had — `PausedWithReplicas`
    // pins to an operator-chosen value, which isn't a count worth restoring
    // to later.
    match executor.state {
        ExecutorState::PausedPinned => {
            if status.original_replica_count.is_none() {
                status.original_replica_count = executor.paused_replica_count;
            }
        }
        _ => status.original_replica_count = None,
    }

    status
}

fn condition_status(value: bool) -> ConditionStatus {
    if value {
        ConditionStatus::True
    } else {
        ConditionStatus::False
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorState;

    fn decision(state: ExecutorState) -> ExecutorDecision {
        ExecutorDecision {
            state,
            effective_min_replicas: 1,
            effective_max_replicas: 10,
            scale_up_select_policy_override: None,
            scale_down_select_policy_override: None,
            direct_scale_to: None,
            paused_replica_count: None,
        }
    }

    #[test]
    fn marks_ready_when_no_metric_errors() {
        let status = apply_tick(
            ScalingIntentStatus::default(),
            &decision(ExecutorState::Active),
            true,
            "web".to_string(),
            vec!["web-0".to_string()],
            &Vec::<(String, String)>::new(),
            &[],
            chrono::Utc::now().naive_utc(),
        );
        assert!(status.is_true(ConditionType::Ready));
        assert!(status.is_true(ConditionType::Active));
    }

    #[test]
    fn tracks_failures_per_trigger() {
        let errors = vec![("queue-depth".to_string(), "boom".to_string())];
        let status = apply_tick(
            ScalingIntentStatus::default(),
            &decision(ExecutorState::Active),
            true,
            "web".to_string(),
            vec!["web-0".to_string()],
            &errors,
            &[],
            chrono::Utc::now().naive_utc(),
        );
        assert!(!status.is_true(ConditionType::Ready));
        assert_eq!(status.health["queue-depth"].number_of_failures, 1);
    }

    #[test]
    fn zero_state_is_not_active() {
        let status = apply_tick(
            ScalingIntentStatus::default(),
            &decision(ExecutorState::Zero),
            false,
            "web".to_string(),
            vec![],
            &Vec::<(String, String)>::new(),
            &[],
            chrono::Utc::now().naive_utc(),
        );
        assert!(!status.is_true(ConditionType::Active));
    }

    #[test]
    fn captures_original_replica_count_once_on_entering_paused_pinned() {
        let mut paused = decision(ExecutorState::PausedPinned);
        paused.paused_replica_count = Some(4);
        let status = apply_tick(
            ScalingIntentStatus::default(),
            &paused,
            false,
            "web".to_string(),
            vec![],
            &Vec::<(String, String)>::new(),
            &[],
            chrono::Utc::now().naive_utc(),
        );
        assert_eq!(status.original_replica_count, Some(4));
        assert!(status.is_true(ConditionType::Paused));

        // a later tick while still paused must not clobber the recording
        // with whatever the replica count happens to be at that moment.
        let mut still_paused = paused.clone();
        still_paused.paused_replica_count = Some(9);
        let status = apply_tick(
            status,
            &still_paused,
            false,
            "web".to_string(),
            vec![],
            &Vec::<(String, String)>::new(),
            &[],
            chrono::Utc::now().naive_utc(),
        );
        assert_eq!(status.original_replica_count, Some(4));
    }

    #[test]
    fn clears_original_replica_count_once_unpaused() {
        let mut status = ScalingIntentStatus::default();
        status.original_replica_count = Some(4);
        let status = apply_tick(
            status,
            &decision(ExecutorState::Active),
            true,
            "web".to_string(),
            vec![],
            &Vec::<(String, String)>::new(),
            &[],
            chrono::Utc::now().naive_utc(),
        );
        assert_eq!(status.original_replica_count, None);
        assert!(!status.is_true(ConditionType::Paused));
    }

    #[test]
    fn paused_with_replicas_also_marks_the_paused_condition() {
        let status = apply_tick(
            ScalingIntentStatus::default(),
            &decision(ExecutorState::PausedWithReplicas),
            false,
            "web".to_string(),
            vec![],
            &Vec::<(String, String)>::new(),
            &[],
            chrono::Utc::now().naive_utc(),
        );
        assert!(status.is_true(ConditionType::Paused));
    }

    #[test]
    fn marks_fallback_condition_when_a_metric_fell_back() {
        let status = apply_tick(
            ScalingIntentStatus::default(),
            &decision(ExecutorState::Active),
            true,
            "web".to_string(),
            vec!["web-0".to_string()],
            &Vec::<(String, String)>::new(),
            &["web-0".to_string()],
            chrono::Utc::now().naive_utc(),
        );
        assert!(status.is_true(ConditionType::Fallback));
    }
}
