use chrono::{Duration, NaiveDateTime};
use resources::objects::child_autoscaler::PolicySelection;

/// Which of the pin-to-zero/idle/pause states the rendered child
/// autoscaler's effective replica bounds currently reflect (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Active,
    Idle,
    Zero,
    /// `paused` annotation set true (or non-boolean); both scale
    /// directions are disabled and the workload is frozen at whatever
    /// replica count it already has.
    PausedPinned,
    /// `paused-replicas` annotation set to a parseable non-negative
    /// integer; the workload is pinned to exactly that value regardless
    /// of the `paused` annotation.
    PausedWithReplicas,
}

/// Everything the executor needs, computed by the Reconciler from the
/// freshly-read Intent, Scalers Cache state, and target replica count —
/// deliberately free of any informer/store access itself (§4.4: "treat the
/// orchestrator API as the source of truth"), the same separation the
/// teacher's `reconcile` keeps by re-deriving `current_replicas` from the
/// freshly-fetched target each tick rather than trusting cached state.
pub struct ExecutorInputs {
    pub is_active: bool,
    pub current_replicas: u32,
    pub min_replica_count: u32,
    pub max_replica_count: u32,
    pub idle_replica_count: Option<u32>,
    /// `None` when the pause annotation is absent. `Some(_)` carries the
    /// parsed value — a non-boolean annotation value is treated as `true`,
    /// preserved intentionally from the upstream behaviour this was
    /// distilled from rather than "corrected" to reject it (see
    /// `REDESIGN FLAGS`).
    pub paused: Option<bool>,
    pub paused_replica_count_annotation: Option<u32>,
    pub cooldown_period_seconds: u32,
    pub last_active_time: Option<NaiveDateTime>,
    pub now: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorDecision {
    pub state: ExecutorState,
    pub effective_min_replicas: u32,
    pub effective_max_replicas: u32,
    /// Overrides `behavior.scaleUp.selectPolicy` and
    /// `behavior.scaleDown.selectPolicy` on the rendered child autoscaler.
    /// `Some(Disabled)` while `PausedPinned`; `None` ("nil") otherwise,
    /// never `Some(Max)` — removing the pause must restore the field to
    /// nil, not re-assert the default (§8 round-trip law).
    pub scale_up_select_policy_override: Option<PolicySelection>,
    pub scale_down_select_policy_override: Option<PolicySelection>,
    /// When set, the Reconciler must write this replica count directly to
    /// the scale target, bypassing the child HPA (§4.4: "bypassing the
    /// child HPA, which cannot cross zero"). `None` means the HPA's own
    /// band (`effective_min_replicas..=effective_max_replicas`) is left to
    /// drive the workload as usual.
    pub direct_scale_to: Option<u32>,
    pub paused_replica_count: Option<u32>,
}

pub fn decide(inputs: &ExecutorInputs) -> ExecutorDecision {
    // `paused-replicas` pins independently of the `paused` annotation
    // (§4.4, §6): it is its own trigger, not a modifier of the plain
    // pause. A non-zero HPA floor is still required even if the
    // workload itself is pinned to zero replicas.
    if let Some(value) = inputs.paused_replica_count_annotation {
        let bound = value.max(1);
        return ExecutorDecision {
            state: ExecutorState::PausedWithReplicas,
            effective_min_replicas: bound,
            effective_max_replicas: bound,
            scale_up_select_policy_override: None,
            scale_down_select_policy_override: None,
            direct_scale_to: Some(value),
            paused_replica_count: Some(value),
        };
    }

    if let Some(true) = inputs.paused {
        let frozen = inputs.current_replicas;
        return ExecutorDecision {
            state: ExecutorState::PausedPinned,
            effective_min_replicas: frozen,
            effective_max_replicas: frozen.max(inputs.max_replica_count),
            scale_up_select_policy_override: Some(PolicySelection::Disabled),
            scale_down_select_policy_override: Some(PolicySelection::Disabled),
            direct_scale_to: None,
            paused_replica_count: Some(frozen),
        };
    }

    // Outside pause, the child HPA always keeps the Intent's own band
    // (floored at 1 — it cannot cross zero, §4.3/§4.4) regardless of
    // idle/zero pinning; only the workload's *actual* replica count is
    // ever driven below that band, and only by a direct write this
    // component issues itself (§8 scenario 4: "child HPA is still
    // rendered with min=5, max=10" while the workload sits at 1).
    let hpa_min = inputs.min_replica_count.max(1);
    let hpa_max = inputs.max_replica_count.max(hpa_min);

    if inputs.is_active {
        // Releasing from zero: the workload needs an explicit kick since
        // the HPA (delegated scaling arithmetic, §1 Non-goals) cannot by
        // itself move a replica count across the zero boundary.
        let direct_scale_to = if inputs.current_replicas == 0 {
            Some(release_from_zero_replicas(inputs))
        } else {
            None
        };
        return ExecutorDecision {
            state: ExecutorState::Active,
            effective_min_replicas: hpa_min,
            effective_max_replicas: hpa_max,
            scale_up_select_policy_override: None,
            scale_down_select_policy_override: None,
            direct_scale_to,
            paused_replica_count: None,
        };
    }

    if !cooldown_elapsed(inputs) {
        return ExecutorDecision {
            state: ExecutorState::Active,
            effective_min_replicas: hpa_min,
            effective_max_replicas: hpa_max,
            scale_up_select_policy_override: None,
            scale_down_select_policy_override: None,
            direct_scale_to: None,
            paused_replica_count: None,
        };
    }

    match inputs.idle_replica_count {
        Some(idle) => ExecutorDecision {
            state: ExecutorState::Idle,
            effective_min_replicas: hpa_min,
            effective_max_replicas: hpa_max,
            scale_up_select_policy_override: None,
            scale_down_select_policy_override: None,
            direct_scale_to: Some(idle),
            paused_replica_count: None,
        },
        None if inputs.min_replica_count == 0 => ExecutorDecision {
            state: ExecutorState::Zero,
            effective_min_replicas: hpa_min,
            effective_max_replicas: hpa_max,
            scale_up_select_policy_override: None,
            scale_down_select_policy_override: None,
            direct_scale_to: Some(0),
            paused_replica_count: None,
        },
        None => ExecutorDecision {
            state: ExecutorState::Active,
            effective_min_replicas: hpa_min,
            effective_max_replicas: hpa_max,
            scale_up_select_policy_override: None,
            scale_down_select_policy_override: None,
            direct_scale_to: None,
            paused_replica_count: None,
        },
    }
}

/// §4.4 `ScaledToZero → ScaledFromZero`: `max(1, idleReplicaCount+1 if set
/// else minReplicaCount if >0 else 1)`.
fn release_from_zero_replicas(inputs: &ExecutorInputs) -> u32 {
    let base = match inputs.idle_replica_count {
        Some(idle) => idle + 1,
        None if inputs.min_replica_count > 0 => inputs.min_replica_count,
        None => 1,
    };
    base.max(1)
}

/// Job-template instance count for one tick (§4.4: "if the target is a job
/// template, the executor computes `ceil(queueLength / targetPerPod)` and
/// creates that many job instances, capping at maxReplicaCount, and does
/// not render a child HPA"). Both quantities are carried in the same
/// milli-unit currency as everywhere else (§4.5); the ratio is scale-
/// invariant, so no conversion back to plain units is needed before
/// dividing. A `targetPerPod` of zero or less never divides — treated as
/// "no target configured", producing zero instances rather than an error,
/// since a job template intent with a malformed trigger should not crash
/// the reconcile loop.
pub fn decide_job_count(queue_length_milli: i64, target_per_pod_milli: i64, max_replica_count: u32) -> u32 {
    if target_per_pod_milli <= 0 || queue_length_milli <= 0 {
        return 0;
    }
    let instances = (queue_length_milli + target_per_pod_milli - 1) / target_per_pod_milli;
    instances.clamp(0, max_replica_count as i64) as u32
}

fn cooldown_elapsed(inputs: &ExecutorInputs) -> bool {
    match inputs.last_active_time {
        Some(last_active) => {
            inputs.now - last_active >= Duration::seconds(inputs.cooldown_period_seconds as i64)
        }
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_inputs() -> ExecutorInputs {
        ExecutorInputs {
            is_active: false,
            current_replicas: 3,
            min_replica_count: 0,
            max_replica_count: 10,
            idle_replica_count: None,
            paused: None,
            paused_replica_count_annotation: None,
            cooldown_period_seconds: 300,
            last_active_time: None,
            now: chrono::Utc::now().naive_utc(),
        }
    }

    #[test]
    fn active_workload_enforces_minimum_of_one() {
        let mut inputs = base_inputs();
        inputs.is_active = true;
        inputs.min_replica_count = 0;
        let decision = decide(&inputs);
        assert_eq!(decision.state, ExecutorState::Active);
        assert_eq!(decision.effective_min_replicas, 1);
    }

    #[test]
    fn inactive_with_zero_min_and_no_idle_pins_to_zero() {
        let decision = decide(&base_inputs());
        assert_eq!(decision.state, ExecutorState::Zero);
        assert_eq!(decision.direct_scale_to, Some(0));
        // the HPA cannot itself cross zero, so its band keeps a floor of 1.
        assert_eq!(decision.effective_min_replicas, 1);
    }

    #[test]
    fn inactive_with_idle_count_settles_there_instead_of_zero() {
        let mut inputs = base_inputs();
        inputs.idle_replica_count = Some(2);
        inputs.min_replica_count = 5;
        inputs.max_replica_count = 10;
        let decision = decide(&inputs);
        assert_eq!(decision.state, ExecutorState::Idle);
        assert_eq!(decision.direct_scale_to, Some(2));
        // §8 scenario 4: the child HPA is still rendered with the Intent's
        // own band, not the idle value.
        assert_eq!(decision.effective_min_replicas, 5);
        assert_eq!(decision.effective_max_replicas, 10);
    }

    #[test]
    fn releasing_from_zero_uses_idle_plus_one() {
        let mut inputs = base_inputs();
        inputs.is_active = true;
        inputs.current_replicas = 0;
        inputs.idle_replica_count = Some(2);
        let decision = decide(&inputs);
        assert_eq!(decision.direct_scale_to, Some(3));
    }

    #[test]
    fn releasing_from_zero_without_idle_uses_min_replica_count() {
        let mut inputs = base_inputs();
        inputs.is_active = true;
        inputs.current_replicas = 0;
        inputs.min_replica_count = 4;
        let decision = decide(&inputs);
        assert_eq!(decision.direct_scale_to, Some(4));
    }

    #[test]
    fn active_with_nonzero_current_replicas_never_bypasses_the_hpa() {
        let mut inputs = base_inputs();
        inputs.is_active = true;
        inputs.current_replicas = 3;
        let decision = decide(&inputs);
        assert_eq!(decision.direct_scale_to, None);
    }

    #[test]
    fn inactive_before_cooldown_elapses_stays_active() {
        let mut inputs = base_inputs();
        inputs.last_active_time = Some(inputs.now - Duration::seconds(10));
        inputs.cooldown_period_seconds = 300;
        let decision = decide(&inputs);
        assert_eq!(decision.state, ExecutorState::Active);
    }

    #[test]
    fn nonzero_min_never_pins_to_zero() {
        let mut inputs = base_inputs();
        inputs.min_replica_count = 2;
        let decision = decide(&inputs);
        assert_eq!(decision.state, ExecutorState::Active);
        assert_eq!(decision.effective_min_replicas, 2);
    }

    #[test]
    fn paused_freezes_at_current_replicas_and_disables_both_directions() {
        let mut inputs = base_inputs();
        inputs.paused = Some(true);
        inputs.current_replicas = 4;
        let decision = decide(&inputs);
        assert_eq!(decision.state, ExecutorState::PausedPinned);
        assert_eq!(decision.effective_min_replicas, 4);
        assert_eq!(
            decision.scale_up_select_policy_override,
            Some(PolicySelection::Disabled)
        );
        assert_eq!(
            decision.scale_down_select_policy_override,
            Some(PolicySelection::Disabled)
        );
    }

    #[test]
    fn paused_replicas_annotation_wins_over_plain_pause() {
        let mut inputs = base_inputs();
        inputs.paused = Some(true);
        inputs.current_replicas = 4;
        inputs.paused_replica_count_annotation = Some(7);
        let decision = decide(&inputs);
        assert_eq!(decision.state, ExecutorState::PausedWithReplicas);
        assert_eq!(decision.effective_min_replicas, 7);
        assert_eq!(decision.effective_max_replicas, 7);
        assert_eq!(decision.paused_replica_count, Some(7));
        assert_eq!(decision.scale_up_select_policy_override, None);
    }

    #[test]
    fn paused_replicas_annotation_works_without_plain_pause_annotation() {
        let mut inputs = base_inputs();
        inputs.paused = None;
        inputs.paused_replica_count_annotation = Some(0);
        let decision = decide(&inputs);
        assert_eq!(decision.state, ExecutorState::PausedWithReplicas);
        // the HPA floor can't cross zero even though the pinned value is 0.
        assert_eq!(decision.effective_min_replicas, 1);
        assert_eq!(decision.effective_max_replicas, 1);
        assert_eq!(decision.paused_replica_count, Some(0));
    }

    #[test]
    fn unpausing_yields_no_select_policy_override() {
        let mut inputs = base_inputs();
        inputs.is_active = true;
        inputs.paused = None;
        let decision = decide(&inputs);
        assert_eq!(decision.scale_up_select_policy_override, None);
    }

    #[test]
    fn job_count_rounds_up_to_cover_the_whole_queue() {
        assert_eq!(decide_job_count(25_000, 10_000, 10), 3);
    }

    #[test]
    fn job_count_caps_at_max_replica_count() {
        assert_eq!(decide_job_count(1_000_000, 1_000, 10), 10);
    }

    #[test]
    fn job_count_is_zero_when_queue_is_empty() {
        assert_eq!(decide_job_count(0, 10_000, 10), 0);
    }

    #[test]
    fn job_count_is_zero_when_target_per_pod_is_unset() {
        assert_eq!(decide_job_count(25_000, 0, 10), 0);
    }
}
