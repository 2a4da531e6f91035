use std::collections::HashSet;

use resources::objects::scaling_intent::{MetricType, ScalingIntentSpec};

use crate::{error::CoreError, modifier, naming};

/// Whether a trigger's type names one of the orchestrator's native
/// resource metrics (CPU, memory) rather than routing through a Scaler.
/// Mirrors `render::resource_for_trigger`'s classification.
pub fn is_resource_trigger(type_: &str) -> bool {
    matches!(type_, "cpu" | "memory")
}

/// Re-runs the same invariants the orchestrator's admission webhook checks
/// at create/update time (§3), as defense in depth before the Reconciler
/// builds a Scalers Cache entry from a spec it didn't itself admit (out of
/// cluster test fixtures, a webhook that was temporarily disabled, ...).
pub fn validate_intent(name: &str, spec: &ScalingIntentSpec) -> Result<(), CoreError> {
    if spec.triggers.is_empty() {
        return Err(CoreError::Validation(
            name.to_string(),
            "at least one trigger is required".to_string(),
        ));
    }
    if spec.min_replica_count > spec.max_replica_count {
        return Err(CoreError::Validation(
            name.to_string(),
            format!(
                "minReplicaCount ({}) exceeds maxReplicaCount ({})",
                spec.min_replica_count, spec.max_replica_count
            ),
        ));
    }
    if let Some(idle) = spec.idle_replica_count {
        if idle >= spec.min_replica_count {
            return Err(CoreError::Validation(
                name.to_string(),
                format!(
                    "idleReplicaCount ({idle}) must be lower than minReplicaCount ({})",
                    spec.min_replica_count
                ),
            ));
        }
    }

    let mut seen_names = HashSet::new();
    for trigger in &spec.triggers {
        if let Some(trigger_name) = &trigger.name {
            if !seen_names.insert(trigger_name) {
                return Err(CoreError::Validation(
                    name.to_string(),
                    format!("duplicate trigger name `{trigger_name}`"),
                ));
            }
        }
    }

    // Invariant 2 (second half): generated external-metric names must also
    // be unique, not just the trigger names they're derived from.
    let mut seen_metric_names = HashSet::new();
    for (index, trigger) in spec.triggers.iter().enumerate() {
        let metric_name = naming::external_metric_name(index, trigger);
        if !seen_metric_names.insert(metric_name.clone()) {
            return Err(CoreError::Validation(
                name.to_string(),
                format!("duplicate external metric name `{metric_name}`"),
            ));
        }
    }

    // Invariant 4: a resource-metric trigger may only use Utilization or
    // AverageValue, never Value.
    for trigger in &spec.triggers {
        if is_resource_trigger(&trigger.type_) {
            if let Some(MetricType::Value) = trigger.metric_type {
                return Err(CoreError::Validation(
                    name.to_string(),
                    format!(
                        "resource trigger `{}` cannot use metric-type Value",
                        trigger.type_
                    ),
                ));
            }
        }
    }

    // Invariant 5: a scaling-modifier, if present, must compile, its
    // target must parse as a finite number, and its metric-type must not
    // be Utilization.
    if let Some(modifiers) = &spec.advanced.scaling_modifiers {
        if modifiers.formula.trim().is_empty() {
            return Err(CoreError::Validation(
                name.to_string(),
                "scalingModifiers.formula must not be empty".to_string(),
            ));
        }
        modifier::compile_check(&modifiers.formula).map_err(|e| {
            CoreError::Validation(
                name.to_string(),
                format!("scalingModifiers.formula does not compile: {e}"),
            )
        })?;
        match modifiers.target.parse::<f64>() {
            Ok(target) if target.is_finite() => {}
            _ => {
                return Err(CoreError::Validation(
                    name.to_string(),
                    format!(
                        "scalingModifiers.target `{}` does not parse as a finite number",
                        modifiers.target
                    ),
                ))
            }
        }
        if modifiers.metric_type == MetricType::Utilization {
            return Err(CoreError::Validation(
                name.to_string(),
                "scalingModifiers.metricType must not be Utilization".to_string(),
            ));
        }
    }

    // Invariant 3: fallback may only be enabled when every non-resource
    // trigger (or the scaling-modifier) uses metric-type AverageValue;
    // resource triggers disqualify fallback outright.
    if spec.fallback.is_some() {
        if spec.triggers.iter().any(|t| is_resource_trigger(&t.type_)) {
            return Err(CoreError::Validation(
                name.to_string(),
                "fallback cannot be enabled alongside a resource trigger".to_string(),
            ));
        }
        let average_value_only = match &spec.advanced.scaling_modifiers {
            Some(modifiers) => modifiers.metric_type == MetricType::AverageValue,
            None => spec
                .triggers
                .iter()
                .all(|t| t.metric_type.unwrap_or(MetricType::AverageValue) == MetricType::AverageValue),
        };
        if !average_value_only {
            return Err(CoreError::Validation(
                name.to_string(),
                "fallback requires every trigger (or the scaling modifier) to use metric-type AverageValue".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use resources::objects::{object_reference::ObjectReference, scaling_intent::Trigger};

    use super::*;

    fn base_spec() -> ScalingIntentSpec {
        ScalingIntentSpec {
            scale_target_ref: ObjectReference {
                api_version: "v1".to_string(),
                kind: "ReplicaSet".to_string(),
                name: "web".to_string(),
            },
            triggers: vec![Trigger {
                type_: "cron".to_string(),
                metadata: Default::default(),
                authentication_ref: None,
                metric_type: None,
                name: Some("business-hours".to_string()),
                use_cached_metrics: false,
            }],
            min_replica_count: 1,
            max_replica_count: 10,
            idle_replica_count: None,
            polling_interval_seconds: 30,
            cooldown_period_seconds: 300,
            advanced: Default::default(),
            fallback: None,
        }
    }

    #[test]
    fn rejects_empty_triggers() {
        let mut spec = base_spec();
        spec.triggers.clear();
        assert!(validate_intent("x", &spec).is_err());
    }

    #[test]
    fn rejects_min_above_max() {
        let mut spec = base_spec();
        spec.min_replica_count = 20;
        assert!(validate_intent("x", &spec).is_err());
    }

    #[test]
    fn rejects_idle_at_or_above_min() {
        let mut spec = base_spec();
        spec.idle_replica_count = Some(1);
        assert!(validate_intent("x", &spec).is_err());
    }

    #[test]
    fn rejects_duplicate_trigger_names() {
        let mut spec = base_spec();
        let mut second = spec.triggers[0].clone();
        second.type_ = "metrics-api".to_string();
        spec.triggers.push(second);
        assert!(validate_intent("x", &spec).is_err());
    }

    #[test]
    fn accepts_well_formed_spec() {
        assert!(validate_intent("x", &base_spec()).is_ok());
    }

    #[test]
    fn rejects_resource_trigger_with_value_metric_type() {
        let mut spec = base_spec();
        spec.triggers[0].type_ = "cpu".to_string();
        spec.triggers[0].metric_type = Some(MetricType::Value);
        assert!(validate_intent("x", &spec).is_err());
    }

    #[test]
    fn accepts_resource_trigger_with_utilization() {
        let mut spec = base_spec();
        spec.triggers[0].type_ = "cpu".to_string();
        spec.triggers[0].metric_type = Some(MetricType::Utilization);
        assert!(validate_intent("x", &spec).is_ok());
    }

    #[test]
    fn rejects_fallback_alongside_resource_trigger() {
        use resources::objects::scaling_intent::{FallbackBehavior, FallbackPolicy};
        let mut spec = base_spec();
        spec.triggers[0].type_ = "cpu".to_string();
        spec.triggers[0].metric_type = Some(MetricType::Utilization);
        spec.fallback = Some(FallbackPolicy {
            failure_threshold: 3,
            replicas: 5,
            behavior: FallbackBehavior::Static,
        });
        assert!(validate_intent("x", &spec).is_err());
    }

    #[test]
    fn rejects_fallback_when_trigger_is_not_average_value() {
        use resources::objects::scaling_intent::{FallbackBehavior, FallbackPolicy};
        let mut spec = base_spec();
        spec.triggers[0].metric_type = Some(MetricType::Value);
        spec.fallback = Some(FallbackPolicy {
            failure_threshold: 3,
            replicas: 5,
            behavior: FallbackBehavior::Static,
        });
        assert!(validate_intent("x", &spec).is_err());
    }

    #[test]
    fn accepts_fallback_when_every_trigger_is_average_value() {
        use resources::objects::scaling_intent::{FallbackBehavior, FallbackPolicy};
        let mut spec = base_spec();
        spec.triggers[0].metric_type = Some(MetricType::AverageValue);
        spec.fallback = Some(FallbackPolicy {
            failure_threshold: 3,
            replicas: 5,
            behavior: FallbackBehavior::Static,
        });
        assert!(validate_intent("x", &spec).is_ok());
    }

    #[test]
    fn rejects_scaling_modifier_with_utilization_metric_type() {
        use resources::objects::scaling_intent::ScalingModifiers;
        let mut spec = base_spec();
        spec.advanced.scaling_modifiers = Some(ScalingModifiers {
            formula: "s0_cron".to_string(),
            target: "10".to_string(),
            metric_type: MetricType::Utilization,
        });
        assert!(validate_intent("x", &spec).is_err());
    }

    #[test]
    fn rejects_scaling_modifier_with_non_numeric_target() {
        use resources::objects::scaling_intent::ScalingModifiers;
        let mut spec = base_spec();
        spec.advanced.scaling_modifiers = Some(ScalingModifiers {
            formula: "s0_cron".to_string(),
            target: "not-a-number".to_string(),
            metric_type: MetricType::AverageValue,
        });
        assert!(validate_intent("x", &spec).is_err());
    }

    #[test]
    fn rejects_scaling_modifier_formula_that_does_not_compile() {
        use resources::objects::scaling_intent::ScalingModifiers;
        let mut spec = base_spec();
        spec.advanced.scaling_modifiers = Some(ScalingModifiers {
            formula: "s0_cron +".to_string(),
            target: "10".to_string(),
            metric_type: MetricType::AverageValue,
        });
        assert!(validate_intent("x", &spec).is_err());
    }

    #[test]
    fn unnamed_triggers_of_the_same_type_never_collide_by_index() {
        let mut spec = base_spec();
        // Two unnamed triggers of the same type at different indices get
        // different generated names (s0-cron, s1-cron), so this is not the
        // duplicate-name case the trigger-name check above covers.
        spec.triggers[0].name = None;
        let mut second = spec.triggers[0].clone();
        second.name = None;
        spec.triggers.push(second);
        assert!(validate_intent("x", &spec).is_ok());
    }
}
