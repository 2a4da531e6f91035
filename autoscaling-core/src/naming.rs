use resources::objects::scaling_intent::{ScalingIntent, Trigger};

/// Reserved fixed name for the composite metric a scaling-modifier formula
/// produces (§6: "The composite metric uses a reserved fixed name"),
/// disambiguated across Intents the same way every other external metric
/// is: by the `owner-name` selector label, not by the metric name itself.
pub const COMPOSITE_METRIC_NAME: &str = "composite-metric-name";

const MAX_METRIC_NAME_LEN: usize = 63;

/// External metric name the Metric Adapter Service routes requests for one
/// trigger by (§6): `s{triggerIndex}-{triggerType}-{triggerName?}`,
/// lowercase, with every character outside `[a-z0-9-]` removed, truncated
/// to 63 characters at a word boundary. Stable across reconciles as long as
/// the trigger's position/type/name don't change (§8 scenario 1: removing a
/// trigger shifts the survivors' indices and therefore their names).
pub fn external_metric_name(index: usize, trigger: &Trigger) -> String {
    let raw = match &trigger.name {
        Some(name) => format!("s{index}-{}-{name}", trigger.type_),
        None => format!("s{index}-{}", trigger.type_),
    };
    truncate_at_word_boundary(&sanitize(&raw), MAX_METRIC_NAME_LEN)
}

fn sanitize(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect()
}

fn truncate_at_word_boundary(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let truncated = &s[..max];
    match truncated.rfind('-') {
        Some(idx) if idx > 0 => truncated[..idx].to_string(),
        _ => truncated.to_string(),
    }
}

/// Name of the rendered child autoscaler: the `horizontalPodAutoscalerConfig.name`
/// override when set, else `keda-hpa-{intent-name}` (§8 scenario 2: setting
/// the override from unset to `new-so-x` on an Intent `so-x` deletes
/// `keda-hpa-so-x`, which is only true if that's the unoverridden default).
pub fn child_autoscaler_name(intent: &ScalingIntent) -> String {
    intent
        .spec
        .advanced
        .horizontal_pod_autoscaler_config
        .name
        .clone()
        .unwrap_or_else(|| format!("keda-hpa-{}", intent.metadata.name))
}

#[cfg(test)]
mod tests {
    use resources::objects::{object_reference::ObjectReference, Metadata};

    use super::*;

    fn intent(name: &str) -> ScalingIntent {
        ScalingIntent {
            metadata: Metadata {
                name: name.to_string(),
                ..Default::default()
            },
            spec: resources::objects::scaling_intent::ScalingIntentSpec {
                scale_target_ref: ObjectReference {
                    api_version: "v1".to_string(),
                    kind: "ReplicaSet".to_string(),
                    name: "web".to_string(),
                },
                triggers: vec![],
                min_replica_count: 1,
                max_replica_count: 10,
                idle_replica_count: None,
                polling_interval_seconds: 30,
                cooldown_period_seconds: 300,
                advanced: Default::default(),
                fallback: None,
            },
            status: None,
        }
    }

    fn trigger(type_: &str, name: Option<&str>) -> Trigger {
        Trigger {
            type_: type_.to_string(),
            metadata: Default::default(),
            authentication_ref: None,
            metric_type: None,
            name: name.map(str::to_string),
            use_cached_metrics: false,
        }
    }

    #[test]
    fn names_by_index_and_type_when_trigger_is_unnamed() {
        assert_eq!(external_metric_name(0, &trigger("cron", None)), "s0-cron");
    }

    #[test]
    fn includes_trigger_name_when_set() {
        assert_eq!(
            external_metric_name(0, &trigger("cron", Some("business-hours"))),
            "s0-cron-business-hours"
        );
    }

    #[test]
    fn scenario_cache_regeneration_after_recreate() {
        assert!(external_metric_name(0, &trigger("cron", Some("CET"))).starts_with("s0-cron-cet"));
    }

    #[test]
    fn sanitizes_characters_outside_lowercase_alphanumeric_and_dash() {
        let t = trigger("metrics-api", Some("Queue_Depth!"));
        assert_eq!(external_metric_name(2, &t), "s2-metrics-api-queuedepth");
    }

    #[test]
    fn truncates_long_names_at_a_word_boundary() {
        let long_name = "a".repeat(80);
        let t = trigger("metrics-api", Some(&long_name));
        let name = external_metric_name(0, &t);
        assert!(name.len() <= MAX_METRIC_NAME_LEN);
    }

    #[test]
    fn prefers_override_name_for_child_autoscaler() {
        let mut i = intent("web-scaler");
        i.spec.advanced.horizontal_pod_autoscaler_config.name = Some("custom-hpa".to_string());
        assert_eq!(child_autoscaler_name(&i), "custom-hpa");
    }

    #[test]
    fn defaults_child_autoscaler_name_to_keda_hpa_prefixed_intent_name() {
        assert_eq!(
            child_autoscaler_name(&intent("so-x")),
            "keda-hpa-so-x"
        );
    }
}
