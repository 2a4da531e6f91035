use resources::objects::{
    child_autoscaler::{
        ChildAutoscaler, ChildAutoscalerSpec, ExternalMetricSource, HorizontalPodAutoscalerBehavior,
        MetricSpec, MetricTarget, ResourceMetricSource, LABEL_MANAGED_BY, LABEL_NAME,
        LABEL_PART_OF, LABEL_VERSION, MANAGED_BY_VALUE, OWNER_NAME_LABEL,
    },
    metrics::Resource,
    scaling_intent::{MetricType, ScalingIntent},
    Labels, Metadata, Object, OwnerReference,
};

use crate::{executor::ExecutorDecision, naming, scalers_cache::RenderedMetricSpec};

/// Builds the child autoscaler this Intent currently renders to (§4.6 step
/// 6): one metric per trigger (or a single composite metric when a scaling
/// modifier formula is configured), the Intent's own labels minus
/// `excludedLabels`, and the Scaling Executor's effective replica bounds and
/// behavior overrides. `metric_specs` is the Scalers Cache's rendering of
/// each non-resource trigger's canonical name and target (§4.2); resource
/// triggers (CPU/memory) never appear in it since they don't route through
/// a Scaler.
pub fn render(
    intent: &ScalingIntent,
    executor: &ExecutorDecision,
    metric_specs: &[RenderedMetricSpec],
) -> ChildAutoscaler {
    let metrics = if let Some(modifiers) = &intent.spec.advanced.scaling_modifiers {
        vec![MetricSpec::External(ExternalMetricSource {
            metric_name: naming::COMPOSITE_METRIC_NAME.to_string(),
            target: metric_target(modifiers.metric_type, &modifiers.target),
            selector: owner_selector(intent),
        })]
    } else {
        intent
            .spec
            .triggers
            .iter()
            .enumerate()
            .map(|(index, trigger)| {
                if let Some(resource) = resource_for_trigger(&trigger.type_) {
                    MetricSpec::Resource(ResourceMetricSource {
                        name: resource,
                        target: metric_target(
                            trigger.metric_type.unwrap_or(MetricType::Utilization),
                            "50",
                        ),
                    })
                } else {
                    let metric_name = naming::external_metric_name(index, trigger);
                    let spec = metric_specs.iter().find(|s| s.metric_name == metric_name);
                    let (metric_type, target) = match spec {
                        Some(spec) => (spec.metric_type, spec.target.to_string()),
                        None => (trigger.metric_type.unwrap_or(MetricType::AverageValue), "0".to_string()),
                    };
                    MetricSpec::External(ExternalMetricSource {
                        metric_name,
                        target: metric_target(metric_type, &target),
                        selector: owner_selector(intent),
                    })
                }
            })
            .collect()
    };

    let mut behavior = intent
        .spec
        .advanced
        .horizontal_pod_autoscaler_config
        .behavior
        .clone()
        .unwrap_or_default();
    behavior.scale_up.select_policy = executor.scale_up_select_policy_override;
    behavior.scale_down.select_policy = executor.scale_down_select_policy_override;

    let name = naming::child_autoscaler_name(intent);
    let labels = rendered_labels(intent, &name);

    ChildAutoscaler {
        metadata: Metadata {
            name,
            namespace: intent.metadata.namespace.clone(),
            labels,
            owner_references: vec![OwnerReference {
                api_version: "v1".to_string(),
                kind: intent.kind().to_string(),
                name: intent.metadata.name.clone(),
                uid: intent.metadata.uid.unwrap_or_default(),
                controller: true,
                block_owner_deletion: true,
            }],
            ..Default::default()
        },
        spec: ChildAutoscalerSpec {
            scale_target_ref: intent.spec.scale_target_ref.clone(),
            min_replicas: executor.effective_min_replicas,
            max_replicas: executor.effective_max_replicas,
            metrics,
            behavior,
        },
        status: None,
    }
}

/// Whether a freshly rendered child autoscaler differs from the one
/// currently stored, i.e. whether the Reconciler needs to issue a PATCH
/// (§4.6 step 7's three-way compare, reduced here to "does the desired spec
/// equal the live one" since both sides already start from the same
/// defaulting rules).
pub fn needs_patch(current: &ChildAutoscaler, desired: &ChildAutoscaler) -> bool {
    current.spec != desired.spec || current.metadata.labels != desired.metadata.labels
}

fn resource_for_trigger(type_: &str) -> Option<Resource> {
    match type_ {
        "cpu" => Some(Resource::CPU),
        "memory" => Some(Resource::Memory),
        _ => None,
    }
}

fn metric_target(metric_type: MetricType, default_value: &str) -> MetricTarget {
    match metric_type {
        MetricType::Utilization => {
            MetricTarget::AverageUtilization(default_value.parse().unwrap_or(50))
        }
        MetricType::AverageValue => {
            MetricTarget::AverageValue(default_value.parse().unwrap_or(0))
        }
        MetricType::Value => MetricTarget::Value(default_value.parse().unwrap_or(0)),
    }
}

fn owner_selector(intent: &ScalingIntent) -> Labels {
    let mut selector = Labels::new();
    selector.insert(OWNER_NAME_LABEL, intent.metadata.name.clone());
    selector
}

fn rendered_labels(intent: &ScalingIntent, name: &str) -> Labels {
    let mut labels = intent
        .metadata
        .labels
        .without(&intent.spec.advanced.excluded_labels);
    labels.insert(LABEL_NAME, name.to_string());
    labels.insert(LABEL_PART_OF, intent.metadata.name.clone());
    labels.insert(LABEL_MANAGED_BY, MANAGED_BY_VALUE);
    labels.insert(LABEL_VERSION, env!("CARGO_PKG_VERSION"));
    labels
}

#[cfg(test)]
mod tests {
    use resources::objects::{object_reference::ObjectReference, scaling_intent::Trigger};

    use super::*;
    use crate::executor::ExecutorState;

    fn intent() -> ScalingIntent {
        ScalingIntent {
            metadata: Metadata {
                name: "web".to_string(),
                namespace: "default".to_string(),
                ..Default::default()
            },
            spec: resources::objects::scaling_intent::ScalingIntentSpec {
                scale_target_ref: ObjectReference {
                    api_version: "v1".to_string(),
                    kind: "ReplicaSet".to_string(),
                    name: "web".to_string(),
                },
                triggers: vec![Trigger {
                    type_: "metrics-api".to_string(),
                    metadata: Default::default(),
                    authentication_ref: None,
                    metric_type: Some(MetricType::AverageValue),
                    name: Some("queue-depth".to_string()),
                    use_cached_metrics: false,
                }],
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

    fn decision() -> ExecutorDecision {
        ExecutorDecision {
            state: ExecutorState::Active,
            effective_min_replicas: 1,
            effective_max_replicas: 10,
            scale_up_select_policy_override: None,
            scale_down_select_policy_override: None,
            direct_scale_to: None,
            paused_replica_count: None,
        }
    }

    fn metric_specs() -> Vec<RenderedMetricSpec> {
        vec![RenderedMetricSpec {
            metric_name: "s0-metrics-api-queue-depth".to_string(),
            target: 100,
            metric_type: MetricType::AverageValue,
        }]
    }

    #[test]
    fn renders_one_external_metric_per_trigger() {
        let child = render(&intent(), &decision(), &metric_specs());
        assert_eq!(child.spec.metrics.len(), 1);
        match &child.spec.metrics[0] {
            MetricSpec::External(source) => {
                assert_eq!(source.metric_name, "s0-metrics-api-queue-depth");
                assert_eq!(source.target, MetricTarget::AverageValue(100));
            }
            _ => panic!("expected an external metric"),
        }
    }

    #[test]
    fn propagates_managed_by_label() {
        let child = render(&intent(), &decision(), &metric_specs());
        assert_eq!(
            child.metadata.labels.get(LABEL_MANAGED_BY),
            Some(MANAGED_BY_VALUE)
        );
    }

    #[test]
    fn needs_patch_detects_replica_bound_changes() {
        let current = render(&intent(), &decision(), &metric_specs());
        let mut desired = current.clone();
        desired.spec.max_replicas = 20;
        assert!(needs_patch(&current, &desired));
        assert!(!needs_patch(&current, &current.clone()));
    }
}
