use serde::{Deserialize, Serialize};

use super::{metrics::Resource, Labels, Metadata, Object, ObjectReference};

/// The horizontal-autoscaler resource the core renders from a
/// `ScalingIntent` and owns exclusively (§3, "Child Autoscaler"). Adapted
/// from the teacher's `HorizontalPodAutoscaler`: `metrics` becomes an array
/// (one entry per trigger, plus the composite metric when a scaling
/// modifier is set) instead of the teacher's single `MetricSource`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChildAutoscaler {
    pub metadata: Metadata,
    pub spec: ChildAutoscalerSpec,
    pub status: Option<ChildAutoscalerStatus>,
}

impl Object for ChildAutoscaler {
    fn kind(&self) -> &'static str {
        "ChildAutoscaler"
    }

    fn name(&self) -> &str {
        &self.metadata.name
    }

    fn namespace(&self) -> &str {
        &self.metadata.namespace
    }
}

/// External-metric name the Metric Adapter Service routes requests for this
/// Intent by (§6): `app.kubernetes.io/part-of` plus a selector carrying the
/// owning Intent's name, set on every rendered metric spec.
pub const OWNER_NAME_LABEL: &str = "scaling-intent.keda-core/owner-name";

pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_PART_OF: &str = "app.kubernetes.io/part-of";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const LABEL_VERSION: &str = "app.kubernetes.io/version";
pub const MANAGED_BY_VALUE: &str = "keda-operator";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChildAutoscalerSpec {
    pub scale_target_ref: ObjectReference,
    pub min_replicas: u32,
    pub max_replicas: u32,
    pub metrics: Vec<MetricSpec>,
    #[serde(default)]
    pub behavior: HorizontalPodAutoscalerBehavior,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum MetricSpec {
    Resource(ResourceMetricSource),
    External(ExternalMetricSource),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetricSource {
    pub name: Resource,
    pub target: MetricTarget,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalMetricSource {
    pub metric_name: String,
    pub target: MetricTarget,
    /// Carries the owning Intent's name so the Metric Adapter Service can
    /// route the orchestrator's query back to the right Scalers Cache
    /// (§4.7 step 2).
    pub selector: Labels,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum MetricTarget {
    AverageUtilization(u32),
    AverageValue(i64),
    Value(i64),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChildAutoscalerStatus {
    pub desired_replicas: u32,
    pub current_replicas: u32,
    pub last_scale_time: Option<chrono::NaiveDateTime>,
}

/// Scaling behavior for both directions — kept verbatim from the teacher's
/// `HorizontalPodAutoscalerBehavior` (§6 "behavior overrides").
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HorizontalPodAutoscalerBehavior {
    #[serde(default = "default_scale_down_behavior")]
    pub scale_down: HPAScalingRules,
    #[serde(default = "default_scale_up_behavior")]
    pub scale_up: HPAScalingRules,
}

impl Default for HorizontalPodAutoscalerBehavior {
    fn default() -> Self {
        Self {
            scale_down: default_scale_down_behavior(),
            scale_up: default_scale_up_behavior(),
        }
    }
}

fn default_scale_down_behavior() -> HPAScalingRules {
    HPAScalingRules {
        policies: vec![HPAScalingPolicy {
            type_: ScalingPolicyType::Percent,
            value: 100,
            period_seconds: 60,
        }],
        select_policy: None,
        stabilization_window_seconds: 300,
    }
}

fn default_scale_up_behavior() -> HPAScalingRules {
    HPAScalingRules {
        policies: vec![
            HPAScalingPolicy {
                type_: ScalingPolicyType::Pods,
                value: 4,
                period_seconds: 60,
            },
            HPAScalingPolicy {
                type_: ScalingPolicyType::Percent,
                value: 100,
                period_seconds: 60,
            },
        ],
        select_policy: None,
        stabilization_window_seconds: 0,
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HPAScalingRules {
    pub policies: Vec<HPAScalingPolicy>,
    /// `None` ("nil") means "use the default policy selection". `Some`
    /// makes the choice explicit — in particular `Some(Disabled)` is how
    /// the Scaling Executor freezes a direction while paused, and removing
    /// the pause must restore this to `None`, not to `Some(Max)` (§8
    /// round-trip law: "restores ... to nil, not to Auto").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select_policy: Option<PolicySelection>,
    pub stabilization_window_seconds: u32,
}

impl HPAScalingRules {
    pub fn longest_period(&self) -> u32 {
        self.policies
            .iter()
            .map(|p| p.period_seconds)
            .max()
            .unwrap_or(0)
    }

    pub fn effective_policy(&self) -> PolicySelection {
        self.select_policy.unwrap_or(PolicySelection::Max)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum PolicySelection {
    Max,
    Min,
    Disabled,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HPAScalingPolicy {
    #[serde(rename = "type")]
    pub type_: ScalingPolicyType,
    pub value: u32,
    pub period_seconds: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ScalingPolicyType {
    Pods,
    Percent,
}
