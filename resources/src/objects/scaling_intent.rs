use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{child_autoscaler::HorizontalPodAutoscalerBehavior, Metadata, Object, ObjectReference};

/// The user-declared scaling specification (§3, "Intent"): binds one
/// workload to one or more Triggers and keeps a derived child autoscaler in
/// sync with it. Named `ScalingIntent` here rather than the upstream
/// project's own name for the same concept, since that name is not part of
/// this crate's public surface.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ScalingIntent {
    pub metadata: Metadata,
    pub spec: ScalingIntentSpec,
    #[serde(default)]
    pub status: Option<ScalingIntentStatus>,
}

impl Object for ScalingIntent {
    fn kind(&self) -> &'static str {
        "ScalingIntent"
    }

    fn name(&self) -> &str {
        &self.metadata.name
    }

    fn namespace(&self) -> &str {
        &self.metadata.namespace
    }
}

impl ScalingIntent {
    /// Finalizer the Reconciler installs so it can clear the Cache Manager
    /// entry for this Intent before the object is actually removed (§4.6
    /// steps 2-3).
    pub const FINALIZER: &'static str = "scaling-intent.keda-core/scaling-intent";

    pub fn has_finalizer(&self) -> bool {
        self.metadata.finalizers.iter().any(|f| f == Self::FINALIZER)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScalingIntentSpec {
    pub scale_target_ref: ObjectReference,

    /// At least one Trigger, order-preserving: external metric names are
    /// generated from trigger index (§6).
    pub triggers: Vec<Trigger>,

    #[serde(default = "default_min_replicas")]
    pub min_replica_count: u32,
    #[serde(default = "default_max_replicas")]
    pub max_replica_count: u32,
    pub idle_replica_count: Option<u32>,

    #[serde(default = "default_polling_interval")]
    pub polling_interval_seconds: u32,
    #[serde(default = "default_cooldown")]
    pub cooldown_period_seconds: u32,

    #[serde(default)]
    pub advanced: AdvancedConfig,

    pub fallback: Option<FallbackPolicy>,
}

fn default_min_replicas() -> u32 {
    1
}
fn default_max_replicas() -> u32 {
    100
}
fn default_polling_interval() -> u32 {
    30
}
fn default_cooldown() -> u32 {
    300
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    /// Type tag looked up in the Scaler registry (e.g. "cron",
    /// "prometheus", "cpu").
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub authentication_ref: Option<AuthenticationRef>,
    pub metric_type: Option<MetricType>,
    pub name: Option<String>,
    #[serde(default)]
    pub use_cached_metrics: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    AverageValue,
    Value,
    Utilization,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationRef {
    pub name: String,
    /// Absent means the referenced Authentication Object is namespaced in
    /// the Intent's own namespace; set to reference a cluster-scoped one.
    #[serde(default)]
    pub cluster_scoped: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedConfig {
    pub scaling_modifiers: Option<ScalingModifiers>,
    #[serde(default)]
    pub horizontal_pod_autoscaler_config: HorizontalPodAutoscalerConfig,
    #[serde(default)]
    pub restore_to_original_replica_count: bool,
    #[serde(default)]
    pub excluded_labels: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScalingModifiers {
    /// Expression language formula over trigger metric names (§9), compiled
    /// by `autoscaling_core::modifier`.
    pub formula: String,
    pub target: String,
    pub metric_type: MetricType,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct HorizontalPodAutoscalerConfig {
    /// Overrides the generated child autoscaler name when set (§8 scenario 2).
    pub name: Option<String>,
    pub behavior: Option<HorizontalPodAutoscalerBehavior>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FallbackPolicy {
    pub failure_threshold: u32,
    pub replicas: u32,
    #[serde(default)]
    pub behavior: FallbackBehavior,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackBehavior {
    #[default]
    Static,
    CurrentReplicas,
    CurrentReplicasIfHigher,
    CurrentReplicasIfLower,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScalingIntentStatus {
    pub hpa_name: Option<String>,
    #[serde(default)]
    pub observed_generation: u64,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub external_metric_names: Vec<String>,
    #[serde(default)]
    pub resource_metric_names: Vec<String>,
    #[serde(default)]
    pub health: HashMap<String, MetricHealth>,
    pub paused_replica_count: Option<u32>,
    pub original_replica_count: Option<u32>,
    /// Last time any Trigger was observed active (§4.4's `lastActiveTime`
    /// cooldown input). Stamped every tick the workload is active; read
    /// back on the next tick so `Steady → ScaledToZero`/`Idle` only fires
    /// once `cooldownPeriodSeconds` have elapsed since then.
    pub last_active_time: Option<NaiveDateTime>,
}

impl ScalingIntentStatus {
    pub fn condition(&self, type_: ConditionType) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    pub fn is_true(&self, type_: ConditionType) -> bool {
        self.condition(type_)
            .map(|c| c.status == ConditionStatus::True)
            .unwrap_or(false)
    }

    /// Sets (or replaces) one condition's status/reason, as the Reconciler
    /// does in a single PATCH per §4.6 step 9.
    pub fn set_condition(
        &mut self,
        type_: ConditionType,
        status: ConditionStatus,
        reason: impl Into<String>,
        now: NaiveDateTime,
    ) {
        if let Some(existing) = self.conditions.iter_mut().find(|c| c.type_ == type_) {
            if existing.status != status {
                existing.last_transition_time = now;
            }
            existing.status = status;
            existing.reason = reason.into();
        } else {
            self.conditions.push(Condition {
                type_,
                status,
                reason: reason.into(),
                last_transition_time: now,
            });
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: ConditionStatus,
    pub reason: String,
    pub last_transition_time: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ConditionType {
    Ready,
    Active,
    Fallback,
    Paused,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricHealth {
    pub number_of_failures: u32,
    pub status: MetricHealthStatus,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetricHealthStatus {
    #[default]
    Happy,
    Failing,
}
