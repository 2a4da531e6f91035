use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{metrics::Resource, Labels, Metadata, Object};

/// Just enough of a Pod to let the built-in resource scalers (CPU/memory)
/// sample requests and filter on readiness. Trimmed from the teacher's
/// fuller `Pod` type: ports, container statuses and the rest of the
/// scheduling/runtime surface belong to the orchestrator, not this
/// controller.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Pod {
    pub metadata: Metadata,
    pub spec: PodSpec,
    pub status: Option<PodStatus>,
}

impl Object for Pod {
    fn kind(&self) -> &'static str {
        "Pod"
    }

    fn name(&self) -> &str {
        &self.metadata.name
    }

    fn namespace(&self) -> &str {
        &self.metadata.namespace
    }
}

impl Pod {
    /// Sum of the requested quantity for `resource` across all containers.
    pub fn requests(&self, resource: &Resource) -> i64 {
        self.spec
            .containers
            .iter()
            .filter_map(|c| c.requests.get(resource))
            .sum()
    }

    pub fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .map(|s| {
                s.phase == PodPhase::Running
                    && s.conditions
                        .get(&PodConditionType::Ready)
                        .map(|c| c.status)
                        .unwrap_or(false)
            })
            .unwrap_or(false)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PodSpec {
    /// There must be at least one container in a Pod.
    pub containers: Vec<Container>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Container {
    pub name: String,
    pub image: String,
    /// Requested quantity per resource, used by the utilization/value
    /// resource scalers to compute the current-to-target ratio.
    #[serde(default)]
    pub requests: HashMap<Resource, i64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodStatus {
    pub start_time: Option<NaiveDateTime>,
    pub phase: PodPhase,
    #[serde(default)]
    pub conditions: HashMap<PodConditionType, PodCondition>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PodConditionType {
    PodScheduled,
    Initialized,
    ContainersReady,
    Ready,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct PodCondition {
    pub status: bool,
}

/// Used by `ReplicaSetSpec::template`; not otherwise inspected by this
/// controller.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct PodTemplateSpec {
    #[serde(default)]
    pub metadata: TemplateMetadata,
    pub spec: Option<PodSpec>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct TemplateMetadata {
    #[serde(default)]
    pub labels: Labels,
}
