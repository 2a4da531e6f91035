use serde::{Deserialize, Serialize};

use super::{pod::PodTemplateSpec, Labels, Metadata, Object};

/// A replicated workload: the `ReplicatedWorkload` target kind named in §3.
/// Exposes a scale subresource (`replicas`) the executor and the child
/// autoscaler both drive.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ReplicaSet {
    pub metadata: Metadata,
    pub spec: ReplicaSetSpec,
    pub status: Option<ReplicaSetStatus>,
}

impl Object for ReplicaSet {
    fn kind(&self) -> &'static str {
        "ReplicaSet"
    }

    fn name(&self) -> &str {
        &self.metadata.name
    }

    fn namespace(&self) -> &str {
        &self.metadata.namespace
    }
}

impl std::fmt::Display for ReplicaSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{:<16} {}", "Name:", self.metadata.name)?;
        writeln!(f, "{:<16} {}", "Selector:", self.spec.selector)?;
        writeln!(f, "{:<16} {}", "Labels:", self.metadata.labels)?;
        let Some(status) = self.status.as_ref() else {
            return Ok(());
        };
        writeln!(
            f,
            "{:<16} {} ready / {} current / {} desired",
            "Replicas:", status.ready_replicas, status.replicas, self.spec.replicas
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ReplicaSetSpec {
    /// Must match the pod template's labels.
    pub selector: Labels,
    pub template: PodTemplateSpec,
    #[serde(default = "default_replicas")]
    pub replicas: u32,
}

fn default_replicas() -> u32 {
    1
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaSetStatus {
    pub replicas: u32,
    pub ready_replicas: u32,
}
