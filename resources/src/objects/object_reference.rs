use serde::{Deserialize, Serialize};

/// Points at a scalable resource in the same namespace as the Intent that
/// references it (§3, "Target reference").
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
}

/// The three target kinds an Intent may bind to (§3).
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ScaleTargetKind {
    ReplicatedWorkload,
    CustomScalable,
    JobTemplate,
}

impl ScaleTargetKind {
    pub fn from_kind_str(kind: &str) -> Self {
        match kind {
            "JobTemplate" | "Job" => Self::JobTemplate,
            "ReplicaSet" | "Deployment" => Self::ReplicatedWorkload,
            // Anything else is resolved as a custom scalable resource via
            // discovery of its scale subresource (§4.6 step 4).
            _ => Self::CustomScalable,
        }
    }
}
