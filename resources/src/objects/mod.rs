use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod child_autoscaler;
pub mod metrics;
pub mod object_reference;
pub mod pod;
pub mod replica_set;
pub mod scaling_intent;
pub mod trigger_auth;

pub use object_reference::ObjectReference;

/// Common capability every resource kind stored in an informer exposes.
///
/// Mirrors the teacher's `Object` trait used throughout `resources::objects`
/// and `resources::informer`: a stable name for store keys and a kind tag
/// for logging and error messages.
pub trait Object {
    fn kind(&self) -> &'static str;
    fn name(&self) -> &str;
    fn namespace(&self) -> &str;

    /// Key used to index informer stores and the Cache Manager: `namespace/name`.
    fn key(&self) -> String {
        format!("{}/{}", self.namespace(), self.name())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct Metadata {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub uid: Option<Uuid>,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub annotations: Labels,
    #[serde(default)]
    pub owner_references: Vec<OwnerReference>,
    /// Bumped by the orchestrator's API layer on every spec change; untouched
    /// by status-only writes. Drives the Cache Manager's generation gate.
    #[serde(default)]
    pub generation: u64,
    #[serde(default)]
    pub finalizers: Vec<String>,
    #[serde(default)]
    pub deletion_timestamp: Option<chrono::NaiveDateTime>,
}

fn default_namespace() -> String {
    "default".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct Labels(pub HashMap<String, String>);

impl Labels {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// True if every key/value pair in `selector` is present in `self`.
    pub fn matches(&self, selector: &Labels) -> bool {
        selector
            .0
            .iter()
            .all(|(k, v)| self.0.get(k).map(|have| have == v).unwrap_or(false))
    }

    /// Labels from `self` whose key is not in `excluded`, used when
    /// propagating Intent labels onto the rendered child autoscaler.
    pub fn without(&self, excluded: &[String]) -> Labels {
        Labels(
            self.0
                .iter()
                .filter(|(k, _)| !excluded.iter().any(|e| e == *k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    pub fn merge(&mut self, other: &Labels) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pairs: Vec<_> = self.0.iter().collect();
        pairs.sort_by_key(|(k, _)| k.clone());
        write!(
            f,
            "{}",
            pairs
                .into_iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(",")
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: Uuid,
    #[serde(default)]
    pub controller: bool,
    #[serde(default)]
    pub block_owner_deletion: bool,
}
