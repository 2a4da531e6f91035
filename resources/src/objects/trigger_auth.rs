use serde::{Deserialize, Serialize};

use super::{Metadata, Object};

/// A named bundle of credential references an Intent's triggers can point
/// at by name (§3, "Authentication Object"). Resolving the references into
/// live secrets is the `CredentialResolver` interface's job
/// (`scalers::credential`); this type only carries the declaration.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TriggerAuthentication {
    pub metadata: Metadata,
    pub spec: TriggerAuthenticationSpec,
}

impl Object for TriggerAuthentication {
    fn kind(&self) -> &'static str {
        "TriggerAuthentication"
    }

    fn name(&self) -> &str {
        &self.metadata.name
    }

    fn namespace(&self) -> &str {
        &self.metadata.namespace
    }
}

impl TriggerAuthentication {
    /// Finalizer the Auth Reconciler installs so the object cannot be
    /// deleted while an Intent still references it (§3).
    pub const FINALIZER: &'static str = "scaling-intent.keda-core/trigger-authentication";

    pub fn is_cluster_scoped(&self) -> bool {
        self.spec.scope == AuthenticationScope::Cluster
    }

    pub fn has_finalizer(&self) -> bool {
        self.metadata
            .finalizers
            .iter()
            .any(|f| f == Self::FINALIZER)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthenticationScope {
    #[default]
    Namespaced,
    Cluster,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TriggerAuthenticationSpec {
    #[serde(default)]
    pub scope: AuthenticationScope,
    #[serde(default)]
    pub secret_refs: Vec<SecretRef>,
    #[serde(default)]
    pub env_refs: Vec<EnvRef>,
    pub pod_identity: Option<PodIdentityRef>,
    pub secret_store: Option<SecretStoreRef>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    /// Name the resolved value is bound to in the trigger's config.
    pub parameter: String,
    pub secret_name: String,
    pub secret_key: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EnvRef {
    pub parameter: String,
    pub container_name: String,
    pub env_name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PodIdentityRef {
    pub provider: String,
    pub identity_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretStoreRef {
    pub store: String,
    pub parameter: String,
    pub path: String,
}
