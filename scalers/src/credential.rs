use std::collections::HashMap;

use async_trait::async_trait;
use resources::objects::{scaling_intent::AuthenticationRef, trigger_auth::TriggerAuthentication};

use crate::error::ScalerError;

/// Parameter values resolved from an Authentication Object's secret/env/pod
/// identity/secret-store references, keyed by the `parameter` name each
/// reference declares. Merged into a trigger's own `metadata` map by the
/// caller before a Scaler is constructed.
#[derive(Debug, Clone, Default)]
pub struct ResolvedAuth(pub HashMap<String, String>);

impl ResolvedAuth {
    pub fn get(&self, parameter: &str) -> Option<&str> {
        self.0.get(parameter).map(String::as_str)
    }
}

/// Resolves an `AuthenticationRef` plus the `TriggerAuthentication` object it
/// names into concrete parameter values. The mechanics of reaching the
/// backing secret store, pod identity provider, or external vault are out of
/// scope (§1 Non-goals); this trait is the seam a caller plugs a real
/// implementation into.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(
        &self,
        auth_ref: &AuthenticationRef,
        auth: &TriggerAuthentication,
    ) -> Result<ResolvedAuth, ScalerError>;
}

/// Resolves only `envRef`/literal-style references it can answer without any
/// external system, by looking values up in its own pre-populated map. Used
/// in tests and as a starting point for a production resolver that wraps
/// this with a real secret backend.
pub struct StaticCredentialResolver(pub HashMap<String, String>);

#[async_trait]
impl CredentialResolver for StaticCredentialResolver {
    async fn resolve(
        &self,
        _auth_ref: &AuthenticationRef,
        auth: &TriggerAuthentication,
    ) -> Result<ResolvedAuth, ScalerError> {
        let mut resolved = HashMap::new();
        for secret_ref in &auth.spec.secret_refs {
            if let Some(value) = self.0.get(&secret_ref.secret_key) {
                resolved.insert(secret_ref.parameter.clone(), value.clone());
            }
        }
        for env_ref in &auth.spec.env_refs {
            if let Some(value) = self.0.get(&env_ref.env_name) {
                resolved.insert(env_ref.parameter.clone(), value.clone());
            }
        }
        Ok(ResolvedAuth(resolved))
    }
}
