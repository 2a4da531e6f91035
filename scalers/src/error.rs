use thiserror::Error;

/// Distinguishes the error kinds §7 assigns different reconcile behaviour to:
/// a bad trigger config is a validation failure the Reconciler reports and
/// never retries past `Ready=False`; a lookup that merely failed this tick
/// is transient and feeds the Fallback Engine instead.
#[derive(Debug, Error)]
pub enum ScalerError {
    #[error("trigger {type_} metadata invalid: {reason}")]
    InvalidMetadata { type_: String, reason: String },

    #[error("no authentication configured for trigger {type_} but one is required")]
    MissingAuthentication { type_: String },

    #[error("transient failure querying {type_}: {source}")]
    Transient {
        type_: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("unknown trigger type: {0}")]
    UnknownType(String),
}

impl ScalerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ScalerError::Transient { .. })
    }
}
