use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("intent {0} failed validation: {1}")]
    Validation(String, String),

    #[error(transparent)]
    Scaler(#[from] scalers::ScalerError),

    #[error("scaling modifier formula error: {0}")]
    Modifier(String),

    #[error("scalers cache construction failed: {0}")]
    CachePartial(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
