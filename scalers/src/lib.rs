pub mod builtin;
pub mod credential;
pub mod error;
pub mod registry;
pub mod scaler;

pub use credential::{CredentialResolver, ResolvedAuth};
pub use error::ScalerError;
pub use registry::ScalerRegistry;
pub use scaler::{Scaler, ScalerContext};
