use thiserror::Error;
use trellis_store::StoreError;
use trellis_types::ValidationErrors;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine-layer errors.
///
/// Cross-tenant and genuinely-missing resources both surface as `NotFound`;
/// the engine does not reveal the existence of out-of-tenant resources.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Audit outcome code for this error.
    pub fn outcome_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation_failed",
            Self::Store(_) => "error",
        }
    }
}

impl From<ValidationErrors> for EngineError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}
