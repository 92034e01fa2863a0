//! Domain errors for the convergence scoring engine.

use thiserror::Error;

/// Domain-level errors that can occur in the scoring engine.
///
/// Construction-time variants (`InvalidPhaseModel`, `InvalidHawkesParams`,
/// `InvalidGroundSet`) are fatal and must reject a configuration before the
/// engine starts. Every other variant is recovered locally by the scoring
/// loop with a defined fallback value.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invalid phase model: {0}")]
    InvalidPhaseModel(String),

    #[error("Invalid Hawkes parameters: {0}")]
    InvalidHawkesParams(String),

    #[error("Invalid ground set: {0}")]
    InvalidGroundSet(String),

    #[error("Invalid fusion policy: {0}")]
    InvalidFusionPolicy(String),

    #[error("Semantic refresh timed out after {timeout_ms}ms")]
    RefreshTimedOut { timeout_ms: u64 },

    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

impl DomainError {
    /// Whether this error must stop the engine from starting.
    pub const fn is_construction_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidPhaseModel(_)
                | Self::InvalidHawkesParams(_)
                | Self::InvalidGroundSet(_)
                | Self::InvalidFusionPolicy(_)
        )
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
