use async_trait::async_trait;

use super::errors::DomainResult;
use super::models::{ConvergencePayload, Fragment};

/// Supplier of embedded evidence fragments for a scoring session
///
/// Implemented by the embedding collaborator. Vectors share a fixed
/// dimensionality agreed out of band.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Current ground set for the session, oldest fragment first
    ///
    /// # Arguments
    /// * `key` - The scoring session key
    ///
    /// # Returns
    /// * `Ok(fragments)` on success (possibly empty)
    /// * `Err(DomainError::Collaborator)` when the provider is unreachable
    async fn fragments(&self, key: &str) -> DomainResult<Vec<Fragment>>;
}

/// Supplier of the observation-symbol stream consumed by the phase estimator
#[async_trait]
pub trait ObservationSource: Send + Sync {
    /// Observation symbols for the session, oldest first
    async fn observations(&self, key: &str) -> DomainResult<Vec<usize>>;
}

/// Write-only destination for emitted payloads (audit trail)
///
/// The engine never reads back through this port.
#[async_trait]
pub trait PayloadSink: Send + Sync {
    async fn persist(&self, key: &str, payload: &ConvergencePayload) -> DomainResult<()>;
}
