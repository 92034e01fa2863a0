//! Convergence Engine - cognitive convergence scoring
//!
//! Fuses three independent signals into escalation decisions:
//!
//! - **Independence** (H2): matroid rank of embedded evidence fragments
//! - **Phase**: hidden Markov estimate of the adversary's campaign phase
//! - **Bursts** (H1): Hawkes self-exciting intensity over event arrivals
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, errors and collaborator ports
//! - **Service Layer** (`services`): scoring kernels and the fast/slow scoring loop
//! - **Application Layer** (`application`): engine composition and offline scoring
//! - **Infrastructure Layer** (`infrastructure`): config, logging, collaborators, audit
//! - **Adapters** (`adapters`): HTTP query surface
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use convergence_engine::{Config, ConfigLoader};
//! use convergence_engine::application::{resolve_collaborators, Engine};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::load()?;
//!     let resolved = resolve_collaborators(&config).await?;
//!     let engine = Engine::start(&config, &resolved)?;
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    AdversaryPhase, Config, ConvergencePayload, EscalationLevel, EscalationPhase, Fragment,
    GroundSet, OrientResult,
};
pub use domain::ports::{EmbeddingProvider, ObservationSource, PayloadSink};
pub use domain::{DomainError, DomainResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    BurstDetector, ConvergenceFusion, IndependenceScorer, LoopHandle, PhaseEstimator, ScoringLoop,
};
