pub mod config;
pub mod fragment;
pub mod payload;
pub mod phase;

pub use config::{
    AuditConfig, CollaboratorConfig, Config, EscalationBars, FusionConfig, HawkesConfig,
    IndependenceConfig, LoggingConfig, LoopConfig, PhaseModelConfig, PhaseSeverity, ServerConfig,
};
pub use fragment::{Fragment, GroundSet};
pub use payload::{ConvergencePayload, OrientResult};
pub use phase::{
    AdversaryPhase, EscalationLevel, EscalationPhase, LikelihoodMode, SmoothingPolicy,
};
