pub mod burst_detector;
pub mod convergence_fusion;
pub mod independence_scorer;
pub mod phase_estimator;
pub mod scoring_loop;

pub use burst_detector::{BurstDetector, HawkesParams};
pub use convergence_fusion::{h2_score, ConvergenceFusion, EscalationLadder, SemanticInputs};
pub use independence_scorer::IndependenceScorer;
pub use phase_estimator::{PhaseDetection, PhaseEstimator, PhaseModel};
pub use scoring_loop::{
    CacheSnapshot, Collaborators, EventSender, LoopClock, LoopHandle, LoopStatus, RefreshOutcome,
    RunningLoop, ScoringLoop, SemanticCache, SemanticRefresher,
};
