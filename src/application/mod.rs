pub mod engine;
pub mod offline;

pub use engine::{resolve_collaborators, Engine, ResolvedCollaborators};
pub use offline::{score_scenario, ScoreReport};
