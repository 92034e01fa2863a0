//! Semantic payload snapshots and per-tick decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::phase::{AdversaryPhase, EscalationLevel, EscalationPhase};

/// Semantic-score snapshot produced by the slow path.
///
/// Immutable once produced; the next refresh supersedes it by replacement.
/// Decay is applied to a copy of the score, never to the stored value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergencePayload {
    /// Fused semantic score in `[0, 1]`.
    pub semantic_score: f64,
    /// Rank of the scored fragment subset.
    pub matroid_rank_current: u32,
    /// Rank change against the previous payload for the same key.
    pub matroid_rank_delta: i64,
    pub estimated_adversary_phase: AdversaryPhase,
    /// Hex SHA-256 fingerprint of the inputs that produced this payload.
    pub secondary_hash: String,
    pub generated_at: DateTime<Utc>,
    pub recommended_phase: EscalationPhase,
}

impl ConvergencePayload {
    /// Age of the payload in seconds at `now`. Clock skew clamps to zero.
    pub fn age_seconds(&self, now: DateTime<Utc>) -> f64 {
        let millis = (now - self.generated_at).num_milliseconds();
        (millis.max(0) as f64) / 1000.0
    }
}

/// Decision snapshot produced once per fast-path tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientResult {
    /// Operational (burst) score.
    pub h1: f64,
    /// Decayed semantic score.
    pub h2: f64,
    pub above_line: bool,
    pub recommended_phase: EscalationPhase,
    /// Whether the vertical escalation gate opened on this tick.
    pub escalate: bool,
    /// Escalation tier after this tick.
    pub level: EscalationLevel,
}
