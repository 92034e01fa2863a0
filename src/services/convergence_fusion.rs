//! Convergence fusion: semantic payload construction, decay and decisions.
//!
//! H2 (semantic) is built on the slow path from matroid independence and the
//! estimated adversary phase. H1 (operational) comes from the burst detector on
//! every tick. Both must clear the convergence line before a graded escalation
//! phase is recommended; vertical escalation is a separate gate on `h1 + h2`.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ConvergencePayload, EscalationLevel, EscalationPhase, FusionConfig, LikelihoodMode,
    OrientResult,
};
use crate::services::independence_scorer::IndependenceScorer;
use crate::services::phase_estimator::{PhaseDetection, PhaseEstimator};

/// Independence ratio `rank / |S|`, 0 for an empty subset.
pub fn h2_score(rank: usize, subset_len: usize) -> f64 {
    if subset_len == 0 {
        return 0.0;
    }
    rank as f64 / subset_len as f64
}

/// Inputs gathered by the slow path for one semantic refresh.
#[derive(Debug, Clone, Copy)]
pub struct SemanticInputs<'a> {
    pub scorer: &'a IndependenceScorer,
    pub estimator: &'a PhaseEstimator,
    /// Fragment subset scored for independence.
    pub subset: &'a [usize],
    pub observations: &'a [usize],
    /// Cardinality bound for the greedy basis folded into the fingerprint.
    pub max_basis: usize,
}

/// Fusion policy with validated configuration.
#[derive(Debug, Clone)]
pub struct ConvergenceFusion {
    config: FusionConfig,
}

impl ConvergenceFusion {
    pub fn new(config: FusionConfig) -> DomainResult<Self> {
        validate(&config)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Phase contribution: severity weight times detection likelihood, clamped to 1.
    ///
    /// `LikelihoodMode::Raw` uses the sequence likelihood as is;
    /// `LikelihoodMode::PerSymbol` uses its geometric mean per observation.
    pub fn phase_signal(&self, detection: &PhaseDetection) -> f64 {
        let severity = self.config.severity.weight(detection.phase);
        let likelihood = match self.config.likelihood_mode {
            LikelihoodMode::Raw => detection.likelihood,
            LikelihoodMode::PerSymbol => detection.confidence(),
        };
        (severity * likelihood).clamp(0.0, 1.0)
    }

    /// Blend of independence ratio and phase signal, clamped to `[0, 1]`.
    pub fn semantic_score(&self, h2: f64, detection: &PhaseDetection) -> f64 {
        let weight = self.config.phase_weight;
        let blended = (1.0 - weight).mul_add(h2, weight * self.phase_signal(detection));
        blended.clamp(0.0, 1.0)
    }

    /// Escalation band for a score, or `Observe` below the convergence line.
    pub fn recommend(&self, score: f64) -> EscalationPhase {
        if score < self.config.threshold {
            return EscalationPhase::Observe;
        }
        self.config
            .bands
            .iter()
            .zip(EscalationPhase::BANDS)
            .rev()
            .find(|(lower, _)| score >= **lower)
            .map_or(EscalationPhase::BANDS[0], |(_, phase)| phase)
    }

    /// Compute a fresh semantic payload.
    ///
    /// `matroid_rank_delta` is measured against `previous`, or 0 for the first payload.
    pub fn compute_payload(
        &self,
        inputs: SemanticInputs<'_>,
        previous: Option<&ConvergencePayload>,
        now: DateTime<Utc>,
    ) -> ConvergencePayload {
        let ground_set = inputs.scorer.ground_set();
        let subset = ground_set.valid_indices(inputs.subset);
        let rank = inputs.scorer.rank(&subset);
        let independence = h2_score(rank, subset.len());
        let detection = inputs.estimator.detect_phase(inputs.observations);
        let semantic_score = self.semantic_score(independence, &detection);
        let basis = inputs.scorer.greedy_basis_selection(inputs.max_basis);

        let rank_current = u32::try_from(rank).unwrap_or(u32::MAX);
        let matroid_rank_delta = previous.map_or(0, |p| {
            i64::from(rank_current) - i64::from(p.matroid_rank_current)
        });

        let mut hasher = Sha256::new();
        for idx in subset.iter().chain(std::iter::once(&usize::MAX)).chain(&basis) {
            match ground_set.get(*idx) {
                Some(fragment) => hasher.update(fragment.id.as_bytes()),
                None => hasher.update(b"|"),
            }
            hasher.update([0u8]);
        }
        hasher.update(rank_current.to_le_bytes());
        hasher.update(detection.phase.as_str().as_bytes());
        hasher.update((inputs.observations.len() as u64).to_le_bytes());
        hasher.update(semantic_score.to_bits().to_le_bytes());
        let secondary_hash = format!("{:x}", hasher.finalize());

        debug!(
            subset = subset.len(),
            rank,
            basis = basis.len(),
            independence,
            phase = %detection.phase,
            likelihood = detection.likelihood,
            semantic_score,
            "computed semantic payload"
        );

        ConvergencePayload {
            semantic_score,
            matroid_rank_current: rank_current,
            matroid_rank_delta,
            estimated_adversary_phase: detection.phase,
            secondary_hash,
            generated_at: now,
            recommended_phase: self.recommend(semantic_score),
        }
    }

    /// Semantic score decayed by payload age: halves every `half_life_secs`.
    pub fn effective_score(&self, payload: &ConvergencePayload, now: DateTime<Utc>) -> f64 {
        let age = payload.age_seconds(now);
        payload.semantic_score * 0.5_f64.powf(age / self.config.half_life_secs)
    }

    pub fn is_valid(&self, payload: &ConvergencePayload, now: DateTime<Utc>) -> bool {
        payload.age_seconds(now) < self.config.validity_window_secs
    }

    /// Convergence-line test and graded recommendation.
    pub fn decide(&self, h1: f64, h2: f64) -> (bool, EscalationPhase) {
        let above_line = h1 >= self.config.threshold && h2 >= self.config.threshold;
        if above_line {
            (true, self.recommend(h2))
        } else {
            (false, EscalationPhase::Observe)
        }
    }

    /// Vertical escalation gate. Pure in `level` and `combined`.
    pub fn should_escalate(&self, level: EscalationLevel, combined: f64) -> bool {
        match level {
            EscalationLevel::Local => combined >= self.config.escalation.local,
            EscalationLevel::Intermediate => combined >= self.config.escalation.intermediate,
            EscalationLevel::Strategic => false,
        }
    }

    /// Fuse one tick. A missing payload counts as a semantic score of 0.
    pub fn orient(
        &self,
        h1: f64,
        payload: Option<&ConvergencePayload>,
        ladder: &mut EscalationLadder,
        now: DateTime<Utc>,
    ) -> OrientResult {
        let h2 = payload.map_or(0.0, |p| self.effective_score(p, now));
        let (above_line, recommended_phase) = self.decide(h1, h2);
        let escalate = self.should_escalate(ladder.level(), h1 + h2);
        if escalate {
            ladder.escalate();
        }

        OrientResult {
            h1,
            h2,
            above_line,
            recommended_phase,
            escalate,
            level: ladder.level(),
        }
    }
}

fn validate(config: &FusionConfig) -> DomainResult<()> {
    let invalid = |msg: String| Err(DomainError::InvalidFusionPolicy(msg));

    if !(config.threshold > 0.0 && config.threshold <= 1.0) {
        return invalid(format!("threshold must be in (0, 1], got {}", config.threshold));
    }
    if !config.half_life_secs.is_finite() || config.half_life_secs <= 0.0 {
        return invalid(format!(
            "half_life_secs must be > 0, got {}",
            config.half_life_secs
        ));
    }
    if !config.validity_window_secs.is_finite() || config.validity_window_secs <= 0.0 {
        return invalid(format!(
            "validity_window_secs must be > 0, got {}",
            config.validity_window_secs
        ));
    }
    if config.bands.iter().any(|b| !(0.0..=1.0).contains(b))
        || config.bands.windows(2).any(|w| w[0] >= w[1])
    {
        return invalid(format!(
            "bands must be strictly ascending within [0, 1], got {:?}",
            config.bands
        ));
    }
    if config.bands[0] < config.threshold {
        return invalid(format!(
            "lowest band {} must not sit below the threshold {}",
            config.bands[0], config.threshold
        ));
    }
    if !(0.0..=1.0).contains(&config.phase_weight) {
        return invalid(format!(
            "phase_weight must be in [0, 1], got {}",
            config.phase_weight
        ));
    }
    let severity = config.severity;
    for weight in [
        severity.dormant,
        severity.reconnaissance,
        severity.staging,
        severity.execution,
        severity.unknown,
    ] {
        if !weight.is_finite() || weight < 0.0 {
            return invalid(format!("severity weights must be >= 0, got {weight}"));
        }
    }
    let bars = config.escalation;
    if !bars.local.is_finite() || !bars.intermediate.is_finite() {
        return invalid("escalation bars must be finite".to_string());
    }
    Ok(())
}

/// One-directional escalation state machine over [`EscalationLevel`].
#[derive(Debug, Clone, Default)]
pub struct EscalationLadder {
    level: EscalationLevel,
}

impl EscalationLadder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(level: EscalationLevel) -> Self {
        Self { level }
    }

    pub fn level(&self) -> EscalationLevel {
        self.level
    }

    /// Move up one tier. Returns the new tier, or `None` at the terminal tier.
    pub fn escalate(&mut self) -> Option<EscalationLevel> {
        let next = self.level.next()?;
        info!(from = %self.level, to = %next, "escalation tier raised");
        self.level = next;
        Some(next)
    }

    /// Return to the lowest tier. De-escalation is an external policy decision.
    pub fn reset(&mut self) {
        self.level = EscalationLevel::Local;
    }
}
