//! One-shot scoring of a scenario, without loops or timers.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Config, ConvergencePayload, GroundSet, OrientResult};
use crate::infrastructure::collaborators::Scenario;
use crate::services::{
    BurstDetector, ConvergenceFusion, EscalationLadder, IndependenceScorer, PhaseEstimator,
    PhaseModel, SemanticInputs,
};

/// Everything computed for one scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreReport {
    pub key: String,
    /// Evaluation time on the event axis, in seconds
    pub at: f64,
    pub intensity: f64,
    pub bursting: bool,
    /// Fragment ids chosen by greedy basis selection
    pub basis: Vec<String>,
    pub phase_path: Vec<String>,
    pub phase_likelihood: f64,
    pub payload: ConvergencePayload,
    pub decision: OrientResult,
}

/// Score `scenario` at time `at` (defaults to the last event time, or 0).
///
/// The payload is treated as fresh, so no decay is applied.
pub fn score_scenario(
    config: &Config,
    scenario: &Scenario,
    at: Option<f64>,
    now: DateTime<Utc>,
) -> DomainResult<ScoreReport> {
    let ground_set = GroundSet::new(scenario.fragments.clone())?;
    let scorer = IndependenceScorer::with_tolerance(ground_set, config.independence.rank_tolerance);
    let estimator = PhaseEstimator::new(PhaseModel::from_config(&config.phase_model)?);
    let fusion = ConvergenceFusion::new(config.fusion.clone())?;
    let mut detector = BurstDetector::from_config(&config.hawkes)?;

    for &time in &scenario.events {
        detector.record_event(time);
    }
    let at = at.unwrap_or_else(|| scenario.events.iter().copied().fold(0.0, f64::max));

    let subset = scorer
        .ground_set()
        .recent_indices(config.independence.subset_window);
    let inputs = SemanticInputs {
        scorer: &scorer,
        estimator: &estimator,
        subset: &subset,
        observations: &scenario.observations,
        max_basis: config.independence.max_basis,
    };
    let payload = fusion.compute_payload(inputs, None, now);

    let basis = scorer
        .greedy_basis_selection(config.independence.max_basis)
        .into_iter()
        .filter_map(|idx| scorer.ground_set().get(idx).map(|f| f.id.clone()))
        .collect();
    let detection = estimator.detect_phase(&scenario.observations);
    let phase_path = detection
        .path
        .iter()
        .filter_map(|&state| estimator.model().states().get(state))
        .map(ToString::to_string)
        .collect();

    let mut ladder = EscalationLadder::new();
    let decision = fusion.orient(detector.h1_score(at), Some(&payload), &mut ladder, now);

    Ok(ScoreReport {
        key: scenario.key.clone(),
        at,
        intensity: detector.conditional_intensity(at),
        bursting: detector.is_bursting(at, config.hawkes.burst_threshold),
        basis,
        phase_path,
        phase_likelihood: detection.likelihood,
        payload,
        decision,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{AdversaryPhase, EscalationPhase, Fragment, LikelihoodMode};

    fn worked_scenario() -> Scenario {
        Scenario {
            key: "worked".to_string(),
            fragments: vec![
                Fragment::new("f0", vec![1.0, 0.0, 0.0], 0.9),
                Fragment::new("f1", vec![0.0, 1.0, 0.0], 0.8),
                Fragment::new("f2", vec![1.0, 1.0, 0.0], 0.7),
                Fragment::new("f3", vec![0.0, 0.0, 1.0], 0.95),
            ],
            observations: vec![2, 2, 2],
            events: vec![],
        }
    }

    #[test]
    fn test_score_worked_scenario() {
        let report =
            score_scenario(&Config::default(), &worked_scenario(), None, Utc::now()).unwrap();

        assert_eq!(report.payload.matroid_rank_current, 3);
        assert_eq!(report.payload.matroid_rank_delta, 0);
        assert_eq!(report.basis, vec!["f3", "f0", "f1"]);
        assert_eq!(report.payload.estimated_adversary_phase, AdversaryPhase::Execution);
        assert_eq!(report.phase_path.len(), 3);
        assert!((report.at - 0.0).abs() < f64::EPSILON);
        // No events: intensity is the baseline
        assert!((report.intensity - 0.5).abs() < 1e-12);
        assert!(!report.decision.above_line);
    }

    #[test]
    fn test_burst_drives_decision_above_line() {
        let mut scenario = worked_scenario();
        // Drop the dependent fragment so every scored fragment adds rank
        scenario.fragments.remove(2);
        scenario.events = (0..30).map(|i| f64::from(i) * 0.01).collect();

        let report = score_scenario(&Config::default(), &scenario, Some(0.3), Utc::now()).unwrap();
        assert!(report.bursting);
        assert!((report.decision.h1 - 1.0).abs() < f64::EPSILON);
        // 0.75 * 1.0 + 0.25 * L with L ~ 0.0382
        assert!((report.phase_likelihood - 0.038_225).abs() < 1e-6);
        assert!((report.payload.semantic_score - 0.759_556).abs() < 1e-5);
        assert!(report.decision.above_line);
        assert_eq!(report.decision.recommended_phase, EscalationPhase::Heighten);
    }

    #[test]
    fn test_per_symbol_mode_lifts_semantic_score() {
        let mut scenario = worked_scenario();
        scenario.fragments.remove(2);
        scenario.events = (0..30).map(|i| f64::from(i) * 0.01).collect();
        let mut config = Config::default();
        config.fusion.likelihood_mode = LikelihoodMode::PerSymbol;

        let report = score_scenario(&config, &scenario, Some(0.3), Utc::now()).unwrap();
        // 0.75 * 1.0 + 0.25 * L^(1/3)
        assert!((report.payload.semantic_score - 0.834).abs() < 0.01);
        assert_eq!(report.decision.recommended_phase, EscalationPhase::Investigate);
    }

    #[test]
    fn test_mismatched_dimensions_rejected() {
        let mut scenario = worked_scenario();
        scenario.fragments.push(Fragment::new("bad", vec![1.0], 0.5));
        assert!(score_scenario(&Config::default(), &scenario, None, Utc::now()).is_err());
    }
}
