//! Hidden Markov Model phase estimation.
//!
//! Infers the most likely hidden adversary phase from a sequence of observation
//! symbols with the Viterbi algorithm, and scores the sequence with the forward
//! algorithm. The two computations are independent.

use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AdversaryPhase, PhaseModelConfig, SmoothingPolicy};

/// Tolerance for stochastic rows and distributions.
const STOCHASTIC_TOLERANCE: f64 = 1e-6;

/// Read-only HMM: states, transition matrix A, emission matrix B, initial π.
#[derive(Debug, Clone)]
pub struct PhaseModel {
    states: Vec<AdversaryPhase>,
    initial: Vec<f64>,
    transition: Vec<Vec<f64>>,
    emission: Vec<Vec<f64>>,
    smoothing: SmoothingPolicy,
}

impl PhaseModel {
    /// Validate and build a model.
    ///
    /// Rejects empty or repeated states, shape mismatches, and any
    /// distribution that does not sum to 1.
    pub fn new(
        states: Vec<AdversaryPhase>,
        initial: Vec<f64>,
        transition: Vec<Vec<f64>>,
        emission: Vec<Vec<f64>>,
    ) -> DomainResult<Self> {
        let n = states.len();
        if n == 0 {
            return Err(DomainError::InvalidPhaseModel(
                "at least one state is required".to_string(),
            ));
        }
        for (i, state) in states.iter().enumerate() {
            if states[..i].contains(state) {
                return Err(DomainError::InvalidPhaseModel(format!(
                    "state '{state}' is listed more than once"
                )));
            }
        }
        if initial.len() != n {
            return Err(DomainError::InvalidPhaseModel(format!(
                "initial distribution has {} entries for {n} states",
                initial.len()
            )));
        }
        validate_distribution("initial distribution", &initial)?;

        if transition.len() != n {
            return Err(DomainError::InvalidPhaseModel(format!(
                "transition matrix has {} rows for {n} states",
                transition.len()
            )));
        }
        for (i, row) in transition.iter().enumerate() {
            if row.len() != n {
                return Err(DomainError::InvalidPhaseModel(format!(
                    "transition row {i} has {} columns for {n} states",
                    row.len()
                )));
            }
            validate_distribution(&format!("transition row {i}"), row)?;
        }

        if emission.len() != n {
            return Err(DomainError::InvalidPhaseModel(format!(
                "emission matrix has {} rows for {n} states",
                emission.len()
            )));
        }
        let alphabet = emission[0].len();
        for (i, row) in emission.iter().enumerate() {
            if row.len() != alphabet {
                return Err(DomainError::InvalidPhaseModel(format!(
                    "emission row {i} has {} symbols, expected {alphabet}",
                    row.len()
                )));
            }
            validate_distribution(&format!("emission row {i}"), row)?;
        }

        Ok(Self {
            states,
            initial,
            transition,
            emission,
            smoothing: SmoothingPolicy::None,
        })
    }

    pub fn from_config(config: &PhaseModelConfig) -> DomainResult<Self> {
        Self::new(
            config.states.clone(),
            config.initial.clone(),
            config.transition.clone(),
            config.emission.clone(),
        )?
        .with_smoothing(config.smoothing)
    }

    /// Attach a smoothing policy for symbols outside the emission alphabet.
    pub fn with_smoothing(mut self, smoothing: SmoothingPolicy) -> DomainResult<Self> {
        if let SmoothingPolicy::Floor { epsilon } = smoothing {
            if !epsilon.is_finite() || epsilon <= 0.0 || epsilon >= 1.0 {
                return Err(DomainError::InvalidPhaseModel(format!(
                    "smoothing floor must be in (0, 1), got {epsilon}"
                )));
            }
        }
        self.smoothing = smoothing;
        Ok(self)
    }

    pub fn states(&self) -> &[AdversaryPhase] {
        &self.states
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    /// Number of observation symbols the emission matrix covers.
    pub fn alphabet_size(&self) -> usize {
        self.emission[0].len()
    }

    pub fn smoothing(&self) -> SmoothingPolicy {
        self.smoothing
    }

    fn emission_prob(&self, state: usize, symbol: usize) -> f64 {
        match self.emission[state].get(symbol) {
            Some(&p) => p,
            None => match self.smoothing {
                SmoothingPolicy::None => 0.0,
                SmoothingPolicy::Floor { epsilon } => epsilon,
            },
        }
    }
}

fn validate_distribution(label: &str, values: &[f64]) -> DomainResult<()> {
    if values.is_empty() {
        return Err(DomainError::InvalidPhaseModel(format!("{label} is empty")));
    }
    if let Some(bad) = values
        .iter()
        .find(|p| !p.is_finite() || **p < 0.0 || **p > 1.0)
    {
        return Err(DomainError::InvalidPhaseModel(format!(
            "{label} contains probability {bad} outside [0, 1]"
        )));
    }
    let sum: f64 = values.iter().sum();
    if (sum - 1.0).abs() > STOCHASTIC_TOLERANCE {
        return Err(DomainError::InvalidPhaseModel(format!(
            "{label} sums to {sum}, expected 1"
        )));
    }
    Ok(())
}

/// Result of [`PhaseEstimator::detect_phase`].
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseDetection {
    /// Phase at the final time step, or `Unknown` when the sequence is impossible.
    pub phase: AdversaryPhase,
    /// Forward likelihood of the whole sequence.
    ///
    /// Underflows to `0.0` on long sequences that are still possible. Use
    /// `log_likelihood` or [`Self::is_unknown`] to tell an impossible sequence
    /// apart from a merely improbable one.
    pub likelihood: f64,
    /// Underflow-safe natural log of the likelihood (`-inf` when impossible).
    pub log_likelihood: f64,
    /// Viterbi state path as indices into the model's states.
    pub path: Vec<usize>,
    /// Number of observations scored.
    pub observations: usize,
}

impl PhaseDetection {
    pub fn is_unknown(&self) -> bool {
        self.phase == AdversaryPhase::Unknown
    }

    /// Per-symbol geometric-mean likelihood, `L^(1/T)`, in `[0, 1]`.
    pub fn confidence(&self) -> f64 {
        if self.observations == 0 || !self.log_likelihood.is_finite() {
            return 0.0;
        }
        (self.log_likelihood / self.observations as f64)
            .exp()
            .clamp(0.0, 1.0)
    }
}

/// Viterbi/forward inference over a read-only [`PhaseModel`].
#[derive(Debug, Clone)]
pub struct PhaseEstimator {
    model: PhaseModel,
}

impl PhaseEstimator {
    pub fn new(model: PhaseModel) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &PhaseModel {
        &self.model
    }

    /// Most likely state sequence for `observations`.
    ///
    /// Argmax ties resolve to the lowest state index. Each step is rescaled by
    /// its maximum, which leaves every comparison unchanged.
    pub fn viterbi(&self, observations: &[usize]) -> Vec<usize> {
        let n = self.model.num_states();
        let steps = observations.len();
        if steps == 0 {
            return Vec::new();
        }

        let mut delta: Vec<f64> = (0..n)
            .map(|i| self.model.initial[i] * self.model.emission_prob(i, observations[0]))
            .collect();
        rescale_by_max(&mut delta);

        let mut backpointers: Vec<Vec<usize>> = Vec::with_capacity(steps - 1);
        for &symbol in &observations[1..] {
            let mut next = vec![0.0; n];
            let mut psi = vec![0usize; n];
            for j in 0..n {
                let mut best_state = 0;
                let mut best_score = delta[0] * self.model.transition[0][j];
                for (i, &d) in delta.iter().enumerate().skip(1) {
                    let score = d * self.model.transition[i][j];
                    if score > best_score {
                        best_score = score;
                        best_state = i;
                    }
                }
                psi[j] = best_state;
                next[j] = best_score * self.model.emission_prob(j, symbol);
            }
            rescale_by_max(&mut next);
            backpointers.push(psi);
            delta = next;
        }

        let mut state = argmax(&delta);
        let mut path = vec![0usize; steps];
        path[steps - 1] = state;
        for (t, psi) in backpointers.iter().enumerate().rev() {
            state = psi[state];
            path[t] = state;
        }
        path
    }

    /// Total likelihood of `observations` by the forward recurrence.
    ///
    /// An empty sequence has likelihood 1.
    pub fn forward(&self, observations: &[usize]) -> f64 {
        let n = self.model.num_states();
        let Some((&first, rest)) = observations.split_first() else {
            return 1.0;
        };

        let mut alpha: Vec<f64> = (0..n)
            .map(|i| self.model.initial[i] * self.model.emission_prob(i, first))
            .collect();
        for &symbol in rest {
            alpha = (0..n)
                .map(|j| {
                    let incoming: f64 = alpha
                        .iter()
                        .enumerate()
                        .map(|(i, a)| a * self.model.transition[i][j])
                        .sum();
                    incoming * self.model.emission_prob(j, symbol)
                })
                .collect();
        }
        alpha.iter().sum()
    }

    /// Natural log of the forward likelihood, computed with per-step scaling.
    pub fn log_likelihood(&self, observations: &[usize]) -> f64 {
        let n = self.model.num_states();
        let Some((&first, rest)) = observations.split_first() else {
            return 0.0;
        };

        let mut alpha: Vec<f64> = (0..n)
            .map(|i| self.model.initial[i] * self.model.emission_prob(i, first))
            .collect();
        let mut log_likelihood = 0.0;
        let Some(scale) = normalize(&mut alpha) else {
            return f64::NEG_INFINITY;
        };
        log_likelihood += scale.ln();

        for &symbol in rest {
            alpha = (0..n)
                .map(|j| {
                    let incoming: f64 = alpha
                        .iter()
                        .enumerate()
                        .map(|(i, a)| a * self.model.transition[i][j])
                        .sum();
                    incoming * self.model.emission_prob(j, symbol)
                })
                .collect();
            let Some(scale) = normalize(&mut alpha) else {
                return f64::NEG_INFINITY;
            };
            log_likelihood += scale.ln();
        }
        log_likelihood
    }

    /// Current phase (final Viterbi state) and forward likelihood.
    ///
    /// A sequence with zero probability reports [`AdversaryPhase::Unknown`].
    pub fn detect_phase(&self, observations: &[usize]) -> PhaseDetection {
        let path = self.viterbi(observations);
        let likelihood = self.forward(observations);
        let log_likelihood = self.log_likelihood(observations);

        let phase = match path.last() {
            Some(&state) if log_likelihood.is_finite() => self.model.states[state],
            _ => AdversaryPhase::Unknown,
        };
        if phase == AdversaryPhase::Unknown && !observations.is_empty() {
            debug!(
                observations = observations.len(),
                alphabet = self.model.alphabet_size(),
                "observation sequence has zero likelihood; phase unknown"
            );
        }

        PhaseDetection {
            phase,
            likelihood,
            log_likelihood,
            path,
            observations: observations.len(),
        }
    }
}

/// Index of the maximum value; the lowest index wins ties.
fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

fn rescale_by_max(values: &mut [f64]) {
    let max = values.iter().copied().fold(0.0_f64, f64::max);
    if max > 0.0 {
        for v in values.iter_mut() {
            *v /= max;
        }
    }
}

/// Normalize to unit sum, returning the scale. `None` when every entry is zero.
fn normalize(values: &mut [f64]) -> Option<f64> {
    let sum: f64 = values.iter().sum();
    if sum <= 0.0 || !sum.is_finite() {
        return None;
    }
    for v in values.iter_mut() {
        *v /= sum;
    }
    Some(sum)
}
