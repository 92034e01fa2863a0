//! Hawkes self-exciting point process for temporal burst detection.
//!
//! ```text
//! λ(t) = μ + Σ_{τᵢ < t} α · e^(−β(t − τᵢ))
//! ```
//!
//! - μ: baseline intensity (events per second)
//! - α: excitation added by each event
//! - β: decay rate of that excitation
//!
//! Times are seconds on a caller-chosen monotonic axis.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::HawkesConfig;

/// Default divisor normalizing intensity into the H1 score.
pub const DEFAULT_H1_DIVISOR: f64 = 5.0;

/// Contribution below which an old event is considered negligible.
pub const NEGLIGIBLE_EXCITATION: f64 = 1e-12;

/// Validated Hawkes parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HawkesParams {
    mu: f64,
    alpha: f64,
    beta: f64,
}

impl HawkesParams {
    /// Validate and build parameters. All three must be finite and non-negative.
    pub fn new(mu: f64, alpha: f64, beta: f64) -> DomainResult<Self> {
        for (name, value) in [("mu", mu), ("alpha", alpha), ("beta", beta)] {
            if !value.is_finite() || value < 0.0 {
                return Err(DomainError::InvalidHawkesParams(format!(
                    "{name} must be finite and >= 0, got {value}"
                )));
            }
        }
        Ok(Self { mu, alpha, beta })
    }

    pub const fn mu(&self) -> f64 {
        self.mu
    }

    pub const fn alpha(&self) -> f64 {
        self.alpha
    }

    pub const fn beta(&self) -> f64 {
        self.beta
    }

    /// Age beyond which a single event contributes less than `epsilon`.
    ///
    /// `None` when excitation never decays (β = 0).
    pub fn negligible_horizon(&self, epsilon: f64) -> Option<f64> {
        if self.alpha <= epsilon {
            return Some(0.0);
        }
        if self.beta == 0.0 {
            return None;
        }
        Some((self.alpha / epsilon).ln() / self.beta)
    }
}

/// Burst detector holding the ordered arrival history.
#[derive(Debug, Clone)]
pub struct BurstDetector {
    params: HawkesParams,
    arrivals: VecDeque<f64>,
    h1_divisor: f64,
    eviction_horizon: Option<f64>,
}

impl BurstDetector {
    pub fn new(params: HawkesParams) -> Self {
        Self {
            params,
            arrivals: VecDeque::new(),
            h1_divisor: DEFAULT_H1_DIVISOR,
            eviction_horizon: None,
        }
    }

    /// Build from configuration.
    ///
    /// Without an explicit horizon, events are evicted once their contribution
    /// falls below [`NEGLIGIBLE_EXCITATION`].
    pub fn from_config(config: &HawkesConfig) -> DomainResult<Self> {
        let params = HawkesParams::new(config.mu, config.alpha, config.beta)?;
        if !config.h1_divisor.is_finite() || config.h1_divisor <= 0.0 {
            return Err(DomainError::InvalidHawkesParams(format!(
                "h1_divisor must be > 0, got {}",
                config.h1_divisor
            )));
        }
        let horizon = match config.eviction_horizon_secs {
            Some(secs) if !secs.is_finite() || secs < 0.0 => {
                return Err(DomainError::InvalidHawkesParams(format!(
                    "eviction_horizon_secs must be finite and >= 0, got {secs}"
                )));
            }
            Some(secs) => Some(secs),
            None => params.negligible_horizon(NEGLIGIBLE_EXCITATION),
        };

        let mut detector = Self::new(params).with_h1_divisor(config.h1_divisor);
        detector.eviction_horizon = horizon;
        Ok(detector)
    }

    /// Override the H1 normalization divisor. Non-positive values are ignored.
    #[must_use]
    pub fn with_h1_divisor(mut self, divisor: f64) -> Self {
        if divisor.is_finite() && divisor > 0.0 {
            self.h1_divisor = divisor;
        }
        self
    }

    /// Enable eviction of events older than `horizon` seconds.
    #[must_use]
    pub fn with_eviction_horizon(mut self, horizon: f64) -> Self {
        if horizon.is_finite() && horizon >= 0.0 {
            self.eviction_horizon = Some(horizon);
        }
        self
    }

    pub fn params(&self) -> &HawkesParams {
        &self.params
    }

    pub fn h1_divisor(&self) -> f64 {
        self.h1_divisor
    }

    pub fn len(&self) -> usize {
        self.arrivals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrivals.is_empty()
    }

    /// Record an event arrival. Late arrivals are inserted in time order.
    pub fn record_event(&mut self, time: f64) {
        if !time.is_finite() {
            warn!(time, "ignoring non-finite event time");
            return;
        }
        match self.arrivals.back() {
            Some(&last) if time < last => {
                let position = self.arrivals.partition_point(|&tau| tau <= time);
                self.arrivals.insert(position, time);
            }
            _ => self.arrivals.push_back(time),
        }
    }

    /// Conditional intensity at `t`, summing every retained event strictly before `t`.
    pub fn conditional_intensity(&self, t: f64) -> f64 {
        let cutoff = self.arrivals.partition_point(|&tau| tau < t);
        let excitation: f64 = self
            .arrivals
            .iter()
            .take(cutoff)
            .map(|&tau| self.params.alpha * (-self.params.beta * (t - tau)).exp())
            .sum();
        self.params.mu + excitation
    }

    /// Operational score: intensity normalized by the divisor, clamped to 1.
    pub fn h1_score(&self, t: f64) -> f64 {
        (self.conditional_intensity(t) / self.h1_divisor).min(1.0)
    }

    pub fn is_bursting(&self, t: f64, threshold: f64) -> bool {
        self.conditional_intensity(t) > threshold
    }

    /// Evict events older than the configured horizon. Returns the number removed.
    pub fn prune(&mut self, now: f64) -> usize {
        let Some(horizon) = self.eviction_horizon else {
            return 0;
        };
        let cutoff = now - horizon;
        let stale = self.arrivals.partition_point(|&tau| tau < cutoff);
        self.arrivals.drain(..stale);
        stale
    }
}
