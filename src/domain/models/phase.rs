//! Closed enumerations for adversary phases, escalation bands and tiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Hidden adversary phase inferred by the phase estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdversaryPhase {
    Dormant,
    Reconnaissance,
    Staging,
    Execution,
    /// The observation sequence had zero likelihood under the model.
    Unknown,
}

impl AdversaryPhase {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Dormant => "dormant",
            Self::Reconnaissance => "reconnaissance",
            Self::Staging => "staging",
            Self::Execution => "execution",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for AdversaryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recommended escalation phase, ordered from the baseline to the most severe band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationPhase {
    /// Baseline: continue observing.
    Observe,
    Heighten,
    Investigate,
    Contain,
    Intervene,
}

impl EscalationPhase {
    /// Graded bands above the convergence line, mildest first.
    pub const BANDS: [Self; 4] = [
        Self::Heighten,
        Self::Investigate,
        Self::Contain,
        Self::Intervene,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Observe => "observe",
            Self::Heighten => "heighten",
            Self::Investigate => "investigate",
            Self::Contain => "contain",
            Self::Intervene => "intervene",
        }
    }
}

impl fmt::Display for EscalationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operational scope tier. Transitions are one-directional.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EscalationLevel {
    #[default]
    Local,
    Intermediate,
    /// Terminal tier; never escalates further.
    Strategic,
}

impl EscalationLevel {
    /// The next tier up, or `None` at the terminal tier.
    pub const fn next(&self) -> Option<Self> {
        match self {
            Self::Local => Some(Self::Intermediate),
            Self::Intermediate => Some(Self::Strategic),
            Self::Strategic => None,
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Strategic)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Intermediate => "intermediate",
            Self::Strategic => "strategic",
        }
    }
}

impl fmt::Display for EscalationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Treatment of observation symbols outside the emission alphabet.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SmoothingPolicy {
    /// Unseen symbols have probability zero.
    #[default]
    None,
    /// Unseen symbols are emitted with a fixed floor probability.
    Floor { epsilon: f64 },
}

/// How the sequence likelihood enters the phase signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LikelihoodMode {
    /// Forward likelihood `L` of the whole sequence.
    #[default]
    Raw,
    /// Per-symbol geometric mean `L^(1/T)`; does not shrink with sequence length.
    PerSymbol,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering_and_next() {
        assert!(EscalationLevel::Local < EscalationLevel::Intermediate);
        assert_eq!(
            EscalationLevel::Local.next(),
            Some(EscalationLevel::Intermediate)
        );
        assert_eq!(EscalationLevel::Strategic.next(), None);
        assert!(EscalationLevel::Strategic.is_terminal());
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(
            serde_json::to_string(&AdversaryPhase::Reconnaissance).unwrap(),
            "\"reconnaissance\""
        );
        assert_eq!(
            serde_json::to_string(&EscalationPhase::Intervene).unwrap(),
            "\"intervene\""
        );
        let phase: EscalationPhase = serde_json::from_str("\"observe\"").unwrap();
        assert_eq!(phase, EscalationPhase::Observe);
    }

    #[test]
    fn test_bands_are_ordered() {
        let bands = EscalationPhase::BANDS;
        assert!(bands.windows(2).all(|w| w[0] < w[1]));
        assert!(EscalationPhase::Observe < bands[0]);
    }

    #[test]
    fn test_smoothing_policy_yaml() {
        let policy: SmoothingPolicy = serde_yaml::from_str("kind: floor\nepsilon: 0.001").unwrap();
        assert_eq!(policy, SmoothingPolicy::Floor { epsilon: 0.001 });
        let none: SmoothingPolicy = serde_yaml::from_str("kind: none").unwrap();
        assert_eq!(none, SmoothingPolicy::None);
    }

    #[test]
    fn test_likelihood_mode_yaml() {
        let mode: LikelihoodMode = serde_yaml::from_str("per_symbol").unwrap();
        assert_eq!(mode, LikelihoodMode::PerSymbol);
        assert_eq!(LikelihoodMode::default(), LikelihoodMode::Raw);
    }
}
