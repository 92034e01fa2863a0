//! Evidence fragments and the index-addressed ground set.

use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};

/// An atomic piece of evidence produced by the embedding collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    /// Opaque identifier assigned upstream.
    pub id: String,
    /// Fixed-dimension embedding vector.
    pub vector: Vec<f64>,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

impl Fragment {
    pub fn new(id: impl Into<String>, vector: Vec<f64>, confidence: f64) -> Self {
        Self {
            id: id.into(),
            vector,
            confidence,
        }
    }

    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}

/// Ordered, contiguous collection of fragments addressed by index.
///
/// Subsets are always expressed as index lists into this arena; vectors are
/// never copied out or aliased by callers.
#[derive(Debug, Clone, Default)]
pub struct GroundSet {
    fragments: Vec<Fragment>,
    dimension: usize,
}

impl GroundSet {
    /// Build a ground set, rejecting mixed dimensions, non-finite components
    /// and confidences outside `[0, 1]`.
    pub fn new(fragments: Vec<Fragment>) -> DomainResult<Self> {
        let dimension = fragments.first().map_or(0, Fragment::dimension);

        for (idx, fragment) in fragments.iter().enumerate() {
            if fragment.dimension() != dimension {
                return Err(DomainError::InvalidGroundSet(format!(
                    "fragment {idx} ('{}') has dimension {}, expected {dimension}",
                    fragment.id,
                    fragment.dimension()
                )));
            }
            if !(0.0..=1.0).contains(&fragment.confidence) {
                return Err(DomainError::InvalidGroundSet(format!(
                    "fragment {idx} ('{}') has confidence {} outside [0, 1]",
                    fragment.id, fragment.confidence
                )));
            }
            if fragment.vector.iter().any(|v| !v.is_finite()) {
                return Err(DomainError::InvalidGroundSet(format!(
                    "fragment {idx} ('{}') has a non-finite component",
                    fragment.id
                )));
            }
        }

        Ok(Self {
            fragments,
            dimension,
        })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Embedding dimension shared by every fragment (0 when empty).
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn get(&self, index: usize) -> Option<&Fragment> {
        self.fragments.get(index)
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Filter an index list down to valid, distinct positions.
    ///
    /// Out-of-range indices are dropped silently; repeated indices keep their
    /// first occurrence.
    pub fn valid_indices(&self, indices: &[usize]) -> Vec<usize> {
        let mut seen = vec![false; self.fragments.len()];
        let mut valid = Vec::with_capacity(indices.len());
        for &idx in indices {
            if idx < self.fragments.len() && !seen[idx] {
                seen[idx] = true;
                valid.push(idx);
            }
        }
        valid
    }

    /// Indices of the `window` most recently appended fragments, in order.
    ///
    /// A window of 0 selects the whole ground set.
    pub fn recent_indices(&self, window: usize) -> Vec<usize> {
        let len = self.fragments.len();
        let start = if window == 0 { 0 } else { len.saturating_sub(window) };
        (start..len).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> GroundSet {
        GroundSet::new(vec![
            Fragment::new("a", vec![1.0, 0.0], 0.5),
            Fragment::new("b", vec![0.0, 1.0], 0.7),
            Fragment::new("c", vec![1.0, 1.0], 0.9),
        ])
        .unwrap()
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let result = GroundSet::new(vec![
            Fragment::new("a", vec![1.0, 0.0], 0.5),
            Fragment::new("b", vec![0.0, 1.0, 0.0], 0.5),
        ]);
        assert!(matches!(result, Err(DomainError::InvalidGroundSet(_))));
    }

    #[test]
    fn test_confidence_out_of_range_rejected() {
        let result = GroundSet::new(vec![Fragment::new("a", vec![1.0], 1.5)]);
        assert!(matches!(result, Err(DomainError::InvalidGroundSet(_))));
    }

    #[test]
    fn test_non_finite_component_rejected() {
        let result = GroundSet::new(vec![Fragment::new("a", vec![f64::NAN], 0.5)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_valid_indices_drops_out_of_range_and_duplicates() {
        let set = sample();
        assert_eq!(set.valid_indices(&[2, 7, 0, 2, 99, 1]), vec![2, 0, 1]);
        assert!(set.valid_indices(&[]).is_empty());
    }

    #[test]
    fn test_recent_indices() {
        let set = sample();
        assert_eq!(set.recent_indices(2), vec![1, 2]);
        assert_eq!(set.recent_indices(0), vec![0, 1, 2]);
        assert_eq!(set.recent_indices(10), vec![0, 1, 2]);
        assert!(GroundSet::empty().recent_indices(4).is_empty());
    }
}
