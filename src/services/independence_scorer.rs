//! Matroid-rank independence scoring over embedding vectors.
//!
//! The rank of a fragment subset is the dimension of the space spanned by its
//! vectors. Rank is a matroid rank function, which is what makes the greedy
//! basis selection below optimal under a cardinality constraint.

use std::cmp::Ordering;

use tracing::error;

use crate::domain::models::GroundSet;

/// Canonical numerical-rank tolerance.
pub const DEFAULT_RANK_TOLERANCE: f64 = 1e-6;

/// Scores non-redundancy of fragment subsets of a fixed ground set.
///
/// Complexity of [`IndependenceScorer::rank`] is O(d·k²) for dimension `d`
/// and subset size `k`; keep it off the fast path.
#[derive(Debug, Clone)]
pub struct IndependenceScorer {
    ground_set: GroundSet,
    tolerance: f64,
}

impl IndependenceScorer {
    pub fn new(ground_set: GroundSet) -> Self {
        Self::with_tolerance(ground_set, DEFAULT_RANK_TOLERANCE)
    }

    pub fn with_tolerance(ground_set: GroundSet, tolerance: f64) -> Self {
        Self {
            ground_set,
            tolerance: tolerance.abs(),
        }
    }

    pub fn ground_set(&self) -> &GroundSet {
        &self.ground_set
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Numerical rank of the vectors selected by `subset`.
    ///
    /// Out-of-range and repeated indices are ignored; an empty selection has rank 0.
    pub fn rank(&self, subset: &[usize]) -> usize {
        let indices = self.ground_set.valid_indices(subset);
        if indices.is_empty() || self.ground_set.dimension() == 0 {
            return 0;
        }

        let rows: Vec<Vec<f64>> = indices
            .iter()
            .filter_map(|&idx| self.ground_set.get(idx))
            .map(|fragment| fragment.vector.clone())
            .collect();

        numerical_rank(rows, self.tolerance)
    }

    /// Rank gained by adding `new_index` to `existing`. Always 0 or 1.
    pub fn rank_delta(&self, existing: &[usize], new_index: usize) -> usize {
        if new_index >= self.ground_set.len() {
            return 0;
        }

        let before = self.rank(existing);
        let mut extended = Vec::with_capacity(existing.len() + 1);
        extended.extend_from_slice(existing);
        extended.push(new_index);
        let after = self.rank(&extended);

        let delta = after.saturating_sub(before);
        debug_assert!(delta <= 1, "single insertion raised rank by {delta}");
        if delta > 1 {
            error!(
                before,
                after,
                new_index,
                "rank increased by more than one for a single insertion"
            );
            return 1;
        }
        delta
    }

    /// Greedy matroid basis selection by descending confidence.
    ///
    /// Candidates are visited in a stable confidence order (ties keep their
    /// ground-set order) and accepted only when they raise the rank of the
    /// running selection.
    pub fn greedy_basis_selection(&self, max_size: usize) -> Vec<usize> {
        let fragments = self.ground_set.fragments();
        let mut candidates: Vec<usize> = (0..fragments.len()).collect();
        candidates.sort_by(|&a, &b| {
            fragments[b]
                .confidence
                .partial_cmp(&fragments[a].confidence)
                .unwrap_or(Ordering::Equal)
        });

        let mut selection = Vec::with_capacity(max_size.min(fragments.len()));
        for candidate in candidates {
            if selection.len() >= max_size {
                break;
            }
            if self.rank_delta(&selection, candidate) > 0 {
                selection.push(candidate);
            }
        }
        selection
    }
}

/// Row-echelon rank with partial pivoting.
///
/// A pivot whose magnitude does not exceed `tolerance` is treated as zero.
fn numerical_rank(mut rows: Vec<Vec<f64>>, tolerance: f64) -> usize {
    let row_count = rows.len();
    let col_count = rows.first().map_or(0, Vec::len);

    let mut rank = 0;
    for col in 0..col_count {
        if rank == row_count {
            break;
        }

        let mut pivot = rank;
        for row in (rank + 1)..row_count {
            if rows[row][col].abs() > rows[pivot][col].abs() {
                pivot = row;
            }
        }
        if rows[pivot][col].abs() <= tolerance {
            continue;
        }

        rows.swap(rank, pivot);
        let pivot_row = rows[rank].clone();
        for row in rows.iter_mut().skip(rank + 1) {
            let factor = row[col] / pivot_row[col];
            if factor == 0.0 {
                continue;
            }
            for (value, pivot_value) in row.iter_mut().zip(&pivot_row).skip(col) {
                *value -= factor * pivot_value;
            }
        }
        rank += 1;
    }
    rank
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Fragment;

    fn worked_example() -> IndependenceScorer {
        let ground_set = GroundSet::new(vec![
            Fragment::new("f0", vec![1.0, 0.0, 0.0], 0.9),
            Fragment::new("f1", vec![0.0, 1.0, 0.0], 0.8),
            Fragment::new("f2", vec![1.0, 1.0, 0.0], 0.7),
            Fragment::new("f3", vec![0.0, 0.0, 1.0], 0.95),
        ])
        .unwrap();
        IndependenceScorer::new(ground_set)
    }

    #[test]
    fn test_rank_of_worked_example() {
        let scorer = worked_example();
        assert_eq!(scorer.rank(&[0, 1, 2, 3]), 3);
        assert_eq!(scorer.rank(&[0, 1, 2]), 2);
        assert_eq!(scorer.rank(&[2]), 1);
    }

    #[test]
    fn test_rank_of_empty_subset_is_zero() {
        let scorer = worked_example();
        assert_eq!(scorer.rank(&[]), 0);
        assert_eq!(IndependenceScorer::new(GroundSet::empty()).rank(&[0, 1]), 0);
    }

    #[test]
    fn test_out_of_range_indices_are_dropped() {
        let scorer = worked_example();
        assert_eq!(scorer.rank(&[0, 42, 1, 1000]), 2);
        assert_eq!(scorer.rank(&[42]), 0);
    }

    #[test]
    fn test_duplicate_indices_do_not_add_rank() {
        let scorer = worked_example();
        assert_eq!(scorer.rank(&[3, 3, 3]), 1);
        assert_eq!(scorer.rank_delta(&[3], 3), 0);
    }

    #[test]
    fn test_rank_delta() {
        let scorer = worked_example();
        assert_eq!(scorer.rank_delta(&[0, 1], 2), 0);
        assert_eq!(scorer.rank_delta(&[0, 1], 3), 1);
        assert_eq!(scorer.rank_delta(&[], 0), 1);
        assert_eq!(scorer.rank_delta(&[0], 99), 0);
    }

    #[test]
    fn test_greedy_basis_selection_worked_example() {
        let scorer = worked_example();
        assert_eq!(scorer.greedy_basis_selection(3), vec![3, 0, 1]);
        assert_eq!(scorer.greedy_basis_selection(10), vec![3, 0, 1]);
        assert_eq!(scorer.greedy_basis_selection(1), vec![3]);
        assert!(scorer.greedy_basis_selection(0).is_empty());
    }

    #[test]
    fn test_greedy_ties_preserve_original_order() {
        let ground_set = GroundSet::new(vec![
            Fragment::new("a", vec![1.0, 0.0], 0.5),
            Fragment::new("b", vec![0.0, 1.0], 0.5),
            Fragment::new("c", vec![1.0, 1.0], 0.5),
        ])
        .unwrap();
        let scorer = IndependenceScorer::new(ground_set);
        assert_eq!(scorer.greedy_basis_selection(3), vec![0, 1]);
    }

    #[test]
    fn test_tolerance_absorbs_noise() {
        let ground_set = GroundSet::new(vec![
            Fragment::new("a", vec![1.0, 0.0], 0.5),
            Fragment::new("b", vec![1.0, 1e-9], 0.5),
        ])
        .unwrap();
        assert_eq!(IndependenceScorer::new(ground_set.clone()).rank(&[0, 1]), 1);
        assert_eq!(
            IndependenceScorer::with_tolerance(ground_set, 1e-12).rank(&[0, 1]),
            2
        );
    }

    #[test]
    fn test_rank_bounded_by_dimension() {
        let ground_set = GroundSet::new(
            (0..6)
                .map(|i| Fragment::new(format!("f{i}"), vec![f64::from(i), 1.0], 0.5))
                .collect(),
        )
        .unwrap();
        let scorer = IndependenceScorer::new(ground_set);
        assert_eq!(scorer.rank(&[0, 1, 2, 3, 4, 5]), 2);
    }

    #[test]
    fn test_zero_vectors_have_rank_zero() {
        let ground_set = GroundSet::new(vec![
            Fragment::new("z0", vec![0.0, 0.0, 0.0], 0.9),
            Fragment::new("z1", vec![0.0, 0.0, 0.0], 0.1),
        ])
        .unwrap();
        let scorer = IndependenceScorer::new(ground_set);
        assert_eq!(scorer.rank(&[0, 1]), 0);
        assert!(scorer.greedy_basis_selection(2).is_empty());
    }
}
