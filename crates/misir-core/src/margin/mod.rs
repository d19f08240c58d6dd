//! Assignment Margin Service (C3).
//!
//! Decides whether a new signal is a confident, unambiguous match for its
//! nearest subspace, and therefore whether it should be allowed to move
//! that subspace's centroid. The margin is the gap between the nearest and
//! second-nearest cosine distances among a user's subspace centroids —
//! a small gap means the new point sits ambiguously between two clusters
//! and should not be allowed to drag either one around.

use serde::{Deserialize, Serialize};

/// Local copy so this module stays usable without the `embeddings` feature.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Candidate subspace centroid considered during margin calculation.
#[derive(Debug, Clone)]
pub struct CentroidCandidate {
    pub subspace_id: i64,
    pub centroid: Vec<f32>,
}

/// Outcome of a margin calculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginResult {
    pub nearest_subspace_id: Option<i64>,
    pub nearest_distance: f32,
    pub second_distance: f32,
    pub margin: f32,
    pub updates_centroid: bool,
}

impl MarginResult {
    /// A margin result is ambiguous when it falls below the threshold used
    /// to produce it but still resolved to a nearest subspace — i.e. there
    /// was a genuine two-way (or more) contest that the new signal didn't
    /// clearly settle.
    pub fn is_ambiguous(&self, threshold: f32) -> bool {
        self.nearest_subspace_id.is_some() && self.margin < threshold
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Computes the assignment margin for `signal_vector` against a user's
/// subspace centroids.
///
/// - Zero candidates: bootstrap case — nothing to disambiguate against, so
///   the signal is free to seed a brand-new subspace centroid
///   (`nearest_subspace_id = None`, `updates_centroid = true`).
/// - One candidate: same bootstrap behavior — a lone subspace has no
///   competitor, so any signal assigned to it should be allowed to update it.
/// - Two or more candidates: sort by cosine distance ascending, margin is
///   the gap between the first two, gated against `threshold`.
pub fn compute_margin(
    signal_vector: &[f32],
    candidates: &[CentroidCandidate],
    threshold: f32,
) -> MarginResult {
    if candidates.is_empty() {
        return MarginResult {
            nearest_subspace_id: None,
            nearest_distance: 1.0,
            second_distance: 1.0,
            margin: 1.0,
            updates_centroid: true,
        };
    }

    if candidates.len() == 1 {
        return MarginResult {
            nearest_subspace_id: Some(candidates[0].subspace_id),
            nearest_distance: 1.0,
            second_distance: 1.0,
            margin: 1.0,
            updates_centroid: true,
        };
    }

    let mut distances: Vec<(i64, f32)> = candidates
        .iter()
        .map(|c| (c.subspace_id, cosine_distance(signal_vector, &c.centroid)))
        .collect();
    distances.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    let (nearest_id, d1) = distances[0];
    let d2 = distances[1].1;
    let margin = d2 - d1;

    MarginResult {
        nearest_subspace_id: Some(nearest_id),
        nearest_distance: d1,
        second_distance: d2,
        margin,
        updates_centroid: margin >= threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(v: Vec<f32>) -> Vec<f32> {
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        v.iter().map(|x| x / norm).collect()
    }

    #[test]
    fn bootstrap_with_no_candidates() {
        let result = compute_margin(&unit(vec![1.0, 0.0]), &[], 0.05);
        assert!(result.nearest_subspace_id.is_none());
        assert!(result.updates_centroid);
        assert_eq!(result.margin, 1.0);
    }

    #[test]
    fn bootstrap_with_single_candidate() {
        let candidates = vec![CentroidCandidate { subspace_id: 1, centroid: unit(vec![0.0, 1.0]) }];
        let result = compute_margin(&unit(vec![1.0, 0.0]), &candidates, 0.05);
        assert_eq!(result.nearest_subspace_id, Some(1));
        assert!(result.updates_centroid);
    }

    #[test]
    fn clear_winner_updates_centroid() {
        let candidates = vec![
            CentroidCandidate { subspace_id: 1, centroid: unit(vec![1.0, 0.0]) },
            CentroidCandidate { subspace_id: 2, centroid: unit(vec![0.0, 1.0]) },
        ];
        let result = compute_margin(&unit(vec![0.99, 0.01]), &candidates, 0.05);
        assert_eq!(result.nearest_subspace_id, Some(1));
        assert!(result.updates_centroid);
        assert!(result.margin > 0.05);
    }

    #[test]
    fn ambiguous_midpoint_blocks_update() {
        let candidates = vec![
            CentroidCandidate { subspace_id: 1, centroid: unit(vec![1.0, 0.0]) },
            CentroidCandidate { subspace_id: 2, centroid: unit(vec![0.0, 1.0]) },
        ];
        let midpoint = unit(vec![1.0, 1.0]);
        let result = compute_margin(&midpoint, &candidates, 0.05);
        assert!(!result.updates_centroid);
        assert!(result.is_ambiguous(0.05));
    }

    #[test]
    fn margin_never_negative_after_sort() {
        let candidates = vec![
            CentroidCandidate { subspace_id: 1, centroid: unit(vec![0.2, 0.8]) },
            CentroidCandidate { subspace_id: 2, centroid: unit(vec![0.9, 0.1]) },
            CentroidCandidate { subspace_id: 3, centroid: unit(vec![0.5, 0.5]) },
        ];
        let result = compute_margin(&unit(vec![0.3, 0.7]), &candidates, 0.05);
        assert!(result.margin >= 0.0);
    }

    use proptest::prelude::*;

    fn arb_unit_vec(dim: usize) -> impl Strategy<Value = Vec<f32>> {
        proptest::collection::vec(-1.0f32..1.0, dim).prop_filter_map("non-zero", |v| {
            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 1e-6 {
                Some(v.iter().map(|x| x / norm).collect())
            } else {
                None
            }
        })
    }

    proptest! {
        /// The gate is a pure bit-equality against the threshold: it never
        /// drifts from `margin >= threshold`, across arbitrary non-degenerate
        /// 2-or-more-candidate inputs.
        #[test]
        fn margin_gate_matches_threshold_comparison(
            signal in arb_unit_vec(4),
            a in arb_unit_vec(4),
            b in arb_unit_vec(4),
            c in arb_unit_vec(4),
            threshold in 0.0f32..1.0,
        ) {
            let candidates = vec![
                CentroidCandidate { subspace_id: 1, centroid: a },
                CentroidCandidate { subspace_id: 2, centroid: b },
                CentroidCandidate { subspace_id: 3, centroid: c },
            ];
            let result = compute_margin(&signal, &candidates, threshold);
            prop_assert_eq!(result.updates_centroid, result.margin >= threshold);
            prop_assert!(result.margin >= -1e-5);
        }

        /// Bootstrap cases (0 or 1 candidate) always report the sentinel
        /// margin and always gate the update open, regardless of the
        /// threshold or the signal itself.
        #[test]
        fn bootstrap_cases_always_update(signal in arb_unit_vec(4), threshold in 0.0f32..1.0) {
            let empty = compute_margin(&signal, &[], threshold);
            prop_assert!(empty.updates_centroid);
            prop_assert_eq!(empty.margin, 1.0);

            let one = compute_margin(&signal, &[CentroidCandidate { subspace_id: 7, centroid: signal.clone() }], threshold);
            prop_assert!(one.updates_centroid);
            prop_assert_eq!(one.nearest_subspace_id, Some(7));
        }
    }
}
