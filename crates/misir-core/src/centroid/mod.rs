//! Online Semantic Centroid Learning (C4).
//!
//! Pure functions over vectors and scalars — no I/O, no store access. The
//! assignment layer decides *whether* a centroid should move (via
//! [`crate::margin`]); this module computes *what it moves to* and the
//! drift/velocity/confidence telemetry that comes along for the ride.

use serde::{Deserialize, Serialize};

/// Local copy so this module stays usable without the `embeddings` feature
/// (the embedding model is a separate concern from the pure centroid math).
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Exponential moving average centroid update:
/// `new = normalize((1 - alpha) * prev + alpha * signal)`.
///
/// `alpha` is the subspace's learning rate, expected in `[0, 1]`.
pub fn update_centroid(prev_centroid: &[f32], new_signal_vector: &[f32], alpha: f32) -> Vec<f32> {
    debug_assert_eq!(prev_centroid.len(), new_signal_vector.len());
    let blended: Vec<f32> = prev_centroid
        .iter()
        .zip(new_signal_vector.iter())
        .map(|(p, s)| (1.0 - alpha) * p + alpha * s)
        .collect();
    normalize(&blended)
}

pub(crate) fn normalize(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

/// Magnitude of semantic drift between two centroid states, `1 - cosine_sim`,
/// clamped to `[0, 1]` (cosine similarity can go negative for opposing
/// vectors, which would otherwise push drift past its documented range).
pub fn calculate_drift(prev_centroid: &[f32], new_centroid: &[f32]) -> f32 {
    (1.0 - cosine_similarity(prev_centroid, new_centroid)).clamp(0.0, 1.0)
}

/// Whether a drift magnitude clears the logging threshold.
pub fn should_log_drift(drift: f32, threshold: f32) -> bool {
    drift >= threshold
}

/// Centroid velocity: Euclidean displacement divided by elapsed time,
/// floored at one second to avoid a division blowup on near-simultaneous
/// updates.
pub fn calculate_velocity(
    prev_centroid: &[f32],
    new_centroid: &[f32],
    time_delta_seconds: f32,
) -> (Vec<f32>, f32) {
    let displacement: Vec<f32> = new_centroid
        .iter()
        .zip(prev_centroid.iter())
        .map(|(n, p)| n - p)
        .collect();
    let distance = displacement.iter().map(|x| x * x).sum::<f32>().sqrt();
    let velocity = distance / time_delta_seconds.max(1.0);
    (displacement, velocity)
}

/// Mean cosine similarity of a batch of signal vectors to a centroid,
/// clamped to `[0, 1]`. Zero for an empty batch or an all-zero-norm
/// centroid (nothing to compare against).
pub fn calculate_batch_coherence(embeddings: &[Vec<f32>], centroid: &[f32]) -> f32 {
    if embeddings.is_empty() || centroid.iter().all(|x| *x == 0.0) {
        return 0.0;
    }
    let sum: f32 = embeddings.iter().map(|e| cosine_similarity(e, centroid)).sum();
    (sum / embeddings.len() as f32).clamp(0.0, 1.0)
}

/// EMA-updates a subspace's confidence score from a freshly measured batch
/// coherence value.
pub fn update_confidence(current: f32, batch_coherence: f32, learning_rate: f32) -> f32 {
    ((1.0 - learning_rate) * current + learning_rate * batch_coherence).clamp(0.0, 1.0)
}

pub const DEFAULT_CONFIDENCE_LEARNING_RATE: f32 = 0.05;

/// A computed drift measurement ready to persist as a [`crate::model::DriftEvent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftMeasurement {
    pub drift_magnitude: f32,
    pub should_log: bool,
}

/// Runs the drift calculation and logging gate together, as the store layer
/// wants them: calculate once, then decide whether it's worth a row.
pub fn measure_drift(prev_centroid: &[f32], new_centroid: &[f32], threshold: f32) -> DriftMeasurement {
    let drift_magnitude = calculate_drift(prev_centroid, new_centroid);
    DriftMeasurement { should_log: should_log_drift(drift_magnitude, threshold), drift_magnitude }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(v: Vec<f32>) -> Vec<f32> {
        normalize(&v)
    }

    #[test]
    fn update_centroid_is_unit_norm() {
        let prev = unit(vec![1.0, 0.0]);
        let signal = unit(vec![0.0, 1.0]);
        let updated = update_centroid(&prev, &signal, 0.1);
        let norm = updated.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn update_centroid_moves_toward_signal() {
        let prev = unit(vec![1.0, 0.0]);
        let signal = unit(vec![0.0, 1.0]);
        let updated = update_centroid(&prev, &signal, 0.5);
        assert!(updated[1] > prev[1]);
    }

    #[test]
    fn drift_is_zero_for_identical_centroids() {
        let c = unit(vec![0.3, 0.7, 0.1]);
        assert!(calculate_drift(&c, &c).abs() < 1e-6);
    }

    #[test]
    fn drift_never_negative() {
        let a = unit(vec![1.0, 0.0]);
        assert!(calculate_drift(&a, &a) >= 0.0);
    }

    #[test]
    fn velocity_floors_time_delta_at_one_second() {
        let prev = vec![0.0, 0.0];
        let new = vec![3.0, 4.0];
        let (_, velocity) = calculate_velocity(&prev, &new, 0.1);
        assert_eq!(velocity, 5.0);
    }

    #[test]
    fn batch_coherence_empty_is_zero() {
        assert_eq!(calculate_batch_coherence(&[], &unit(vec![1.0, 0.0])), 0.0);
    }

    #[test]
    fn confidence_update_is_bounded() {
        let updated = update_confidence(1.5, 2.0, 0.05);
        assert!(updated <= 1.0);
        let updated = update_confidence(-1.0, -1.0, 0.05);
        assert!(updated >= 0.0);
    }

    #[test]
    fn confidence_ema_moves_toward_coherence() {
        let updated = update_confidence(0.5, 0.9, 0.05);
        assert!(updated > 0.5);
        assert!(updated < 0.9);
    }

    use proptest::prelude::*;

    proptest! {
        /// `update_centroid` always returns a unit vector, for any
        /// non-degenerate previous/signal pair and any learning rate in range.
        #[test]
        fn update_centroid_always_unit_norm(
            prev in proptest::collection::vec(-1.0f32..1.0, 6).prop_filter("non-zero", |v| v.iter().any(|x| x.abs() > 1e-3)),
            signal in proptest::collection::vec(-1.0f32..1.0, 6).prop_filter("non-zero", |v| v.iter().any(|x| x.abs() > 1e-3)),
            alpha in 0.0f32..1.0,
        ) {
            let prev = normalize(&prev);
            let signal = normalize(&signal);
            let updated = update_centroid(&prev, &signal, alpha);
            let norm = updated.iter().map(|x| x * x).sum::<f32>().sqrt();
            prop_assert!((norm - 1.0).abs() < 1e-4);
        }

        /// Confidence is always clamped to `[0, 1]`, regardless of how far
        /// out of range the inputs are.
        #[test]
        fn confidence_always_bounded(current in -5.0f32..5.0, coherence in -5.0f32..5.0, rate in 0.0f32..1.0) {
            let updated = update_confidence(current, coherence, rate);
            prop_assert!((0.0..=1.0).contains(&updated));
        }

        /// Drift magnitude is never negative, for any pair of (possibly
        /// non-unit) vectors.
        #[test]
        fn drift_never_negative_arbitrary(
            a in proptest::collection::vec(-1.0f32..1.0, 5),
            b in proptest::collection::vec(-1.0f32..1.0, 5),
        ) {
            prop_assert!(calculate_drift(&a, &b) >= 0.0);
        }
    }
}
