//! Greedy nearest-neighbour assignment of predicted to detected positions.
//!
//! Every pair closer than `max_distance` is a candidate. Candidates are taken in
//! order of increasing distance, with ties broken by predicted index and then
//! detected index, and a candidate is accepted only when neither of its
//! points has been used yet. This is the same as repeatedly picking the
//! globally closest remaining pair, and yields an at-most-one-to-one
//! assignment.
//!
//! Greedy selection is not a minimum total distance assignment. With catalog
//! objects well separated relative to `max_distance` the two agree.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::ProjectedPosition;
use crate::image_proc::detection::Detection;

/// Errors raised by the matcher.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("Maximum match distance must be finite and non-negative, got {0}")]
    InvalidMaxDistance(f64),
}

/// A predicted position paired with a detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchPair {
    /// Index into the predicted positions
    pub predicted_index: usize,
    /// Index into the detections
    pub detected_index: usize,
    /// Pixel distance between the two
    pub distance: f64,
}

/// Match projected catalog positions against detections.
///
/// # Arguments
/// * `predicted` - Catalog positions projected into the frame
/// * `detected` - Detections from the same frame
/// * `max_distance` - Separation in pixels a pair must stay strictly below
///
/// # Returns
/// Pairs ordered by ascending distance (the order in which they were
/// selected). Empty inputs give an empty result.
pub fn match_positions(
    predicted: &[ProjectedPosition],
    detected: &[Detection],
    max_distance: f64,
) -> Result<Vec<MatchPair>, MatchError> {
    let predicted: Vec<Vector2<f64>> = predicted.iter().map(|p| p.position()).collect();
    let detected: Vec<Vector2<f64>> = detected.iter().map(|d| d.position()).collect();
    match_points(&predicted, &detected, max_distance)
}

/// Greedy matching over raw `(row, col)` points.
///
/// Time complexity: O(n × m × log(n × m)) for n predicted and m detected
/// points.
pub fn match_points(
    predicted: &[Vector2<f64>],
    detected: &[Vector2<f64>],
    max_distance: f64,
) -> Result<Vec<MatchPair>, MatchError> {
    if !(max_distance.is_finite() && max_distance >= 0.0) {
        return Err(MatchError::InvalidMaxDistance(max_distance));
    }

    let mut candidates = Vec::new();
    for (i, p) in predicted.iter().enumerate() {
        for (j, d) in detected.iter().enumerate() {
            let distance = (p - d).norm();
            if distance < max_distance {
                candidates.push(MatchPair {
                    predicted_index: i,
                    detected_index: j,
                    distance,
                });
            }
        }
    }

    candidates.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then(a.predicted_index.cmp(&b.predicted_index))
            .then(a.detected_index.cmp(&b.detected_index))
    });

    let mut predicted_used = vec![false; predicted.len()];
    let mut detected_used = vec![false; detected.len()];
    let mut pairs = Vec::with_capacity(predicted.len().min(detected.len()));

    for candidate in candidates {
        if predicted_used[candidate.predicted_index] || detected_used[candidate.detected_index] {
            continue;
        }
        predicted_used[candidate.predicted_index] = true;
        detected_used[candidate.detected_index] = true;
        pairs.push(candidate);
    }

    Ok(pairs)
}
