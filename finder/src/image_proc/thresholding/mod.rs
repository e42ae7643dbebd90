//! Thresholding policies for binarizing flux arrays.
//!
//! Offset registration compares two arrays through their bright pixels
//! rather than raw values, so each array is binarized independently with a
//! `ThresholdPolicy`:
//!
//! - **Percentile**: keep pixels at or above the p-th percentile of the array
//! - **Statistical**: keep pixels at or above `mean + k * std`
//!
//! Non-finite pixels are never kept.

use finder_types::{percentile, StatsError, StatsScan};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while validating or applying a threshold policy.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ThresholdError {
    #[error("Percentile must be within [0, 100], got {0}")]
    InvalidPercentile(f64),
    #[error("Sigma multiplier must be finite, got {0}")]
    InvalidSigma(f64),
    #[error("Cannot compute threshold: {0}")]
    Stats(#[from] StatsError),
}

/// How to pick the cut level for binarization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThresholdPolicy {
    /// Keep pixels `>=` the given percentile (0..=100) of the array
    Percentile { percentile: f64 },
    /// Keep pixels `>=` mean + `k` standard deviations
    Statistical { k: f64 },
}

// Must stay selective on mostly-zero arrays such as detection tallies
impl Default for ThresholdPolicy {
    fn default() -> Self {
        ThresholdPolicy::Statistical { k: 1.0 }
    }
}

impl ThresholdPolicy {
    /// Check the policy parameters without touching any data.
    pub fn validate(&self) -> Result<(), ThresholdError> {
        match *self {
            ThresholdPolicy::Percentile { percentile } => {
                if (0.0..=100.0).contains(&percentile) {
                    Ok(())
                } else {
                    Err(ThresholdError::InvalidPercentile(percentile))
                }
            }
            ThresholdPolicy::Statistical { k } => {
                if k.is_finite() {
                    Ok(())
                } else {
                    Err(ThresholdError::InvalidSigma(k))
                }
            }
        }
    }

    /// The cut level this policy selects for `image`.
    pub fn threshold_value(&self, image: ArrayView2<f64>) -> Result<f64, ThresholdError> {
        self.validate()?;
        match *self {
            ThresholdPolicy::Percentile { percentile: p } => {
                let mut values: Vec<f64> = image.iter().copied().collect();
                Ok(percentile(&mut values, p)?)
            }
            ThresholdPolicy::Statistical { k } => {
                let scan = StatsScan::from_iter_values(image.iter().copied());
                Ok(scan.mean()? + k * scan.std_dev()?)
            }
        }
    }

    /// Binarize `image` according to this policy.
    pub fn binarize(&self, image: ArrayView2<f64>) -> Result<Array2<bool>, ThresholdError> {
        let cut = self.threshold_value(image)?;
        Ok(apply_threshold(image, cut))
    }
}

/// Apply a fixed threshold and return a binary mask.
///
/// A pixel is `true` when it is finite and `>= threshold`.
pub fn apply_threshold(image: ArrayView2<f64>, threshold: f64) -> Array2<bool> {
    image.mapv(|v| v.is_finite() && v >= threshold)
}
