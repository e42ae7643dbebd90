//! Sky background estimation.
//!
//! The source detector needs a background level and noise figure to set its
//! significance threshold. Stars bias a plain mean/std upward, so the estimate
//! here is an iterative sigma clip: compute the median and standard deviation,
//! drop pixels further than `clip_sigma` standard deviations from the median,
//! repeat until nothing more is clipped or the iteration cap is hit.

use finder_types::{median, StatsError, StatsScan};
use log::debug;
use ndarray::ArrayView2;
use thiserror::Error;

/// Errors from background estimation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackgroundError {
    #[error("Clip threshold must be finite and positive, got {0}")]
    InvalidClipSigma(f64),
    #[error("Background statistics unavailable: {0}")]
    Stats(#[from] StatsError),
}

/// Background level and noise of a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackgroundEstimate {
    /// Median of the unclipped pixels
    pub median: f64,
    /// Population standard deviation of the unclipped pixels
    pub std_dev: f64,
    /// Number of pixels that survived clipping
    pub pixels_used: usize,
}

/// Estimate the sky background with iterative sigma clipping.
///
/// Non-finite pixels are ignored. `max_iterations == 0` returns the unclipped
/// statistics.
///
/// # Errors
/// * `BackgroundError::InvalidClipSigma` - `clip_sigma` is not a positive finite number
/// * `BackgroundError::Stats` - the frame has no finite pixels
pub fn estimate_background(
    flux: ArrayView2<f64>,
    clip_sigma: f64,
    max_iterations: usize,
) -> Result<BackgroundEstimate, BackgroundError> {
    if !(clip_sigma.is_finite() && clip_sigma > 0.0) {
        return Err(BackgroundError::InvalidClipSigma(clip_sigma));
    }

    let mut kept: Vec<f64> = flux.iter().copied().filter(|v| v.is_finite()).collect();
    let mut estimate = summarize(&mut kept)?;

    for iteration in 0..max_iterations {
        let low = estimate.median - clip_sigma * estimate.std_dev;
        let high = estimate.median + clip_sigma * estimate.std_dev;
        let before = kept.len();
        kept.retain(|&v| v >= low && v <= high);

        if kept.len() == before || kept.is_empty() {
            debug!(
                "background converged after {} iterations ({} pixels)",
                iteration, before
            );
            break;
        }
        estimate = summarize(&mut kept)?;
    }

    Ok(estimate)
}

fn summarize(values: &mut [f64]) -> Result<BackgroundEstimate, StatsError> {
    let scan = StatsScan::new(values);
    let std_dev = scan.std_dev()?;
    let pixels_used = scan.count();
    let median = median(values)?;
    Ok(BackgroundEstimate {
        median,
        std_dev,
        pixels_used,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;
    use test_helpers::{inject_point, normal_field};

    #[test]
    fn test_flat_frame() {
        let flat = Array2::from_elem((10, 10), 42.0);
        let estimate = estimate_background(flat.view(), 3.0, 5).unwrap();
        assert_eq!(estimate.median, 42.0);
        assert_eq!(estimate.std_dev, 0.0);
        assert_eq!(estimate.pixels_used, 100);
    }

    #[test]
    fn test_clipping_rejects_stars() {
        let mut frame = normal_field((100, 100), 200.0, 5.0, 3);
        for i in 0..10 {
            inject_point(&mut frame, 10 * i + 5, 50, 50_000.0);
        }

        let unclipped = estimate_background(frame.view(), 3.0, 0).unwrap();
        let clipped = estimate_background(frame.view(), 3.0, 10).unwrap();

        assert!(unclipped.std_dev > 100.0);
        assert_relative_eq!(clipped.median, 200.0, epsilon = 0.5);
        assert_relative_eq!(clipped.std_dev, 5.0, epsilon = 0.5);
        assert!(clipped.pixels_used <= 9990);
    }

    #[test]
    fn test_nan_pixels_ignored() {
        let mut frame = Array2::from_elem((4, 4), 1.0);
        frame[[0, 0]] = f64::NAN;
        let estimate = estimate_background(frame.view(), 3.0, 3).unwrap();
        assert_eq!(estimate.pixels_used, 15);
        assert_eq!(estimate.median, 1.0);
    }

    #[test]
    fn test_invalid_inputs() {
        let frame = Array2::from_elem((2, 2), f64::NAN);
        assert!(matches!(
            estimate_background(frame.view(), 3.0, 1),
            Err(BackgroundError::Stats(StatsError::NoData { .. }))
        ));
        assert_eq!(
            estimate_background(frame.view(), 0.0, 1),
            Err(BackgroundError::InvalidClipSigma(0.0))
        );
    }
}
