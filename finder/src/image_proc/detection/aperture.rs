//! Iterative aperture source extraction.
//!
//! The detector works on a background-subtracted copy of the frame and
//! repeatedly pulls out the brightest remaining pixel:
//!
//! 1. Subtract the background median; non-finite pixels become zero
//! 2. Zero a border `ignore_margins` pixels wide on every edge
//! 3. Find the global maximum (first occurrence in row-major order)
//! 4. Stop if it is not positive or is below `significance * background_std`
//! 5. Sum the pixels within `aperture_radius` to get `flux_sum`
//! 6. Zero everything within `blank_radius` so the source wings are not
//!    picked up again, then go back to 3
//!
//! At most `max_count` sources are extracted. The caller's array is never
//! modified.

use log::{debug, trace};
use nalgebra::Vector2;
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use super::{DetectionConfig, DetectionError};
use crate::image_proc::aabb::AABB;

/// A point source found by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Row of the peak pixel
    pub row: usize,
    /// Column of the peak pixel
    pub col: usize,
    /// Aperture radius used for `flux_sum`
    pub aperture_radius: f64,
    /// Background-subtracted flux inside the aperture
    pub flux_sum: f64,
    /// 0-based extraction order: the `n`-th peak removed has rank `n`
    pub rank: usize,
}

impl Detection {
    /// Peak position as a `(row, col)` vector.
    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.row as f64, self.col as f64)
    }
}

/// Iterative global-maximum source detector.
///
/// # Examples
/// ```rust
/// use finder::image_proc::detection::{DetectionConfig, SourceDetector};
/// use ndarray::Array2;
///
/// let mut frame = Array2::<f64>::zeros((20, 20));
/// frame[[10, 10]] = 50.0;
///
/// let config = DetectionConfig {
///     background_std: 1.0,
///     significance: 5.0,
///     aperture_radius: 2.0,
///     blank_radius: 3.0,
///     ..DetectionConfig::default()
/// };
/// let detections = SourceDetector::new(config).unwrap().detect(frame.view());
/// assert_eq!(detections.len(), 1);
/// assert_eq!((detections[0].row, detections[0].col), (10, 10));
/// ```
#[derive(Debug, Clone)]
pub struct SourceDetector {
    config: DetectionConfig,
}

impl SourceDetector {
    /// Create a detector, validating the configuration up front.
    pub fn new(config: DetectionConfig) -> Result<Self, DetectionError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Extract sources from `flux`.
    ///
    /// Returns an empty list when nothing clears the threshold. Detections
    /// come back in non-increasing `flux_sum` order; sources with equal flux
    /// keep their extraction order. `rank` records the extraction order, so
    /// a faint peak found early keeps its low rank even when a broad source
    /// with a larger aperture sum is listed ahead of it.
    pub fn detect(&self, flux: ArrayView2<f64>) -> Vec<Detection> {
        let config = &self.config;
        let mut work = working_copy(flux, config.background_median, config.ignore_margins);
        let threshold = config.threshold();

        let mut detections: Vec<Detection> = Vec::new();
        while detections.len() < config.max_count {
            let Some((row, col, peak)) = find_peak(work.view()) else {
                break;
            };
            if peak <= 0.0 || peak < threshold {
                trace!(
                    "peak {:.3} at ({}, {}) below threshold {:.3}",
                    peak,
                    row,
                    col,
                    threshold
                );
                break;
            }

            let flux_sum = aperture_sum(work.view(), row, col, config.aperture_radius);
            detections.push(Detection {
                row,
                col,
                aperture_radius: config.aperture_radius,
                flux_sum,
                rank: detections.len(),
            });
            blank_disc(&mut work, row, col, config.blank_radius);
        }

        detections.sort_by(|a, b| b.flux_sum.total_cmp(&a.flux_sum));

        debug!(
            "detected {} sources (threshold {:.3}, max {})",
            detections.len(),
            threshold,
            config.max_count
        );
        detections
    }
}

/// One-shot detection with validation.
pub fn detect_sources(
    flux: ArrayView2<f64>,
    config: DetectionConfig,
) -> Result<Vec<Detection>, DetectionError> {
    Ok(SourceDetector::new(config)?.detect(flux))
}

/// Sum of pixels within `radius` (Euclidean, inclusive) of `(row, col)`.
///
/// Pixels outside the array contribute nothing.
pub fn aperture_sum(image: ArrayView2<f64>, row: usize, col: usize, radius: f64) -> f64 {
    let Some(window) = AABB::around(row, col, radius, image.dim()) else {
        return 0.0;
    };
    let radius_sq = radius * radius;
    let mut sum = 0.0;
    for r in window.rows() {
        for c in window.cols() {
            if distance_sq(r, c, row, col) <= radius_sq {
                sum += image[[r, c]];
            }
        }
    }
    sum
}

fn working_copy(flux: ArrayView2<f64>, background: f64, margin: usize) -> Array2<f64> {
    let (rows, cols) = flux.dim();
    let mut work = flux.mapv(|v| if v.is_finite() { v - background } else { 0.0 });
    if margin > 0 {
        for ((r, c), value) in work.indexed_iter_mut() {
            if r < margin || c < margin || r + margin >= rows || c + margin >= cols {
                *value = 0.0;
            }
        }
    }
    work
}

/// Global maximum with first-occurrence (row-major) tie breaking.
fn find_peak(image: ArrayView2<f64>) -> Option<(usize, usize, f64)> {
    let mut best: Option<(usize, usize, f64)> = None;
    for ((r, c), &value) in image.indexed_iter() {
        match best {
            Some((_, _, current)) if value <= current => {}
            _ => best = Some((r, c, value)),
        }
    }
    best
}

fn blank_disc(image: &mut Array2<f64>, row: usize, col: usize, radius: f64) {
    let Some(window) = AABB::around(row, col, radius, image.dim()) else {
        return;
    };
    let radius_sq = radius * radius;
    for r in window.rows() {
        for c in window.cols() {
            if distance_sq(r, c, row, col) <= radius_sq {
                image[[r, c]] = 0.0;
            }
        }
    }
}

fn distance_sq(r: usize, c: usize, row: usize, col: usize) -> f64 {
    let dr = r as f64 - row as f64;
    let dc = c as f64 - col as f64;
    dr * dr + dc * dc
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use test_helpers::{add_gaussian_source, inject_point, normal_field};

    fn config(aperture: f64, blank: f64, max_count: usize) -> DetectionConfig {
        DetectionConfig {
            background_median: 0.0,
            background_std: 1.0,
            significance: 5.0,
            aperture_radius: aperture,
            blank_radius: blank,
            max_count,
            ignore_margins: 0,
        }
    }

    #[test]
    fn test_single_injected_point() {
        let mut frame = Array2::zeros((20, 20));
        inject_point(&mut frame, 10, 10, 50.0);

        let detections = detect_sources(frame.view(), config(2.0, 3.0, 10)).unwrap();
        assert_eq!(detections.len(), 1);
        let d = detections[0];
        assert_eq!((d.row, d.col, d.rank), (10, 10, 0));
        assert_eq!(d.flux_sum, 50.0);
    }

    #[test]
    fn test_below_threshold_is_empty() {
        let mut frame = Array2::zeros((20, 20));
        inject_point(&mut frame, 4, 4, 4.9);
        let detections = detect_sources(frame.view(), config(2.0, 3.0, 10)).unwrap();
        assert!(detections.is_empty());
    }

    #[test]
    fn test_blank_radius_smaller_than_aperture_fails() {
        let frame = Array2::zeros((5, 5));
        assert!(matches!(
            detect_sources(frame.view(), config(3.0, 2.0, 10)),
            Err(DetectionError::BlankRadiusTooSmall { .. })
        ));
    }

    #[test]
    fn test_max_count_caps_output() {
        let mut frame = Array2::zeros((40, 40));
        for i in 0..5 {
            inject_point(&mut frame, 5 + 7 * i, 20, 100.0 + i as f64);
        }
        let detections = detect_sources(frame.view(), config(1.0, 2.0, 3)).unwrap();
        assert_eq!(detections.len(), 3);
        // The three brightest, brightest first
        let rows: Vec<usize> = detections.iter().map(|d| d.row).collect();
        assert_eq!(rows, vec![33, 26, 19]);
    }

    #[test]
    fn test_tie_broken_by_row_major_order() {
        let mut frame = Array2::zeros((20, 20));
        inject_point(&mut frame, 12, 3, 30.0);
        inject_point(&mut frame, 5, 15, 30.0);
        inject_point(&mut frame, 5, 8, 30.0);

        let detections = detect_sources(frame.view(), config(1.0, 1.0, 10)).unwrap();
        let order: Vec<(usize, usize)> = detections.iter().map(|d| (d.row, d.col)).collect();
        assert_eq!(order, vec![(5, 8), (5, 15), (12, 3)]);
    }

    #[test]
    fn test_margins_are_ignored() {
        let mut frame = Array2::zeros((20, 20));
        inject_point(&mut frame, 1, 10, 500.0);
        inject_point(&mut frame, 10, 18, 500.0);
        inject_point(&mut frame, 10, 10, 50.0);

        let detections = detect_sources(
            frame.view(),
            DetectionConfig {
                ignore_margins: 2,
                ..config(1.0, 1.0, 10)
            },
        )
        .unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!((detections[0].row, detections[0].col), (10, 10));
    }

    #[test]
    fn test_wings_not_redetected() {
        let mut frame = Array2::zeros((40, 40));
        add_gaussian_source(&mut frame, 20.0, 20.0, 1000.0, 1.0);

        let detections = detect_sources(frame.view(), config(3.0, 7.0, 10)).unwrap();
        assert_eq!(detections.len(), 1);
        // Nearly all of a sigma 1 gaussian falls within radius 3
        let total = 1000.0 * 2.0 * std::f64::consts::PI;
        assert!(detections[0].flux_sum > 0.9 * total);
        assert!(detections[0].flux_sum <= frame.sum() + 1e-9);
    }

    #[test]
    fn test_background_is_subtracted() {
        let mut frame = Array2::from_elem((15, 15), 100.0);
        inject_point(&mut frame, 7, 7, 160.0);

        let detections = detect_sources(
            frame.view(),
            DetectionConfig {
                background_median: 100.0,
                ..config(1.0, 2.0, 10)
            },
        )
        .unwrap();
        assert_eq!(detections.len(), 1);
        assert_relative_eq!(detections[0].flux_sum, 60.0);
    }

    #[test]
    fn test_nan_pixels_treated_as_background() {
        let mut frame = Array2::zeros((10, 10));
        frame[[2, 2]] = f64::NAN;
        frame[[3, 3]] = f64::INFINITY;
        inject_point(&mut frame, 6, 6, 20.0);

        let detections = detect_sources(frame.view(), config(1.0, 1.0, 10)).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!((detections[0].row, detections[0].col), (6, 6));
    }

    #[test]
    fn test_input_not_modified_and_sorted_by_flux() {
        let mut frame = normal_field((64, 64), 0.0, 1.0, 17);
        add_gaussian_source(&mut frame, 15.0, 15.0, 200.0, 1.2);
        add_gaussian_source(&mut frame, 40.0, 30.0, 600.0, 1.2);
        add_gaussian_source(&mut frame, 50.0, 50.0, 90.0, 1.2);
        let before = frame.clone();

        let detections = detect_sources(frame.view(), config(3.0, 6.0, 20)).unwrap();
        assert_eq!(frame, before);
        assert!(detections.len() >= 3);
        assert_eq!((detections[0].row, detections[0].col), (40, 30));
        assert!(detections
            .windows(2)
            .all(|pair| pair[0].flux_sum >= pair[1].flux_sum));
        let mut ranks: Vec<usize> = detections.iter().map(|d| d.rank).collect();
        ranks.sort_unstable();
        assert_eq!(ranks, (0..detections.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_rank_is_extraction_order() {
        // Sharp faint peak is extracted first, broad source second, but the
        // broad source has the larger aperture sum
        let mut frame = Array2::zeros((48, 48));
        inject_point(&mut frame, 10, 10, 100.0);
        add_gaussian_source(&mut frame, 30.0, 30.0, 60.0, 3.0);

        let detections = detect_sources(frame.view(), config(4.0, 8.0, 10)).unwrap();
        assert_eq!(detections.len(), 2);
        assert_eq!((detections[0].row, detections[0].col), (30, 30));
        assert_eq!(detections[0].rank, 1);
        assert_eq!((detections[1].row, detections[1].col), (10, 10));
        assert_eq!(detections[1].rank, 0);
        assert_eq!(detections[1].flux_sum, 100.0);
        assert!(detections[0].flux_sum > detections[1].flux_sum);
    }

    #[test]
    fn test_aperture_sum_at_edge() {
        let frame = Array2::from_elem((5, 5), 1.0);
        // Radius 1 disc at the corner keeps (0,0), (0,1), (1,0)
        assert_eq!(aperture_sum(frame.view(), 0, 0, 1.0), 3.0);
        // Radius 1 disc in the middle keeps the plus shape
        assert_eq!(aperture_sum(frame.view(), 2, 2, 1.0), 5.0);
    }
}
