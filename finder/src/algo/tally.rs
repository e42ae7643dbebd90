//! Detection tallies for aligning many frames of one field.
//!
//! A tally counts, per pixel, how many frames had a detection there. Stacked
//! over a night the counts trace the field's bright stars, and registering a
//! tally against a reference tally recovers the pointing drift between the
//! two sets of frames.

use log::warn;
use ndarray::{Array2, ArrayView2};

use super::registration::{register_offset, OffsetCandidate, RegistrationConfig, RegistrationError};
use crate::image_proc::aabb::AABB;
use crate::image_proc::detection::Detection;

/// Per-pixel detection counts accumulated over frames.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionTally {
    counts: Array2<f64>,
    /// Each detection marks every pixel within this radius
    radius: f64,
    frames: usize,
}

impl DetectionTally {
    /// Empty tally for frames of `shape`. A non-zero `radius` widens each
    /// detection into a disc so small pointing jitter still overlaps.
    pub fn new(shape: (usize, usize), radius: f64) -> Self {
        Self {
            counts: Array2::zeros(shape),
            radius: radius.max(0.0),
            frames: 0,
        }
    }

    /// Add one frame's detections.
    ///
    /// Detections outside the tally grid are dropped with a warning.
    pub fn add_frame(&mut self, detections: &[Detection]) {
        let shape = self.counts.dim();
        let radius_sq = self.radius * self.radius;
        let mut dropped = 0usize;

        for detection in detections {
            if detection.row >= shape.0 || detection.col >= shape.1 {
                dropped += 1;
                continue;
            }
            let Some(window) = AABB::around(detection.row, detection.col, self.radius, shape) else {
                continue;
            };
            for r in window.rows() {
                for c in window.cols() {
                    let d_row = r as f64 - detection.row as f64;
                    let d_col = c as f64 - detection.col as f64;
                    if d_row * d_row + d_col * d_col <= radius_sq {
                        self.counts[[r, c]] += 1.0;
                    }
                }
            }
        }

        if dropped > 0 {
            warn!(
                "dropped {} detections outside {}x{} tally",
                dropped, shape.0, shape.1
            );
        }
        self.frames += 1;
    }

    /// Number of frames added so far.
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn counts(&self) -> ArrayView2<'_, f64> {
        self.counts.view()
    }

    /// Offset aligning this tally to `reference`, using the same convention
    /// as [`register_offset`] with `reference` as the first array.
    pub fn register_against(
        &self,
        reference: &DetectionTally,
        config: &RegistrationConfig,
    ) -> Result<OffsetCandidate, RegistrationError> {
        register_offset(reference.counts(), self.counts(), config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::registration::{ScoreMode, SearchMode};
    use crate::image_proc::thresholding::ThresholdPolicy;

    fn detection(row: usize, col: usize) -> Detection {
        Detection {
            row,
            col,
            aperture_radius: 3.0,
            flux_sum: 10.0,
            rank: 0,
        }
    }

    #[test]
    fn test_counts_accumulate() {
        let mut tally = DetectionTally::new((10, 10), 0.0);
        tally.add_frame(&[detection(2, 3), detection(5, 5)]);
        tally.add_frame(&[detection(2, 3)]);

        assert_eq!(tally.frames(), 2);
        assert_eq!(tally.counts()[[2, 3]], 2.0);
        assert_eq!(tally.counts()[[5, 5]], 1.0);
        assert_eq!(tally.counts().sum(), 3.0);
    }

    #[test]
    fn test_radius_marks_disc() {
        let mut tally = DetectionTally::new((10, 10), 1.0);
        tally.add_frame(&[detection(0, 0), detection(5, 5)]);
        // Corner disc is clipped to 3 pixels, interior disc has 5
        assert_eq!(tally.counts().sum(), 8.0);
        assert_eq!(tally.counts()[[4, 5]], 1.0);
        assert_eq!(tally.counts()[[4, 4]], 0.0);
    }

    #[test]
    fn test_out_of_grid_detections_dropped() {
        let mut tally = DetectionTally::new((4, 4), 0.0);
        tally.add_frame(&[detection(4, 0), detection(1, 1)]);
        assert_eq!(tally.counts().sum(), 1.0);
        assert_eq!(tally.frames(), 1);
    }

    #[test]
    fn test_register_drifted_tally() {
        let stars = [(5, 8), (12, 20), (20, 6), (25, 25), (9, 15)];
        let mut reference = DetectionTally::new((32, 32), 1.0);
        let mut drifted = DetectionTally::new((32, 32), 1.0);
        for _ in 0..3 {
            reference.add_frame(&stars.map(|(r, c)| detection(r, c)));
            drifted.add_frame(&stars.map(|(r, c)| detection(r + 2, c - 1)));
        }

        let config = RegistrationConfig {
            threshold: ThresholdPolicy::Statistical { k: 0.0 },
            window: 4,
            score_mode: ScoreMode::Overlap,
            search_mode: SearchMode::Full,
        };
        let offset = drifted.register_against(&reference, &config).unwrap();
        assert_eq!((offset.row_offset, offset.col_offset), (2, -1));
    }

    #[test]
    fn test_register_drifted_tally_with_default_config() {
        let stars = [(5, 8), (12, 20), (20, 6), (25, 25), (9, 15)];
        let mut reference = DetectionTally::new((32, 32), 1.0);
        let mut drifted = DetectionTally::new((32, 32), 1.0);
        for _ in 0..3 {
            reference.add_frame(&stars.map(|(r, c)| detection(r, c)));
            drifted.add_frame(&stars.map(|(r, c)| detection(r + 2, c - 1)));
        }

        let config = RegistrationConfig {
            window: 4,
            ..RegistrationConfig::default()
        };
        let offset = drifted.register_against(&reference, &config).unwrap();
        assert!(offset.is_registered());
        assert_eq!((offset.row_offset, offset.col_offset), (2, -1));
        assert!(offset.score < 1.0);
    }

    #[test]
    fn test_empty_tally_is_unregistered() {
        let reference = DetectionTally::new((16, 16), 1.0);
        let mut other = DetectionTally::new((16, 16), 1.0);
        other.add_frame(&[detection(8, 8)]);

        let offset = other
            .register_against(&reference, &RegistrationConfig::default())
            .unwrap();
        assert_eq!(offset, OffsetCandidate::unregistered());
    }
}
