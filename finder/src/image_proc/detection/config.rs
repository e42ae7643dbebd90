//! Parameters for iterative aperture source detection.
//!
//! A `DetectionConfig` carries everything the detector needs for one frame:
//! the background statistics that set the significance cut and the aperture
//! geometry used to measure and then blank each source. Validation runs
//! before any pixel is touched so a bad configuration fails fast.
//!
//! # Usage
//!
//! ```rust
//! use finder::image_proc::background::BackgroundEstimate;
//! use finder::image_proc::detection::config::DetectionConfig;
//!
//! let background = BackgroundEstimate { median: 110.0, std_dev: 3.5, pixels_used: 4096 };
//! let config = DetectionConfig::default().with_background(background);
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.threshold(), 5.0 * 3.5);
//! ```

use serde::{Deserialize, Serialize};

use crate::image_proc::background::BackgroundEstimate;

use super::DetectionError;

/// Detection parameters for a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Background level subtracted from every pixel
    pub background_median: f64,
    /// Background noise; the cut is `significance * background_std`
    pub background_std: f64,
    /// Detection threshold in units of background sigma
    pub significance: f64,
    /// Radius (pixels) of the circular aperture summed for `flux_sum`
    pub aperture_radius: f64,
    /// Radius (pixels) zeroed around each detection; must be >= aperture_radius
    pub blank_radius: f64,
    /// Maximum number of sources extracted
    pub max_count: usize,
    /// Width (pixels) of the border excluded from detection on every edge
    pub ignore_margins: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            background_median: 0.0,
            background_std: 1.0,
            significance: 5.0,
            aperture_radius: 4.0,
            blank_radius: 8.0,
            max_count: 100,
            ignore_margins: 0,
        }
    }
}

impl DetectionConfig {
    /// Replace the background statistics with a measured estimate.
    pub fn with_background(mut self, background: BackgroundEstimate) -> Self {
        self.background_median = background.median;
        self.background_std = background.std_dev;
        self
    }

    /// Absolute cut (above background) a pixel must reach to start a detection.
    pub fn threshold(&self) -> f64 {
        self.significance * self.background_std
    }

    /// Check the configuration.
    ///
    /// # Errors
    /// * `DetectionError::InvalidApertureRadius` - aperture radius not positive and finite
    /// * `DetectionError::BlankRadiusTooSmall` - blank radius below aperture radius
    /// * `DetectionError::InvalidBackground` - non-finite median or negative/non-finite std
    /// * `DetectionError::InvalidSignificance` - significance not positive and finite
    pub fn validate(&self) -> Result<(), DetectionError> {
        if !(self.aperture_radius.is_finite() && self.aperture_radius > 0.0) {
            return Err(DetectionError::InvalidApertureRadius(self.aperture_radius));
        }
        if !self.blank_radius.is_finite() || self.blank_radius < self.aperture_radius {
            return Err(DetectionError::BlankRadiusTooSmall {
                blank: self.blank_radius,
                aperture: self.aperture_radius,
            });
        }
        if !self.background_median.is_finite()
            || !(self.background_std.is_finite() && self.background_std >= 0.0)
        {
            return Err(DetectionError::InvalidBackground {
                median: self.background_median,
                std_dev: self.background_std,
            });
        }
        if !(self.significance.is_finite() && self.significance > 0.0) {
            return Err(DetectionError::InvalidSignificance(self.significance));
        }
        Ok(())
    }
}
