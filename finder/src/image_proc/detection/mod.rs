//! Point source detection in flux arrays.

pub mod aperture;
pub mod config;

use thiserror::Error;

pub use aperture::{aperture_sum, detect_sources, Detection, SourceDetector};
pub use config::DetectionConfig;

/// Configuration errors raised before any pixel is scanned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectionError {
    #[error("Aperture radius must be positive and finite, got {0}")]
    InvalidApertureRadius(f64),
    #[error("Blank radius {blank} is smaller than aperture radius {aperture}")]
    BlankRadiusTooSmall { blank: f64, aperture: f64 },
    #[error("Invalid background statistics: median {median}, std {std_dev}")]
    InvalidBackground { median: f64, std_dev: f64 },
    #[error("Significance must be positive and finite, got {0}")]
    InvalidSignificance(f64),
}
