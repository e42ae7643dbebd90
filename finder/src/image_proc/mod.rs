//! Image processing for the frame finder
//!
//! Background estimation, thresholding and aperture source detection on
//! `ndarray` flux arrays, plus the pixel window type they share.

pub mod aabb;
pub mod background;
pub mod detection;
pub mod thresholding;

// Re-export key functionality for easier access
pub use aabb::AABB;
pub use background::{estimate_background, BackgroundError, BackgroundEstimate};
pub use detection::{aperture_sum, detect_sources, Detection, DetectionConfig, DetectionError, SourceDetector};
pub use thresholding::{apply_threshold, ThresholdError, ThresholdPolicy};
