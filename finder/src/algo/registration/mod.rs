//! Integer pixel offset registration between two arrays.
//!
//! Two arrays are compared at every trial offset `(dr, dc)` in a square
//! search window, where `a[r, c]` is aligned with `b[r + dr, c + dc]`. Each
//! trial is scored over the rectangle where both arrays are defined:
//!
//! - **Overlap**: both arrays are binarized with a [`ThresholdPolicy`] and the
//!   score is the number of pixels set in both, divided by the overlap area.
//!   Higher is better.
//! - **Difference**: the mean absolute difference of the raw values over the
//!   overlap. Lower is better.
//!
//! Two search strategies are available. [`SearchMode::Full`] tries all
//! `(2W + 1)²` offsets and is the reference result. [`SearchMode::Separable`]
//! first picks the best column offset with rows aligned, then the best row
//! offset at that column offset. It costs `O(W)` trials instead of `O(W²)`
//! but can land on a different offset when the score surface is not
//! axis-separable, so treat it as an approximation.
//!
//! When no trial offset overlaps at all (for example both arrays empty) the
//! result has score 0, offset `(0, 0)` and `overlap_area == 0`; check
//! [`OffsetCandidate::is_registered`] before using it. Overlap mode gives the
//! same unregistered result when either binarized mask is uniform (every
//! pixel set or none set), since every offset would then score alike.

mod search;

use log::debug;
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::image_proc::thresholding::{ThresholdError, ThresholdPolicy};

pub use search::{overlap_window, score_offset};

/// Largest accepted search half width.
pub const MAX_WINDOW: usize = 4096;

/// Errors from offset registration. All are raised before any array scan.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistrationError {
    #[error("Search window must be at least one pixel")]
    ZeroWindow,
    #[error("Search window {window} exceeds the maximum of {max}")]
    WindowTooLarge { window: usize, max: usize },
    #[error("Invalid threshold policy: {0}")]
    Threshold(#[from] ThresholdError),
}

/// How each trial offset is scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreMode {
    /// Fraction of overlap pixels set in both binarized arrays (maximized)
    Overlap,
    /// Mean absolute difference of raw values (minimized)
    Difference,
}

impl ScoreMode {
    /// True when `score` beats `best` under this mode.
    pub fn improves(&self, score: f64, best: f64) -> bool {
        match self {
            ScoreMode::Overlap => score > best,
            ScoreMode::Difference => score < best,
        }
    }
}

/// Which offsets are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Every offset in the window
    Full,
    /// Column pass then row pass
    Separable,
}

/// Parameters for [`register_offset`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Binarization used by `ScoreMode::Overlap`
    pub threshold: ThresholdPolicy,
    /// Half width `W` of the search window; offsets span `[-W, W]` on each axis
    pub window: usize,
    pub score_mode: ScoreMode,
    pub search_mode: SearchMode,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            threshold: ThresholdPolicy::default(),
            window: 10,
            score_mode: ScoreMode::Overlap,
            search_mode: SearchMode::Full,
        }
    }
}

impl RegistrationConfig {
    pub fn validate(&self) -> Result<(), RegistrationError> {
        if self.window == 0 {
            return Err(RegistrationError::ZeroWindow);
        }
        if self.window > MAX_WINDOW {
            return Err(RegistrationError::WindowTooLarge {
                window: self.window,
                max: MAX_WINDOW,
            });
        }
        self.threshold.validate()?;
        Ok(())
    }
}

/// Best offset found by a registration run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OffsetCandidate {
    pub row_offset: i64,
    pub col_offset: i64,
    pub score: f64,
    /// Pixels in the overlap rectangle the score was computed over
    pub overlap_area: usize,
}

impl OffsetCandidate {
    /// Result returned when no trial offset overlaps.
    pub fn unregistered() -> Self {
        Self {
            row_offset: 0,
            col_offset: 0,
            score: 0.0,
            overlap_area: 0,
        }
    }

    /// False when nothing overlapped and the offset carries no information.
    pub fn is_registered(&self) -> bool {
        self.overlap_area > 0
    }
}

/// Find the integer offset that best aligns `b` to `a`.
///
/// # Arguments
/// * `a` - Reference array
/// * `b` - Array to align; need not have the same shape as `a`
/// * `config` - Threshold, window and scoring options
///
/// # Returns
/// The best [`OffsetCandidate`]. Ties go to the first offset in scan order
/// (row offset ascending, then column offset ascending).
///
/// # Errors
/// Configuration errors only. Degenerate inputs give an unregistered
/// candidate instead.
pub fn register_offset(
    a: ArrayView2<f64>,
    b: ArrayView2<f64>,
    config: &RegistrationConfig,
) -> Result<OffsetCandidate, RegistrationError> {
    config.validate()?;
    let prepared = search::Prepared::new(a, b, config)?;
    if prepared.is_degenerate() {
        debug!("binarized mask is uniform, nothing to register");
        return Ok(OffsetCandidate::unregistered());
    }
    let window = config.window as i64;

    let best = match config.search_mode {
        SearchMode::Full => prepared.full_search(window),
        SearchMode::Separable => prepared.separable_search(window),
    };

    Ok(best.unwrap_or_else(OffsetCandidate::unregistered))
}
