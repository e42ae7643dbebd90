//! Trial offset scoring and the two search strategies.

use log::debug;
use ndarray::{Array2, ArrayView2, Zip};
use rayon::prelude::*;

use super::{OffsetCandidate, RegistrationConfig, RegistrationError, ScoreMode};
use crate::image_proc::aabb::AABB;
use crate::image_proc::thresholding::ThresholdError;

/// Overlap rectangle in `a`'s coordinates for offset `(dr, dc)`, or `None`
/// when the arrays do not overlap.
///
/// `a[r, c]` lines up with `b[r + dr, c + dc]`, so the window in `b` is the
/// returned one shifted by `(dr, dc)`.
pub fn overlap_window(
    a_shape: (usize, usize),
    b_shape: (usize, usize),
    dr: i64,
    dc: i64,
) -> Option<AABB> {
    let (a_rows, a_cols) = (a_shape.0 as i64, a_shape.1 as i64);
    let (b_rows, b_cols) = (b_shape.0 as i64, b_shape.1 as i64);

    let row_end = a_rows.min(b_rows - dr);
    let col_end = a_cols.min(b_cols - dc);
    AABB::from_signed((-dr).max(0), (-dc).max(0), row_end - 1, col_end - 1)
}

/// Score of a single trial offset, with its overlap area.
///
/// `a` and `b` are the arrays as prepared for `mode`: binary masks encoded
/// as 0/1 for `ScoreMode::Overlap`, raw values for `ScoreMode::Difference`.
/// Returns `None` when nothing overlaps.
pub fn score_offset(
    a: ArrayView2<f64>,
    b: ArrayView2<f64>,
    dr: i64,
    dc: i64,
    mode: ScoreMode,
) -> Option<(f64, usize)> {
    let window = overlap_window(a.dim(), b.dim(), dr, dc)?;
    let a_part = window.view(a);
    let b_part = window.shifted(dr, dc)?.view(b);

    let total = match mode {
        ScoreMode::Overlap => Zip::from(&a_part)
            .and(&b_part)
            .fold(0.0, |acc, &x, &y| acc + x * y),
        ScoreMode::Difference => Zip::from(&a_part)
            .and(&b_part)
            .fold(0.0, |acc, &x, &y| acc + (x - y).abs()),
    };

    let area = window.area();
    Some((total / area as f64, area))
}

/// Both arrays in the form the scoring mode consumes.
pub(super) struct Prepared {
    a: Array2<f64>,
    b: Array2<f64>,
    mode: ScoreMode,
}

impl Prepared {
    pub(super) fn new(
        a: ArrayView2<f64>,
        b: ArrayView2<f64>,
        config: &RegistrationConfig,
    ) -> Result<Self, RegistrationError> {
        let (a, b) = match config.score_mode {
            ScoreMode::Overlap => (
                binarize_or_empty(a, config)?,
                binarize_or_empty(b, config)?,
            ),
            ScoreMode::Difference => (zero_non_finite(a), zero_non_finite(b)),
        };
        Ok(Self {
            a,
            b,
            mode: config.score_mode,
        })
    }

    /// True in overlap mode when either mask is all set or all clear.
    pub(super) fn is_degenerate(&self) -> bool {
        let uniform = |mask: &Array2<f64>| {
            let set = mask.iter().filter(|&&v| v > 0.0).count();
            set == 0 || set == mask.len()
        };
        self.mode == ScoreMode::Overlap && (uniform(&self.a) || uniform(&self.b))
    }

    fn candidate(&self, dr: i64, dc: i64) -> Option<OffsetCandidate> {
        score_offset(self.a.view(), self.b.view(), dr, dc, self.mode).map(|(score, area)| {
            OffsetCandidate {
                row_offset: dr,
                col_offset: dc,
                score,
                overlap_area: area,
            }
        })
    }

    /// Keep `next` only if it strictly beats `best`.
    fn pick(
        &self,
        best: Option<OffsetCandidate>,
        next: Option<OffsetCandidate>,
    ) -> Option<OffsetCandidate> {
        match (best, next) {
            (None, next) => next,
            (best, None) => best,
            (Some(best), Some(next)) => {
                if self.mode.improves(next.score, best.score) {
                    Some(next)
                } else {
                    Some(best)
                }
            }
        }
    }

    fn best_in_row(&self, dr: i64, window: i64) -> Option<OffsetCandidate> {
        (-window..=window).fold(None, |best, dc| self.pick(best, self.candidate(dr, dc)))
    }

    /// Exhaustive search over `[-window, window]²`.
    ///
    /// Row offsets are scored in parallel; the per-row winners are reduced
    /// in ascending row order so the result does not depend on scheduling.
    pub(super) fn full_search(&self, window: i64) -> Option<OffsetCandidate> {
        let span = 2 * window as usize + 1;
        let row_winners: Vec<Option<OffsetCandidate>> = (0..span)
            .into_par_iter()
            .map(|i| self.best_in_row(i as i64 - window, window))
            .collect();

        let best = row_winners
            .into_iter()
            .fold(None, |best, next| self.pick(best, next));
        debug!("full offset search over window {}: {:?}", window, best);
        best
    }

    /// Column pass at zero row offset, then row pass at the chosen column
    /// offset.
    pub(super) fn separable_search(&self, window: i64) -> Option<OffsetCandidate> {
        let column_pass = self.best_in_row(0, window)?;
        let dc = column_pass.col_offset;

        let best = (-window..=window).fold(None, |best, dr| self.pick(best, self.candidate(dr, dc)));
        debug!(
            "separable offset search over window {}: column pass {:?}, result {:?}",
            window, column_pass, best
        );
        best
    }
}

// An empty array has no percentile; it cannot overlap anything either, so an
// empty mask is equivalent.
fn binarize_or_empty(
    image: ArrayView2<f64>,
    config: &RegistrationConfig,
) -> Result<Array2<f64>, RegistrationError> {
    if image.is_empty() {
        return Ok(Array2::zeros(image.dim()));
    }
    match config.threshold.binarize(image) {
        Ok(mask) => Ok(mask.mapv(|set| if set { 1.0 } else { 0.0 })),
        // All pixels non-finite: nothing is set
        Err(ThresholdError::Stats(_)) => Ok(Array2::zeros(image.dim())),
        Err(err) => Err(err.into()),
    }
}

fn zero_non_finite(image: ArrayView2<f64>) -> Array2<f64> {
    image.mapv(|v| if v.is_finite() { v } else { 0.0 })
}
