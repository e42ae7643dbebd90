//! Rectangular pixel windows.
//!
//! Aperture sums, blanking and tally marking only visit the pixels of the
//! square that bounds their disc; registration scores only the overlap of
//! two arrays under a trial offset. Both are an [`AABB`] clipped to an
//! array's shape.
//!
//! ```rust
//! use finder::image_proc::aabb::AABB;
//!
//! // Radius-3 disc at the corner of a 20x20 frame
//! let window = AABB::around(1, 1, 3.0, (20, 20)).unwrap();
//! assert_eq!(window, AABB::from_coords(0, 0, 4, 4));
//! assert_eq!(window.area(), 25);
//! ```

use std::ops::Range;

use ndarray::{s, ArrayView2};

/// Inclusive rectangle of `[row, col]` indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AABB {
    pub min_row: usize,
    pub min_col: usize,
    pub max_row: usize,
    pub max_col: usize,
}

impl AABB {
    pub fn from_coords(min_row: usize, min_col: usize, max_row: usize, max_col: usize) -> Self {
        Self {
            min_row,
            min_col,
            max_row,
            max_col,
        }
    }

    /// Window from signed inclusive bounds. Negative minimums are clamped to
    /// zero; `None` when nothing is left.
    pub fn from_signed(min_row: i64, min_col: i64, max_row: i64, max_col: i64) -> Option<Self> {
        let (min_row, min_col) = (min_row.max(0), min_col.max(0));
        if max_row < min_row || max_col < min_col {
            return None;
        }
        Some(Self::from_coords(
            min_row as usize,
            min_col as usize,
            max_row as usize,
            max_col as usize,
        ))
    }

    /// Square bounding every pixel within `radius` of `(row, col)`, clipped
    /// to an array of `shape`. `None` for an empty array.
    pub fn around(row: usize, col: usize, radius: f64, shape: (usize, usize)) -> Option<Self> {
        let (rows, cols) = shape;
        let reach = radius.max(0.0).floor() as i64;
        let (row, col) = (row as i64, col as i64);
        Self::from_signed(
            row - reach,
            col - reach,
            (row + reach).min(rows as i64 - 1),
            (col + reach).min(cols as i64 - 1),
        )
    }

    /// The same window moved by `(dr, dc)`, or `None` if any corner would
    /// land at a negative index.
    pub fn shifted(&self, dr: i64, dc: i64) -> Option<Self> {
        let min_row = self.min_row as i64 + dr;
        let min_col = self.min_col as i64 + dc;
        if min_row < 0 || min_col < 0 {
            return None;
        }
        Some(Self::from_coords(
            min_row as usize,
            min_col as usize,
            (self.max_row as i64 + dr) as usize,
            (self.max_col as i64 + dc) as usize,
        ))
    }

    pub fn area(&self) -> usize {
        (self.max_row - self.min_row + 1) * (self.max_col - self.min_col + 1)
    }

    /// Rows covered, as a slicing range.
    pub fn rows(&self) -> Range<usize> {
        self.min_row..self.max_row + 1
    }

    /// Columns covered, as a slicing range.
    pub fn cols(&self) -> Range<usize> {
        self.min_col..self.max_col + 1
    }

    /// View of `array` restricted to this window.
    ///
    /// # Panics
    /// If the window reaches outside `array`.
    pub fn view<'a>(&self, array: ArrayView2<'a, f64>) -> ArrayView2<'a, f64> {
        array.slice_move(s![self.rows(), self.cols()])
    }
}
