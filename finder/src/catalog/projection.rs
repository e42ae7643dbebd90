//! Projection of catalog objects into a frame's pixel grid.
//!
//! For one frame and epoch the projector propagates each catalog object by
//! its proper motion, maps it through the frame's `SkyToPixel` transform and
//! keeps the ones that land inside the frame (grown by a margin so objects
//! straddling the edge can still be matched).
//!
//! A broken transform fails the whole call: a partially projected catalog
//! would silently bias the match, so no positions are returned at all.

use log::debug;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::epoch::J2000;
use super::CatalogObject;
use crate::wcs::{FrameBounds, SkyToPixel, WcsError};

/// Errors from catalog projection.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProjectionError {
    #[error("Cannot project catalog object {object_id}: {source}")]
    Transform {
        object_id: String,
        #[source]
        source: WcsError,
    },
    #[error("Invalid projection epoch {0}")]
    InvalidEpoch(f64),
    #[error("Frame margin must be finite and non-negative, got {0}")]
    InvalidMargin(f64),
}

/// Predicted pixel position of a catalog object for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedPosition {
    /// Index of the object in the catalog slice passed to `project`
    pub catalog_index: usize,
    pub row: f64,
    pub col: f64,
}

impl ProjectedPosition {
    /// Position as a `(row, col)` vector.
    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.row, self.col)
    }
}

/// Projects catalog objects into frames.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogProjector {
    /// Epoch (decimal Julian year) of the catalog positions
    pub reference_epoch: f64,
    /// Pixels beyond the frame edge within which objects are still kept
    pub margin: f64,
    /// Project objects flagged as suppressed
    pub include_suppressed: bool,
}

impl Default for CatalogProjector {
    fn default() -> Self {
        Self {
            reference_epoch: J2000,
            margin: 5.0,
            include_suppressed: false,
        }
    }
}

impl CatalogProjector {
    pub fn validate(&self) -> Result<(), ProjectionError> {
        if !self.reference_epoch.is_finite() {
            return Err(ProjectionError::InvalidEpoch(self.reference_epoch));
        }
        if !(self.margin.is_finite() && self.margin >= 0.0) {
            return Err(ProjectionError::InvalidMargin(self.margin));
        }
        Ok(())
    }

    /// Predicted pixel positions of the catalog objects visible in a frame.
    ///
    /// Output order follows the catalog but callers should not rely on it.
    ///
    /// # Errors
    /// * `ProjectionError::Transform` - the transform failed for some object;
    ///   nothing is returned for the frame
    /// * `ProjectionError::InvalidEpoch` / `InvalidMargin` - bad parameters
    pub fn project(
        &self,
        catalog: &[CatalogObject],
        epoch: f64,
        transform: &dyn SkyToPixel,
        bounds: FrameBounds,
    ) -> Result<Vec<ProjectedPosition>, ProjectionError> {
        self.validate()?;
        if !epoch.is_finite() {
            return Err(ProjectionError::InvalidEpoch(epoch));
        }

        let mut projected = Vec::new();
        let mut skipped_suppressed = 0usize;
        for (catalog_index, object) in catalog.iter().enumerate() {
            if object.suppressed && !self.include_suppressed {
                skipped_suppressed += 1;
                continue;
            }

            let (ra, dec) = object.position_at(epoch, self.reference_epoch);
            let (row, col) = match transform.project(ra, dec) {
                Ok(pixel) => pixel,
                Err(err) if !err.is_transform_failure() => continue,
                Err(source) => {
                    return Err(ProjectionError::Transform {
                        object_id: object.id.clone(),
                        source,
                    })
                }
            };

            if bounds.contains(row, col, self.margin) {
                projected.push(ProjectedPosition {
                    catalog_index,
                    row,
                    col,
                });
            }
        }

        debug!(
            "projected {} of {} catalog objects into {}x{} frame ({} suppressed)",
            projected.len(),
            catalog.len(),
            bounds.rows,
            bounds.cols,
            skipped_suppressed
        );
        Ok(projected)
    }
}
