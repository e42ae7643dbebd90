//! Catalog objects and their projection into frames.
//!
//! Catalog entries arrive from an external store already resolved for one
//! vicinity (target field). This module only reads them: it applies proper
//! motion for the observation epoch and projects them through the frame's
//! sky-to-pixel transform.

pub mod epoch;
pub mod projection;

use serde::{Deserialize, Serialize};

use crate::wcs::SkyFootprint;

pub use projection::{CatalogProjector, ProjectedPosition, ProjectionError};

/// Milliarcseconds per degree.
const MAS_PER_DEGREE: f64 = 3_600_000.0;

/// Anything with an equatorial position in degrees.
pub trait SkyPosition {
    /// Right ascension in degrees
    fn ra(&self) -> f64;
    /// Declination in degrees
    fn dec(&self) -> f64;
}

/// Catalog magnitude in one photometric filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterMagnitude {
    pub filter: String,
    pub magnitude: f64,
}

/// A known object from the catalog store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogObject {
    /// Stable catalog identifier
    pub id: String,
    /// Name as stored in the catalog
    pub name: String,
    /// Right ascension at the catalog reference epoch (degrees)
    pub ra: f64,
    /// Declination at the catalog reference epoch (degrees)
    pub dec: f64,
    /// Proper motion in RA, mu_alpha * cos(dec) (mas/yr)
    pub pm_ra: f64,
    /// Proper motion in Dec (mas/yr)
    pub pm_dec: f64,
    /// Preferred photometry aperture radius (pixels)
    pub aperture: f64,
    #[serde(default)]
    pub magnitudes: Vec<FilterMagnitude>,
    /// Excluded from matching unless explicitly requested
    #[serde(default)]
    pub suppressed: bool,
    /// Flagged as a known or suspected variable
    #[serde(default)]
    pub variable: bool,
    /// Name of the target field this object belongs to
    pub vicinity: String,
}

impl SkyPosition for CatalogObject {
    fn ra(&self) -> f64 {
        self.ra
    }

    fn dec(&self) -> f64 {
        self.dec
    }
}

impl CatalogObject {
    /// Sky position `(ra, dec)` at `epoch`, given the catalog `reference_epoch`
    /// (both decimal Julian years).
    ///
    /// Linear propagation; RA is wrapped into `[0, 360)`.
    pub fn position_at(&self, epoch: f64, reference_epoch: f64) -> (f64, f64) {
        let years = epoch - reference_epoch;
        let dec = self.dec + self.pm_dec * years / MAS_PER_DEGREE;
        let cos_dec = self.dec.to_radians().cos();
        let d_ra = if cos_dec.abs() > f64::EPSILON {
            self.pm_ra * years / MAS_PER_DEGREE / cos_dec
        } else {
            0.0
        };
        ((self.ra + d_ra).rem_euclid(360.0), dec)
    }

    /// Catalog magnitude in `filter`, if the catalog has one.
    pub fn magnitude_in(&self, filter: &str) -> Option<f64> {
        self.magnitudes
            .iter()
            .find(|m| m.filter == filter)
            .map(|m| m.magnitude)
    }

    /// Name shown in result sets: the catalog name with runs of whitespace
    /// and underscores collapsed to single spaces, falling back to the id.
    pub fn display_name(&self) -> String {
        let cleaned = self
            .name
            .split(|c: char| c.is_whitespace() || c == '_')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if cleaned.is_empty() {
            self.id.clone()
        } else {
            cleaned
        }
    }
}

/// Keep the objects that fall within a frame's sky footprint, padded by
/// `padding` degrees.
pub fn filter_in_footprint<'a, T>(
    objects: &'a [T],
    footprint: &SkyFootprint,
    padding: f64,
) -> Vec<&'a T>
where
    T: SkyPosition,
{
    objects
        .iter()
        .filter(|object| footprint.contains(object.ra(), object.dec(), padding))
        .collect()
}
