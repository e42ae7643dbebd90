//! Sky to pixel transforms.
//!
//! The finder never derives a WCS itself; it only consumes one through the
//! `SkyToPixel` trait. `TanWcs` is a plain gnomonic (TAN) projection with a
//! CD matrix, enough for tests and for frames whose headers carry a linear
//! solution without distortion terms.
//!
//! Pixel coordinates are `(row, col)` with integer values at pixel centres.
//! Sky coordinates are `(ra, dec)` in degrees.

use nalgebra::{Matrix2, Vector2};
use thiserror::Error;

/// Errors reported by a sky/pixel transform.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WcsError {
    /// The position is on the far side of the projection and cannot appear
    /// in the frame. Not a failure of the transform.
    #[error("Sky position ({ra:.6}, {dec:.6}) lies behind the projection plane")]
    BehindProjectionPlane { ra: f64, dec: f64 },
    #[error("Projection is missing parameter {0}")]
    MissingParameter(&'static str),
    #[error("CD matrix is singular or non-finite")]
    SingularMatrix,
    #[error("Non-finite coordinate ({0}, {1})")]
    NonFiniteCoordinate(f64, f64),
}

impl WcsError {
    /// True when the transform itself is unusable rather than the queried
    /// position simply being out of view.
    pub fn is_transform_failure(&self) -> bool {
        !matches!(self, WcsError::BehindProjectionPlane { .. })
    }
}

/// The sky/pixel mapping supplied with each frame.
pub trait SkyToPixel {
    /// Map `(ra, dec)` in degrees to `(row, col)` pixel coordinates.
    fn project(&self, ra: f64, dec: f64) -> Result<(f64, f64), WcsError>;

    /// Map `(row, col)` pixel coordinates to `(ra, dec)` in degrees.
    fn pixel_to_sky(&self, row: f64, col: f64) -> Result<(f64, f64), WcsError>;
}

/// Gnomonic projection with a linear CD matrix.
///
/// `[xi, eta] = CD * [col - crpix_col, row - crpix_row]`, with the standard
/// coordinates `xi`, `eta` in degrees.
///
/// # Examples
/// ```rust
/// use finder::wcs::{SkyToPixel, TanWcs};
///
/// // 1 arcsec pixels, north up, east left, reference pixel at (50, 50)
/// let wcs = TanWcs::north_up(150.0, 2.0, 50.0, 50.0, 1.0 / 3600.0).unwrap();
/// let (row, col) = wcs.project(150.0, 2.0).unwrap();
/// assert!((row - 50.0).abs() < 1e-9 && (col - 50.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TanWcs {
    crval: (f64, f64),
    crpix: (f64, f64),
    cd: Matrix2<f64>,
    cd_inverse: Matrix2<f64>,
}

impl TanWcs {
    /// Build a projection from the reference sky position `(ra0, dec0)`, the
    /// reference pixel `(row0, col0)` and the CD matrix (degrees per pixel).
    pub fn new(
        crval: (f64, f64),
        crpix: (f64, f64),
        cd: Matrix2<f64>,
    ) -> Result<Self, WcsError> {
        if !(crval.0.is_finite() && crval.1.is_finite()) {
            return Err(WcsError::MissingParameter("CRVAL"));
        }
        if !(crpix.0.is_finite() && crpix.1.is_finite()) {
            return Err(WcsError::MissingParameter("CRPIX"));
        }
        if cd.iter().any(|v| !v.is_finite()) {
            return Err(WcsError::SingularMatrix);
        }
        let cd_inverse = cd.try_inverse().ok_or(WcsError::SingularMatrix)?;
        Ok(Self {
            crval,
            crpix,
            cd,
            cd_inverse,
        })
    }

    /// Square pixels of `scale` degrees, north towards decreasing row and
    /// east towards decreasing column.
    pub fn north_up(
        ra0: f64,
        dec0: f64,
        row0: f64,
        col0: f64,
        scale: f64,
    ) -> Result<Self, WcsError> {
        Self::new(
            (ra0, dec0),
            (row0, col0),
            Matrix2::new(-scale, 0.0, 0.0, -scale),
        )
    }

    /// Reference sky position `(ra, dec)` in degrees.
    pub fn crval(&self) -> (f64, f64) {
        self.crval
    }
}

impl SkyToPixel for TanWcs {
    fn project(&self, ra: f64, dec: f64) -> Result<(f64, f64), WcsError> {
        if !(ra.is_finite() && dec.is_finite()) {
            return Err(WcsError::NonFiniteCoordinate(ra, dec));
        }
        let (ra0, dec0) = (self.crval.0.to_radians(), self.crval.1.to_radians());
        let (ra, dec_rad) = (ra.to_radians(), dec.to_radians());
        let d_ra = ra - ra0;

        let cos_c = dec0.sin() * dec_rad.sin() + dec0.cos() * dec_rad.cos() * d_ra.cos();
        if cos_c <= 0.0 {
            return Err(WcsError::BehindProjectionPlane {
                ra: ra.to_degrees(),
                dec,
            });
        }

        let xi = (dec_rad.cos() * d_ra.sin() / cos_c).to_degrees();
        let eta =
            ((dec0.cos() * dec_rad.sin() - dec0.sin() * dec_rad.cos() * d_ra.cos()) / cos_c)
                .to_degrees();

        let offset = self.cd_inverse * Vector2::new(xi, eta);
        Ok((self.crpix.0 + offset[1], self.crpix.1 + offset[0]))
    }

    fn pixel_to_sky(&self, row: f64, col: f64) -> Result<(f64, f64), WcsError> {
        if !(row.is_finite() && col.is_finite()) {
            return Err(WcsError::NonFiniteCoordinate(row, col));
        }
        let standard = self.cd * Vector2::new(col - self.crpix.1, row - self.crpix.0);
        let xi = standard[0].to_radians();
        let eta = standard[1].to_radians();
        let (ra0, dec0) = (self.crval.0.to_radians(), self.crval.1.to_radians());

        let rho = (xi * xi + eta * eta).sqrt();
        if rho == 0.0 {
            return Ok(self.crval);
        }
        let c = rho.atan();
        let (sin_c, cos_c) = c.sin_cos();

        let dec = (cos_c * dec0.sin() + eta * sin_c * dec0.cos() / rho).asin();
        let ra = ra0 + (xi * sin_c).atan2(rho * dec0.cos() * cos_c - eta * dec0.sin() * sin_c);

        Ok((ra.to_degrees().rem_euclid(360.0), dec.to_degrees()))
    }
}

/// Pixel extent of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBounds {
    pub rows: usize,
    pub cols: usize,
}

impl FrameBounds {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Bounds of an array with the given `(rows, cols)` shape.
    pub fn from_shape(shape: (usize, usize)) -> Self {
        Self::new(shape.0, shape.1)
    }

    /// True when `(row, col)` lies within the frame grown by `margin` pixels
    /// on every side. Pixel centres span `0..=rows-1` and `0..=cols-1`.
    pub fn contains(&self, row: f64, col: f64, margin: f64) -> bool {
        if self.rows == 0 || self.cols == 0 {
            return false;
        }
        let max_row = (self.rows - 1) as f64 + margin;
        let max_col = (self.cols - 1) as f64 + margin;
        row >= -margin && row <= max_row && col >= -margin && col <= max_col
    }
}

/// Circular sky region covering a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkyFootprint {
    /// Right ascension of the frame centre (degrees)
    pub center_ra: f64,
    /// Declination of the frame centre (degrees)
    pub center_dec: f64,
    /// Angular distance from the centre to the farthest corner (degrees)
    pub radius: f64,
}

impl SkyFootprint {
    /// True when `(ra, dec)` lies within `radius + padding` degrees of the centre.
    pub fn contains(&self, ra: f64, dec: f64, padding: f64) -> bool {
        angular_separation(self.center_ra, self.center_dec, ra, dec) <= self.radius + padding
    }
}

/// Compute the sky footprint of a frame by mapping its centre and corners
/// through `transform`.
pub fn sky_footprint(
    transform: &dyn SkyToPixel,
    bounds: FrameBounds,
) -> Result<SkyFootprint, WcsError> {
    let last_row = bounds.rows.saturating_sub(1) as f64;
    let last_col = bounds.cols.saturating_sub(1) as f64;
    let (center_ra, center_dec) = transform.pixel_to_sky(last_row / 2.0, last_col / 2.0)?;

    let mut radius: f64 = 0.0;
    for (row, col) in [
        (0.0, 0.0),
        (0.0, last_col),
        (last_row, 0.0),
        (last_row, last_col),
    ] {
        let (ra, dec) = transform.pixel_to_sky(row, col)?;
        radius = radius.max(angular_separation(center_ra, center_dec, ra, dec));
    }

    Ok(SkyFootprint {
        center_ra,
        center_dec,
        radius,
    })
}

/// Great-circle distance in degrees between two sky positions, via the
/// haversine formula.
pub fn angular_separation(ra1: f64, dec1: f64, ra2: f64, dec2: f64) -> f64 {
    let (ra1, dec1, ra2, dec2) = (
        ra1.to_radians(),
        dec1.to_radians(),
        ra2.to_radians(),
        dec2.to_radians(),
    );
    let d_ra = ra2 - ra1;
    let d_dec = dec2 - dec1;
    let a = (d_dec / 2.0).sin().powi(2) + dec1.cos() * dec2.cos() * (d_ra / 2.0).sin().powi(2);
    (2.0 * a.sqrt().min(1.0).asin()).to_degrees()
}
