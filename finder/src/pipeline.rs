//! Single frame processing.
//!
//! ```text
//! flux ──► background ──► SourceDetector ──► detections ─┐
//!                                                         ├─► Matcher ──► FindResultSet
//! catalog ──► CatalogProjector (epoch, transform) ────────┘      (identify, reorder, relabel)
//! ```
//!
//! Loading the frame, its transform and the catalog subset is the caller's
//! job; so is persisting the result.

use finder_types::FrameMetadata;
use log::info;
use ndarray::Array2;
use thiserror::Error;

use crate::algo::matching::{match_positions, MatchError};
use crate::catalog::{CatalogObject, ProjectionError};
use crate::config::FinderConfig;
use crate::image_proc::background::{estimate_background, BackgroundError};
use crate::image_proc::detection::{DetectionError, SourceDetector};
use crate::results::{FindResultSet, NameCache, PersistError, ResultSetError};
use crate::wcs::{FrameBounds, SkyToPixel, WcsError};

/// Anything that can go wrong with one frame.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Background estimation failed: {0}")]
    Background(#[from] BackgroundError),
    #[error("Detection configuration rejected: {0}")]
    Detection(#[from] DetectionError),
    #[error("Catalog projection failed: {0}")]
    Projection(#[from] ProjectionError),
    #[error("Matching failed: {0}")]
    Matching(#[from] MatchError),
    #[error("Result set invariant violated: {0}")]
    ResultSet(#[from] ResultSetError),
    #[error("Sky position lookup failed: {0}")]
    Wcs(#[from] WcsError),
    #[error("Saving results failed: {0}")]
    Persist(#[from] PersistError),
}

/// One frame as handed over by the image loader.
pub struct FrameInput {
    pub metadata: FrameMetadata,
    pub flux: Array2<f64>,
    pub transform: Box<dyn SkyToPixel + Send + Sync>,
}

impl FrameInput {
    pub fn new(
        metadata: FrameMetadata,
        flux: Array2<f64>,
        transform: Box<dyn SkyToPixel + Send + Sync>,
    ) -> Self {
        Self {
            metadata,
            flux,
            transform,
        }
    }

    pub fn bounds(&self) -> FrameBounds {
        FrameBounds::from_shape(self.flux.dim())
    }
}

impl std::fmt::Debug for FrameInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameInput")
            .field("metadata", &self.metadata)
            .field("shape", &self.flux.dim())
            .finish_non_exhaustive()
    }
}

/// Detect, identify and curate the sources of one frame.
///
/// # Arguments
/// * `frame` - Flux array, metadata and sky transform of the frame
/// * `catalog` - Catalog objects of the frame's vicinity
/// * `config` - Finder configuration
/// * `names` - Display name memo for the current batch
///
/// # Returns
/// The frame's result set, reordered and relabeled. Frames with no sources
/// or no catalog objects in view give an empty or unidentified set.
pub fn process_frame(
    frame: &FrameInput,
    catalog: &[CatalogObject],
    config: &FinderConfig,
    names: &mut NameCache,
) -> Result<FindResultSet, FrameError> {
    let flux = frame.flux.view();
    let observation_id = frame.metadata.observation_id;

    let mut detection_config = config.detection;
    if config.background.estimate && !flux.is_empty() {
        let background = estimate_background(
            flux,
            config.background.clip_sigma,
            config.background.max_iterations,
        )?;
        detection_config = detection_config.with_background(background);
    }
    let detections = SourceDetector::new(detection_config)?.detect(flux);

    let predicted = config.projection.project(
        catalog,
        frame.metadata.observation_epoch,
        frame.transform.as_ref(),
        frame.bounds(),
    )?;
    let pairs = match_positions(&predicted, &detections, config.matching.max_distance)?;

    let mut set = FindResultSet::from_detections(frame.metadata.clone(), &detections);
    set.apply_matches(
        &pairs,
        &predicted,
        catalog,
        config.projection.reference_epoch,
        names,
    )?;
    set.fill_sky_positions(frame.transform.as_ref())?;
    set.reorder();
    set.relabel();

    info!(
        "observation {}: {} detections, {} catalog objects in view, {} identified",
        observation_id,
        detections.len(),
        predicted.len(),
        pairs.len()
    );
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::object;
    use crate::wcs::TanWcs;
    use test_helpers::{add_gaussian_source, normal_field};

    const ARCSEC: f64 = 1.0 / 3600.0;

    fn frame(flux: Array2<f64>, target: Option<&str>) -> FrameInput {
        let metadata = FrameMetadata {
            observation_id: 31,
            filter_name: "R".to_string(),
            target_name: target.map(str::to_string),
            observation_epoch: 2000.0,
        };
        // 64x64 frame centred on (200, 10) with 2 arcsec pixels
        let wcs = TanWcs::north_up(200.0, 10.0, 32.0, 32.0, 2.0 * ARCSEC).unwrap();
        FrameInput::new(metadata, flux, Box::new(wcs))
    }

    fn config() -> FinderConfig {
        let mut config = FinderConfig::default();
        config.detection.aperture_radius = 3.0;
        config.detection.blank_radius = 6.0;
        config.detection.max_count = 10;
        config.detection.significance = 6.0;
        config
    }

    #[test]
    fn test_frame_with_target_and_field_star() {
        let mut flux = normal_field((64, 64), 100.0, 2.0, 5);
        // Target at the reference pixel, field star 20 arcsec north (10 rows up)
        add_gaussian_source(&mut flux, 32.0, 32.0, 400.0, 1.0);
        add_gaussian_source(&mut flux, 22.0, 32.0, 900.0, 1.0);
        // Unknown source
        add_gaussian_source(&mut flux, 50.0, 12.0, 600.0, 1.0);

        let catalog = vec![
            object("V1", 200.0, 10.0),
            object("C1", 200.0, 10.0 + 20.0 * ARCSEC),
            object("far", 201.0, 10.0),
        ];
        let mut names = NameCache::new();
        let set = process_frame(&frame(flux, Some("V1")), &catalog, &config(), &mut names).unwrap();

        assert_eq!(set.len(), 3);
        let target = set.target().unwrap();
        assert_eq!(set.entries()[0], *target);
        assert_eq!(target.identity.as_deref(), Some("V1"));
        assert_eq!(target.label.as_deref(), Some("T"));
        assert_eq!((target.row, target.col), (32.0, 32.0));

        // Brightest non-target first
        assert_eq!(set.entries()[1].identity.as_deref(), Some("C1"));
        assert_eq!(set.entries()[1].label.as_deref(), Some("a"));
        assert_eq!(set.entries()[2].identity, None);
        assert_eq!(set.entries()[2].label.as_deref(), Some("b"));

        // Every entry has a sky position
        assert!(set.entries().iter().all(|e| e.ra.is_some() && e.dec.is_some()));
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn test_blank_frame_gives_empty_set() {
        let flux = normal_field((64, 64), 100.0, 2.0, 9);
        let catalog = vec![object("V1", 200.0, 10.0)];
        let set = process_frame(&frame(flux, None), &catalog, &config(), &mut NameCache::new())
            .unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_bad_detection_config_fails_frame() {
        let flux = normal_field((16, 16), 0.0, 1.0, 1);
        let mut config = config();
        config.detection.blank_radius = 1.0;
        let err = process_frame(&frame(flux, None), &[], &config, &mut NameCache::new())
            .unwrap_err();
        assert!(matches!(
            err,
            FrameError::Detection(DetectionError::BlankRadiusTooSmall { .. })
        ));
    }
}
