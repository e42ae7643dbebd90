//! Finder configuration.
//!
//! One JSON document holds every tunable of a run, grouped by stage.
//! Missing sections or fields fall back to their defaults, so a config file
//! only needs the values it changes:
//!
//! ```json
//! {
//!   "detection": { "significance": 4.0, "aperture_radius": 3.0, "blank_radius": 6.0,
//!                  "background_median": 0.0, "background_std": 1.0,
//!                  "max_count": 50, "ignore_margins": 8 },
//!   "matching": { "max_distance": 2.5 }
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::algo::matching::MatchError;
use crate::algo::registration::{RegistrationConfig, RegistrationError};
use crate::catalog::{CatalogProjector, ProjectionError};
use crate::image_proc::detection::{DetectionConfig, DetectionError};

/// Configuration problems, found before any frame is touched.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid background settings: clip_sigma {clip_sigma}")]
    Background { clip_sigma: f64 },
    #[error(transparent)]
    Detection(#[from] DetectionError),
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    #[error(transparent)]
    Matching(#[from] MatchError),
    #[error(transparent)]
    Registration(#[from] RegistrationError),
}

/// How the frame background is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    /// Measure the background of each frame; when false the detection
    /// section's `background_median` / `background_std` are used as given
    pub estimate: bool,
    /// Sigma clip threshold
    pub clip_sigma: f64,
    /// Clipping iterations
    pub max_iterations: usize,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            estimate: true,
            clip_sigma: 3.0,
            max_iterations: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Largest accepted catalog to detection separation (pixels)
    pub max_distance: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self { max_distance: 3.0 }
    }
}

/// Full finder configuration.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FinderConfig {
    pub background: BackgroundConfig,
    pub detection: DetectionConfig,
    pub projection: CatalogProjector,
    pub matching: MatchingConfig,
    pub registration: RegistrationConfig,
}

impl FinderConfig {
    /// Check every section.
    ///
    /// When the background is estimated per frame the detection section's
    /// background values are placeholders and are not checked here.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let background = &self.background;
        if !(background.clip_sigma.is_finite() && background.clip_sigma > 0.0) {
            return Err(ConfigError::Background {
                clip_sigma: background.clip_sigma,
            });
        }
        self.detection.validate()?;
        self.projection.validate()?;
        let max_distance = self.matching.max_distance;
        if !(max_distance.is_finite() && max_distance >= 0.0) {
            return Err(MatchError::InvalidMaxDistance(max_distance).into());
        }
        self.registration.validate()?;
        Ok(())
    }

    /// Load and validate a config file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: FinderConfig =
            serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Save as pretty printed JSON.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::registration::SearchMode;
    use tempfile::TempDir;

    #[test]
    fn test_default_is_valid() {
        FinderConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("finder.json");
        std::fs::write(
            &path,
            r#"{
                "matching": { "max_distance": 2.5 },
                "registration": { "window": 4, "search_mode": "separable" }
            }"#,
        )
        .unwrap();

        let config = FinderConfig::load_from_file(&path).unwrap();
        assert_eq!(config.matching.max_distance, 2.5);
        assert_eq!(config.registration.window, 4);
        assert_eq!(config.registration.search_mode, SearchMode::Separable);
        assert_eq!(config.detection, DetectionConfig::default());
        assert_eq!(config.projection, CatalogProjector::default());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("finder.json");
        let mut config = FinderConfig::default();
        config.detection.max_count = 12;
        config.projection.include_suppressed = true;

        config.save_to_file(&path).unwrap();
        assert_eq!(FinderConfig::load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_sections_rejected() {
        let mut config = FinderConfig::default();
        config.detection.blank_radius = 1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Detection(DetectionError::BlankRadiusTooSmall { .. }))
        ));

        let mut config = FinderConfig::default();
        config.registration.window = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Registration(RegistrationError::ZeroWindow))
        ));

        let mut config = FinderConfig::default();
        config.matching.max_distance = -2.0;
        assert!(matches!(config.validate(), Err(ConfigError::Matching(_))));

        let mut config = FinderConfig::default();
        config.background.clip_sigma = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Background { .. })
        ));
    }

    #[test]
    fn test_errors_name_the_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.json");
        let err = FinderConfig::load_from_file(&missing).unwrap_err();
        assert!(err.to_string().contains("nope.json"));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "[1, 2").unwrap();
        assert!(matches!(
            FinderConfig::load_from_file(&bad),
            Err(ConfigError::Parse { .. })
        ));
    }
}
