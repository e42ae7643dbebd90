#![doc = include_str!("../README.md")]

pub mod algo;
pub mod batch;
pub mod catalog;
pub mod config;
pub mod image_proc;
pub mod pipeline;
pub mod results;
pub mod wcs;

pub use algo::{
    match_positions, register_offset, DetectionTally, MatchPair, OffsetCandidate,
    RegistrationConfig, ScoreMode, SearchMode,
};
pub use batch::{process_batch, run_trial_grid, BatchReport};
pub use catalog::{CatalogObject, CatalogProjector, ProjectedPosition};
pub use config::{ConfigError, FinderConfig};
pub use image_proc::{Detection, DetectionConfig, SourceDetector, ThresholdPolicy};
pub use pipeline::{process_frame, FrameError, FrameInput};
pub use results::{FindResultSet, MergeReport, NameCache, ResultEntry, ResultStore};
pub use wcs::{FrameBounds, SkyToPixel, TanWcs};
