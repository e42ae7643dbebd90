//! Lightweight types shared by the frame finder and its persistence layers.
//!
//! Holds the on-disk / relational record shapes for find results and the
//! `StatsScan` scanner used for background and threshold statistics. Nothing
//! here depends on ndarray so storage tools can link it cheaply.

pub mod records;
pub mod stats_scan;

pub use records::{FrameMetadata, ResultFile, ResultRecord, ResultRow};
pub use stats_scan::{median, percentile, StatsError, StatsScan};
