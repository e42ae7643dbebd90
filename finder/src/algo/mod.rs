//! Matching and registration algorithms.

pub mod matching;
pub mod registration;
pub mod tally;

pub use matching::{match_points, match_positions, MatchError, MatchPair};
pub use registration::{
    register_offset, OffsetCandidate, RegistrationConfig, RegistrationError, ScoreMode, SearchMode,
};
pub use tally::DetectionTally;
