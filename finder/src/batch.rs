//! Parallel processing of many frames.
//!
//! Frames are independent: each has its own flux array, catalog subset and
//! result set, so the batch is a plain rayon map with one frame per task.
//! Results are committed to the store as each frame finishes, so a crash
//! part way through loses at most the frames still in flight. A frame that
//! fails is recorded against its observation id and the batch carries on.

use finder_types::FrameMetadata;
use log::{info, warn};
use ndarray::Array2;
use rayon::prelude::*;

use crate::catalog::CatalogObject;
use crate::config::{ConfigError, FinderConfig};
use crate::pipeline::{process_frame, FrameError, FrameInput};
use crate::results::{NameCache, ResultStore};

/// Outcome of a batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// `(observation_id, entries saved)` for each frame that completed
    pub saved: Vec<(i64, usize)>,
    /// Frames that failed, with the reason
    pub failures: Vec<(i64, FrameError)>,
}

impl BatchReport {
    /// True when every frame was processed and saved.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn frames(&self) -> usize {
        self.saved.len() + self.failures.len()
    }
}

/// Process and persist every frame in parallel.
///
/// # Arguments
/// * `frames` - Frames to process
/// * `catalog_for` - Supplies the catalog subset of a frame's vicinity
/// * `config` - Finder configuration, validated once before any frame is read
/// * `store` - Where each frame's results are committed
///
/// # Returns
/// A report with per-frame outcomes in input order.
///
/// # Errors
/// Only configuration errors abort the batch. Per-frame failures, including
/// failed saves, end up in [`BatchReport::failures`].
pub fn process_batch<'c, F, S>(
    frames: &[FrameInput],
    catalog_for: F,
    config: &FinderConfig,
    store: &S,
) -> Result<BatchReport, ConfigError>
where
    F: Fn(&FrameMetadata) -> &'c [CatalogObject] + Sync,
    S: ResultStore + ?Sized,
{
    config.validate()?;

    // One name cache per rayon work split, never shared between threads
    let outcomes: Vec<(i64, Result<usize, FrameError>)> = frames
        .par_iter()
        .map_init(NameCache::new, |names, frame| {
            let observation_id = frame.metadata.observation_id;
            let outcome = process_frame(frame, catalog_for(&frame.metadata), config, names)
                .and_then(|set| {
                    store.save(&set)?;
                    Ok(set.len())
                });
            (observation_id, outcome)
        })
        .collect();

    let mut report = BatchReport::default();
    for (observation_id, outcome) in outcomes {
        match outcome {
            Ok(entries) => report.saved.push((observation_id, entries)),
            Err(err) => {
                warn!("observation {}: {}", observation_id, err);
                report.failures.push((observation_id, err));
            }
        }
    }

    info!(
        "batch finished: {} frames saved, {} failed",
        report.saved.len(),
        report.failures.len()
    );
    Ok(report)
}

/// Evaluate `trial` for every `(row_param, col_param)` combination in
/// parallel and collect the results into a grid.
///
/// Each row of the grid is computed by one task and returned with its index;
/// the grid is filled only after all tasks have joined, so no cell is ever
/// written concurrently.
pub fn run_trial_grid<P, Q, R, F>(row_params: &[P], col_params: &[Q], trial: F) -> Array2<R>
where
    P: Sync,
    Q: Sync,
    R: Send + Default,
    F: Fn(&P, &Q) -> R + Sync,
{
    let rows: Vec<(usize, Vec<R>)> = row_params
        .par_iter()
        .enumerate()
        .map(|(i, row_param)| {
            let cells = col_params
                .iter()
                .map(|col_param| trial(row_param, col_param))
                .collect();
            (i, cells)
        })
        .collect();

    let mut grid = Array2::from_shape_simple_fn((row_params.len(), col_params.len()), R::default);
    for (i, cells) in rows {
        for (j, value) in cells.into_iter().enumerate() {
            grid[[i, j]] = value;
        }
    }
    grid
}
