//! Persistence of find results.
//!
//! Two stores share the [`ResultStore`] trait:
//!
//! - [`JsonResultStore`] writes one JSON [`ResultFile`] per observation under
//!   a root directory. Files are written to a temporary name and renamed into
//!   place, so a crash mid-batch never leaves a half-written result behind.
//! - [`InMemoryTable`] keeps the relational form: a metadata table keyed by
//!   observation id and a row table keyed by `(observation_id,
//!   catalog_object_id)`, with unidentified rows keyed by ordinal.
//!
//! Both round-trip every field exactly and preserve entry order.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use finder_types::{FrameMetadata, ResultFile, ResultRow};
use log::debug;
use thiserror::Error;

use super::{FindResultSet, ResultSetError};

/// Errors from saving or loading results. Each names the file or
/// observation involved so a batch can skip just that unit.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed result file {path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("No results stored for observation {0}")]
    NotFound(i64),
    #[error("Stored results for observation {observation_id} are inconsistent: {source}")]
    Invalid {
        observation_id: i64,
        #[source]
        source: ResultSetError,
    },
}

/// Somewhere result sets can be committed and read back, one observation at
/// a time.
pub trait ResultStore: Send + Sync {
    /// Store `set`, replacing anything stored for the same observation.
    fn save(&self, set: &FindResultSet) -> Result<(), PersistError>;

    /// Load the result set of `observation_id`.
    fn load(&self, observation_id: i64) -> Result<FindResultSet, PersistError>;
}

impl FindResultSet {
    /// Write the set to `path` as JSON.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), PersistError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(&self.to_file()).map_err(|source| {
            PersistError::Format {
                path: path.to_path_buf(),
                source,
            }
        })?;

        // Write beside the destination then rename over it
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(|source| PersistError::Io {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, path).map_err(|source| PersistError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    /// Read a set previously written by [`FindResultSet::save_to_file`].
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, PersistError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| PersistError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ResultFile =
            serde_json::from_str(&json).map_err(|source| PersistError::Format {
                path: path.to_path_buf(),
                source,
            })?;
        let observation_id = file.metadata.observation_id;
        FindResultSet::from_file(file).map_err(|source| PersistError::Invalid {
            observation_id,
            source,
        })
    }
}

/// One JSON file per observation under a root directory.
#[derive(Debug, Clone)]
pub struct JsonResultStore {
    root_path: PathBuf,
}

impl JsonResultStore {
    pub fn new<P: Into<PathBuf>>(root_path: P) -> Self {
        Self {
            root_path: root_path.into(),
        }
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// File holding the results of `observation_id`.
    pub fn path_for(&self, observation_id: i64) -> PathBuf {
        self.root_path.join(format!("obs_{observation_id}.json"))
    }

    /// Observation ids with stored results, ascending.
    pub fn list(&self) -> Result<Vec<i64>, PersistError> {
        if !self.root_path.exists() {
            return Ok(Vec::new());
        }
        let io_error = |source| PersistError::Io {
            path: self.root_path.clone(),
            source,
        };

        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root_path).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|stem| stem.strip_prefix("obs_"))
                .and_then(|id| id.parse::<i64>().ok())
            {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }
}

impl ResultStore for JsonResultStore {
    fn save(&self, set: &FindResultSet) -> Result<(), PersistError> {
        fs::create_dir_all(&self.root_path).map_err(|source| PersistError::Io {
            path: self.root_path.clone(),
            source,
        })?;
        let path = self.path_for(set.metadata().observation_id);
        set.save_to_file(&path)?;
        debug!("saved {} entries to {}", set.len(), path.display());
        Ok(())
    }

    fn load(&self, observation_id: i64) -> Result<FindResultSet, PersistError> {
        let path = self.path_for(observation_id);
        if !path.exists() {
            return Err(PersistError::NotFound(observation_id));
        }
        FindResultSet::load_from_file(path)
    }
}

/// Key of a row in [`InMemoryTable`]: identified rows by catalog object id,
/// unidentified rows by their ordinal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum RowKey {
    Identified(String),
    Unidentified(usize),
}

#[derive(Debug, Default)]
struct Tables {
    frames: BTreeMap<i64, FrameMetadata>,
    rows: BTreeMap<(i64, RowKey), ResultRow>,
}

/// Relational store held in memory, mirroring a frames table plus a results
/// table with a boolean `hidden` column.
#[derive(Debug, Default)]
pub struct InMemoryTable {
    tables: Mutex<Tables>,
}

impl InMemoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored rows of `observation_id`, in key order.
    pub fn rows(&self, observation_id: i64) -> Vec<ResultRow> {
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables
            .rows
            .iter()
            .filter(|((id, _), _)| *id == observation_id)
            .map(|(_, row)| row.clone())
            .collect()
    }

    /// Number of stored observations.
    pub fn observation_count(&self) -> usize {
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables.frames.len()
    }
}

impl ResultStore for InMemoryTable {
    fn save(&self, set: &FindResultSet) -> Result<(), PersistError> {
        let observation_id = set.metadata().observation_id;
        let rows = set.to_file().to_rows();

        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables.rows.retain(|(id, _), _| *id != observation_id);
        for row in rows {
            let key = match &row.catalog_object_id {
                Some(id) => RowKey::Identified(id.clone()),
                None => RowKey::Unidentified(row.ordinal),
            };
            tables.rows.insert((observation_id, key), row);
        }
        tables
            .frames
            .insert(observation_id, set.metadata().clone());
        Ok(())
    }

    fn load(&self, observation_id: i64) -> Result<FindResultSet, PersistError> {
        let metadata = {
            let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
            tables
                .frames
                .get(&observation_id)
                .cloned()
                .ok_or(PersistError::NotFound(observation_id))?
        };
        let rows = self.rows(observation_id);
        let file = ResultFile::from_rows(metadata, &rows);
        FindResultSet::from_file(file).map_err(|source| PersistError::Invalid {
            observation_id,
            source,
        })
    }
}
