//! Per-frame find results and their curation.
//!
//! A `FindResultSet` starts as the detector output for one frame, picks up
//! catalog identities from the matcher and is then curated: entries are
//! hidden, the set is reordered so the science target leads, and visible
//! entries get short labels for charts and reports.
//!
//! # Ordering and labels
//!
//! After [`FindResultSet::reorder`] the target (if any) is first and the rest
//! follow in descending `flux_sum`. [`FindResultSet::relabel`] then labels
//! the visible target `"T"` and every other visible entry `a, b, ..., z, aa,
//! ab, ...` in set order. Hidden entries carry no label.
//!
//! # Identities
//!
//! An identity (catalog display name) appears on at most one entry. Breaking
//! that, or identifying the same detection twice, is a logic error in the
//! caller and is reported immediately rather than patched over.
//!
//! Entries identified through the matcher also carry the catalog object id.
//! That id, not the display name, keys the relational form of the set, so
//! cleaning or renaming a display name never changes a row key.

pub mod names;
pub mod persist;

use finder_types::{FrameMetadata, ResultFile, ResultRecord};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::algo::matching::MatchPair;
use crate::catalog::{CatalogObject, ProjectedPosition};
use crate::image_proc::detection::Detection;
use crate::wcs::{SkyToPixel, WcsError};

pub use names::NameCache;
pub use persist::{InMemoryTable, JsonResultStore, PersistError, ResultStore};

/// Label of the target entry.
pub const TARGET_LABEL: &str = "T";

/// Errors from result set curation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResultSetError {
    #[error("Entry {index} out of range for result set of {len}")]
    NoSuchEntry { index: usize, len: usize },
    #[error("Entry {index} is already identified as {existing}")]
    AlreadyIdentified { index: usize, existing: String },
    #[error("Identity {0} already belongs to another entry")]
    DuplicateIdentity(String),
    #[error("Catalog object {0} already belongs to another entry")]
    DuplicateCatalogId(String),
    #[error("Match references predicted position {predicted_index}, only {available} available")]
    NoSuchPrediction {
        predicted_index: usize,
        available: usize,
    },
    #[error("Match references catalog object {catalog_index}, catalog has {available}")]
    NoSuchCatalogObject {
        catalog_index: usize,
        available: usize,
    },
    #[error("Detection {0} appears in more than one match")]
    DetectionMatchedTwice(usize),
    #[error("Predicted position {0} appears in more than one match")]
    PredictionMatchedTwice(usize),
    #[error("Result set has more than one target entry")]
    MultipleTargets,
    #[error("Cannot merge results of observation {found} into observation {expected}")]
    ObservationMismatch { expected: i64, found: i64 },
}

/// One detection with its identity and curation state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEntry {
    pub row: f64,
    pub col: f64,
    pub ra: Option<f64>,
    pub dec: Option<f64>,
    pub aperture: f64,
    pub flux_sum: f64,
    /// Catalog display name, if the entry was identified
    pub identity: Option<String>,
    /// Catalog object id, when the identity came from the catalog
    #[serde(default)]
    pub catalog_id: Option<String>,
    pub label: Option<String>,
    pub hidden: bool,
    pub is_target: bool,
}

impl ResultEntry {
    fn from_detection(detection: &Detection) -> Self {
        Self {
            row: detection.row as f64,
            col: detection.col as f64,
            ra: None,
            dec: None,
            aperture: detection.aperture_radius,
            flux_sum: detection.flux_sum,
            identity: None,
            catalog_id: None,
            label: None,
            hidden: false,
            is_target: false,
        }
    }

    fn to_record(&self) -> ResultRecord {
        ResultRecord {
            name: self.identity.clone(),
            label: self.label.clone(),
            row: self.row,
            col: self.col,
            ra: self.ra,
            dec: self.dec,
            aperture: self.aperture,
            flux_sum: self.flux_sum,
            hidden: self.hidden,
            is_target: self.is_target,
            catalog_object_id: self.catalog_id.clone(),
        }
    }

    fn from_record(record: ResultRecord) -> Self {
        Self {
            row: record.row,
            col: record.col,
            ra: record.ra,
            dec: record.dec,
            aperture: record.aperture,
            flux_sum: record.flux_sum,
            identity: record.name,
            catalog_id: record.catalog_object_id,
            label: record.label,
            hidden: record.hidden,
            is_target: record.is_target,
        }
    }
}

/// Outcome of [`FindResultSet::merge`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    /// Entries appended to the set
    pub added: usize,
    /// Identities whose entry was overwritten by the incoming one
    pub replaced: Vec<String>,
    /// Identities already present and left alone
    pub skipped: Vec<String>,
    /// Unidentified incoming entries at a position already in the set
    pub skipped_unidentified: usize,
}

/// Ordered find results of one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FindResultSet {
    metadata: FrameMetadata,
    entries: Vec<ResultEntry>,
}

/// Label for the `index`-th visible non-target entry: `a..z`, then `aa, ab, ...`.
pub fn label_for(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push(b'a' + (n % 26) as u8);
        n /= 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

impl FindResultSet {
    pub fn new(metadata: FrameMetadata) -> Self {
        Self {
            metadata,
            entries: Vec::new(),
        }
    }

    /// Unidentified entries for `detections`, in detection order, so entry
    /// `i` corresponds to `detections[i]`.
    pub fn from_detections(metadata: FrameMetadata, detections: &[Detection]) -> Self {
        Self {
            metadata,
            entries: detections.iter().map(ResultEntry::from_detection).collect(),
        }
    }

    pub fn metadata(&self) -> &FrameMetadata {
        &self.metadata
    }

    pub fn entries(&self) -> &[ResultEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check_index(&self, index: usize) -> Result<(), ResultSetError> {
        if index < self.entries.len() {
            Ok(())
        } else {
            Err(ResultSetError::NoSuchEntry {
                index,
                len: self.entries.len(),
            })
        }
    }

    /// Index of the entry identified as `name`.
    pub fn find_index(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.identity.as_deref() == Some(name))
    }

    fn target_index_other_than(&self, index: usize) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .position(|(i, entry)| i != index && entry.is_target)
    }

    /// Index of the entry matched to catalog object `id`.
    pub fn find_catalog_index(&self, id: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.catalog_id.as_deref() == Some(id))
    }

    /// Entry identified as `name`, if there is one.
    pub fn find(&self, name: &str) -> Option<&ResultEntry> {
        self.find_index(name).map(|index| &self.entries[index])
    }

    pub fn target(&self) -> Option<&ResultEntry> {
        self.entries.iter().find(|entry| entry.is_target)
    }

    pub fn visible(&self) -> impl Iterator<Item = &ResultEntry> + '_ {
        self.entries.iter().filter(|entry| !entry.hidden)
    }

    /// Attach a catalog identity to entry `index`.
    ///
    /// The entry becomes the target when `identity` equals the frame's
    /// target name.
    ///
    /// # Errors
    /// * `NoSuchEntry` - `index` is out of range
    /// * `AlreadyIdentified` - the entry already has an identity
    /// * `DuplicateIdentity` - another entry already carries `identity`
    pub fn add_detection_identity(
        &mut self,
        index: usize,
        identity: &str,
        sky_position: Option<(f64, f64)>,
    ) -> Result<(), ResultSetError> {
        self.check_index(index)?;
        if let Some(existing) = &self.entries[index].identity {
            return Err(ResultSetError::AlreadyIdentified {
                index,
                existing: existing.clone(),
            });
        }
        if self.find_index(identity).is_some() {
            return Err(ResultSetError::DuplicateIdentity(identity.to_string()));
        }

        let is_target = self.metadata.target_name.as_deref() == Some(identity);
        let entry = &mut self.entries[index];
        entry.identity = Some(identity.to_string());
        if let Some((ra, dec)) = sky_position {
            entry.ra = Some(ra);
            entry.dec = Some(dec);
        }
        entry.is_target = is_target;
        Ok(())
    }

    /// Identify entries from matcher output.
    ///
    /// Entry `i` must correspond to detection `i` of the matched detection
    /// list, as produced by [`FindResultSet::from_detections`]. Each matched
    /// entry gets the catalog object's display name and its sky position at
    /// the frame epoch.
    ///
    /// Every pair is checked before anything is changed, so a bad match list
    /// leaves the set untouched.
    ///
    /// # Returns
    /// Number of entries identified
    pub fn apply_matches(
        &mut self,
        pairs: &[MatchPair],
        predicted: &[ProjectedPosition],
        catalog: &[CatalogObject],
        reference_epoch: f64,
        names: &mut NameCache,
    ) -> Result<usize, ResultSetError> {
        let mut detection_seen = vec![false; self.entries.len()];
        let mut prediction_seen = vec![false; predicted.len()];
        let mut identities: Vec<(usize, String, &String, (f64, f64))> = Vec::with_capacity(pairs.len());

        for pair in pairs {
            self.check_index(pair.detected_index)?;
            let projected =
                predicted
                    .get(pair.predicted_index)
                    .ok_or(ResultSetError::NoSuchPrediction {
                        predicted_index: pair.predicted_index,
                        available: predicted.len(),
                    })?;
            let object =
                catalog
                    .get(projected.catalog_index)
                    .ok_or(ResultSetError::NoSuchCatalogObject {
                        catalog_index: projected.catalog_index,
                        available: catalog.len(),
                    })?;

            if std::mem::replace(&mut detection_seen[pair.detected_index], true) {
                return Err(ResultSetError::DetectionMatchedTwice(pair.detected_index));
            }
            if std::mem::replace(&mut prediction_seen[pair.predicted_index], true) {
                return Err(ResultSetError::PredictionMatchedTwice(pair.predicted_index));
            }
            if let Some(existing) = &self.entries[pair.detected_index].identity {
                return Err(ResultSetError::AlreadyIdentified {
                    index: pair.detected_index,
                    existing: existing.clone(),
                });
            }

            let id_in_batch = identities.iter().any(|(_, _, id, _)| **id == object.id);
            if id_in_batch || self.find_catalog_index(&object.id).is_some() {
                return Err(ResultSetError::DuplicateCatalogId(object.id.clone()));
            }
            let name = names.display_name(object);
            let duplicate_in_batch = identities.iter().any(|(_, other, _, _)| other == &name);
            if duplicate_in_batch || self.find_index(&name).is_some() {
                return Err(ResultSetError::DuplicateIdentity(name));
            }
            let sky = object.position_at(self.metadata.observation_epoch, reference_epoch);
            identities.push((pair.detected_index, name, &object.id, sky));
        }

        let identified = identities.len();
        for (index, name, id, sky) in identities {
            self.add_detection_identity(index, &name, Some(sky))?;
            self.entries[index].catalog_id = Some(id.clone());
        }
        debug!(
            "observation {}: identified {} of {} entries",
            self.metadata.observation_id,
            identified,
            self.entries.len()
        );
        Ok(identified)
    }

    /// Fill in sky positions of entries that have none by mapping their pixel
    /// position through `transform`.
    pub fn fill_sky_positions(&mut self, transform: &dyn SkyToPixel) -> Result<(), WcsError> {
        for entry in self.entries.iter_mut().filter(|entry| entry.ra.is_none()) {
            let (ra, dec) = transform.pixel_to_sky(entry.row, entry.col)?;
            entry.ra = Some(ra);
            entry.dec = Some(dec);
        }
        Ok(())
    }

    /// Hide entry `index`. Its label is dropped straight away.
    pub fn hide(&mut self, index: usize) -> Result<(), ResultSetError> {
        self.check_index(index)?;
        let entry = &mut self.entries[index];
        entry.hidden = true;
        entry.label = None;
        Ok(())
    }

    /// Make a hidden entry visible again. It stays unlabeled until the next
    /// [`FindResultSet::relabel`].
    pub fn unhide(&mut self, index: usize) -> Result<(), ResultSetError> {
        self.check_index(index)?;
        self.entries[index].hidden = false;
        Ok(())
    }

    /// Move the target to the front and sort the rest by descending
    /// `flux_sum`. Equal fluxes keep their current relative order.
    pub fn reorder(&mut self) {
        self.entries.sort_by(|a, b| {
            b.is_target
                .cmp(&a.is_target)
                .then_with(|| b.flux_sum.total_cmp(&a.flux_sum))
        });
    }

    /// Label visible entries in their current order; see the module docs.
    pub fn relabel(&mut self) {
        let mut next = 0;
        for entry in &mut self.entries {
            entry.label = if entry.hidden {
                None
            } else if entry.is_target {
                Some(TARGET_LABEL.to_string())
            } else {
                next += 1;
                Some(label_for(next - 1))
            };
        }
    }

    /// Add entries of `other` that this set does not already have.
    ///
    /// Identified entries are matched by identity. A duplicate identity is
    /// skipped and reported, unless `allow_duplicate_override` is set, in
    /// which case the incoming entry replaces the existing one in place.
    /// Incoming entries whose catalog id already belongs to a different
    /// entry are always skipped. An incoming target flag is dropped when the
    /// set already has a target elsewhere.
    /// Unidentified entries are matched by exact pixel position. New entries
    /// are appended; call [`FindResultSet::reorder`] and
    /// [`FindResultSet::relabel`] afterwards to restore ordering and labels.
    ///
    /// # Errors
    /// * `ObservationMismatch` - `other` belongs to a different observation
    pub fn merge(
        &mut self,
        other: &FindResultSet,
        allow_duplicate_override: bool,
    ) -> Result<MergeReport, ResultSetError> {
        if other.metadata.observation_id != self.metadata.observation_id {
            return Err(ResultSetError::ObservationMismatch {
                expected: self.metadata.observation_id,
                found: other.metadata.observation_id,
            });
        }

        let mut report = MergeReport::default();
        for incoming in &other.entries {
            match &incoming.identity {
                Some(name) => {
                    let existing = self.find_index(name);
                    let catalog_owner = incoming
                        .catalog_id
                        .as_deref()
                        .and_then(|id| self.find_catalog_index(id));
                    // Catalog ids key the relational form and must stay unique
                    let catalog_clash = catalog_owner.is_some() && catalog_owner != existing;
                    match existing {
                        Some(index) if allow_duplicate_override && !catalog_clash => {
                            let mut entry = incoming.clone();
                            // Only one target per set
                            if entry.is_target && self.target_index_other_than(index).is_some() {
                                entry.is_target = false;
                            }
                            self.entries[index] = entry;
                            report.replaced.push(name.clone());
                        }
                        None if !catalog_clash => {
                            let mut entry = incoming.clone();
                            if entry.is_target && self.target().is_some() {
                                entry.is_target = false;
                            }
                            self.entries.push(entry);
                            report.added += 1;
                        }
                        _ => {
                            info!(
                                "observation {}: {} already present, skipping",
                                self.metadata.observation_id, name
                            );
                            report.skipped.push(name.clone());
                        }
                    }
                }
                None => {
                    let present = self.entries.iter().any(|entry| {
                        entry.identity.is_none()
                            && entry.row == incoming.row
                            && entry.col == incoming.col
                    });
                    if present {
                        report.skipped_unidentified += 1;
                    } else {
                        self.entries.push(incoming.clone());
                        report.added += 1;
                    }
                }
            }
        }
        Ok(report)
    }

    /// Records in set order, for persistence.
    pub fn to_records(&self) -> Vec<ResultRecord> {
        self.entries.iter().map(ResultEntry::to_record).collect()
    }

    pub fn to_file(&self) -> ResultFile {
        ResultFile {
            metadata: self.metadata.clone(),
            records: self.to_records(),
        }
    }

    /// Rebuild a set from persisted records, checking the identity and
    /// target invariants.
    pub fn from_records(
        metadata: FrameMetadata,
        records: Vec<ResultRecord>,
    ) -> Result<Self, ResultSetError> {
        let set = Self {
            metadata,
            entries: records.into_iter().map(ResultEntry::from_record).collect(),
        };
        if set.entries.iter().filter(|entry| entry.is_target).count() > 1 {
            return Err(ResultSetError::MultipleTargets);
        }
        for (index, entry) in set.entries.iter().enumerate() {
            if let Some(name) = &entry.identity {
                if set.find_index(name) != Some(index) {
                    return Err(ResultSetError::DuplicateIdentity(name.clone()));
                }
            }
            if let Some(id) = &entry.catalog_id {
                if set.find_catalog_index(id) != Some(index) {
                    return Err(ResultSetError::DuplicateCatalogId(id.clone()));
                }
            }
        }
        Ok(set)
    }

    pub fn from_file(file: ResultFile) -> Result<Self, ResultSetError> {
        Self::from_records(file.metadata, file.records)
    }
}
