//! Persisted shapes of a frame's find results.
//!
//! `ResultFile` is the structured-file form: frame metadata followed by an
//! ordered list of `ResultRecord`s. `ResultRow` is the relational form of the
//! same data, one row per entry keyed by `(observation_id, catalog_object_id)`.

use serde::{Deserialize, Serialize};

/// Frame level metadata stored alongside every result set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrameMetadata {
    /// Archive observation identifier
    pub observation_id: i64,
    /// Filter the frame was taken through
    pub filter_name: String,
    /// Name of the science target, if the frame has one
    pub target_name: Option<String>,
    /// Observation epoch as a decimal Julian year
    pub observation_epoch: f64,
}

/// One entry of a result set.
///
/// Field order is part of the file format and must not change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultRecord {
    pub name: Option<String>,
    pub label: Option<String>,
    pub row: f64,
    pub col: f64,
    pub ra: Option<f64>,
    pub dec: Option<f64>,
    pub aperture: f64,
    pub flux_sum: f64,
    pub hidden: bool,
    pub is_target: bool,
    /// Catalog identifier of an entry identified from the catalog
    #[serde(default)]
    pub catalog_object_id: Option<String>,
}

/// Structured result file: metadata header then records in set order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultFile {
    pub metadata: FrameMetadata,
    pub records: Vec<ResultRecord>,
}

/// Relational form of a result record.
///
/// Identified entries are keyed by `(observation_id, catalog_object_id)`;
/// unidentified entries have no catalog id and are keyed by `ordinal`.
/// Hidden entries stay as rows with `hidden = true`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultRow {
    pub observation_id: i64,
    pub catalog_object_id: Option<String>,
    /// Position of the entry within its result set
    pub ordinal: usize,
    /// Display name of the identified object
    pub name: Option<String>,
    pub label: Option<String>,
    pub row: f64,
    pub col: f64,
    pub ra: Option<f64>,
    pub dec: Option<f64>,
    pub aperture: f64,
    pub flux_sum: f64,
    pub hidden: bool,
    pub is_target: bool,
}

impl ResultRow {
    /// Build the row for `record` at position `ordinal` of an observation.
    pub fn from_record(observation_id: i64, ordinal: usize, record: &ResultRecord) -> Self {
        Self {
            observation_id,
            catalog_object_id: record.catalog_object_id.clone(),
            ordinal,
            name: record.name.clone(),
            label: record.label.clone(),
            row: record.row,
            col: record.col,
            ra: record.ra,
            dec: record.dec,
            aperture: record.aperture,
            flux_sum: record.flux_sum,
            hidden: record.hidden,
            is_target: record.is_target,
        }
    }

    /// Convert the row back into a record, dropping the relational keys.
    pub fn to_record(&self) -> ResultRecord {
        ResultRecord {
            name: self.name.clone(),
            label: self.label.clone(),
            row: self.row,
            col: self.col,
            ra: self.ra,
            dec: self.dec,
            aperture: self.aperture,
            flux_sum: self.flux_sum,
            hidden: self.hidden,
            is_target: self.is_target,
            catalog_object_id: self.catalog_object_id.clone(),
        }
    }
}

impl ResultFile {
    /// Flatten into relational rows, ordinals following record order.
    pub fn to_rows(&self) -> Vec<ResultRow> {
        self.records
            .iter()
            .enumerate()
            .map(|(ordinal, record)| {
                ResultRow::from_record(self.metadata.observation_id, ordinal, record)
            })
            .collect()
    }

    /// Rebuild a file from metadata and rows in any order; rows are placed
    /// by their ordinal.
    pub fn from_rows(metadata: FrameMetadata, rows: &[ResultRow]) -> Self {
        let mut sorted: Vec<&ResultRow> = rows.iter().collect();
        sorted.sort_by_key(|row| row.ordinal);
        Self {
            metadata,
            records: sorted.into_iter().map(ResultRow::to_record).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_file() -> ResultFile {
        ResultFile {
            metadata: FrameMetadata {
                observation_id: 4411,
                filter_name: "R".to_string(),
                target_name: Some("V1234 Cyg".to_string()),
                observation_epoch: 2019.4711,
            },
            records: vec![
                ResultRecord {
                    name: Some("V1234 Cyg".to_string()),
                    label: Some("T".to_string()),
                    row: 101.0,
                    col: 88.0,
                    ra: Some(301.25),
                    dec: Some(41.5),
                    aperture: 4.0,
                    flux_sum: 15321.75,
                    hidden: false,
                    is_target: true,
                    catalog_object_id: Some("GSC-3152-0877".to_string()),
                },
                ResultRecord {
                    name: None,
                    label: None,
                    row: 12.0,
                    col: 240.0,
                    ra: None,
                    dec: None,
                    aperture: 4.0,
                    flux_sum: 0.1 + 0.2,
                    hidden: true,
                    is_target: false,
                    catalog_object_id: None,
                },
            ],
        }
    }

    #[test]
    fn test_json_preserves_records_exactly() {
        let file = sample_file();
        let text = serde_json::to_string(&file).unwrap();
        let back: ResultFile = serde_json::from_str(&text).unwrap();
        assert_eq!(back, file);
    }

    #[test]
    fn test_record_field_order_in_json() {
        let file = sample_file();
        let text = serde_json::to_string(&file.records[0]).unwrap();
        let positions: Vec<usize> = [
            "\"name\"",
            "\"label\"",
            "\"row\"",
            "\"col\"",
            "\"ra\"",
            "\"dec\"",
            "\"aperture\"",
            "\"flux_sum\"",
            "\"hidden\"",
            "\"is_target\"",
            "\"catalog_object_id\"",
        ]
        .iter()
        .map(|key| text.find(key).unwrap())
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_rows_restore_order_from_ordinals() {
        let file = sample_file();
        let mut rows = file.to_rows();
        assert_eq!(rows[0].catalog_object_id.as_deref(), Some("GSC-3152-0877"));
        assert_eq!(rows[0].name.as_deref(), Some("V1234 Cyg"));
        assert_eq!(rows[1].catalog_object_id, None);
        assert!(rows[1].hidden);

        rows.reverse();
        let restored = ResultFile::from_rows(file.metadata.clone(), &rows);
        assert_eq!(restored, file);
    }

    #[test]
    fn test_older_files_without_catalog_id_load() {
        let text = r#"{"name":"V1234 Cyg","label":"T","row":1.0,"col":2.0,"ra":null,
            "dec":null,"aperture":4.0,"flux_sum":10.0,"hidden":false,"is_target":true}"#;
        let record: ResultRecord = serde_json::from_str(text).unwrap();
        assert_eq!(record.catalog_object_id, None);
        assert_eq!(record.name.as_deref(), Some("V1234 Cyg"));
    }
}
