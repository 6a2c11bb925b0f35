//! Config tree: where every artifact of a grid run lives.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::GridCoord;
use crate::fs_ops::{self, FsError};

/// Errors raised by illegal writes to a [`ConfigTreeBuilder`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    /// The cell is not part of the grid.
    #[error("Cell {lead_time}/{threshold} is not part of the grid")]
    UnknownCell {
        /// Lead-time key.
        lead_time: String,
        /// Threshold key.
        threshold: String,
    },
    /// The key was already written during this run.
    #[error("Cell {lead_time}/{threshold} already has a {field}")]
    AlreadyRecorded {
        /// Lead-time key.
        lead_time: String,
        /// Threshold key.
        threshold: String,
        /// Record field that was written twice.
        field: &'static str,
    },
    /// A compiled path was recorded before the primary path.
    #[error("Cell {lead_time}/{threshold} has no primary model to compile")]
    MissingPrimary {
        /// Lead-time key.
        lead_time: String,
        /// Threshold key.
        threshold: String,
    },
}

/// Artifact locations for one grid cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// Serialized primary model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_model_path: Option<PathBuf>,
    /// Compiled native predictor; only present alongside a primary model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiled_model_path: Option<PathBuf>,
}

impl ArtifactRecord {
    /// Whether no artifact has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.primary_model_path.is_none() && self.compiled_model_path.is_none()
    }
}

/// Immutable snapshot: lead-time key → threshold key → artifact record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigTree {
    cells: BTreeMap<String, BTreeMap<String, ArtifactRecord>>,
}

impl ConfigTree {
    /// Lead-time keys in sorted order.
    pub fn lead_time_keys(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }

    /// Threshold mapping for a lead-time key.
    pub fn thresholds(&self, lead_time_key: &str) -> Option<&BTreeMap<String, ArtifactRecord>> {
        self.cells.get(lead_time_key)
    }

    /// Record for a pair of canonical keys.
    pub fn get(&self, lead_time_key: &str, threshold_key: &str) -> Option<&ArtifactRecord> {
        self.cells.get(lead_time_key)?.get(threshold_key)
    }

    /// Record for a grid coordinate.
    pub fn record(&self, coord: &GridCoord) -> Option<&ArtifactRecord> {
        self.get(&coord.lead_time_key(), &coord.threshold_key())
    }

    /// Iterate `(lead_time_key, threshold_key, record)` in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &ArtifactRecord)> {
        self.cells.iter().flat_map(|(lead, thresholds)| {
            thresholds
                .iter()
                .map(move |(threshold, record)| (lead.as_str(), threshold.as_str(), record))
        })
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cells.values().map(BTreeMap::len).sum()
    }

    /// Whether the tree has no cells.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render the tree as pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write the tree as JSON to `path`, replacing any previous file.
    pub fn write_json(&self, path: &Path) -> Result<(), FsError> {
        let text = self.to_json().map_err(|err| FsError::Write {
            path: path.to_path_buf(),
            source: std::io::Error::other(err),
        })?;
        fs_ops::atomic_write(path, text.as_bytes())
    }
}

/// Accumulates artifact paths cell by cell during a run.
///
/// Every cell of the grid exists from construction on; cells are never
/// removed, and each field of a record can be written once.
#[derive(Debug, Clone)]
pub struct ConfigTreeBuilder {
    tree: ConfigTree,
}

impl ConfigTreeBuilder {
    /// Enumerate every cell with an empty record.
    pub fn new<'a>(coords: impl IntoIterator<Item = &'a GridCoord>) -> Self {
        let mut cells: BTreeMap<String, BTreeMap<String, ArtifactRecord>> = BTreeMap::new();
        for coord in coords {
            cells
                .entry(coord.lead_time_key())
                .or_default()
                .insert(coord.threshold_key(), ArtifactRecord::default());
        }
        Self {
            tree: ConfigTree { cells },
        }
    }

    /// Current state without consuming the builder.
    pub fn snapshot(&self) -> ConfigTree {
        self.tree.clone()
    }

    /// Record the primary model path for a cell.
    pub fn record_primary(&mut self, coord: &GridCoord, path: PathBuf) -> Result<(), TreeError> {
        let record = self.slot(coord)?;
        if record.primary_model_path.is_some() {
            return Err(TreeError::AlreadyRecorded {
                lead_time: coord.lead_time_key(),
                threshold: coord.threshold_key(),
                field: "primary_model_path",
            });
        }
        record.primary_model_path = Some(path);
        Ok(())
    }

    /// Record the compiled predictor path for a cell that already has a primary model.
    pub fn record_compiled(&mut self, coord: &GridCoord, path: PathBuf) -> Result<(), TreeError> {
        let record = self.slot(coord)?;
        if record.primary_model_path.is_none() {
            return Err(TreeError::MissingPrimary {
                lead_time: coord.lead_time_key(),
                threshold: coord.threshold_key(),
            });
        }
        if record.compiled_model_path.is_some() {
            return Err(TreeError::AlreadyRecorded {
                lead_time: coord.lead_time_key(),
                threshold: coord.threshold_key(),
                field: "compiled_model_path",
            });
        }
        record.compiled_model_path = Some(path);
        Ok(())
    }

    /// Finish the run and hand out the immutable tree.
    pub fn finish(self) -> ConfigTree {
        self.tree
    }

    fn slot(&mut self, coord: &GridCoord) -> Result<&mut ArtifactRecord, TreeError> {
        let lead_time = coord.lead_time_key();
        let threshold = coord.threshold_key();
        self.tree
            .cells
            .get_mut(&lead_time)
            .and_then(|thresholds| thresholds.get_mut(&threshold))
            .ok_or(TreeError::UnknownCell {
                lead_time,
                threshold,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coords() -> Vec<GridCoord> {
        let mut out = Vec::new();
        for lead_time in [24, 12] {
            for threshold in [0.1, 0.05, 0.01] {
                out.push(GridCoord {
                    lead_time,
                    threshold,
                });
            }
        }
        out
    }

    #[test]
    fn new_builder_enumerates_every_cell_empty() {
        let tree = ConfigTreeBuilder::new(&coords()).finish();
        assert_eq!(tree.lead_time_keys().collect::<Vec<_>>(), vec!["012", "024"]);
        for lead in ["012", "024"] {
            let thresholds = tree.thresholds(lead).unwrap();
            assert_eq!(
                thresholds.keys().map(String::as_str).collect::<Vec<_>>(),
                vec!["0.0100", "0.0500", "0.1000"]
            );
            assert!(thresholds.values().all(ArtifactRecord::is_empty));
        }
        assert_eq!(tree.len(), 6);
    }

    #[test]
    fn primary_can_only_be_written_once() {
        let coords = coords();
        let mut builder = ConfigTreeBuilder::new(&coords);
        builder
            .record_primary(&coords[0], PathBuf::from("a.txt"))
            .unwrap();
        let err = builder
            .record_primary(&coords[0], PathBuf::from("b.txt"))
            .unwrap_err();
        assert!(matches!(err, TreeError::AlreadyRecorded { .. }));
        let tree = builder.finish();
        assert_eq!(
            tree.record(&coords[0]).unwrap().primary_model_path,
            Some(PathBuf::from("a.txt"))
        );
    }

    #[test]
    fn compiled_requires_primary() {
        let coords = coords();
        let mut builder = ConfigTreeBuilder::new(&coords);
        let err = builder
            .record_compiled(&coords[1], PathBuf::from("m.so"))
            .unwrap_err();
        assert!(matches!(err, TreeError::MissingPrimary { .. }));
        builder
            .record_primary(&coords[1], PathBuf::from("m.txt"))
            .unwrap();
        builder
            .record_compiled(&coords[1], PathBuf::from("m.so"))
            .unwrap();
    }

    #[test]
    fn unknown_cells_are_rejected() {
        let coords = coords();
        let mut builder = ConfigTreeBuilder::new(&coords);
        let outside = GridCoord {
            lead_time: 36,
            threshold: 0.1,
        };
        let err = builder
            .record_primary(&outside, PathBuf::from("x.txt"))
            .unwrap_err();
        assert!(matches!(err, TreeError::UnknownCell { .. }));
    }

    #[test]
    fn snapshots_do_not_alias_the_builder() {
        let coords = coords();
        let mut builder = ConfigTreeBuilder::new(&coords);
        let before = builder.snapshot();
        builder
            .record_primary(&coords[2], PathBuf::from("m.txt"))
            .unwrap();
        assert!(before.record(&coords[2]).unwrap().is_empty());
        assert!(!builder.snapshot().record(&coords[2]).unwrap().is_empty());
    }

    #[test]
    fn json_omits_absent_paths() {
        let coords = coords();
        let mut builder = ConfigTreeBuilder::new(&coords[..1]);
        builder
            .record_primary(&coords[0], PathBuf::from("p/024H_0.1000.txt"))
            .unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&builder.finish().to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "024": { "0.1000": { "primary_model_path": "p/024H_0.1000.txt" } }
            })
        );
    }
}
