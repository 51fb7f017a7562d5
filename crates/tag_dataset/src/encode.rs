//! Label extraction and the itol/ltoi mapping pair.
//!
//! For labels `carbon`, `hydrogen`, `oxygen` in an index file,
//! [`encode_from_index_files`] yields:
//!
//! ```text
//! itol: {0: "carbon", 1: "hydrogen", 2: "oxygen"}
//! ltoi: {"carbon": 0, "hydrogen": 1, "oxygen": 2}
//! ```
//!
//! Indices are assigned by ascending sort of the distinct label set, so the
//! mapping pair is deterministic for a given input set.

use crate::index::{list_index_files, IndexTable};
use crate::types::{DatasetResult, LabelField, TagDatasetError};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;

/// Integer-to-label mapping, dense and 0-based.
pub type Itol = BTreeMap<usize, String>;
/// Label-to-integer mapping, the inverse of [`Itol`].
pub type Ltoi = HashMap<String, usize>;

/// Shape of the label column in the index files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelLayout {
    /// One scalar label per row.
    Single,
    /// An array of labels per row.
    Array,
    /// A scalar cell holding several labels split by a separator.
    Delimited { separator: String },
}

/// Distinct values of a scalar label column.
pub fn extract_single_labels(cells: &[LabelField]) -> DatasetResult<BTreeSet<String>> {
    let mut labels = BTreeSet::new();
    for cell in cells {
        match cell {
            LabelField::One(label) => {
                labels.insert(label.clone());
            }
            LabelField::Many(_) | LabelField::Codes(_) => {
                return Err(TagDatasetError::ScalarLabelExpected)
            }
        }
    }
    Ok(labels)
}

/// Flatten array-valued label cells into one distinct set. Scalar cells
/// contribute themselves.
pub fn extract_multi_labels_from_array_cells(
    cells: &[LabelField],
) -> DatasetResult<BTreeSet<String>> {
    let mut labels = BTreeSet::new();
    for cell in cells {
        match cell {
            LabelField::One(label) => {
                labels.insert(label.clone());
            }
            LabelField::Many(values) => {
                labels.extend(values.iter().cloned());
            }
            LabelField::Codes(_) => {
                return Err(TagDatasetError::Other(
                    "numeric label cells cannot be encoded as labels".to_string(),
                ))
            }
        }
    }
    Ok(labels)
}

/// Split each scalar cell on `separator`, trim whitespace, and flatten into
/// one distinct set.
pub fn extract_multi_labels_from_delimited_cells(
    cells: &[LabelField],
    separator: &str,
) -> DatasetResult<BTreeSet<String>> {
    let mut labels = BTreeSet::new();
    for cell in cells {
        match cell {
            LabelField::One(joined) => {
                labels.extend(joined.split(separator).map(|l| l.trim().to_string()));
            }
            LabelField::Many(_) | LabelField::Codes(_) => {
                return Err(TagDatasetError::ScalarLabelExpected)
            }
        }
    }
    Ok(labels)
}

/// Build the mapping pair from a distinct label set: ascending sort order
/// assigns each label its 0-based index, and both directions are returned.
pub fn generate_itol_ltoi(labels: &BTreeSet<String>) -> (Itol, Ltoi) {
    let itol: Itol = labels
        .iter()
        .enumerate()
        .map(|(i, label)| (i, label.clone()))
        .collect();
    let ltoi = invert_itol(&itol);
    (itol, ltoi)
}

pub fn invert_itol(itol: &Itol) -> Ltoi {
    itol.iter().map(|(i, label)| (label.clone(), *i)).collect()
}

pub fn invert_ltoi(ltoi: &Ltoi) -> Itol {
    ltoi.iter().map(|(label, i)| (*i, label.clone())).collect()
}

/// Build itol/ltoi by scanning index files under `root`. Files are either
/// the explicit `files` list or the directory entries matching `pattern`;
/// their rows are concatenated and the label column extracted per `layout`.
/// Only `"json"` index files are implemented.
pub fn encode_from_index_files(
    root: &Path,
    label_column: &str,
    files: Option<&[&str]>,
    file_type: &str,
    pattern: &str,
    layout: &LabelLayout,
) -> DatasetResult<(Itol, Ltoi)> {
    if file_type != "json" {
        return Err(TagDatasetError::UnsupportedFileType {
            requested: file_type.to_string(),
        });
    }
    let paths = list_index_files(root, files, pattern)?;
    let table = IndexTable::load_many(&paths)?;
    let cells = table.label_column(label_column)?;
    let labels = match layout {
        LabelLayout::Single => extract_single_labels(&cells)?,
        LabelLayout::Array => extract_multi_labels_from_array_cells(&cells)?,
        LabelLayout::Delimited { separator } => {
            extract_multi_labels_from_delimited_cells(&cells, separator)?
        }
    };
    Ok(generate_itol_ltoi(&labels))
}

/// Build itol/ltoi from a saved label map (a JSON object of strings),
/// encoding either its keys or its distinct values. Read and parse failures
/// are returned, never swallowed.
pub fn encode_from_saved_map(path: &Path, use_keys: bool) -> DatasetResult<(Itol, Ltoi)> {
    let raw = fs::read(path).map_err(|e| TagDatasetError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let map: HashMap<String, String> =
        serde_json::from_slice(&raw).map_err(|e| TagDatasetError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;
    let labels: BTreeSet<String> = if use_keys {
        map.keys().cloned().collect()
    } else {
        map.values().cloned().collect()
    };
    Ok(generate_itol_ltoi(&labels))
}
