//! Index-file discovery and JSON index tables.

use crate::types::{DatasetResult, LabelField, TagDatasetError};
use regex::RegexBuilder;
use std::fs;
use std::path::{Path, PathBuf};

/// Resolve the set of index files to read. An explicit `files` list takes
/// precedence; otherwise directory entries of `root` whose names match
/// `pattern` (case-insensitive, anchored at the start like a prefix match)
/// are selected and sorted for determinism.
pub fn list_index_files(
    root: &Path,
    files: Option<&[&str]>,
    pattern: &str,
) -> DatasetResult<Vec<PathBuf>> {
    if let Some(files) = files {
        return Ok(files.iter().map(|f| root.join(f)).collect());
    }
    let re = RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| TagDatasetError::Other(format!("invalid file pattern {pattern:?}: {e}")))?;
    let entries = fs::read_dir(root).map_err(|e| TagDatasetError::Io {
        path: root.to_path_buf(),
        source: e,
    })?;
    let mut paths = Vec::new();
    for entry in entries {
        let Ok(entry) = entry else { continue };
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let matches_start = re.find(name).is_some_and(|m| m.start() == 0);
        if matches_start {
            paths.push(root.join(name));
        }
    }
    paths.sort();
    Ok(paths)
}

/// One row of an index file, keeping the raw JSON fields so the image and
/// label columns stay configurable by name.
#[derive(Debug, Clone)]
pub struct IndexRow {
    fields: serde_json::Map<String, serde_json::Value>,
}

impl IndexRow {
    pub fn string_field(&self, column: &str) -> DatasetResult<&str> {
        self.fields
            .get(column)
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| TagDatasetError::MissingColumn {
                column: column.to_string(),
            })
    }

    pub fn label_field(&self, column: &str) -> DatasetResult<LabelField> {
        let value = self
            .fields
            .get(column)
            .ok_or_else(|| TagDatasetError::MissingColumn {
                column: column.to_string(),
            })?;
        serde_json::from_value(value.clone()).map_err(|_| {
            TagDatasetError::Other(format!("column {column} holds an unsupported label value"))
        })
    }
}

/// An in-memory index table loaded from one or more JSON array files.
#[derive(Debug, Clone, Default)]
pub struct IndexTable {
    rows: Vec<IndexRow>,
}

impl IndexTable {
    pub fn load(path: &Path) -> DatasetResult<Self> {
        let raw = fs::read(path).map_err(|e| TagDatasetError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let rows: Vec<serde_json::Map<String, serde_json::Value>> = serde_json::from_slice(&raw)
            .map_err(|e| TagDatasetError::Json {
                path: path.to_path_buf(),
                source: e,
            })?;
        Ok(Self {
            rows: rows.into_iter().map(|fields| IndexRow { fields }).collect(),
        })
    }

    /// Concatenate the rows of several index files, in path order.
    pub fn load_many(paths: &[PathBuf]) -> DatasetResult<Self> {
        let mut rows = Vec::new();
        for path in paths {
            rows.extend(Self::load(path)?.rows);
        }
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[IndexRow] {
        &self.rows
    }

    pub fn row(&self, idx: usize) -> Option<&IndexRow> {
        self.rows.get(idx)
    }

    /// Extract one label cell per row for the named column.
    pub fn label_column(&self, column: &str) -> DatasetResult<Vec<LabelField>> {
        self.rows.iter().map(|r| r.label_field(column)).collect()
    }
}
