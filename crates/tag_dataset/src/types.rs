//! Core types and error definitions for tag_dataset.

use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, TagDatasetError>;

#[derive(Debug, Error)]
pub enum TagDatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json parse error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("http error fetching {url}: {msg}")]
    Http { url: String, msg: String },
    #[error("unsupported index file type {requested:?}; only json index files are implemented")]
    UnsupportedFileType { requested: String },
    #[error(
        "one-hot encoding requested without a label source; provide a label map or set derive_labels_from_column"
    )]
    MissingLabelSource,
    #[error("column {column} missing from index row")]
    MissingColumn { column: String },
    #[error("array label cell found where scalar labels were expected")]
    ScalarLabelExpected,
    #[error("label {label:?} not present in the label map")]
    UnknownLabel { label: String },
    #[error("cannot parse sample id from file name {file:?}: {msg}")]
    BadSampleId { file: String, msg: String },
    #[error("{0}")]
    Other(String),
}

/// One label cell of an index row. Delimited multi-label cells arrive as
/// `One` and are split by the encoder; `Codes` carries already-numeric
/// targets for pass-through datasets.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LabelField {
    One(String),
    Many(Vec<String>),
    Codes(Vec<f32>),
}

#[derive(Debug, Clone)]
pub struct DatasetSample {
    pub sample_id: u64,
    /// Image in CHW layout, normalized to [0, 1].
    pub image_chw: Vec<f32>,
    pub width: u32,
    pub height: u32,
    /// Encoded label vector (one-hot or pass-through codes).
    pub target: Vec<f32>,
}
