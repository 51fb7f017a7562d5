//! JSON-index multi-label image datasets for the tagforge stack.
//!
//! This crate provides:
//! - Index-file discovery and JSON index tables
//! - Label extraction and the itol/ltoi mapping pair
//! - A per-sample dataset adapter with one-hot label encoding
//! - Burn-compatible batch iteration
//! - Idempotent dataset archive fetching

pub mod batch;
pub mod dataset;
pub mod download;
pub mod encode;
pub mod index;
pub mod types;

pub use batch::{BatchConfig, LabelBatch, LabelBatchIter, LabelLoaders};
pub use dataset::{
    chw_from_rgb, parse_sample_id, ImageTransform, IndexDatasetConfig, JsonIndexDataset,
};
pub use download::{fetch_dataset, FetchOutcome};
pub use encode::{
    encode_from_index_files, encode_from_saved_map, generate_itol_ltoi, invert_ltoi, Itol,
    LabelLayout, Ltoi,
};
pub use index::{list_index_files, IndexRow, IndexTable};
pub use types::{DatasetResult, DatasetSample, LabelField, TagDatasetError};
