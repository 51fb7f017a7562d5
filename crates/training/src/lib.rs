#![recursion_limit = "256"]

pub mod metrics;
pub mod run;

pub use metrics::{Mismatch, MultiLabelAccuracy, METRIC_NAME};
pub use run::{
    evaluate, predict, retrain_index_rows, run_train, save_retrain_index, train,
    validate_backend_choice, ADBackend, BackendKind, LossKind, ModelKind, TrainArgs,
};

/// Backend alias for training/eval (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;
