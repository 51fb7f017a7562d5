//! Training, evaluation, and inference orchestration.

use crate::metrics::{Mismatch, MultiLabelAccuracy};
use crate::TrainBackend;
use anyhow::anyhow;
use burn::backend::Autodiff;
use burn::module::AutodiffModule;
use burn::module::Module;
use burn::nn::loss::{MseLoss, Reduction};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::activation::sigmoid;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use clap::{Parser, ValueEnum};
use models::{
    Classifier, ConvClassifier, ConvClassifierConfig, LinearClassifier, LinearClassifierConfig,
};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Instant;
use tag_dataset::{
    encode_from_saved_map, invert_ltoi, BatchConfig, ImageTransform, IndexDatasetConfig, Itol,
    JsonIndexDataset, LabelBatchIter, LabelLoaders,
};

pub type ADBackend = Autodiff<TrainBackend>;

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum ModelKind {
    Linear,
    Conv,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum BackendKind {
    NdArray,
    Wgpu,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum LossKind {
    /// Clamped-log binary cross entropy on sigmoid probabilities.
    Bce,
    /// Mean squared error on sigmoid probabilities.
    Mse,
}

#[derive(Parser, Debug)]
#[command(
    name = "train",
    about = "Train a multi-label image classifier from a JSON index dataset"
)]
pub struct TrainArgs {
    /// Model to train.
    #[arg(long, value_enum, default_value_t = ModelKind::Conv)]
    pub model: ModelKind,
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    pub backend: BackendKind,
    /// Loss function.
    #[arg(long, value_enum, default_value_t = LossKind::Bce)]
    pub loss: LossKind,
    /// Dataset root containing the index file and image subdirectory.
    #[arg(long, default_value = "assets/datasets/train")]
    pub dataset_root: String,
    /// Index file name relative to the dataset root.
    #[arg(long, default_value = "index.json")]
    pub index_file: String,
    /// Image subdirectory relative to the dataset root.
    #[arg(long, default_value = "images")]
    pub image_subdir: String,
    /// Column holding image file names.
    #[arg(long, default_value = "file")]
    pub image_column: String,
    /// Column holding labels.
    #[arg(long, default_value = "labels")]
    pub label_column: String,
    /// Pass label cells through as numeric codes instead of one-hot encoding.
    #[arg(long)]
    pub passthrough_labels: bool,
    /// Derive the label map from the label column (one-hot only).
    #[arg(long)]
    pub derive_labels: bool,
    /// Path to a saved JSON label map; takes precedence over --derive-labels.
    #[arg(long)]
    pub label_map: Option<String>,
    /// Number of epochs.
    #[arg(long, default_value_t = 20)]
    pub epochs: usize,
    /// Batch size.
    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,
    /// Initial learning rate.
    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,
    /// Multiplier applied to the learning rate at each step boundary.
    #[arg(long, default_value_t = 0.75)]
    pub lr_factor: f64,
    /// Epochs at which the learning rate decays, ascending.
    #[arg(long, value_delimiter = ',', default_value = "10,20,30")]
    pub lr_steps: Vec<usize>,
    /// Fraction of rows held out for validation.
    #[arg(long, default_value_t = 0.2)]
    pub val_ratio: f32,
    /// Resize images to this square size before batching.
    #[arg(long)]
    pub target_size: Option<u32>,
    /// Seed for reproducible shuffling.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Checkpoint output path (defaults by model if not provided).
    #[arg(long)]
    pub checkpoint_out: Option<String>,
    /// Write a retraining index of misclassified samples to this path.
    #[arg(long)]
    pub retrain_out: Option<String>,
}

pub fn validate_backend_choice(kind: BackendKind) -> anyhow::Result<()> {
    let built_wgpu = cfg!(feature = "backend-wgpu");
    match (kind, built_wgpu) {
        (BackendKind::Wgpu, false) => {
            anyhow::bail!(
                "backend-wgpu feature not enabled; rebuild with --features backend-wgpu or choose ndarray backend"
            )
        }
        (BackendKind::NdArray, true) => {
            println!(
                "note: built with backend-wgpu; training will still use the WGPU backend despite --backend ndarray"
            );
        }
        _ => {}
    }
    Ok(())
}

pub fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    validate_backend_choice(args.backend)?;

    let ckpt_path = args
        .checkpoint_out
        .clone()
        .unwrap_or_else(|| match args.model {
            ModelKind::Linear => "checkpoints/linear_classifier.bin".to_string(),
            ModelKind::Conv => "checkpoints/conv_classifier.bin".to_string(),
        });
    if let Some(parent) = Path::new(&ckpt_path).parent() {
        fs::create_dir_all(parent)?;
    }

    let label_map = match &args.label_map {
        Some(path) => Some(encode_from_saved_map(Path::new(path), true)?.1),
        None => None,
    };
    let dataset = JsonIndexDataset::new(IndexDatasetConfig {
        root: args.dataset_root.clone().into(),
        index_file: args.index_file.clone(),
        image_subdir: args.image_subdir.clone(),
        image_column: args.image_column.clone(),
        label_column: args.label_column.clone(),
        one_hot_labels: !args.passthrough_labels,
        derive_labels_from_column: args.derive_labels,
        label_map,
        transform: args.target_size.map(|s| ImageTransform {
            target_size: (s, s),
        }),
    })?;
    if dataset.is_empty() {
        anyhow::bail!("no samples in index {}/{}", args.dataset_root, args.index_file);
    }

    let itol = dataset.label_map().map(invert_ltoi);
    let probe = dataset.get(0)?;
    let out_len = probe.target.len();
    let in_features = 3 * (probe.height as usize) * (probe.width as usize);

    let loaders = LabelLoaders::from_dataset(
        dataset,
        args.val_ratio,
        BatchConfig {
            shuffle: true,
            seed: args.seed,
            drop_last: false,
        },
        None,
    );
    if loaders.train_len() == 0 {
        anyhow::bail!("training split is empty; lower --val-ratio");
    }

    let device = <ADBackend as Backend>::Device::default();
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();

    let mismatches = match args.model {
        ModelKind::Linear => {
            let model = LinearClassifier::<ADBackend>::new(
                LinearClassifierConfig {
                    in_features,
                    out_len,
                    ..Default::default()
                },
                &device,
            );
            let (model, mismatches) = train(&args, &loaders, model, &device)?;
            model
                .save_file(Path::new(&ckpt_path), &recorder)
                .map_err(|e| anyhow!("failed to save checkpoint: {e}"))?;
            mismatches
        }
        ModelKind::Conv => {
            let model = ConvClassifier::<ADBackend>::new(
                ConvClassifierConfig {
                    out_len,
                    ..Default::default()
                },
                &device,
            );
            let (model, mismatches) = train(&args, &loaders, model, &device)?;
            model
                .save_file(Path::new(&ckpt_path), &recorder)
                .map_err(|e| anyhow!("failed to save checkpoint: {e}"))?;
            mismatches
        }
    };
    println!("Saved checkpoint to {ckpt_path}");

    if let Some(out) = &args.retrain_out {
        let Some(itol) = &itol else {
            anyhow::bail!("--retrain-out requires one-hot labels");
        };
        if mismatches.is_empty() {
            println!("No misclassified samples; skipping retrain index");
        } else {
            let rows =
                retrain_index_rows(&mismatches, itol, &args.image_column, &args.label_column);
            save_retrain_index(&rows, Path::new(out))?;
            println!("Saved retrain index with {} rows to {out}", rows.len());
        }
    }

    Ok(())
}

/// Run the epoch loop: stepped lr decay, forward/backward/step per batch,
/// accuracy accumulation, and a validation pass after every epoch. Returns
/// the trained model and the mismatches collected on the final epoch.
pub fn train<M>(
    args: &TrainArgs,
    loaders: &LabelLoaders,
    mut model: M,
    device: &<ADBackend as Backend>::Device,
) -> anyhow::Result<(M, HashMap<u64, Mismatch>)>
where
    M: Classifier<ADBackend> + AutodiffModule<ADBackend>,
{
    let mut optim = AdamConfig::new().init::<ADBackend, M>();
    let mut metric = MultiLabelAccuracy::new();
    let mut current_lr = args.lr;
    let mut lr_cursor = 0usize;

    for epoch in 0..args.epochs {
        if lr_cursor < args.lr_steps.len() && epoch == args.lr_steps[lr_cursor] {
            current_lr *= args.lr_factor;
            lr_cursor += 1;
            println!("Learning rate is now set to: {current_lr}");
        }

        let tic = Instant::now();
        let mut train_loss = 0.0f32;
        let mut num_batches = 0usize;
        metric.reset();

        let mut iter = loaders.train_iter();
        loop {
            let batch = match iter.next_batch::<ADBackend>(args.batch_size, device)? {
                Some(batch) => batch,
                None => break,
            };
            let logits = model.logits(batch.images.clone());
            let loss = compute_loss(args.loss, logits.clone(), batch.targets.clone());
            let loss_detached = loss.clone().detach();
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(current_lr, model, grads);

            train_loss += first_scalar(loss_detached);
            num_batches += 1;

            let outs = binarize(logits.detach());
            metric.update(&batch.targets, &outs);
            if epoch + 1 == args.epochs {
                metric.record_incorrect(&batch.targets, &outs, &batch.sample_ids);
            }
        }

        let train_acc = metric.get().map_or(0.0, |(_, acc)| acc);
        let avg_loss = if num_batches > 0 {
            train_loss / num_batches as f32
        } else {
            0.0
        };
        let val_acc = evaluate_into::<ADBackend, M>(
            loaders.val_iter(),
            &model,
            args.batch_size,
            &mut metric,
            device,
        )?;
        let val_repr = val_acc.map_or_else(|| "n/a".to_string(), |acc| format!("{acc:.3}"));
        println!(
            "[Epoch {epoch}] Train-acc: {train_acc:.3}, loss: {avg_loss:.3} | Val-acc: {val_repr} | time: {:.1}",
            tic.elapsed().as_secs_f32()
        );
    }

    Ok((model, metric.take_mismatches()))
}

/// Reset the metric and run one pass over the loader. `None` when the loader
/// yields no samples.
fn evaluate_into<B: Backend, M: Classifier<B>>(
    mut iter: LabelBatchIter,
    model: &M,
    batch_size: usize,
    metric: &mut MultiLabelAccuracy,
    device: &B::Device,
) -> anyhow::Result<Option<f64>> {
    metric.reset();
    loop {
        let batch = match iter.next_batch::<B>(batch_size, device)? {
            Some(batch) => batch,
            None => break,
        };
        let outs = binarize(model.logits(batch.images.clone()));
        metric.update(&batch.targets, &outs);
    }
    Ok(metric.get().map(|(_, acc)| acc))
}

/// One evaluation pass with a fresh accumulator.
pub fn evaluate<B: Backend, M: Classifier<B>>(
    iter: LabelBatchIter,
    model: &M,
    batch_size: usize,
    device: &B::Device,
) -> anyhow::Result<Option<f64>> {
    let mut metric = MultiLabelAccuracy::new();
    evaluate_into::<B, M>(iter, model, batch_size, &mut metric, device)
}

/// Classify a single image: positive logits select present labels, decoded
/// through `itol`.
pub fn predict<B: Backend, M: Classifier<B>>(
    model: &M,
    root: &Path,
    file: &str,
    itol: &Itol,
    transform: Option<&ImageTransform>,
    device: &B::Device,
) -> anyhow::Result<Vec<String>> {
    let path = root.join(file);
    let img = image::open(&path)
        .map_err(|e| anyhow!("failed to open image {}: {e}", path.display()))?
        .to_rgb8();
    let img = match transform {
        Some(t) => t.apply(img),
        None => img,
    };
    let (width, height) = img.dimensions();
    let chw = tag_dataset::chw_from_rgb(&img);
    let images = Tensor::<B, 1>::from_floats(chw.as_slice(), device).reshape([
        1,
        3,
        height as usize,
        width as usize,
    ]);
    let scores = model
        .logits(images)
        .into_data()
        .to_vec::<f32>()
        .unwrap_or_default();
    Ok(scores
        .iter()
        .enumerate()
        .filter(|(_, score)| **score > 0.0)
        .filter_map(|(i, _)| itol.get(&i).cloned())
        .collect())
}

/// Turn collected mismatches back into index rows, using each sample's
/// actual label vector. Rows are sorted by id for stable output.
pub fn retrain_index_rows(
    mismatches: &HashMap<u64, Mismatch>,
    itol: &Itol,
    image_column: &str,
    label_column: &str,
) -> Vec<serde_json::Value> {
    let mut entries: Vec<_> = mismatches.iter().collect();
    entries.sort_by_key(|(id, _)| **id);
    entries
        .into_iter()
        .map(|(id, mismatch)| {
            let labels: Vec<String> = mismatch
                .actual
                .iter()
                .enumerate()
                .filter(|(_, v)| **v != 0)
                .filter_map(|(i, _)| itol.get(&i).cloned())
                .collect();
            let mut row = serde_json::Map::new();
            row.insert(
                image_column.to_string(),
                serde_json::Value::String(format!("{id}.png")),
            );
            row.insert(
                label_column.to_string(),
                serde_json::Value::Array(
                    labels.into_iter().map(serde_json::Value::String).collect(),
                ),
            );
            serde_json::Value::Object(row)
        })
        .collect()
}

pub fn save_retrain_index(rows: &[serde_json::Value], path: &Path) -> anyhow::Result<()> {
    let payload = serde_json::to_string_pretty(rows)?;
    fs::write(path, payload)
        .map_err(|e| anyhow!("failed to write retrain index {}: {e}", path.display()))?;
    Ok(())
}

fn binarize<B: Backend>(logits: Tensor<B, 2>) -> Tensor<B, 2> {
    logits.greater_elem(0.0).float()
}

fn compute_loss<B: Backend>(
    kind: LossKind,
    logits: Tensor<B, 2>,
    targets: Tensor<B, 2>,
) -> Tensor<B, 1> {
    match kind {
        LossKind::Mse => MseLoss::new().forward(sigmoid(logits), targets, Reduction::Mean),
        LossKind::Bce => {
            let [rows, cols] = targets.dims();
            let eps = 1e-6;
            let probs = sigmoid(logits).clamp(eps, 1.0 - eps);
            let ones = Tensor::<B, 2>::ones(probs.dims(), &probs.device());
            let term = targets.clone() * probs.clone().log()
                + (ones.clone() - targets) * (ones - probs).log();
            -(term.sum().div_scalar((rows * cols) as f32))
        }
    }
}

fn first_scalar<B: Backend>(t: Tensor<B, 1>) -> f32 {
    t.into_data()
        .to_vec::<f32>()
        .unwrap_or_default()
        .into_iter()
        .next()
        .unwrap_or(0.0)
}
