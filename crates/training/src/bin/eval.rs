use clap::Parser;
use models::{
    load_conv_classifier_from_checkpoint, load_linear_classifier_from_checkpoint, Classifier,
    ConvClassifier, ConvClassifierConfig, LinearClassifier, LinearClassifierConfig,
};
use std::path::Path;
use std::sync::Arc;
use tag_dataset::{
    encode_from_saved_map, invert_ltoi, BatchConfig, ImageTransform, IndexDatasetConfig, Itol,
    JsonIndexDataset, LabelBatchIter,
};
use training::{evaluate, predict, validate_backend_choice, BackendKind, ModelKind, TrainBackend};

#[derive(Parser, Debug)]
#[command(
    name = "eval",
    about = "Evaluate a classifier checkpoint on a JSON index dataset, or classify a single image"
)]
struct Args {
    /// Model to evaluate.
    #[arg(long, value_enum, default_value_t = ModelKind::Conv)]
    model: ModelKind,
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    backend: BackendKind,
    /// Checkpoint path to load.
    #[arg(long)]
    checkpoint: Option<String>,
    /// Dataset root containing the index file and image subdirectory.
    #[arg(long, default_value = "assets/datasets/train")]
    dataset_root: String,
    /// Index file name relative to the dataset root.
    #[arg(long, default_value = "index.json")]
    index_file: String,
    /// Image subdirectory relative to the dataset root.
    #[arg(long, default_value = "images")]
    image_subdir: String,
    /// Column holding image file names.
    #[arg(long, default_value = "file")]
    image_column: String,
    /// Column holding labels.
    #[arg(long, default_value = "labels")]
    label_column: String,
    /// Pass label cells through as numeric codes instead of one-hot encoding.
    #[arg(long)]
    passthrough_labels: bool,
    /// Derive the label map from the label column (one-hot only).
    #[arg(long)]
    derive_labels: bool,
    /// Path to a saved JSON label map; takes precedence over --derive-labels.
    #[arg(long)]
    label_map: Option<String>,
    /// Batch size.
    #[arg(long, default_value_t = 8)]
    batch_size: usize,
    /// Resize images to this square size before batching.
    #[arg(long)]
    target_size: Option<u32>,
    /// Classify this single image (relative to the image subdirectory)
    /// instead of evaluating the whole index.
    #[arg(long)]
    image: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    validate_backend_choice(args.backend)?;

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
        println!(
            "No samples in index {}/{}",
            args.dataset_root, args.index_file
        );
        return Ok(());
    }
    let itol = dataset.label_map().map(invert_ltoi);
    let transform = dataset.transform().copied();
    let probe = dataset.get(0)?;
    let out_len = probe.target.len();
    let in_features = 3 * (probe.height as usize) * (probe.width as usize);

    let device = <TrainBackend as burn::tensor::backend::Backend>::Device::default();

    match args.model {
        ModelKind::Linear => {
            let cfg = LinearClassifierConfig {
                in_features,
                out_len,
                ..Default::default()
            };
            let model = match &args.checkpoint {
                Some(p) => {
                    load_linear_classifier_from_checkpoint::<TrainBackend, _>(
                        p,
                        cfg.clone(),
                        &device,
                    )
                    .unwrap_or_else(|e| {
                        println!("Failed to load checkpoint {p}; using fresh model ({e})");
                        LinearClassifier::<TrainBackend>::new(cfg, &device)
                    })
                }
                None => {
                    println!("No checkpoint provided; using fresh LinearClassifier");
                    LinearClassifier::<TrainBackend>::new(cfg, &device)
                }
            };
            run_with(&args, dataset, itol.as_ref(), transform, &model, &device)
        }
        ModelKind::Conv => {
            let cfg = ConvClassifierConfig {
                out_len,
                ..Default::default()
            };
            let model = match &args.checkpoint {
                Some(p) => {
                    load_conv_classifier_from_checkpoint::<TrainBackend, _>(p, cfg.clone(), &device)
                        .unwrap_or_else(|e| {
                            println!("Failed to load checkpoint {p}; using fresh model ({e})");
                            ConvClassifier::<TrainBackend>::new(cfg, &device)
                        })
                }
                None => {
                    println!("No checkpoint provided; using fresh ConvClassifier");
                    ConvClassifier::<TrainBackend>::new(cfg, &device)
                }
            };
            run_with(&args, dataset, itol.as_ref(), transform, &model, &device)
        }
    }
}

fn run_with<M: Classifier<TrainBackend>>(
    args: &Args,
    dataset: JsonIndexDataset,
    itol: Option<&Itol>,
    transform: Option<ImageTransform>,
    model: &M,
    device: &<TrainBackend as burn::tensor::backend::Backend>::Device,
) -> anyhow::Result<()> {
    if let Some(file) = &args.image {
        let Some(itol) = itol else {
            anyhow::bail!("single-image prediction requires one-hot labels");
        };
        let root = Path::new(&args.dataset_root).join(&args.image_subdir);
        let labels = predict::<TrainBackend, M>(model, &root, file, itol, transform.as_ref(), device)?;
        if labels.is_empty() {
            println!("{file}: no labels predicted");
        } else {
            println!("{file}: {}", labels.join(", "));
        }
        return Ok(());
    }

    let iter = LabelBatchIter::new(
        Arc::new(dataset),
        BatchConfig {
            shuffle: false,
            seed: None,
            drop_last: false,
        },
    );
    match evaluate::<TrainBackend, M>(iter, model, args.batch_size, device)? {
        Some(acc) => println!("Eval complete: accuracy={acc:.3}"),
        None => println!("No samples evaluated"),
    }
    Ok(())
}
