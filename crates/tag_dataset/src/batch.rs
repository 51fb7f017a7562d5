//! Batch iteration: assembling dataset samples into Burn tensors.

use crate::dataset::JsonIndexDataset;
use crate::types::{DatasetResult, TagDatasetError};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_LOG_EVERY_SAMPLES: usize = 1000;

#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Shuffle sample order before iteration.
    pub shuffle: bool,
    /// Seed for reproducible shuffling.
    pub seed: Option<u64>,
    /// Drop the last partial batch.
    pub drop_last: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            shuffle: true,
            seed: None,
            drop_last: false,
        }
    }
}

/// One assembled batch on the backend `B`.
pub struct LabelBatch<B: burn::tensor::backend::Backend> {
    pub images: burn::tensor::Tensor<B, 4>,
    pub targets: burn::tensor::Tensor<B, 2>,
    pub sample_ids: burn::tensor::Tensor<B, 1>,
}

/// Train/val iterator pair over one dataset, split by a tail ratio.
pub struct LabelLoaders {
    dataset: Arc<JsonIndexDataset>,
    train_order: Vec<usize>,
    val_order: Vec<usize>,
    train_cfg: BatchConfig,
    val_cfg: BatchConfig,
}

impl LabelLoaders {
    /// Split the dataset's rows into a training head and validation tail of
    /// `val_ratio`. Validation defaults to the training config with shuffling
    /// and partial-batch dropping off.
    pub fn from_dataset(
        dataset: JsonIndexDataset,
        val_ratio: f32,
        train_cfg: BatchConfig,
        val_cfg: Option<BatchConfig>,
    ) -> Self {
        let total = dataset.len();
        let val_len = ((total as f32) * val_ratio.clamp(0.0, 1.0)).round() as usize;
        let split = total - val_len.min(total);
        let val_cfg = val_cfg.unwrap_or_else(|| BatchConfig {
            shuffle: false,
            drop_last: false,
            ..train_cfg.clone()
        });
        Self {
            dataset: Arc::new(dataset),
            train_order: (0..split).collect(),
            val_order: (split..total).collect(),
            train_cfg,
            val_cfg,
        }
    }

    pub fn train_len(&self) -> usize {
        self.train_order.len()
    }

    pub fn val_len(&self) -> usize {
        self.val_order.len()
    }

    pub fn dataset(&self) -> &JsonIndexDataset {
        &self.dataset
    }

    pub fn train_iter(&self) -> LabelBatchIter {
        LabelBatchIter::from_order(
            Arc::clone(&self.dataset),
            self.train_order.clone(),
            self.train_cfg.clone(),
        )
    }

    pub fn val_iter(&self) -> LabelBatchIter {
        LabelBatchIter::from_order(
            Arc::clone(&self.dataset),
            self.val_order.clone(),
            self.val_cfg.clone(),
        )
    }
}

pub struct LabelBatchIter {
    dataset: Arc<JsonIndexDataset>,
    order: Vec<usize>,
    cursor: usize,
    cfg: BatchConfig,
    processed_samples: usize,
    processed_batches: usize,
    skipped_errors: usize,
    started: Instant,
    last_log: Instant,
    last_logged_samples: usize,
    log_every_samples: Option<usize>,
    images_buf: Vec<f32>,
    targets_buf: Vec<f32>,
    ids_buf: Vec<f32>,
}

impl LabelBatchIter {
    /// Iterate the whole dataset in row order (then shuffled per config).
    pub fn new(dataset: Arc<JsonIndexDataset>, cfg: BatchConfig) -> Self {
        let order = (0..dataset.len()).collect();
        Self::from_order(dataset, order, cfg)
    }

    pub fn from_order(
        dataset: Arc<JsonIndexDataset>,
        mut order: Vec<usize>,
        cfg: BatchConfig,
    ) -> Self {
        let mut rng = match cfg.seed {
            Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
            None => rand::rngs::StdRng::from_rng(&mut rand::rng()),
        };
        if cfg.shuffle {
            order.shuffle(&mut rng);
        }
        let log_every_samples = match std::env::var("TAG_DATASET_LOG_EVERY") {
            Ok(val) => {
                if val.eq_ignore_ascii_case("off") || val.trim() == "0" {
                    None
                } else {
                    val.parse::<usize>().ok().filter(|v| *v > 0)
                }
            }
            Err(_) => Some(DEFAULT_LOG_EVERY_SAMPLES),
        };
        let now = Instant::now();
        Self {
            dataset,
            order,
            cursor: 0,
            cfg,
            processed_samples: 0,
            processed_batches: 0,
            skipped_errors: 0,
            started: now,
            last_log: now,
            last_logged_samples: 0,
            log_every_samples,
            images_buf: Vec::new(),
            targets_buf: Vec::new(),
            ids_buf: Vec::new(),
        }
    }

    pub fn skipped_errors(&self) -> usize {
        self.skipped_errors
    }

    /// Assemble the next batch, skipping samples that fail to load. Returns
    /// `None` once the order is exhausted.
    pub fn next_batch<B: burn::tensor::backend::Backend>(
        &mut self,
        batch_size: usize,
        device: &B::Device,
    ) -> DatasetResult<Option<LabelBatch<B>>> {
        let batch_size = batch_size.max(1);
        loop {
            if self.cursor >= self.order.len() {
                return Ok(None);
            }
            let end = (self.cursor + batch_size).min(self.order.len());
            let slice = self.order[self.cursor..end].to_vec();
            self.cursor = end;

            self.images_buf.clear();
            self.targets_buf.clear();
            self.ids_buf.clear();

            let mut expected_size: Option<(u32, u32)> = None;
            let mut expected_target_len: Option<usize> = None;

            for idx in slice {
                let sample = match self.dataset.get(idx) {
                    Ok(sample) => sample,
                    Err(e) => {
                        eprintln!("Warning: skipping sample {idx}: {e}");
                        self.skipped_errors += 1;
                        continue;
                    }
                };

                let size = (sample.width, sample.height);
                match expected_size {
                    None => expected_size = Some(size),
                    Some(sz) if sz != size => {
                        return Err(TagDatasetError::Other(
                            "batch contains varying image sizes; set a target_size to force consistency"
                                .to_string(),
                        ));
                    }
                    _ => {}
                }
                match expected_target_len {
                    None => expected_target_len = Some(sample.target.len()),
                    Some(len) if len != sample.target.len() => {
                        return Err(TagDatasetError::Other(
                            "label vector length differs within batch".to_string(),
                        ));
                    }
                    _ => {}
                }

                self.ids_buf.push(sample.sample_id as f32);
                self.images_buf.extend_from_slice(&sample.image_chw);
                self.targets_buf.extend_from_slice(&sample.target);
            }

            if self.ids_buf.is_empty() {
                continue;
            }

            let batch_len = self.ids_buf.len();
            if self.cfg.drop_last && batch_len < batch_size {
                if self.cursor >= self.order.len() {
                    return Ok(None);
                }
                continue;
            }

            let (width, height) = expected_size.unwrap_or((0, 0));
            let target_len = expected_target_len.unwrap_or(0);
            let image_shape = [batch_len, 3, height as usize, width as usize];

            let images =
                burn::tensor::Tensor::<B, 1>::from_floats(self.images_buf.as_slice(), device)
                    .reshape(image_shape);
            let targets =
                burn::tensor::Tensor::<B, 1>::from_floats(self.targets_buf.as_slice(), device)
                    .reshape([batch_len, target_len]);
            let sample_ids =
                burn::tensor::Tensor::<B, 1>::from_floats(self.ids_buf.as_slice(), device)
                    .reshape([batch_len]);

            self.processed_samples += batch_len;
            self.processed_batches += 1;
            self.maybe_log_progress();

            return Ok(Some(LabelBatch {
                images,
                targets,
                sample_ids,
            }));
        }
    }

    fn maybe_log_progress(&mut self) {
        let Some(threshold) = self.log_every_samples else {
            return;
        };
        let processed_since = self
            .processed_samples
            .saturating_sub(self.last_logged_samples);
        let since_last = self.last_log.elapsed();
        if processed_since < threshold && since_last < Duration::from_secs(30) {
            return;
        }
        let secs = self.started.elapsed().as_secs_f32().max(0.001);
        let rate = self.processed_samples as f32 / secs;
        eprintln!(
            "[dataset] batches={} samples={} skipped_errors={} elapsed={:.1}s rate={:.1} img/s",
            self.processed_batches, self.processed_samples, self.skipped_errors, secs, rate
        );
        self.last_logged_samples = self.processed_samples;
        self.last_log = Instant::now();
    }
}
