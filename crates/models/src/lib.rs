//! Burn classifier modules for the tagforge stack.
//!
//! Two architectures with a configurable output length (one logit per label):
//! - `LinearClassifier`: flatten + two-layer MLP, for small fixed-size inputs.
//! - `ConvClassifier`: small conv stem with adaptive pooling, input-size
//!   agnostic down to 8x8.
//!
//! Both are pure Burn Modules emitting raw logits; binarization and loss
//! live in the training crate.

use burn::module::Module;
use burn::nn;
use burn::record::{BinFileRecorder, FullPrecisionSettings, RecorderError};
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use std::path::Path;

/// Seam between model architectures and the training loop: anything that
/// maps an image batch to per-label logits.
pub trait Classifier<B: Backend> {
    fn logits(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;
}

#[derive(Debug, Clone)]
pub struct LinearClassifierConfig {
    /// Flattened input length (3 * height * width).
    pub in_features: usize,
    pub hidden: usize,
    /// Output length: one logit per label in the vocabulary.
    pub out_len: usize,
}

impl Default for LinearClassifierConfig {
    fn default() -> Self {
        Self {
            in_features: 3 * 64 * 64,
            hidden: 128,
            out_len: 2,
        }
    }
}

#[derive(Debug, Module)]
pub struct LinearClassifier<B: Backend> {
    linear1: nn::Linear<B>,
    linear2: nn::Linear<B>,
}

impl<B: Backend> LinearClassifier<B> {
    pub fn new(cfg: LinearClassifierConfig, device: &B::Device) -> Self {
        let linear1 = nn::LinearConfig::new(cfg.in_features, cfg.hidden).init(device);
        let linear2 = nn::LinearConfig::new(cfg.hidden, cfg.out_len).init(device);
        Self { linear1, linear2 }
    }

    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch, channels, height, width] = images.dims();
        let x = images.reshape([batch, channels * height * width]);
        let x = relu(self.linear1.forward(x));
        self.linear2.forward(x)
    }
}

impl<B: Backend> Classifier<B> for LinearClassifier<B> {
    fn logits(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.forward(images)
    }
}

#[derive(Debug, Clone)]
pub struct ConvClassifierConfig {
    /// Stem width; the second block doubles it.
    pub channels: usize,
    pub hidden: usize,
    pub out_len: usize,
}

impl Default for ConvClassifierConfig {
    fn default() -> Self {
        Self {
            channels: 16,
            hidden: 128,
            out_len: 2,
        }
    }
}

#[derive(Debug, Module)]
pub struct ConvClassifier<B: Backend> {
    conv1: nn::conv::Conv2d<B>,
    conv2: nn::conv::Conv2d<B>,
    pool: nn::pool::AdaptiveAvgPool2d,
    head1: nn::Linear<B>,
    head2: nn::Linear<B>,
}

impl<B: Backend> ConvClassifier<B> {
    pub fn new(cfg: ConvClassifierConfig, device: &B::Device) -> Self {
        let conv1 = nn::conv::Conv2dConfig::new([3, cfg.channels], [3, 3])
            .with_padding(nn::PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let conv2 = nn::conv::Conv2dConfig::new([cfg.channels, cfg.channels * 2], [3, 3])
            .with_stride([2, 2])
            .with_padding(nn::PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let pool = nn::pool::AdaptiveAvgPool2dConfig::new([4, 4]).init();
        let head1 = nn::LinearConfig::new(cfg.channels * 2 * 4 * 4, cfg.hidden).init(device);
        let head2 = nn::LinearConfig::new(cfg.hidden, cfg.out_len).init(device);
        Self {
            conv1,
            conv2,
            pool,
            head1,
            head2,
        }
    }

    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = relu(self.conv1.forward(images));
        let x = relu(self.conv2.forward(x));
        let x = self.pool.forward(x);
        let x: Tensor<B, 2> = x.flatten(1, 3);
        let x = relu(self.head1.forward(x));
        self.head2.forward(x)
    }
}

impl<B: Backend> Classifier<B> for ConvClassifier<B> {
    fn logits(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.forward(images)
    }
}

pub fn load_linear_classifier_from_checkpoint<B: Backend, P: AsRef<Path>>(
    path: P,
    cfg: LinearClassifierConfig,
    device: &B::Device,
) -> Result<LinearClassifier<B>, RecorderError> {
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    LinearClassifier::<B>::new(cfg, device).load_file(path.as_ref(), &recorder, device)
}

pub fn load_conv_classifier_from_checkpoint<B: Backend, P: AsRef<Path>>(
    path: P,
    cfg: ConvClassifierConfig,
    device: &B::Device,
) -> Result<ConvClassifier<B>, RecorderError> {
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    ConvClassifier::<B>::new(cfg, device).load_file(path.as_ref(), &recorder, device)
}

pub mod prelude {
    pub use super::{
        Classifier, ConvClassifier, ConvClassifierConfig, LinearClassifier, LinearClassifierConfig,
    };
}
