//! Multi-label accuracy accumulation over Burn tensors.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use std::collections::HashMap;

pub const METRIC_NAME: &str = "accuracy_multi";

/// Predicted and actual label vectors of one misclassified sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub predicted: Vec<i32>,
    pub actual: Vec<i32>,
}

/// Accuracy accumulator for multi-label batches. A sample counts correct
/// only when its whole predicted vector matches ground truth exactly.
/// Not safe for concurrent updates.
#[derive(Debug, Default)]
pub struct MultiLabelAccuracy {
    sum_metric: u64,
    num_inst: u64,
    pred_status: HashMap<u64, Mismatch>,
}

impl MultiLabelAccuracy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero the running counts. The mismatch table is kept; clear it with
    /// [`clear_mismatches`](Self::clear_mismatches).
    pub fn reset(&mut self) {
        self.sum_metric = 0;
        self.num_inst = 0;
    }

    pub fn clear_mismatches(&mut self) {
        self.pred_status.clear();
    }

    pub fn sum_metric(&self) -> u64 {
        self.sum_metric
    }

    pub fn num_inst(&self) -> u64 {
        self.num_inst
    }

    pub fn mismatches(&self) -> &HashMap<u64, Mismatch> {
        &self.pred_status
    }

    pub fn take_mismatches(&mut self) -> HashMap<u64, Mismatch> {
        std::mem::take(&mut self.pred_status)
    }

    /// Accumulate one batch. Predictions whose shape differs from the labels
    /// are first collapsed with argmax along the label axis (single-label
    /// fallback); both sides are then compared as fixed-point vectors.
    pub fn update<B: Backend>(&mut self, labels: &Tensor<B, 2>, preds: &Tensor<B, 2>) {
        let (label_rows, pred_rows) = paired_rows(labels, preds);
        for (label, pred) in label_rows.iter().zip(&pred_rows) {
            if label == pred {
                self.sum_metric += 1;
            }
        }
        self.num_inst += label_rows.len() as u64;
    }

    /// Record every mismatching sample of the batch under its id, without
    /// touching the running counts. A later mismatch with the same id
    /// overwrites the earlier entry.
    pub fn record_incorrect<B: Backend>(
        &mut self,
        labels: &Tensor<B, 2>,
        preds: &Tensor<B, 2>,
        sample_ids: &Tensor<B, 1>,
    ) {
        let (label_rows, pred_rows) = paired_rows(labels, preds);
        let ids = sample_ids
            .clone()
            .into_data()
            .to_vec::<f32>()
            .unwrap_or_default();
        for ((label, pred), id) in label_rows.iter().zip(&pred_rows).zip(ids) {
            if label != pred {
                self.pred_status.insert(
                    id.round() as u64,
                    Mismatch {
                        predicted: pred.clone(),
                        actual: label.clone(),
                    },
                );
            }
        }
    }

    /// Running accuracy, or `None` before any sample has been seen.
    pub fn get(&self) -> Option<(&'static str, f64)> {
        if self.num_inst == 0 {
            None
        } else {
            Some((METRIC_NAME, self.sum_metric as f64 / self.num_inst as f64))
        }
    }
}

fn paired_rows<B: Backend>(
    labels: &Tensor<B, 2>,
    preds: &Tensor<B, 2>,
) -> (Vec<Vec<i32>>, Vec<Vec<i32>>) {
    let pred = if preds.dims() == labels.dims() {
        preds.clone()
    } else {
        preds.clone().argmax(1).float()
    };
    (rows_i32(labels.clone()), rows_i32(pred))
}

fn rows_i32<B: Backend>(t: Tensor<B, 2>) -> Vec<Vec<i32>> {
    let [rows, cols] = t.dims();
    if cols == 0 {
        return vec![Vec::new(); rows];
    }
    let flat = t.into_data().to_vec::<f32>().unwrap_or_default();
    flat.chunks(cols)
        .map(|row| row.iter().map(|v| v.round() as i32).collect())
        .collect()
}
