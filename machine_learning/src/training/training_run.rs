use std::time::Duration;

use serde::Serialize;

/// Bookkeeping of a single epoch.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct EpochMetrics {
    pub wall_time: Duration,
    pub batches: u64,
    pub samples: u64,
}

impl EpochMetrics {
    #[inline]
    pub fn bump_batch(&mut self) {
        self.batches += 1;
    }

    #[inline]
    pub fn add_samples(&mut self, n: usize) {
        self.samples += n as u64;
    }
}

/// The outcome of one epoch of training.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpochRecord {
    pub epoch: usize,
    /// The mean of the batch losses.
    pub train_err: f32,
    pub train_acc: f32,
    pub val_err: Option<f32>,
    pub val_acc: Option<f32>,
    pub metrics: EpochMetrics,
}

/// Every epoch of a `fit` call, in order.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct TrainingRun {
    epochs: Vec<EpochRecord>,
}

impl TrainingRun {
    pub fn push(&mut self, record: EpochRecord) {
        self.epochs.push(record);
    }

    pub fn epochs(&self) -> &[EpochRecord] {
        &self.epochs
    }

    pub fn last(&self) -> Option<&EpochRecord> {
        self.epochs.last()
    }

    pub fn train_errors(&self) -> Vec<f32> {
        self.epochs.iter().map(|e| e.train_err).collect()
    }

    /// The training and validation error of every epoch, the latter being empty when the
    /// model had no validation data.
    pub fn errors(&self) -> (Vec<f32>, Vec<f32>) {
        let val = self.epochs.iter().filter_map(|e| e.val_err).collect();
        (self.train_errors(), val)
    }

    /// Whether the last epoch ended with a non finite training error.
    pub fn diverged(&self) -> bool {
        self.last().is_some_and(|e| !e.train_err.is_finite())
    }

    pub fn total_time(&self) -> Duration {
        self.epochs.iter().map(|e| e.metrics.wall_time).sum()
    }
}
