use std::{num::NonZeroUsize, path::PathBuf};

use serde::{Deserialize, Serialize};

/// How `Sequential::fit` iterates over the training data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FitConfig {
    pub epochs: NonZeroUsize,
    pub batch_size: NonZeroUsize,
    /// Visit the samples in a new random order every epoch instead of their stored order.
    #[serde(default)]
    pub shuffle: bool,
    /// Where to persist the model after the last epoch.
    #[serde(default)]
    pub save_model: Option<PathBuf>,
}

impl FitConfig {
    pub fn new(epochs: NonZeroUsize, batch_size: NonZeroUsize) -> Self {
        Self {
            epochs,
            batch_size,
            shuffle: false,
            save_model: None,
        }
    }

    pub fn shuffled(mut self) -> Self {
        self.shuffle = true;
        self
    }

    pub fn save_to<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.save_model = Some(path.into());
        self
    }
}
