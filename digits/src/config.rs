use std::{fs, num::NonZeroUsize, path::PathBuf};

use anyhow::{Context as _, Result, ensure};
use machine_learning::optimization::OptimizerConfig;
use orchestrator::{Approach, GraphConfig};
use serde::Deserialize;

/// Which of the two example networks to train.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelVariant {
    /// Two same-padded convolution blocks straight into the dense head.
    #[default]
    Plain,
    /// The same blocks with max pooling shrinking the maps down to a single pixel.
    Pooled,
}

/// Where the digits come from.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DatasetSource {
    Synthetic {
        #[serde(default = "default_samples")]
        samples: usize,
    },
    Csv {
        path: PathBuf,
        #[serde(default = "default_features")]
        n_features: usize,
    },
}

impl Default for DatasetSource {
    fn default() -> Self {
        Self::Synthetic {
            samples: default_samples(),
        }
    }
}

/// Everything the harness binary can be configured with.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub model: ModelVariant,
    pub dataset: DatasetSource,
    pub optimizer: OptimizerConfig,
    pub epochs: NonZeroUsize,
    pub batch_size: NonZeroUsize,
    pub test_size: f64,
    pub shuffle: bool,
    pub seed: u64,
    /// Where the trained model is written, nowhere if `None`.
    pub save_path: Option<PathBuf>,
    pub graph: GraphConfig,
    /// Whether to declare and execute the evaluation graph after training.
    pub evaluate: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        let workers = NonZeroUsize::new(2).unwrap_or(NonZeroUsize::MIN);

        Self {
            model: ModelVariant::default(),
            dataset: DatasetSource::default(),
            optimizer: OptimizerConfig::adam(),
            epochs: NonZeroUsize::new(5).unwrap_or(NonZeroUsize::MIN),
            batch_size: NonZeroUsize::new(256).unwrap_or(NonZeroUsize::MIN),
            test_size: 0.4,
            shuffle: true,
            seed: 42,
            save_path: Some(PathBuf::from("cnn_model.json")),
            graph: GraphConfig::new("cnn", "convolutional_neural_network")
                .with_approach(Approach::Distributed { workers }),
            evaluate: true,
        }
    }
}

impl HarnessConfig {
    /// Reads a configuration from a JSON file, missing fields keep their defaults.
    pub fn from_file<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let content = fs::read_to_string(&path)
            .with_context(|| format!("cannot read '{}'", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("invalid config in '{}'", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.test_size > 0. && self.test_size < 1.,
            "test_size must be in (0, 1), got {}",
            self.test_size
        );
        if let DatasetSource::Synthetic { samples } = self.dataset {
            ensure!(samples >= 2, "a synthetic dataset needs at least 2 samples");
        }
        self.optimizer.validate()?;
        Ok(())
    }
}

fn default_samples() -> usize {
    1797
}

fn default_features() -> usize {
    64
}
