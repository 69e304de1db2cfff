mod fit_config;
mod training_run;

pub use fit_config::FitConfig;
pub use training_run::{EpochMetrics, EpochRecord, TrainingRun};
