pub mod config;
pub mod models;
pub mod pipeline;
pub mod synthetic;

pub use config::{DatasetSource, HarnessConfig, ModelVariant};
pub use synthetic::SyntheticDigits;
