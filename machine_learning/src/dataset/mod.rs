mod dataloader;
mod labeled;
mod preprocessing;
mod provider;

pub use dataloader::DataLoader;
pub use labeled::LabeledData;
pub use preprocessing::{
    Split, argmax, argmax_lane, reshape_samples, to_categorical, train_test_split,
};
pub use provider::{CsvProvider, DatasetProvider, RawDataset};
