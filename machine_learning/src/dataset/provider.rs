use std::{fs, path::PathBuf};

use log::debug;
use ndarray::{Array1, Array2};

use crate::{MlErr, Result};

/// Flat feature rows and their integer class labels.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDataset {
    pub features: Array2<f32>,
    pub labels: Array1<usize>,
}

impl RawDataset {
    /// The amount of samples.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// The largest label plus one.
    pub fn n_classes(&self) -> usize {
        self.labels.iter().max().map_or(0, |&max| max + 1)
    }
}

/// A source of labeled samples.
pub trait DatasetProvider {
    fn load(&self) -> Result<RawDataset>;
}

/// Reads comma separated rows of `n_features` values followed by the integer label, the
/// layout of the UCI optical digits files.
#[derive(Debug, Clone)]
pub struct CsvProvider {
    path: PathBuf,
    n_features: usize,
}

impl CsvProvider {
    /// Creates a new `CsvProvider`.
    ///
    /// # Arguments
    /// * `path` - The csv file to read.
    /// * `n_features` - The amount of feature columns before the label.
    pub fn new<P: Into<PathBuf>>(path: P, n_features: usize) -> Self {
        Self {
            path: path.into(),
            n_features,
        }
    }

    fn parse(&self, content: &str) -> Result<RawDataset> {
        let row_size = self.n_features + 1;
        let mut features = Vec::new();
        let mut labels = Vec::new();

        for (i, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let values = line
                .split(',')
                .map(|v| {
                    v.trim().parse::<f32>().map_err(|_| {
                        MlErr::Dataset(format!("line {i}: cannot parse '{v}' as a number"))
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            if values.len() != row_size {
                return Err(MlErr::Dataset(format!(
                    "line {i}: expected {row_size} values ({} features + label), got {}",
                    self.n_features,
                    values.len()
                )));
            }

            let label = values[self.n_features];
            if label < 0. || label.fract() != 0. {
                return Err(MlErr::Dataset(format!(
                    "line {i}: the label {label} is not a class index"
                )));
            }

            features.extend_from_slice(&values[..self.n_features]);
            labels.push(label as usize);
        }

        if labels.is_empty() {
            return Err(MlErr::Dataset("the dataset is empty".into()));
        }

        Ok(RawDataset {
            features: Array2::from_shape_vec((labels.len(), self.n_features), features)?,
            labels: Array1::from_vec(labels),
        })
    }
}

impl DatasetProvider for CsvProvider {
    fn load(&self) -> Result<RawDataset> {
        let content = fs::read_to_string(&self.path)?;
        let dataset = self.parse(&content)?;

        debug!(
            path:? = self.path,
            samples = dataset.len(),
            classes = dataset.n_classes();
            "loaded csv dataset"
        );

        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_features_and_labels() {
        let provider = CsvProvider::new("unused.csv", 3);
        let dataset = provider.parse("0,1,2,7\n\n 3, 4, 5, 1\n").unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.features.row(1).to_vec(), vec![3., 4., 5.]);
        assert_eq!(dataset.labels.to_vec(), vec![7, 1]);
        assert_eq!(dataset.n_classes(), 8);
    }

    #[test]
    fn malformed_rows_are_rejected() {
        let provider = CsvProvider::new("unused.csv", 2);
        assert!(provider.parse("1,2\n").is_err());
        assert!(provider.parse("1,x,3\n").is_err());
        assert!(provider.parse("1,2,0.5\n").is_err());
        assert!(provider.parse("").is_err());
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0,16,8,3").unwrap();
        writeln!(file, "1,2,3,0").unwrap();

        let dataset = CsvProvider::new(file.path(), 3).load().unwrap();
        assert_eq!(dataset.features.dim(), (2, 3));
        assert_eq!(dataset.labels.to_vec(), vec![3, 0]);
    }

    #[test]
    fn missing_files_are_io_errors() {
        let provider = CsvProvider::new("/definitely/not/here.csv", 64);
        assert!(matches!(provider.load(), Err(MlErr::Io(_))));
    }
}
