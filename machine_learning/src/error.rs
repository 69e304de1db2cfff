use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use crate::arch::Shape;

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    ShapeMismatch {
        what: &'static str,
        got: Shape,
        expected: Shape,
    },
    MissingInputShape {
        layer: &'static str,
    },
    InvalidShape {
        layer: &'static str,
        shape: Shape,
        reason: &'static str,
    },
    NotInitialized {
        layer: &'static str,
    },
    MissingCache {
        layer: &'static str,
    },
    EmptyModel,
    EmptyBatch,
    InvalidConfig(String),
    InvalidLabel {
        label: usize,
        n_classes: usize,
    },
    Init(String),
    Dataset(String),
    Io(io::Error),
    Serde(serde_json::Error),
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(f, "size mismatch for {what}: got {got}, expected {expected}"),
            MlErr::ShapeMismatch {
                what,
                got,
                expected,
            } => write!(f, "shape mismatch for {what}: got {got}, expected {expected}"),
            MlErr::MissingInputShape { layer } => write!(
                f,
                "the first layer ({layer}) must declare an explicit input shape"
            ),
            MlErr::InvalidShape {
                layer,
                shape,
                reason,
            } => write!(f, "invalid input shape {shape} for {layer}: {reason}"),
            MlErr::NotInitialized { layer } => {
                write!(f, "{layer} was used before being added to a model")
            }
            MlErr::MissingCache { layer } => write!(
                f,
                "{layer} backward pass requires a preceding training forward pass"
            ),
            MlErr::EmptyModel => write!(f, "the model has no layers"),
            MlErr::EmptyBatch => write!(f, "received an empty batch"),
            MlErr::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            MlErr::InvalidLabel { label, n_classes } => {
                write!(f, "label {label} is out of range for {n_classes} classes")
            }
            MlErr::Init(msg) => write!(f, "parameter initialization failed: {msg}"),
            MlErr::Dataset(msg) => write!(f, "dataset error: {msg}"),
            MlErr::Io(e) => write!(f, "io error: {e}"),
            MlErr::Serde(e) => write!(f, "serialization error: {e}"),
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Io(e) => Some(e),
            MlErr::Serde(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for MlErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for MlErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

impl From<ndarray::ShapeError> for MlErr {
    fn from(value: ndarray::ShapeError) -> Self {
        Self::InvalidConfig(value.to_string())
    }
}
