mod cross_entropy;
mod loss_fn;
mod mse;

use ndarray::{ArrayD, ArrayViewD};
use serde::{Deserialize, Serialize};

pub use cross_entropy::CrossEntropy;
pub use loss_fn::LossFn;
pub use mse::Mse;

/// The loss function a model is trained with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossFnKind {
    #[default]
    CrossEntropy,
    Mse,
}

impl LossFn for LossFnKind {
    fn loss(&self, y_pred: ArrayViewD<f32>, y: ArrayViewD<f32>) -> f32 {
        match self {
            Self::CrossEntropy => CrossEntropy.loss(y_pred, y),
            Self::Mse => Mse.loss(y_pred, y),
        }
    }

    fn loss_prime(&self, y_pred: ArrayViewD<f32>, y: ArrayViewD<f32>) -> ArrayD<f32> {
        match self {
            Self::CrossEntropy => CrossEntropy.loss_prime(y_pred, y),
            Self::Mse => Mse.loss_prime(y_pred, y),
        }
    }
}
