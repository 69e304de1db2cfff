use ndarray::{ArrayD, ArrayViewD, Zip};

use super::LossFn;

/// Probabilities are clipped into `[EPS, 1 - EPS]` before taking logarithms.
const EPS: f32 = 1e-7;

/// Element-wise binary cross entropy over probability outputs.
///
/// The loss is the mean over every element, while the gradient is left un-averaged, so a
/// softmax output layer receives `-(y / p) + (1 - y) / (1 - p)` per element.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrossEntropy;

impl CrossEntropy {
    pub fn new() -> Self {
        Self
    }
}

fn clip(p: f32) -> f32 {
    p.clamp(EPS, 1. - EPS)
}

impl LossFn for CrossEntropy {
    fn loss(&self, y_pred: ArrayViewD<f32>, y: ArrayViewD<f32>) -> f32 {
        Zip::from(&y_pred)
            .and(&y)
            .map_collect(|&p, &y| {
                let p = clip(p);
                -y * p.ln() - (1. - y) * (1. - p).ln()
            })
            .mean()
            .unwrap_or_default()
    }

    fn loss_prime(&self, y_pred: ArrayViewD<f32>, y: ArrayViewD<f32>) -> ArrayD<f32> {
        Zip::from(&y_pred).and(&y).map_collect(|&p, &y| {
            let p = clip(p);
            -(y / p) + (1. - y) / (1. - p)
        })
    }
}
