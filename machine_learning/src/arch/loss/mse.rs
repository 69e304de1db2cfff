use ndarray::{ArrayD, ArrayViewD, Zip};

use super::LossFn;

/// Half the squared error, averaged over every element. Its gradient is the plain
/// residual `y_pred - y`, not averaged, like the cross entropy's.
#[derive(Debug, Default, Clone, Copy)]
pub struct Mse;

impl LossFn for Mse {
    fn loss(&self, y_pred: ArrayViewD<f32>, y: ArrayViewD<f32>) -> f32 {
        let total = Zip::from(&y_pred)
            .and(&y)
            .fold(0., |acc, &p, &t| acc + 0.5 * (p - t) * (p - t));

        match y_pred.len() {
            0 => 0.,
            n => total / n as f32,
        }
    }

    fn loss_prime(&self, y_pred: ArrayViewD<f32>, y: ArrayViewD<f32>) -> ArrayD<f32> {
        &y_pred - &y
    }
}
