use ndarray::{ArrayD, ArrayViewD, Axis};

use crate::dataset::argmax;

pub trait LossFn {
    /// The mean loss of the predictions.
    fn loss(&self, y_pred: ArrayViewD<f32>, y: ArrayViewD<f32>) -> f32;

    /// The gradient of the loss with respect to the predictions.
    fn loss_prime(&self, y_pred: ArrayViewD<f32>, y: ArrayViewD<f32>) -> ArrayD<f32>;

    /// The fraction of rows whose highest scored class is the target's.
    fn acc(&self, y_pred: ArrayViewD<f32>, y: ArrayViewD<f32>) -> f32 {
        let rows = |a: ArrayViewD<f32>| {
            let n = a.shape().first().copied().unwrap_or(0);
            let a = a.to_shape((n, a.len() / n.max(1))).map(|a| argmax(a.view(), Axis(1)));
            a.ok()
        };

        match (rows(y_pred), rows(y)) {
            (Some(p), Some(t)) if !p.is_empty() && p.len() == t.len() => {
                let hits = p.iter().zip(t.iter()).filter(|(p, t)| p == t).count();
                hits as f32 / p.len() as f32
            }
            _ => 0.,
        }
    }
}
