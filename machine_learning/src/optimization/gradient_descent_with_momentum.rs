use serde::{Deserialize, Serialize};

use super::{Optimizer, optimizer::check_sizes};
use crate::Result;

/// Gradient descent over an exponential moving average of the gradients,
/// `v = momentum * v + (1 - momentum) * g`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientDescentWithMomentum {
    learning_rate: f32,
    momentum: f32,
    velocity: Vec<f32>,
}

impl GradientDescentWithMomentum {
    pub fn new(len: usize, learning_rate: f32, momentum: f32) -> Self {
        Self {
            learning_rate,
            momentum,
            velocity: vec![0.; len],
        }
    }
}

impl Optimizer for GradientDescentWithMomentum {
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) -> Result<()> {
        check_sizes(params, grad, Some(self.velocity.len()))?;

        let mu = self.momentum;
        for ((p, &g), v) in params.iter_mut().zip(grad).zip(&mut self.velocity) {
            *v = mu * *v + (1. - mu) * g;
            *p -= self.learning_rate * *v;
        }

        Ok(())
    }
}
