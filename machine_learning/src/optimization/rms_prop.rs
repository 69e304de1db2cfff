use serde::{Deserialize, Serialize};

use super::{Optimizer, optimizer::check_sizes};
use crate::Result;

/// Scales every step by a running average of the squared gradient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RmsProp {
    learning_rate: f32,
    rho: f32,
    epsilon: f32,
    s: Box<[f32]>,
}

impl RmsProp {
    /// Creates a new `RmsProp` optimizer.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters this instance should hold.
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `rho` - The decay of the running average.
    /// * `epsilon` - Added to the denominator to avoid divisions by zero.
    pub fn new(len: usize, learning_rate: f32, rho: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            rho,
            epsilon,
            s: vec![0.; len].into_boxed_slice(),
        }
    }
}

impl Optimizer for RmsProp {
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) -> Result<()> {
        check_sizes(params, grad, Some(self.s.len()))?;

        let Self {
            learning_rate: lr,
            rho,
            epsilon: eps,
            ..
        } = *self;

        params
            .iter_mut()
            .zip(grad)
            .zip(self.s.iter_mut())
            .for_each(|((p, g), s)| {
                *s = rho * *s + (1. - rho) * g.powi(2);
                *p -= lr * g / (s.sqrt() + eps);
            });

        Ok(())
    }
}
