use serde::{Deserialize, Serialize};

use super::{Optimizer, optimizer::check_sizes};
use crate::Result;

/// Adam, with bias corrected first and second moment estimates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    /// The amount of steps taken so far.
    t: i32,
    m: Vec<f32>,
    v: Vec<f32>,
}

impl Adam {
    /// Creates a new `Adam` optimizer for `len` parameters with zeroed moments.
    pub fn new(len: usize, learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            t: 0,
            m: vec![0.; len],
            v: vec![0.; len],
        }
    }
}

impl Optimizer for Adam {
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) -> Result<()> {
        check_sizes(params, grad, Some(self.m.len()))?;

        self.t = self.t.saturating_add(1);
        let (b1, b2) = (self.beta1, self.beta2);
        let m_scale = 1. / (1. - b1.powi(self.t));
        let v_scale = 1. / (1. - b2.powi(self.t));

        for (i, (p, &g)) in params.iter_mut().zip(grad).enumerate() {
            let m = &mut self.m[i];
            let v = &mut self.v[i];
            *m = b1 * *m + (1. - b1) * g;
            *v = b2 * *v + (1. - b2) * g * g;

            let m_hat = *m * m_scale;
            let v_hat = *v * v_scale;
            *p -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_step_has_learning_rate_length() {
        // With bias correction the first step is lr * g / |g| regardless of the gradient scale.
        let mut optimizer = Adam::new(2, 0.01, 0.9, 0.999, 1e-8);
        let mut params = [1.0, 1.0];
        optimizer.update_params(&mut params, &[100.0, -0.001]).unwrap();

        assert!((params[0] - 0.99).abs() < 1e-5);
        assert!((params[1] - 1.01).abs() < 1e-4);
    }

    #[test]
    fn converges_on_a_quadratic() {
        let mut optimizer = Adam::new(1, 0.1, 0.9, 0.999, 1e-8);
        let mut params = [5.0_f32];

        for _ in 0..1000 {
            let grad = [2.0 * (params[0] - 3.0)];
            optimizer.update_params(&mut params, &grad).unwrap();
        }

        assert!((params[0] - 3.0).abs() < 0.1);
    }
}
