use serde::{Deserialize, Serialize};

use super::{Optimizer, optimizer::check_sizes};
use crate::Result;

/// Plain gradient descent, `p -= learning_rate * g`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientDescent {
    learning_rate: f32,
}

impl GradientDescent {
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for GradientDescent {
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) -> Result<()> {
        check_sizes(params, grad, None)?;
        params
            .iter_mut()
            .zip(grad)
            .for_each(|(p, g)| *p -= self.learning_rate * g);
        Ok(())
    }
}
