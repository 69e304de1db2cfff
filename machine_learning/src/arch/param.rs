use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::{
    MlErr, Result,
    arch::Shape,
    optimization::{Optimizer, OptimizerConfig, ParamOptimizer},
};

/// A trainable parameter tensor together with its own optimizer state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    value: ArrayD<f32>,
    optimizer: ParamOptimizer,
}

impl Param {
    /// Creates a new `Param`.
    ///
    /// # Arguments
    /// * `value` - The initial value of the parameter.
    /// * `optimizer` - The configuration used to build this parameter's optimizer state.
    pub fn new(value: ArrayD<f32>, optimizer: &OptimizerConfig) -> Self {
        let value = value.as_standard_layout().into_owned();

        Self {
            optimizer: optimizer.build(value.len()),
            value,
        }
    }

    /// The current value of the parameter.
    pub fn value(&self) -> &ArrayD<f32> {
        &self.value
    }

    /// The amount of scalars in the parameter.
    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Takes an optimization step with the given gradient.
    ///
    /// # Arguments
    /// * `grad` - The gradient of the loss with respect to this parameter.
    ///
    /// # Returns
    /// An error if the gradient's shape differs from the parameter's.
    pub fn update(&mut self, grad: &ArrayD<f32>) -> Result<()> {
        if grad.shape() != self.value.shape() {
            return Err(MlErr::ShapeMismatch {
                what: "parameter gradient",
                got: Shape::from(grad.shape()),
                expected: Shape::from(self.value.shape()),
            });
        }

        let grad = grad.as_standard_layout();
        let grad = grad.as_slice().ok_or(MlErr::SizeMismatch {
            what: "contiguous gradient",
            got: 0,
            expected: self.value.len(),
        })?;

        let len = self.value.len();
        let params = self.value.as_slice_mut().ok_or(MlErr::SizeMismatch {
            what: "contiguous parameter",
            got: 0,
            expected: len,
        })?;

        self.optimizer.update_params(params, grad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{IxDyn, array};

    #[test]
    fn update_uses_the_configured_optimizer() {
        let config = OptimizerConfig::GradientDescent { learning_rate: 1.0 };
        let mut param = Param::new(array![[1.0, 2.0], [3.0, 4.0]].into_dyn(), &config);

        param
            .update(&array![[1.0, 1.0], [1.0, 1.0]].into_dyn())
            .unwrap();

        assert_eq!(param.value(), &array![[0.0, 1.0], [2.0, 3.0]].into_dyn());
    }

    #[test]
    fn transposed_gradients_are_laid_out_first() {
        let config = OptimizerConfig::GradientDescent { learning_rate: 1.0 };
        let mut param = Param::new(ArrayD::zeros(IxDyn(&[2, 2])), &config);
        let grad = array![[1.0, 2.0], [3.0, 4.0]].reversed_axes().into_dyn();

        param.update(&grad).unwrap();

        assert_eq!(param.value(), &array![[-1.0, -3.0], [-2.0, -4.0]].into_dyn());
    }

    #[test]
    fn shape_mismatch_is_an_error() {
        let config = OptimizerConfig::adam();
        let mut param = Param::new(ArrayD::zeros(IxDyn(&[3])), &config);
        assert!(param.update(&ArrayD::zeros(IxDyn(&[2]))).is_err());
    }
}
