use ndarray::ArrayD;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::{
    LayerOps,
    layer::{check_batch, check_grad, declared},
};
use crate::{
    MlErr, Result,
    arch::{Shape, activations::ActFn},
    optimization::OptimizerConfig,
};

const NAME: &str = "Activation";

/// Applies an activation function to every input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activation {
    act_fn: ActFn,
    input_shape: Option<Shape>,

    #[serde(skip)]
    cache: Option<(ArrayD<f32>, ArrayD<f32>)>,
}

impl Activation {
    pub fn new(act_fn: ActFn) -> Self {
        Self {
            act_fn,
            input_shape: None,
            cache: None,
        }
    }

    pub fn act_fn(&self) -> ActFn {
        self.act_fn
    }
}

impl LayerOps for Activation {
    fn name(&self) -> &'static str {
        NAME
    }

    fn label(&self) -> String {
        format!("{NAME} ({})", self.act_fn.name())
    }

    fn input_shape(&self) -> Option<&Shape> {
        self.input_shape.as_ref()
    }

    fn set_input_shape(&mut self, shape: Shape) {
        self.input_shape = Some(shape);
    }

    fn initialize(&mut self, _optimizer: &OptimizerConfig, _rng: &mut StdRng) -> Result<()> {
        let shape = declared(NAME, &self.input_shape)?;
        if self.act_fn == ActFn::Softmax && shape.rank() == 0 {
            return Err(MlErr::InvalidShape {
                layer: NAME,
                shape: shape.clone(),
                reason: "softmax needs at least one axis",
            });
        }

        Ok(())
    }

    fn output_shape(&self) -> Result<Shape> {
        declared(NAME, &self.input_shape).cloned()
    }

    fn forward_train(&mut self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let a = self.infer(x.clone())?;
        self.cache = Some((x, a.clone()));
        Ok(a)
    }

    fn infer(&self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        check_batch(NAME, &x, declared(NAME, &self.input_shape)?)?;
        Ok(self.act_fn.forward(x.view()))
    }

    fn backward(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let (x, a) = self.cache.take().ok_or(MlErr::MissingCache { layer: NAME })?;
        check_grad(NAME, &d, x.shape())?;
        Ok(self.act_fn.backward(x.view(), a.view(), d.view()))
    }
}
