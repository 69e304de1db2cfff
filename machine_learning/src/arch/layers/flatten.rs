use ndarray::ArrayD;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::{
    LayerOps,
    layer::{check_batch, check_grad, declared, reshape},
};
use crate::{MlErr, Result, arch::Shape, optimization::OptimizerConfig};

const NAME: &str = "Flatten";

/// Collapses every axis of a sample into a single one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Flatten {
    input_shape: Option<Shape>,

    #[serde(skip)]
    batch: Option<usize>,
}

impl LayerOps for Flatten {
    fn name(&self) -> &'static str {
        NAME
    }

    fn input_shape(&self) -> Option<&Shape> {
        self.input_shape.as_ref()
    }

    fn set_input_shape(&mut self, shape: Shape) {
        self.input_shape = Some(shape);
    }

    fn initialize(&mut self, _optimizer: &OptimizerConfig, _rng: &mut StdRng) -> Result<()> {
        declared(NAME, &self.input_shape)?;
        Ok(())
    }

    fn output_shape(&self) -> Result<Shape> {
        Ok(Shape::from(declared(NAME, &self.input_shape)?.size()))
    }

    fn forward_train(&mut self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let out = self.infer(x)?;
        self.batch = Some(out.shape()[0]);
        Ok(out)
    }

    fn infer(&self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let shape = declared(NAME, &self.input_shape)?;
        let n = check_batch(NAME, &x, shape)?;
        reshape(x, vec![n, shape.size()])
    }

    fn backward(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let n = self.batch.take().ok_or(MlErr::MissingCache { layer: NAME })?;
        let shape = declared(NAME, &self.input_shape)?;
        check_grad(NAME, &d, &[n, shape.size()])?;
        reshape(d, shape.batched(n))
    }
}
