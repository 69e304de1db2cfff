use ndarray::ArrayD;
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use super::{
    LayerOps,
    layer::{check_batch, check_grad, declared},
};
use crate::{MlErr, Result, arch::Shape, optimization::OptimizerConfig};

const NAME: &str = "Dropout";

/// Zeroes each input with probability `p` while training and scales by `1 - p` otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dropout {
    p: f32,
    input_shape: Option<Shape>,
    seed: Option<u64>,

    // Rebuilt from `seed` on first use.
    #[serde(skip)]
    rng: Option<StdRng>,
    #[serde(skip)]
    mask: Option<ArrayD<f32>>,
}

impl Dropout {
    /// Creates a new `Dropout`.
    ///
    /// # Arguments
    /// * `p` - The probability of dropping an input, in `[0, 1)`.
    pub fn new(p: f32) -> Self {
        Self {
            p,
            input_shape: None,
            seed: None,
            rng: None,
            mask: None,
        }
    }
}

impl LayerOps for Dropout {
    fn name(&self) -> &'static str {
        NAME
    }

    fn input_shape(&self) -> Option<&Shape> {
        self.input_shape.as_ref()
    }

    fn set_input_shape(&mut self, shape: Shape) {
        self.input_shape = Some(shape);
    }

    fn initialize(&mut self, _optimizer: &OptimizerConfig, rng: &mut StdRng) -> Result<()> {
        declared(NAME, &self.input_shape)?;
        if !(0.0..1.0).contains(&self.p) {
            return Err(MlErr::InvalidConfig(format!(
                "dropout probability must be in [0, 1), got {}",
                self.p
            )));
        }

        self.seed = Some(rng.random());
        self.rng = None;
        Ok(())
    }

    fn output_shape(&self) -> Result<Shape> {
        declared(NAME, &self.input_shape).cloned()
    }

    fn forward_train(&mut self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        check_batch(NAME, &x, declared(NAME, &self.input_shape)?)?;
        let seed = self.seed.ok_or(MlErr::NotInitialized { layer: NAME })?;
        let rng = self.rng.get_or_insert_with(|| StdRng::seed_from_u64(seed));

        let p = self.p;
        let mask = ArrayD::from_shape_simple_fn(x.raw_dim(), || {
            if rng.random::<f32>() > p { 1. } else { 0. }
        });

        let out = x * &mask;
        self.mask = Some(mask);
        Ok(out)
    }

    fn infer(&self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        check_batch(NAME, &x, declared(NAME, &self.input_shape)?)?;
        Ok(x * (1. - self.p))
    }

    fn backward(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let mask = self.mask.take().ok_or(MlErr::MissingCache { layer: NAME })?;
        check_grad(NAME, &d, mask.shape())?;
        Ok(d * mask)
    }
}
