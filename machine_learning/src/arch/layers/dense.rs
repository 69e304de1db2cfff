use ndarray::{Array2, ArrayD, Axis, Ix2};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::{
    LayerOps,
    layer::{check_batch, check_grad, declared},
};
use crate::{
    MlErr, Result,
    arch::{Param, Shape},
    initialization::Initializer,
    optimization::OptimizerConfig,
};

const NAME: &str = "Dense";

/// A fully connected layer, `y = x W + w0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dense {
    units: usize,
    input_shape: Option<Shape>,
    trainable: bool,
    weights: Option<Param>,
    bias: Option<Param>,

    #[serde(skip)]
    x: Option<Array2<f32>>,
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `units` - The amount of outputs per sample.
    pub fn new(units: usize) -> Self {
        Self {
            units,
            input_shape: None,
            trainable: true,
            weights: None,
            bias: None,
            x: None,
        }
    }

    /// The weights with shape `(in, units)` and the bias with shape `(1, units)`.
    fn weights(&self) -> Result<(&Param, &Param)> {
        match (&self.weights, &self.bias) {
            (Some(w), Some(b)) => Ok((w, b)),
            _ => Err(MlErr::NotInitialized { layer: NAME }),
        }
    }

    fn affine(&self, x: &Array2<f32>) -> Result<Array2<f32>> {
        let (w, b) = self.weights()?;
        let w = w.value().view().into_dimensionality::<Ix2>()?;
        let b = b.value().view().into_dimensionality::<Ix2>()?;

        let mut z = x.dot(&w);
        z += &b;
        Ok(z)
    }

    fn input(&self, x: ArrayD<f32>) -> Result<Array2<f32>> {
        check_batch(NAME, &x, declared(NAME, &self.input_shape)?)?;
        Ok(x.into_dimensionality::<Ix2>()?)
    }
}

impl LayerOps for Dense {
    fn name(&self) -> &'static str {
        NAME
    }

    fn input_shape(&self) -> Option<&Shape> {
        self.input_shape.as_ref()
    }

    fn set_input_shape(&mut self, shape: Shape) {
        self.input_shape = Some(shape);
    }

    fn initialize(&mut self, optimizer: &OptimizerConfig, rng: &mut StdRng) -> Result<()> {
        let shape = declared(NAME, &self.input_shape)?;
        let &[n] = shape.dims() else {
            return Err(MlErr::InvalidShape {
                layer: NAME,
                shape: shape.clone(),
                reason: "expected a flat input, add a Flatten layer first",
            });
        };

        if self.units == 0 || n == 0 {
            return Err(MlErr::InvalidConfig(format!(
                "a dense layer needs at least one input and one unit, got {n} -> {}",
                self.units
            )));
        }

        let w = Initializer::FanIn.sample(rng, &[n, self.units], n, self.units)?;
        let b = Initializer::Zeros.sample(rng, &[1, self.units], n, self.units)?;
        self.weights = Some(Param::new(w, optimizer));
        self.bias = Some(Param::new(b, optimizer));
        Ok(())
    }

    fn output_shape(&self) -> Result<Shape> {
        declared(NAME, &self.input_shape)?;
        Ok(Shape::from(self.units))
    }

    fn params(&self) -> Vec<&Param> {
        self.weights.iter().chain(self.bias.iter()).collect()
    }

    fn forward_train(&mut self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let x = self.input(x)?;
        let z = self.affine(&x)?;
        self.x = Some(x);
        Ok(z.into_dyn())
    }

    fn infer(&self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let x = self.input(x)?;
        Ok(self.affine(&x)?.into_dyn())
    }

    fn backward(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let x = self.x.take().ok_or(MlErr::MissingCache { layer: NAME })?;
        check_grad(NAME, &d, &[x.nrows(), self.units])?;
        let d = d.into_dimensionality::<Ix2>()?;

        let dx = {
            let (w, _) = self.weights()?;
            let w = w.value().view().into_dimensionality::<Ix2>()?;
            d.dot(&w.t())
        };

        if self.trainable {
            let dw = x.t().dot(&d);
            let db = d.sum_axis(Axis(0)).insert_axis(Axis(0));

            if let (Some(w), Some(b)) = (self.weights.as_mut(), self.bias.as_mut()) {
                w.update(&dw.into_dyn())?;
                b.update(&db.into_dyn())?;
            }
        }

        Ok(dx.into_dyn())
    }

    fn set_trainable(&mut self, trainable: bool) {
        self.trainable = trainable;
    }
}
