use ndarray::{ArrayD, Axis};
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

const NAME: &str = "BatchNormalization";
const EPS: f32 = 0.01;

#[derive(Debug, Clone)]
struct Cache {
    x_centered: ArrayD<f32>,
    stddev_inv: ArrayD<f32>,
}

/// Batch normalization over the batch axis, with one `gamma` and `beta` per input scalar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchNorm {
    momentum: f32,
    input_shape: Option<Shape>,
    trainable: bool,
    gamma: Option<Param>,
    beta: Option<Param>,
    running_mean: Option<ArrayD<f32>>,
    running_var: Option<ArrayD<f32>>,

    #[serde(skip)]
    cache: Option<Cache>,
}

impl Default for BatchNorm {
    fn default() -> Self {
        Self::new(0.99)
    }
}

impl BatchNorm {
    /// Creates a new `BatchNorm`.
    ///
    /// # Arguments
    /// * `momentum` - How much of the running statistics is kept on each training batch.
    pub fn new(momentum: f32) -> Self {
        Self {
            momentum,
            input_shape: None,
            trainable: true,
            gamma: None,
            beta: None,
            running_mean: None,
            running_var: None,
            cache: None,
        }
    }

    /// The running mean and variance, if a training batch has been seen.
    pub fn running_stats(&self) -> Option<(&ArrayD<f32>, &ArrayD<f32>)> {
        self.running_mean.as_ref().zip(self.running_var.as_ref())
    }

    /// Blends the batch statistics into the running ones, the first batch sets them.
    fn update_running_stats(&mut self, mean: &ArrayD<f32>, var: &ArrayD<f32>) {
        let m = self.momentum;
        let blend = |running: Option<ArrayD<f32>>, batch: &ArrayD<f32>| match running {
            Some(r) => r * m + batch * (1. - m),
            None => batch.clone(),
        };

        self.running_mean = Some(blend(self.running_mean.take(), mean));
        self.running_var = Some(blend(self.running_var.take(), var));
    }

    fn affine(&self) -> Result<(&ArrayD<f32>, &ArrayD<f32>)> {
        match (&self.gamma, &self.beta) {
            (Some(g), Some(b)) => Ok((g.value(), b.value())),
            _ => Err(MlErr::NotInitialized { layer: NAME }),
        }
    }

    fn normalize(
        &self,
        x: &ArrayD<f32>,
        mean: &ArrayD<f32>,
        var: &ArrayD<f32>,
    ) -> Result<(ArrayD<f32>, Cache)> {
        let (gamma, beta) = self.affine()?;
        let x_centered = x - mean;
        let stddev_inv = var.mapv(|v| 1. / (v + EPS).sqrt());
        let out = &x_centered * &stddev_inv * gamma + beta;

        Ok((
            out,
            Cache {
                x_centered,
                stddev_inv,
            },
        ))
    }
}

fn batch_stats(x: &ArrayD<f32>) -> Result<(ArrayD<f32>, ArrayD<f32>)> {
    let mean = x.mean_axis(Axis(0)).ok_or(MlErr::EmptyBatch)?;
    let var = x.var_axis(Axis(0), 0.);
    Ok((mean, var))
}

impl LayerOps for BatchNorm {
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
        let shape = declared(NAME, &self.input_shape)?.dims().to_vec();
        if !(0.0..=1.0).contains(&self.momentum) {
            return Err(MlErr::InvalidConfig(format!(
                "batch normalization momentum must be in [0, 1], got {}",
                self.momentum
            )));
        }

        let n = shape.iter().product();
        let gamma = Initializer::Ones.sample(rng, &shape, n, n)?;
        let beta = Initializer::Zeros.sample(rng, &shape, n, n)?;
        self.gamma = Some(Param::new(gamma, optimizer));
        self.beta = Some(Param::new(beta, optimizer));
        self.running_mean = None;
        self.running_var = None;
        Ok(())
    }

    fn output_shape(&self) -> Result<Shape> {
        declared(NAME, &self.input_shape).cloned()
    }

    fn params(&self) -> Vec<&Param> {
        self.gamma.iter().chain(self.beta.iter()).collect()
    }

    fn forward_train(&mut self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        check_batch(NAME, &x, declared(NAME, &self.input_shape)?)?;

        let (mean, var) = match (self.trainable, self.running_stats()) {
            (false, Some((mean, var))) => (mean.clone(), var.clone()),
            _ => {
                let (mean, var) = batch_stats(&x)?;
                self.update_running_stats(&mean, &var);
                (mean, var)
            }
        };

        let (out, cache) = self.normalize(&x, &mean, &var)?;
        self.cache = Some(cache);
        Ok(out)
    }

    fn infer(&self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        check_batch(NAME, &x, declared(NAME, &self.input_shape)?)?;

        let (out, _) = match self.running_stats() {
            Some((mean, var)) => self.normalize(&x, mean, var)?,
            None => {
                let (mean, var) = batch_stats(&x)?;
                self.normalize(&x, &mean, &var)?
            }
        };

        Ok(out)
    }

    fn backward(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let Cache {
            x_centered,
            stddev_inv,
        } = self.cache.take().ok_or(MlErr::MissingCache { layer: NAME })?;
        check_grad(NAME, &d, x_centered.shape())?;

        let n = d.shape()[0] as f32;
        let d_sum = d.sum_axis(Axis(0));
        let dx_centered_sum = (&d * &x_centered).sum_axis(Axis(0));

        let dx = {
            let (gamma, _) = self.affine()?;
            let scale = gamma * &stddev_inv / n;
            let inner =
                &d * n - &d_sum - &x_centered * &stddev_inv.mapv(|s| s * s) * &dx_centered_sum;
            inner * &scale
        };

        if self.trainable {
            let x_norm = &x_centered * &stddev_inv;
            let d_gamma = (&d * &x_norm).sum_axis(Axis(0));

            if let (Some(gamma), Some(beta)) = (self.gamma.as_mut(), self.beta.as_mut()) {
                gamma.update(&d_gamma)?;
                beta.update(&d_sum)?;
            }
        }

        Ok(dx)
    }

    fn set_trainable(&mut self, trainable: bool) {
        self.trainable = trainable;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, array};
    use rand::SeedableRng;

    fn batch_norm(shape: Shape, lr: f32) -> BatchNorm {
        let mut layer = BatchNorm::default();
        layer.set_input_shape(shape);
        layer
            .initialize(
                &OptimizerConfig::GradientDescent { learning_rate: lr },
                &mut StdRng::seed_from_u64(0),
            )
            .unwrap();
        layer
    }

    #[test]
    fn normalizes_each_feature() {
        let mut layer = batch_norm(Shape::from(2), 0.1);
        let x = array![[1.0, 10.0], [3.0, 30.0], [5.0, 50.0]].into_dyn();
        let out = layer.forward_train(x).unwrap();

        for column in out.columns() {
            assert!(column.mean().unwrap().abs() < 1e-5);
        }
        assert!(out[[2, 1]] > out[[1, 1]]);
    }

    #[test]
    fn running_stats_start_at_the_first_batch() {
        let mut layer = batch_norm(Shape::from(1), 0.1);
        layer.forward_train(array![[2.0], [4.0]].into_dyn()).unwrap();
        let (mean, var) = layer.running_stats().unwrap();
        assert_eq!(mean, &array![3.0].into_dyn());
        assert_eq!(var, &array![1.0].into_dyn());

        layer.forward_train(array![[13.0], [13.0]].into_dyn()).unwrap();
        let (mean, _) = layer.running_stats().unwrap();
        assert!((mean[[0]] - (0.99 * 3.0 + 0.01 * 13.0)).abs() < 1e-5);
    }

    #[test]
    fn inference_uses_the_running_stats() {
        let mut layer = batch_norm(Shape::from(1), 0.1);
        layer.forward_train(array![[2.0], [4.0]].into_dyn()).unwrap();

        let out = layer.infer(array![[3.0]].into_dyn()).unwrap();
        assert!(out[[0, 0]].abs() < 1e-6);
        assert_eq!(layer.running_stats().unwrap().0, &array![3.0].into_dyn());
    }

    #[test]
    fn input_gradient_matches_finite_differences() {
        let x = Array::range(0., 12., 1.)
            .mapv(|v: f32| (v * 1.3).sin() * 2.)
            .into_shape_with_order(vec![3, 1, 2, 2])
            .unwrap();
        let upstream = Array::range(0., 12., 1.)
            .mapv(|v: f32| (v * 0.7).cos())
            .into_shape_with_order(vec![3, 1, 2, 2])
            .unwrap();

        // Measures the batch statistics path without touching gamma or beta.
        let objective = |x: ArrayD<f32>| {
            let mut probe = batch_norm(Shape::from((1, 2, 2)), 0.1);
            (probe.forward_train(x).unwrap() * &upstream).sum()
        };

        let mut layer = batch_norm(Shape::from((1, 2, 2)), 0.1);
        layer.forward_train(x.clone()).unwrap();
        let dx = layer.backward(upstream.clone()).unwrap();

        let h = 1e-2;
        for i in 0..x.len() {
            let mut plus = x.clone();
            let mut minus = x.clone();
            plus.as_slice_mut().unwrap()[i] += h;
            minus.as_slice_mut().unwrap()[i] -= h;

            let numeric = (objective(plus) - objective(minus)) / (2. * h);
            assert!((dx.as_slice().unwrap()[i] - numeric).abs() < 2e-2);
        }
    }
}
