use ndarray::{Array2, ArrayD, ArrayView2, Axis, Ix2, Ix4};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::{
    LayerOps, Padding, Window,
    layer::{check_batch, check_grad, declared, reshape},
};
use crate::{
    MlErr, Result,
    arch::{Param, Shape},
    initialization::Initializer,
    optimization::OptimizerConfig,
};

const NAME: &str = "Conv2D";

/// The columns the last training forward pass unfolded, and the input's dimensions.
#[derive(Debug, Clone)]
struct Cache {
    cols: Array2<f32>,
    dims: (usize, usize, usize, usize),
}

/// A 2d convolution over `(channels, height, width)` samples.
///
/// The filters have shape `(n_filters, channels, kh, kw)` and the bias `(n_filters, 1)`, the
/// convolution itself is a single matrix product over the im2col unfolding of the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conv2d {
    n_filters: usize,
    window: Window,
    input_shape: Option<Shape>,
    trainable: bool,
    weights: Option<Param>,
    bias: Option<Param>,

    #[serde(skip)]
    cache: Option<Cache>,
}

impl Conv2d {
    /// Creates a new `Conv2d`.
    ///
    /// # Arguments
    /// * `n_filters` - The amount of filters, that is, of output channels.
    /// * `filter_shape` - Each filter's height and width.
    /// * `stride` - The step between two filter positions.
    /// * `padding` - The border handling.
    pub fn new(
        n_filters: usize,
        filter_shape: (usize, usize),
        stride: usize,
        padding: Padding,
    ) -> Self {
        Self {
            n_filters,
            window: Window::new(filter_shape, stride, padding),
            input_shape: None,
            trainable: true,
            weights: None,
            bias: None,
            cache: None,
        }
    }

    /// The input's channels and the output's height and width.
    fn geometry(&self) -> Result<(usize, usize, usize)> {
        let shape = declared(NAME, &self.input_shape)?;
        let &[c, h, w] = shape.dims() else {
            return Err(MlErr::InvalidShape {
                layer: NAME,
                shape: shape.clone(),
                reason: "expected a (channels, height, width) input",
            });
        };

        let (oh, ow) = self.window.output_dims(h, w).ok_or_else(|| unfit(shape))?;
        Ok((c, oh, ow))
    }

    /// The filters flattened as `(n_filters, channels * kh * kw)` and the bias.
    fn filters(&self) -> Result<(ArrayView2<'_, f32>, ArrayView2<'_, f32>)> {
        let (Some(w), Some(b)) = (&self.weights, &self.bias) else {
            return Err(MlErr::NotInitialized { layer: NAME });
        };

        let w = w
            .value()
            .view()
            .into_shape_with_order((self.n_filters, w.len() / self.n_filters))?;
        let b = b.value().view().into_dimensionality()?;
        Ok((w, b))
    }

    fn convolve(&self, x: ArrayD<f32>) -> Result<(ArrayD<f32>, Cache)> {
        let (_, oh, ow) = self.geometry()?;
        let n = check_batch(NAME, &x, declared(NAME, &self.input_shape)?)?;
        let x = x.into_dimensionality::<Ix4>()?;

        let cols = self
            .window
            .im2col(x.view(), 0.)
            .ok_or_else(|| unfit(&Shape::of_sample(x.shape())))?;

        let (w, b) = self.filters()?;
        let mut out = w.dot(&cols);
        out += &b;

        let out = out
            .into_shape_with_order((self.n_filters, n, oh, ow))?
            .permuted_axes([1, 0, 2, 3]);

        let out = reshape(out.into_dyn(), vec![n, self.n_filters, oh, ow])?;
        Ok((out, Cache { cols, dims: x.dim() }))
    }
}

fn unfit(shape: &Shape) -> MlErr {
    MlErr::InvalidShape {
        layer: NAME,
        shape: shape.clone(),
        reason: "the filter doesn't fit in the padded input",
    }
}

impl LayerOps for Conv2d {
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
        let (c, _, _) = self.geometry()?;
        if self.n_filters == 0 || c == 0 {
            return Err(MlErr::InvalidConfig(
                "a convolution needs at least one filter and one channel".into(),
            ));
        }

        let (kh, kw) = self.window.kernel;
        let (fan_in, fan_out) = (kh * kw, self.n_filters);
        let w = Initializer::FanIn.sample(rng, &[fan_out, c, kh, kw], fan_in, fan_out)?;
        let b = Initializer::Zeros.sample(rng, &[fan_out, 1], fan_in, fan_out)?;
        self.weights = Some(Param::new(w, optimizer));
        self.bias = Some(Param::new(b, optimizer));
        Ok(())
    }

    fn output_shape(&self) -> Result<Shape> {
        let (_, oh, ow) = self.geometry()?;
        Ok(Shape::from((self.n_filters, oh, ow)))
    }

    fn params(&self) -> Vec<&Param> {
        self.weights.iter().chain(self.bias.iter()).collect()
    }

    fn forward_train(&mut self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let (out, cache) = self.convolve(x)?;
        self.cache = Some(cache);
        Ok(out)
    }

    fn infer(&self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        Ok(self.convolve(x)?.0)
    }

    fn backward(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let Cache { cols, dims } = self.cache.take().ok_or(MlErr::MissingCache { layer: NAME })?;
        let (_, oh, ow) = self.geometry()?;
        let (n, f) = (dims.0, self.n_filters);
        check_grad(NAME, &d, &[n, f, oh, ow])?;

        // (n, f, oh, ow) -> (f, n * oh * ow), the column order im2col produced.
        let d = d.into_dimensionality::<Ix4>()?.permuted_axes([1, 0, 2, 3]);
        let d = reshape(d.into_dyn(), vec![f, n * oh * ow])?.into_dimensionality::<Ix2>()?;

        let dx = {
            let (w, _) = self.filters()?;
            let dcols = w.t().dot(&d);
            self.window
                .col2im(dcols.view(), dims)
                .ok_or_else(|| unfit(&Shape::new([dims.1, dims.2, dims.3])))?
        };

        if self.trainable {
            if let (Some(w), Some(b)) = (self.weights.as_mut(), self.bias.as_mut()) {
                let dw = reshape(d.dot(&cols.t()).into_dyn(), w.value().shape().to_vec())?;
                let db = d.sum_axis(Axis(1)).insert_axis(Axis(1));
                w.update(&dw)?;
                b.update(&db.into_dyn())?;
            }
        }

        Ok(dx.into_dyn())
    }

    fn set_trainable(&mut self, trainable: bool) {
        self.trainable = trainable;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, Array4, IxDyn};
    use rand::SeedableRng;

    fn conv(n_filters: usize, input: (usize, usize, usize), padding: Padding) -> Conv2d {
        let mut layer = Conv2d::new(n_filters, (3, 3), 1, padding);
        layer.set_input_shape(Shape::from(input));
        layer
            .initialize(
                &OptimizerConfig::GradientDescent { learning_rate: 0.1 },
                &mut StdRng::seed_from_u64(3),
            )
            .unwrap();
        layer
    }

    #[test]
    fn output_shapes() {
        assert_eq!(
            conv(16, (1, 8, 8), Padding::Same).output_shape().unwrap(),
            Shape::from((16, 8, 8))
        );
        assert_eq!(
            conv(4, (2, 8, 8), Padding::Valid).output_shape().unwrap(),
            Shape::from((4, 6, 6))
        );

        let mut strided = Conv2d::new(2, (3, 3), 2, Padding::Same);
        strided.set_input_shape(Shape::from((1, 8, 8)));
        assert_eq!(strided.output_shape().unwrap(), Shape::from((2, 4, 4)));
    }

    #[test]
    fn filters_larger_than_the_input_are_rejected() {
        let mut layer = Conv2d::new(2, (5, 5), 1, Padding::Valid);
        layer.set_input_shape(Shape::from((1, 3, 3)));
        assert!(matches!(
            layer.initialize(&OptimizerConfig::adam(), &mut StdRng::seed_from_u64(0)),
            Err(MlErr::InvalidShape { .. })
        ));
    }

    #[test]
    fn matches_a_direct_convolution() {
        let layer = conv(2, (2, 4, 4), Padding::Valid);
        let x = Array::range(0., 64., 1.)
            .mapv(|v: f32| (v * 0.37).sin())
            .into_shape_with_order((2, 2, 4, 4))
            .unwrap();

        let out = layer.infer(x.clone().into_dyn()).unwrap();
        assert_eq!(out.shape(), [2, 2, 2, 2]);

        let w = layer.weights.as_ref().unwrap().value();
        let mut expected = Array4::<f32>::zeros((2, 2, 2, 2));
        for ((b, f, i, j), e) in expected.indexed_iter_mut() {
            for c in 0..2 {
                for ki in 0..3 {
                    for kj in 0..3 {
                        *e += w[IxDyn(&[f, c, ki, kj])] * x[[b, c, i + ki, j + kj]];
                    }
                }
            }
        }

        for (a, e) in out.iter().zip(expected.iter()) {
            assert!((a - e).abs() < 1e-5);
        }
    }

    #[test]
    fn input_gradient_matches_finite_differences() {
        let mut layer = conv(2, (1, 4, 4), Padding::Same);
        layer.set_trainable(false);

        let x = Array::range(0., 16., 1.)
            .mapv(|v: f32| (v * 0.71).cos())
            .into_shape_with_order(vec![1, 1, 4, 4])
            .unwrap();
        let upstream = Array::range(0., 32., 1.)
            .mapv(|v: f32| (v * 0.13).sin())
            .into_shape_with_order(vec![1, 2, 4, 4])
            .unwrap();

        layer.forward_train(x.clone()).unwrap();
        let dx = layer.backward(upstream.clone()).unwrap();

        let h = 1e-2;
        for i in 0..x.len() {
            let mut plus = x.clone();
            let mut minus = x.clone();
            plus.as_slice_mut().unwrap()[i] += h;
            minus.as_slice_mut().unwrap()[i] -= h;

            let f_plus = (layer.infer(plus).unwrap() * &upstream).sum();
            let f_minus = (layer.infer(minus).unwrap() * &upstream).sum();
            let numeric = (f_plus - f_minus) / (2. * h);

            assert!((dx.as_slice().unwrap()[i] - numeric).abs() < 1e-2);
        }
    }

    #[test]
    fn a_training_step_lowers_a_linear_objective() {
        let mut layer = conv(1, (1, 4, 4), Padding::Same);
        let x = ArrayD::from_elem(vec![2, 1, 4, 4], 0.5);
        let ones = ArrayD::ones(vec![2, 1, 4, 4]);

        let before = layer.forward_train(x.clone()).unwrap().sum();
        layer.backward(ones).unwrap();
        let after = layer.infer(x).unwrap().sum();

        assert!(after < before);
    }
}
