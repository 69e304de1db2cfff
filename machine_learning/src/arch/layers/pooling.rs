use ndarray::{Array2, ArrayD, Axis, Ix4};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::{
    LayerOps, Padding, Window,
    layer::{check_batch, check_grad, declared, reshape},
};
use crate::{MlErr, Result, arch::Shape, optimization::OptimizerConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
    Max,
    Average,
}

#[derive(Debug, Clone)]
struct Cache {
    dims: (usize, usize, usize, usize),
    // Winning row of every column, only for max pooling.
    argmax: Vec<usize>,
}

/// Pools every channel independently over sliding windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pool2d {
    kind: PoolKind,
    window: Window,
    input_shape: Option<Shape>,

    #[serde(skip)]
    cache: Option<Cache>,
}

impl Pool2d {
    /// Creates a new `Pool2d`.
    ///
    /// # Arguments
    /// * `kind` - Whether to take the maximum or the mean of each window.
    /// * `pool_shape` - The window's height and width.
    /// * `stride` - The step between two window positions.
    /// * `padding` - The border handling.
    pub fn new(
        kind: PoolKind,
        pool_shape: (usize, usize),
        stride: usize,
        padding: Padding,
    ) -> Self {
        Self {
            kind,
            window: Window::new(pool_shape, stride, padding),
            input_shape: None,
            cache: None,
        }
    }

    fn name_of(kind: PoolKind) -> &'static str {
        match kind {
            PoolKind::Max => "MaxPooling2D",
            PoolKind::Average => "AveragePooling2D",
        }
    }

    fn unfit(&self, shape: &Shape) -> MlErr {
        MlErr::InvalidShape {
            layer: self.name(),
            shape: shape.clone(),
            reason: "the pool doesn't fit in the padded input",
        }
    }

    fn geometry(&self) -> Result<(usize, usize, usize)> {
        let shape = declared(self.name(), &self.input_shape)?;
        let &[c, h, w] = shape.dims() else {
            return Err(MlErr::InvalidShape {
                layer: self.name(),
                shape: shape.clone(),
                reason: "expected a (channels, height, width) input",
            });
        };

        let (oh, ow) = self
            .window
            .output_dims(h, w)
            .ok_or_else(|| self.unfit(shape))?;

        Ok((c, oh, ow))
    }

    /// Every channel of every sample as its own single channel image, unfolded.
    fn unfold(&self, x: ArrayD<f32>) -> Result<(Array2<f32>, (usize, usize, usize, usize))> {
        let n = check_batch(self.name(), &x, declared(self.name(), &self.input_shape)?)?;
        let (c, _, _) = self.geometry()?;
        let x = x.into_dimensionality::<Ix4>()?;
        let dims = x.dim();

        let pad_value = match self.kind {
            PoolKind::Max => f32::NEG_INFINITY,
            PoolKind::Average => 0.,
        };

        let channels = reshape(x.into_dyn(), vec![n * c, 1, dims.2, dims.3])?
            .into_dimensionality::<Ix4>()?;
        let cols = self
            .window
            .im2col(channels.view(), pad_value)
            .ok_or_else(|| self.unfit(&Shape::new([1, dims.2, dims.3])))?;

        Ok((cols, dims))
    }

    fn pool(&self, x: ArrayD<f32>) -> Result<(ArrayD<f32>, Cache)> {
        let (_, oh, ow) = self.geometry()?;
        let (cols, dims) = self.unfold(x)?;
        let (n, c, _, _) = dims;

        let (out, argmax) = match self.kind {
            PoolKind::Max => {
                let argmax: Vec<usize> = cols
                    .columns()
                    .into_iter()
                    .map(|col| {
                        col.iter()
                            .enumerate()
                            .fold((0, f32::NEG_INFINITY), |best, (i, &v)| {
                                if v > best.1 { (i, v) } else { best }
                            })
                            .0
                    })
                    .collect();

                let out = argmax
                    .iter()
                    .enumerate()
                    .map(|(j, &i)| cols[[i, j]])
                    .collect::<Vec<_>>();
                (out, argmax)
            }
            PoolKind::Average => {
                let out = cols.mean_axis(Axis(0)).ok_or(MlErr::EmptyBatch)?.to_vec();
                (out, Vec::new())
            }
        };

        let out = ArrayD::from_shape_vec(vec![n, c, oh, ow], out)?;
        Ok((out, Cache { dims, argmax }))
    }
}

impl LayerOps for Pool2d {
    fn name(&self) -> &'static str {
        Self::name_of(self.kind)
    }

    fn input_shape(&self) -> Option<&Shape> {
        self.input_shape.as_ref()
    }

    fn set_input_shape(&mut self, shape: Shape) {
        self.input_shape = Some(shape);
    }

    fn initialize(&mut self, _optimizer: &OptimizerConfig, _rng: &mut StdRng) -> Result<()> {
        self.geometry().map(|_| ())
    }

    fn output_shape(&self) -> Result<Shape> {
        let (c, oh, ow) = self.geometry()?;
        Ok(Shape::from((c, oh, ow)))
    }

    fn forward_train(&mut self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let (out, cache) = self.pool(x)?;
        self.cache = Some(cache);
        Ok(out)
    }

    fn infer(&self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        Ok(self.pool(x)?.0)
    }

    fn backward(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let name = self.name();
        let Cache { dims, argmax } = self.cache.take().ok_or(MlErr::MissingCache { layer: name })?;
        let (c, oh, ow) = self.geometry()?;
        let (n, _, h, w) = dims;
        check_grad(name, &d, &[n, c, oh, ow])?;

        let (kh, kw) = self.window.kernel;
        let d = reshape(d, vec![n * c * oh * ow])?;
        let mut dcols = Array2::zeros((kh * kw, d.len()));

        match self.kind {
            PoolKind::Max => {
                for (j, (&i, &g)) in argmax.iter().zip(d.iter()).enumerate() {
                    dcols[[i, j]] = g;
                }
            }
            PoolKind::Average => {
                let size = (kh * kw) as f32;
                for (mut col, &g) in dcols.columns_mut().into_iter().zip(d.iter()) {
                    col.fill(g / size);
                }
            }
        }

        let dx = self
            .window
            .col2im(dcols.view(), (n * c, 1, h, w))
            .ok_or_else(|| self.unfit(&Shape::new([1, h, w])))?;

        reshape(dx.into_dyn(), vec![n, c, h, w])
    }
}
