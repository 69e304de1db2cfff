use ndarray::ArrayD;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::{Activation, BatchNorm, Conv2d, Dense, Dropout, Flatten, Padding, Pool2d, PoolKind};
use crate::{
    MlErr, Result,
    arch::{Param, Shape, activations::ActFn},
    optimization::OptimizerConfig,
};

/// The capabilities every layer of a model provides.
pub trait LayerOps {
    /// The layer's type name.
    fn name(&self) -> &'static str;

    /// A descriptive name, used in model summaries.
    fn label(&self) -> String {
        self.name().to_string()
    }

    /// The per sample input shape, if declared or already inferred.
    fn input_shape(&self) -> Option<&Shape>;

    fn set_input_shape(&mut self, shape: Shape);

    /// Validates the input shape against the layer's configuration and creates its
    /// parameters, each one with its own optimizer state.
    ///
    /// # Arguments
    /// * `optimizer` - The optimizer configuration of the owning model.
    /// * `rng` - The owning model's random generator.
    fn initialize(&mut self, optimizer: &OptimizerConfig, rng: &mut StdRng) -> Result<()>;

    /// The per sample output shape, derived from the input shape.
    fn output_shape(&self) -> Result<Shape>;

    /// The trainable tensors of this layer.
    fn params(&self) -> Vec<&Param> {
        Vec::new()
    }

    /// The amount of trainable scalars.
    fn parameters(&self) -> usize {
        self.params().iter().map(|p| p.len()).sum()
    }

    /// Forward pass that keeps whatever `backward` needs.
    fn forward_train(&mut self, x: ArrayD<f32>) -> Result<ArrayD<f32>>;

    /// Forward pass in inference mode, it never changes the layer.
    fn infer(&self, x: ArrayD<f32>) -> Result<ArrayD<f32>>;

    /// Makes a forward pass in either training or inference mode.
    fn forward(&mut self, x: ArrayD<f32>, training: bool) -> Result<ArrayD<f32>> {
        if training {
            self.forward_train(x)
        } else {
            self.infer(x)
        }
    }

    /// Back propagates the gradient with respect to the output, updating the parameters in
    /// place when trainable.
    ///
    /// # Returns
    /// The gradient with respect to the input, computed with the parameters prior to the update.
    fn backward(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>>;

    /// Frozen layers still propagate gradients but never update their parameters.
    fn set_trainable(&mut self, _trainable: bool) {}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "layer", rename_all = "snake_case")]
pub enum Layer {
    Conv2d(Conv2d),
    Dense(Dense),
    Dropout(Dropout),
    BatchNorm(BatchNorm),
    Activation(Activation),
    Flatten(Flatten),
    Pool2d(Pool2d),
}

macro_rules! dispatch {
    ($self:expr, $layer:ident => $body:expr) => {
        match $self {
            Layer::Conv2d($layer) => $body,
            Layer::Dense($layer) => $body,
            Layer::Dropout($layer) => $body,
            Layer::BatchNorm($layer) => $body,
            Layer::Activation($layer) => $body,
            Layer::Flatten($layer) => $body,
            Layer::Pool2d($layer) => $body,
        }
    };
}

impl Layer {
    /// A 2d convolution with `n_filters` filters of `filter_shape`.
    pub fn conv2d(
        n_filters: usize,
        filter_shape: (usize, usize),
        stride: usize,
        padding: Padding,
    ) -> Self {
        Self::Conv2d(Conv2d::new(n_filters, filter_shape, stride, padding))
    }

    pub fn dense(units: usize) -> Self {
        Self::Dense(Dense::new(units))
    }

    pub fn dropout(p: f32) -> Self {
        Self::Dropout(Dropout::new(p))
    }

    pub fn batch_norm() -> Self {
        Self::BatchNorm(BatchNorm::default())
    }

    pub fn batch_norm_with_momentum(momentum: f32) -> Self {
        Self::BatchNorm(BatchNorm::new(momentum))
    }

    pub fn activation(act_fn: ActFn) -> Self {
        Self::Activation(Activation::new(act_fn))
    }

    pub fn flatten() -> Self {
        Self::Flatten(Flatten::default())
    }

    pub fn max_pool2d(pool_shape: (usize, usize), stride: usize, padding: Padding) -> Self {
        Self::Pool2d(Pool2d::new(PoolKind::Max, pool_shape, stride, padding))
    }

    pub fn avg_pool2d(pool_shape: (usize, usize), stride: usize, padding: Padding) -> Self {
        Self::Pool2d(Pool2d::new(PoolKind::Average, pool_shape, stride, padding))
    }

    /// Declares the input shape of this layer.
    pub fn with_input_shape<S: Into<Shape>>(mut self, shape: S) -> Self {
        self.set_input_shape(shape.into());
        self
    }
}

impl LayerOps for Layer {
    fn name(&self) -> &'static str {
        dispatch!(self, l => l.name())
    }

    fn label(&self) -> String {
        dispatch!(self, l => l.label())
    }

    fn input_shape(&self) -> Option<&Shape> {
        dispatch!(self, l => l.input_shape())
    }

    fn set_input_shape(&mut self, shape: Shape) {
        dispatch!(self, l => l.set_input_shape(shape))
    }

    fn initialize(&mut self, optimizer: &OptimizerConfig, rng: &mut StdRng) -> Result<()> {
        dispatch!(self, l => l.initialize(optimizer, rng))
    }

    fn output_shape(&self) -> Result<Shape> {
        dispatch!(self, l => l.output_shape())
    }

    fn params(&self) -> Vec<&Param> {
        dispatch!(self, l => l.params())
    }

    fn parameters(&self) -> usize {
        dispatch!(self, l => l.parameters())
    }

    fn forward_train(&mut self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        dispatch!(self, l => l.forward_train(x))
    }

    fn infer(&self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        dispatch!(self, l => l.infer(x))
    }

    fn backward(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        dispatch!(self, l => l.backward(d))
    }

    fn set_trainable(&mut self, trainable: bool) {
        dispatch!(self, l => l.set_trainable(trainable))
    }
}

/// Returns the input shape of `layer` or an error if it was never given one.
pub(super) fn declared<'a>(layer: &'static str, shape: &'a Option<Shape>) -> Result<&'a Shape> {
    shape.as_ref().ok_or(MlErr::NotInitialized { layer })
}

/// Checks `x` is a non empty batch of samples shaped `expected`.
///
/// # Returns
/// The batch size.
pub(super) fn check_batch(layer: &'static str, x: &ArrayD<f32>, expected: &Shape) -> Result<usize> {
    let got = Shape::of_sample(x.shape());
    if x.ndim() != expected.rank() + 1 || &got != expected {
        return Err(MlErr::ShapeMismatch {
            what: layer,
            got,
            expected: expected.clone(),
        });
    }

    match x.shape()[0] {
        0 => Err(MlErr::EmptyBatch),
        n => Ok(n),
    }
}

/// Checks a gradient has exactly the shape of the tensor it is the gradient of.
pub(super) fn check_grad(layer: &'static str, d: &ArrayD<f32>, expected: &[usize]) -> Result<()> {
    if d.shape() != expected {
        return Err(MlErr::ShapeMismatch {
            what: layer,
            got: Shape::from(d.shape()),
            expected: Shape::from(expected),
        });
    }

    Ok(())
}

/// Reshapes `x` in row major order.
pub(super) fn reshape(x: ArrayD<f32>, dims: Vec<usize>) -> Result<ArrayD<f32>> {
    let x = if x.is_standard_layout() {
        x
    } else {
        x.as_standard_layout().into_owned()
    };

    Ok(x.into_shape_with_order(dims)?)
}
