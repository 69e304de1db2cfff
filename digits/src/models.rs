use machine_learning::{
    Result,
    arch::{
        Sequential,
        activations::ActFn,
        layers::{Layer, Padding},
        loss::LossFnKind,
    },
    optimization::OptimizerConfig,
};

use crate::ModelVariant;

/// The per sample shape both networks take, one grey channel of 8x8 pixels.
pub const INPUT_SHAPE: (usize, usize, usize) = (1, 8, 8);
pub const N_CLASSES: usize = 10;

/// The layers of `variant`, in order.
pub fn layers(variant: ModelVariant) -> Vec<Layer> {
    let conv = |filters| Layer::conv2d(filters, (3, 3), 1, Padding::Same);
    let relu = || Layer::activation(ActFn::Relu);

    match variant {
        ModelVariant::Plain => vec![
            conv(16).with_input_shape(INPUT_SHAPE),
            relu(),
            Layer::dropout(0.25),
            Layer::batch_norm(),
            conv(32),
            relu(),
            Layer::dropout(0.25),
            Layer::batch_norm(),
            Layer::flatten(),
            Layer::dense(256),
            relu(),
            Layer::dropout(0.4),
            Layer::batch_norm(),
            Layer::dense(N_CLASSES),
            Layer::activation(ActFn::Softmax),
        ],
        ModelVariant::Pooled => vec![
            conv(16).with_input_shape(INPUT_SHAPE),
            relu(),
            Layer::max_pool2d((2, 2), 2, Padding::Valid),
            Layer::dropout(0.25),
            Layer::batch_norm(),
            Layer::max_pool2d((2, 2), 2, Padding::Same),
            conv(32),
            relu(),
            Layer::max_pool2d((2, 2), 2, Padding::Valid),
            Layer::dropout(0.25),
            Layer::batch_norm(),
            Layer::flatten(),
            Layer::dense(256),
            relu(),
            Layer::dropout(0.4),
            Layer::batch_norm(),
            Layer::dense(N_CLASSES),
            Layer::activation(ActFn::Softmax),
        ],
    }
}

/// Builds `variant` as a cross entropy classifier.
///
/// # Arguments
/// * `variant` - Which network to build.
/// * `optimizer` - The optimizer every parameter is trained with.
/// * `seed` - Seeds parameter initialization, dropout masks and shuffling.
pub fn build(variant: ModelVariant, optimizer: OptimizerConfig, seed: u64) -> Result<Sequential> {
    let mut model = Sequential::new(optimizer, LossFnKind::CrossEntropy).with_seed(seed);
    for layer in layers(variant) {
        model.add(layer)?;
    }
    Ok(model)
}
