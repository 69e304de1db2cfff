use std::{num::NonZeroUsize, sync::Arc};

use machine_learning::{
    MlErr,
    arch::{
        Sequential, Shape,
        activations::ActFn,
        layers::{Layer, LayerOps, Padding},
        loss::LossFnKind,
    },
    dataset::{DataLoader, LabeledData, argmax, to_categorical},
    optimization::OptimizerConfig,
    training::FitConfig,
};
use ndarray::{Array, Array1, ArrayD, Axis, Ix2};

fn images(n: usize) -> LabeledData {
    let x = Array::range(0., (n * 16) as f32, 1.)
        .mapv(|v: f32| ((v * 0.618).sin() + 1.) * 8.)
        .into_shape_with_order(vec![n, 1, 4, 4])
        .unwrap();
    let labels = Array1::from_iter((0..n).map(|i| i % 3));
    let y = to_categorical(labels.view(), Some(3)).unwrap().into_dyn();
    LabeledData::new(x, y).unwrap()
}

fn cnn(seed: u64) -> Sequential {
    cnn_with(seed, OptimizerConfig::adam())
}

fn cnn_with(seed: u64, optimizer: OptimizerConfig) -> Sequential {
    let mut model = Sequential::new(optimizer, LossFnKind::CrossEntropy).with_seed(seed);

    let layers = [
        Layer::conv2d(4, (3, 3), 1, Padding::Same).with_input_shape((1, 4, 4)),
        Layer::activation(ActFn::Relu),
        Layer::max_pool2d((2, 2), 2, Padding::Valid),
        Layer::dropout(0.25),
        Layer::batch_norm(),
        Layer::flatten(),
        Layer::dense(8),
        Layer::activation(ActFn::Relu),
        Layer::dense(3),
        Layer::activation(ActFn::Softmax),
    ];

    for layer in layers {
        model.add(layer).unwrap();
    }
    model
}

fn batch_losses(model: &mut Sequential, data: &LabeledData) -> Vec<f32> {
    DataLoader::new(data, NonZeroUsize::new(4).unwrap())
        .map(|(x, y)| model.train_on_batch(&x, &y).unwrap().0)
        .collect()
}

#[test]
fn shapes_are_inferred_through_the_pipeline() {
    let model = cnn(0);
    let shapes: Vec<_> = model
        .layers()
        .iter()
        .map(|l| l.output_shape().unwrap())
        .collect();

    assert_eq!(shapes[0], Shape::from((4, 4, 4)));
    assert_eq!(shapes[2], Shape::from((4, 2, 2)));
    assert_eq!(shapes[5], Shape::from(16));
    assert_eq!(model.output_shape().unwrap(), Shape::from(3));
}

#[test]
fn same_seed_same_loss_sequence() {
    let data = images(12);
    let mut a = cnn(42);
    let mut b = cnn(42);

    let losses_a = batch_losses(&mut a, &data);
    let losses_b = batch_losses(&mut b, &data);
    assert_eq!(losses_a.len(), 3);
    assert_eq!(
        losses_a.iter().map(|l| l.to_bits()).collect::<Vec<_>>(),
        losses_b.iter().map(|l| l.to_bits()).collect::<Vec<_>>()
    );

    let mut c = cnn(43);
    assert_ne!(losses_a, batch_losses(&mut c, &data));
}

#[test]
fn shuffled_fits_are_reproducible() {
    let data = images(10);
    let config = FitConfig::new(NonZeroUsize::new(2).unwrap(), NonZeroUsize::new(3).unwrap())
        .shuffled();

    let run_a = cnn(5).fit(data.x(), data.y(), &config).unwrap();
    let run_b = cnn(5).fit(data.x(), data.y(), &config).unwrap();
    assert_eq!(run_a.train_errors(), run_b.train_errors());
}

#[test]
fn testing_never_mutates_the_model() {
    let data = images(8);
    let mut model = cnn(1);
    batch_losses(&mut model, &data);

    let before = serde_json::to_string(&model).unwrap();
    let first = model.test_on_batch(data.x(), data.y()).unwrap();
    let second = model.test_on_batch(data.x(), data.y()).unwrap();

    assert_eq!(first, second);
    assert_eq!(before, serde_json::to_string(&model).unwrap());
}

#[test]
fn outputs_are_probability_rows() {
    let data = images(6);
    let out = cnn(2).predict(data.x()).unwrap();
    let out = out.into_dimensionality::<Ix2>().unwrap();

    for row in out.rows() {
        assert!((row.sum() - 1.).abs() < 1e-5);
        assert!(row.iter().all(|&p| (0. ..=1.).contains(&p)));
    }
}

#[test]
fn training_lowers_the_loss() {
    let data = images(24);
    let optimizer = OptimizerConfig::Adam {
        learning_rate: 0.01,
        beta1: 0.9,
        beta2: 0.999,
        epsilon: 1e-8,
    };
    let mut model = cnn_with(3, optimizer);
    let config = FitConfig::new(NonZeroUsize::new(40).unwrap(), NonZeroUsize::new(8).unwrap());

    let run = model.fit(data.x(), data.y(), &config).unwrap();
    let errors = run.train_errors();
    assert!(errors.iter().all(|e| e.is_finite()));
    assert!(errors[errors.len() - 1] < errors[0]);
}

#[test]
fn validation_errors_are_recorded() {
    let train = images(9);
    let validation = Arc::new(images(6));
    let mut model = cnn(4).with_validation(validation.clone());

    let config = FitConfig::new(NonZeroUsize::new(2).unwrap(), NonZeroUsize::new(4).unwrap());
    let run = model.fit(train.x(), train.y(), &config).unwrap();

    let (train_err, val_err) = run.errors();
    assert_eq!(train_err.len(), 2);
    assert_eq!(val_err.len(), 2);
    assert_eq!(
        run.last().unwrap().val_err,
        Some(model.test_on_batch(validation.x(), validation.y()).unwrap().0)
    );
}

#[test]
fn mismatched_validation_fails_before_training() {
    let train = images(8);
    let x = train.x().clone();
    let y = ArrayD::zeros(vec![8, 2]);
    let mut model = cnn(5).with_validation(Arc::new(LabeledData::new(x, y).unwrap()));
    let before = model.predict(train.x()).unwrap();

    let config = FitConfig::new(NonZeroUsize::new(1).unwrap(), NonZeroUsize::new(4).unwrap());
    assert!(matches!(
        model.fit(train.x(), train.y(), &config),
        Err(MlErr::ShapeMismatch {
            what: "targets",
            ..
        })
    ));
    assert_eq!(model.predict(train.x()).unwrap(), before);
}

#[test]
fn saved_models_predict_the_same() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");

    let data = images(8);
    let mut model = cnn(6);
    let config = FitConfig::new(NonZeroUsize::new(1).unwrap(), NonZeroUsize::new(4).unwrap())
        .save_to(&path);
    model.fit(data.x(), data.y(), &config).unwrap();

    let reloaded = Sequential::load(&path).unwrap();
    assert_eq!(reloaded.len(), model.len());
    assert_eq!(reloaded.seed(), model.seed());
    assert_eq!(
        reloaded.predict(data.x()).unwrap(),
        model.predict(data.x()).unwrap()
    );
}

#[test]
fn reloaded_models_keep_training() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");

    let data = images(8);
    let model = cnn(7);
    model.save(&path).unwrap();

    let mut reloaded = Sequential::load(&path).unwrap();
    let (loss, _) = reloaded.train_on_batch(data.x(), data.y()).unwrap();
    assert!(loss.is_finite());
}

#[test]
fn frozen_models_keep_their_parameters() {
    let data = images(4);
    let mut model = cnn(8);
    model.set_trainable(false);

    let before: Vec<ArrayD<f32>> = model
        .layers()
        .iter()
        .flat_map(|l| l.params().into_iter().map(|p| p.value().clone()))
        .collect();
    model.train_on_batch(data.x(), data.y()).unwrap();
    let after: Vec<ArrayD<f32>> = model
        .layers()
        .iter()
        .flat_map(|l| l.params().into_iter().map(|p| p.value().clone()))
        .collect();

    assert_eq!(before, after);
}

#[test]
fn one_hot_round_trip() {
    let labels = Array1::from_iter((0..100).map(|i| (i * 7) % 10));
    let one_hot = to_categorical(labels.view(), None).unwrap();
    assert_eq!(argmax(one_hot.view(), Axis(1)), labels);
}

#[test]
fn wrong_batches_are_configuration_errors() {
    let mut model = cnn(9);
    let flat = ArrayD::zeros(vec![2, 16]);
    assert!(matches!(
        model.forward(&flat, true),
        Err(MlErr::ShapeMismatch { .. })
    ));
}
