use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
    sync::Arc,
    time::Instant,
};

use log::{debug, info, warn};
use ndarray::ArrayD;
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use super::{
    Shape, Summary, SummaryRow,
    layers::{Layer, LayerOps},
    loss::{LossFn, LossFnKind},
};
use crate::{
    MlErr, Result,
    dataset::{DataLoader, LabeledData},
    optimization::OptimizerConfig,
    training::{EpochMetrics, EpochRecord, FitConfig, TrainingRun},
};

fn unseeded() -> StdRng {
    StdRng::seed_from_u64(0)
}

/// A sequential model: information flows forward through its layers in insertion order when
/// computing an output and backward in reverse order when computing the gradients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequential {
    layers: Vec<Layer>,
    loss: LossFnKind,
    optimizer: OptimizerConfig,
    seed: u64,

    // Reseeded from `seed` by `load`.
    #[serde(skip, default = "unseeded")]
    rng: StdRng,
    #[serde(skip)]
    validation: Option<Arc<LabeledData>>,
}

impl Sequential {
    /// Creates a new empty `Sequential` with a random seed.
    ///
    /// # Arguments
    /// * `optimizer` - The configuration every trainable parameter's optimizer is built from.
    /// * `loss` - The loss function to train with.
    pub fn new(optimizer: OptimizerConfig, loss: LossFnKind) -> Self {
        let seed = rand::rng().random();

        Self {
            layers: Vec::new(),
            loss,
            optimizer,
            seed,
            rng: StdRng::seed_from_u64(seed),
            validation: None,
        }
    }

    /// Fixes the seed used for parameter initialization, dropout masks and shuffling. Only
    /// layers added afterwards are affected.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Evaluates `validation` at the end of every `fit` epoch.
    pub fn with_validation(mut self, validation: Arc<LabeledData>) -> Self {
        self.set_validation(Some(validation));
        self
    }

    pub fn set_validation(&mut self, validation: Option<Arc<LabeledData>>) {
        self.validation = validation;
    }

    pub fn validation(&self) -> Option<&Arc<LabeledData>> {
        self.validation.as_ref()
    }

    /// Appends a layer to the model.
    ///
    /// The first layer must declare its input shape, the following ones get the previous
    /// layer's output shape unless they declare one, in which case both must match. The
    /// layer's parameters are initialized once its shape is known.
    ///
    /// # Errors
    /// If the shapes don't line up or the layer rejects its input shape or configuration.
    pub fn add(&mut self, mut layer: Layer) -> Result<()> {
        self.optimizer.validate()?;

        let declared = layer.input_shape().cloned();
        match (self.layers.last(), declared) {
            (None, None) => {
                return Err(MlErr::MissingInputShape {
                    layer: layer.name(),
                });
            }
            (None, Some(_)) => {}
            (Some(prev), declared) => {
                let expected = prev.output_shape()?;
                match declared {
                    Some(got) if got != expected => {
                        return Err(MlErr::ShapeMismatch {
                            what: layer.name(),
                            got,
                            expected,
                        });
                    }
                    Some(_) => {}
                    None => layer.set_input_shape(expected),
                }
            }
        }

        layer.initialize(&self.optimizer, &mut self.rng)?;

        debug!(
            layer:% = layer.label(),
            parameters = layer.parameters(),
            index = self.layers.len();
            "added layer"
        );

        self.layers.push(layer);
        Ok(())
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn loss(&self) -> LossFnKind {
        self.loss
    }

    pub fn optimizer(&self) -> &OptimizerConfig {
        &self.optimizer
    }

    /// The per sample shape the model expects.
    pub fn input_shape(&self) -> Option<&Shape> {
        self.layers.first().and_then(|l| l.input_shape())
    }

    /// The per sample shape the model produces.
    pub fn output_shape(&self) -> Result<Shape> {
        self.layers.last().ok_or(MlErr::EmptyModel)?.output_shape()
    }

    /// The amount of trainable scalars.
    pub fn parameters(&self) -> usize {
        self.layers.iter().map(|l| l.parameters()).sum()
    }

    /// Freezes or unfreezes every layer.
    pub fn set_trainable(&mut self, trainable: bool) {
        for layer in &mut self.layers {
            layer.set_trainable(trainable);
        }
    }

    fn check_input(&self, x: &ArrayD<f32>) -> Result<()> {
        let expected = self.input_shape().ok_or(MlErr::EmptyModel)?;
        let got = Shape::of_sample(x.shape());
        if x.ndim() != expected.rank() + 1 || &got != expected {
            return Err(MlErr::ShapeMismatch {
                what: "input batch",
                got,
                expected: expected.clone(),
            });
        }

        if x.shape()[0] == 0 {
            return Err(MlErr::EmptyBatch);
        }

        Ok(())
    }

    /// Makes a forward pass through the network.
    ///
    /// # Arguments
    /// * `x` - A batch of samples shaped like the first layer's input.
    /// * `training` - Whether the layers keep what `backward` needs and apply their training
    ///   behaviour.
    ///
    /// # Returns
    /// The output of the last layer or an error if the batch doesn't fit the model.
    pub fn forward(&mut self, x: &ArrayD<f32>, training: bool) -> Result<ArrayD<f32>> {
        if !training {
            return self.predict(x);
        }

        self.check_input(x)?;
        self.layers
            .iter_mut()
            .try_fold(x.clone(), |x, layer| layer.forward_train(x))
    }

    /// Makes an inference forward pass, the model is left untouched.
    pub fn predict(&self, x: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        self.check_input(x)?;
        self.layers
            .iter()
            .try_fold(x.clone(), |x, layer| layer.infer(x))
    }

    /// Back propagates the gradient of the loss with respect to the model's output, every
    /// trainable layer updating its parameters along the way.
    pub fn backward(&mut self, grad: ArrayD<f32>) -> Result<()> {
        if self.layers.is_empty() {
            return Err(MlErr::EmptyModel);
        }

        self.layers
            .iter_mut()
            .rev()
            .try_fold(grad, |d, layer| layer.backward(d))?;

        Ok(())
    }

    fn check_targets(y_pred: &ArrayD<f32>, y: &ArrayD<f32>) -> Result<()> {
        if y_pred.shape() != y.shape() {
            return Err(MlErr::ShapeMismatch {
                what: "targets",
                got: Shape::from(y.shape()),
                expected: Shape::from(y_pred.shape()),
            });
        }

        Ok(())
    }

    fn check_data(&self, data: &LabeledData) -> Result<()> {
        self.check_input(data.x())?;

        let expected = self.output_shape()?;
        let got = Shape::of_sample(data.y().shape());
        if data.y().ndim() != expected.rank() + 1 || got != expected {
            return Err(MlErr::ShapeMismatch {
                what: "targets",
                got,
                expected,
            });
        }

        Ok(())
    }

    /// Takes a single optimization step over a batch.
    ///
    /// # Returns
    /// The batch's loss and accuracy, measured before the update.
    pub fn train_on_batch(&mut self, x: &ArrayD<f32>, y: &ArrayD<f32>) -> Result<(f32, f32)> {
        let y_pred = self.forward(x, true)?;
        Self::check_targets(&y_pred, y)?;

        let loss = self.loss.loss(y_pred.view(), y.view());
        let acc = self.loss.acc(y_pred.view(), y.view());
        let grad = self.loss.loss_prime(y_pred.view(), y.view());
        self.backward(grad)?;

        Ok((loss, acc))
    }

    /// Evaluates the model over a batch in inference mode.
    ///
    /// # Returns
    /// The batch's loss and accuracy.
    pub fn test_on_batch(&self, x: &ArrayD<f32>, y: &ArrayD<f32>) -> Result<(f32, f32)> {
        let y_pred = self.predict(x)?;
        Self::check_targets(&y_pred, y)?;

        Ok((
            self.loss.loss(y_pred.view(), y.view()),
            self.loss.acc(y_pred.view(), y.view()),
        ))
    }

    /// Trains the model over `x` and `y` for `config.epochs` epochs.
    ///
    /// # Returns
    /// The per epoch training and, if the model holds validation data, validation errors.
    pub fn fit(
        &mut self,
        x: &ArrayD<f32>,
        y: &ArrayD<f32>,
        config: &FitConfig,
    ) -> Result<TrainingRun> {
        let data = LabeledData::new(x.clone(), y.clone())?;
        self.fit_data(&data, config)
    }

    /// Same as `fit` over an already paired dataset.
    pub fn fit_data(&mut self, data: &LabeledData, config: &FitConfig) -> Result<TrainingRun> {
        if data.is_empty() {
            return Err(MlErr::EmptyBatch);
        }
        self.check_data(data)?;
        if let Some(val) = &self.validation {
            self.check_data(val)?;
        }

        let epochs = config.epochs.get();
        let mut run = TrainingRun::default();

        for epoch in 1..=epochs {
            let started = Instant::now();
            let batches = if config.shuffle {
                DataLoader::shuffled(data, config.batch_size, &mut self.rng)
            } else {
                DataLoader::new(data, config.batch_size)
            };

            let mut metrics = EpochMetrics::default();
            let (mut err_sum, mut acc_sum) = (0., 0.);
            for (x, y) in batches {
                let (loss, acc) = self.train_on_batch(&x, &y)?;
                err_sum += loss;
                acc_sum += acc;
                metrics.bump_batch();
                metrics.add_samples(x.shape()[0]);
            }

            let n_batches = metrics.batches as f32;
            let (train_err, train_acc) = (err_sum / n_batches, acc_sum / n_batches);

            let (val_err, val_acc) = match &self.validation {
                Some(val) => {
                    let (err, acc) = self.test_on_batch(val.x(), val.y())?;
                    (Some(err), Some(acc))
                }
                None => (None, None),
            };

            metrics.wall_time = started.elapsed();
            info!(
                "epoch {epoch}/{epochs}: train_err={train_err:.4} train_acc={train_acc:.4} \
                 val_err={val_err:?} val_acc={val_acc:?} elapsed={:?}",
                metrics.wall_time
            );

            if !train_err.is_finite() || val_err.is_some_and(|e| !e.is_finite()) {
                warn!(
                    "epoch {epoch} produced a non finite error: train_err={train_err} \
                     val_err={val_err:?}"
                );
            }

            run.push(EpochRecord {
                epoch,
                train_err,
                train_acc,
                val_err,
                val_acc,
                metrics,
            });
        }

        if let Some(path) = &config.save_model {
            self.save(path)?;
            info!("saved model to {}", path.display());
        }

        Ok(run)
    }

    /// The layers, their output shapes and parameter counts.
    pub fn summary(&self) -> Summary {
        let rows = self
            .layers
            .iter()
            .map(|l| SummaryRow {
                layer: l.label(),
                parameters: l.parameters(),
                output_shape: l.output_shape().unwrap_or_default(),
            })
            .collect();

        Summary {
            input_shape: self.input_shape().cloned().unwrap_or_default(),
            rows,
        }
    }

    /// Writes the whole model, optimizer state and running statistics included, as json.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    /// Reads a model written by `save`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let mut model: Self = serde_json::from_reader(reader)?;
        model.rng = StdRng::seed_from_u64(model.seed);
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::{activations::ActFn, layers::Padding};
    use ndarray::Array;
    use std::num::NonZeroUsize;

    fn classifier(seed: u64) -> Sequential {
        let mut model =
            Sequential::new(OptimizerConfig::adam(), LossFnKind::CrossEntropy).with_seed(seed);
        model.add(Layer::dense(8).with_input_shape(4)).unwrap();
        model.add(Layer::activation(ActFn::Relu)).unwrap();
        model.add(Layer::dropout(0.2)).unwrap();
        model.add(Layer::dense(3)).unwrap();
        model.add(Layer::activation(ActFn::Softmax)).unwrap();
        model
    }

    fn batch(n: usize) -> (ArrayD<f32>, ArrayD<f32>) {
        let x = Array::range(0., (n * 4) as f32, 1.)
            .mapv(|v: f32| (v * 0.3).sin())
            .into_shape_with_order(vec![n, 4])
            .unwrap();
        let mut y = ArrayD::zeros(vec![n, 3]);
        for i in 0..n {
            y[[i, i % 3]] = 1.;
        }
        (x, y)
    }

    #[test]
    fn the_first_layer_needs_an_input_shape() {
        let mut model = Sequential::new(OptimizerConfig::adam(), LossFnKind::CrossEntropy);
        assert!(matches!(
            model.add(Layer::dense(3)),
            Err(MlErr::MissingInputShape { layer: "Dense" })
        ));
        assert!(model.is_empty());
    }

    #[test]
    fn declared_shapes_must_match_the_previous_output() {
        let mut model = Sequential::new(OptimizerConfig::adam(), LossFnKind::CrossEntropy);
        model.add(Layer::dense(8).with_input_shape(4)).unwrap();
        assert!(matches!(
            model.add(Layer::dense(2).with_input_shape(5)),
            Err(MlErr::ShapeMismatch { .. })
        ));
        model.add(Layer::dense(2).with_input_shape(8)).unwrap();
        assert_eq!(model.len(), 2);
    }

    #[test]
    fn layer_shape_validation_fails_at_add_time() {
        let mut model = Sequential::new(OptimizerConfig::adam(), LossFnKind::CrossEntropy);
        model.add(Layer::dense(8).with_input_shape(4)).unwrap();
        assert!(model.add(Layer::conv2d(2, (3, 3), 1, Padding::Same)).is_err());
    }

    #[test]
    fn forward_output_matches_the_declared_output_shape() {
        let mut model = classifier(1);
        let (x, _) = batch(5);

        let out = model.forward(&x, true).unwrap();
        assert_eq!(Shape::of_sample(out.shape()), model.output_shape().unwrap());
        assert_eq!(out.shape(), [5, 3]);
    }

    #[test]
    fn mismatching_batches_fail_on_forward() {
        let model = classifier(1);
        assert!(matches!(
            model.predict(&ArrayD::zeros(vec![2, 5])),
            Err(MlErr::ShapeMismatch { what: "input batch", .. })
        ));
        assert!(matches!(
            model.predict(&ArrayD::zeros(vec![0, 4])),
            Err(MlErr::EmptyBatch)
        ));
    }

    #[test]
    fn backward_without_a_training_forward_fails() {
        let mut model = classifier(1);
        let (x, _) = batch(2);
        model.forward(&x, false).unwrap();
        assert!(matches!(
            model.backward(ArrayD::zeros(vec![2, 3])),
            Err(MlErr::MissingCache { .. })
        ));
    }

    #[test]
    fn targets_must_match_the_output() {
        let mut model = classifier(1);
        let (x, _) = batch(2);
        assert!(model.train_on_batch(&x, &ArrayD::zeros(vec![2, 4])).is_err());
    }

    #[test]
    fn fit_records_every_epoch() {
        let (x, y) = batch(30);
        let validation = Arc::new(LabeledData::new(x.clone(), y.clone()).unwrap());
        let mut model = classifier(2).with_validation(validation);

        let config = FitConfig::new(NonZeroUsize::new(3).unwrap(), NonZeroUsize::new(8).unwrap())
            .shuffled();
        let run = model.fit(&x, &y, &config).unwrap();

        assert_eq!(run.epochs().len(), 3);
        assert!(run.epochs().iter().all(|e| e.metrics.batches == 4));
        assert!(run.epochs().iter().all(|e| e.metrics.samples == 30));

        let (train, val) = run.errors();
        assert_eq!(train.len(), 3);
        assert_eq!(val.len(), 3);
        assert!(!run.diverged());
    }

    #[test]
    fn summary_lists_every_layer() {
        let summary = classifier(0).summary();
        assert_eq!(summary.input_shape, Shape::from(4));
        assert_eq!(summary.rows.len(), 5);
        assert_eq!(summary.rows[1].layer, "Activation (ReLU)");
        assert_eq!(summary.total_parameters(), (4 * 8 + 8) + (8 * 3 + 3));
        assert_eq!(summary.rows[4].output_shape, Shape::from(3));
    }
}
