use std::sync::Arc;

use anyhow::{Result, ensure};
use log::{info, warn};
use machine_learning::{
    arch::{Sequential, Shape},
    dataset::{
        CsvProvider, DatasetProvider, LabeledData, Split, reshape_samples, to_categorical,
        train_test_split,
    },
    training::{FitConfig, TrainingRun},
};
use ndarray::ArrayD;
use orchestrator::{ActiveGraph, Context, ContextConfig, GraphConfig, NodeId};
use rand::{SeedableRng, rngs::StdRng};

use crate::{
    DatasetSource, HarnessConfig, SyntheticDigits,
    models::{self, INPUT_SHAPE, N_CLASSES},
};

const CLIP_EPS: f32 = 1e-7;

/// The evaluation graph of a trained model, activated and waiting for its inputs.
#[derive(Debug)]
pub struct Compiled {
    pub graph: ActiveGraph,
    pub probabilities: NodeId,
    pub loss: NodeId,
    pub accuracy: NodeId,
}

/// What executing the evaluation graph produced.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub probabilities: ArrayD<f32>,
    pub loss: f32,
    pub accuracy: f32,
}

/// Everything a full run of the harness produced.
#[derive(Debug)]
pub struct Report {
    pub model: Sequential,
    pub training: TrainingRun,
    pub evaluation: Option<Evaluation>,
}

fn provider(config: &HarnessConfig) -> Box<dyn DatasetProvider> {
    match &config.dataset {
        DatasetSource::Synthetic { samples } => {
            Box::new(SyntheticDigits::new(*samples, config.seed))
        }
        DatasetSource::Csv { path, n_features } => Box::new(CsvProvider::new(path, *n_features)),
    }
}

/// Loads the digits, one-hot encodes their labels and splits them into `(N, 1, 8, 8)`
/// training and test tensors.
pub fn get_dataset(config: &HarnessConfig) -> Result<Split> {
    let raw = provider(config).load()?;
    ensure!(!raw.is_empty(), "the dataset is empty");

    let y = to_categorical(raw.labels.view(), Some(N_CLASSES))?.into_dyn();
    let x = reshape_samples(raw.features, &Shape::from(INPUT_SHAPE))?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let split = train_test_split(x.view(), y.view(), config.test_size, config.shuffle, &mut rng)?;

    info!(
        train = split.x_train.shape()[0],
        test = split.x_test.shape()[0];
        "loaded dataset"
    );
    Ok(split)
}

/// Builds the configured network, validating against the test set after every epoch.
pub fn create_model(
    config: &HarnessConfig,
    x_test: &ArrayD<f32>,
    y_test: &ArrayD<f32>,
) -> Result<Sequential> {
    let validation = LabeledData::new(x_test.clone(), y_test.clone())?;
    let model = models::build(config.model, config.optimizer, config.seed)?
        .with_validation(Arc::new(validation));

    info!("\n{}", model.summary());
    Ok(model)
}

/// Fits the model, persisting it afterwards if a save path is configured.
pub fn train(
    model: &mut Sequential,
    x_train: &ArrayD<f32>,
    y_train: &ArrayD<f32>,
    config: &HarnessConfig,
) -> Result<TrainingRun> {
    let mut fit = FitConfig::new(config.epochs, config.batch_size);
    if config.shuffle {
        fit = fit.shuffled();
    }
    if let Some(path) = &config.save_path {
        fit = fit.save_to(path);
    }

    let run = model.fit(x_train, y_train, &fit)?;
    if run.diverged() {
        warn!("training diverged, the errors are not finite");
    }

    Ok(run)
}

/// Declares the evaluation of a snapshot of `model` and activates it.
///
/// The graph takes the `x` samples and their one-hot `y` targets and yields the predicted
/// probabilities, their cross entropy and the accuracy of their argmax.
pub fn compile(ctx: &mut Context, config: &GraphConfig, model: &Sequential) -> Result<Compiled> {
    let mut g = ctx.graph(config.clone())?;

    let x = g.placeholder("x")?;
    let y = g.placeholder("y")?;

    let snapshot = model.clone();
    let probabilities = g.custom("predict", &[x], move |xs| {
        snapshot.predict(xs[0]).map_err(|e| e.to_string())
    })?;

    let clipped = g.clip(probabilities, CLIP_EPS, 1. - CLIP_EPS)?;
    let log_p = g.log(clipped)?;
    let picked = g.mul(y, log_p)?;
    let per_sample = g.sum(picked, Some(1))?;
    let mean = g.mean(per_sample, None)?;
    let loss = g.neg(mean)?;

    let predicted = g.argmax(probabilities, 1)?;
    let truth = g.argmax(y, 1)?;
    let hits = g.equal(predicted, truth)?;
    let accuracy = g.mean(hits, None)?;

    Ok(Compiled {
        graph: g.activate(ctx)?,
        probabilities,
        loss,
        accuracy,
    })
}

/// Executes a compiled evaluation over `x` and `y`, logging its progress.
pub fn execute(
    ctx: &mut Context,
    compiled: Compiled,
    x: &ArrayD<f32>,
    y: &ArrayD<f32>,
) -> Result<Evaluation> {
    let Compiled {
        graph,
        probabilities,
        loss,
        accuracy,
    } = compiled;

    let results = graph
        .execute(ctx, [("x", x.clone()), ("y", y.clone())])?
        .track_progress()?;

    let evaluation = Evaluation {
        probabilities: results.get(probabilities)?.clone(),
        loss: results.scalar(loss)?,
        accuracy: results.scalar(accuracy)?,
    };

    info!(loss = evaluation.loss, accuracy = evaluation.accuracy; "evaluated model");
    Ok(evaluation)
}

/// Runs the whole harness: load, build, fit, persist and, optionally, evaluate through a
/// graph.
pub fn run(config: &HarnessConfig, credentials: ContextConfig) -> Result<Report> {
    config.validate()?;
    let mut ctx = Context::initialize(credentials)?;

    let split = get_dataset(config)?;
    let mut model = create_model(config, &split.x_test, &split.y_test)?;
    let training = train(&mut model, &split.x_train, &split.y_train, config)?;

    let evaluation = if config.evaluate {
        let compiled = compile(&mut ctx, &config.graph, &model)?;
        Some(execute(&mut ctx, compiled, &split.x_test, &split.y_test)?)
    } else {
        None
    };

    ctx.end();
    Ok(Report {
        model,
        training,
        evaluation,
    })
}
