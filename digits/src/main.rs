use std::env;

use anyhow::Result;
use log::info;
use orchestrator::ContextConfig;

use digits::{HarnessConfig, pipeline};

fn main() -> Result<()> {
    env_logger::init();

    let config = match env::args().nth(1) {
        Some(path) => HarnessConfig::from_file(path)?,
        None => HarnessConfig::default(),
    };

    let report = pipeline::run(&config, ContextConfig::from_env()?)?;

    let (train_err, val_err) = report.training.errors();
    info!("training errors: {train_err:?}");
    info!("validation errors: {val_err:?}");
    if let Some(evaluation) = report.evaluation {
        info!(
            "test loss {:.4}, test accuracy {:.4}",
            evaluation.loss, evaluation.accuracy
        );
    }

    Ok(())
}
