use serde::{Deserialize, Serialize};

use super::{Adam, GradientDescent, GradientDescentWithMomentum, Optimizer, RmsProp};
use crate::{MlErr, Result};

/// The optimization algorithm of a model and its hyperparameters.
///
/// Every trainable parameter tensor gets its own `ParamOptimizer` built from this
/// configuration, so stateful algorithms keep separate moments per tensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptimizerConfig {
    GradientDescent {
        learning_rate: f32,
    },
    GradientDescentWithMomentum {
        learning_rate: f32,
        momentum: f32,
    },
    Adam {
        learning_rate: f32,
        beta1: f32,
        beta2: f32,
        epsilon: f32,
    },
    RmsProp {
        learning_rate: f32,
        rho: f32,
        epsilon: f32,
    },
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::adam()
    }
}

impl OptimizerConfig {
    /// Adam with its usual hyperparameters.
    pub fn adam() -> Self {
        Self::Adam {
            learning_rate: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }

    /// Checks the hyperparameters are usable.
    pub fn validate(&self) -> Result<()> {
        let (lr, ok) = match *self {
            Self::GradientDescent { learning_rate } => (learning_rate, true),
            Self::GradientDescentWithMomentum {
                learning_rate,
                momentum,
            } => (learning_rate, (0.0..1.0).contains(&momentum)),
            Self::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
            } => (
                learning_rate,
                (0.0..1.0).contains(&beta1) && (0.0..1.0).contains(&beta2) && epsilon >= 0.0,
            ),
            Self::RmsProp {
                learning_rate,
                rho,
                epsilon,
            } => (learning_rate, (0.0..1.0).contains(&rho) && epsilon >= 0.0),
        };

        if !(lr.is_finite() && lr > 0.0) || !ok {
            return Err(MlErr::InvalidConfig(format!(
                "invalid optimizer hyperparameters: {self:?}"
            )));
        }

        Ok(())
    }

    /// Builds the optimizer state for a parameter tensor of `len` scalars.
    pub fn build(&self, len: usize) -> ParamOptimizer {
        match *self {
            Self::GradientDescent { learning_rate } => {
                ParamOptimizer::GradientDescent(GradientDescent::new(learning_rate))
            }
            Self::GradientDescentWithMomentum {
                learning_rate,
                momentum,
            } => ParamOptimizer::GradientDescentWithMomentum(GradientDescentWithMomentum::new(
                len,
                learning_rate,
                momentum,
            )),
            Self::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
            } => ParamOptimizer::Adam(Adam::new(len, learning_rate, beta1, beta2, epsilon)),
            Self::RmsProp {
                learning_rate,
                rho,
                epsilon,
            } => ParamOptimizer::RmsProp(RmsProp::new(len, learning_rate, rho, epsilon)),
        }
    }
}

/// The optimizer state attached to a single parameter tensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ParamOptimizer {
    GradientDescent(GradientDescent),
    GradientDescentWithMomentum(GradientDescentWithMomentum),
    Adam(Adam),
    RmsProp(RmsProp),
}

impl Optimizer for ParamOptimizer {
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) -> Result<()> {
        match self {
            Self::GradientDescent(o) => o.update_params(params, grad),
            Self::GradientDescentWithMomentum(o) => o.update_params(params, grad),
            Self::Adam(o) => o.update_params(params, grad),
            Self::RmsProp(o) => o.update_params(params, grad),
        }
    }
}
