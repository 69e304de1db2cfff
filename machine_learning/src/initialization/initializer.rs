use ndarray::{ArrayD, IxDyn};
use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};
use serde::{Deserialize, Serialize};

use crate::{MlErr, Result};

/// Generates the initial values of a parameter tensor.
///
/// The fan based variants derive their distribution from the amount of input (`fan_in`) and
/// output (`fan_out`) units of the tensor, which the owning layer provides.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Initializer {
    Zeros,
    Ones,
    Const { value: f32 },
    Uniform { low: f32, high: f32 },
    Normal { mean: f32, std_dev: f32 },
    /// `U(-1/sqrt(fan_in), 1/sqrt(fan_in))`, the default for dense and convolutional weights.
    FanIn,
    XavierUniform,
    LecunUniform,
    Kaiming,
    Xavier,
    Lecun,
}

impl Initializer {
    /// Samples a tensor of the given shape.
    ///
    /// # Arguments
    /// * `rng` - A random number generator.
    /// * `shape` - The shape of the tensor to generate.
    /// * `fan_in` - The number of input units in the tensor.
    /// * `fan_out` - The number of output units in the tensor.
    ///
    /// # Returns
    /// The sampled tensor or an error if the derived distribution is invalid.
    pub fn sample<R>(
        &self,
        rng: &mut R,
        shape: &[usize],
        fan_in: usize,
        fan_out: usize,
    ) -> Result<ArrayD<f32>>
    where
        R: Rng + ?Sized,
    {
        let n = shape.iter().product();
        let values = match *self {
            Self::Zeros => vec![0.; n],
            Self::Ones => vec![1.; n],
            Self::Const { value } => vec![value; n],
            Self::Uniform { low, high } => uniform(rng, n, low, high)?,
            Self::Normal { mean, std_dev } => normal(rng, n, mean, std_dev)?,
            Self::FanIn => {
                let limit = 1. / (fan_in as f32).sqrt();
                uniform(rng, n, -limit, limit)?
            }
            Self::XavierUniform => {
                let limit = (6. / (fan_in + fan_out) as f32).sqrt();
                uniform(rng, n, -limit, limit)?
            }
            Self::LecunUniform => {
                let limit = (3. / fan_in as f32).sqrt();
                uniform(rng, n, -limit, limit)?
            }
            Self::Kaiming => normal(rng, n, 0., (2. / fan_in as f32).sqrt())?,
            Self::Xavier => normal(rng, n, 0., (2. / (fan_in + fan_out) as f32).sqrt())?,
            Self::Lecun => normal(rng, n, 0., (1. / fan_in as f32).sqrt())?,
        };

        Ok(ArrayD::from_shape_vec(IxDyn(shape), values)?)
    }
}

fn uniform<R>(rng: &mut R, n: usize, low: f32, high: f32) -> Result<Vec<f32>>
where
    R: Rng + ?Sized,
{
    let distribution = Uniform::new(low, high).map_err(|e| MlErr::Init(e.to_string()))?;
    Ok((0..n).map(|_| distribution.sample(rng)).collect())
}

fn normal<R>(rng: &mut R, n: usize, mean: f32, std_dev: f32) -> Result<Vec<f32>>
where
    R: Rng + ?Sized,
{
    let distribution = Normal::new(mean, std_dev).map_err(|e| MlErr::Init(e.to_string()))?;
    Ok((0..n).map(|_| distribution.sample(rng)).collect())
}
