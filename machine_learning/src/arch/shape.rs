use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// The shape of a single sample, that is, a tensor's shape without its leading batch axis.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Shape(Vec<usize>);

impl Shape {
    /// Creates a new `Shape`.
    ///
    /// # Arguments
    /// * `dims` - The extents of every axis of a sample.
    pub fn new<I>(dims: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        Self(dims.into_iter().collect())
    }

    /// The extents of every axis.
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// The amount of axes.
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// The amount of scalars a sample of this shape holds.
    pub fn size(&self) -> usize {
        self.0.iter().product()
    }

    /// The shape of a batch of `n` samples of this shape.
    pub fn batched(&self, n: usize) -> Vec<usize> {
        let mut dims = Vec::with_capacity(self.0.len() + 1);
        dims.push(n);
        dims.extend_from_slice(&self.0);
        dims
    }

    /// Strips the leading batch axis off a full tensor shape.
    pub fn of_sample(tensor_shape: &[usize]) -> Self {
        Self(tensor_shape.iter().skip(1).copied().collect())
    }
}

impl From<&[usize]> for Shape {
    fn from(value: &[usize]) -> Self {
        Self(value.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(value: [usize; N]) -> Self {
        Self(value.to_vec())
    }
}

impl From<(usize, usize, usize)> for Shape {
    fn from((c, h, w): (usize, usize, usize)) -> Self {
        Self(vec![c, h, w])
    }
}

impl From<usize> for Shape {
    fn from(value: usize) -> Self {
        Self(vec![value])
    }
}

impl Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{d}")?;
        }
        if self.0.len() == 1 {
            f.write_str(",")?;
        }
        f.write_str(")")
    }
}
