use ndarray::{ArrayD, Axis};

use crate::{MlErr, Result};

/// Samples and their targets, both with the samples along the leading axis.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledData {
    x: ArrayD<f32>,
    y: ArrayD<f32>,
}

impl LabeledData {
    /// Creates a new `LabeledData`.
    ///
    /// # Errors
    /// If `x` and `y` hold a different amount of samples or either has no axes.
    pub fn new(x: ArrayD<f32>, y: ArrayD<f32>) -> Result<Self> {
        let (Some(&nx), Some(&ny)) = (x.shape().first(), y.shape().first()) else {
            return Err(MlErr::Dataset(
                "samples and targets need a leading sample axis".into(),
            ));
        };

        if nx != ny {
            return Err(MlErr::SizeMismatch {
                what: "targets",
                got: ny,
                expected: nx,
            });
        }

        Ok(Self { x, y })
    }

    pub fn x(&self) -> &ArrayD<f32> {
        &self.x
    }

    pub fn y(&self) -> &ArrayD<f32> {
        &self.y
    }

    /// The amount of samples.
    pub fn len(&self) -> usize {
        self.x.shape()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies out the samples at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> (ArrayD<f32>, ArrayD<f32>) {
        (
            self.x.select(Axis(0), indices),
            self.y.select(Axis(0), indices),
        )
    }

    pub fn into_parts(self) -> (ArrayD<f32>, ArrayD<f32>) {
        (self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn sample_counts_must_agree() {
        let x = ArrayD::zeros(vec![3, 4]);
        assert!(LabeledData::new(x.clone(), ArrayD::zeros(vec![3, 2])).is_ok());
        assert!(matches!(
            LabeledData::new(x, ArrayD::zeros(vec![2, 2])),
            Err(MlErr::SizeMismatch { got: 2, expected: 3, .. })
        ));
    }

    #[test]
    fn select_keeps_pairs_together() {
        let data = LabeledData::new(
            array![[0.0], [1.0], [2.0]].into_dyn(),
            array![[10.0], [11.0], [12.0]].into_dyn(),
        )
        .unwrap();

        let (x, y) = data.select(&[2, 0]);
        assert_eq!(x, array![[2.0], [0.0]].into_dyn());
        assert_eq!(y, array![[12.0], [10.0]].into_dyn());
    }
}
