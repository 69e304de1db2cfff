use ndarray::{Array1, Array2, ArrayD, ArrayView1, ArrayView2, ArrayViewD, Axis};
use rand::{Rng, seq::SliceRandom};

use crate::{MlErr, Result, arch::Shape};

/// One-hot encodes integer labels, `one_hot[row, label] = 1`.
///
/// # Arguments
/// * `labels` - The labels to encode.
/// * `n_col` - The amount of classes, the largest label plus one if `None`.
///
/// # Errors
/// If a label doesn't fit in `n_col` classes.
pub fn to_categorical(labels: ArrayView1<usize>, n_col: Option<usize>) -> Result<Array2<f32>> {
    let n_col = n_col.unwrap_or_else(|| labels.iter().max().map_or(0, |&max| max + 1));
    let mut one_hot = Array2::zeros((labels.len(), n_col));

    for (mut row, &label) in one_hot.rows_mut().into_iter().zip(labels.iter()) {
        let cell = row.get_mut(label).ok_or(MlErr::InvalidLabel {
            label,
            n_classes: n_col,
        })?;
        *cell = 1.;
    }

    Ok(one_hot)
}

/// The index of the largest value of every lane along `axis`, the first one on ties.
pub fn argmax(x: ArrayView2<f32>, axis: Axis) -> Array1<usize> {
    x.lanes(axis).into_iter().map(argmax_lane).collect()
}

/// The position of the first maximum of `lane`, skipping NaNs. Zero if every value is NaN.
pub fn argmax_lane(lane: ArrayView1<f32>) -> usize {
    lane.iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
            Some((_, b)) if v <= b => best,
            _ => Some((i, v)),
        })
        .map_or(0, |(i, _)| i)
}

/// The two halves of a dataset split.
#[derive(Debug, Clone)]
pub struct Split {
    pub x_train: ArrayD<f32>,
    pub x_test: ArrayD<f32>,
    pub y_train: ArrayD<f32>,
    pub y_test: ArrayD<f32>,
}

/// Splits samples and targets into a training and a test set.
///
/// The test set gets `ceil(test_size * n)` samples. Without shuffling the test set is the tail
/// of the data.
///
/// # Arguments
/// * `x` - The samples, along the leading axis.
/// * `y` - The targets, along the leading axis.
/// * `test_size` - The fraction of samples to hold out, in `(0, 1)`.
/// * `shuffle` - Whether to permute the samples before splitting.
/// * `rng` - The generator used to shuffle.
pub fn train_test_split<R>(
    x: ArrayViewD<f32>,
    y: ArrayViewD<f32>,
    test_size: f64,
    shuffle: bool,
    rng: &mut R,
) -> Result<Split>
where
    R: Rng + ?Sized,
{
    let n = x.shape().first().copied().unwrap_or(0);
    if y.shape().first() != Some(&n) {
        return Err(MlErr::SizeMismatch {
            what: "targets",
            got: y.shape().first().copied().unwrap_or(0),
            expected: n,
        });
    }

    if !(test_size > 0. && test_size < 1.) {
        return Err(MlErr::InvalidConfig(format!(
            "test_size must be in (0, 1), got {test_size}"
        )));
    }

    let n_test = (test_size * n as f64).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(MlErr::InvalidConfig(format!(
            "a test_size of {test_size} over {n} samples leaves an empty split"
        )));
    }

    let mut order: Vec<_> = (0..n).collect();
    let (train, test) = if shuffle {
        order.shuffle(rng);
        let (test, train) = order.split_at(n_test);
        (train, test)
    } else {
        order.split_at(n - n_test)
    };

    Ok(Split {
        x_train: x.select(Axis(0), train),
        x_test: x.select(Axis(0), test),
        y_train: y.select(Axis(0), train),
        y_test: y.select(Axis(0), test),
    })
}

/// Reshapes flat feature rows into samples of `shape`, `(n, 64)` into `(n, 1, 8, 8)` say.
pub fn reshape_samples(features: Array2<f32>, shape: &Shape) -> Result<ArrayD<f32>> {
    let (n, len) = features.dim();
    if len != shape.size() {
        return Err(MlErr::SizeMismatch {
            what: "sample features",
            got: len,
            expected: shape.size(),
        });
    }

    let features = if features.is_standard_layout() {
        features
    } else {
        features.as_standard_layout().into_owned()
    };

    Ok(features.into_shape_with_order(shape.batched(n))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, array};
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn one_hot_round_trips_through_argmax() {
        let labels = array![3, 0, 9, 9, 1, 4];
        let one_hot = to_categorical(labels.view(), Some(10)).unwrap();
        assert_eq!(one_hot.dim(), (6, 10));
        assert_eq!(one_hot.sum(), 6.);
        assert_eq!(argmax(one_hot.view(), Axis(1)), labels);
    }

    #[test]
    fn class_count_defaults_to_the_largest_label() {
        let one_hot = to_categorical(array![0, 2].view(), None).unwrap();
        assert_eq!(one_hot, array![[1., 0., 0.], [0., 0., 1.]]);
    }

    #[test]
    fn labels_out_of_range_are_rejected() {
        assert!(matches!(
            to_categorical(array![0, 10].view(), Some(10)),
            Err(MlErr::InvalidLabel {
                label: 10,
                n_classes: 10
            })
        ));
    }

    #[test]
    fn argmax_takes_the_first_maximum() {
        let x = array![[0.1, 0.7, 0.7], [f32::NAN, -1., -2.]];
        assert_eq!(argmax(x.view(), Axis(1)), array![1, 1]);
        assert_eq!(argmax(x.view(), Axis(0)), array![0, 0, 0]);
        assert_eq!(argmax_lane(array![f32::NAN, f32::NAN].view()), 0);
    }

    #[test]
    fn split_sizes_round_the_test_set_up() {
        let x = ArrayD::zeros(vec![1797, 64]);
        let y = ArrayD::zeros(vec![1797, 10]);
        let mut rng = StdRng::seed_from_u64(0);

        let split = train_test_split(x.view(), y.view(), 0.4, true, &mut rng).unwrap();
        assert_eq!(split.x_train.shape(), [1078, 64]);
        assert_eq!(split.x_test.shape(), [719, 64]);
        assert_eq!(split.y_train.shape(), [1078, 10]);
    }

    #[test]
    fn split_sizes_are_exact_for_decimal_fractions() {
        let x = ArrayD::zeros(vec![100, 4]);
        let y = ArrayD::zeros(vec![100, 2]);
        let mut rng = StdRng::seed_from_u64(0);

        let split = train_test_split(x.view(), y.view(), 0.3, false, &mut rng).unwrap();
        assert_eq!(split.x_test.shape(), [30, 4]);
        assert_eq!(split.x_train.shape(), [70, 4]);
    }

    #[test]
    fn unshuffled_split_holds_out_the_tail() {
        let x = Array::range(0., 10., 1.).into_shape_with_order(vec![10, 1]).unwrap();
        let mut rng = StdRng::seed_from_u64(0);

        let split = train_test_split(x.view(), x.view(), 0.3, false, &mut rng).unwrap();
        assert_eq!(split.x_test.as_slice().unwrap(), &[7., 8., 9.]);
        assert_eq!(split.x_train.len(), 7);
    }

    #[test]
    fn shuffled_split_keeps_pairs_together() {
        let x = Array::range(0., 20., 1.).into_shape_with_order(vec![20, 1]).unwrap();
        let y = x.mapv(|v| v * 2.);
        let mut rng = StdRng::seed_from_u64(5);

        let split = train_test_split(x.view(), y.view(), 0.25, true, &mut rng).unwrap();
        assert_eq!(split.x_train.mapv(|v| v * 2.), split.y_train);
        assert_eq!(split.x_test.mapv(|v| v * 2.), split.y_test);
    }

    #[test]
    fn invalid_split_fractions_fail() {
        let x = ArrayD::zeros(vec![4, 1]);
        let mut rng = StdRng::seed_from_u64(0);
        for test_size in [0., 1., -0.5, f64::NAN] {
            assert!(train_test_split(x.view(), x.view(), test_size, false, &mut rng).is_err());
        }
    }

    #[test]
    fn reshapes_flat_digits_into_images() {
        let features = Array2::zeros((5, 64));
        let images = reshape_samples(features, &Shape::from((1, 8, 8))).unwrap();
        assert_eq!(images.shape(), [5, 1, 8, 8]);

        assert!(reshape_samples(Array2::zeros((5, 63)), &Shape::from((1, 8, 8))).is_err());
    }
}
