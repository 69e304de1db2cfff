use std::num::NonZeroUsize;

use ndarray::ArrayD;
use rand::{Rng, seq::SliceRandom};

use super::LabeledData;

/// Iterates over a dataset in batches of a fixed size, the last one may be smaller.
#[derive(Debug, Clone)]
pub struct DataLoader<'a> {
    data: &'a LabeledData,
    order: Vec<usize>,
    batch_size: usize,
    cursor: usize,
}

impl<'a> DataLoader<'a> {
    /// Creates a `DataLoader` that visits the samples in their stored order.
    pub fn new(data: &'a LabeledData, batch_size: NonZeroUsize) -> Self {
        Self {
            data,
            order: (0..data.len()).collect(),
            batch_size: batch_size.get(),
            cursor: 0,
        }
    }

    /// Creates a `DataLoader` that visits the samples in a random order.
    pub fn shuffled<R>(data: &'a LabeledData, batch_size: NonZeroUsize, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        let mut loader = Self::new(data, batch_size);
        loader.order.shuffle(rng);
        loader
    }

    /// The amount of batches in a full pass.
    pub fn num_batches(&self) -> usize {
        self.order.len().div_ceil(self.batch_size)
    }

    #[inline]
    pub fn reset(&mut self) {
        self.cursor = 0;
    }
}

impl Iterator for DataLoader<'_> {
    type Item = (ArrayD<f32>, ArrayD<f32>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }

        let end = (self.cursor + self.batch_size).min(self.order.len());
        let batch = self.data.select(&self.order[self.cursor..end]);
        self.cursor = end;
        Some(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;
    use rand::{SeedableRng, rngs::StdRng};

    fn data(n: usize) -> LabeledData {
        let x = Array::range(0., n as f32, 1.).into_shape_with_order(vec![n, 1]).unwrap();
        let y = x.mapv(|v| v + 100.);
        LabeledData::new(x, y).unwrap()
    }

    #[test]
    fn sequential_batches_respect_the_batch_size() {
        let data = data(5);
        let mut loader = DataLoader::new(&data, NonZeroUsize::new(2).unwrap());
        assert_eq!(loader.num_batches(), 3);

        let (x, y) = loader.next().unwrap();
        assert_eq!(x.as_slice().unwrap(), &[0., 1.]);
        assert_eq!(y.as_slice().unwrap(), &[100., 101.]);

        loader.next().unwrap();
        let (x, _) = loader.next().unwrap();
        assert_eq!(x.as_slice().unwrap(), &[4.]);
        assert!(loader.next().is_none());

        loader.reset();
        assert_eq!(loader.count(), 3);
    }

    #[test]
    fn shuffled_batches_visit_every_sample_once() {
        let data = data(10);
        let loader = DataLoader::shuffled(
            &data,
            NonZeroUsize::new(3).unwrap(),
            &mut StdRng::seed_from_u64(9),
        );

        let mut seen: Vec<f32> = loader
            .flat_map(|(x, y)| {
                assert_eq!(&x + 100., y);
                x.into_iter().collect::<Vec<_>>()
            })
            .collect();
        seen.sort_by(f32::total_cmp);

        assert_eq!(seen, (0..10).map(|v| v as f32).collect::<Vec<_>>());
    }
}
