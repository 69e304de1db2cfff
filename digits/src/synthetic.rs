use log::debug;
use machine_learning::{
    Result,
    dataset::{DatasetProvider, RawDataset},
};
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng, rngs::StdRng};

const SIDE: usize = 8;
const MAX_INTENSITY: f32 = 16.;

#[rustfmt::skip]
const GLYPHS: [[&str; SIDE]; 10] = [
    ["..####..", ".##..##.", ".##..##.", ".##..##.", ".##..##.", ".##..##.", "..####..", "........"],
    ["...##...", "..###...", "...##...", "...##...", "...##...", "...##...", "..####..", "........"],
    ["..####..", ".##..##.", ".....##.", "....##..", "...##...", "..##....", ".######.", "........"],
    ["..####..", ".##..##.", ".....##.", "...###..", ".....##.", ".##..##.", "..####..", "........"],
    ["....##..", "...###..", "..#.##..", ".#..##..", ".######.", "....##..", "....##..", "........"],
    [".######.", ".##.....", ".#####..", ".....##.", ".....##.", ".##..##.", "..####..", "........"],
    ["..####..", ".##.....", ".#####..", ".##..##.", ".##..##.", ".##..##.", "..####..", "........"],
    [".######.", ".....##.", "....##..", "...##...", "...##...", "..##....", "..##....", "........"],
    ["..####..", ".##..##.", ".##..##.", "..####..", ".##..##.", ".##..##.", "..####..", "........"],
    ["..####..", ".##..##.", ".##..##.", "..#####.", ".....##.", "....##..", "..###...", "........"],
];

/// Generates 8x8 grey-scale digits, intensities in `0..=16`, from fixed glyphs.
///
/// Every sample is its glyph moved by at most one pixel in each direction, with jittered
/// stroke intensities and faint background noise. The same seed always yields the same
/// dataset.
#[derive(Debug, Clone)]
pub struct SyntheticDigits {
    samples: usize,
    seed: u64,
}

impl SyntheticDigits {
    pub fn new(samples: usize, seed: u64) -> Self {
        Self { samples, seed }
    }

    fn draw(label: usize, rng: &mut StdRng) -> [f32; SIDE * SIDE] {
        let (dy, dx) = (
            rng.random_range(-1i32..=1) as isize,
            rng.random_range(-1i32..=1) as isize,
        );
        let mut pixels = [0.; SIDE * SIDE];

        for (i, row) in GLYPHS[label].iter().enumerate() {
            for (j, cell) in row.bytes().enumerate() {
                let (y, x) = (i as isize + dy, j as isize + dx);
                if !(0..SIDE as isize).contains(&y) || !(0..SIDE as isize).contains(&x) {
                    continue;
                }

                let value = if cell == b'#' {
                    rng.random_range(9..=16) as f32
                } else if rng.random_bool(0.1) {
                    rng.random_range(1..=4) as f32
                } else {
                    0.
                };
                pixels[y as usize * SIDE + x as usize] = value.min(MAX_INTENSITY);
            }
        }

        pixels
    }
}

impl DatasetProvider for SyntheticDigits {
    fn load(&self) -> Result<RawDataset> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut features = Array2::zeros((self.samples, SIDE * SIDE));
        let labels = Array1::from_iter((0..self.samples).map(|i| i % GLYPHS.len()));

        for (mut row, &label) in features.rows_mut().into_iter().zip(labels.iter()) {
            let pixels = Self::draw(label, &mut rng);
            row.iter_mut()
                .zip(pixels)
                .for_each(|(dst, src)| *dst = src);
        }

        debug!(samples = self.samples, seed = self.seed; "generated synthetic digits");
        Ok(RawDataset { features, labels })
    }
}
