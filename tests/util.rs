#![allow(dead_code)]
use pairwise_farm::sequence::SequenceTable;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// The six nine-point series used throughout the DTW examples.
pub fn example_table() -> Arc<SequenceTable> {
    SequenceTable::new(vec![
        vec![0., 0., 1., 2., 1., 0., 1., 0., 0.],
        vec![0., 1., 2., 0., 0., 0., 0., 0., 0.],
        vec![1., 2., 0., 0., 0., 0., 0., 1., 1.],
        vec![0., 0., 1., 2., 1., 0., 1., 0., 0.],
        vec![0., 1., 2., 0., 0., 1., 0., 0., 0.],
        vec![1., 2., 0., 0., 0., 0., 0., 1., 1.],
    ])
    .into_shared()
}

/// `n` random walks of length `len`, reproducible from `seed`.
pub fn random_table(n: usize, len: usize, seed: u64) -> Arc<SequenceTable> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let series = (0..n)
        .map(|_| {
            let mut x = 0.0;
            (0..len)
                .map(|_| {
                    x += rng.r#gen::<f64>() - 0.5;
                    x
                })
                .collect()
        })
        .collect();
    SequenceTable::new(series).into_shared()
}

/// Cheap distance for tests that only care about placement.
pub fn first_point_gap(a: &[f64], b: &[f64]) -> f64 {
    (a[0] - b[0]).abs()
}

/// Table whose series `i` is the single point `i`.
pub fn ramp_table(n: usize) -> Arc<SequenceTable> {
    SequenceTable::new((0..n).map(|i| vec![i as f64]).collect()).into_shared()
}
