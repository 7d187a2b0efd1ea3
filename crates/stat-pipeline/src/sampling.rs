//! Training subsets drawn by reservoir sampling

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stat_core::table::Table;
use std::borrow::Cow;
use tracing::debug;

/// Smallest training set used whenever the input is at least this large
pub const MINIMUM_TRAINING_ROWS: usize = 100;

/// `min(n, max(⌊n·fraction⌋, 100))`
pub fn observations_for_training(n: usize, fraction: f64) -> usize {
    let scaled = (n as f64 * fraction).floor() as usize;
    n.min(scaled.max(MINIMUM_TRAINING_ROWS))
}

/// Uniform sample of `k` items of `rows`, returned in input order
pub fn reservoir_sample<I, R>(rows: I, k: usize, rng: &mut R) -> Vec<usize>
where
    I: IntoIterator<Item = usize>,
    R: Rng + ?Sized,
{
    let mut reservoir = Vec::with_capacity(k);
    for (seen, row) in rows.into_iter().enumerate() {
        if seen < k {
            reservoir.push(row);
        } else {
            let j = rng.gen_range(0..=seen);
            if j < k {
                reservoir[j] = row;
            }
        }
    }
    reservoir.sort_unstable();
    reservoir
}

/// The live rows Learn should see for `fraction`
///
/// Borrows the input when every live row is kept.
pub fn training_subset(input: &Table, skip_mask: u8, fraction: f64, seed: u64) -> Cow<'_, Table> {
    let live = input.live_rows(skip_mask).count();
    let wanted = observations_for_training(live, fraction);
    if wanted >= live {
        return Cow::Borrowed(input);
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let rows = reservoir_sample(input.live_rows(skip_mask), wanted, &mut rng);
    debug!(live, wanted, "sampled training rows");
    Cow::Owned(input.select_rows(&rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stat_core::table::Column;

    #[test]
    fn test_observations_for_training() {
        assert_eq!(observations_for_training(50, 0.1), 50);
        assert_eq!(observations_for_training(500, 0.1), 100);
        assert_eq!(observations_for_training(5000, 0.1), 500);
        assert_eq!(observations_for_training(5000, 1.0), 5000);
    }

    #[test]
    fn test_reservoir_is_sorted_and_distinct() {
        let mut rng = StdRng::seed_from_u64(3);
        let sample = reservoir_sample(0..1000, 50, &mut rng);
        assert_eq!(sample.len(), 50);
        assert!(sample.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(reservoir_sample(0..10, 20, &mut rng), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_training_subset_skips_ghosts() {
        let mut table = Table::new()
            .with_column("x", Column::Integer((0..1000).collect()))
            .unwrap();
        table
            .set_ghosts((0..1000).map(|i| u8::from(i % 2 == 1)).collect())
            .unwrap();
        let subset = training_subset(&table, 0xff, 0.1, 9);
        assert_eq!(subset.num_rows(), 100);
        assert!(subset.integers("x").unwrap().iter().all(|v| v % 2 == 0));

        let same_seed = training_subset(&table, 0xff, 0.1, 9);
        assert_eq!(subset.integers("x").unwrap(), same_seed.integers("x").unwrap());
        assert!(matches!(training_subset(&table, 0xff, 1.0, 9), Cow::Borrowed(_)));
    }
}
