//! Property-based tests for the moment engines
//!
//! Learning is order independent and learning on disjoint chunks followed by
//! aggregation matches a single pass over the whole table.

use approx::assert_relative_eq;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use stat_core::{Column, StatisticsEngine, Table};
use stat_moments::correlative::{self, CorrelativeStatistics};
use stat_moments::descriptive::{self, DescriptiveStatistics};
use stat_moments::Moments;
use statrs::statistics::Statistics;

fn table_of(x: &[f64], y: &[f64]) -> Table {
    Table::new()
        .with_column("x", Column::Real(x.to_vec()))
        .unwrap()
        .with_column("y", Column::Real(y.to_vec()))
        .unwrap()
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-8 * (1.0 + a.abs().max(b.abs()))
}

#[test]
fn test_variance_against_statrs() {
    let mut rng = StdRng::seed_from_u64(7);
    let normal = Normal::new(1e6, 3.0).unwrap();
    let data: Vec<f64> = (0..5_000).map(|_| normal.sample(&mut rng)).collect();

    let moments: Moments = data.iter().copied().collect();
    let n = data.len() as f64;
    assert_relative_eq!(moments.mean(), data.iter().mean(), max_relative = 1e-12);
    assert_relative_eq!(moments.m2() / (n - 1.0), data.iter().variance(), max_relative = 1e-9);
    assert_relative_eq!(moments.m2() / n, data.iter().population_variance(), max_relative = 1e-9);
}

#[test]
fn test_pearson_of_correlated_normals() {
    let mut rng = StdRng::seed_from_u64(11);
    let normal = Normal::new(0.0, 1.0).unwrap();
    let rho: f64 = 0.6;
    let mut x = Vec::new();
    let mut y = Vec::new();
    for _ in 0..20_000 {
        let a = normal.sample(&mut rng);
        let b = normal.sample(&mut rng);
        x.push(a);
        y.push(rho * a + (1.0 - rho * rho).sqrt() * b);
    }
    let mut engine = CorrelativeStatistics::new();
    engine.add_column_pair("x", "y");
    let mut model = engine.learn(&table_of(&x, &y), None).unwrap();
    engine.derive(&mut model).unwrap();
    let r = model
        .derived(correlative::DERIVED_TABLE)
        .unwrap()
        .reals("Pearson r")
        .unwrap()[0];
    assert!((r - rho).abs() < 0.03, "r = {r}");
}

proptest! {
    #[test]
    fn prop_moments_order_independent(
        data in prop::collection::vec(-1e3f64..1e3, 1..200),
        seed in any::<u64>()
    ) {
        let forward: Moments = data.iter().copied().collect();
        let mut shuffled = data.clone();
        shuffled.shuffle(&mut StdRng::seed_from_u64(seed));
        let other: Moments = shuffled.iter().copied().collect();

        prop_assert_eq!(forward.cardinality(), other.cardinality());
        prop_assert_eq!(forward.min(), other.min());
        prop_assert_eq!(forward.max(), other.max());
        prop_assert!(close(forward.mean(), other.mean()));
        prop_assert!(close(forward.m2(), other.m2()));
    }

    #[test]
    fn prop_descriptive_aggregate_matches_single_pass(
        data in prop::collection::vec(-100.0f64..100.0, 2..120),
        split in 0.0f64..1.0
    ) {
        let cut = ((data.len() as f64) * split) as usize;
        let mut engine = DescriptiveStatistics::new();
        engine.add_column("x");
        let whole = table_of(&data, &data);

        let single = engine.learn(&whole, None).unwrap();
        let parts = [
            engine.learn(&whole.slice_rows(0, cut), None).unwrap(),
            engine.learn(&whole.slice_rows(cut, data.len()), None).unwrap(),
        ];
        let merged = engine.aggregate(&parts).unwrap();

        let a = single.learned(descriptive::PRIMARY_TABLE).unwrap();
        let b = merged.learned(descriptive::PRIMARY_TABLE).unwrap();
        prop_assert_eq!(a.integers("Cardinality").unwrap(), b.integers("Cardinality").unwrap());
        prop_assert_eq!(a.reals("Minimum").unwrap(), b.reals("Minimum").unwrap());
        prop_assert_eq!(a.reals("Maximum").unwrap(), b.reals("Maximum").unwrap());
        for column in ["Mean", "M2", "M3", "M4"] {
            let (u, v) = (a.reals(column).unwrap()[0], b.reals(column).unwrap()[0]);
            prop_assert!((u - v).abs() <= 1e-6 * (1.0 + u.abs().max(v.abs())), "{column}: {u} vs {v}");
        }
    }

    #[test]
    fn prop_correlative_aggregate_is_associative(
        pairs in prop::collection::vec((-50.0f64..50.0, -50.0f64..50.0), 3..90)
    ) {
        let (x, y): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
        let table = table_of(&x, &y);
        let third = x.len() / 3;
        let mut engine = CorrelativeStatistics::new();
        engine.add_column_pair("x", "y");
        let a = engine.learn(&table.slice_rows(0, third), None).unwrap();
        let b = engine.learn(&table.slice_rows(third, 2 * third), None).unwrap();
        let c = engine.learn(&table.slice_rows(2 * third, x.len()), None).unwrap();

        let left = engine
            .aggregate(&[engine.aggregate(&[a.clone(), b.clone()]).unwrap(), c.clone()])
            .unwrap();
        let right = engine
            .aggregate(&[a, engine.aggregate(&[b, c]).unwrap()])
            .unwrap();
        let l = left.learned(correlative::PRIMARY_TABLE).unwrap();
        let r = right.learned(correlative::PRIMARY_TABLE).unwrap();
        prop_assert_eq!(l.integers("Cardinality").unwrap(), r.integers("Cardinality").unwrap());
        for column in ["Mean X", "Mean Y", "M2 X", "M2 Y", "M XY"] {
            let (u, v) = (l.reals(column).unwrap()[0], r.reals(column).unwrap()[0]);
            prop_assert!((u - v).abs() <= 1e-7 * (1.0 + u.abs().max(v.abs())), "{column}: {u} vs {v}");
        }
    }
}
