//! Clustering behaviour on random data

use approx::assert_abs_diff_eq;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use stat_cluster::kmeans::read_runs;
use stat_cluster::KMeansStatistics;
use stat_core::{Column, StatisticsEngine, Table};

fn table(xs: Vec<f64>, ys: Vec<f64>) -> Table {
    Table::new()
        .with_column("x", Column::Real(xs))
        .unwrap()
        .with_column("y", Column::Real(ys))
        .unwrap()
}

#[test]
fn test_recovers_separated_blob_means() {
    let mut rng = StdRng::seed_from_u64(11);
    let noise = Normal::new(0.0, 0.5).unwrap();
    let means = [(0.0, 0.0), (20.0, 0.0), (0.0, 20.0)];
    let (mut xs, mut ys) = (Vec::new(), Vec::new());
    for _ in 0..200 {
        for (mx, my) in means {
            xs.push(mx + noise.sample(&mut rng));
            ys.push(my + noise.sample(&mut rng));
        }
    }
    let seeds = Table::new()
        .with_column("K", Column::Integer(vec![3, 3, 3]))
        .unwrap()
        .with_column("x", Column::Real(vec![1.0, 19.0, 1.0]))
        .unwrap()
        .with_column("y", Column::Real(vec![1.0, 1.0, 19.0]))
        .unwrap();

    let mut engine = KMeansStatistics::new();
    engine.add_request(["x", "y"]);
    let model = engine.learn(&table(xs, ys), Some(&seeds)).unwrap();
    let runs = read_runs(model.learned("Cluster Centers(x,y)").unwrap()).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].cardinalities, vec![200, 200, 200]);
    for (center, (mx, my)) in runs[0].centers.iter().zip(means) {
        assert_abs_diff_eq!(center[0], mx, epsilon = 0.2);
        assert_abs_diff_eq!(center[1], my, epsilon = 0.2);
    }
}

proptest! {
    #[test]
    fn prop_every_point_is_counted_once(
        points in prop::collection::vec((-50.0f64..50.0, -50.0f64..50.0), 1..80),
        k in 1usize..6,
    ) {
        let n = points.len();
        let (xs, ys): (Vec<f64>, Vec<f64>) = points.into_iter().unzip();
        let mut engine = KMeansStatistics::new();
        engine.add_request(["x", "y"]);
        engine.set_k(k).unwrap();
        let mut model = engine.learn(&table(xs, ys), None).unwrap();
        engine.derive(&mut model).unwrap();

        let runs = read_runs(model.learned("Cluster Centers(x,y)").unwrap()).unwrap();
        prop_assert_eq!(runs.len(), 1);
        let run = &runs[0];
        prop_assert!(run.k() <= k);
        prop_assert_eq!(run.cardinalities.iter().sum::<u64>(), n as u64);
        prop_assert!(run.errors.iter().all(|e| *e >= 0.0));
        prop_assert!(run.iterations >= 1 && run.iterations <= engine.config().max_iterations);
        let summary = model.derived("Run Summary(x,y)").unwrap();
        prop_assert_eq!(summary.integers("Rank").unwrap(), &[0][..]);
    }
}
