use approx::assert_relative_eq;
use proptest::prelude::*;
use stat_cluster::kmeans::read_runs;
use stat_cluster::KMeansStatistics;
use stat_contingency::{ContingencyModel, ContingencyStatistics};
use stat_core::table::{Column, Table};
use stat_moments::multicorrelative::SPARSE_TABLE;
use stat_moments::{CorrelativeStatistics, DescriptiveStatistics, MultiCorrelativeStatistics};
use stat_pipeline::StatisticsPipeline;

fn two_columns(x: Vec<i64>, y: Vec<f64>) -> Table {
    Table::new()
        .with_column("x", Column::Integer(x))
        .unwrap()
        .with_column("y", Column::Real(y))
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_chunked_moments_match_single_pass(
        rows in prop::collection::vec((-50i64..50, -1e3f64..1e3), 2..300),
        chunk_rows in 1usize..64,
    ) {
        let (x, y): (Vec<i64>, Vec<f64>) = rows.into_iter().unzip();
        let input = two_columns(x, y);

        let mut engine = CorrelativeStatistics::new();
        engine.add_column_pair("x", "y");
        let mut pipeline = StatisticsPipeline::new(Box::new(engine));
        let chunked = pipeline.learn_chunked(&input, chunk_rows).unwrap();
        let whole = pipeline.update(Some(&input), None).unwrap().model.unwrap();

        let a = chunked.learned("Primary Statistics").unwrap();
        let b = whole.learned("Primary Statistics").unwrap();
        prop_assert_eq!(a.integers("Cardinality").unwrap(), b.integers("Cardinality").unwrap());
        let scale = 1.0 + b.reals("M2 X").unwrap()[0] + b.reals("M2 Y").unwrap()[0];
        for column in ["Mean X", "Mean Y", "M2 X", "M2 Y", "M XY"] {
            let (u, v) = (a.reals(column).unwrap()[0], b.reals(column).unwrap()[0]);
            prop_assert!((u - v).abs() <= 1e-9 * scale, "{column}: {u} vs {v}");
        }
    }

    #[test]
    fn prop_chunked_counts_match_single_pass(
        rows in prop::collection::vec((0i64..4, 0i64..3), 1..200),
        chunk_rows in 1usize..50,
    ) {
        let (x, y): (Vec<i64>, Vec<i64>) = rows.into_iter().unzip();
        let input = Table::new()
            .with_column("x", Column::Integer(x))
            .unwrap()
            .with_column("y", Column::Integer(y))
            .unwrap();

        let mut engine = ContingencyStatistics::new();
        engine.add_column_pair("x", "y");
        let mut pipeline = StatisticsPipeline::new(Box::new(engine));
        let chunked = pipeline.learn_chunked(&input, chunk_rows).unwrap();
        let whole = pipeline.update(Some(&input), None).unwrap().model.unwrap();

        let a = ContingencyModel::from_model(&chunked).unwrap();
        let b = ContingencyModel::from_model(&whole).unwrap();
        prop_assert_eq!(&a, &b);
        prop_assert!(a.check_cardinalities().is_ok());
    }
}

#[test]
fn test_chunked_learn_of_empty_table() {
    let mut engine = DescriptiveStatistics::new();
    engine.add_column("x");
    let mut pipeline = StatisticsPipeline::new(Box::new(engine));
    let model = pipeline
        .learn_chunked(&two_columns(Vec::new(), Vec::new()), 10)
        .unwrap();
    let primary = model.learned("Primary Statistics").unwrap();
    assert_eq!(primary.integers("Cardinality").unwrap(), &[0]);
    assert!(model.derived("Derived Statistics").unwrap().reals("Variance").unwrap()[0].is_nan());
}

#[test]
fn test_chunk_larger_than_input() {
    let input = two_columns((0..10).collect(), (0..10).map(f64::from).collect());
    let mut engine = DescriptiveStatistics::new();
    engine.add_column("y");
    let mut pipeline = StatisticsPipeline::new(Box::new(engine));
    let model = pipeline.learn_chunked(&input, 1000).unwrap();
    let primary = model.learned("Primary Statistics").unwrap();
    assert_relative_eq!(primary.reals("Mean").unwrap()[0], 4.5);
}

fn first_chunk_ghosted() -> Table {
    let mut input = Table::new()
        .with_column("a", Column::Real(vec![9.0, 9.0, 9.0, 9.0, 1.0, 2.0, 4.0, 3.0]))
        .unwrap()
        .with_column("b", Column::Real(vec![9.0, 9.0, 9.0, 9.0, 2.0, 1.0, 3.0, 5.0]))
        .unwrap();
    input.set_ghosts(vec![1, 1, 1, 1, 0, 0, 0, 0]).unwrap();
    input
}

#[test]
fn test_chunked_covariance_ignores_ghosted_chunk() {
    let input = first_chunk_ghosted();
    let mut engine = MultiCorrelativeStatistics::new();
    engine.add_request(["a", "b"]);
    let mut pipeline = StatisticsPipeline::new(Box::new(engine));
    let chunked = pipeline.learn_chunked(&input, 4).unwrap();
    let whole = pipeline.update(Some(&input), None).unwrap().model.unwrap();

    let a = chunked.learned(SPARSE_TABLE).unwrap();
    let b = whole.learned(SPARSE_TABLE).unwrap();
    assert_eq!(a.integers("Cardinality").unwrap(), b.integers("Cardinality").unwrap());
    assert_eq!(a.reals("Entries").unwrap()[0], 4.0);
    for (u, v) in a.reals("Entries").unwrap().iter().zip(b.reals("Entries").unwrap()) {
        assert!(u.is_finite());
        assert_relative_eq!(*u, *v, epsilon = 1e-12);
    }
    assert!(chunked.derived("Cov(a,b)").is_some());
}

#[test]
fn test_chunked_kmeans_with_ghosted_chunk() {
    let input = first_chunk_ghosted();
    let mut engine = KMeansStatistics::new();
    engine.add_request(["a", "b"]);
    engine.set_k(2).unwrap();
    let mut pipeline = StatisticsPipeline::new(Box::new(engine));
    let model = pipeline.learn_chunked(&input, 4).unwrap();

    let runs = read_runs(model.learned("Cluster Centers(a,b)").unwrap()).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].cardinalities.iter().sum::<u64>(), 4);
    assert!(runs[0].centers.iter().flatten().all(|c| *c < 9.0));
}
