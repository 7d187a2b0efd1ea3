mod common;

use approx::assert_relative_eq;
use common::{init_tracing, marks, weather};
use stat_engine::contingency::contingency::{JOINT_TABLE, SUMMARY_TABLE};
use stat_engine::prelude::*;

fn all_phases(engine: Box<dyn StatisticsEngine>) -> StatisticsPipeline {
    StatisticsPipeline::new(engine)
        .with_phases(PhaseFlags::all())
        .with_oracle(StatrsOracle)
}

#[test]
fn test_hdr_marks_scenario() -> anyhow::Result<()> {
    init_tracing();
    let mut engine = HdrStatistics::new();
    engine.set_sigma(1.0)?;
    engine.add_column_pair("Math", "French");
    engine.add_column_pair("French", "M3");
    let mut pipeline = all_phases(Box::new(engine));

    let empty = pipeline.update(None, None)?;
    assert!(empty.model.is_none());

    let input = marks();
    let output = pipeline.update(Some(&input), None)?;
    let model = output.model.expect("learned model");
    let estimator = HdrStatistics::new().output_table(&model)?;
    assert_eq!(estimator.column_names(), &["HDR (Math,French)".to_string()]);
    let density = estimator.reals("HDR (Math,French)")?;
    assert_eq!(density.len(), 20);
    assert!(density.iter().all(|d| *d > 0.0 && d.is_finite()));

    let assessed = output.assessed.expect("assessed table");
    assert!(assessed.has_column("HDR(Math,French)"));
    assert!(!assessed.column_names().iter().any(|c| c.contains("M3")));
    // Observations at the same point score the same as during Learn
    assert_relative_eq!(
        assessed.reals("HDR(Math,French)")?[0],
        density[0],
        max_relative = 1e-12
    );
    Ok(())
}

#[test]
fn test_quartiles_through_registry() -> anyhow::Result<()> {
    let input = Table::new().with_column("x", Column::Real((1..=9).map(f64::from).collect()))?;
    let engine = Registry::with_builtins().build("order(requests=((x)))")?;
    let mut pipeline = all_phases(engine);
    let output = pipeline.update(Some(&input), None)?;

    let model = output.model.expect("learned model");
    let cuts: Vec<f64> = model
        .derived("Quantiles")
        .expect("quantile table")
        .variants("x")?
        .iter()
        .filter_map(Datum::as_f64)
        .collect();
    assert_eq!(cuts, vec![1.0, 3.0, 5.0, 7.0, 9.0]);

    let buckets = output.assessed.expect("assessed table");
    assert_eq!(buckets.integers("Quantile(x)")?, &[1, 1, 1, 2, 2, 3, 3, 4, 4]);

    // Same sample as the model: the empirical and model CDFs agree at the cuts
    let test = output.test.expect("test table");
    assert!(test.reals("Kolmogorov-Smirnov")?[0] <= 2.0 / 9.0 + 1e-12);
    Ok(())
}

#[test]
fn test_split_learning_aggregates_to_single_pass() -> anyhow::Result<()> {
    let input = marks();
    let registry = Registry::with_builtins();
    for descriptor in [
        "descriptive(requests=((Math),(French)))",
        "correlative(requests=((Math,French)))",
        "multicorrelative(requests=((Math,French)))",
        "order(requests=((Math),(French)))",
        "contingency(requests=((Math,French)))",
    ] {
        let engine = registry.build(descriptor)?;
        let parts = [
            input.slice_rows(0, 7),
            input.slice_rows(7, 13),
            input.slice_rows(13, 20),
        ];
        let models = parts
            .iter()
            .map(|p| engine.learn(p, None))
            .collect::<stat_engine::Result<Vec<_>>>()?;

        let left = engine.aggregate(&[engine.aggregate(&models[..2])?, models[2].clone()])?;
        let right = engine.aggregate(&[models[0].clone(), engine.aggregate(&models[1..])?])?;
        let whole = engine.learn(&input, None)?;

        for name in whole.names(ModelPhase::Learned) {
            let expected = whole.learned(name).expect("table");
            for merged in [&left, &right] {
                let table = merged.learned(name).expect("aggregated table");
                assert_eq!(table.column_names(), expected.column_names(), "{descriptor} {name}");
                for (column, values) in expected.iter() {
                    match values.as_real() {
                        Some(reals) => {
                            for (a, b) in table.reals(column)?.iter().zip(reals) {
                                assert_relative_eq!(*a, *b, epsilon = 1e-9, max_relative = 1e-9);
                            }
                        }
                        None => assert_eq!(table.column(column), Some(values), "{descriptor} {name}"),
                    }
                }
            }
        }
    }
    Ok(())
}

#[test]
fn test_degenerate_inputs_do_not_fail() -> anyhow::Result<()> {
    init_tracing();
    let registry = Registry::with_builtins();
    let zero = Table::new()
        .with_column("x", Column::Real(Vec::new()))?
        .with_column("y", Column::Real(Vec::new()))?;
    let one = Table::new()
        .with_column("x", Column::Real(vec![2.0]))?
        .with_column("y", Column::Real(vec![5.0]))?;

    let names: Vec<String> = registry.names().map(String::from).collect();
    for name in names {
        for requests in ["((x,y))", "((x,nope))"] {
            let engine = registry.build(&format!("{name}(requests={requests})"))?;
            let mut pipeline = all_phases(engine);
            for input in [&zero, &one] {
                let output = pipeline.update(Some(input), None)?;
                assert!(output.model.is_some(), "{name} {requests}");
                let assessed = output.assessed.expect("assessed table");
                assert_eq!(assessed.num_rows(), input.num_rows());
                assert!(!assessed.column_names().iter().any(|c| c.contains("nope")));
            }
        }
    }
    Ok(())
}

#[test]
fn test_contingency_closure_and_independence() -> anyhow::Result<()> {
    let mut engine = ContingencyStatistics::new();
    engine.add_column_pair("Sky", "Umbrella");
    let mut pipeline = all_phases(Box::new(engine));
    let input = weather();
    let output = pipeline.update(Some(&input), None)?;
    let model = output.model.expect("learned model");

    let joint = model.derived(JOINT_TABLE).expect("joint table");
    let total: f64 = joint.reals("P")?[1..].iter().sum();
    assert_relative_eq!(total, 1.0, epsilon = 1e-12);
    assert_eq!(model.learned(SUMMARY_TABLE).expect("summary").num_rows(), 1);

    let assessed = output.assessed.expect("assessed table");
    // Rain always comes with an umbrella
    let rows: Vec<usize> = (0..input.num_rows())
        .filter(|r| input.texts("Sky").map(|s| s[*r] == "rain").unwrap_or(false))
        .collect();
    for r in rows {
        assert_relative_eq!(assessed.reals("Py|x(Sky,Umbrella)")?[r], 1.0);
    }

    let test = output.test.expect("test table");
    assert_eq!(test.integers("d")?, &[2]);
    let p = test.reals("P")?[0];
    assert!(p > 0.0 && p < 0.05, "strong association, p = {p}");
    Ok(())
}

#[test]
fn test_persisted_model_feeds_assess() -> anyhow::Result<()> {
    let input = marks();
    let registry = Registry::with_builtins();
    let mut learner = StatisticsPipeline::new(registry.build("correlative(requests=((Math,French)))")?);
    let model = learner.update(Some(&input), None)?.model.expect("learned model");

    let json = model.to_json()?;
    let restored = StatisticalModel::from_json(&json)?;
    assert_eq!(restored, model);
    let value: serde_json::Value = serde_json::from_str(&json)?;
    assert!(value.is_object());

    let mut scorer = StatisticsPipeline::new(registry.build("correlative(requests=((Math,French)))")?)
        .with_phases(PhaseFlags::ASSESS);
    let direct = {
        let mut scored = input.clone();
        learner.engine().assess(&input, &model, &mut scored)?;
        scored
    };
    let assessed = scorer
        .update(Some(&input), Some(restored))?
        .assessed
        .expect("assessed table");
    for column in ["d^2(Math,French)", "Residual Y/X(Math,French)", "Residual X/Y(Math,French)"] {
        assert_eq!(assessed.reals(column)?, direct.reals(column)?);
    }
    Ok(())
}

#[test]
fn test_descriptor_round_trip_rebuilds_engines() -> anyhow::Result<()> {
    let registry = Registry::with_builtins();
    for text in [
        "descriptive(sample_estimates=0,signed_deviations=1,requests=((Math)))",
        "order(number_of_intervals=10,quantile_definition='InverseCDFAveragedSteps')",
        "kmeans(k=2,max_iterations=5,tolerance=0.5,requests=((Math,French)))",
        "hdr(sigma=2.5,requests=((Math,French)))",
    ] {
        let engine = registry.build(text)?;
        let descriptor = engine.descriptor();
        assert_eq!(descriptor.algorithm, engine.name());
        let rebuilt = registry.build(&descriptor.to_string())?;
        assert_eq!(rebuilt.parameters(), engine.parameters(), "{text}");
    }
    let engine = registry.build("hdr(sigma=2.5)")?;
    assert!(engine
        .parameters()
        .iter()
        .any(|(name, value)| name == "smoothing_matrix"
            && value.as_real_list() == Some(vec![6.25, 0.0, 0.0, 6.25])));
    Ok(())
}
