//! Quantile properties over random integer and real columns

use proptest::prelude::*;
use stat_core::{Column, Datum, StatisticsEngine, Table};
use stat_order::order::QUANTILE_TABLE;
use stat_order::{OrderStatistics, QuantileDefinition, ValueHistogram};

fn definition(averaged: bool) -> QuantileDefinition {
    if averaged {
        QuantileDefinition::InverseCdfAveragedSteps
    } else {
        QuantileDefinition::InverseCdf
    }
}

proptest! {
    #[test]
    fn prop_boundary_law(
        data in prop::collection::vec(-1e6f64..1e6, 1..300),
        intervals in 1u64..20,
        averaged in any::<bool>()
    ) {
        let mut engine = OrderStatistics::new();
        engine.add_column("x");
        engine.set_number_of_intervals(intervals).unwrap();
        engine.set_quantile_definition(definition(averaged));
        let table = Table::new().with_column("x", Column::Real(data.clone())).unwrap();
        let mut model = engine.learn(&table, None).unwrap();
        engine.derive(&mut model).unwrap();

        let cuts = model.derived(QUANTILE_TABLE).unwrap().variants("x").unwrap();
        let min = data.iter().copied().fold(f64::INFINITY, f64::min);
        let max = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        prop_assert_eq!(cuts.len() as u64, intervals + 1);
        prop_assert_eq!(cuts[0].as_f64(), Some(min));
        prop_assert_eq!(cuts[intervals as usize].as_f64(), Some(max));
    }

    #[test]
    fn prop_cut_points_are_sorted(
        data in prop::collection::vec(-50i64..50, 1..200),
        intervals in 1u64..12,
        averaged in any::<bool>()
    ) {
        let histogram: ValueHistogram = data.iter().copied().map(Datum::Integer).collect();
        let cuts = histogram.quantiles(intervals, definition(averaged));
        for pair in cuts.windows(2) {
            prop_assert!(pair[0].as_f64() <= pair[1].as_f64());
        }
    }

    #[test]
    fn prop_buckets_stay_in_range(
        data in prop::collection::vec(-20i64..20, 1..100),
        probes in prop::collection::vec(-30i64..30, 1..50)
    ) {
        let mut engine = OrderStatistics::new();
        engine.add_column("x");
        let table = Table::new().with_column("x", Column::Integer(data)).unwrap();
        let mut model = engine.learn(&table, None).unwrap();
        engine.derive(&mut model).unwrap();

        let probe_table = Table::new().with_column("x", Column::Integer(probes)).unwrap();
        let mut output = Table::new();
        engine.assess(&probe_table, &model, &mut output).unwrap();
        for bucket in output.integers("Quantile(x)").unwrap() {
            prop_assert!((0..=5).contains(bucket));
        }
    }
}
