//! Order statistics engine
//!
//! Learn counts every distinct value of each requested variable, whatever its
//! type. Derive reads the cumulative counts back to extract `q+1` cut points,
//! Assess buckets each row between them, and Test measures the largest gap
//! between the empirical distribution of the test data and the stepped
//! distribution the cut points describe.

use crate::histogram::{QuantileDefinition, ValueHistogram};
use stat_core::descriptor::ParamValue;
use stat_core::functor::{AssessFunctor, FunctorOutcome, QuantileFunctor};
use stat_core::model::{ModelPhase, StatisticalModel};
use stat_core::oracle::{kolmogorov_p_values, PValueOracle};
use stat_core::request::Request;
use stat_core::table::{Column, Table};
use stat_core::traits::{
    check_aggregate_input, check_same_keys, learned_tables, request_columns, skip_request,
    EngineCommon, StatisticsEngine,
};
use stat_core::value::Datum;
use stat_core::{Error, Result};
use std::cmp::Ordering;
use tracing::{debug, instrument, warn};

pub const NAME: &str = "order";
pub const SUMMARY_TABLE: &str = "Summary";
pub const QUANTILE_TABLE: &str = "Quantiles";
/// Largest accepted number of intervals; Derive writes `q+1` rows per variable
pub const MAX_INTERVALS: u64 = 100_000;

/// Learned histogram table of a variable
pub fn histogram_table_name(variable: &str) -> String {
    format!("Histogram {variable}")
}

/// Row labels of the quantile table
pub fn quantile_names(intervals: u64) -> Vec<String> {
    if intervals == 4 {
        return ["Minimum", "First Quartile", "Median", "Third Quartile", "Maximum"]
            .iter()
            .map(|s| s.to_string())
            .collect();
    }
    (0..=intervals).map(|k| format!("{k}-quantile")).collect()
}

/// Configuration for [`OrderStatistics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderConfig {
    /// Number of intervals `q`; Derive produces `q+1` cut points
    pub number_of_intervals: u64,
    pub quantile_definition: QuantileDefinition,
    /// Re-bin numeric histograms above this many distinct values; 0 disables
    ///
    /// Quantiles of a re-binned histogram are bin midpoints, so they need not
    /// be values of the sample.
    pub maximum_histogram_size: usize,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            number_of_intervals: 4,
            quantile_definition: QuantileDefinition::InverseCdf,
            maximum_histogram_size: 0,
        }
    }
}

/// Quantile engine over numeric, text and variant columns
#[derive(Debug, Clone, Default)]
pub struct OrderStatistics {
    common: EngineCommon,
    config: OrderConfig,
}

impl OrderStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&self) -> &OrderConfig {
        &self.config
    }

    pub fn add_column(&mut self, name: &str) -> bool {
        self.common.requests.add_column(name)
    }

    pub fn set_number_of_intervals(&mut self, intervals: u64) -> Result<()> {
        if !(1..=MAX_INTERVALS).contains(&intervals) {
            return Err(Error::InvalidParameter(format!(
                "number_of_intervals must lie in [1, {MAX_INTERVALS}], got {intervals}"
            )));
        }
        self.config.number_of_intervals = intervals;
        Ok(())
    }

    pub fn set_quantile_definition(&mut self, definition: QuantileDefinition) {
        self.config.quantile_definition = definition;
    }

    pub fn set_maximum_histogram_size(&mut self, size: usize) {
        self.config.maximum_histogram_size = size;
    }

    fn variable_of<'a>(&self, request: &'a Request) -> Option<&'a str> {
        request_columns(NAME, 1, request).map(|c| c[0].as_str())
    }

    fn histogram_of(input: &Table, variable: &str, rows: impl Iterator<Item = usize>) -> Result<ValueHistogram> {
        let column = input.require(variable)?;
        let mut histogram = ValueHistogram::new();
        for r in rows {
            if let Some(value) = column.get(r) {
                histogram.push(value);
            }
        }
        Ok(histogram)
    }
}

fn read_summary(table: &Table) -> Result<Vec<(String, u64)>> {
    let variables = table.texts("Variable")?;
    let counts = table.integers("Cardinality")?;
    variables
        .iter()
        .zip(counts)
        .map(|(v, c)| {
            let c = u64::try_from(*c)
                .map_err(|_| Error::inconsistent(format!("negative cardinality for {v}")))?;
            Ok((v.clone(), c))
        })
        .collect()
}

fn summary_table(rows: &[(String, u64)]) -> Result<Table> {
    Table::new()
        .with_column("Variable", Column::Text(rows.iter().map(|(v, _)| v.clone()).collect()))?
        .with_column(
            "Cardinality",
            Column::Integer(rows.iter().map(|(_, c)| *c as i64).collect()),
        )
}

/// Largest gap between the empirical CDF of `sample` and the stepped CDF
/// giving mass `1/q` to each interval `(Q[k−1], Q[k]]`
pub fn kolmogorov_smirnov(sample: &ValueHistogram, quantiles: &[Datum]) -> f64 {
    let m = sample.total();
    let q = quantiles.len().saturating_sub(1);
    if m == 0 || q == 0 {
        return f64::NAN;
    }
    let model_cdf = |x: &Datum| -> f64 {
        let reached = quantiles[1..]
            .iter()
            .filter(|cut| cut.value_cmp(x) != Ordering::Greater)
            .count();
        reached as f64 / q as f64
    };
    let mut support: Vec<&Datum> = sample.iter().map(|(v, _)| v).chain(quantiles).collect();
    support.sort();
    support.dedup();

    let mut largest: f64 = 0.0;
    for x in support {
        let empirical = sample.count_at_most(x) as f64 / m as f64;
        largest = largest.max((empirical - model_cdf(x)).abs());
    }
    largest
}

impl StatisticsEngine for OrderStatistics {
    fn name(&self) -> &'static str {
        NAME
    }

    fn max_request_arity(&self) -> usize {
        1
    }

    fn common(&self) -> &EngineCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut EngineCommon {
        &mut self.common
    }

    #[instrument(skip_all, fields(engine = NAME))]
    fn learn(&self, input: &Table, _parameters: Option<&Table>) -> Result<StatisticalModel> {
        let mask = self.ghost_skip_mask();
        let mut summary: Vec<(String, u64)> = Vec::new();
        let mut histograms = Vec::new();
        for request in self.requests() {
            let Some(variable) = self.variable_of(request) else {
                continue;
            };
            if summary.iter().any(|(v, _)| v == variable) {
                continue;
            }
            let mut histogram = match Self::histogram_of(input, variable, input.live_rows(mask)) {
                Ok(histogram) => histogram,
                Err(err) => {
                    skip_request(NAME, "learn", variable, err)?;
                    continue;
                }
            };
            if let Some(binned) = histogram.rebin(self.config.maximum_histogram_size) {
                debug!(variable, distinct = histogram.len(), bins = binned.len(), "re-binned histogram");
                histogram = binned;
            } else if self.config.maximum_histogram_size > 0
                && histogram.len() > self.config.maximum_histogram_size
            {
                warn!(variable, distinct = histogram.len(), "cannot re-bin non-numeric histogram");
            }
            debug!(variable, n = histogram.total(), distinct = histogram.len(), "learned histogram");
            summary.push((variable.to_string(), histogram.total()));
            histograms.push((histogram_table_name(variable), histogram.to_table()?));
        }

        let mut model = StatisticalModel::new(NAME);
        model.insert(ModelPhase::Learned, SUMMARY_TABLE, summary_table(&summary)?);
        for (name, table) in histograms {
            model.insert(ModelPhase::Learned, name, table);
        }
        Ok(model)
    }

    #[instrument(skip_all, fields(engine = NAME))]
    fn derive(&self, model: &mut StatisticalModel) -> Result<()> {
        let summary = read_summary(model.require_learned(SUMMARY_TABLE)?)?;
        let intervals = self.config.number_of_intervals;
        let mut table = Table::new().with_column("Quantile", Column::Text(quantile_names(intervals)))?;
        for (variable, cardinality) in &summary {
            let histogram = match model
                .require_learned(&histogram_table_name(variable))
                .and_then(ValueHistogram::from_table)
            {
                Ok(histogram) => histogram,
                Err(err) => {
                    warn!(engine = NAME, variable = %variable, error = %err, "cannot derive quantiles");
                    continue;
                }
            };
            if histogram.total() != *cardinality {
                warn!(
                    engine = NAME,
                    variable = %variable,
                    expected = cardinality,
                    actual = histogram.total(),
                    "histogram does not match the summary cardinality, skipping"
                );
                continue;
            }
            let cuts = histogram.quantiles(intervals, self.config.quantile_definition);
            table.add_column(variable.clone(), Column::Variant(cuts))?;
        }
        model.set_derived(vec![(QUANTILE_TABLE.to_string(), table)]);
        Ok(())
    }

    fn select_functor(
        &self,
        _input: &Table,
        model: &StatisticalModel,
        request: &Request,
    ) -> FunctorOutcome {
        let build = || -> Result<AssessFunctor> {
            let variable = self
                .variable_of(request)
                .ok_or_else(|| Error::InvalidParameter("empty request".to_string()))?;
            let quantiles = model.require_derived(QUANTILE_TABLE)?.variants(variable)?;
            Ok(AssessFunctor::QuantileBucket(QuantileFunctor {
                column: variable.to_string(),
                quantiles: quantiles.to_vec(),
            }))
        };
        build().into()
    }

    #[instrument(skip_all, fields(engine = NAME))]
    fn test(
        &self,
        input: &Table,
        model: &StatisticalModel,
        oracle: Option<&dyn PValueOracle>,
    ) -> Result<Table> {
        let quantiles = model.require_derived(QUANTILE_TABLE)?;
        let mut variables = Vec::new();
        let mut statistics = Vec::new();
        let mut scaled = Vec::new();
        for request in self.requests() {
            let Some(variable) = self.variable_of(request) else {
                continue;
            };
            let cuts = match quantiles.variants(variable) {
                Ok(cuts) => cuts,
                Err(err) => {
                    skip_request(NAME, "test", variable, err)?;
                    continue;
                }
            };
            let sample = match Self::histogram_of(input, variable, 0..input.num_rows()) {
                Ok(sample) => sample,
                Err(err) => {
                    skip_request(NAME, "test", variable, err)?;
                    continue;
                }
            };
            let d = kolmogorov_smirnov(&sample, cuts);
            variables.push(variable.to_string());
            statistics.push(d);
            scaled.push((sample.total() as f64).sqrt() * d);
        }
        let p = kolmogorov_p_values(oracle, &scaled);
        Table::new()
            .with_column("Variable", Column::Text(variables))?
            .with_column("Kolmogorov-Smirnov", Column::Real(statistics))?
            .with_column("P", Column::Real(p))
    }

    #[instrument(skip_all, fields(engine = NAME, models = models.len()))]
    fn aggregate(&self, models: &[StatisticalModel]) -> Result<StatisticalModel> {
        check_aggregate_input(NAME, models)?;
        let summaries = learned_tables(models, SUMMARY_TABLE)?;
        check_same_keys(&summaries, &["Variable"], SUMMARY_TABLE)?;

        let mut summary = read_summary(summaries[0])?;
        let mut model = StatisticalModel::new(NAME);
        let mut histograms = Vec::with_capacity(summary.len());
        for (variable, cardinality) in summary.iter_mut() {
            let name = histogram_table_name(variable);
            let mut merged = ValueHistogram::new();
            for table in learned_tables(models, &name)? {
                merged.merge(&ValueHistogram::from_table(table)?);
            }
            *cardinality = merged.total();
            histograms.push((name, merged.to_table()?));
        }
        model.insert(ModelPhase::Learned, SUMMARY_TABLE, summary_table(&summary)?);
        for (name, table) in histograms {
            model.insert(ModelPhase::Learned, name, table);
        }
        Ok(model)
    }

    fn set_parameter(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        let invalid = |what: &str| Error::InvalidParameter(format!("{name} must be {what}, got {value}"));
        match name {
            "number_of_intervals" => {
                let q = value
                    .as_i64()
                    .and_then(|q| u64::try_from(q).ok())
                    .ok_or_else(|| invalid("a positive integer"))?;
                self.set_number_of_intervals(q)
            }
            "quantile_definition" => {
                let definition = match value {
                    ParamValue::Integer(code) => QuantileDefinition::from_code(*code)
                        .ok_or_else(|| invalid("0 or 1"))?,
                    ParamValue::Text(text) => text.parse()?,
                    _ => return Err(invalid("a quantile definition")),
                };
                self.set_quantile_definition(definition);
                Ok(())
            }
            "maximum_histogram_size" => {
                let size = value
                    .as_i64()
                    .and_then(|s| usize::try_from(s).ok())
                    .ok_or_else(|| invalid("a non-negative integer"))?;
                self.set_maximum_histogram_size(size);
                Ok(())
            }
            other => self.common.set_parameter(other, value).unwrap_or_else(|| {
                Err(Error::InvalidParameter(format!("unknown parameter {other}")))
            }),
        }
    }

    fn parameters(&self) -> Vec<(String, ParamValue)> {
        let mut params = vec![
            (
                "number_of_intervals".to_string(),
                ParamValue::Integer(self.config.number_of_intervals as i64),
            ),
            (
                "quantile_definition".to_string(),
                ParamValue::Text(self.config.quantile_definition.to_string()),
            ),
            (
                "maximum_histogram_size".to_string(),
                ParamValue::Integer(self.config.maximum_histogram_size as i64),
            ),
        ];
        params.extend(self.common.parameters());
        params
    }
}
