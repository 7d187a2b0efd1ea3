//! Univariate descriptive statistics
//!
//! Learn accumulates, per variable, the cardinality, extrema, mean and the
//! central power sums `M2..M4` in one pass. Derive turns them into variance,
//! standard deviation, skewness and excess kurtosis, using either the sample
//! (bias-corrected) or the population estimators. Assess reports the relative
//! deviation of each value and Test the Jarque-Bera normality statistic.

use crate::accumulator::Moments;
use stat_core::descriptor::ParamValue;
use stat_core::functor::{AssessFunctor, DeviationFunctor, FunctorOutcome};
use stat_core::model::{ModelPhase, StatisticalModel};
use stat_core::oracle::{chi_square_p_values, PValueOracle};
use stat_core::request::Request;
use stat_core::table::{Column, Table};
use stat_core::traits::{
    check_aggregate_input, check_same_keys, learned_tables, request_columns, skip_request,
    EngineCommon, StatisticsEngine,
};
use stat_core::{Error, Result};
use tracing::{debug, instrument};

pub const NAME: &str = "descriptive";
pub const PRIMARY_TABLE: &str = "Primary Statistics";
pub const DERIVED_TABLE: &str = "Derived Statistics";

/// Configuration for [`DescriptiveStatistics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptiveConfig {
    /// Bias-corrected (sample) estimators instead of population ones
    pub sample_estimates: bool,
    /// Report signed rather than absolute deviations in Assess
    pub signed_deviations: bool,
}

impl Default for DescriptiveConfig {
    fn default() -> Self {
        Self {
            sample_estimates: true,
            signed_deviations: false,
        }
    }
}

/// Quantities derived from one variable's moments
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedMoments {
    pub std_dev: f64,
    pub variance: f64,
    pub skewness: f64,
    pub kurtosis: f64,
    pub sum: f64,
}

/// Variance, skewness and excess kurtosis of a moment accumulator
///
/// Any zero denominator yields NaN for the affected quantity only.
pub fn derive_moments(m: &Moments, sample: bool) -> DerivedMoments {
    let count = m.cardinality();
    if count == 0 {
        return DerivedMoments {
            std_dev: f64::NAN,
            variance: f64::NAN,
            skewness: f64::NAN,
            kurtosis: f64::NAN,
            sum: f64::NAN,
        };
    }
    let n = count as f64;
    let (g1, g2) = population_shape(m);

    let variance = if sample {
        if count > 1 {
            m.m2() / (n - 1.0)
        } else {
            f64::NAN
        }
    } else {
        m.m2() / n
    };
    let variance = if variance < 0.0 { f64::NAN } else { variance };

    let (skewness, kurtosis) = if sample {
        let skewness = if count > 2 {
            g1 * (n * (n - 1.0)).sqrt() / (n - 2.0)
        } else {
            f64::NAN
        };
        let kurtosis = if count > 3 {
            ((n + 1.0) * g2 + 6.0) * (n - 1.0) / ((n - 2.0) * (n - 3.0))
        } else {
            f64::NAN
        };
        (skewness, kurtosis)
    } else {
        (g1, g2)
    };

    DerivedMoments {
        std_dev: variance.sqrt(),
        variance,
        skewness,
        kurtosis,
        sum: m.mean() * n,
    }
}

/// Population skewness `g1` and excess kurtosis `g2`
fn population_shape(m: &Moments) -> (f64, f64) {
    let n = m.cardinality() as f64;
    let m2 = m.m2();
    if m.cardinality() == 0 || !(m2 > 0.0) {
        return (f64::NAN, f64::NAN);
    }
    let g1 = n.sqrt() * m.m3() / m2.powf(1.5);
    let g2 = n * m.m4() / (m2 * m2) - 3.0;
    (g1, g2)
}

/// Jarque-Bera statistic `n/6·(g1² + g2²/4)`
pub fn jarque_bera(m: &Moments) -> f64 {
    let (g1, g2) = population_shape(m);
    m.cardinality() as f64 / 6.0 * (g1 * g1 + 0.25 * g2 * g2)
}

fn cardinality(value: i64, variable: &str) -> Result<u64> {
    u64::try_from(value)
        .map_err(|_| Error::inconsistent(format!("negative cardinality {value} for {variable}")))
}

/// Rows of a `Primary Statistics` table
pub fn read_primary(table: &Table) -> Result<Vec<(String, Moments)>> {
    let variables = table.texts("Variable")?;
    let counts = table.integers("Cardinality")?;
    let minimum = table.reals("Minimum")?;
    let maximum = table.reals("Maximum")?;
    let mean = table.reals("Mean")?;
    let m2 = table.reals("M2")?;
    let m3 = table.reals("M3")?;
    let m4 = table.reals("M4")?;
    (0..variables.len())
        .map(|i| {
            let n = cardinality(counts[i], &variables[i])?;
            Ok((
                variables[i].clone(),
                Moments::from_parts(n, minimum[i], maximum[i], mean[i], m2[i], m3[i], m4[i]),
            ))
        })
        .collect()
}

/// Build a `Primary Statistics` table
pub fn primary_table(rows: &[(String, Moments)]) -> Result<Table> {
    let real = |f: fn(&Moments) -> f64| Column::Real(rows.iter().map(|(_, m)| f(m)).collect());
    Table::new()
        .with_column("Variable", Column::Text(rows.iter().map(|(v, _)| v.clone()).collect()))?
        .with_column(
            "Cardinality",
            Column::Integer(rows.iter().map(|(_, m)| m.cardinality() as i64).collect()),
        )?
        .with_column("Minimum", real(Moments::min))?
        .with_column("Maximum", real(Moments::max))?
        .with_column("Mean", real(Moments::mean))?
        .with_column("M2", real(Moments::m2))?
        .with_column("M3", real(Moments::m3))?
        .with_column("M4", real(Moments::m4))
}

/// Univariate moments engine
#[derive(Debug, Clone, Default)]
pub struct DescriptiveStatistics {
    common: EngineCommon,
    config: DescriptiveConfig,
}

impl DescriptiveStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: DescriptiveConfig) -> Self {
        Self {
            common: EngineCommon::default(),
            config,
        }
    }

    pub fn config(&self) -> &DescriptiveConfig {
        &self.config
    }

    pub fn set_sample_estimates(&mut self, sample: bool) {
        self.config.sample_estimates = sample;
    }

    pub fn set_signed_deviations(&mut self, signed: bool) {
        self.config.signed_deviations = signed;
    }

    /// Request a single variable
    pub fn add_column(&mut self, name: &str) -> bool {
        self.common.requests.add_column(name)
    }

    fn variable_of<'a>(&self, request: &'a Request) -> Option<&'a str> {
        request_columns(NAME, 1, request).map(|c| c[0].as_str())
    }
}

fn flag(name: &str, value: &ParamValue) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| Error::InvalidParameter(format!("{name} must be a boolean, got {value}")))
}

impl StatisticsEngine for DescriptiveStatistics {
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
        let mut rows: Vec<(String, Moments)> = Vec::new();
        for request in self.requests() {
            let Some(variable) = self.variable_of(request) else {
                continue;
            };
            if rows.iter().any(|(v, _)| v == variable) {
                continue;
            }
            let values = match input.numeric(variable) {
                Ok(values) => values,
                Err(err) => {
                    skip_request(NAME, "learn", variable, err)?;
                    continue;
                }
            };
            let moments: Moments = input.live_rows(mask).map(|r| values[r]).collect();
            debug!(variable, n = moments.cardinality(), "learned moments");
            rows.push((variable.to_string(), moments));
        }

        let mut model = StatisticalModel::new(NAME);
        model.insert(ModelPhase::Learned, PRIMARY_TABLE, primary_table(&rows)?);
        Ok(model)
    }

    #[instrument(skip_all, fields(engine = NAME))]
    fn derive(&self, model: &mut StatisticalModel) -> Result<()> {
        let rows = read_primary(model.require_learned(PRIMARY_TABLE)?)?;
        let derived: Vec<DerivedMoments> = rows
            .iter()
            .map(|(_, m)| derive_moments(m, self.config.sample_estimates))
            .collect();
        let real = |f: fn(&DerivedMoments) -> f64| Column::Real(derived.iter().map(f).collect());
        let table = Table::new()
            .with_column("Variable", Column::Text(rows.iter().map(|(v, _)| v.clone()).collect()))?
            .with_column("Standard Deviation", real(|d| d.std_dev))?
            .with_column("Variance", real(|d| d.variance))?
            .with_column("Skewness", real(|d| d.skewness))?
            .with_column("Kurtosis", real(|d| d.kurtosis))?
            .with_column("Sum", real(|d| d.sum))?;
        model.set_derived(vec![(DERIVED_TABLE.to_string(), table)]);
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
            let primary = model.require_learned(PRIMARY_TABLE)?;
            let derived = model.require_derived(DERIVED_TABLE)?;
            let row = primary
                .texts("Variable")?
                .iter()
                .position(|v| v == variable)
                .ok_or_else(|| Error::missing_column(variable))?;
            let derived_row = derived
                .texts("Variable")?
                .iter()
                .position(|v| v == variable)
                .ok_or_else(|| Error::missing_column(variable))?;
            Ok(AssessFunctor::Deviation(DeviationFunctor {
                column: variable.to_string(),
                mean: primary.reals("Mean")?[row],
                std_dev: derived.reals("Standard Deviation")?[derived_row],
                signed: self.config.signed_deviations,
            }))
        };
        build().into()
    }

    #[instrument(skip_all, fields(engine = NAME))]
    fn test(
        &self,
        _input: &Table,
        model: &StatisticalModel,
        oracle: Option<&dyn PValueOracle>,
    ) -> Result<Table> {
        let rows = read_primary(model.require_learned(PRIMARY_TABLE)?)?;
        let mut variables = Vec::new();
        let mut statistics = Vec::new();
        for request in self.requests() {
            let Some(variable) = self.variable_of(request) else {
                continue;
            };
            match rows.iter().find(|(v, _)| v == variable) {
                Some((_, m)) => {
                    variables.push(variable.to_string());
                    statistics.push(jarque_bera(m));
                }
                None => skip_request(NAME, "test", variable, Error::missing_column(variable))?,
            }
        }
        let dof = vec![2.0; statistics.len()];
        let p = chi_square_p_values(oracle, &statistics, &dof);
        Table::new()
            .with_column("Variable", Column::Text(variables))?
            .with_column("Jarque-Bera", Column::Real(statistics))?
            .with_column("P", Column::Real(p))
    }

    #[instrument(skip_all, fields(engine = NAME, models = models.len()))]
    fn aggregate(&self, models: &[StatisticalModel]) -> Result<StatisticalModel> {
        check_aggregate_input(NAME, models)?;
        let tables = learned_tables(models, PRIMARY_TABLE)?;
        check_same_keys(&tables, &["Variable"], PRIMARY_TABLE)?;

        let mut merged = read_primary(tables[0])?;
        for table in &tables[1..] {
            for ((_, acc), (_, m)) in merged.iter_mut().zip(read_primary(table)?) {
                *acc = acc.merge(&m);
            }
        }
        let mut model = StatisticalModel::new(NAME);
        model.insert(ModelPhase::Learned, PRIMARY_TABLE, primary_table(&merged)?);
        Ok(model)
    }

    fn set_parameter(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "sample_estimates" => self.config.sample_estimates = flag(name, value)?,
            "signed_deviations" => self.config.signed_deviations = flag(name, value)?,
            other => {
                return self.common.set_parameter(other, value).unwrap_or_else(|| {
                    Err(Error::InvalidParameter(format!("unknown parameter {other}")))
                })
            }
        }
        Ok(())
    }

    fn parameters(&self) -> Vec<(String, ParamValue)> {
        let mut params = vec![
            (
                "sample_estimates".to_string(),
                ParamValue::Integer(i64::from(self.config.sample_estimates)),
            ),
            (
                "signed_deviations".to_string(),
                ParamValue::Integer(i64::from(self.config.signed_deviations)),
            ),
        ];
        params.extend(self.common.parameters());
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use stat_core::oracle::StatrsOracle;

    fn engine_on(columns: &[&str]) -> DescriptiveStatistics {
        let mut engine = DescriptiveStatistics::new();
        for c in columns {
            engine.add_column(c);
        }
        engine
    }

    fn input() -> Table {
        Table::new()
            .with_column("x", Column::Real(vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]))
            .unwrap()
            .with_column("s", Column::Text(vec!["a".into(); 8]))
            .unwrap()
    }

    #[test]
    fn test_learn_derive() {
        let engine = engine_on(&["x"]);
        let mut model = engine.learn(&input(), None).unwrap();
        engine.derive(&mut model).unwrap();

        let derived = model.derived(DERIVED_TABLE).unwrap();
        assert_relative_eq!(derived.reals("Variance").unwrap()[0], 32.0 / 7.0, epsilon = 1e-12);
        assert_relative_eq!(derived.reals("Sum").unwrap()[0], 40.0, epsilon = 1e-12);
        let primary = model.learned(PRIMARY_TABLE).unwrap();
        assert_eq!(primary.integers("Cardinality").unwrap(), &[8]);
        assert_eq!(primary.reals("Minimum").unwrap(), &[2.0]);
    }

    #[test]
    fn test_population_estimators() {
        let mut engine = engine_on(&["x"]);
        engine.set_parameter("sample_estimates", &ParamValue::Integer(0)).unwrap();
        let mut model = engine.learn(&input(), None).unwrap();
        engine.derive(&mut model).unwrap();
        let derived = model.derived(DERIVED_TABLE).unwrap();
        assert_relative_eq!(derived.reals("Variance").unwrap()[0], 4.0, epsilon = 1e-12);
        assert_relative_eq!(
            derived.reals("Standard Deviation").unwrap()[0],
            2.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_text_column_is_skipped() {
        let engine = engine_on(&["s", "x", "missing"]);
        let model = engine.learn(&input(), None).unwrap();
        let primary = model.learned(PRIMARY_TABLE).unwrap();
        assert_eq!(primary.texts("Variable").unwrap(), &["x"]);
    }

    #[test]
    fn test_degenerate_inputs() {
        let engine = engine_on(&["x"]);
        let empty = Table::new().with_column("x", Column::Real(vec![])).unwrap();
        let mut model = engine.learn(&empty, None).unwrap();
        engine.derive(&mut model).unwrap();
        let derived = model.derived(DERIVED_TABLE).unwrap();
        assert!(derived.reals("Variance").unwrap()[0].is_nan());

        let single = Table::new().with_column("x", Column::Real(vec![3.0])).unwrap();
        let mut model = engine.learn(&single, None).unwrap();
        engine.derive(&mut model).unwrap();
        let derived = model.derived(DERIVED_TABLE).unwrap();
        assert!(derived.reals("Variance").unwrap()[0].is_nan());
        assert!(derived.reals("Skewness").unwrap()[0].is_nan());

        let mut output = single.clone();
        assert_eq!(engine.assess(&single, &model, &mut output).unwrap(), 1);
        assert!(output.reals("d(x)").unwrap()[0].is_nan());
    }

    #[test]
    fn test_assess_deviation() {
        let mut engine = engine_on(&["x"]);
        engine.set_signed_deviations(true);
        engine.set_sample_estimates(false);
        let data = input();
        let mut model = engine.learn(&data, None).unwrap();
        engine.derive(&mut model).unwrap();
        let mut output = data.clone();
        engine.assess(&data, &model, &mut output).unwrap();
        let d = output.reals("d(x)").unwrap();
        assert_relative_eq!(d[0], -1.5, epsilon = 1e-12);
        assert_relative_eq!(d[7], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_jarque_bera() {
        let engine = engine_on(&["x"]);
        let data = input();
        let model = engine.learn(&data, None).unwrap();
        let result = engine.test(&data, &model, None).unwrap();
        assert_eq!(result.reals("P").unwrap(), &[-1.0]);

        let m: Moments = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0].into_iter().collect();
        let n: f64 = 8.0;
        let g1 = n.sqrt() * m.m3() / m.m2().powf(1.5);
        let g2 = n * m.m4() / (m.m2() * m.m2()) - 3.0;
        let expected = n / 6.0 * (g1 * g1 + g2 * g2 / 4.0);
        assert_relative_eq!(result.reals("Jarque-Bera").unwrap()[0], expected, epsilon = 1e-12);

        let result = engine.test(&data, &model, Some(&StatrsOracle)).unwrap();
        assert_relative_eq!(result.reals("P").unwrap()[0], (-expected / 2.0).exp(), epsilon = 1e-9);
    }

    #[test]
    fn test_invalid_parameter_keeps_config() {
        let mut engine = DescriptiveStatistics::new();
        assert!(engine
            .set_parameter("sample_estimates", &ParamValue::text("maybe"))
            .is_err());
        assert!(engine.config().sample_estimates);
        assert!(engine.set_parameter("bogus", &ParamValue::Integer(1)).is_err());
    }

    #[test]
    fn test_derive_without_learned_table_leaves_model() {
        let engine = DescriptiveStatistics::new();
        let mut model = StatisticalModel::new(NAME);
        let before = model.clone();
        assert!(matches!(engine.derive(&mut model), Err(Error::MissingTable(_))));
        assert_eq!(model, before);
    }
}
