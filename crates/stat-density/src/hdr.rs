//! Kernel density estimation over variable pairs
//!
//! Learn stores the live observation pairs of every request and the smoothed
//! density at each of them. Derive and Test have nothing to do. Assess
//! evaluates the density at every input row against the stored observations.

use nalgebra::Matrix2;
use stat_core::descriptor::ParamValue;
use stat_core::functor::{AssessFunctor, DensityFunctor, FunctorOutcome};
use stat_core::math::GaussianKernel2;
use stat_core::model::{ModelPhase, StatisticalModel};
use stat_core::oracle::PValueOracle;
use stat_core::request::Request;
use stat_core::table::{Column, Table};
use stat_core::traits::{
    check_aggregate_input, learned_tables, request_columns, skip_request, EngineCommon,
    StatisticsEngine,
};
use stat_core::{Error, Result};
use tracing::{debug, instrument};

pub const NAME: &str = "hdr";
pub const ESTIMATOR_TABLE: &str = "Estimator of smoothed density";

pub fn observations_table_name(x: &str, y: &str) -> String {
    format!("Observations ({x},{y})")
}

/// Name of the estimator column of a pair, `HDR (x,y)`
pub fn density_column_name(x: &str, y: &str) -> String {
    format!("HDR ({x},{y})")
}

fn observations_table_for(density_column: &str) -> Option<String> {
    density_column
        .strip_prefix("HDR ")
        .map(|pair| format!("Observations {pair}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HdrConfig {
    pub kernel: GaussianKernel2,
}

/// Density `f(o)` at every observation `o`
pub fn smoothed_density(kernel: &GaussianKernel2, observations: &[[f64; 2]]) -> Vec<f64> {
    observations
        .iter()
        .map(|o| kernel.density(*o, observations))
        .collect()
}

fn read_observations(table: &Table) -> Result<Vec<[f64; 2]>> {
    let xs = table.reals("X")?;
    let ys = table.reals("Y")?;
    Ok(xs.iter().zip(ys).map(|(x, y)| [*x, *y]).collect())
}

fn observations_table(observations: &[[f64; 2]]) -> Result<Table> {
    Table::new()
        .with_column("X", Column::Real(observations.iter().map(|o| o[0]).collect()))?
        .with_column("Y", Column::Real(observations.iter().map(|o| o[1]).collect()))
}

/// Highest density region engine
#[derive(Debug, Clone, Default)]
pub struct HdrStatistics {
    common: EngineCommon,
    config: HdrConfig,
}

impl HdrStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&self) -> &HdrConfig {
        &self.config
    }

    pub fn add_column_pair(&mut self, x: &str, y: &str) -> bool {
        self.common.requests.add_column_pair(x, y)
    }

    /// Use `H = σ²·I`; an invalid sigma keeps the current kernel
    pub fn set_sigma(&mut self, sigma: f64) -> Result<()> {
        self.config.kernel = GaussianKernel2::isotropic(sigma)?;
        Ok(())
    }

    /// Use an explicit smoothing matrix, which must be symmetric positive definite
    pub fn set_smoothing_matrix(&mut self, smoothing: Matrix2<f64>) -> Result<()> {
        self.config.kernel = GaussianKernel2::new(smoothing)?;
        Ok(())
    }

    /// The learned estimator, one `HDR (x,y)` column per request
    pub fn output_table(&self, model: &StatisticalModel) -> Result<Table> {
        model.require_learned(ESTIMATOR_TABLE).cloned()
    }

    fn pair_of<'a>(&self, request: &'a Request) -> Option<(&'a str, &'a str)> {
        request_columns(NAME, 2, request).map(|c| (c[0].as_str(), c[1].as_str()))
    }
}

impl StatisticsEngine for HdrStatistics {
    fn name(&self) -> &'static str {
        NAME
    }

    fn max_request_arity(&self) -> usize {
        2
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
        let mut model = StatisticalModel::new(NAME);
        let mut estimator = Table::new();
        for request in self.requests() {
            let Some((x, y)) = self.pair_of(request) else {
                continue;
            };
            let column = density_column_name(x, y);
            if estimator.has_column(&column) {
                continue;
            }
            let columns = input.numeric(x).and_then(|xs| Ok((xs, input.numeric(y)?)));
            let (xs, ys) = match columns {
                Ok(columns) => columns,
                Err(err) => {
                    skip_request(NAME, "learn", &request.label(), err)?;
                    continue;
                }
            };
            let observations: Vec<[f64; 2]> =
                input.live_rows(mask).map(|r| [xs[r], ys[r]]).collect();
            let density = smoothed_density(&self.config.kernel, &observations);
            debug!(x, y, n = observations.len(), "estimated smoothed density");
            model.insert(
                ModelPhase::Learned,
                observations_table_name(x, y),
                observations_table(&observations)?,
            );
            estimator.add_column(column, Column::Real(density))?;
        }
        model.insert(ModelPhase::Learned, ESTIMATOR_TABLE, estimator);
        Ok(model)
    }

    fn derive(&self, _model: &mut StatisticalModel) -> Result<()> {
        Ok(())
    }

    fn select_functor(
        &self,
        _input: &Table,
        model: &StatisticalModel,
        request: &Request,
    ) -> FunctorOutcome {
        let build = || -> Result<AssessFunctor> {
            let (x, y) = self
                .pair_of(request)
                .ok_or_else(|| Error::InvalidParameter("request needs two columns".to_string()))?;
            let table = model.require_learned(&observations_table_name(x, y))?;
            Ok(AssessFunctor::Density(DensityFunctor {
                x: x.to_string(),
                y: y.to_string(),
                kernel: self.config.kernel,
                observations: read_observations(table)?,
            }))
        };
        build().into()
    }

    fn test(
        &self,
        _input: &Table,
        _model: &StatisticalModel,
        _oracle: Option<&dyn PValueOracle>,
    ) -> Result<Table> {
        Ok(Table::new())
    }

    #[instrument(skip_all, fields(engine = NAME, models = models.len()))]
    fn aggregate(&self, models: &[StatisticalModel]) -> Result<StatisticalModel> {
        check_aggregate_input(NAME, models)?;
        let estimators = learned_tables(models, ESTIMATOR_TABLE)?;
        let columns = estimators[0].column_names();
        if let Some(i) = estimators.iter().position(|t| t.column_names() != columns) {
            return Err(Error::inconsistent(format!(
                "{ESTIMATOR_TABLE}: model {i} holds other requests"
            )));
        }

        let mut model = StatisticalModel::new(NAME);
        let mut estimator = Table::new();
        for column in columns {
            let name = observations_table_for(column)
                .ok_or_else(|| Error::inconsistent(format!("unexpected estimator column {column}")))?;
            let mut observations = Vec::new();
            for table in learned_tables(models, &name)? {
                observations.extend(read_observations(table)?);
            }
            let density = smoothed_density(&self.config.kernel, &observations);
            model.insert(ModelPhase::Learned, name, observations_table(&observations)?);
            estimator.add_column(column.clone(), Column::Real(density))?;
        }
        model.insert(ModelPhase::Learned, ESTIMATOR_TABLE, estimator);
        Ok(model)
    }

    fn set_parameter(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        let invalid = |what: &str| Error::InvalidParameter(format!("{name} must be {what}, got {value}"));
        match name {
            "sigma" => {
                let sigma = value.as_f64().ok_or_else(|| invalid("a number"))?;
                self.set_sigma(sigma)
            }
            "smoothing_matrix" => match value.as_real_list().as_deref() {
                Some(&[a, b, c, d]) => self.set_smoothing_matrix(Matrix2::new(a, b, c, d)),
                _ => Err(invalid("four numbers in row-major order")),
            },
            other => self.common.set_parameter(other, value).unwrap_or_else(|| {
                Err(Error::InvalidParameter(format!("unknown parameter {other}")))
            }),
        }
    }

    fn parameters(&self) -> Vec<(String, ParamValue)> {
        let h = self.config.kernel.smoothing();
        let mut params = vec![(
            "smoothing_matrix".to_string(),
            ParamValue::Tuple(
                [h[(0, 0)], h[(0, 1)], h[(1, 0)], h[(1, 1)]]
                    .into_iter()
                    .map(ParamValue::Real)
                    .collect(),
            ),
        )];
        params.extend(self.common.parameters());
        params
    }
}
