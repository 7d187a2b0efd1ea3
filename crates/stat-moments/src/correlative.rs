//! Bivariate correlative statistics
//!
//! Learn accumulates the means and co-moments of each requested pair, Derive
//! produces the covariance matrix, both least-squares regression lines and
//! Pearson's r, Assess scores rows by squared Mahalanobis distance and the
//! two regression residuals, and Test computes the bivariate
//! Jarque-Bera-Srivastava statistic in the eigen coordinates of the
//! covariance matrix.

use crate::accumulator::CoMoments;
use stat_core::descriptor::ParamValue;
use stat_core::functor::{AssessFunctor, FunctorOutcome, RegressionFunctor};
use stat_core::math::symmetric_eigen_2x2;
use stat_core::model::{ModelPhase, StatisticalModel};
use stat_core::oracle::{chi_square_p_values, PValueOracle};
use stat_core::request::Request;
use stat_core::table::{Column, Table};
use stat_core::traits::{
    check_aggregate_input, check_same_keys, learned_tables, request_columns, skip_request,
    EngineCommon, StatisticsEngine,
};
use stat_core::{Error, Result};
use tracing::{debug, instrument, warn};

pub const NAME: &str = "correlative";
pub const PRIMARY_TABLE: &str = "Primary Statistics";
pub const DERIVED_TABLE: &str = "Derived Statistics";

/// Variance floor below which a regression is treated as degenerate
const DEGENERATE_VARIANCE: f64 = f64::EPSILON;

/// Learned statistics of one pair
#[derive(Debug, Clone, PartialEq)]
pub struct PairMoments {
    pub x: String,
    pub y: String,
    pub moments: CoMoments,
}

/// Quantities derived from a pair's co-moments
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedPair {
    pub var_x: f64,
    pub var_y: f64,
    pub covariance: f64,
    pub determinant: f64,
    pub slope_yx: f64,
    pub intercept_yx: f64,
    pub slope_xy: f64,
    pub intercept_xy: f64,
    pub pearson_r: f64,
}

/// Covariance matrix, regressions and correlation of one pair
pub fn derive_pair(m: &CoMoments) -> DerivedPair {
    let n = m.cardinality();
    let (var_x, var_y, covariance) = if n > 1 {
        let scale = 1.0 / (n as f64 - 1.0);
        (m.m2_x() * scale, m.m2_y() * scale, m.m_xy() * scale)
    } else {
        (0.0, 0.0, 0.0)
    };
    let (mean_x, mean_y) = (m.mean_x(), m.mean_y());

    let (slope_yx, intercept_yx) = if var_x < DEGENERATE_VARIANCE {
        (f64::NAN, f64::NAN)
    } else {
        let slope = covariance / var_x;
        (slope, mean_y - slope * mean_x)
    };
    let (slope_xy, intercept_xy) = if var_y < DEGENERATE_VARIANCE {
        (f64::NAN, f64::NAN)
    } else {
        let slope = covariance / var_y;
        (slope, mean_x - slope * mean_y)
    };
    let pearson_r = if var_x < DEGENERATE_VARIANCE || var_y < DEGENERATE_VARIANCE {
        f64::NAN
    } else {
        covariance / (var_x * var_y).sqrt()
    };

    DerivedPair {
        var_x,
        var_y,
        covariance,
        determinant: var_x * var_y - covariance * covariance,
        slope_yx,
        intercept_yx,
        slope_xy,
        intercept_xy,
        pearson_r,
    }
}

/// Rows of a bivariate `Primary Statistics` table
pub fn read_primary(table: &Table) -> Result<Vec<PairMoments>> {
    let xs = table.texts("Variable X")?;
    let ys = table.texts("Variable Y")?;
    let counts = table.integers("Cardinality")?;
    let mean_x = table.reals("Mean X")?;
    let mean_y = table.reals("Mean Y")?;
    let m2_x = table.reals("M2 X")?;
    let m2_y = table.reals("M2 Y")?;
    let m_xy = table.reals("M XY")?;
    (0..xs.len())
        .map(|i| {
            let n = u64::try_from(counts[i]).map_err(|_| {
                Error::inconsistent(format!("negative cardinality for ({},{})", xs[i], ys[i]))
            })?;
            Ok(PairMoments {
                x: xs[i].clone(),
                y: ys[i].clone(),
                moments: CoMoments::from_parts(n, mean_x[i], mean_y[i], m2_x[i], m2_y[i], m_xy[i]),
            })
        })
        .collect()
}

/// Build a bivariate `Primary Statistics` table
pub fn primary_table(rows: &[PairMoments]) -> Result<Table> {
    let real = |f: fn(&CoMoments) -> f64| {
        Column::Real(rows.iter().map(|r| f(&r.moments)).collect())
    };
    Table::new()
        .with_column("Variable X", Column::Text(rows.iter().map(|r| r.x.clone()).collect()))?
        .with_column("Variable Y", Column::Text(rows.iter().map(|r| r.y.clone()).collect()))?
        .with_column(
            "Cardinality",
            Column::Integer(rows.iter().map(|r| r.moments.cardinality() as i64).collect()),
        )?
        .with_column("Mean X", real(CoMoments::mean_x))?
        .with_column("Mean Y", real(CoMoments::mean_y))?
        .with_column("M2 X", real(CoMoments::m2_x))?
        .with_column("M2 Y", real(CoMoments::m2_y))?
        .with_column("M XY", real(CoMoments::m_xy))
}

fn find_pair<'a>(rows: &'a [PairMoments], x: &str, y: &str) -> Option<&'a PairMoments> {
    rows.iter().find(|r| r.x == x && r.y == y)
}

/// Srivastava skewness, kurtosis and the Jarque-Bera-Srivastava statistic
///
/// The centered data are rotated onto the eigenvectors of the covariance
/// matrix unless the covariance is already negligible relative to the
/// difference of the variances, in which case the original axes are used.
pub fn srivastava(x: &[f64], y: &[f64], mean: (f64, f64), derived: &DerivedPair) -> [f64; 3] {
    let undefined = [f64::NAN; 3];
    let m = x.len().min(y.len());
    if m == 0 {
        return undefined;
    }
    let (var_x, var_y, cov) = (derived.var_x, derived.var_y, derived.covariance);
    let (variances, axes) = if cov.abs() <= f64::EPSILON * (var_x - var_y).abs() {
        ([var_x, var_y], [[1.0, 0.0], [0.0, 1.0]])
    } else {
        let (values, vectors) = symmetric_eigen_2x2(var_x, cov, var_y);
        (
            [values[0], values[1]],
            [
                [vectors[(0, 0)], vectors[(1, 0)]],
                [vectors[(0, 1)], vectors[(1, 1)]],
            ],
        )
    };
    if variances.iter().any(|v| !(*v > 0.0)) {
        return undefined;
    }
    let sd = [variances[0].sqrt(), variances[1].sqrt()];

    let mut third = [0.0; 2];
    let mut fourth = [0.0; 2];
    for i in 0..m {
        let dx = x[i] - mean.0;
        let dy = y[i] - mean.1;
        for k in 0..2 {
            let t = (axes[k][0] * dx + axes[k][1] * dy) / sd[k];
            let t2 = t * t;
            third[k] += t2 * t;
            fourth[k] += t2 * t2;
        }
    }
    let mf = m as f64;
    let b_s = third.iter().map(|s| (s / mf) * (s / mf)).sum::<f64>() / 2.0;
    let b_k = fourth.iter().map(|s| s / mf).sum::<f64>() / 2.0;
    let jbs = mf * (b_s / 3.0 + (b_k - 3.0) * (b_k - 3.0) / 12.0);
    [b_s, b_k, jbs]
}

/// Pairwise correlation engine
#[derive(Debug, Clone, Default)]
pub struct CorrelativeStatistics {
    common: EngineCommon,
}

impl CorrelativeStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the pair `(x, y)`; `x` is the regressor of `Y/X`
    pub fn add_column_pair(&mut self, x: &str, y: &str) -> bool {
        self.common.requests.add_column_pair(x, y)
    }

    fn pair_of<'a>(&self, request: &'a Request) -> Option<(&'a str, &'a str)> {
        request_columns(NAME, 2, request).map(|c| (c[0].as_str(), c[1].as_str()))
    }
}

impl StatisticsEngine for CorrelativeStatistics {
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
        let mut rows: Vec<PairMoments> = Vec::new();
        for request in self.requests() {
            let Some((x, y)) = self.pair_of(request) else {
                continue;
            };
            if find_pair(&rows, x, y).is_some() {
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
            let mut moments = CoMoments::new();
            for r in input.live_rows(mask) {
                moments.push(xs[r], ys[r]);
            }
            debug!(x, y, n = moments.cardinality(), "learned co-moments");
            rows.push(PairMoments {
                x: x.to_string(),
                y: y.to_string(),
                moments,
            });
        }
        let mut model = StatisticalModel::new(NAME);
        model.insert(ModelPhase::Learned, PRIMARY_TABLE, primary_table(&rows)?);
        Ok(model)
    }

    #[instrument(skip_all, fields(engine = NAME))]
    fn derive(&self, model: &mut StatisticalModel) -> Result<()> {
        let rows = read_primary(model.require_learned(PRIMARY_TABLE)?)?;
        let derived: Vec<DerivedPair> = rows.iter().map(|r| derive_pair(&r.moments)).collect();
        let real = |f: fn(&DerivedPair) -> f64| Column::Real(derived.iter().map(f).collect());
        let table = Table::new()
            .with_column("Variable X", Column::Text(rows.iter().map(|r| r.x.clone()).collect()))?
            .with_column("Variable Y", Column::Text(rows.iter().map(|r| r.y.clone()).collect()))?
            .with_column("Variance X", real(|d| d.var_x))?
            .with_column("Variance Y", real(|d| d.var_y))?
            .with_column("Covariance", real(|d| d.covariance))?
            .with_column("Determinant", real(|d| d.determinant))?
            .with_column("Slope Y/X", real(|d| d.slope_yx))?
            .with_column("Intercept Y/X", real(|d| d.intercept_yx))?
            .with_column("Slope X/Y", real(|d| d.slope_xy))?
            .with_column("Intercept X/Y", real(|d| d.intercept_xy))?
            .with_column("Pearson r", real(|d| d.pearson_r))?;
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
            let (x, y) = self
                .pair_of(request)
                .ok_or_else(|| Error::InvalidParameter("request needs two columns".to_string()))?;
            // Derived values are recomputed from the learned pair; the derived
            // table must still exist so that Assess follows Derive
            model.require_derived(DERIVED_TABLE)?;
            let rows = read_primary(model.require_learned(PRIMARY_TABLE)?)?;
            let pair = find_pair(&rows, x, y)
                .ok_or_else(|| Error::missing_table(&format!("{PRIMARY_TABLE} ({x},{y})")))?;
            let d = derive_pair(&pair.moments);
            Ok(AssessFunctor::Regression(RegressionFunctor {
                x: x.to_string(),
                y: y.to_string(),
                mean_x: pair.moments.mean_x(),
                mean_y: pair.moments.mean_y(),
                var_x: d.var_x,
                var_y: d.var_y,
                covariance: d.covariance,
                slope_yx: d.slope_yx,
                intercept_yx: d.intercept_yx,
                slope_xy: d.slope_xy,
                intercept_xy: d.intercept_xy,
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
        let rows = read_primary(model.require_learned(PRIMARY_TABLE)?)?;
        let mut names = (Vec::new(), Vec::new());
        let mut stats: [Vec<f64>; 3] = Default::default();
        for request in self.requests() {
            let Some((x, y)) = self.pair_of(request) else {
                continue;
            };
            let Some(pair) = find_pair(&rows, x, y) else {
                warn!(x, y, "no learned statistics for pair, skipping test");
                continue;
            };
            let columns = input.numeric(x).and_then(|xs| Ok((xs, input.numeric(y)?)));
            let (xs, ys) = match columns {
                Ok(columns) => columns,
                Err(err) => {
                    skip_request(NAME, "test", &request.label(), err)?;
                    continue;
                }
            };
            let derived = derive_pair(&pair.moments);
            let mean = (pair.moments.mean_x(), pair.moments.mean_y());
            let values = srivastava(&xs, &ys, mean, &derived);
            names.0.push(x.to_string());
            names.1.push(y.to_string());
            for (column, v) in stats.iter_mut().zip(values) {
                column.push(v);
            }
        }
        let dof = vec![2.0; stats[2].len()];
        let p = chi_square_p_values(oracle, &stats[2], &dof);
        let [skewness, kurtosis, jbs] = stats;
        Table::new()
            .with_column("Variable X", Column::Text(names.0))?
            .with_column("Variable Y", Column::Text(names.1))?
            .with_column("Srivastava Skewness", Column::Real(skewness))?
            .with_column("Srivastava Kurtosis", Column::Real(kurtosis))?
            .with_column("Jarque-Bera-Srivastava", Column::Real(jbs))?
            .with_column("d", Column::Real(dof))?
            .with_column("P", Column::Real(p))
    }

    #[instrument(skip_all, fields(engine = NAME, models = models.len()))]
    fn aggregate(&self, models: &[StatisticalModel]) -> Result<StatisticalModel> {
        check_aggregate_input(NAME, models)?;
        let tables = learned_tables(models, PRIMARY_TABLE)?;
        check_same_keys(&tables, &["Variable X", "Variable Y"], PRIMARY_TABLE)?;

        let mut merged = read_primary(tables[0])?;
        for table in &tables[1..] {
            for (acc, row) in merged.iter_mut().zip(read_primary(table)?) {
                acc.moments = acc.moments.merge(&row.moments);
            }
        }
        let mut model = StatisticalModel::new(NAME);
        model.insert(ModelPhase::Learned, PRIMARY_TABLE, primary_table(&merged)?);
        Ok(model)
    }

    fn set_parameter(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        self.common
            .set_parameter(name, value)
            .unwrap_or_else(|| Err(Error::InvalidParameter(format!("unknown parameter {name}"))))
    }

    fn parameters(&self) -> Vec<(String, ParamValue)> {
        self.common.parameters()
    }
}
