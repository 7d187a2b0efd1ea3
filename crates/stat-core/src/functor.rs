//! Per-request assess functors
//!
//! An [`AssessFunctor`] captures the few model values needed to score one row
//! of one request, so that Assess is a single read-only pass over the input.
//! Engines build them from a derived model; construction that cannot find the
//! required fields yields [`FunctorOutcome::NoFunctor`] instead.

use crate::error::Result;
use crate::math::{mahalanobis_squared, GaussianKernel2};
use crate::table::{Column, Table};
use crate::value::{Datum, ValueKind};
use nalgebra::{DMatrix, DVector};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Result of trying to build a functor for a request
#[derive(Debug, Clone)]
pub enum FunctorOutcome {
    Built(AssessFunctor),
    NoFunctor(String),
}

impl FunctorOutcome {
    pub fn missing(reason: impl Into<String>) -> Self {
        FunctorOutcome::NoFunctor(reason.into())
    }
}

impl From<Result<AssessFunctor>> for FunctorOutcome {
    fn from(result: Result<AssessFunctor>) -> Self {
        match result {
            Ok(functor) => FunctorOutcome::Built(functor),
            Err(err) => FunctorOutcome::NoFunctor(err.to_string()),
        }
    }
}

/// Relative deviation from a univariate mean
#[derive(Debug, Clone, PartialEq)]
pub struct DeviationFunctor {
    pub column: String,
    pub mean: f64,
    pub std_dev: f64,
    pub signed: bool,
}

impl DeviationFunctor {
    pub fn score(&self, x: f64) -> f64 {
        if !(self.std_dev > 0.0) {
            return f64::NAN;
        }
        let d = (x - self.mean) / self.std_dev;
        if self.signed {
            d
        } else {
            d.abs()
        }
    }
}

/// Bivariate Mahalanobis distance and the residuals of both regressions
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionFunctor {
    pub x: String,
    pub y: String,
    pub mean_x: f64,
    pub mean_y: f64,
    pub var_x: f64,
    pub var_y: f64,
    pub covariance: f64,
    pub slope_yx: f64,
    pub intercept_yx: f64,
    pub slope_xy: f64,
    pub intercept_xy: f64,
}

impl RegressionFunctor {
    /// `[d², residual of Y on X, residual of X on Y]`
    pub fn score(&self, x: f64, y: f64) -> [f64; 3] {
        let dx = x - self.mean_x;
        let dy = y - self.mean_y;
        let det = self.var_x * self.var_y - self.covariance * self.covariance;
        let d2 = if det > f64::EPSILON {
            (self.var_y * dx * dx - 2.0 * self.covariance * dx * dy + self.var_x * dy * dy) / det
        } else {
            f64::NAN
        };
        [
            d2,
            y - (self.slope_yx * x + self.intercept_yx),
            x - (self.slope_xy * y + self.intercept_xy),
        ]
    }
}

/// Squared Mahalanobis distance through the inverse Cholesky factor
#[derive(Debug, Clone, PartialEq)]
pub struct MahalanobisFunctor {
    pub columns: Vec<String>,
    pub mean: DVector<f64>,
    pub inverse_factor: DMatrix<f64>,
}

/// Probabilities of one contingency cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellProbabilities {
    pub joint: f64,
    pub y_given_x: f64,
    pub x_given_y: f64,
    pub pmi: f64,
}

impl CellProbabilities {
    /// Values reported for a cell never seen during Learn
    pub const UNSEEN: CellProbabilities = CellProbabilities {
        joint: 0.0,
        y_given_x: 0.0,
        x_given_y: 0.0,
        pmi: f64::NAN,
    };
}

/// Joint, conditional and pointwise-mutual-information lookup
#[derive(Debug, Clone, PartialEq)]
pub struct ContingencyFunctor {
    pub x: String,
    pub y: String,
    pub kind_x: ValueKind,
    pub kind_y: ValueKind,
    pub cells: BTreeMap<(Datum, Datum), CellProbabilities>,
}

impl ContingencyFunctor {
    pub fn lookup(&self, x: &Datum, y: &Datum) -> CellProbabilities {
        let key = (x.coerce(self.kind_x), y.coerce(self.kind_y));
        self.cells
            .get(&key)
            .copied()
            .unwrap_or(CellProbabilities::UNSEEN)
    }
}

/// Quantile bucket index against `q+1` ordered cut points
#[derive(Debug, Clone, PartialEq)]
pub struct QuantileFunctor {
    pub column: String,
    pub quantiles: Vec<Datum>,
}

impl QuantileFunctor {
    /// Bucket of `value`: 0 below the minimum, 1 at the minimum, `k` for
    /// `(Q[k−1], Q[k]]`, and `q+1` above the maximum
    pub fn bucket(&self, value: &Datum) -> i64 {
        let q = &self.quantiles;
        let Some(min) = q.first() else {
            return -1;
        };
        match value.value_cmp(min) {
            Ordering::Less => 0,
            Ordering::Equal => 1,
            Ordering::Greater => q
                .iter()
                .skip(1)
                .position(|cut| value.value_cmp(cut) != Ordering::Greater)
                .map_or(q.len() as i64, |k| k as i64 + 1),
        }
    }
}

/// Kernel density at a point given the learned observations
#[derive(Debug, Clone, PartialEq)]
pub struct DensityFunctor {
    pub x: String,
    pub y: String,
    pub kernel: GaussianKernel2,
    pub observations: Vec<[f64; 2]>,
}

/// Cluster centres of one KMeans run
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterRun {
    pub run_id: i64,
    pub centers: Vec<Vec<f64>>,
}

impl ClusterRun {
    /// Euclidean distance to, and index of, the closest centre
    pub fn closest(&self, point: &[f64]) -> (f64, i64) {
        let mut best = (f64::INFINITY, -1);
        for (id, center) in self.centers.iter().enumerate() {
            let d2: f64 = center.iter().zip(point).map(|(c, p)| (c - p) * (c - p)).sum();
            if d2 < best.0 {
                best = (d2, id as i64);
            }
        }
        if best.1 < 0 {
            (f64::NAN, -1)
        } else {
            (best.0.sqrt(), best.1)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KMeansFunctor {
    pub columns: Vec<String>,
    pub runs: Vec<ClusterRun>,
}

/// Closed set of scoring functors
#[derive(Debug, Clone, PartialEq)]
pub enum AssessFunctor {
    Deviation(DeviationFunctor),
    Regression(RegressionFunctor),
    Mahalanobis(MahalanobisFunctor),
    Contingency(ContingencyFunctor),
    QuantileBucket(QuantileFunctor),
    Density(DensityFunctor),
    KMeans(KMeansFunctor),
}

impl AssessFunctor {
    /// Input columns the functor reads, in output-naming order
    pub fn columns(&self) -> Vec<String> {
        match self {
            AssessFunctor::Deviation(f) => vec![f.column.clone()],
            AssessFunctor::Regression(f) => vec![f.x.clone(), f.y.clone()],
            AssessFunctor::Mahalanobis(f) => f.columns.clone(),
            AssessFunctor::Contingency(f) => vec![f.x.clone(), f.y.clone()],
            AssessFunctor::QuantileBucket(f) => vec![f.column.clone()],
            AssessFunctor::Density(f) => vec![f.x.clone(), f.y.clone()],
            AssessFunctor::KMeans(f) => f.columns.clone(),
        }
    }

    /// Default metric names, one per output column
    pub fn metric_names(&self) -> Vec<String> {
        match self {
            AssessFunctor::Deviation(_) => vec!["d".to_string()],
            AssessFunctor::Regression(_) => vec![
                "d^2".to_string(),
                "Residual Y/X".to_string(),
                "Residual X/Y".to_string(),
            ],
            AssessFunctor::Mahalanobis(_) => vec!["d^2".to_string()],
            AssessFunctor::Contingency(_) => vec![
                "P".to_string(),
                "Py|x".to_string(),
                "Px|y".to_string(),
                "PMI".to_string(),
            ],
            AssessFunctor::QuantileBucket(_) => vec!["Quantile".to_string()],
            AssessFunctor::Density(_) => vec!["HDR".to_string()],
            AssessFunctor::KMeans(f) => f
                .runs
                .iter()
                .flat_map(|r| [format!("Distance{}", r.run_id), format!("ClosestId{}", r.run_id)])
                .collect(),
        }
    }

    /// Score every row of `input`, one output column per metric
    ///
    /// Ghost rows are scored like any other row.
    pub fn apply(&self, input: &Table) -> Result<Vec<Column>> {
        let rows = input.num_rows();
        match self {
            AssessFunctor::Deviation(f) => {
                let x = input.numeric(&f.column)?;
                Ok(vec![Column::Real(x.iter().map(|v| f.score(*v)).collect())])
            }
            AssessFunctor::Regression(f) => {
                let x = input.numeric(&f.x)?;
                let y = input.numeric(&f.y)?;
                let mut out = [
                    Vec::with_capacity(rows),
                    Vec::with_capacity(rows),
                    Vec::with_capacity(rows),
                ];
                for (xv, yv) in x.iter().zip(y.iter()) {
                    let scores = f.score(*xv, *yv);
                    for (o, s) in out.iter_mut().zip(scores) {
                        o.push(s);
                    }
                }
                Ok(out.into_iter().map(Column::Real).collect())
            }
            AssessFunctor::Mahalanobis(f) => {
                let data = f
                    .columns
                    .iter()
                    .map(|c| input.numeric(c))
                    .collect::<Result<Vec<_>>>()?;
                let mut centered = DVector::<f64>::zeros(f.columns.len());
                let scores = (0..rows)
                    .map(|r| {
                        for (i, column) in data.iter().enumerate() {
                            centered[i] = column[r] - f.mean[i];
                        }
                        mahalanobis_squared(&f.inverse_factor, &centered)
                    })
                    .collect();
                Ok(vec![Column::Real(scores)])
            }
            AssessFunctor::Contingency(f) => {
                let x = input.require(&f.x)?;
                let y = input.require(&f.y)?;
                let mut out = [
                    Vec::with_capacity(rows),
                    Vec::with_capacity(rows),
                    Vec::with_capacity(rows),
                    Vec::with_capacity(rows),
                ];
                for r in 0..rows {
                    let cell = match (x.get(r), y.get(r)) {
                        (Some(xv), Some(yv)) => f.lookup(&xv, &yv),
                        _ => CellProbabilities::UNSEEN,
                    };
                    out[0].push(cell.joint);
                    out[1].push(cell.y_given_x);
                    out[2].push(cell.x_given_y);
                    out[3].push(cell.pmi);
                }
                Ok(out.into_iter().map(Column::Real).collect())
            }
            AssessFunctor::QuantileBucket(f) => {
                let x = input.require(&f.column)?;
                let buckets = (0..rows)
                    .map(|r| x.get(r).map_or(-1, |v| f.bucket(&v)))
                    .collect();
                Ok(vec![Column::Integer(buckets)])
            }
            AssessFunctor::Density(f) => {
                let x = input.numeric(&f.x)?;
                let y = input.numeric(&f.y)?;
                let density = x
                    .iter()
                    .zip(y.iter())
                    .map(|(xv, yv)| f.kernel.density([*xv, *yv], &f.observations))
                    .collect();
                Ok(vec![Column::Real(density)])
            }
            AssessFunctor::KMeans(f) => {
                let data = f
                    .columns
                    .iter()
                    .map(|c| input.numeric(c))
                    .collect::<Result<Vec<_>>>()?;
                let mut out = Vec::with_capacity(2 * f.runs.len());
                let mut point = vec![0.0; data.len()];
                for run in &f.runs {
                    let mut distances = Vec::with_capacity(rows);
                    let mut ids = Vec::with_capacity(rows);
                    for r in 0..rows {
                        for (p, column) in point.iter_mut().zip(&data) {
                            *p = column[r];
                        }
                        let (d, id) = run.closest(&point);
                        distances.push(d);
                        ids.push(id);
                    }
                    out.push(Column::Real(distances));
                    out.push(Column::Integer(ids));
                }
                Ok(out)
            }
        }
    }
}

/// Output column name `<Metric>(<col1>,...,<colK>)`
pub fn assess_column_name(metric: &str, columns: &[String]) -> String {
    format!("{metric}({})", columns.join(","))
}
