//! N-variate correlative statistics
//!
//! Learn keeps one sparse set of sufficient statistics for every request of
//! the run: the cardinality, the mean of each variable and the co-moment of
//! each column pair some request needs. Pairs shared between requests are
//! stored once. Derive assembles the dense covariance matrix of each request
//! and its lower Cholesky factor, and Assess turns a centered row into
//! uncorrelated coordinates through the inverse factor to get the squared
//! Mahalanobis distance.

use stat_core::descriptor::ParamValue;
use stat_core::functor::{AssessFunctor, FunctorOutcome, MahalanobisFunctor};
use stat_core::math::{cholesky_lower, invert_lower_triangular};
use stat_core::model::{ModelPhase, StatisticalModel};
use stat_core::oracle::PValueOracle;
use stat_core::request::Request;
use stat_core::table::{Column, Table};
use stat_core::traits::{
    check_aggregate_input, check_same_keys, learned_tables, request_columns, skip_request,
    EngineCommon, StatisticsEngine,
};
use stat_core::{Error, Result};
use nalgebra::{DMatrix, DVector};
use std::collections::BTreeSet;
use tracing::{debug, instrument, warn};

pub const NAME: &str = "multicorrelative";
pub const SPARSE_TABLE: &str = "Raw Sparse Covariance Matrix";
const CARDINALITY_KEY: &str = "Cardinality";

/// Name of the derived covariance table of a request
pub fn covariance_table_name(columns: &[String]) -> String {
    format!("Cov({})", columns.join(","))
}

/// Name of the derived Cholesky table of a request
pub fn cholesky_table_name(columns: &[String]) -> String {
    format!("Cholesky({})", columns.join(","))
}

fn canonical<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// In-memory form of the sparse covariance table
///
/// Row 0 holds the cardinality, then one row per variable mean with an empty
/// second key, then one row per co-moment `(a, b)` with `a ≤ b`.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseCovariance {
    keys: Vec<(String, String)>,
    entries: Vec<f64>,
    cardinalities: Vec<i64>,
}

impl SparseCovariance {
    pub fn from_table(table: &Table) -> Result<Self> {
        let first = table.texts("Column1")?;
        let second = table.texts("Column2")?;
        let entries = table.reals("Entries")?.to_vec();
        let cardinalities = table.integers("Cardinality")?.to_vec();
        let keys: Vec<(String, String)> = first.iter().cloned().zip(second.iter().cloned()).collect();
        match keys.first() {
            Some((a, b)) if a == CARDINALITY_KEY && b.is_empty() => {}
            _ => {
                return Err(Error::inconsistent(format!(
                    "{SPARSE_TABLE} does not start with the {CARDINALITY_KEY} row"
                )))
            }
        }
        Ok(Self {
            keys,
            entries,
            cardinalities,
        })
    }

    pub fn to_table(&self) -> Result<Table> {
        Table::new()
            .with_column(
                "Column1",
                Column::Text(self.keys.iter().map(|k| k.0.clone()).collect()),
            )?
            .with_column(
                "Column2",
                Column::Text(self.keys.iter().map(|k| k.1.clone()).collect()),
            )?
            .with_column("Entries", Column::Real(self.entries.clone()))?
            .with_column("Cardinality", Column::Integer(self.cardinalities.clone()))
    }

    pub fn cardinality(&self) -> i64 {
        self.cardinalities.first().copied().unwrap_or(0)
    }

    fn find(&self, a: &str, b: &str) -> Option<usize> {
        self.keys
            .iter()
            .skip(1)
            .position(|(x, y)| x == a && y == b)
            .map(|i| i + 1)
    }

    /// Mean of `variable` and the number of rows it was learned from
    pub fn mean(&self, variable: &str) -> Option<(f64, i64)> {
        self.find(variable, "")
            .map(|i| (self.entries[i], self.cardinalities[i]))
    }

    /// Co-moment of a pair in either order
    pub fn comoment(&self, a: &str, b: &str) -> Option<(f64, i64)> {
        let (a, b) = canonical(a, b);
        self.find(a, b)
            .map(|i| (self.entries[i], self.cardinalities[i]))
    }

    /// Mean vector and covariance matrix of `columns`
    ///
    /// Fails when an entry is missing or was learned over a different number
    /// of rows than the model.
    pub fn covariance(&self, columns: &[String]) -> Result<(DVector<f64>, DMatrix<f64>)> {
        let n = self.cardinality();
        let k = columns.len();
        let check = |entry: Option<(f64, i64)>, what: String| -> Result<f64> {
            match entry {
                None => Err(Error::missing_column(&what)),
                Some((_, count)) if count != n => Err(Error::inconsistent(format!(
                    "{what} was learned over {count} rows, the model over {n}"
                ))),
                Some((value, _)) => Ok(value),
            }
        };
        let mut mean = DVector::<f64>::zeros(k);
        for (i, column) in columns.iter().enumerate() {
            mean[i] = check(self.mean(column), format!("mean of {column}"))?;
        }
        let scale = if n > 1 { 1.0 / (n as f64 - 1.0) } else { f64::NAN };
        let mut cov = DMatrix::<f64>::zeros(k, k);
        for i in 0..k {
            for j in 0..=i {
                let m = check(
                    self.comoment(&columns[i], &columns[j]),
                    format!("co-moment ({},{})", columns[i], columns[j]),
                )?;
                cov[(i, j)] = m * scale;
                cov[(j, i)] = m * scale;
            }
        }
        Ok((mean, cov))
    }

    /// Pairwise merge of two models over the same keys
    ///
    /// A side learned over no rows has undefined means and is the identity.
    fn merge(&self, other: &Self) -> Self {
        if other.cardinality() == 0 {
            return self.clone();
        }
        if self.cardinality() == 0 {
            return other.clone();
        }
        let na = self.cardinality() as f64;
        let nb = other.cardinality() as f64;
        let n = na + nb;
        let delta = |variable: &str| -> f64 {
            match (self.mean(variable), other.mean(variable)) {
                (Some((a, _)), Some((b, _))) => b - a,
                _ => f64::NAN,
            }
        };
        let entries = self
            .keys
            .iter()
            .enumerate()
            .map(|(i, (a, b))| {
                let (ea, eb) = (self.entries[i], other.entries[i]);
                if i == 0 {
                    n
                } else if b.is_empty() {
                    ea + (eb - ea) * nb / n
                } else {
                    ea + eb + delta(a) * delta(b) * na * nb / n
                }
            })
            .collect();
        let cardinalities = self
            .cardinalities
            .iter()
            .zip(&other.cardinalities)
            .map(|(a, b)| a + b)
            .collect();
        Self {
            keys: self.keys.clone(),
            entries,
            cardinalities,
        }
    }
}

/// Table with a `Column` name column, a `Mean` column and one column per
/// variable holding the matrix columns
fn matrix_table(columns: &[String], mean: &DVector<f64>, matrix: &DMatrix<f64>) -> Result<Table> {
    let mut table = Table::new()
        .with_column("Column", Column::Text(columns.to_vec()))?
        .with_column("Mean", Column::Real(mean.iter().copied().collect()))?;
    for (j, name) in columns.iter().enumerate() {
        table.add_column(name.clone(), Column::Real(matrix.column(j).iter().copied().collect()))?;
    }
    Ok(table)
}

fn read_matrix_table(table: &Table, columns: &[String]) -> Result<(DVector<f64>, DMatrix<f64>)> {
    let k = columns.len();
    let mean = table.reals("Mean")?;
    if mean.len() != k {
        return Err(Error::size_mismatch(k, mean.len(), "matrix table"));
    }
    let mut matrix = DMatrix::<f64>::zeros(k, k);
    for (j, name) in columns.iter().enumerate() {
        for (i, v) in table.reals(name)?.iter().enumerate() {
            matrix[(i, j)] = *v;
        }
    }
    Ok((DVector::from_column_slice(mean), matrix))
}

/// Mahalanobis engine over arbitrary column sets
#[derive(Debug, Clone, Default)]
pub struct MultiCorrelativeStatistics {
    common: EngineCommon,
}

impl MultiCorrelativeStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a request for the columns staged so far
    pub fn add_request<I, S>(&mut self, columns: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.common.requests.add_request(Request::new(columns))
    }
}

impl StatisticsEngine for MultiCorrelativeStatistics {
    fn name(&self) -> &'static str {
        NAME
    }

    fn max_request_arity(&self) -> usize {
        0
    }

    fn common(&self) -> &EngineCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut EngineCommon {
        &mut self.common
    }

    #[instrument(skip_all, fields(engine = NAME))]
    fn learn(&self, input: &Table, _parameters: Option<&Table>) -> Result<StatisticalModel> {
        let mut variables: Vec<String> = Vec::new();
        let mut pairs: BTreeSet<(String, String)> = BTreeSet::new();
        for request in self.requests() {
            let Some(columns) = request_columns(NAME, 0, request) else {
                continue;
            };
            if let Some(err) = columns.iter().find_map(|c| input.numeric(c).err()) {
                skip_request(NAME, "learn", &request.label(), err)?;
                continue;
            }
            for (i, a) in columns.iter().enumerate() {
                if !variables.contains(a) {
                    variables.push(a.clone());
                }
                for b in &columns[..=i] {
                    let (a, b) = canonical(a, b);
                    pairs.insert((a.to_string(), b.to_string()));
                }
            }
        }

        let data = variables
            .iter()
            .map(|v| input.numeric(v))
            .collect::<Result<Vec<_>>>()?;
        let index = |name: &str| variables.iter().position(|v| v == name).unwrap_or(0);
        let pair_index: Vec<(usize, usize)> = pairs.iter().map(|(a, b)| (index(a), index(b))).collect();

        let mut n = 0u64;
        let mut means = vec![0.0; variables.len()];
        let mut deltas = vec![0.0; variables.len()];
        let mut comoments = vec![0.0; pairs.len()];
        for r in input.live_rows(self.ghost_skip_mask()) {
            n += 1;
            let nf = n as f64;
            for (i, column) in data.iter().enumerate() {
                deltas[i] = column[r] - means[i];
            }
            let weight = (nf - 1.0) / nf;
            for (m, (a, b)) in comoments.iter_mut().zip(&pair_index) {
                *m += deltas[*a] * deltas[*b] * weight;
            }
            for (mean, delta) in means.iter_mut().zip(&deltas) {
                *mean += delta / nf;
            }
        }
        debug!(n, variables = variables.len(), pairs = pairs.len(), "learned sparse covariance");

        let count = n as i64;
        let mut keys = vec![(CARDINALITY_KEY.to_string(), String::new())];
        let mut entries = vec![n as f64];
        for (variable, mean) in variables.iter().zip(&means) {
            keys.push((variable.clone(), String::new()));
            entries.push(if n == 0 { f64::NAN } else { *mean });
        }
        keys.extend(pairs);
        entries.extend(comoments);
        let sparse = SparseCovariance {
            cardinalities: vec![count; keys.len()],
            keys,
            entries,
        };
        let mut model = StatisticalModel::new(NAME);
        model.insert(ModelPhase::Learned, SPARSE_TABLE, sparse.to_table()?);
        Ok(model)
    }

    #[instrument(skip_all, fields(engine = NAME))]
    fn derive(&self, model: &mut StatisticalModel) -> Result<()> {
        let sparse = SparseCovariance::from_table(model.require_learned(SPARSE_TABLE)?)?;
        let mut derived = Vec::new();
        for request in self.requests() {
            let Some(columns) = request_columns(NAME, 0, request) else {
                continue;
            };
            let (mean, cov) = match sparse.covariance(columns) {
                Ok(result) => result,
                Err(err) => {
                    warn!(engine = NAME, request = %request.label(), error = %err, "cannot derive request");
                    continue;
                }
            };
            let factor = cholesky_lower(&cov);
            if factor.iter().any(|v| v.is_nan()) {
                debug!(request = %request.label(), "covariance is not positive definite");
            }
            derived.push((covariance_table_name(columns), matrix_table(columns, &mean, &cov)?));
            derived.push((cholesky_table_name(columns), matrix_table(columns, &mean, &factor)?));
        }
        model.set_derived(derived);
        Ok(())
    }

    fn select_functor(
        &self,
        _input: &Table,
        model: &StatisticalModel,
        request: &Request,
    ) -> FunctorOutcome {
        let build = || -> Result<AssessFunctor> {
            let columns = request_columns(NAME, 0, request)
                .ok_or_else(|| Error::InvalidParameter("empty request".to_string()))?;
            let table = model.require_derived(&cholesky_table_name(columns))?;
            let (mean, factor) = read_matrix_table(table, columns)?;
            Ok(AssessFunctor::Mahalanobis(MahalanobisFunctor {
                columns: columns.to_vec(),
                mean,
                inverse_factor: invert_lower_triangular(&factor),
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
        let tables = learned_tables(models, SPARSE_TABLE)?;
        check_same_keys(&tables, &["Column1", "Column2"], SPARSE_TABLE)?;
        let mut merged = SparseCovariance::from_table(tables[0])?;
        for table in &tables[1..] {
            merged = merged.merge(&SparseCovariance::from_table(table)?);
        }
        let mut model = StatisticalModel::new(NAME);
        model.insert(ModelPhase::Learned, SPARSE_TABLE, merged.to_table()?);
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
