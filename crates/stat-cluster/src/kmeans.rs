//! KMeans engine
//!
//! Every request is a set of numeric columns. Runs are seeded either from a
//! parameter table (one run per distinct value of its `K` column, seeded by
//! that value's rows) or, without one, from the first K distinct input rows.

use crate::lloyd::{lloyd, FittedRun};
use stat_core::descriptor::ParamValue;
use stat_core::functor::{AssessFunctor, FunctorOutcome, KMeansFunctor};
use stat_core::model::{ModelPhase, StatisticalModel};
use stat_core::oracle::PValueOracle;
use stat_core::request::Request;
use stat_core::table::{Column, Table};
use stat_core::traits::{
    check_aggregate_input, check_same_keys, learned_tables, request_columns, skip_request,
    EngineCommon, StatisticsEngine,
};
use stat_core::{Error, Result};
use std::borrow::Cow;
use std::collections::BTreeSet;
use tracing::{debug, instrument, warn};

pub const NAME: &str = "kmeans";

const CLUSTER_PREFIX: &str = "Cluster Centers";
const FIXED_COLUMNS: [&str; 6] = ["Run ID", "K", "Cluster ID", "Cardinality", "Error", "Iterations"];

pub fn cluster_table_name(columns: &[String]) -> String {
    format!("{CLUSTER_PREFIX}({})", columns.join(","))
}

pub fn run_summary_table_name(columns: &[String]) -> String {
    format!("Run Summary({})", columns.join(","))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KMeansConfig {
    /// Number of clusters when no parameter table is given
    pub k: usize,
    pub max_iterations: u64,
    /// Fraction of points allowed to change cluster in a converged iteration
    pub tolerance: f64,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            k: 3,
            max_iterations: 50,
            tolerance: 0.01,
        }
    }
}

/// Cluster table of one request: fixed columns, then one column per variable
pub fn cluster_table(columns: &[String], runs: &[FittedRun]) -> Result<Table> {
    let mut fixed: [Vec<i64>; 5] = Default::default();
    let mut errors = Vec::new();
    let mut coordinates = vec![Vec::new(); columns.len()];
    for run in runs {
        for cluster in 0..run.k() {
            fixed[0].push(run.run_id);
            fixed[1].push(run.k() as i64);
            fixed[2].push(cluster as i64);
            fixed[3].push(run.cardinalities[cluster] as i64);
            fixed[4].push(run.iterations as i64);
            errors.push(run.errors[cluster]);
            for (column, value) in coordinates.iter_mut().zip(&run.centers[cluster]) {
                column.push(*value);
            }
        }
    }
    let [run_ids, ks, cluster_ids, cardinalities, iterations] = fixed;
    let mut table = Table::new()
        .with_column("Run ID", Column::Integer(run_ids))?
        .with_column("K", Column::Integer(ks))?
        .with_column("Cluster ID", Column::Integer(cluster_ids))?
        .with_column("Cardinality", Column::Integer(cardinalities))?
        .with_column("Error", Column::Real(errors))?
        .with_column("Iterations", Column::Integer(iterations))?;
    for (name, values) in columns.iter().zip(coordinates) {
        table.add_column(name.clone(), Column::Real(values))?;
    }
    Ok(table)
}

/// Runs stored in a cluster table, in row order
pub fn read_runs(table: &Table) -> Result<Vec<FittedRun>> {
    let run_ids = table.integers("Run ID")?;
    let cluster_ids = table.integers("Cluster ID")?;
    let cardinalities = table.integers("Cardinality")?;
    let errors = table.reals("Error")?;
    let iterations = table.integers("Iterations")?;
    let variables = &table.column_names()[FIXED_COLUMNS.len().min(table.num_columns())..];
    let coordinates = variables
        .iter()
        .map(|v| table.reals(v))
        .collect::<Result<Vec<_>>>()?;

    let mut runs: Vec<FittedRun> = Vec::new();
    for r in 0..table.num_rows() {
        let center: Vec<f64> = coordinates.iter().map(|c| c[r]).collect();
        let cardinality = u64::try_from(cardinalities[r])
            .map_err(|_| Error::inconsistent(format!("negative cardinality in row {r}")))?;
        if runs.last().map_or(true, |run| run.run_id != run_ids[r]) {
            runs.push(FittedRun {
                run_id: run_ids[r],
                centers: Vec::new(),
                cardinalities: Vec::new(),
                errors: Vec::new(),
                iterations: u64::try_from(iterations[r]).unwrap_or(0),
            });
        }
        let Some(run) = runs.last_mut() else {
            continue;
        };
        if cluster_ids[r] != run.centers.len() as i64 {
            return Err(Error::inconsistent(format!(
                "run {} lists cluster {} out of order",
                run.run_id, cluster_ids[r]
            )));
        }
        run.centers.push(center);
        run.cardinalities.push(cardinality);
        run.errors.push(errors[r]);
    }
    Ok(runs)
}

/// Seed centres grouped by the `K` column of a parameter table
///
/// Groups whose row count differs from their K are dropped with a diagnostic.
fn parameter_seeds(parameters: &Table, columns: &[String]) -> Result<Vec<Vec<Vec<f64>>>> {
    let ks = parameters.integers("K")?;
    let data = columns
        .iter()
        .map(|c| parameters.numeric(c))
        .collect::<Result<Vec<_>>>()?;
    let mut groups: Vec<(i64, Vec<Vec<f64>>)> = Vec::new();
    for (r, k) in ks.iter().enumerate() {
        let row = data.iter().map(|c| c[r]).collect();
        match groups.iter_mut().find(|(key, _)| key == k) {
            Some((_, seeds)) => seeds.push(row),
            None => groups.push((*k, vec![row])),
        }
    }
    Ok(groups
        .into_iter()
        .filter(|(k, seeds)| {
            let matches = usize::try_from(*k).map_or(false, |k| k == seeds.len());
            if !matches {
                warn!(engine = NAME, k, rows = seeds.len(), "seed rows do not match K, dropping run");
            }
            matches
        })
        .map(|(_, seeds)| seeds)
        .collect())
}

/// The first `k` pairwise distinct points
///
/// Rows repeating an earlier seed's coordinates are passed over so that no
/// two runs start on the same centre; with fewer than `k` distinct points
/// the run has fewer clusters.
fn distinct_seeds(points: &[Vec<f64>], k: usize) -> Vec<Vec<f64>> {
    let mut seeds: Vec<Vec<f64>> = Vec::with_capacity(k);
    for point in points {
        if seeds.len() == k {
            break;
        }
        if !seeds.contains(point) {
            seeds.push(point.clone());
        }
    }
    seeds
}

/// KMeans clustering engine
#[derive(Debug, Clone, Default)]
pub struct KMeansStatistics {
    common: EngineCommon,
    config: KMeansConfig,
}

impl KMeansStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&self) -> &KMeansConfig {
        &self.config
    }

    /// Cluster the given columns together
    pub fn add_request<I, S>(&mut self, columns: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.common.requests.add_request(Request::new(columns))
    }

    pub fn set_k(&mut self, k: usize) -> Result<()> {
        if k == 0 {
            return Err(Error::InvalidParameter("k must be positive".to_string()));
        }
        self.config.k = k;
        Ok(())
    }

    pub fn set_max_iterations(&mut self, max_iterations: u64) -> Result<()> {
        if max_iterations == 0 {
            return Err(Error::InvalidParameter(
                "max_iterations must be positive".to_string(),
            ));
        }
        self.config.max_iterations = max_iterations;
        Ok(())
    }

    pub fn set_tolerance(&mut self, tolerance: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&tolerance) {
            return Err(Error::InvalidParameter(format!(
                "tolerance must lie in [0, 1], got {tolerance}"
            )));
        }
        self.config.tolerance = tolerance;
        Ok(())
    }

    fn seeds(
        &self,
        parameters: Option<&Table>,
        columns: &[String],
        points: &[Vec<f64>],
    ) -> Vec<Vec<Vec<f64>>> {
        if let Some(table) = parameters {
            match parameter_seeds(table, columns) {
                Ok(seeds) if !seeds.is_empty() => return seeds,
                Ok(_) => {
                    warn!(engine = NAME, "no usable seed group, seeding from input");
                }
                Err(err) => {
                    warn!(engine = NAME, error = %err, "unusable parameter table, seeding from input");
                }
            }
        }
        let seeds = distinct_seeds(points, self.config.k);
        if seeds.is_empty() {
            return Vec::new();
        }
        if seeds.len() < self.config.k {
            warn!(
                engine = NAME,
                k = self.config.k,
                distinct = seeds.len(),
                "fewer distinct rows than clusters"
            );
        }
        vec![seeds]
    }
}

impl StatisticsEngine for KMeansStatistics {
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
    fn learn(&self, input: &Table, parameters: Option<&Table>) -> Result<StatisticalModel> {
        let mask = self.ghost_skip_mask();
        let mut model = StatisticalModel::new(NAME);
        let mut seen = BTreeSet::new();
        for request in self.requests() {
            let Some(columns) = request_columns(NAME, 0, request) else {
                continue;
            };
            let name = cluster_table_name(columns);
            if !seen.insert(name.clone()) {
                continue;
            }
            let data: Vec<Cow<'_, [f64]>> =
                match columns.iter().map(|c| input.numeric(c)).collect::<Result<_>>() {
                    Ok(data) => data,
                    Err(err) => {
                        skip_request(NAME, "learn", &request.label(), err)?;
                        continue;
                    }
                };
            let points: Vec<Vec<f64>> = input
                .live_rows(mask)
                .map(|r| data.iter().map(|c| c[r]).collect::<Vec<f64>>())
                .filter(|p| p.iter().all(|v| v.is_finite()))
                .collect();

            let runs: Vec<FittedRun> = self
                .seeds(parameters, columns, &points)
                .into_iter()
                .enumerate()
                .map(|(id, seeds)| {
                    lloyd(
                        id as i64,
                        &points,
                        seeds,
                        self.config.max_iterations,
                        self.config.tolerance,
                    )
                })
                .collect();
            for run in &runs {
                debug!(
                    request = %request.label(),
                    run = run.run_id,
                    k = run.k(),
                    iterations = run.iterations,
                    error = run.total_error(),
                    "fitted run"
                );
            }
            model.insert(ModelPhase::Learned, name, cluster_table(columns, &runs)?);
        }
        Ok(model)
    }

    #[instrument(skip_all, fields(engine = NAME))]
    fn derive(&self, model: &mut StatisticalModel) -> Result<()> {
        let mut derived = Vec::new();
        for request in self.requests() {
            let Some(columns) = request_columns(NAME, 0, request) else {
                continue;
            };
            let summary_name = run_summary_table_name(columns);
            if derived.iter().any(|(name, _)| *name == summary_name) {
                continue;
            }
            let runs = match model
                .require_learned(&cluster_table_name(columns))
                .and_then(read_runs)
            {
                Ok(runs) => runs,
                Err(err) => {
                    skip_request(NAME, "derive", &request.label(), err)?;
                    continue;
                }
            };
            let mut order: Vec<usize> = (0..runs.len()).collect();
            order.sort_by(|a, b| runs[*a].total_error().total_cmp(&runs[*b].total_error()));
            let mut rank = vec![0i64; runs.len()];
            for (position, index) in order.into_iter().enumerate() {
                rank[index] = position as i64;
            }
            let table = Table::new()
                .with_column("Run ID", Column::Integer(runs.iter().map(|r| r.run_id).collect()))?
                .with_column("K", Column::Integer(runs.iter().map(|r| r.k() as i64).collect()))?
                .with_column(
                    "Total Error",
                    Column::Real(runs.iter().map(FittedRun::total_error).collect()),
                )?
                .with_column("Rank", Column::Integer(rank))?;
            derived.push((summary_name, table));
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
            let runs = read_runs(model.require_learned(&cluster_table_name(columns))?)?;
            Ok(AssessFunctor::KMeans(KMeansFunctor {
                columns: columns.to_vec(),
                runs: runs.iter().map(FittedRun::cluster_run).collect(),
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
        let mut model = StatisticalModel::new(NAME);
        for name in models[0].names(ModelPhase::Learned) {
            if !name.starts_with(CLUSTER_PREFIX) {
                continue;
            }
            // A part that fitted no run saw no live rows and merges as the identity
            let all = learned_tables(models, name)?;
            let tables: Vec<&Table> = all.iter().copied().filter(|t| t.num_rows() > 0).collect();
            let Some((first, rest)) = tables.split_first() else {
                model.insert(ModelPhase::Learned, name, all[0].clone());
                continue;
            };
            check_same_keys(&tables, &["Run ID", "K", "Cluster ID"], name)?;
            let variables = &first.column_names()[FIXED_COLUMNS.len().min(first.num_columns())..];
            let mut merged = read_runs(first)?;
            for table in rest {
                for (acc, run) in merged.iter_mut().zip(read_runs(table)?) {
                    *acc = acc.merge(&run);
                }
            }
            model.insert(ModelPhase::Learned, name, cluster_table(variables, &merged)?);
        }
        Ok(model)
    }

    fn set_parameter(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        let invalid = |what: &str| Error::InvalidParameter(format!("{name} must be {what}, got {value}"));
        match name {
            "k" => {
                let k = value
                    .as_i64()
                    .and_then(|k| usize::try_from(k).ok())
                    .ok_or_else(|| invalid("a positive integer"))?;
                self.set_k(k)
            }
            "max_iterations" => {
                let n = value
                    .as_i64()
                    .and_then(|n| u64::try_from(n).ok())
                    .ok_or_else(|| invalid("a positive integer"))?;
                self.set_max_iterations(n)
            }
            "tolerance" => {
                let t = value.as_f64().ok_or_else(|| invalid("a number"))?;
                self.set_tolerance(t)
            }
            other => self.common.set_parameter(other, value).unwrap_or_else(|| {
                Err(Error::InvalidParameter(format!("unknown parameter {other}")))
            }),
        }
    }

    fn parameters(&self) -> Vec<(String, ParamValue)> {
        let mut params = vec![
            ("k".to_string(), ParamValue::Integer(self.config.k as i64)),
            (
                "max_iterations".to_string(),
                ParamValue::Integer(self.config.max_iterations as i64),
            ),
            ("tolerance".to_string(), ParamValue::Real(self.config.tolerance)),
        ];
        params.extend(self.common.parameters());
        params
    }
}
