//! Contingency statistics engine
//!
//! Learn builds one sparse joint count table per variable pair, all stored in
//! a single `Contingency Table` whose `Key` column indexes the `Summary` row
//! naming the pair. Row 0 of that table is a sentinel carrying the number of
//! learned rows. Derive checks that every pair accounts for exactly that many
//! observations before producing joint and conditional probabilities, PMI,
//! the entropy triple and the marginal distribution of every variable.

use crate::cells::{specialize, JointCounts};
use stat_core::descriptor::ParamValue;
use stat_core::functor::{AssessFunctor, CellProbabilities, ContingencyFunctor, FunctorOutcome};
use stat_core::model::{ModelPhase, StatisticalModel};
use stat_core::oracle::{chi_square_p_values, PValueOracle};
use stat_core::request::Request;
use stat_core::table::{Column, Table};
use stat_core::traits::{
    check_aggregate_input, check_same_keys, learned_tables, request_columns, skip_request,
    EngineCommon, StatisticsEngine,
};
use stat_core::value::{Datum, ValueKind};
use stat_core::{Error, Result};
use std::collections::BTreeMap;
use tracing::{debug, instrument, warn};

pub const NAME: &str = "contingency";
pub const SUMMARY_TABLE: &str = "Summary";
pub const CONTINGENCY_TABLE: &str = "Contingency Table";
pub const JOINT_TABLE: &str = "Joint Probabilities";
pub const ENTROPY_TABLE: &str = "Entropies";

/// Largest tolerated deviation of a pair's total probability from 1
pub const CDF_TOLERANCE: f64 = 1e-6;

const SENTINEL_KEY: i64 = -1;

pub fn marginal_table_name(variable: &str) -> String {
    format!("Marginal {variable}")
}

/// Learned tables in memory: the variable pairs and their joint counts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContingencyModel {
    /// Number of learned rows, from the sentinel row
    pub cardinality: u64,
    pub pairs: Vec<(String, String)>,
    pub counts: Vec<JointCounts>,
}

impl ContingencyModel {
    pub fn from_model(model: &StatisticalModel) -> Result<Self> {
        Self::from_tables(
            model.require_learned(SUMMARY_TABLE)?,
            model.require_learned(CONTINGENCY_TABLE)?,
        )
    }

    /// Rebuild from the summary and contingency tables
    ///
    /// A key with no summary row, a missing sentinel or a negative count is
    /// an inconsistency.
    pub fn from_tables(summary: &Table, contingency: &Table) -> Result<Self> {
        let xs = summary.texts("Variable X")?;
        let ys = summary.texts("Variable Y")?;
        let keys = contingency.integers("Key")?;
        let x_values = contingency.variants("x")?;
        let y_values = contingency.variants("y")?;
        let cardinalities = contingency.integers("Cardinality")?;

        let cardinality = match (keys.first(), cardinalities.first()) {
            (Some(&SENTINEL_KEY), Some(&n)) if n >= 0 => n as u64,
            _ => {
                return Err(Error::inconsistent(format!(
                    "{CONTINGENCY_TABLE} does not start with the cardinality row"
                )))
            }
        };
        let mut counts = vec![JointCounts::new(); xs.len()];
        for r in 1..keys.len() {
            let key = usize::try_from(keys[r])
                .ok()
                .filter(|k| *k < counts.len())
                .ok_or_else(|| {
                    Error::inconsistent(format!("key {} has no {SUMMARY_TABLE} row", keys[r]))
                })?;
            let count = u64::try_from(cardinalities[r])
                .map_err(|_| Error::inconsistent(format!("negative count in row {r}")))?;
            counts[key].add(x_values[r].clone(), y_values[r].clone(), count);
        }
        Ok(Self {
            cardinality,
            pairs: xs.iter().cloned().zip(ys.iter().cloned()).collect(),
            counts,
        })
    }

    pub fn key_of(&self, x: &str, y: &str) -> Option<usize> {
        self.pairs.iter().position(|(a, b)| a == x && b == y)
    }

    pub fn summary_table(&self) -> Result<Table> {
        Table::new()
            .with_column(
                "Variable X",
                Column::Text(self.pairs.iter().map(|p| p.0.clone()).collect()),
            )?
            .with_column(
                "Variable Y",
                Column::Text(self.pairs.iter().map(|p| p.1.clone()).collect()),
            )
    }

    pub fn contingency_table(&self) -> Result<Table> {
        let mut keys = vec![SENTINEL_KEY];
        let mut xs = vec![Datum::Text(String::new())];
        let mut ys = vec![Datum::Text(String::new())];
        let mut cardinalities = vec![self.cardinality as i64];
        for (key, counts) in self.counts.iter().enumerate() {
            for (x, y, c) in counts.iter() {
                keys.push(key as i64);
                xs.push(x.clone());
                ys.push(y.clone());
                cardinalities.push(c as i64);
            }
        }
        Table::new()
            .with_column("Key", Column::Integer(keys))?
            .with_column("x", Column::Variant(xs))?
            .with_column("y", Column::Variant(ys))?
            .with_column("Cardinality", Column::Integer(cardinalities))
    }

    /// Fail unless every pair accounts for exactly the learned row count
    pub fn check_cardinalities(&self) -> Result<()> {
        for ((x, y), counts) in self.pairs.iter().zip(&self.counts) {
            if counts.total() != self.cardinality {
                return Err(Error::inconsistent(format!(
                    "pair ({x},{y}) counts {} observations, expected {}",
                    counts.total(),
                    self.cardinality
                )));
            }
        }
        Ok(())
    }
}

fn marginal_table(variable: &str, marginal: &BTreeMap<Datum, u64>) -> Result<Table> {
    let n: u64 = marginal.values().sum();
    Table::new()
        .with_column(variable, Column::Variant(marginal.keys().cloned().collect()))?
        .with_column(
            "Cardinality",
            Column::Integer(marginal.values().map(|c| *c as i64).collect()),
        )?
        .with_column(
            "P",
            Column::Real(marginal.values().map(|c| *c as f64 / n as f64).collect()),
        )
}

/// Two-way contingency engine
#[derive(Debug, Clone, Default)]
pub struct ContingencyStatistics {
    common: EngineCommon,
}

impl ContingencyStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_column_pair(&mut self, x: &str, y: &str) -> bool {
        self.common.requests.add_column_pair(x, y)
    }

    fn pair_of<'a>(&self, request: &'a Request) -> Option<(&'a str, &'a str)> {
        request_columns(NAME, 2, request).map(|c| (c[0].as_str(), c[1].as_str()))
    }

    fn count_pair(&self, input: &Table, x: &str, y: &str) -> Result<JointCounts> {
        let cx = input.require(x)?;
        let cy = input.require(y)?;
        let kind = specialize(cx.value_kind(), cy.value_kind());
        let mut counts = JointCounts::new();
        for r in input.live_rows(self.ghost_skip_mask()) {
            if let (Some(a), Some(b)) = (cx.get(r), cy.get(r)) {
                counts.push(a.coerce(kind), b.coerce(kind));
            }
        }
        Ok(counts)
    }
}

impl StatisticsEngine for ContingencyStatistics {
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
        let mut learned = ContingencyModel {
            cardinality: input.live_rows(self.ghost_skip_mask()).count() as u64,
            ..Default::default()
        };
        for request in self.requests() {
            let Some((x, y)) = self.pair_of(request) else {
                continue;
            };
            if learned.key_of(x, y).is_some() {
                continue;
            }
            match self.count_pair(input, x, y) {
                Ok(counts) => {
                    debug!(x, y, cells = counts.len(), "learned joint counts");
                    learned.pairs.push((x.to_string(), y.to_string()));
                    learned.counts.push(counts);
                }
                Err(err) => skip_request(NAME, "learn", &request.label(), err)?,
            }
        }
        let mut model = StatisticalModel::new(NAME);
        model.insert(ModelPhase::Learned, SUMMARY_TABLE, learned.summary_table()?);
        model.insert(ModelPhase::Learned, CONTINGENCY_TABLE, learned.contingency_table()?);
        Ok(model)
    }

    #[instrument(skip_all, fields(engine = NAME))]
    fn derive(&self, model: &mut StatisticalModel) -> Result<()> {
        let learned = ContingencyModel::from_model(model)?;
        learned.check_cardinalities()?;

        let mut keys = vec![SENTINEL_KEY];
        let mut xs = vec![Datum::Text(String::new())];
        let mut ys = vec![Datum::Text(String::new())];
        let mut cardinalities = vec![learned.cardinality as i64];
        let mut probabilities: [Vec<f64>; 4] = [vec![-1.0], vec![-1.0], vec![-1.0], vec![-1.0]];
        let mut entropies: [Vec<f64>; 3] = Default::default();
        let mut marginals: Vec<(String, BTreeMap<Datum, u64>)> = Vec::new();

        for (key, ((x, y), counts)) in learned.pairs.iter().zip(&learned.counts).enumerate() {
            for ((cx, cy, c), p) in counts.iter().zip(counts.probabilities()) {
                keys.push(key as i64);
                xs.push(cx.clone());
                ys.push(cy.clone());
                cardinalities.push(c as i64);
                probabilities[0].push(p.joint);
                probabilities[1].push(p.y_given_x);
                probabilities[2].push(p.x_given_y);
                probabilities[3].push(p.pmi);
            }
            for (column, h) in entropies.iter_mut().zip(counts.entropies()) {
                column.push(h);
            }
            if !marginals.iter().any(|(v, _)| v == x) {
                marginals.push((x.clone(), counts.marginal_x()));
            }
            if !marginals.iter().any(|(v, _)| v == y) {
                marginals.push((y.clone(), counts.marginal_y()));
            }
        }

        let [p, py_x, px_y, pmi] = probabilities;
        let joint = Table::new()
            .with_column("Key", Column::Integer(keys))?
            .with_column("x", Column::Variant(xs))?
            .with_column("y", Column::Variant(ys))?
            .with_column("Cardinality", Column::Integer(cardinalities))?
            .with_column("P", Column::Real(p))?
            .with_column("Py|x", Column::Real(py_x))?
            .with_column("Px|y", Column::Real(px_y))?
            .with_column("PMI", Column::Real(pmi))?;
        let [hxy, hy_x, hx_y] = entropies;
        let entropy = learned
            .summary_table()?
            .with_column("H(X,Y)", Column::Real(hxy))?
            .with_column("H(Y|X)", Column::Real(hy_x))?
            .with_column("H(X|Y)", Column::Real(hx_y))?;

        let mut derived = vec![
            (JOINT_TABLE.to_string(), joint),
            (ENTROPY_TABLE.to_string(), entropy),
        ];
        for (variable, marginal) in &marginals {
            derived.push((marginal_table_name(variable), marginal_table(variable, marginal)?));
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
            let (x, y) = self
                .pair_of(request)
                .ok_or_else(|| Error::InvalidParameter("request needs two columns".to_string()))?;
            let key = model
                .require_learned(SUMMARY_TABLE)
                .and_then(|summary| {
                    let xs = summary.texts("Variable X")?;
                    let ys = summary.texts("Variable Y")?;
                    Ok(xs.iter().zip(ys).position(|(a, b)| a == x && b == y))
                })?
                .ok_or_else(|| Error::missing_table(&format!("{CONTINGENCY_TABLE} ({x},{y})")))?;

            let joint = model.require_derived(JOINT_TABLE)?;
            let keys = joint.integers("Key")?;
            let xs = joint.variants("x")?;
            let ys = joint.variants("y")?;
            let columns = [
                joint.reals("P")?,
                joint.reals("Py|x")?,
                joint.reals("Px|y")?,
                joint.reals("PMI")?,
            ];
            let mut cells = BTreeMap::new();
            let mut total = 0.0;
            for r in (0..keys.len()).filter(|r| keys[*r] == key as i64) {
                total += columns[0][r];
                cells.insert(
                    (xs[r].clone(), ys[r].clone()),
                    CellProbabilities {
                        joint: columns[0][r],
                        y_given_x: columns[1][r],
                        x_given_y: columns[2][r],
                        pmi: columns[3][r],
                    },
                );
            }
            if (total - 1.0).abs() > CDF_TOLERANCE {
                return Err(Error::inconsistent(format!(
                    "joint probabilities of ({x},{y}) sum to {total}"
                )));
            }
            let (kind_x, kind_y) = cells
                .keys()
                .next()
                .map(|(a, b)| (a.kind(), b.kind()))
                .unwrap_or((ValueKind::Text, ValueKind::Text));
            Ok(AssessFunctor::Contingency(ContingencyFunctor {
                x: x.to_string(),
                y: y.to_string(),
                kind_x,
                kind_y,
                cells,
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
        let learned = ContingencyModel::from_model(model)?;
        let mut names = (Vec::new(), Vec::new());
        let mut dof = Vec::new();
        let mut chi2 = Vec::new();
        let mut chi2_yates = Vec::new();
        for request in self.requests() {
            let Some((x, y)) = self.pair_of(request) else {
                continue;
            };
            let Some(key) = learned.key_of(x, y) else {
                warn!(engine = NAME, x, y, "pair was not learned, cannot test");
                continue;
            };
            let counts = &learned.counts[key];
            if counts.total() != learned.cardinality {
                warn!(
                    engine = NAME,
                    x,
                    y,
                    expected = learned.cardinality,
                    actual = counts.total(),
                    "pair cardinality does not match the model, cannot test"
                );
                continue;
            }
            let chi = counts.chi_square();
            names.0.push(x.to_string());
            names.1.push(y.to_string());
            dof.push(chi.dof);
            chi2.push(chi.chi2);
            chi2_yates.push(chi.chi2_yates);
        }
        let dof_real: Vec<f64> = dof.iter().map(|d| *d as f64).collect();
        let p = chi_square_p_values(oracle, &chi2, &dof_real);
        let p_yates = chi_square_p_values(oracle, &chi2_yates, &dof_real);
        Table::new()
            .with_column("Variable X", Column::Text(names.0))?
            .with_column("Variable Y", Column::Text(names.1))?
            .with_column("d", Column::Integer(dof))?
            .with_column("Chi2", Column::Real(chi2))?
            .with_column("Chi2 Yates", Column::Real(chi2_yates))?
            .with_column("P", Column::Real(p))?
            .with_column("P Yates", Column::Real(p_yates))
    }

    #[instrument(skip_all, fields(engine = NAME, models = models.len()))]
    fn aggregate(&self, models: &[StatisticalModel]) -> Result<StatisticalModel> {
        check_aggregate_input(NAME, models)?;
        let summaries = learned_tables(models, SUMMARY_TABLE)?;
        check_same_keys(&summaries, &["Variable X", "Variable Y"], SUMMARY_TABLE)?;

        let mut merged = ContingencyModel::from_model(&models[0])?;
        for model in &models[1..] {
            let part = ContingencyModel::from_model(model)?;
            merged.cardinality += part.cardinality;
            for (acc, counts) in merged.counts.iter_mut().zip(&part.counts) {
                acc.merge(counts);
            }
        }
        let mut model = StatisticalModel::new(NAME);
        model.insert(ModelPhase::Learned, SUMMARY_TABLE, merged.summary_table()?);
        model.insert(ModelPhase::Learned, CONTINGENCY_TABLE, merged.contingency_table()?);
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
