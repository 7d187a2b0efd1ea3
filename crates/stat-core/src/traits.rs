//! The engine protocol
//!
//! Every algorithm family implements [`StatisticsEngine`]: Learn builds the
//! sufficient statistics, Derive turns them into interpretable quantities,
//! Assess scores rows through per-request functors, Test computes goodness of
//! fit statistics, and Aggregate merges independently learned models.
//!
//! Errors local to one request are reported through `tracing` and skipped;
//! the remaining requests of the same phase still run.

use crate::descriptor::{Descriptor, ParamValue};
use crate::error::{Error, Result};
use crate::functor::{assess_column_name, FunctorOutcome};
use crate::model::StatisticalModel;
use crate::oracle::PValueOracle;
use crate::request::{Request, RequestSet};
use crate::table::Table;
use tracing::{debug, warn};

/// Default ghost skip mask: any ghost bit excludes the row
pub const DEFAULT_SKIP_MASK: u8 = 0xff;

/// Settings every engine carries
#[derive(Debug, Clone)]
pub struct EngineCommon {
    pub requests: RequestSet,
    pub ghost_skip_mask: u8,
    /// Display names replacing the default metric names of Assess columns
    pub assess_names: Vec<String>,
}

impl Default for EngineCommon {
    fn default() -> Self {
        Self {
            requests: RequestSet::new(),
            ghost_skip_mask: DEFAULT_SKIP_MASK,
            assess_names: Vec::new(),
        }
    }
}

impl EngineCommon {
    /// Apply a parameter shared by all engines
    ///
    /// Returns `None` when `name` is not a common parameter.
    pub fn set_parameter(&mut self, name: &str, value: &ParamValue) -> Option<Result<()>> {
        let result = match name {
            "skip_mask" => match value.as_i64() {
                Some(mask) if (0..=255).contains(&mask) => {
                    self.ghost_skip_mask = mask as u8;
                    Ok(())
                }
                _ => Err(Error::InvalidParameter(format!(
                    "skip_mask must be an integer in 0..=255, got {value}"
                ))),
            },
            "assess_names" => match value.as_text_list() {
                Some(names) => {
                    self.assess_names = names;
                    Ok(())
                }
                None => Err(Error::InvalidParameter(format!(
                    "assess_names must be a list of strings, got {value}"
                ))),
            },
            "requests" => parse_requests(value).map(|requests| {
                for request in requests {
                    self.requests.add_request(request);
                }
            }),
            _ => return None,
        };
        Some(result)
    }

    pub fn parameters(&self) -> Vec<(String, ParamValue)> {
        let mut params = vec![(
            "skip_mask".to_string(),
            ParamValue::Integer(i64::from(self.ghost_skip_mask)),
        )];
        if !self.assess_names.is_empty() {
            params.push((
                "assess_names".to_string(),
                ParamValue::text_list(self.assess_names.iter().cloned()),
            ));
        }
        if !self.requests.is_empty() {
            let requests = self
                .requests
                .iter()
                .map(|r| ParamValue::text_list(r.columns().iter().cloned()))
                .collect();
            params.push(("requests".to_string(), ParamValue::Tuple(requests)));
        }
        params
    }
}

/// `requests=((a,b),(c))`; a flat tuple of names is a single request
fn parse_requests(value: &ParamValue) -> Result<Vec<Request>> {
    let invalid =
        || Error::InvalidParameter(format!("requests must be a tuple of column lists, got {value}"));
    let items = value.as_tuple().ok_or_else(invalid)?;
    if items.iter().all(|v| v.as_str().is_some()) {
        let names = value.as_text_list().ok_or_else(invalid)?;
        return Ok(vec![Request::new(names)]);
    }
    items
        .iter()
        .map(|item| item.as_text_list().map(Request::new).ok_or_else(invalid))
        .collect()
}

/// The four-phase protocol plus aggregation
pub trait StatisticsEngine: Send + Sync {
    /// Registry name, also the algorithm name stored in models
    fn name(&self) -> &'static str;

    /// Largest request size the engine uses; 0 means unbounded
    fn max_request_arity(&self) -> usize;

    fn common(&self) -> &EngineCommon;

    fn common_mut(&mut self) -> &mut EngineCommon;

    fn requests(&self) -> &RequestSet {
        &self.common().requests
    }

    fn requests_mut(&mut self) -> &mut RequestSet {
        &mut self.common_mut().requests
    }

    fn ghost_skip_mask(&self) -> u8 {
        self.common().ghost_skip_mask
    }

    /// Scan the input once per request and return the Learned tables
    fn learn(&self, input: &Table, parameters: Option<&Table>) -> Result<StatisticalModel>;

    /// Rebuild the Derived tables from the Learned ones
    ///
    /// On error the model is left exactly as it was.
    fn derive(&self, model: &mut StatisticalModel) -> Result<()>;

    /// Build the scoring functor of one request
    fn select_functor(
        &self,
        input: &Table,
        model: &StatisticalModel,
        request: &Request,
    ) -> FunctorOutcome;

    /// Score every input row, appending `<Metric>(<cols>)` columns to `output`
    ///
    /// Returns the number of requests that were assessed.
    fn assess(&self, input: &Table, model: &StatisticalModel, output: &mut Table) -> Result<usize> {
        let mut assessed = 0;
        for request in self.requests() {
            let functor = match self.select_functor(input, model, request) {
                FunctorOutcome::Built(functor) => functor,
                FunctorOutcome::NoFunctor(reason) => {
                    warn!(
                        engine = self.name(),
                        request = %request.label(),
                        %reason,
                        "no assess functor, skipping request"
                    );
                    continue;
                }
            };
            let columns = match functor.apply(input) {
                Ok(columns) => columns,
                Err(err) => {
                    warn!(engine = self.name(), request = %request.label(), error = %err, "cannot assess request");
                    continue;
                }
            };
            let names = &self.common().assess_names;
            let inputs = functor.columns();
            for (i, (metric, column)) in functor.metric_names().into_iter().zip(columns).enumerate() {
                let metric = names.get(i).cloned().unwrap_or(metric);
                output.add_column(assess_column_name(&metric, &inputs), column)?;
            }
            assessed += 1;
        }
        debug!(engine = self.name(), assessed, "assess finished");
        Ok(assessed)
    }

    /// Compute the test statistic of every request
    fn test(
        &self,
        input: &Table,
        model: &StatisticalModel,
        oracle: Option<&dyn PValueOracle>,
    ) -> Result<Table>;

    /// Merge independently learned models into one Learned model
    fn aggregate(&self, models: &[StatisticalModel]) -> Result<StatisticalModel>;

    /// Set a configuration value by name
    ///
    /// Invalid values are rejected and the previous configuration kept.
    fn set_parameter(&mut self, name: &str, value: &ParamValue) -> Result<()>;

    /// Current configuration, engine-specific values first
    fn parameters(&self) -> Vec<(String, ParamValue)>;

    /// Descriptor that rebuilds this engine through a registry
    fn descriptor(&self) -> Descriptor {
        Descriptor::new(self.name(), self.parameters())
    }
}

/// Columns of `request` the engine uses
///
/// Extra columns beyond `arity` are ignored with a diagnostic; a request
/// shorter than a fixed arity above 1 is rejected.
pub fn request_columns<'a>(engine: &str, arity: usize, request: &'a Request) -> Option<&'a [String]> {
    let columns = request.columns();
    if arity == 0 {
        return (!columns.is_empty()).then_some(columns);
    }
    if columns.len() < arity {
        warn!(
            engine,
            request = %request.label(),
            needed = arity,
            "request has too few columns, skipping"
        );
        return None;
    }
    if columns.len() > arity {
        warn!(
            engine,
            request = %request.label(),
            used = arity,
            "ignoring columns beyond the engine arity"
        );
    }
    Some(&columns[..arity])
}

/// Report a request-local error and decide whether the phase may go on
///
/// Request-local errors are logged and swallowed; the rest are returned.
pub fn skip_request(engine: &str, phase: &str, request: &str, err: Error) -> Result<()> {
    if err.is_request_local() {
        warn!(engine, phase, request, error = %err, "skipping request");
        Ok(())
    } else {
        Err(err)
    }
}

/// The same-named Learned table of every model, or an inconsistency error
pub fn learned_tables<'a>(models: &'a [StatisticalModel], name: &str) -> Result<Vec<&'a Table>> {
    models
        .iter()
        .enumerate()
        .map(|(i, m)| {
            m.learned(name)
                .ok_or_else(|| Error::inconsistent(format!("model {i} has no table {name}")))
        })
        .collect()
}

/// Check that every table carries identical values in the key columns
pub fn check_same_keys(tables: &[&Table], keys: &[&str], context: &str) -> Result<()> {
    let Some((first, rest)) = tables.split_first() else {
        return Ok(());
    };
    for (i, table) in rest.iter().enumerate() {
        if table.num_rows() != first.num_rows() {
            return Err(Error::inconsistent(format!(
                "{context}: model {} has {} rows, expected {}",
                i + 1,
                table.num_rows(),
                first.num_rows()
            )));
        }
        for key in keys {
            if table.column(key) != first.column(key) {
                return Err(Error::inconsistent(format!(
                    "{context}: model {} differs in column {key}",
                    i + 1
                )));
            }
        }
    }
    Ok(())
}

/// Refuse to aggregate an empty list or models of another algorithm
pub fn check_aggregate_input(engine: &str, models: &[StatisticalModel]) -> Result<()> {
    if models.is_empty() {
        return Err(Error::InsufficientData {
            expected: 1,
            actual: 0,
        });
    }
    if let Some(other) = models.iter().find(|m| m.algorithm() != engine) {
        return Err(Error::inconsistent(format!(
            "cannot aggregate a {} model with {engine}",
            other.algorithm()
        )));
    }
    Ok(())
}
