//! Phase orchestration for one engine
//!
//! [`StatisticsPipeline::update`] runs Learn, Derive, Assess and Test in that
//! order, each only when enabled. The model is owned by the pipeline call and
//! handed back in the [`PipelineOutput`].

use crate::combinations::expand_requests;
use crate::sampling::training_subset;
use bitflags::bitflags;
use stat_core::model::StatisticalModel;
use stat_core::oracle::PValueOracle;
use stat_core::table::Table;
use stat_core::{Error, Result, StatisticsEngine};
use tracing::{debug, instrument, warn};

bitflags! {
    /// Phases run by [`StatisticsPipeline::update`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PhaseFlags: u8 {
        const LEARN = 0x01;
        const DERIVE = 0x02;
        const ASSESS = 0x04;
        const TEST = 0x08;
    }
}

impl Default for PhaseFlags {
    fn default() -> Self {
        PhaseFlags::LEARN | PhaseFlags::DERIVE
    }
}

/// Everything one update produced; phases that did not run leave `None`
#[derive(Debug, Clone, Default)]
pub struct PipelineOutput {
    pub model: Option<StatisticalModel>,
    /// The input table with the Assess columns appended
    pub assessed: Option<Table>,
    pub test: Option<Table>,
}

/// Drives one engine through its phases
pub struct StatisticsPipeline {
    engine: Box<dyn StatisticsEngine>,
    phases: PhaseFlags,
    oracle: Option<Box<dyn PValueOracle>>,
    training_fraction: f64,
    seed: u64,
    learn_parameters: Option<Table>,
}

impl StatisticsPipeline {
    pub fn new(engine: Box<dyn StatisticsEngine>) -> Self {
        Self {
            engine,
            phases: PhaseFlags::default(),
            oracle: None,
            training_fraction: 1.0,
            seed: 0,
            learn_parameters: None,
        }
    }

    pub fn with_phases(mut self, phases: PhaseFlags) -> Self {
        self.phases = phases;
        self
    }

    pub fn with_oracle(mut self, oracle: impl PValueOracle + 'static) -> Self {
        self.oracle = Some(Box::new(oracle));
        self
    }

    /// Seed of the training sample
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn engine(&self) -> &dyn StatisticsEngine {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> &mut dyn StatisticsEngine {
        self.engine.as_mut()
    }

    pub fn phases(&self) -> PhaseFlags {
        self.phases
    }

    pub fn set_phases(&mut self, phases: PhaseFlags) {
        self.phases = phases;
    }

    pub fn training_fraction(&self) -> f64 {
        self.training_fraction
    }

    /// Fraction of the live rows Learn sees, in `(0, 1]`
    pub fn set_training_fraction(&mut self, fraction: f64) -> Result<()> {
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(Error::InvalidParameter(format!(
                "training fraction must lie in (0, 1], got {fraction}"
            )));
        }
        self.training_fraction = fraction;
        Ok(())
    }

    /// Parameter table handed to every Learn, such as KMeans seed centres
    pub fn set_learn_parameters(&mut self, parameters: Option<Table>) {
        self.learn_parameters = parameters;
    }

    fn prepare_requests(&mut self) {
        let arity = self.engine.max_request_arity();
        let expanded = expand_requests(self.engine.requests_mut(), arity);
        if expanded > 0 {
            debug!(engine = self.engine.name(), expanded, "expanded oversized requests");
        }
    }

    /// Run the enabled phases
    ///
    /// A supplied `model` replaces Learn. Derive always follows a Learn done
    /// here. Without input nothing runs and the output is empty.
    #[instrument(skip_all, fields(engine = self.engine.name()))]
    pub fn update(
        &mut self,
        input: Option<&Table>,
        model: Option<StatisticalModel>,
    ) -> Result<PipelineOutput> {
        let Some(input) = input else {
            warn!(engine = self.engine.name(), "no input table, nothing to update");
            return Ok(PipelineOutput::default());
        };
        self.prepare_requests();
        let engine = self.engine.as_ref();

        let (mut model, learned) = match model {
            Some(model) => (model, false),
            None if self.phases.contains(PhaseFlags::LEARN) => {
                let training = training_subset(
                    input,
                    engine.ghost_skip_mask(),
                    self.training_fraction,
                    self.seed,
                );
                (engine.learn(&training, self.learn_parameters.as_ref())?, true)
            }
            None => {
                warn!(engine = engine.name(), "learn is disabled and no model was supplied");
                return Ok(PipelineOutput::default());
            }
        };
        if learned || self.phases.contains(PhaseFlags::DERIVE) {
            engine.derive(&mut model)?;
        }

        let assessed = if self.phases.contains(PhaseFlags::ASSESS) {
            let mut output = input.clone();
            engine.assess(input, &model, &mut output)?;
            Some(output)
        } else {
            None
        };
        let test = if self.phases.contains(PhaseFlags::TEST) {
            Some(engine.test(input, &model, self.oracle.as_deref())?)
        } else {
            None
        };
        Ok(PipelineOutput {
            model: Some(model),
            assessed,
            test,
        })
    }

    /// Learn on contiguous chunks of `chunk_rows` rows, then aggregate and derive
    ///
    /// Every live row is used; the training fraction does not apply. With the
    /// `parallel` feature the chunks are learned on the rayon pool.
    #[instrument(skip_all, fields(engine = self.engine.name(), chunk_rows = chunk_rows))]
    pub fn learn_chunked(&mut self, input: &Table, chunk_rows: usize) -> Result<StatisticalModel> {
        if chunk_rows == 0 {
            return Err(Error::InvalidParameter(
                "chunk_rows must be positive".to_string(),
            ));
        }
        self.prepare_requests();
        let engine = self.engine.as_ref();
        let parameters = self.learn_parameters.as_ref();
        let chunks: Vec<Table> = (0..input.num_rows().max(1))
            .step_by(chunk_rows)
            .map(|start| input.slice_rows(start, start + chunk_rows))
            .collect();

        #[cfg(feature = "parallel")]
        let models = {
            use rayon::prelude::*;
            chunks
                .par_iter()
                .map(|chunk| engine.learn(chunk, parameters))
                .collect::<Result<Vec<_>>>()?
        };
        #[cfg(not(feature = "parallel"))]
        let models = chunks
            .iter()
            .map(|chunk| engine.learn(chunk, parameters))
            .collect::<Result<Vec<_>>>()?;

        debug!(chunks = models.len(), "learned chunks");
        let mut model = engine.aggregate(&models)?;
        engine.derive(&mut model)?;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use stat_core::table::Column;
    use stat_core::StatrsOracle;
    use stat_moments::{CorrelativeStatistics, DescriptiveStatistics};

    fn descriptive(columns: &[&str]) -> StatisticsPipeline {
        let mut engine = DescriptiveStatistics::new();
        for c in columns {
            engine.add_column(c);
        }
        StatisticsPipeline::new(Box::new(engine))
    }

    fn ramp(n: i64) -> Table {
        Table::new()
            .with_column("x", Column::Integer((0..n).collect()))
            .unwrap()
            .with_column("y", Column::Real((0..n).map(|v| (v * v) as f64).collect()))
            .unwrap()
    }

    fn cardinality(model: &StatisticalModel) -> i64 {
        model
            .learned("Primary Statistics")
            .unwrap()
            .integers("Cardinality")
            .unwrap()[0]
    }

    #[test]
    fn test_update_without_input() {
        let mut pipeline = descriptive(&["x"]);
        let output = pipeline.update(None, None).unwrap();
        assert!(output.model.is_none());
        assert!(output.assessed.is_none());
    }

    #[test]
    fn test_all_phases() {
        let mut pipeline = descriptive(&["x"])
            .with_phases(PhaseFlags::all())
            .with_oracle(StatrsOracle);
        let input = ramp(10);
        let output = pipeline.update(Some(&input), None).unwrap();
        let model = output.model.unwrap();
        assert!(model.derived("Derived Statistics").is_some());
        let assessed = output.assessed.unwrap();
        assert_eq!(assessed.column_names(), &["x", "y", "d(x)"].map(String::from));
        let test = output.test.unwrap();
        let p = test.reals("P").unwrap()[0];
        assert!((0.0..=1.0).contains(&p));
    }

    #[test]
    fn test_supplied_model_skips_learn() {
        let mut pipeline = descriptive(&["x"]);
        let first = pipeline.update(Some(&ramp(10)), None).unwrap().model.unwrap();

        pipeline.set_phases(PhaseFlags::ASSESS);
        let output = pipeline.update(Some(&ramp(3)), Some(first)).unwrap();
        assert_eq!(cardinality(output.model.as_ref().unwrap()), 10);
        assert!(output.assessed.unwrap().has_column("d(x)"));

        assert!(pipeline.update(Some(&ramp(3)), None).unwrap().model.is_none());
    }

    #[test]
    fn test_training_fraction() {
        let mut pipeline = descriptive(&["x"]).with_seed(5);
        assert!(pipeline.set_training_fraction(0.0).is_err());
        assert!(pipeline.set_training_fraction(1.5).is_err());
        pipeline.set_training_fraction(0.25).unwrap();
        let output = pipeline.update(Some(&ramp(1000)), None).unwrap();
        assert_eq!(cardinality(output.model.as_ref().unwrap()), 250);

        // Small inputs keep at least 100 rows
        let output = pipeline.update(Some(&ramp(150)), None).unwrap();
        assert_eq!(cardinality(output.model.as_ref().unwrap()), 100);
    }

    #[test]
    fn test_oversized_requests_are_expanded() {
        let mut engine = CorrelativeStatistics::new();
        engine.requests_mut().add_request(stat_core::Request::new(["x", "y", "z"]));
        let mut pipeline = StatisticsPipeline::new(Box::new(engine));
        let input = ramp(5)
            .with_column("z", Column::Real(vec![1.0, 0.0, 1.0, 0.0, 1.0]))
            .unwrap();
        let model = pipeline.update(Some(&input), None).unwrap().model.unwrap();
        assert_eq!(pipeline.engine().requests().len(), 3);
        assert_eq!(model.learned("Primary Statistics").unwrap().num_rows(), 3);
    }

    #[test]
    fn test_chunked_learn_matches_single_pass() {
        let input = ramp(1003);
        let mut pipeline = descriptive(&["x", "y"]);
        assert!(pipeline.learn_chunked(&input, 0).is_err());
        let chunked = pipeline.learn_chunked(&input, 100).unwrap();
        let whole = pipeline.update(Some(&input), None).unwrap().model.unwrap();
        let a = chunked.derived("Derived Statistics").unwrap();
        let b = whole.derived("Derived Statistics").unwrap();
        for column in ["Variance", "Skewness", "Kurtosis"] {
            for (u, v) in a.reals(column).unwrap().iter().zip(b.reals(column).unwrap()) {
                assert_relative_eq!(*u, *v, epsilon = 1e-9, max_relative = 1e-9);
            }
        }
        assert_eq!(cardinality(&chunked), 1003);
    }
}
