//! Engine registry
//!
//! The registry is an ordinary value owned by the composing application. It
//! maps algorithm names to constructors and rebuilds a configured engine
//! from descriptor text such as `order(number_of_intervals=10)`.

use stat_cluster::KMeansStatistics;
use stat_contingency::ContingencyStatistics;
use stat_core::descriptor::Descriptor;
use stat_core::{Error, Result, StatisticsEngine};
use stat_density::HdrStatistics;
use stat_moments::{CorrelativeStatistics, DescriptiveStatistics, MultiCorrelativeStatistics};
use stat_order::OrderStatistics;
use std::collections::BTreeMap;
use tracing::debug;

pub type EngineConstructor = fn() -> Box<dyn StatisticsEngine>;

fn construct<E>() -> Box<dyn StatisticsEngine>
where
    E: StatisticsEngine + Default + 'static,
{
    Box::new(E::default())
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    constructors: BTreeMap<String, EngineConstructor>,
}

impl Registry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the seven built-in engines
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(stat_moments::descriptive::NAME, construct::<DescriptiveStatistics>);
        registry.register(stat_moments::correlative::NAME, construct::<CorrelativeStatistics>);
        registry.register(
            stat_moments::multicorrelative::NAME,
            construct::<MultiCorrelativeStatistics>,
        );
        registry.register(stat_order::order::NAME, construct::<OrderStatistics>);
        registry.register(
            stat_contingency::contingency::NAME,
            construct::<ContingencyStatistics>,
        );
        registry.register(stat_density::hdr::NAME, construct::<HdrStatistics>);
        registry.register(stat_cluster::kmeans::NAME, construct::<KMeansStatistics>);
        registry
    }

    /// Add or replace a constructor; returns the one it replaced
    pub fn register(
        &mut self,
        name: impl Into<String>,
        constructor: EngineConstructor,
    ) -> Option<EngineConstructor> {
        self.constructors.insert(name.into(), constructor)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// A default-configured engine
    pub fn create(&self, name: &str) -> Result<Box<dyn StatisticsEngine>> {
        self.constructors
            .get(name)
            .map(|constructor| constructor())
            .ok_or_else(|| Error::UnknownAlgorithm(name.to_string()))
    }

    /// An engine configured by a parsed descriptor
    pub fn build_from(&self, descriptor: &Descriptor) -> Result<Box<dyn StatisticsEngine>> {
        let mut engine = self.create(&descriptor.algorithm)?;
        for (name, value) in &descriptor.parameters {
            engine.set_parameter(name, value)?;
        }
        debug!(
            algorithm = %descriptor.algorithm,
            parameters = descriptor.parameters.len(),
            "built engine from descriptor"
        );
        Ok(engine)
    }

    /// Parse `algorithm(name=value,...)` and build the engine it describes
    pub fn build(&self, descriptor: &str) -> Result<Box<dyn StatisticsEngine>> {
        self.build_from(&descriptor.parse()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stat_core::descriptor::ParamValue;

    #[test]
    fn test_builtins() {
        let registry = Registry::with_builtins();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec![
                "contingency",
                "correlative",
                "descriptive",
                "hdr",
                "kmeans",
                "multicorrelative",
                "order"
            ]
        );
        for name in registry.names() {
            assert_eq!(registry.create(name).unwrap().name(), name);
        }
    }

    #[test]
    fn test_build_applies_parameters() {
        let registry = Registry::with_builtins();
        let engine = registry
            .build("order(number_of_intervals=10,quantile_definition='InverseCDFAveragedSteps',requests=((x),(y)))")
            .unwrap();
        let params = engine.parameters();
        assert_eq!(params[0], ("number_of_intervals".to_string(), ParamValue::Integer(10)));
        assert_eq!(engine.requests().len(), 2);
    }

    #[test]
    fn test_descriptor_round_trip() {
        let registry = Registry::with_builtins();
        let engine = registry.build("kmeans(k=4,tolerance=0.5,skip_mask=3)").unwrap();
        let text = engine.descriptor().to_string();
        let rebuilt = registry.build(&text).unwrap();
        assert_eq!(rebuilt.parameters(), engine.parameters());
    }

    #[test]
    fn test_errors() {
        let registry = Registry::with_builtins();
        assert!(matches!(registry.build("pca()"), Err(Error::UnknownAlgorithm(_))));
        assert!(matches!(
            registry.build("order(number_of_intervals=0)"),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            registry.build("order(number_of_intervals=4"),
            Err(Error::Parse { .. })
        ));
        assert!(Registry::new().create("order").is_err());
    }
}
