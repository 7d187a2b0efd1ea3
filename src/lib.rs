//! Statistics engines over columnar tables
//!
//! Every engine follows the same protocol: Learn scans the input once and
//! produces a model of sufficient statistics, Derive turns it into readable
//! quantities, Assess scores each input row, Test computes goodness of fit,
//! and Aggregate merges models learned on disjoint inputs.
//!
//! | Engine | Crate | Requests |
//! |---|---|---|
//! | `descriptive` | [`moments`] | one column |
//! | `correlative` | [`moments`] | column pairs |
//! | `multicorrelative` | [`moments`] | any number of columns |
//! | `order` | [`order`] | one column |
//! | `contingency` | [`contingency`] | column pairs |
//! | `hdr` | [`density`] | column pairs |
//! | `kmeans` | [`cluster`] | any number of columns |
//!
//! # Example
//!
//! ```rust
//! use stat_engine::prelude::*;
//!
//! let input = Table::new()
//!     .with_column("x", Column::Real((1..=9).map(f64::from).collect()))
//!     .unwrap();
//!
//! let engine = Registry::with_builtins()
//!     .build("order(number_of_intervals=4,requests=((x)))")
//!     .unwrap();
//! let mut pipeline = StatisticsPipeline::new(engine);
//! let output = pipeline.update(Some(&input), None).unwrap();
//! assert!(output.model.is_some());
//! ```

pub use stat_cluster as cluster;
pub use stat_contingency as contingency;
pub use stat_density as density;
pub use stat_moments as moments;
pub use stat_order as order;
pub use stat_pipeline as pipeline;

pub use stat_core::{
    Column, Datum, Descriptor, Error, ParamValue, Request, RequestSet, Result, StatisticalModel,
    StatisticsEngine, Table,
};

pub use stat_cluster::KMeansStatistics;
pub use stat_contingency::ContingencyStatistics;
pub use stat_density::HdrStatistics;
pub use stat_moments::{CorrelativeStatistics, DescriptiveStatistics, MultiCorrelativeStatistics};
pub use stat_order::OrderStatistics;
pub use stat_pipeline::{PhaseFlags, PipelineOutput, Registry, StatisticsPipeline};

/// Everything needed to configure and run an engine
pub mod prelude {
    pub use stat_core::prelude::*;
    pub use stat_core::StatrsOracle;

    pub use crate::{
        ContingencyStatistics, CorrelativeStatistics, DescriptiveStatistics, HdrStatistics,
        KMeansStatistics, MultiCorrelativeStatistics, OrderStatistics, PhaseFlags, Registry,
        StatisticsPipeline,
    };
}
