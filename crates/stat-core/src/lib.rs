//! Core types for the statistics engines
//!
//! This crate provides everything the individual algorithm families share:
//! the columnar [`Table`] they read and write, the [`RequestSet`] naming what
//! to analyse, the [`StatisticalModel`] holding Learned and Derived tables,
//! the [`StatisticsEngine`] protocol itself, and the numeric helpers that more
//! than one engine needs.
//!
//! # Architecture Overview
//!
//! 1. **Data**: [`Datum`], [`Column`], [`Table`] with an optional ghost mask
//! 2. **Protocol**: Learn, Derive, Assess, Test and Aggregate on [`StatisticsEngine`]
//! 3. **Scoring**: the closed [`AssessFunctor`] sum type built per request
//! 4. **Configuration**: `algorithm(param=value,...)` [`Descriptor`]s
//!
//! # Example
//!
//! ```rust
//! use stat_core::{Column, RequestSet, Table};
//!
//! let table = Table::new()
//!     .with_column("Math", Column::Real(vec![18.0, 20.0, 16.0]))
//!     .unwrap()
//!     .with_column("French", Column::Real(vec![14.0, 12.0, 14.0]))
//!     .unwrap();
//!
//! let mut requests = RequestSet::new();
//! requests.add_column_pair("Math", "French");
//! assert!(!requests.add_column_pair("French", "Math"));
//! assert_eq!(table.num_rows(), 3);
//! ```

pub mod descriptor;
pub mod error;
pub mod functor;
pub mod math;
pub mod model;
mod nullable;
pub mod oracle;
pub mod request;
pub mod table;
pub mod traits;
pub mod value;

// Re-export core types
pub use error::{Error, Result};

pub use descriptor::{Descriptor, ParamValue};
pub use functor::{
    assess_column_name, AssessFunctor, CellProbabilities, ClusterRun, ContingencyFunctor,
    DensityFunctor, DeviationFunctor, FunctorOutcome, KMeansFunctor, MahalanobisFunctor,
    QuantileFunctor, RegressionFunctor,
};
pub use math::GaussianKernel2;
pub use model::{ModelPhase, ModelTable, StatisticalModel};
pub use oracle::{PValueOracle, StatrsOracle, INVALID_P_VALUE};
pub use request::{Request, RequestSet};
pub use table::{Column, GhostFlags, Table};
pub use traits::{EngineCommon, StatisticsEngine, DEFAULT_SKIP_MASK};
pub use value::{Datum, ValueKind};

/// Common imports for engine implementations
pub mod prelude {
    pub use crate::{
        Column, Datum, Error, FunctorOutcome, ModelPhase, PValueOracle, ParamValue, Request,
        RequestSet, Result, StatisticalModel, StatisticsEngine, Table, ValueKind,
    };
}
