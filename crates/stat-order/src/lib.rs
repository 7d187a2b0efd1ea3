//! # Order statistics
//!
//! Value histograms over any ordered column type, quantile extraction with
//! the nearest-rank and averaged-steps conventions, quantile bucketing and
//! the one-sample Kolmogorov-Smirnov test against the learned cut points.

pub mod histogram;
pub mod order;

pub use histogram::{QuantileDefinition, ValueHistogram};
pub use order::{OrderConfig, OrderStatistics};
