//! # KMeans clustering
//!
//! Lloyd's algorithm over any number of numeric columns. Several runs, each
//! with its own K and seed centres, can be fitted in one Learn; Derive ranks
//! them by total within-cluster error.

pub mod kmeans;
pub mod lloyd;

pub use kmeans::{KMeansConfig, KMeansStatistics};
pub use lloyd::{lloyd, FittedRun};
