//! # Contingency statistics
//!
//! Two-way joint counts over integer, real or text columns, with joint and
//! conditional probabilities, pointwise mutual information, the entropy
//! triple `H(X,Y)`, `H(Y|X)`, `H(X|Y)` and Pearson's chi-square test of
//! independence with and without the Yates correction.

pub mod cells;
pub mod contingency;

pub use cells::{specialize, ChiSquare, JointCounts};
pub use contingency::{ContingencyModel, ContingencyStatistics};
