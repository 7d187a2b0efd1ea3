//! # Highest density region statistics
//!
//! A bivariate Gaussian kernel density estimate. Nothing is reduced during
//! Learn: the raw observation pairs are kept and every density is a full
//! kernel sum over them, so Learn and Assess are both quadratic in the
//! number of observations.

pub mod hdr;

pub use hdr::{HdrConfig, HdrStatistics};
