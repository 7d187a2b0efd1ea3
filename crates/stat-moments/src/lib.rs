//! # Moment-based statistics engines
//!
//! Streaming moment accumulators and the three engines built on them:
//!
//! - [`DescriptiveStatistics`]: univariate extrema, mean, variance, skewness
//!   and kurtosis, relative deviation scoring and the Jarque-Bera test
//! - [`CorrelativeStatistics`]: bivariate covariance, both regression lines,
//!   Pearson's r and the Jarque-Bera-Srivastava test
//! - [`MultiCorrelativeStatistics`]: N-variate covariance with a Cholesky
//!   factor per request and squared Mahalanobis distance scoring
//!
//! Learned tables store the running mean and central power sums, so models
//! learned on disjoint chunks merge exactly through `aggregate`.

pub mod accumulator;
pub mod correlative;
pub mod descriptive;
pub mod multicorrelative;

pub use accumulator::{CoMoments, Moments};
pub use correlative::CorrelativeStatistics;
pub use descriptive::{DescriptiveConfig, DescriptiveStatistics};
pub use multicorrelative::{MultiCorrelativeStatistics, SparseCovariance};
