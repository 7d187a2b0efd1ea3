//! P-value oracle
//!
//! Test phases compute their statistics without any distribution library and
//! hand the whole batch of statistics to an optional [`PValueOracle`]. Without
//! an oracle every p-value is [`INVALID_P_VALUE`].

use statrs::distribution::{ChiSquared, ContinuousCDF};

/// P-value written when no oracle is available
pub const INVALID_P_VALUE: f64 = -1.0;

/// Batch evaluator of survival functions
pub trait PValueOracle: Send + Sync {
    /// `P(X > stat)` for chi-square variables with the matching degrees of freedom
    fn chi_square_sf(&self, statistics: &[f64], dof: &[f64]) -> Vec<f64>;

    /// Survival function of the Kolmogorov distribution at `√n·D`
    fn kolmogorov_sf(&self, statistics: &[f64]) -> Vec<f64>;
}

/// Oracle backed by `statrs`
#[derive(Debug, Clone, Copy, Default)]
pub struct StatrsOracle;

impl PValueOracle for StatrsOracle {
    fn chi_square_sf(&self, statistics: &[f64], dof: &[f64]) -> Vec<f64> {
        statistics
            .iter()
            .zip(dof)
            .map(|(stat, d)| {
                if !stat.is_finite() {
                    return f64::NAN;
                }
                match ChiSquared::new(*d) {
                    Ok(dist) => 1.0 - dist.cdf(stat.max(0.0)),
                    Err(_) => f64::NAN,
                }
            })
            .collect()
    }

    fn kolmogorov_sf(&self, statistics: &[f64]) -> Vec<f64> {
        statistics.iter().map(|l| kolmogorov_survival(*l)).collect()
    }
}

/// `Q(λ) = 2·Σ (−1)^(k−1)·exp(−2k²λ²)`
///
/// The alternating series does not converge for small λ, where the survival
/// probability is 1 to machine precision.
pub fn kolmogorov_survival(lambda: f64) -> f64 {
    if !lambda.is_finite() {
        return f64::NAN;
    }
    if lambda < 0.2 {
        return 1.0;
    }
    let a2 = -2.0 * lambda * lambda;
    let mut sign = 2.0;
    let mut sum = 0.0;
    let mut previous_term = 0.0_f64;
    for k in 1..=100 {
        let kf = k as f64;
        let term = sign * (a2 * kf * kf).exp();
        sum += term;
        if term.abs() <= 1e-3 * previous_term || term.abs() <= 1e-8 * sum {
            return sum.clamp(0.0, 1.0);
        }
        sign = -sign;
        previous_term = term.abs();
    }
    1.0
}

/// Chi-square p-values through the oracle, or the invalid sentinel
pub fn chi_square_p_values(
    oracle: Option<&dyn PValueOracle>,
    statistics: &[f64],
    dof: &[f64],
) -> Vec<f64> {
    match oracle {
        Some(o) => o.chi_square_sf(statistics, dof),
        None => vec![INVALID_P_VALUE; statistics.len()],
    }
}

/// Kolmogorov p-values through the oracle, or the invalid sentinel
pub fn kolmogorov_p_values(oracle: Option<&dyn PValueOracle>, statistics: &[f64]) -> Vec<f64> {
    match oracle {
        Some(o) => o.kolmogorov_sf(statistics),
        None => vec![INVALID_P_VALUE; statistics.len()],
    }
}
