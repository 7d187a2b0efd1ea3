//! One-pass moment accumulators
//!
//! Welford-style updates keep the running mean and the central power sums
//! `M2`, `M3`, `M4` about it, which avoids the cancellation of naive sums of
//! powers on large-magnitude data. Partial accumulators combine with the
//! pairwise formulas of Chan and Pébay, so chunked learning gives the same
//! result as a single pass.

use num_traits::{Float, FromPrimitive};

#[inline]
fn lit<T: Float + FromPrimitive>(v: f64) -> T {
    T::from_f64(v).unwrap_or_else(T::nan)
}

#[inline]
fn count<T: Float + FromPrimitive>(n: u64) -> T {
    T::from_u64(n).unwrap_or_else(T::nan)
}

/// Univariate cardinality, extrema, mean and central power sums
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Moments<T: Float = f64> {
    n: u64,
    min: T,
    max: T,
    mean: T,
    m2: T,
    m3: T,
    m4: T,
}

impl<T: Float + FromPrimitive> Default for Moments<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Float + FromPrimitive> Moments<T> {
    pub fn new() -> Self {
        Self {
            n: 0,
            min: T::nan(),
            max: T::nan(),
            mean: T::zero(),
            m2: T::zero(),
            m3: T::zero(),
            m4: T::zero(),
        }
    }

    /// Rebuild an accumulator from stored sufficient statistics
    pub fn from_parts(n: u64, min: T, max: T, mean: T, m2: T, m3: T, m4: T) -> Self {
        if n == 0 {
            return Self::new();
        }
        Self {
            n,
            min,
            max,
            mean,
            m2,
            m3,
            m4,
        }
    }

    /// Add one observation
    pub fn push(&mut self, x: T) {
        if self.n == 0 || x < self.min {
            self.min = x;
        }
        if self.n == 0 || x > self.max {
            self.max = x;
        }

        let n1: T = count(self.n);
        self.n += 1;
        let n: T = count(self.n);
        let delta = x - self.mean;
        let dn = delta / n;
        let dn2 = dn * dn;
        let term1 = delta * dn * n1;

        self.mean = self.mean + dn;
        self.m4 = self.m4
            + term1 * dn2 * (n * n - lit::<T>(3.0) * n + lit(3.0))
            + lit::<T>(6.0) * dn2 * self.m2
            - lit::<T>(4.0) * dn * self.m3;
        self.m3 = self.m3 + term1 * dn * (n - lit(2.0)) - lit::<T>(3.0) * dn * self.m2;
        self.m2 = self.m2 + term1;
    }

    /// Combine two partial accumulators
    pub fn merge(&self, other: &Self) -> Self {
        if self.n == 0 {
            return *other;
        }
        if other.n == 0 {
            return *self;
        }
        let na: T = count(self.n);
        let nb: T = count(other.n);
        let n = na + nb;
        let delta = other.mean - self.mean;
        let d2 = delta * delta;
        let d3 = d2 * delta;
        let d4 = d2 * d2;
        let three: T = lit(3.0);
        let four: T = lit(4.0);
        let six: T = lit(6.0);

        let mean = self.mean + delta * nb / n;
        let m2 = self.m2 + other.m2 + d2 * na * nb / n;
        let m3 = self.m3
            + other.m3
            + d3 * na * nb * (na - nb) / (n * n)
            + three * delta * (na * other.m2 - nb * self.m2) / n;
        let m4 = self.m4
            + other.m4
            + d4 * na * nb * (na * na - na * nb + nb * nb) / (n * n * n)
            + six * d2 * (na * na * other.m2 + nb * nb * self.m2) / (n * n)
            + four * delta * (na * other.m3 - nb * self.m3) / n;

        Self {
            n: self.n + other.n,
            min: self.min.min(other.min),
            max: self.max.max(other.max),
            mean,
            m2,
            m3,
            m4,
        }
    }

    pub fn cardinality(&self) -> u64 {
        self.n
    }

    pub fn min(&self) -> T {
        self.min
    }

    pub fn max(&self) -> T {
        self.max
    }

    /// Running mean, NaN before the first observation
    pub fn mean(&self) -> T {
        if self.n == 0 {
            T::nan()
        } else {
            self.mean
        }
    }

    pub fn m2(&self) -> T {
        self.m2
    }

    pub fn m3(&self) -> T {
        self.m3
    }

    pub fn m4(&self) -> T {
        self.m4
    }
}

impl<T: Float + FromPrimitive> Extend<T> for Moments<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for x in iter {
            self.push(x);
        }
    }
}

impl<T: Float + FromPrimitive> FromIterator<T> for Moments<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut m = Self::new();
        m.extend(iter);
        m
    }
}

/// Bivariate cardinality, means and co-moments
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoMoments<T: Float = f64> {
    n: u64,
    mean_x: T,
    mean_y: T,
    m2_x: T,
    m2_y: T,
    m_xy: T,
}

impl<T: Float + FromPrimitive> Default for CoMoments<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Float + FromPrimitive> CoMoments<T> {
    pub fn new() -> Self {
        Self {
            n: 0,
            mean_x: T::zero(),
            mean_y: T::zero(),
            m2_x: T::zero(),
            m2_y: T::zero(),
            m_xy: T::zero(),
        }
    }

    pub fn from_parts(n: u64, mean_x: T, mean_y: T, m2_x: T, m2_y: T, m_xy: T) -> Self {
        if n == 0 {
            return Self::new();
        }
        Self {
            n,
            mean_x,
            mean_y,
            m2_x,
            m2_y,
            m_xy,
        }
    }

    /// Add one observation pair
    pub fn push(&mut self, x: T, y: T) {
        self.n += 1;
        let n: T = count(self.n);
        let dx = x - self.mean_x;
        let dy = y - self.mean_y;
        self.mean_x = self.mean_x + dx / n;
        self.mean_y = self.mean_y + dy / n;
        self.m2_x = self.m2_x + dx * (x - self.mean_x);
        self.m2_y = self.m2_y + dy * (y - self.mean_y);
        self.m_xy = self.m_xy + dx * (y - self.mean_y);
    }

    /// Combine two partial accumulators
    pub fn merge(&self, other: &Self) -> Self {
        if self.n == 0 {
            return *other;
        }
        if other.n == 0 {
            return *self;
        }
        let na: T = count(self.n);
        let nb: T = count(other.n);
        let n = na + nb;
        let dx = other.mean_x - self.mean_x;
        let dy = other.mean_y - self.mean_y;
        let weight = na * nb / n;
        Self {
            n: self.n + other.n,
            mean_x: self.mean_x + dx * nb / n,
            mean_y: self.mean_y + dy * nb / n,
            m2_x: self.m2_x + other.m2_x + dx * dx * weight,
            m2_y: self.m2_y + other.m2_y + dy * dy * weight,
            m_xy: self.m_xy + other.m_xy + dx * dy * weight,
        }
    }

    pub fn cardinality(&self) -> u64 {
        self.n
    }

    pub fn mean_x(&self) -> T {
        if self.n == 0 {
            T::nan()
        } else {
            self.mean_x
        }
    }

    pub fn mean_y(&self) -> T {
        if self.n == 0 {
            T::nan()
        } else {
            self.mean_y
        }
    }

    pub fn m2_x(&self) -> T {
        self.m2_x
    }

    pub fn m2_y(&self) -> T {
        self.m2_y
    }

    pub fn m_xy(&self) -> T {
        self.m_xy
    }
}
