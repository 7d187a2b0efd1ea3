//! Numeric helpers shared by the engines
//!
//! Cholesky factorisation, triangular inversion, the 2×2 symmetric eigen
//! problem, entropy terms and the bivariate Gaussian kernel. Degenerate input
//! never panics: it yields NaN entries that propagate to the affected
//! statistics only.

use crate::error::{Error, Result};
use nalgebra::{DMatrix, DVector, Matrix2, Vector2};
use std::f64::consts::PI;

/// Lower-triangular Cholesky factor of a symmetric matrix
///
/// Classic column-by-column algorithm:
/// `L(i,i) = sqrt(A(i,i) − Σ L(i,k)²)` and
/// `L(j,i) = (A(j,i) − Σ L(j,k)·L(i,k)) / L(i,i)` for `j > i`.
/// A non-positive pivot becomes NaN, so a singular matrix produces a factor
/// whose dependent entries are NaN.
pub fn cholesky_lower(a: &DMatrix<f64>) -> DMatrix<f64> {
    let n = a.nrows().min(a.ncols());
    let mut l = DMatrix::<f64>::zeros(n, n);
    for i in 0..n {
        let mut pivot = a[(i, i)];
        for k in 0..i {
            pivot -= l[(i, k)] * l[(i, k)];
        }
        l[(i, i)] = if pivot > 0.0 { pivot.sqrt() } else { f64::NAN };
        for j in (i + 1)..n {
            let mut s = a[(j, i)];
            for k in 0..i {
                s -= l[(j, k)] * l[(i, k)];
            }
            l[(j, i)] = s / l[(i, i)];
        }
    }
    l
}

/// Inverse of a lower-triangular matrix by forward substitution
pub fn invert_lower_triangular(l: &DMatrix<f64>) -> DMatrix<f64> {
    let n = l.nrows();
    let mut inv = DMatrix::<f64>::zeros(n, n);
    for i in 0..n {
        inv[(i, i)] = 1.0 / l[(i, i)];
        for j in 0..i {
            let mut s = 0.0;
            for k in j..i {
                s += l[(i, k)] * inv[(k, j)];
            }
            inv[(i, j)] = -s / l[(i, i)];
        }
    }
    inv
}

/// Squared Mahalanobis distance `‖L⁻¹·v‖²` of a centered vector
///
/// `inverse_factor` is the inverse of the Cholesky factor. Only its lower
/// triangle is read, row by row.
pub fn mahalanobis_squared(inverse_factor: &DMatrix<f64>, centered: &DVector<f64>) -> f64 {
    let n = inverse_factor.nrows();
    let mut total = 0.0;
    for i in 0..n {
        let mut z = 0.0;
        for j in 0..=i {
            z += inverse_factor[(i, j)] * centered[j];
        }
        total += z * z;
    }
    total
}

/// Eigen decomposition of the symmetric matrix `[[a, b], [b, c]]`
///
/// Returns the eigenvalues and the matrix whose columns are the matching
/// unit eigenvectors.
pub fn symmetric_eigen_2x2(a: f64, b: f64, c: f64) -> (Vector2<f64>, Matrix2<f64>) {
    let eigen = Matrix2::new(a, b, b, c).symmetric_eigen();
    (eigen.eigenvalues, eigen.eigenvectors)
}

/// Entropy contribution `−p·ln q`, zero when `p` is zero
pub fn entropy_term(p: f64, q: f64) -> f64 {
    if p > 0.0 {
        -p * q.ln()
    } else {
        0.0
    }
}

/// Bivariate Gaussian kernel with bandwidth (smoothing) matrix `H`
///
/// `K_H(v) = exp(−½·vᵗH⁻¹v) / (2π·sqrt(det H))`. The inverse and determinant
/// are computed once at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianKernel2 {
    smoothing: Matrix2<f64>,
    inverse: Matrix2<f64>,
    determinant: f64,
}

impl Default for GaussianKernel2 {
    /// Unit bandwidth, `H = I`
    fn default() -> Self {
        Self {
            smoothing: Matrix2::identity(),
            inverse: Matrix2::identity(),
            determinant: 1.0,
        }
    }
}

impl GaussianKernel2 {
    /// Kernel with `H = σ²·I`
    pub fn isotropic(sigma: f64) -> Result<Self> {
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "sigma must be positive and finite, got {sigma}"
            )));
        }
        let s2 = sigma * sigma;
        Self::new(Matrix2::new(s2, 0.0, 0.0, s2))
    }

    /// Kernel with an explicit smoothing matrix
    ///
    /// The matrix must be symmetric positive definite.
    pub fn new(smoothing: Matrix2<f64>) -> Result<Self> {
        if smoothing.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidParameter(
                "smoothing matrix has non-finite entries".to_string(),
            ));
        }
        let scale = smoothing.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        if (smoothing[(0, 1)] - smoothing[(1, 0)]).abs() > f64::EPSILON * scale {
            return Err(Error::InvalidParameter(
                "smoothing matrix must be symmetric".to_string(),
            ));
        }
        let determinant = smoothing.determinant();
        if smoothing[(0, 0)] <= 0.0 || determinant <= 0.0 {
            return Err(Error::InvalidParameter(
                "smoothing matrix must be positive definite".to_string(),
            ));
        }
        let inverse = smoothing.try_inverse().ok_or_else(|| {
            Error::InvalidParameter("smoothing matrix is not invertible".to_string())
        })?;
        Ok(Self {
            smoothing,
            inverse,
            determinant,
        })
    }

    pub fn smoothing(&self) -> &Matrix2<f64> {
        &self.smoothing
    }

    pub fn determinant(&self) -> f64 {
        self.determinant
    }

    /// Kernel value at the offset `(dx, dy)`
    pub fn evaluate(&self, dx: f64, dy: f64) -> f64 {
        let v = Vector2::new(dx, dy);
        let q = v.dot(&(self.inverse * v));
        (-0.5 * q).exp() / (2.0 * PI * self.determinant.sqrt())
    }

    /// Density `(1/n)·Σ K_H(p − o)` of the observations at point `p`
    pub fn density(&self, point: [f64; 2], observations: &[[f64; 2]]) -> f64 {
        if observations.is_empty() {
            return f64::NAN;
        }
        let sum: f64 = observations
            .iter()
            .map(|o| self.evaluate(point[0] - o[0], point[1] - o[1]))
            .sum();
        sum / observations.len() as f64
    }
}
