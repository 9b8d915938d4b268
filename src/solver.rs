//! Iteratively reweighted penalized least squares, the engine behind both
//! [`baseline`](crate::baseline) and [`smooth`](crate::smooth).
//!
//! Each iteration solves
//!
//! ```math
//! (W + s D^\top D) z = W y
//! ```
//!
//! where $`D`$ is the second-difference operator and $`W`$ is a diagonal weight matrix.
//! $`D^\top D`$ is pentadiagonal, so the system is factored with a banded Cholesky
//! decomposition in linear time instead of dense linear algebra.
use log::{debug, trace};
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The minimum number of points needed to form a second difference penalty
pub const MINIMUM_POINTS: usize = 4;

const ASYMMETRY_BOUNDS: (f64, f64) = (1e-9, 1.0 - 1e-9);
const SMOOTHNESS_BOUNDS: (f64, f64) = (1e-9, 1e15);

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SolverError {
    #[error("At least 4 points are required, received {0}")]
    TooFewPoints(usize),
    #[error("The penalized system is not positive definite at row {0}")]
    FactorizationFailed(usize),
}

/// A symmetric matrix with two off-diagonals, stored by band
#[derive(Debug, Clone, PartialEq)]
pub struct PentadiagonalMatrix {
    pub diagonal: Vec<f64>,
    pub upper1: Vec<f64>,
    pub upper2: Vec<f64>,
}

impl PentadiagonalMatrix {
    /// Create $`D^\top D`$ for the second-difference operator over `n` points, scaled by `scale`
    pub fn second_difference_penalty(n: usize, scale: f64) -> Self {
        let mut diagonal = vec![0.0; n];
        let mut upper1 = vec![0.0; n.saturating_sub(1)];
        let mut upper2 = vec![0.0; n.saturating_sub(2)];
        const STENCIL: [f64; 3] = [1.0, -2.0, 1.0];
        for k in 0..n.saturating_sub(2) {
            for p in 0..3 {
                diagonal[k + p] += scale * STENCIL[p] * STENCIL[p];
                if p < 2 {
                    upper1[k + p] += scale * STENCIL[p] * STENCIL[p + 1];
                }
            }
            upper2[k] += scale * STENCIL[0] * STENCIL[2];
        }
        Self {
            diagonal,
            upper1,
            upper2,
        }
    }

    pub fn len(&self) -> usize {
        self.diagonal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagonal.is_empty()
    }

    /// Compute `self * x`
    pub fn dot(&self, x: &[f64]) -> Vec<f64> {
        let n = self.len();
        (0..n)
            .map(|i| {
                let mut acc = self.diagonal[i] * x[i];
                if i + 1 < n {
                    acc += self.upper1[i] * x[i + 1];
                }
                if i + 2 < n {
                    acc += self.upper2[i] * x[i + 2];
                }
                if i >= 1 {
                    acc += self.upper1[i - 1] * x[i - 1];
                }
                if i >= 2 {
                    acc += self.upper2[i - 2] * x[i - 2];
                }
                acc
            })
            .collect()
    }

    /// Factor the matrix after adding `weights` to the diagonal
    pub fn factor_with_diagonal(&self, weights: &[f64]) -> Result<BandedCholesky, SolverError> {
        let n = self.len();
        let mut l0 = vec![0.0; n];
        let mut l1 = vec![0.0; n];
        let mut l2 = vec![0.0; n];
        for i in 0..n {
            if i >= 2 {
                l2[i] = self.upper2[i - 2] / l0[i - 2];
            }
            if i >= 1 {
                l1[i] = (self.upper1[i - 1] - l2[i] * l1[i - 1]) / l0[i - 1];
            }
            let pivot = self.diagonal[i] + weights[i] - l1[i].powi(2) - l2[i].powi(2);
            if !(pivot > 0.0) || !pivot.is_finite() {
                return Err(SolverError::FactorizationFailed(i));
            }
            l0[i] = pivot.sqrt();
        }
        Ok(BandedCholesky { l0, l1, l2 })
    }
}

/// The lower-triangular Cholesky factor $`L`$ of a pentadiagonal matrix, stored by band
#[derive(Debug, Clone)]
pub struct BandedCholesky {
    l0: Vec<f64>,
    l1: Vec<f64>,
    l2: Vec<f64>,
}

impl BandedCholesky {
    /// Solve $`L L^\top z = b`$
    pub fn solve(&self, b: &[f64]) -> Vec<f64> {
        let n = self.l0.len();
        let mut u = vec![0.0; n];
        for i in 0..n {
            let mut acc = b[i];
            if i >= 1 {
                acc -= self.l1[i] * u[i - 1];
            }
            if i >= 2 {
                acc -= self.l2[i] * u[i - 2];
            }
            u[i] = acc / self.l0[i];
        }
        let mut z = vec![0.0; n];
        for i in (0..n).rev() {
            let mut acc = u[i];
            if i + 1 < n {
                acc -= self.l1[i + 1] * z[i + 1];
            }
            if i + 2 < n {
                acc -= self.l2[i + 2] * z[i + 2];
            }
            z[i] = acc / self.l0[i];
        }
        z
    }
}

/// The outcome of [`PenalizedLeastSquares::fit`]
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PenalizedFit {
    /// The fitted curve, one value per input point
    pub z: Vec<f64>,
    /// The weights derived from the final curve
    pub weights: Vec<f64>,
    /// The number of solves that succeeded
    pub iterations: usize,
    /// The mean absolute change in weights after each solve
    pub weight_changes: Vec<f64>,
    /// Whether the weight change fell below the convergence threshold
    pub converged: bool,
}

/// Asymmetric, iteratively reweighted penalized least squares.
///
/// Points above the current curve get weight `asymmetry`, points on or below it
/// get `1 - asymmetry`. A small asymmetry pulls the curve towards the lower envelope
/// of the signal, an asymmetry of 0.5 is a plain Whittaker smoother.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PenalizedLeastSquares {
    pub smoothness: f64,
    pub asymmetry: f64,
    pub iterations: usize,
    pub convergence: f64,
}

impl PenalizedLeastSquares {
    /// Create a solver, clamping each parameter into its usable range
    pub fn new(smoothness: f64, asymmetry: f64, iterations: usize, convergence: f64) -> Self {
        Self {
            smoothness: clamp_or(smoothness, SMOOTHNESS_BOUNDS, SMOOTHNESS_BOUNDS.1),
            asymmetry: clamp_or(asymmetry, ASYMMETRY_BOUNDS, 0.5),
            iterations: iterations.max(1),
            convergence: if convergence.is_finite() {
                convergence.max(0.0)
            } else {
                0.0
            },
        }
    }

    #[inline]
    fn reweight(&self, y: f64, z: f64) -> f64 {
        if y > z {
            self.asymmetry
        } else {
            1.0 - self.asymmetry
        }
    }

    /// Fit the penalized curve to `y`.
    ///
    /// An all-zero input short-circuits to an all-zero curve. If a factorization fails after
    /// at least one successful solve, the last successful curve is returned.
    pub fn fit(&self, y: &[f64]) -> Result<PenalizedFit, SolverError> {
        let n = y.len();
        if n < MINIMUM_POINTS {
            return Err(SolverError::TooFewPoints(n));
        }
        if y.iter().all(|v| *v == 0.0) {
            return Ok(PenalizedFit {
                z: vec![0.0; n],
                weights: vec![1.0; n],
                iterations: 0,
                weight_changes: Vec::new(),
                converged: true,
            });
        }

        let penalty = PentadiagonalMatrix::second_difference_penalty(n, self.smoothness);
        let mut weights = vec![1.0; n];
        let mut rhs = vec![0.0; n];
        let mut fit: Option<Vec<f64>> = None;
        let mut weight_changes = Vec::with_capacity(self.iterations);
        let mut converged = false;

        for it in 0..self.iterations {
            let decomp = match penalty.factor_with_diagonal(&weights) {
                Ok(decomp) => decomp,
                Err(err) => {
                    debug!("{it}: Aborting penalized least squares: {err}");
                    if fit.is_none() {
                        return Err(err);
                    }
                    break;
                }
            };
            rhs.iter_mut()
                .zip(weights.iter().zip(y))
                .for_each(|(r, (w, y))| *r = w * y);
            let z = decomp.solve(&rhs);

            let mut change = 0.0;
            for ((w, yi), zi) in weights.iter_mut().zip(y).zip(z.iter()) {
                let next = self.reweight(*yi, *zi);
                change += (next - *w).abs();
                *w = next;
            }
            change /= n as f64;
            trace!("{it}: Mean weight change = {change:0.3e}");
            weight_changes.push(change);
            fit = Some(z);

            if change < self.convergence {
                converged = true;
                break;
            }
        }

        Ok(PenalizedFit {
            iterations: weight_changes.len(),
            z: fit.unwrap_or_else(|| vec![0.0; n]),
            weights,
            weight_changes,
            converged,
        })
    }
}

fn clamp_or(value: f64, bounds: (f64, f64), fallback: f64) -> f64 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(bounds.0, bounds.1)
    }
}
