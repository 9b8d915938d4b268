//! Penalized least squares smoothing.
//!
//! This is the same solver as [`crate::baseline`] with a near-symmetric weighting,
//! so the curve follows the signal instead of its floor. There is no outlier clipping
//! and no clamping, the smoothed curve may dip below the original minimum.
use log::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::batch::{BatchResult, Cancellation, ColumnTransform};
use crate::signal::IntensityMatrix;
use crate::solver::PenalizedLeastSquares;

/// Parameters for [`smooth`]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SmoothConfig {
    /// The weight of the roughness penalty, typically between 0.1 and 1e4
    pub smoothness: f64,
    /// The weight given to points above the curve
    pub asymmetry: f64,
    /// The maximum number of reweighting iterations
    pub iterations: usize,
    /// The mean weight change at which to stop early
    pub convergence: f64,
}

impl Default for SmoothConfig {
    fn default() -> Self {
        Self {
            smoothness: 0.5,
            asymmetry: 0.5,
            iterations: 5,
            convergence: 1e-4,
        }
    }
}

impl SmoothConfig {
    pub fn smoothness(mut self, smoothness: f64) -> Self {
        self.smoothness = smoothness;
        self
    }

    pub fn asymmetry(mut self, asymmetry: f64) -> Self {
        self.asymmetry = asymmetry;
        self
    }

    pub fn iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn convergence(mut self, convergence: f64) -> Self {
        self.convergence = convergence;
        self
    }

    pub fn solver(&self) -> PenalizedLeastSquares {
        PenalizedLeastSquares::new(
            self.smoothness,
            self.asymmetry,
            self.iterations,
            self.convergence,
        )
    }
}

/// Smooth a single intensity column. Degenerate columns smooth to zero.
pub fn smooth_column(y: &[f64], config: &SmoothConfig) -> Vec<f64> {
    match config.solver().fit(y) {
        Ok(fit) => fit.z,
        Err(err) => {
            debug!("Smoothing failed, using a zero curve: {err}");
            vec![0.0; y.len()]
        }
    }
}

impl ColumnTransform for SmoothConfig {
    fn transform_column(&self, column: &[f64]) -> Vec<f64> {
        smooth_column(column, self)
    }
}

/// Smooth every column of `y`, returning a matrix of the same shape
pub fn smooth(y: &IntensityMatrix, config: &SmoothConfig) -> IntensityMatrix {
    config.transform(y)
}

/// Smooth every column of `y`, stopping early if `cancel` is triggered
pub fn smooth_cancellable(
    y: &IntensityMatrix,
    config: &SmoothConfig,
    cancel: &Cancellation,
) -> BatchResult<Vec<f64>> {
    config.transform_cancellable(y, Some(cancel))
}
