//! Asymmetric least squares baseline estimation.
//!
//! Uses [`PenalizedLeastSquares`] with a small asymmetry so points above the curve
//! barely count and the estimate settles onto the lower envelope of the signal.
use log::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::arrayops::mean_std;
use crate::batch::{BatchResult, Cancellation, ColumnTransform};
use crate::signal::IntensityMatrix;
use crate::solver::PenalizedLeastSquares;

/// Parameters for [`baseline`]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BaselineConfig {
    /// The weight of the roughness penalty, typically between 1e3 and 1e9
    pub smoothness: f64,
    /// The weight given to points above the baseline, between 0 and 1
    pub asymmetry: f64,
    /// The maximum number of reweighting iterations
    pub iterations: usize,
    /// The mean weight change at which to stop early
    pub convergence: f64,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            smoothness: 1e6,
            asymmetry: 1e-4,
            iterations: 10,
            convergence: 1e-4,
        }
    }
}

impl BaselineConfig {
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

    /// The clamped solver these parameters describe
    pub fn solver(&self) -> PenalizedLeastSquares {
        PenalizedLeastSquares::new(
            self.smoothness,
            self.asymmetry,
            self.iterations,
            self.convergence,
        )
    }
}

/// Clip values more than one standard deviation from the mean so isolated spikes
/// and dropouts don't drag the first solve around.
fn clip_outliers(y: &[f64]) -> Vec<f64> {
    let (mean, std) = mean_std(y);
    let (lower, upper) = (mean - std, mean + std);
    y.iter().map(|v| v.clamp(lower, upper)).collect()
}

/// Estimate the baseline of a single intensity column.
///
/// Degenerate columns (too short, all zero, unfactorable) produce an all-zero baseline.
pub fn baseline_column(y: &[f64], config: &BaselineConfig) -> Vec<f64> {
    let clipped = clip_outliers(y);
    match config.solver().fit(&clipped) {
        Ok(fit) => fit.z.into_iter().map(|v| v.max(0.0)).collect(),
        Err(err) => {
            debug!("Baseline estimation failed, using a zero baseline: {err}");
            vec![0.0; y.len()]
        }
    }
}

impl ColumnTransform for BaselineConfig {
    fn transform_column(&self, column: &[f64]) -> Vec<f64> {
        baseline_column(column, self)
    }
}

/// Estimate the baseline of every column of `y`, returning a matrix of the same shape
pub fn baseline(y: &IntensityMatrix, config: &BaselineConfig) -> IntensityMatrix {
    config.transform(y)
}

/// Estimate the baseline of every column of `y`, stopping early if `cancel` is triggered.
///
/// Columns finished before cancellation are kept.
pub fn baseline_cancellable(
    y: &IntensityMatrix,
    config: &BaselineConfig,
    cancel: &Cancellation,
) -> BatchResult<Vec<f64>> {
    config.transform_cancellable(y, Some(cancel))
}
