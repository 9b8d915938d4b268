use log::{debug, trace};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::arrayops::{minmax, rms};
use crate::peak::ChromatographicPeak;
use crate::peak_detection::{DetectConfig, PeakBounds, PeakDetector};
use crate::search::find_between;

use super::shape::ExponentialGaussianPeakShape;

const MIN_ALPHA: f64 = 1e-6;
const MAX_ALPHA: f64 = 1.0 - 1e-6;
const MAX_HEIGHT_MULTIPLE: f64 = 10.0;
const MIN_HEIGHT_MULTIPLE: f64 = 1e-9;

/// A candidate model evaluated against the data
#[derive(Debug, Clone)]
struct Candidate {
    shape: ExponentialGaussianPeakShape,
    fit: Vec<f64>,
    residuals: Vec<f64>,
    error: f64,
}

/// Fits an [`ExponentialGaussianPeakShape`] to the dominant peak of a trace using
/// boundaries from a [`PeakDetector`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PeakFitter {
    pub detector: PeakDetector,
}

impl PeakFitter {
    pub fn new(config: DetectConfig) -> Self {
        Self {
            detector: PeakDetector::new(config),
        }
    }

    /// Evaluate `shape` over `x`, zeroing values far outside a plausible range
    fn evaluate(
        shape: ExponentialGaussianPeakShape,
        x: &[f64],
        y: &[f64],
        window: (usize, usize),
    ) -> Candidate {
        let upper = MAX_HEIGHT_MULTIPLE * shape.height;
        let lower = MIN_HEIGHT_MULTIPLE * shape.height;
        let fit: Vec<f64> = shape
            .predict(x)
            .into_iter()
            .map(|v| if v > upper || v < lower { 0.0 } else { v })
            .collect();
        let residuals: Vec<f64> = y.iter().zip(fit.iter()).map(|(y, f)| y - f).collect();

        let (lo, hi) = window;
        let (y_min, y_max) = minmax(&y[lo..=hi]);
        let error = rms(&residuals[lo..=hi]) / (y_max - y_min) * 100.0;
        Candidate {
            shape,
            fit,
            residuals,
            error,
        }
    }

    /// Fit the peak described by `bounds`
    pub fn fit_bounds(&self, x: &[f64], y: &[f64], bounds: &PeakBounds) -> ChromatographicPeak {
        if bounds.is_empty() {
            return ChromatographicPeak::empty(y.len());
        }
        let Some(window) = find_between(x, bounds.left, bounds.right) else {
            return ChromatographicPeak::empty(y.len());
        };

        let alpha = bounds.alpha.clamp(MIN_ALPHA, MAX_ALPHA);
        let shape = ExponentialGaussianPeakShape::from_bounds(
            bounds.center,
            bounds.height,
            bounds.leading(),
            bounds.trailing(),
            alpha,
        );

        let mut best: Option<Candidate> = None;
        for shape in [shape, shape.mirrored()] {
            let candidate = Self::evaluate(shape, x, y, window);
            trace!(
                "Candidate decay {} has error {}",
                candidate.shape.decay,
                candidate.error
            );
            if candidate.error.is_nan() {
                continue;
            }
            if best.as_ref().map_or(true, |b| candidate.error < b.error) {
                best = Some(candidate);
            }
        }

        let Some(best) = best else {
            debug!("No usable fit around {}", bounds.center);
            return ChromatographicPeak::empty(y.len());
        };
        let area = best.shape.area();
        if !area.is_finite() {
            debug!("Non-finite area for {:?}", best.shape);
            return ChromatographicPeak::empty(y.len());
        }
        ChromatographicPeak {
            center: best.shape.center,
            left: bounds.left,
            right: bounds.right,
            height: best.shape.height,
            width: best.shape.width,
            decay: best.shape.decay,
            area,
            fit: best.fit,
            residuals: best.residuals,
            fit_error: best.error,
        }
    }

    /// Detect and fit the dominant peak of `y` over `x`
    pub fn fit(&self, x: &[f64], y: &[f64]) -> ChromatographicPeak {
        let bounds = self.detector.detect(x, y);
        self.fit_bounds(x, y, &bounds)
    }
}

/// Fit the dominant peak of `y` over `x`, searching around the optional hints
pub fn fit_peak(
    x: &[f64],
    y: &[f64],
    center_hint: Option<f64>,
    width_hint: Option<f64>,
) -> ChromatographicPeak {
    PeakFitter::new(DetectConfig::new(center_hint, width_hint)).fit(x, y)
}
