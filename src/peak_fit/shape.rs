use std::f64::consts::PI;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Coefficients of the sextic in `atan(|decay| / width)` that corrects the closed-form area
const AREA_COEFFICIENTS: [f64; 7] = [
    4.0, -6.293724, 9.232834, -11.34291, 9.123978, -4.173753, 0.827797,
];

/// Exponential-gaussian hybrid peak shape model
///
/// ```math
/// y = h\exp\left({\frac{-(x - c)^2}{2w^2 + e(x - c)}}\right)
/// ```
///
/// The model is only defined where the denominator is positive and is zero elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ExponentialGaussianPeakShape {
    pub center: f64,
    pub height: f64,
    pub width: f64,
    pub decay: f64,
}

impl ExponentialGaussianPeakShape {
    pub fn new(center: f64, height: f64, width: f64, decay: f64) -> Self {
        Self {
            center,
            height,
            width,
            decay,
        }
    }

    /// Derive the width and decay from boundaries at a fraction `alpha` of the height,
    /// `leading` before and `trailing` after the center
    pub fn from_bounds(center: f64, height: f64, leading: f64, trailing: f64, alpha: f64) -> Self {
        let log_alpha = alpha.ln();
        let width = (-(leading * trailing) / (2.0 * log_alpha)).sqrt();
        let decay = -(trailing - leading) / log_alpha;
        Self::new(center, height, width, decay)
    }

    /// The same shape with the decay sign flipped
    pub fn mirrored(&self) -> Self {
        Self {
            decay: -self.decay,
            ..*self
        }
    }

    pub fn density(&self, x: f64) -> f64 {
        let d = x - self.center;
        let denom = 2.0 * self.width.powi(2) + self.decay * d;
        if denom > 0.0 {
            self.height * (-(d * d) / denom).exp()
        } else {
            0.0
        }
    }

    pub fn predict(&self, times: &[f64]) -> Vec<f64> {
        times.iter().map(|t| self.density(*t)).collect()
    }

    /// The closed-form integral of the shape
    pub fn area(&self) -> f64 {
        let decay = self.decay.abs();
        let theta = (decay / self.width).atan();
        let epsilon = AREA_COEFFICIENTS
            .iter()
            .rev()
            .fold(0.0, |acc, c| acc * theta + c);
        self.height * (self.width * (PI / 8.0).sqrt() + decay) * epsilon
    }
}
