//! Exponential-gaussian hybrid peak fitting.
//!
//! The shape parameters are derived in closed form from the boundaries found by
//! [`PeakDetector`](crate::peak_detection::PeakDetector) rather than by iterative
//! optimization. The sign of the decay cannot be recovered from the boundaries alone, so
//! both signs are evaluated and the one with the lower error is kept.
mod fitter;
mod shape;

pub use fitter::{fit_peak, PeakFitter};
pub use shape::ExponentialGaussianPeakShape;
