//! `chromsignal` is a library for processing chromatographic signals, the intensity
//! traces over time produced by LC/MS, GC/MS and GC/FID instruments, en-route to a
//! table of integrated peaks.
//!
//! The core operations work column by column on a [`Signal`]:
//! - [`baseline`](crate::baseline::baseline) estimates a non-negative floor with asymmetric
//!   least squares, and [`smooth`](crate::smooth::smooth) applies the same solver
//!   symmetrically.
//! - [`centroid`](crate::centroid::centroid) collapses fragmented mass channels of a
//!   [`MassChannelMatrix`].
//! - [`align`](crate::align::align) warps sample traces onto a reference.
//! - [`PeakFitter`] detects the dominant peak of a trace and fits an
//!   exponential-gaussian hybrid to it, integrating it in closed form.
//!
//! The [`Pipeline`](crate::pipeline::Pipeline) type chains these stages with typed
//! configuration.
//!
//! # Usage
//! ```
//! use chromsignal::arrayops::linspace;
//! use chromsignal::PeakFitter;
//!
//! let time = linspace(0.0, 20.0, 1000);
//! let intensity: Vec<f64> = time
//!     .iter()
//!     .map(|t| 100.0 * (-(t - 10.0f64).powi(2) / 2.0).exp())
//!     .collect();
//!
//! let peak = PeakFitter::default().fit(&time, &intensity);
//! assert!((peak.center - 10.0).abs() < 0.05);
//! assert!((peak.area - 250.66).abs() < 2.5);
//! println!("{}", peak);
//! ```
//! ## Building
//! The aligner solves small linear systems with `nalgebra` by default. This can be swapped
//! for `ndarray-linalg`, which needs a LAPACK implementation as a backend. These are enabled
//! by passing one of the supported backends as a `feature` to `cargo` e.g.:
//! ```bash
//! cargo build --features openblas
//! ```
//! Per-column work runs on a `rayon` thread pool unless the default `parallelism` feature
//! is disabled.
pub mod align;
pub mod arrayops;
pub mod baseline;
pub mod batch;
pub mod centroid;
pub mod peak;
pub mod peak_detection;
pub mod peak_fit;
pub mod peak_statistics;
pub mod pipeline;
pub mod prelude;
pub mod search;
pub mod signal;
pub mod smooth;
pub mod solver;
pub mod text;

#[cfg(test)]
mod test_data;

pub use crate::batch::{BatchResult, Cancellation};
pub use crate::peak::ChromatographicPeak;
pub use crate::peak_detection::{PeakBounds, PeakDetector};
pub use crate::peak_fit::PeakFitter;
pub use crate::signal::{IntensityMatrix, MassChannelMatrix, Selection, Signal, SignalError};
pub use crate::solver::{PenalizedLeastSquares, SolverError};
