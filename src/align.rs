//! Parametric time warping of sample traces onto a reference trace.
//!
//! A quadratic warp `w(i) = c0 + c1 * i + c2 * (i / m)^2` maps each sample index to a
//! fractional reference index. The coefficients are refined with Gauss-Newton steps on the
//! residual between the sample and the linearly interpolated reference.
use cfg_if::cfg_if;
use log::{debug, trace};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "ndarray-linalg")]
use ndarray::{Array1, Array2};
#[cfg(feature = "ndarray-linalg")]
use ndarray_linalg::Solve;

use crate::arrayops::rms;
use crate::batch::{map_tasks, BatchResult, Cancellation};

const MAX_STEP_HALVINGS: usize = 5;

/// Parameters for [`align`]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AlignConfig {
    /// The maximum number of Gauss-Newton updates
    pub iterations: usize,
    /// The relative change in RMS residual at which to stop
    pub convergence: f64,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            iterations: 50,
            convergence: 1e-5,
        }
    }
}

impl AlignConfig {
    pub fn iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn convergence(mut self, convergence: f64) -> Self {
        self.convergence = convergence;
        self
    }
}

/// The quadratic warping function
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WarpFunction {
    pub coefficients: [f64; 3],
    /// The length `m` normalizing the quadratic term
    pub scale: f64,
}

impl WarpFunction {
    pub fn identity(scale: usize) -> Self {
        Self {
            coefficients: [0.0, 1.0, 0.0],
            scale: scale.max(1) as f64,
        }
    }

    /// The fractional reference index of sample index `i`
    pub fn evaluate(&self, i: usize) -> f64 {
        let [c0, c1, c2] = self.coefficients;
        let i = i as f64;
        let u = i / self.scale;
        c0 + c1 * i + c2 * u * u
    }

    /// The warp's partial derivatives with respect to `c0`, `c1 * m` and `c2`.
    ///
    /// The linear term is expressed on the same `i / m` scale as the quadratic term
    /// to keep the normal equations well conditioned.
    fn scaled_basis(&self, i: usize) -> [f64; 3] {
        let u = i as f64 / self.scale;
        [1.0, u, u * u]
    }

    fn step(&self, delta: &[f64; 3], fraction: f64) -> Self {
        let mut coefficients = self.coefficients;
        coefficients[0] += fraction * delta[0];
        coefficients[1] += fraction * delta[1] / self.scale;
        coefficients[2] += fraction * delta[2];
        Self {
            coefficients,
            scale: self.scale,
        }
    }
}

/// Paired sample/reference indices. Both sequences always have the same length and
/// are non-decreasing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AlignmentMap {
    pub reference_index: Vec<usize>,
    pub sample_index: Vec<usize>,
}

impl AlignmentMap {
    pub fn len(&self) -> usize {
        self.reference_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reference_index.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.reference_index
            .iter()
            .copied()
            .zip(self.sample_index.iter().copied())
    }

    /// Place `sample` values on a grid of `reference_len` points using the correspondence.
    ///
    /// Reference points without a matching sample index are left at zero. When several
    /// sample points land on the same reference point, the last one wins.
    pub fn resample(&self, sample: &[f64], reference_len: usize) -> Vec<f64> {
        let mut out = vec![0.0; reference_len];
        for (r, s) in self.iter() {
            if r < reference_len && s < sample.len() {
                out[r] = sample[s];
            }
        }
        out
    }
}

/// The outcome of aligning one sample
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Alignment {
    pub map: AlignmentMap,
    pub warp: WarpFunction,
    pub rms: f64,
    pub iterations: usize,
}

fn normalize(values: &[f64]) -> Vec<f64> {
    let peak = values.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
    if peak > 0.0 && peak.is_finite() {
        values.iter().map(|v| v / peak).collect()
    } else {
        values.to_vec()
    }
}

/// Linearly interpolate `values` at fractional index `t`, returning the value and the
/// local slope, or `None` outside `[0, len - 1]`
fn interpolate(values: &[f64], t: f64) -> Option<(f64, f64)> {
    let last = values.len().checked_sub(1)?;
    if !(0.0..=last as f64).contains(&t) || last == 0 {
        return None;
    }
    let j = (t.floor() as usize).min(last - 1);
    let frac = t - j as f64;
    let slope = values[j + 1] - values[j];
    Some((values[j] + frac * slope, slope))
}

struct Residuals {
    residuals: Vec<f64>,
    jacobian: Vec<[f64; 3]>,
}

fn evaluate(reference: &[f64], sample: &[f64], warp: &WarpFunction) -> Residuals {
    let mut residuals = Vec::with_capacity(sample.len());
    let mut jacobian = Vec::with_capacity(sample.len());
    for (i, s) in sample.iter().enumerate() {
        if let Some((value, slope)) = interpolate(reference, warp.evaluate(i)) {
            residuals.push(s - value);
            let basis = warp.scaled_basis(i);
            jacobian.push([slope * basis[0], slope * basis[1], slope * basis[2]]);
        }
    }
    Residuals {
        residuals,
        jacobian,
    }
}

#[cfg_attr(any(feature = "nalgebra", feature = "ndarray-linalg"), allow(dead_code))]
fn solve3_elimination(mut a: [[f64; 3]; 3], mut b: [f64; 3]) -> Option<[f64; 3]> {
    for col in 0..3 {
        let pivot = (col..3).max_by(|x, y| a[*x][col].abs().total_cmp(&a[*y][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in (col + 1)..3 {
            let f = a[row][col] / a[col][col];
            for k in col..3 {
                a[row][k] -= f * a[col][k];
            }
            b[row] -= f * b[col];
        }
    }
    let mut x = [0.0; 3];
    for row in (0..3).rev() {
        let tail: f64 = ((row + 1)..3).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}

#[cfg(feature = "ndarray-linalg")]
fn solve3_ndarray(a: [[f64; 3]; 3], b: [f64; 3]) -> Option<[f64; 3]> {
    let a = Array2::from_shape_fn((3, 3), |(i, j)| a[i][j]);
    let b = Array1::from(b.to_vec());
    let x = a.solve_into(b).ok()?;
    Some([x[0], x[1], x[2]])
}

#[cfg(feature = "nalgebra")]
#[cfg_attr(feature = "ndarray-linalg", allow(dead_code))]
fn solve3_nalgebra(a: [[f64; 3]; 3], b: [f64; 3]) -> Option<[f64; 3]> {
    use nalgebra::{Matrix3, Vector3};
    let a = Matrix3::from_fn(|i, j| a[i][j]);
    let b = Vector3::from_column_slice(&b);
    let x = a.lu().solve(&b)?;
    Some([x[0], x[1], x[2]])
}

/// Solve the 3x3 normal equations `a x = b`
fn solve3(a: [[f64; 3]; 3], b: [f64; 3]) -> Option<[f64; 3]> {
    cfg_if! {
        if #[cfg(feature = "ndarray-linalg")] {
            return solve3_ndarray(a, b).filter(|x| x.iter().all(|v| v.is_finite()));
        } else if #[cfg(feature = "nalgebra")] {
            return solve3_nalgebra(a, b).filter(|x| x.iter().all(|v| v.is_finite()));
        } else {
            return solve3_elimination(a, b).filter(|x| x.iter().all(|v| v.is_finite()));
        }
    }
}

/// The Gauss-Newton step from the current residuals
fn gauss_newton_step(state: &Residuals) -> Option<[f64; 3]> {
    let mut jtj = [[0.0; 3]; 3];
    let mut jtr = [0.0; 3];
    for (row, r) in state.jacobian.iter().zip(state.residuals.iter()) {
        for i in 0..3 {
            jtr[i] += row[i] * r;
            for j in 0..3 {
                jtj[i][j] += row[i] * row[j];
            }
        }
    }
    solve3(jtj, jtr)
}

fn correspondence(reference_len: usize, sample_len: usize, warp: &WarpFunction) -> AlignmentMap {
    let mut map = AlignmentMap::default();
    if reference_len == 0 {
        return map;
    }
    let last = (reference_len - 1) as f64;
    for i in 0..sample_len {
        let t = warp.evaluate(i);
        if !(0.0..=last).contains(&t) {
            continue;
        }
        let r = t.round() as usize;
        if map.reference_index.last().is_some_and(|prev| r < *prev) {
            continue;
        }
        map.reference_index.push(r);
        map.sample_index.push(i);
    }
    map
}

/// Align a single `sample` trace to `reference`
pub fn align_one(reference: &[f64], sample: &[f64], config: &AlignConfig) -> Alignment {
    let reference = normalize(reference);
    let sample = normalize(sample);
    let mut warp = WarpFunction::identity(reference.len().max(sample.len()));
    let mut state = evaluate(&reference, &sample, &warp);
    let mut current = rms(&state.residuals);
    let mut iterations = 0;

    while iterations < config.iterations && current > 0.0 && state.residuals.len() >= 3 {
        iterations += 1;
        let Some(delta) = gauss_newton_step(&state) else {
            debug!("Singular normal equations after {iterations} iterations");
            break;
        };

        let mut accepted = None;
        let mut fraction = 1.0;
        for _ in 0..=MAX_STEP_HALVINGS {
            let candidate = warp.step(&delta, fraction);
            let next = evaluate(&reference, &sample, &candidate);
            let next_rms = rms(&next.residuals);
            if next.residuals.len() >= 3 && next_rms <= current {
                accepted = Some((candidate, next, next_rms));
                break;
            }
            fraction *= 0.5;
        }
        let Some((candidate, next, next_rms)) = accepted else {
            trace!("No improving step at iteration {iterations}");
            break;
        };

        let change = (current - next_rms).abs() / current;
        trace!(
            "Iteration {iterations}: rms {current:.6e} -> {next_rms:.6e}, coefficients {:?}",
            candidate.coefficients
        );
        warp = candidate;
        state = next;
        current = next_rms;
        if change < config.convergence {
            break;
        }
    }

    Alignment {
        map: correspondence(reference.len(), sample.len(), &warp),
        warp,
        rms: current,
        iterations,
    }
}

/// Align each of `samples` to `reference`, one [`AlignmentMap`] per sample in order
pub fn align<S: AsRef<[f64]> + Sync>(
    reference: &[f64],
    samples: &[S],
    config: &AlignConfig,
) -> Vec<AlignmentMap> {
    align_cancellable(reference, samples, config, None)
        .results
        .into_iter()
        .map(|a| a.map(|a| a.map).unwrap_or_default())
        .collect()
}

/// Align each of `samples` to `reference`, checking `cancel` before each sample starts
pub fn align_cancellable<S: AsRef<[f64]> + Sync>(
    reference: &[f64],
    samples: &[S],
    config: &AlignConfig,
    cancel: Option<&Cancellation>,
) -> BatchResult<Alignment> {
    map_tasks(samples.len(), cancel, |i| {
        align_one(reference, samples[i].as_ref(), config)
    })
}

#[cfg(test)]
mod test {
    use super::*;

    use rstest::rstest;

    use crate::arrayops::linspace;
    use crate::test_data::gaussian;

    fn trace_at(center: f64) -> Vec<f64> {
        let x: Vec<f64> = (0..300).map(|i| i as f64).collect();
        let mut y = gaussian(&x, center, 100.0, 12.0);
        y.iter_mut()
            .zip(gaussian(&x, center + 80.0, 40.0, 8.0))
            .for_each(|(a, b)| *a += b);
        y
    }

    #[test]
    fn test_identical_signals_identity() {
        let y = trace_at(100.0);
        let alignment = align_one(&y, &y, &AlignConfig::default());
        assert_eq!(alignment.iterations, 0);
        assert_eq!(alignment.map.len(), y.len());
        assert_eq!(alignment.map.reference_index, alignment.map.sample_index);
    }

    #[test_log::test]
    fn test_recovers_shift() {
        let reference = trace_at(100.0);
        let sample = trace_at(108.0);
        let alignment = align_one(&reference, &sample, &AlignConfig::default());
        let [c0, c1, c2] = alignment.warp.coefficients;
        let shift = c0 + (c1 - 1.0) * 108.0 + c2 * (108.0f64 / 300.0).powi(2);
        assert!((shift + 8.0).abs() < 0.5, "{:?}", alignment.warp);
        assert!(alignment.rms < 0.05, "{}", alignment.rms);
        assert!(alignment.map.len() < sample.len());
    }

    #[rstest]
    #[case(100.0, 95.0, 300)]
    #[case(100.0, 103.0, 200)]
    #[case(90.0, 90.0, 250)]
    fn test_sequences_equal_and_monotone(#[case] a: f64, #[case] b: f64, #[case] n: usize) {
        let reference = trace_at(a);
        let sample: Vec<f64> = trace_at(b).into_iter().take(n).collect();
        let map = align(&reference, &[sample.clone()], &AlignConfig::default()).remove(0);
        assert_eq!(map.reference_index.len(), map.sample_index.len());
        assert!(map.reference_index.windows(2).all(|w| w[0] <= w[1]));
        assert!(map.sample_index.windows(2).all(|w| w[0] < w[1]));
        assert!(map.reference_index.iter().all(|r| *r < reference.len()));
        assert!(map.sample_index.iter().all(|s| *s < sample.len()));
    }

    #[test]
    fn test_flat_signals() {
        let zeros = vec![0.0; 50];
        let alignment = align_one(&zeros, &zeros, &AlignConfig::default());
        assert_eq!(alignment.map.len(), 50);
        assert_eq!(alignment.rms, 0.0);
    }

    #[test]
    fn test_resample() {
        let map = AlignmentMap {
            reference_index: vec![1, 2, 3],
            sample_index: vec![0, 1, 2],
        };
        assert_eq!(map.resample(&[5.0, 6.0, 7.0], 5), vec![0.0, 5.0, 6.0, 7.0, 0.0]);
    }

    #[test]
    fn test_solvers_agree() {
        let a = [[4.0, 1.0, 0.5], [1.0, 3.0, 0.2], [0.5, 0.2, 2.0]];
        let b = [1.0, 2.0, 3.0];
        let x = solve3(a, b).unwrap();
        let y = solve3_elimination(a, b).unwrap();
        for (x, y) in x.iter().zip(y.iter()) {
            assert!((x - y).abs() < 1e-10);
        }
        assert!(solve3_elimination([[0.0; 3]; 3], b).is_none());
    }

    #[test]
    fn test_cancelled_alignment() {
        let cancel = Cancellation::new();
        cancel.cancel();
        let reference = linspace(0.0, 1.0, 10);
        let samples = [reference.clone()];
        let result =
            align_cancellable(&reference, &samples, &AlignConfig::default(), Some(&cancel));
        assert!(result.cancelled);
        assert_eq!(result.results, vec![None]);
    }
}
