//! Small numerical helpers shared by peak detection and fitting
use num_traits::{Float, FromPrimitive};

use crate::search::binsearch;

pub fn _isclose<T>(x: T, y: T, rtol: T, atol: T) -> bool
where
    T: Float,
{
    (x - y).abs() <= (atol + rtol * y.abs())
}

pub fn isclose<T>(x: T, y: T) -> bool
where
    T: Float + FromPrimitive,
{
    _isclose(
        x,
        y,
        T::from_f64(1e-5).unwrap_or_else(T::epsilon),
        T::from_f64(1e-8).unwrap_or_else(T::epsilon),
    )
}

pub fn aboutzero<T>(x: T) -> bool
where
    T: Float + FromPrimitive,
{
    isclose(x, T::zero())
}

/// Refine the apex at `index` by fitting a parabola through it and its two neighbours.
///
/// At either end of the arrays the sampled time is returned unchanged.
pub fn quadratic_fit(time: &[f64], intensity: &[f64], index: usize) -> f64 {
    let n = time.len();
    if n == 0 {
        return 0.0;
    }
    if index == 0 || index + 1 >= n {
        return time[index.min(n - 1)];
    }
    let x1 = time[index - 1];
    let x2 = time[index];
    let x3 = time[index + 1];
    let y1 = intensity[index - 1];
    let y2 = intensity[index];
    let y3 = intensity[index + 1];
    let d = (y2 - y1) * (x3 - x2) - (y3 - y2) * (x2 - x1);
    if aboutzero(d) {
        x2
    } else {
        let apex = ((x1 + x2) - ((y2 - y1) * (x3 - x2) * (x1 - x3)) / d) / 2.0;
        apex.clamp(x1, x3)
    }
}

/// The `x` at which the straight line through `(x0, y0)` and `(x1, y1)` reaches `level`
pub fn interpolate_crossing(x0: f64, y0: f64, x1: f64, y1: f64, level: f64) -> f64 {
    let dy = y1 - y0;
    if dy == 0.0 {
        return 0.5 * (x0 + x1);
    }
    x0 + (level - y0) * (x1 - x0) / dy
}

/// A natural cubic spline through a set of knots
#[derive(Debug, Clone, PartialEq)]
pub struct CubicSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    second_derivative: Vec<f64>,
}

impl CubicSpline {
    /// Build the spline, returning `None` if there are fewer than three knots or `x` is
    /// not strictly increasing
    pub fn new(x: &[f64], y: &[f64]) -> Option<Self> {
        let n = x.len();
        if n < 3 || y.len() != n || !x.windows(2).all(|w| w[0] < w[1]) {
            return None;
        }
        // Tridiagonal system for the interior second derivatives, solved with the Thomas
        // algorithm. The end conditions are M[0] = M[n - 1] = 0.
        let mut upper = vec![0.0; n];
        let mut rhs = vec![0.0; n];
        for i in 1..n - 1 {
            let h0 = x[i] - x[i - 1];
            let h1 = x[i + 1] - x[i];
            let diag = 2.0 * (h0 + h1);
            let r = 6.0 * ((y[i + 1] - y[i]) / h1 - (y[i] - y[i - 1]) / h0);
            let denom = diag - h0 * upper[i - 1];
            upper[i] = h1 / denom;
            rhs[i] = (r - h0 * rhs[i - 1]) / denom;
        }
        let mut second_derivative = vec![0.0; n];
        for i in (1..n - 1).rev() {
            second_derivative[i] = rhs[i] - upper[i] * second_derivative[i + 1];
        }
        Some(Self {
            x: x.to_vec(),
            y: y.to_vec(),
            second_derivative,
        })
    }

    /// Evaluate the spline at `t`, extrapolating the end segments outside the knot range
    pub fn evaluate(&self, t: f64) -> f64 {
        let n = self.x.len();
        let j = binsearch(&self.x, t).clamp(1, n - 1) - 1;
        let h = self.x[j + 1] - self.x[j];
        let a = (self.x[j + 1] - t) / h;
        let b = (t - self.x[j]) / h;
        let m0 = self.second_derivative[j];
        let m1 = self.second_derivative[j + 1];
        a * self.y[j]
            + b * self.y[j + 1]
            + ((a.powi(3) - a) * m0 + (b.powi(3) - b) * m1) * h * h / 6.0
    }

    /// Evaluate the spline on `factor` evenly spaced points per knot interval
    pub fn upsample(&self, factor: usize) -> (Vec<f64>, Vec<f64>) {
        let factor = factor.max(1);
        let mut xs = Vec::with_capacity((self.x.len() - 1) * factor + 1);
        for w in self.x.windows(2) {
            let step = (w[1] - w[0]) / factor as f64;
            xs.extend((0..factor).map(|k| w[0] + k as f64 * step));
        }
        if let Some(last) = self.x.last() {
            xs.push(*last);
        }
        let ys = xs.iter().map(|t| self.evaluate(*t)).collect();
        (xs, ys)
    }
}
