//! Small numeric helpers over slices shared by the signal processing modules.
use std::iter::Sum;

use num_traits::Float;

/// Build `n` evenly spaced points from `start` to `end`, both inclusive
pub fn linspace<T: Float>(start: T, end: T, n: usize) -> Vec<T> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / T::from(n - 1).unwrap();
            (0..n).map(|i| start + T::from(i).unwrap() * step).collect()
        }
    }
}

/// Trapezoid rule integral of `y` over `x`
pub fn trapz<T: Float + Sum>(x: &[T], y: &[T]) -> T {
    let n = x.len().min(y.len());
    if n < 2 {
        return T::zero();
    }
    let half = T::from(0.5).unwrap();
    (0..n - 1)
        .map(|i| (x[i + 1] - x[i]) * half * (y[i + 1] + y[i]))
        .sum()
}

/// The smallest and largest value in `values`, ignoring NaN.
///
/// An empty slice yields `(inf, -inf)`.
pub fn minmax<T: Float>(values: &[T]) -> (T, T) {
    let mut max = -T::infinity();
    let mut min = T::infinity();

    for v in values.iter().copied() {
        if v > max {
            max = v;
        }
        if v < min {
            min = v
        }
    }
    (min, max)
}

/// Mean and (population) standard deviation of `values`
pub fn mean_std<T: Float + Sum>(values: &[T]) -> (T, T) {
    if values.is_empty() {
        return (T::zero(), T::zero());
    }
    let n = T::from(values.len()).unwrap();
    let mean = values.iter().copied().sum::<T>() / n;
    let var = values.iter().map(|v| (*v - mean).powi(2)).sum::<T>() / n;
    (mean, var.sqrt())
}

/// Index of the first occurrence of the largest value
pub fn argmax<T: Float>(values: &[T]) -> Option<usize> {
    let mut best: Option<(usize, T)> = None;
    for (i, v) in values.iter().copied().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ if v.is_nan() => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Root mean square of `values`
pub fn rms<T: Float + Sum>(values: &[T]) -> T {
    if values.is_empty() {
        return T::zero();
    }
    (values.iter().map(|v| v.powi(2)).sum::<T>() / T::from(values.len()).unwrap()).sqrt()
}

/// Check if the values in `it` are monotonically ascending, strictly
pub fn is_strictly_increasing<F: Float>(it: &[F]) -> bool {
    it.windows(2).all(|w| w[0] < w[1])
}
