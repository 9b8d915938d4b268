//! Synthetic chromatograms for tests and benchmarks
use crate::arrayops::linspace;

/// A gaussian profile with `height` at `center` and standard deviation `width`
pub fn gaussian(x: &[f64], center: f64, height: f64, width: f64) -> Vec<f64> {
    x.iter()
        .map(|x| height * (-(x - center).powi(2) / (2.0 * width.powi(2))).exp())
        .collect()
}

/// An exponential-gaussian hybrid profile, zero outside its valid domain
pub fn egh(x: &[f64], center: f64, height: f64, width: f64, decay: f64) -> Vec<f64> {
    x.iter()
        .map(|x| {
            let d = x - center;
            let denom = 2.0 * width.powi(2) + decay * d;
            if denom > 0.0 {
                height * (-(d * d) / denom).exp()
            } else {
                0.0
            }
        })
        .collect()
}

/// Deterministic uniform noise in `[-amplitude, amplitude]` from a linear congruential generator
pub fn noise(n: usize, seed: u64, amplitude: f64) -> Vec<f64> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..n)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let unit = (state >> 11) as f64 / (1u64 << 53) as f64;
            amplitude * (2.0 * unit - 1.0)
        })
        .collect()
}

/// The reference chromatogram: `linspace(0, 20, 1000)` with a unit-width gaussian of height
/// 100 at 10.0
pub fn reference_gaussian() -> (Vec<f64>, Vec<f64>) {
    let x = linspace(0.0, 20.0, 1000);
    let y = gaussian(&x, 10.0, 100.0, 1.0);
    (x, y)
}

/// A sloped baseline carrying three peaks
pub fn drifting_chromatogram(n: usize) -> (Vec<f64>, Vec<f64>) {
    let x = linspace(0.0, 30.0, n);
    let mut y: Vec<f64> = x.iter().map(|x| 5.0 + 0.2 * x).collect();
    for (c, h, w) in [(6.0, 80.0, 0.3), (14.0, 200.0, 0.5), (22.0, 50.0, 0.4)] {
        y.iter_mut()
            .zip(gaussian(&x, c, h, w))
            .for_each(|(a, b)| *a += b);
    }
    (x, y)
}
