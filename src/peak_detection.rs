//! Locate the dominant peak of a trace and estimate its boundaries.
//!
//! The boundary height is found by walking outward from the apex on both sides at once
//! and accumulating the absolute difference between the normalized left and right traces.
//! The first point where that difference catches up with the trace height marks where
//! the two sides stop looking alike, and that height is used as the boundary level.
use log::{debug, trace};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::arrayops::{argmax, minmax};
use crate::peak_statistics::{interpolate_crossing, quadratic_fit, CubicSpline};
use crate::search::find_between;

/// The boundary level used when the traced one is not strictly between 0 and 1
pub const DEFAULT_BOUNDARY_LEVEL: f64 = 0.5;

const SPLINE_UPSAMPLING: usize = 10;
const MAX_SIDE_RATIO: f64 = 2.0;

/// Optional hints for [`PeakDetector::detect`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DetectConfig {
    /// The center of the search window. Defaults to the time of the most intense point.
    pub center: Option<f64>,
    /// The width of the search window. Defaults to 5% of the time range.
    pub width: Option<f64>,
}

impl DetectConfig {
    pub fn new(center: Option<f64>, width: Option<f64>) -> Self {
        Self { center, width }
    }

    pub fn center(mut self, center: f64) -> Self {
        self.center = Some(center);
        self
    }

    pub fn width(mut self, width: f64) -> Self {
        self.width = Some(width);
        self
    }
}

/// The location of a detected peak. A zero `center` means no peak was found.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PeakBounds {
    pub center: f64,
    pub left: f64,
    pub right: f64,
    /// The sampled intensity at the apex
    pub height: f64,
    /// The boundary height relative to `height`
    pub alpha: f64,
    /// The index of the apex sample
    pub index: usize,
}

impl PeakBounds {
    pub fn is_empty(&self) -> bool {
        self.center == 0.0
    }

    /// The distance from the left boundary to the center
    pub fn leading(&self) -> f64 {
        self.center - self.left
    }

    /// The distance from the center to the right boundary
    pub fn trailing(&self) -> f64 {
        self.right - self.center
    }
}

/// Find the highest local maximum in `y[lo..=hi]`, `y[n] > y[n + 1] && y[n] >= y[n - 1]`
fn highest_local_maximum(y: &[f64], lo: usize, hi: usize) -> Option<usize> {
    let lo = lo.max(1);
    let hi = hi.min(y.len().saturating_sub(2));
    let mut best: Option<usize> = None;
    for n in lo..=hi {
        if y[n] > y[n + 1] && y[n] >= y[n - 1] && best.map_or(true, |b| y[n] > y[b]) {
            best = Some(n);
        }
    }
    best
}

/// Walk outward from `apex` comparing the two normalized sides and return the height
/// where their cumulative difference first exceeds the lower of the two traces
fn boundary_level(y: &[f64], apex: usize) -> f64 {
    let height = y[apex];
    let span = apex.min(y.len() - 1 - apex);
    let mut cumulative = 0.0;
    for k in 1..=span {
        let left = y[apex - k] / height;
        let right = y[apex + k] / height;
        cumulative += (left - right).abs();
        let level = left.min(right);
        if cumulative > level {
            trace!("Boundary level {level} reached {k} points from the apex");
            return level;
        }
    }
    f64::NAN
}

/// Find where `y` first drops to `level` walking away from `apex`,
/// interpolating between the straddling samples
fn crossing(x: &[f64], y: &[f64], apex: usize, level: f64, leftward: bool) -> f64 {
    let mut i = apex;
    loop {
        let next = if leftward {
            match i.checked_sub(1) {
                Some(next) => next,
                None => return x[0],
            }
        } else if i + 1 < y.len() {
            i + 1
        } else {
            return x[y.len() - 1];
        };
        if y[next] <= level {
            return interpolate_crossing(x[i], y[i], x[next], y[next], level);
        }
        i = next;
    }
}

/// Find the half-height boundaries on an upsampled cubic spline of the region around
/// the apex
fn spline_bounds(x: &[f64], y: &[f64], apex: usize, center: f64) -> Option<(f64, f64, f64)> {
    let reach = |leftward: bool| {
        let mut i = apex;
        let floor = 0.25 * y[apex];
        loop {
            let next = if leftward {
                i.checked_sub(1)
            } else {
                (i + 1 < y.len()).then_some(i + 1)
            };
            match next {
                Some(next) if y[i] > floor => i = next,
                _ => return i,
            }
        }
    };
    let lo = reach(true);
    let hi = reach(false);
    let spline = CubicSpline::new(&x[lo..=hi], &y[lo..=hi])?;
    let (xs, ys) = spline.upsample(SPLINE_UPSAMPLING);
    let peak = argmax(&ys)?;
    let level = DEFAULT_BOUNDARY_LEVEL * ys[peak];
    let left = center.min(crossing(&xs, &ys, peak, level, true));
    let right = center.max(crossing(&xs, &ys, peak, level, false));
    Some((left, right, DEFAULT_BOUNDARY_LEVEL))
}

/// Locates a single dominant peak in a trace
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PeakDetector {
    pub config: DetectConfig,
}

impl PeakDetector {
    pub fn new(config: DetectConfig) -> Self {
        Self { config }
    }

    /// Detect the highest peak of `y` over `x` inside the configured window
    pub fn detect(&self, x: &[f64], y: &[f64]) -> PeakBounds {
        if x.len() != y.len() || x.len() < 3 {
            return PeakBounds::default();
        }
        let Some(top) = argmax(y) else {
            return PeakBounds::default();
        };
        let (x_min, x_max) = minmax(x);
        let center = self.config.center.unwrap_or(x[top]);
        let width = self.config.width.unwrap_or(0.05 * (x_max - x_min));

        let Some((lo, hi)) = find_between(x, center - width / 2.0, center + width / 2.0) else {
            debug!("No points inside the window around {center}");
            return PeakBounds::default();
        };
        let Some(apex) = highest_local_maximum(y, lo, hi) else {
            debug!("No local maximum inside the window around {center}");
            return PeakBounds::default();
        };
        let height = y[apex];
        if !(height > 0.0) {
            return PeakBounds::default();
        }

        let mut alpha = boundary_level(y, apex);
        if !(alpha > 0.0 && alpha < 1.0) {
            alpha = DEFAULT_BOUNDARY_LEVEL;
        }
        let center = quadratic_fit(x, y, apex);
        let mut left = crossing(x, y, apex, alpha * height, true);
        let mut right = crossing(x, y, apex, alpha * height, false);

        let leading = center - left;
        let trailing = right - center;
        if !(leading > 0.0 && trailing > 0.0)
            || leading > MAX_SIDE_RATIO * trailing
            || trailing > MAX_SIDE_RATIO * leading
        {
            debug!(
                "Re-estimating disproportionate boundaries {left:.4}..{right:.4} around {center:.4}"
            );
            if let Some((l, r, a)) = spline_bounds(x, y, apex, center) {
                left = l;
                right = r;
                alpha = a;
            }
            let leading = center - left;
            let trailing = right - center;
            if leading > MAX_SIDE_RATIO * trailing {
                left = center - MAX_SIDE_RATIO * trailing;
            } else if trailing > MAX_SIDE_RATIO * leading {
                right = center + MAX_SIDE_RATIO * leading;
            }
        }
        if !(center - left > 0.0 && right - center > 0.0) {
            debug!("Degenerate boundaries {left}..{right} around {center}");
            return PeakBounds::default();
        }

        PeakBounds {
            center,
            left,
            right,
            height,
            alpha,
            index: apex,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use rstest::rstest;

    use crate::arrayops::linspace;
    use crate::test_data::{egh, gaussian, reference_gaussian};

    #[test_log::test]
    fn test_detect_gaussian() {
        let (x, y) = reference_gaussian();
        let bounds = PeakDetector::default().detect(&x, &y);
        assert!((bounds.center - 10.0).abs() < 0.05, "{bounds:?}");
        // The apex sample sits half a step off the true center so the two sides drift
        // apart gradually, crossing near half height.
        assert!((bounds.alpha - 0.5).abs() < 0.1, "{bounds:?}");
        let half_width = (-2.0 * bounds.alpha.ln()).sqrt();
        assert!((bounds.leading() - half_width).abs() < 0.02, "{bounds:?}");
        assert!((bounds.trailing() - half_width).abs() < 0.02, "{bounds:?}");
        assert_eq!(bounds.height, y[bounds.index]);
    }

    #[test]
    fn test_boundary_level_needs_strict_excess() {
        // One point out the cumulative difference only equals the lower side
        let y = [0.0, 0.0, 0.0, 0.0, 2.0, 10.0, 1.0, 0.0, 0.0, 0.0, 0.0];
        assert_eq!(boundary_level(&y, 5), 0.0);

        let x = linspace(0.0, 10.0, y.len());
        let bounds = PeakDetector::default().detect(&x, &y);
        assert_eq!(bounds.alpha, DEFAULT_BOUNDARY_LEVEL);
    }

    #[test]
    fn test_zero_signal() {
        let x = linspace(0.0, 10.0, 100);
        let y = vec![0.0; 100];
        let bounds = PeakDetector::default().detect(&x, &y);
        assert!(bounds.is_empty());
        assert_eq!(bounds, PeakBounds::default());
    }

    #[test]
    fn test_monotone_signal_has_no_peak() {
        let x = linspace(0.0, 10.0, 100);
        let bounds = PeakDetector::default().detect(&x, &x);
        assert!(bounds.is_empty());
    }

    #[rstest]
    #[case(4.0)]
    #[case(15.0)]
    fn test_window_selects_peak(#[case] center: f64) {
        let x = linspace(0.0, 20.0, 1000);
        let mut y = gaussian(&x, 4.0, 50.0, 0.5);
        y.iter_mut()
            .zip(gaussian(&x, 15.0, 100.0, 0.5))
            .for_each(|(a, b)| *a += b);
        let detector = PeakDetector::new(DetectConfig::default().center(center).width(2.0));
        let bounds = detector.detect(&x, &y);
        assert!((bounds.center - center).abs() < 0.05, "{bounds:?}");
        assert!(bounds.left < bounds.center && bounds.center < bounds.right);
    }

    #[test]
    fn test_tailing_peak_bounds_are_proportionate() {
        let x = linspace(0.0, 20.0, 1000);
        let y = egh(&x, 8.0, 100.0, 0.6, 0.5);
        let bounds = PeakDetector::default().detect(&x, &y);
        assert!(!bounds.is_empty());
        assert!(bounds.alpha > 0.0 && bounds.alpha < 1.0);
        assert!(bounds.trailing() >= bounds.leading());
        assert!(bounds.trailing() <= MAX_SIDE_RATIO * bounds.leading() + 1e-9);
    }
}
