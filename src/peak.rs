use std::cmp;
use std::fmt;

use mzpeaks::coordinate::{CoordinateLike, Time};
use mzpeaks::IntensityMeasurement;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
/// A [`ChromatographicPeak`] is an exponential-gaussian hybrid fitted to one intensity
/// column. It implements [`CoordinateLike<Time>`](mzpeaks::CoordinateLike) at its apex
/// time and [`IntensityMeasurement`] with its height.
///
/// A record whose values are all zero means no peak was found.
pub struct ChromatographicPeak {
    pub center: f64,
    pub left: f64,
    pub right: f64,
    pub height: f64,
    /// The gaussian width parameter
    pub width: f64,
    /// The exponential decay parameter, positive for tailing peaks
    pub decay: f64,
    pub area: f64,

    /// The fitted curve evaluated over the whole time axis
    pub fit: Vec<f64>,
    /// `y - fit` over the whole time axis
    pub residuals: Vec<f64>,
    /// The RMS residual inside `left..right` as a percentage of the signal range there
    pub fit_error: f64,
}

impl ChromatographicPeak {
    /// The "no peak" record for a column of `n` points
    pub fn empty(n: usize) -> Self {
        Self {
            fit: vec![0.0; n],
            residuals: vec![0.0; n],
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.area == 0.0 && self.center == 0.0
    }

    /// The width of the integration window
    pub fn duration(&self) -> f64 {
        self.right - self.left
    }
}

impl PartialOrd for ChromatographicPeak {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.center.total_cmp(&other.center))
    }
}

impl CoordinateLike<Time> for ChromatographicPeak {
    fn coordinate(&self) -> f64 {
        self.center
    }
}

impl IntensityMeasurement for ChromatographicPeak {
    fn intensity(&self) -> f32 {
        self.height as f32
    }
}

impl fmt::Display for ChromatographicPeak {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "ChromatographicPeak({}, {}..{}, {}, {}, {}, {}, {}%)",
            self.center,
            self.left,
            self.right,
            self.height,
            self.width,
            self.decay,
            self.area,
            self.fit_error
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_coordinates() {
        let peak = ChromatographicPeak {
            center: 5.5,
            height: 1e3,
            area: 10.0,
            ..Default::default()
        };
        assert_eq!(Time::coordinate(&peak), 5.5);
        assert_eq!(peak.intensity(), 1e3);
        assert!(!peak.is_empty());

        let later = ChromatographicPeak {
            center: 7.0,
            ..Default::default()
        };
        assert!(peak < later);
    }

    #[test]
    fn test_empty() {
        let peak = ChromatographicPeak::empty(4);
        assert!(peak.is_empty());
        assert_eq!(peak.fit, vec![0.0; 4]);
        assert_eq!(peak.area, 0.0);
        assert_eq!(peak.fit_error, 0.0);
        assert_eq!(
            peak.to_string(),
            "ChromatographicPeak(0, 0..0, 0, 0, 0, 0, 0%)"
        );
    }
}
