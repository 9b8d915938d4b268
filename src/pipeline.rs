//! Chain the processing stages over a whole data set.
//!
//! A [`Pipeline`] centroids mass channels, removes the baseline, smooths, and fits one
//! peak per selected column. Every stage is optional except the fit. Stages borrow their
//! input and allocate a new result, so the source data is never modified.
use log::{debug, info};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::baseline::{baseline, BaselineConfig};
use crate::batch::{map_tasks, BatchResult, Cancellation};
use crate::centroid::{centroid_channels, CentroidConfig};
use crate::peak::ChromatographicPeak;
use crate::peak_detection::DetectConfig;
use crate::peak_fit::PeakFitter;
use crate::signal::{MassChannelMatrix, Selection, Signal, SignalError};
use crate::smooth::{smooth, SmoothConfig};

/// The default number of decimal places masses are rounded to before centroiding
pub const DEFAULT_MASS_PRECISION: u32 = 3;

/// Fit one peak to every selected column of `signal`, checking `cancel` before each column.
///
/// Columns finished before a cancellation are kept, the rest are `None`.
pub fn integrate(
    signal: &Signal,
    selection: &Selection,
    fitter: &PeakFitter,
    cancel: Option<&Cancellation>,
) -> Result<BatchResult<ChromatographicPeak>, SignalError> {
    let selected = selection.resolve(signal)?;
    let time = selected.time();
    let peaks = map_tasks(selected.columns(), cancel, |i| {
        fitter.fit(time, selected.column(i))
    });
    debug!(
        "Integrated {} of {} columns",
        peaks.completed(),
        selected.columns()
    );
    Ok(peaks)
}

/// Typed configuration for the full processing chain
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pipeline {
    /// Decimal places to round masses to before centroiding
    pub precision: u32,
    pub centroid: Option<CentroidConfig>,
    pub baseline: Option<BaselineConfig>,
    pub smooth: Option<SmoothConfig>,
    pub detect: DetectConfig,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            precision: DEFAULT_MASS_PRECISION,
            centroid: Some(CentroidConfig::default()),
            baseline: Some(BaselineConfig::default()),
            smooth: Some(SmoothConfig::default()),
            detect: DetectConfig::default(),
        }
    }
}

impl Pipeline {
    pub fn precision(mut self, precision: u32) -> Self {
        self.precision = precision;
        self
    }

    pub fn centroid(mut self, centroid: Option<CentroidConfig>) -> Self {
        self.centroid = centroid;
        self
    }

    pub fn baseline(mut self, baseline: Option<BaselineConfig>) -> Self {
        self.baseline = baseline;
        self
    }

    pub fn smooth(mut self, smooth: Option<SmoothConfig>) -> Self {
        self.smooth = smooth;
        self
    }

    pub fn detect(mut self, detect: DetectConfig) -> Self {
        self.detect = detect;
        self
    }

    pub fn fitter(&self) -> PeakFitter {
        PeakFitter::new(self.detect)
    }

    /// Subtract the baseline and smooth every column of `signal`
    pub fn correct(&self, signal: &Signal) -> Result<Signal, SignalError> {
        let mut intensity = signal.intensity().clone();
        if let Some(config) = self.baseline.as_ref() {
            let floor = baseline(&intensity, config);
            intensity = intensity.subtract(&floor)?;
        }
        if let Some(config) = self.smooth.as_ref() {
            intensity = smooth(&intensity, config);
        }
        signal.with_intensity(intensity)
    }

    /// Round and centroid the mass channels of `data`, then correct the selected columns
    pub fn prepare(
        &self,
        data: &MassChannelMatrix,
        selection: &Selection,
    ) -> Result<Signal, SignalError> {
        let mut data = data.round_masses(self.precision);
        if let Some(config) = self.centroid.as_ref() {
            let before = data.mz().len();
            data = centroid_channels(&data, config)?;
            info!("Centroided {before} channels down to {}", data.mz().len());
        }
        let selected = data.select(selection, self.precision)?;
        self.correct(&selected)
    }

    /// Correct `signal` and fit one peak per selected column
    pub fn run(
        &self,
        signal: &Signal,
        selection: &Selection,
        cancel: Option<&Cancellation>,
    ) -> Result<BatchResult<ChromatographicPeak>, SignalError> {
        let selected = selection.resolve(signal)?;
        let corrected = self.correct(&selected)?;
        integrate(&corrected, &Selection::All, &self.fitter(), cancel)
    }

    /// Prepare the selected channels of `data` and fit one peak per column
    pub fn run_channels(
        &self,
        data: &MassChannelMatrix,
        selection: &Selection,
        cancel: Option<&Cancellation>,
    ) -> Result<BatchResult<ChromatographicPeak>, SignalError> {
        let corrected = self.prepare(data, selection)?;
        integrate(&corrected, &Selection::All, &self.fitter(), cancel)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use std::f64::consts::PI;

    use rstest::{fixture, rstest};

    use crate::signal::IntensityMatrix;
    use crate::test_data::{drifting_chromatogram, gaussian};

    #[fixture]
    fn two_columns() -> Signal {
        let (x, a) = drifting_chromatogram(600);
        let b: Vec<f64> = x
            .iter()
            .zip(gaussian(&x, 9.0, 60.0, 0.7))
            .map(|(t, g)| 2.0 + 0.1 * t + g)
            .collect();
        Signal::new(x, IntensityMatrix::from_columns(&[a, b]).unwrap()).unwrap()
    }

    #[rstest]
    fn test_run_recovers_peaks(two_columns: Signal) {
        let peaks = Pipeline::default()
            .run(&two_columns, &Selection::All, None)
            .unwrap()
            .into_complete()
            .unwrap();
        assert_eq!(peaks.len(), 2);

        let expected = [(14.0, 200.0 * 0.5), (9.0, 60.0 * 0.7)];
        for (peak, (center, scale)) in peaks.iter().zip(expected) {
            let area = scale * (2.0 * PI).sqrt();
            assert!((peak.center - center).abs() < 0.05, "{peak}");
            assert!((peak.area - area).abs() < 0.05 * area, "{peak} vs {area}");
            assert!(peak.fit_error < 1.0, "{peak}");
        }
    }

    #[rstest]
    fn test_integrate_selected_columns(two_columns: Signal) {
        let corrected = Pipeline::default().correct(&two_columns).unwrap();
        let fitter = PeakFitter::default();
        let both = integrate(&corrected, &Selection::All, &fitter, None).unwrap();
        let second = integrate(&corrected, &Selection::Indices(vec![1]), &fitter, None).unwrap();
        assert_eq!(second.results.len(), 1);
        assert_eq!(second.results[0], both.results[1]);
    }

    #[rstest]
    fn test_cancelled_run_keeps_shape(two_columns: Signal) {
        let cancel = Cancellation::new();
        cancel.cancel();
        let result = Pipeline::default()
            .run(&two_columns, &Selection::All, Some(&cancel))
            .unwrap();
        assert!(result.cancelled);
        assert_eq!(result.results.len(), 2);
    }

    #[test]
    fn test_bad_selection_is_an_error() {
        let signal = Signal::from_trace(vec![0.0, 1.0, 2.0, 3.0], vec![0.0; 4]).unwrap();
        let err = Pipeline::default()
            .run(&signal, &Selection::Indices(vec![3]), None)
            .unwrap_err();
        assert_eq!(err, SignalError::ColumnOutOfBounds { index: 3, columns: 1 });
    }

    #[test]
    fn test_run_channels() {
        let (x, a) = drifting_chromatogram(300);
        let b: Vec<f64> = a
            .iter()
            .enumerate()
            .map(|(i, v)| if i % 2 == 0 { *v } else { 0.0 })
            .collect();
        let c: Vec<f64> = a
            .iter()
            .enumerate()
            .map(|(i, v)| if i % 2 == 1 && i < 100 { *v } else { 0.0 })
            .collect();
        let d: Vec<f64> = a.iter().map(|v| 0.5 * v).collect();
        let data = MassChannelMatrix::new(
            x,
            vec![50.0, 100.0001, 100.0002, 250.0],
            IntensityMatrix::from_columns(&[d, b, c, a]).unwrap(),
        )
        .unwrap();

        let pipeline = Pipeline::default().baseline(None).smooth(None);
        let prepared = pipeline.prepare(&data, &Selection::All).unwrap();
        // The sparser fragment of m/z 100.000 fills the gaps of the denser one
        assert_eq!(prepared.columns(), 3);
        assert!(prepared.column(1)[..100].iter().all(|v| *v > 0.0));

        let peaks = pipeline
            .run_channels(&data, &Selection::Masses(vec![250.0]), None)
            .unwrap();
        assert_eq!(peaks.results.len(), 1);
        let peak = peaks.results[0].as_ref().unwrap();
        assert!((peak.center - 14.0).abs() < 0.1, "{peak}");
    }
}
