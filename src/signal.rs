//! Data containers for chromatographic signals: a time axis paired with one or more
//! intensity columns, and mass spectrometry data with a mass axis over the columns.
//!
//! All containers validate their shape on construction. Processing functions borrow
//! these types and return freshly allocated results, so a [`Signal`] or
//! [`MassChannelMatrix`] is never modified behind its owner's back.
use std::ops::Range;

use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::arrayops::is_strictly_increasing;

/// All the ways a signal container can fail validation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignalError {
    #[error("The {name} has {found} values, expected {expected}")]
    LengthMismatch {
        name: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("The intensity matrix has {columns} columns but the mass axis has {masses} values")]
    MassAxisMismatch { columns: usize, masses: usize },
    #[error("The time axis is not strictly increasing at index {0}")]
    TimeNotIncreasing(usize),
    #[error("Column index {index} is out of bounds for a matrix with {columns} columns")]
    ColumnOutOfBounds { index: usize, columns: usize },
    #[error("Selecting by mass requires a mass axis, which a plain signal does not have")]
    NoMassAxis,
    #[error("The intensity matrix storage has {found} values, expected {rows} x {columns}")]
    StorageMismatch {
        rows: usize,
        columns: usize,
        found: usize,
    },
}

/// Which intensity columns an operation should act on
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Selection {
    /// Every column of the matrix
    #[default]
    All,
    /// Only the listed column indices, in the order given
    Indices(Vec<usize>),
    /// The total intensity column of a [`MassChannelMatrix`]
    Total,
    /// The columns whose mass matches one of the listed values within the mass precision
    Masses(Vec<f64>),
}

/// A dense time-by-column intensity matrix.
///
/// Values are stored column-major so every column is one contiguous slice, which
/// is the unit of work for all per-column algorithms.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IntensityMatrix {
    rows: usize,
    columns: usize,
    data: Vec<f64>,
}

impl IntensityMatrix {
    /// Create a zero-filled matrix
    pub fn zeros(rows: usize, columns: usize) -> Self {
        Self {
            rows,
            columns,
            data: vec![0.0; rows * columns],
        }
    }

    /// Wrap column-major `data` of shape `rows` x `columns`
    pub fn from_column_major(
        rows: usize,
        columns: usize,
        data: Vec<f64>,
    ) -> Result<Self, SignalError> {
        if data.len() != rows * columns {
            return Err(SignalError::StorageMismatch {
                rows,
                columns,
                found: data.len(),
            });
        }
        Ok(Self {
            rows,
            columns,
            data,
        })
    }

    /// Build a matrix from a list of equal-length columns
    pub fn from_columns<C: AsRef<[f64]>>(columns: &[C]) -> Result<Self, SignalError> {
        let rows = columns.first().map(|c| c.as_ref().len()).unwrap_or_default();
        let mut data = Vec::with_capacity(rows * columns.len());
        for col in columns {
            let col = col.as_ref();
            if col.len() != rows {
                return Err(SignalError::LengthMismatch {
                    name: "intensity column",
                    expected: rows,
                    found: col.len(),
                });
            }
            data.extend_from_slice(col);
        }
        Ok(Self {
            rows,
            columns: columns.len(),
            data,
        })
    }

    /// Build a matrix from row-major scans, one `Vec` per time point
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self, SignalError> {
        let n = rows.len();
        let m = rows.first().map(|r| r.as_ref().len()).unwrap_or_default();
        let mut data = vec![0.0; n * m];
        for (i, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != m {
                return Err(SignalError::LengthMismatch {
                    name: "intensity row",
                    expected: m,
                    found: row.len(),
                });
            }
            for (j, v) in row.iter().enumerate() {
                data[j * n + i] = *v;
            }
        }
        Ok(Self {
            rows: n,
            columns: m,
            data,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.columns)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn column_range(&self, index: usize) -> Range<usize> {
        (index * self.rows)..((index + 1) * self.rows)
    }

    pub fn column(&self, index: usize) -> &[f64] {
        &self.data[self.column_range(index)]
    }

    pub fn column_mut(&mut self, index: usize) -> &mut [f64] {
        let range = self.column_range(index);
        &mut self.data[range]
    }

    pub fn iter_columns(&self) -> impl ExactSizeIterator<Item = &[f64]> + '_ {
        // `chunks_exact(0)` panics, so substitute a width that yields nothing
        let width = self.rows.max(1);
        let n = if self.rows == 0 { 0 } else { self.columns };
        self.data.chunks_exact(width).take(n)
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.data
    }

    /// Copy the listed columns into a new matrix
    pub fn select_columns(&self, indices: &[usize]) -> Result<Self, SignalError> {
        let mut data = Vec::with_capacity(self.rows * indices.len());
        for i in indices.iter().copied() {
            if i >= self.columns {
                return Err(SignalError::ColumnOutOfBounds {
                    index: i,
                    columns: self.columns,
                });
            }
            data.extend_from_slice(self.column(i));
        }
        Ok(Self {
            rows: self.rows,
            columns: indices.len(),
            data,
        })
    }

    /// Sum every row across all columns
    pub fn row_sums(&self) -> Vec<f64> {
        let mut acc = vec![0.0; self.rows];
        for col in self.iter_columns() {
            acc.iter_mut().zip(col).for_each(|(a, v)| *a += *v);
        }
        acc
    }

    /// Element-wise `self - other`, used to apply a baseline
    pub fn subtract(&self, other: &Self) -> Result<Self, SignalError> {
        if self.shape() != other.shape() {
            return Err(SignalError::LengthMismatch {
                name: "subtrahend matrix",
                expected: self.data.len(),
                found: other.data.len(),
            });
        }
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| a - b)
            .collect();
        Ok(Self {
            rows: self.rows,
            columns: self.columns,
            data,
        })
    }
}

/// A time axis paired with one or more co-indexed intensity columns
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Signal {
    time: Vec<f64>,
    intensity: IntensityMatrix,
}

impl Signal {
    /// Pair `time` with `intensity`, checking that every column has one value per time point
    /// and that time is strictly increasing.
    pub fn new(time: Vec<f64>, intensity: IntensityMatrix) -> Result<Self, SignalError> {
        validate_time(&time)?;
        if intensity.rows() != time.len() {
            return Err(SignalError::LengthMismatch {
                name: "intensity matrix",
                expected: time.len(),
                found: intensity.rows(),
            });
        }
        Ok(Self { time, intensity })
    }

    /// A single-column signal
    pub fn from_trace(time: Vec<f64>, intensity: Vec<f64>) -> Result<Self, SignalError> {
        let n = intensity.len();
        Self::new(time, IntensityMatrix::from_column_major(n, 1, intensity)?)
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn intensity(&self) -> &IntensityMatrix {
        &self.intensity
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn columns(&self) -> usize {
        self.intensity.columns()
    }

    pub fn column(&self, index: usize) -> &[f64] {
        self.intensity.column(index)
    }

    /// Replace the intensity columns, keeping the time axis
    pub fn with_intensity(&self, intensity: IntensityMatrix) -> Result<Self, SignalError> {
        Self::new(self.time.clone(), intensity)
    }

    /// Keep only the time points in `range`, resizing every column in lockstep
    pub fn slice(&self, range: Range<usize>) -> Self {
        let time = self.time[range.clone()].to_vec();
        let mut data = Vec::with_capacity(time.len() * self.columns());
        for col in self.intensity.iter_columns() {
            data.extend_from_slice(&col[range.clone()]);
        }
        let intensity = IntensityMatrix {
            rows: time.len(),
            columns: self.columns(),
            data,
        };
        Self { time, intensity }
    }

    pub fn into_inner(self) -> (Vec<f64>, IntensityMatrix) {
        (self.time, self.intensity)
    }
}

/// Mass spectrometry data: a time axis, a total intensity column and an intensity
/// matrix whose columns correspond to the values of the mass axis.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MassChannelMatrix {
    time: Vec<f64>,
    total_intensity: Vec<f64>,
    mz: Vec<f64>,
    intensity: IntensityMatrix,
}

impl MassChannelMatrix {
    /// Create a new mass channel matrix, computing the total intensity column from the
    /// channels.
    pub fn new(
        time: Vec<f64>,
        mz: Vec<f64>,
        intensity: IntensityMatrix,
    ) -> Result<Self, SignalError> {
        let total_intensity = intensity.row_sums();
        Self::with_total(time, total_intensity, mz, intensity)
    }

    /// Create a new mass channel matrix with an externally recorded total intensity column
    pub fn with_total(
        time: Vec<f64>,
        total_intensity: Vec<f64>,
        mz: Vec<f64>,
        intensity: IntensityMatrix,
    ) -> Result<Self, SignalError> {
        validate_time(&time)?;
        if total_intensity.len() != time.len() {
            return Err(SignalError::LengthMismatch {
                name: "total intensity column",
                expected: time.len(),
                found: total_intensity.len(),
            });
        }
        if intensity.rows() != time.len() {
            return Err(SignalError::LengthMismatch {
                name: "intensity matrix",
                expected: time.len(),
                found: intensity.rows(),
            });
        }
        if intensity.columns() != mz.len() {
            return Err(SignalError::MassAxisMismatch {
                columns: intensity.columns(),
                masses: mz.len(),
            });
        }
        Ok(Self {
            time,
            total_intensity,
            mz,
            intensity,
        })
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn mz(&self) -> &[f64] {
        &self.mz
    }

    pub fn intensity(&self) -> &IntensityMatrix {
        &self.intensity
    }

    pub fn total_intensity(&self) -> &[f64] {
        &self.total_intensity
    }

    /// Recompute the total intensity column from the current channels
    pub fn tic(&self) -> Vec<f64> {
        self.intensity.row_sums()
    }

    /// Sum the channels whose mass lies within `tolerance` of any of `masses`
    pub fn xic(&self, masses: &[f64], tolerance: f64) -> Vec<f64> {
        let mut acc = vec![0.0; self.time.len()];
        for (j, mz) in self.mz.iter().enumerate() {
            if masses.iter().any(|m| (m - mz).abs() <= tolerance) {
                acc.iter_mut()
                    .zip(self.intensity.column(j))
                    .for_each(|(a, v)| *a += *v);
            }
        }
        acc
    }

    /// Round every mass to `precision` decimal places. Centroiding expects
    /// pre-quantized masses.
    pub fn round_masses(&self, precision: u32) -> Self {
        let mut dup = self.clone();
        dup.mz.iter_mut().for_each(|m| *m = round_to(*m, precision));
        dup
    }

    /// Replace the mass axis and channels, e.g. after centroiding
    pub fn with_channels(
        &self,
        mz: Vec<f64>,
        intensity: IntensityMatrix,
    ) -> Result<Self, SignalError> {
        Self::with_total(
            self.time.clone(),
            self.total_intensity.clone(),
            mz,
            intensity,
        )
    }

    /// Resolve a [`Selection`] to a [`Signal`] with the chosen columns
    pub fn select(&self, selection: &Selection, precision: u32) -> Result<Signal, SignalError> {
        match selection {
            Selection::All => Signal::new(self.time.clone(), self.intensity.clone()),
            Selection::Total => Signal::from_trace(self.time.clone(), self.total_intensity.clone()),
            Selection::Indices(indices) => {
                Signal::new(self.time.clone(), self.intensity.select_columns(indices)?)
            }
            Selection::Masses(masses) => {
                let tolerance = 0.5 * 10f64.powi(-(precision as i32));
                let indices: Vec<usize> = self
                    .mz
                    .iter()
                    .enumerate()
                    .filter(|(_, mz)| masses.iter().any(|m| (*m - **mz).abs() <= tolerance))
                    .map(|(i, _)| i)
                    .collect();
                Signal::new(self.time.clone(), self.intensity.select_columns(&indices)?)
            }
        }
    }

    pub fn into_inner(self) -> (Vec<f64>, Vec<f64>, Vec<f64>, IntensityMatrix) {
        (self.time, self.total_intensity, self.mz, self.intensity)
    }
}

impl Selection {
    /// Resolve the selection against a plain [`Signal`], where [`Selection::Total`] sums
    /// over all columns. [`Selection::Masses`] needs a mass axis and is an error here.
    pub fn resolve(&self, signal: &Signal) -> Result<Signal, SignalError> {
        match self {
            Selection::All => Ok(signal.clone()),
            Selection::Indices(indices) => {
                signal.with_intensity(signal.intensity().select_columns(indices)?)
            }
            Selection::Total => {
                Signal::from_trace(signal.time().to_vec(), signal.intensity().row_sums())
            }
            Selection::Masses(_) => Err(SignalError::NoMassAxis),
        }
    }
}

/// Round `value` to `precision` decimal places
pub fn round_to(value: f64, precision: u32) -> f64 {
    let scale = 10f64.powi(precision as i32);
    (value * scale).round() / scale
}

fn validate_time(time: &[f64]) -> Result<(), SignalError> {
    if is_strictly_increasing(time) {
        return Ok(());
    }
    let index = time
        .windows(2)
        .position(|w| !(w[0] < w[1]))
        .map(|i| i + 1)
        .unwrap_or_default();
    Err(SignalError::TimeNotIncreasing(index))
}

#[cfg(test)]
mod test {
    use super::*;

    fn mass_matrix() -> MassChannelMatrix {
        let intensity = IntensityMatrix::from_rows(&[
            vec![1.0, 0.0, 2.0],
            vec![0.0, 3.0, 2.0],
            vec![1.0, 1.0, 0.0],
        ])
        .unwrap();
        MassChannelMatrix::new(vec![0.0, 0.5, 1.0], vec![50.1234, 50.1236, 51.0], intensity)
            .unwrap()
    }

    #[test]
    fn test_shape_validation() {
        let err = Signal::from_trace(vec![0.0, 1.0, 2.0], vec![1.0, 2.0]).unwrap_err();
        assert_eq!(
            err,
            SignalError::LengthMismatch {
                name: "intensity matrix",
                expected: 3,
                found: 2
            }
        );

        let err = Signal::from_trace(vec![0.0, 2.0, 1.0], vec![1.0, 2.0, 3.0]).unwrap_err();
        assert_eq!(err, SignalError::TimeNotIncreasing(2));

        let err = MassChannelMatrix::new(
            vec![0.0, 1.0],
            vec![10.0],
            IntensityMatrix::zeros(2, 2),
        )
        .unwrap_err();
        assert_eq!(
            err,
            SignalError::MassAxisMismatch {
                columns: 2,
                masses: 1
            }
        );
    }

    #[test]
    fn test_row_major_layout() {
        let m = mass_matrix();
        assert_eq!(m.intensity().column(1), &[0.0, 3.0, 1.0]);
        assert_eq!(m.intensity().column(2), &[2.0, 2.0, 0.0]);
        assert_eq!(m.total_intensity(), &[3.0, 5.0, 2.0]);
    }

    #[test]
    fn test_selection() {
        let m = mass_matrix().round_masses(3);
        assert_eq!(m.mz(), &[50.123, 50.124, 51.0]);

        let s = m.select(&Selection::Masses(vec![51.0]), 3).unwrap();
        assert_eq!(s.columns(), 1);
        assert_eq!(s.column(0), &[2.0, 2.0, 0.0]);

        let s = m.select(&Selection::Total, 3).unwrap();
        assert_eq!(s.column(0), &[3.0, 5.0, 2.0]);

        let err = m.select(&Selection::Indices(vec![4]), 3).unwrap_err();
        assert_eq!(
            err,
            SignalError::ColumnOutOfBounds {
                index: 4,
                columns: 3
            }
        );

        assert_eq!(m.xic(&[50.1235], 0.001), vec![1.0, 3.0, 2.0]);
    }

    #[test]
    fn test_resolve_on_plain_signal() {
        let signal = mass_matrix().select(&Selection::All, 3).unwrap();
        let total = Selection::Total.resolve(&signal).unwrap();
        assert_eq!(total.column(0), &[3.0, 5.0, 2.0]);

        let picked = Selection::Indices(vec![2, 0]).resolve(&signal).unwrap();
        assert_eq!(picked.column(0), &[2.0, 2.0, 0.0]);

        let err = Selection::Masses(vec![51.0]).resolve(&signal).unwrap_err();
        assert_eq!(err, SignalError::NoMassAxis);
    }

    #[test]
    fn test_slice_keeps_columns_in_lockstep() {
        let m = mass_matrix();
        let s = m.select(&Selection::All, 3).unwrap().slice(1..3);
        assert_eq!(s.time(), &[0.5, 1.0]);
        assert_eq!(s.column(0), &[0.0, 1.0]);
        assert_eq!(s.columns(), 3);
    }
}
