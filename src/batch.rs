//! Distribute independent per-column work over a bounded worker pool.
//!
//! When the `parallelism` feature is enabled, tasks run on the global `rayon` pool, which
//! is sized to the available cores. Otherwise they run in order on the calling thread.
//! Every task writes only to its own output slot, so no locking is needed.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[cfg(feature = "parallelism")]
use rayon::prelude::*;

use crate::signal::IntensityMatrix;

/// A shared flag that stops a batch from starting any further columns.
///
/// Columns already in progress run to completion.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// The per-task results of a batch, in task order.
///
/// A slot is `None` only if the batch was cancelled before that task started.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult<T> {
    pub results: Vec<Option<T>>,
    pub cancelled: bool,
}

impl<T> BatchResult<T> {
    /// The number of tasks that finished
    pub fn completed(&self) -> usize {
        self.results.iter().filter(|r| r.is_some()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.results.iter().all(|r| r.is_some())
    }

    /// All results if every task finished
    pub fn into_complete(self) -> Option<Vec<T>> {
        self.results.into_iter().collect()
    }
}

impl BatchResult<Vec<f64>> {
    /// Assemble per-column results into a matrix with `rows` rows, leaving
    /// unfinished columns zero-filled.
    pub fn to_matrix(&self, rows: usize) -> IntensityMatrix {
        let mut matrix = IntensityMatrix::zeros(rows, self.results.len());
        for (i, col) in self.results.iter().enumerate() {
            if let Some(col) = col {
                matrix.column_mut(i).copy_from_slice(col);
            }
        }
        matrix
    }
}

/// Run `task` for every index in `0..n`, checking `cancel` before each one starts
pub fn map_tasks<T, F>(n: usize, cancel: Option<&Cancellation>, task: F) -> BatchResult<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    let run = |i: usize| -> Option<T> {
        if cancel.is_some_and(|c| c.is_cancelled()) {
            None
        } else {
            Some(task(i))
        }
    };
    #[cfg(feature = "parallelism")]
    let results: Vec<Option<T>> = (0..n).into_par_iter().map(run).collect();
    #[cfg(not(feature = "parallelism"))]
    let results: Vec<Option<T>> = (0..n).map(run).collect();
    let cancelled = results.iter().any(|r| r.is_none());
    BatchResult { results, cancelled }
}

/// A transformation applied independently to each intensity column of a matrix
pub trait ColumnTransform: Sync {
    /// Transform one column, returning a new column of the same length
    fn transform_column(&self, column: &[f64]) -> Vec<f64>;

    /// Transform every column of `matrix`, honoring `cancel` between columns
    fn transform_cancellable(
        &self,
        matrix: &IntensityMatrix,
        cancel: Option<&Cancellation>,
    ) -> BatchResult<Vec<f64>> {
        map_tasks(matrix.columns(), cancel, |i| {
            self.transform_column(matrix.column(i))
        })
    }

    /// Transform every column of `matrix` into a new matrix of the same shape
    fn transform(&self, matrix: &IntensityMatrix) -> IntensityMatrix {
        self.transform_cancellable(matrix, None)
            .to_matrix(matrix.rows())
    }
}
