//! Collapse fragmented mass channels onto their best-populated neighbour.
//!
//! Mass values are expected to be quantized already (see [`MassChannelMatrix::round_masses`]),
//! so fragments of the same channel show up as runs of adjacent columns sharing a mass value.
//! Each sweep lets every interior column absorb a sparser same-mass neighbour, then the
//! emptied columns are dropped. The first and last columns of the matrix never absorb.
//!
//! Large matrices are split into blocks that never break a run of identical masses. Since
//! merging only happens within a run, blocks are independent and are processed in parallel.
//! Each block is told whether it holds the matrix edges so it treats them the same way.
use std::ops::Range;

use log::{debug, trace};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::batch::map_tasks;
use crate::signal::{IntensityMatrix, MassChannelMatrix, SignalError};

/// The default memory budget of a single block, 10 MiB of intensity values
pub const DEFAULT_BLOCK_BYTES: usize = 10 * 1024 * 1024;

/// Parameters for [`centroid`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CentroidConfig {
    /// The maximum number of merge sweeps
    pub iterations: usize,
    /// The approximate number of bytes of intensity data to process per block
    pub block_bytes: usize,
}

impl Default for CentroidConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            block_bytes: DEFAULT_BLOCK_BYTES,
        }
    }
}

impl CentroidConfig {
    pub fn iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn block_bytes(mut self, block_bytes: usize) -> Self {
        self.block_bytes = block_bytes;
        self
    }
}

/// Split the column range `0..mz.len()` into contiguous blocks of roughly `block_bytes`
/// of `f64` storage each, extending every block to the end of its run of equal masses.
pub fn plan_blocks(mz: &[f64], rows: usize, block_bytes: usize) -> Vec<Range<usize>> {
    let column_bytes = (rows * std::mem::size_of::<f64>()).max(1);
    let per_block = (block_bytes / column_bytes).max(1);
    let mut blocks = Vec::new();
    let mut start = 0;
    while start < mz.len() {
        let mut end = (start + per_block).min(mz.len());
        while end < mz.len() && mz[end] == mz[end - 1] {
            end += 1;
        }
        blocks.push(start..end);
        start = end;
    }
    blocks
}

fn nonzero(column: &[f64]) -> usize {
    column.iter().filter(|v| **v != 0.0).count()
}

/// Borrow `columns[target]` and `columns[source]` mutably at the same time
fn pair_mut(columns: &mut [Vec<f64>], target: usize, source: usize) -> (&mut [f64], &mut [f64]) {
    if target < source {
        let (lo, hi) = columns.split_at_mut(source);
        (&mut lo[target], &mut hi[0])
    } else {
        let (lo, hi) = columns.split_at_mut(target);
        (&mut hi[0], &mut lo[source])
    }
}

/// Fill the gaps of `target` from `source`, then empty `source`
fn merge_into(target: &mut [f64], source: &mut [f64]) {
    for (t, s) in target.iter_mut().zip(source.iter_mut()) {
        if *t == 0.0 && *s != 0.0 {
            *t = *s;
        }
        *s = 0.0;
    }
}

/// Which ends of a block are also ends of the whole matrix
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct BlockEdges {
    leading: bool,
    trailing: bool,
}

/// One pass over the interior columns, returning the number of merges performed
fn sweep(mz: &[f64], columns: &mut [Vec<f64>], edges: BlockEdges) -> usize {
    let n = columns.len();
    let start = usize::from(edges.leading);
    let end = if edges.trailing { n.saturating_sub(1) } else { n };
    let mut merges = 0;
    for i in start..end {
        for j in [i.checked_sub(1), Some(i + 1)].into_iter().flatten() {
            if j >= n || mz[j] != mz[i] {
                continue;
            }
            if nonzero(&columns[j]) < nonzero(&columns[i]) {
                let (target, source) = pair_mut(columns, i, j);
                merge_into(target, source);
                merges += 1;
            }
        }
    }
    merges
}

/// Drop every all-zero column along with its mass, returning how many were removed
fn drop_empty(mz: &mut Vec<f64>, columns: &mut Vec<Vec<f64>>) -> usize {
    let before = columns.len();
    let keep: Vec<bool> = columns.iter().map(|c| nonzero(c) > 0).collect();
    let mut it = keep.iter();
    mz.retain(|_| *it.next().unwrap_or(&false));
    let mut it = keep.iter();
    columns.retain(|_| *it.next().unwrap_or(&false));
    before - columns.len()
}

/// Centroid the columns in `block`. `first` gives the edges during the first sweep and
/// `later` once the all-zero blocks around it have been dropped.
fn centroid_block(
    mz: &[f64],
    y: &IntensityMatrix,
    block: Range<usize>,
    (first, later): (BlockEdges, BlockEdges),
    iterations: usize,
) -> (Vec<f64>, Vec<Vec<f64>>) {
    let mut block_mz = mz[block.clone()].to_vec();
    let mut columns: Vec<Vec<f64>> = block.clone().map(|i| y.column(i).to_vec()).collect();
    for iteration in 0..iterations {
        let edges = if iteration == 0 { first } else { later };
        let merges = sweep(&block_mz, &mut columns, edges);
        let dropped = drop_empty(&mut block_mz, &mut columns);
        trace!(
            "Block {block:?} sweep {iteration}: {merges} merges, {dropped} columns dropped"
        );
        if dropped == 0 {
            break;
        }
    }
    (block_mz, columns)
}

/// Merge duplicate-mass channels of `y`, returning the reduced mass axis and matrix.
///
/// The output is always freshly allocated and its column count matches the returned
/// mass axis.
pub fn centroid(
    mz: &[f64],
    y: &IntensityMatrix,
    config: &CentroidConfig,
) -> Result<(Vec<f64>, IntensityMatrix), SignalError> {
    if mz.len() != y.columns() {
        return Err(SignalError::MassAxisMismatch {
            columns: y.columns(),
            masses: mz.len(),
        });
    }
    let blocks = plan_blocks(mz, y.rows(), config.block_bytes);
    debug!(
        "Centroiding {} channels in {} blocks",
        mz.len(),
        blocks.len()
    );
    // Blocks of empty columns vanish after the first sweep, moving the matrix edges inwards
    let occupied: Vec<bool> = blocks
        .iter()
        .map(|block| block.clone().any(|i| nonzero(y.column(i)) > 0))
        .collect();
    let edges = |b: usize| {
        let first = BlockEdges {
            leading: blocks[b].start == 0,
            trailing: blocks[b].end == mz.len(),
        };
        let later = BlockEdges {
            leading: !occupied[..b].iter().any(|o| *o),
            trailing: !occupied[b + 1..].iter().any(|o| *o),
        };
        (first, later)
    };
    let parts = map_tasks(blocks.len(), None, |b| {
        centroid_block(mz, y, blocks[b].clone(), edges(b), config.iterations)
    });

    let mut out_mz = Vec::with_capacity(mz.len());
    let mut out_columns = Vec::with_capacity(mz.len());
    for (block_mz, columns) in parts.results.into_iter().flatten() {
        out_mz.extend(block_mz);
        out_columns.extend(columns);
    }
    debug!("Centroiding kept {} of {} channels", out_mz.len(), mz.len());
    let matrix = if out_columns.is_empty() {
        IntensityMatrix::zeros(y.rows(), 0)
    } else {
        IntensityMatrix::from_columns(&out_columns)?
    };
    Ok((out_mz, matrix))
}

/// Centroid the channels of a [`MassChannelMatrix`], keeping its time axis and
/// total intensity column
pub fn centroid_channels(
    data: &MassChannelMatrix,
    config: &CentroidConfig,
) -> Result<MassChannelMatrix, SignalError> {
    let (mz, intensity) = centroid(data.mz(), data.intensity(), config)?;
    data.with_channels(mz, intensity)
}

#[cfg(test)]
mod test {
    use super::*;

    use rstest::{fixture, rstest};

    use crate::test_data::noise;

    #[fixture]
    fn fragmented() -> (Vec<f64>, IntensityMatrix) {
        let rows = 25;
        let mut mz = Vec::new();
        let mut columns = Vec::new();
        for (k, width) in [3usize, 1, 4, 2, 5, 1, 3].iter().enumerate() {
            for f in 0..*width {
                mz.push(100.0 + k as f64 * 0.5);
                let col: Vec<f64> = noise(rows, (k * 10 + f) as u64, 1.0)
                    .into_iter()
                    .map(|v| if v > 0.3 { v * 100.0 } else { 0.0 })
                    .collect();
                columns.push(col);
            }
        }
        (mz, IntensityMatrix::from_columns(&columns).unwrap())
    }

    #[test]
    fn test_merge_example() {
        let mz = vec![0.0, 1.0, 1.0, 2.0];
        let y = IntensityMatrix::from_columns(&[
            vec![9.0, 9.0, 9.0],
            vec![1.0, 0.0, 1.0],
            vec![0.0, 5.0, 0.0],
            vec![3.0, 3.0, 3.0],
        ])
        .unwrap();
        let (mz2, y2) = centroid(&mz, &y, &CentroidConfig::default()).unwrap();
        assert_eq!(mz2, vec![0.0, 1.0, 2.0]);
        assert_eq!(y2.column(1), &[1.0, 5.0, 1.0]);
        assert_eq!(y2.column(2), &[3.0, 3.0, 3.0]);
    }

    #[test]
    fn test_edge_columns_never_absorb() {
        let mz = vec![1.0, 1.0];
        let columns = [vec![1.0, 1.0, 0.0], vec![0.0, 0.0, 4.0]];
        let y = IntensityMatrix::from_columns(&columns).unwrap();
        let (mz2, y2) = centroid(&mz, &y, &CentroidConfig::default()).unwrap();
        assert_eq!(mz2, mz);
        assert_eq!(y2, y);
    }

    #[rstest]
    #[case::block_edge_is_interior(vec![9.0, 9.0, 9.0])]
    #[case::empty_leading_block(vec![0.0, 0.0, 0.0])]
    fn test_block_edges_follow_matrix(
        #[case] first: Vec<f64>,
        #[values(1, 48, 1000)] block_bytes: usize,
    ) {
        let mz = vec![0.0, 1.0, 1.0, 2.0, 2.0];
        let y = IntensityMatrix::from_columns(&[
            first,
            vec![1.0, 0.0, 1.0],
            vec![0.0, 5.0, 0.0],
            vec![0.0, 0.0, 3.0],
            vec![3.0, 3.0, 0.0],
        ])
        .unwrap();
        let config = CentroidConfig::default();
        let whole = centroid(&mz, &y, &config).unwrap();
        let blocked = centroid(&mz, &y, &config.block_bytes(block_bytes)).unwrap();
        assert_eq!(whole, blocked);

        // The middle run merges because its first column is interior to the matrix,
        // the trailing run does not because only the last column could absorb
        let (mz2, y2) = whole;
        assert_eq!(&mz2[mz2.len() - 3..], &[1.0, 2.0, 2.0]);
        assert_eq!(y2.column(y2.columns() - 3), &[1.0, 5.0, 1.0]);
    }

    #[test]
    fn test_different_masses_never_merge() {
        let mz = vec![1.0, 2.0];
        let y = IntensityMatrix::from_columns(&[vec![1.0, 1.0, 0.0], vec![0.0, 0.0, 2.0]]).unwrap();
        let (mz2, y2) = centroid(&mz, &y, &CentroidConfig::default()).unwrap();
        assert_eq!(mz2, mz);
        assert_eq!(y2, y);
    }

    #[test]
    fn test_empty_columns_dropped() {
        let mz = vec![1.0, 2.0, 3.0];
        let y = IntensityMatrix::from_columns(&[vec![0.0; 4], vec![1.0; 4], vec![0.0; 4]]).unwrap();
        let (mz2, y2) = centroid(&mz, &y, &CentroidConfig::default()).unwrap();
        assert_eq!(mz2, vec![2.0]);
        assert_eq!(y2.shape(), (4, 1));
    }

    #[rstest]
    fn test_idempotent(fragmented: (Vec<f64>, IntensityMatrix)) {
        let (mz, y) = fragmented;
        let config = CentroidConfig::default();
        let (mz1, y1) = centroid(&mz, &y, &config).unwrap();
        let (mz2, y2) = centroid(&mz1, &y1, &config).unwrap();
        assert!(mz1.len() < mz.len());
        assert_eq!(mz1, mz2);
        assert_eq!(y1, y2);
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(2)]
    #[case(10)]
    fn test_column_count_invariant(
        fragmented: (Vec<f64>, IntensityMatrix),
        #[case] iterations: usize,
    ) {
        let (mz, y) = fragmented;
        let config = CentroidConfig::default().iterations(iterations);
        let (mz2, y2) = centroid(&mz, &y, &config).unwrap();
        assert_eq!(mz2.len(), y2.columns());
        assert_eq!(y2.rows(), y.rows());
        if iterations == 0 {
            assert_eq!(y2, y);
        }
    }

    #[rstest]
    #[case(1)]
    #[case(25 * 8 * 2)]
    #[case(25 * 8 * 5)]
    fn test_blocked_matches_whole(
        fragmented: (Vec<f64>, IntensityMatrix),
        #[case] block_bytes: usize,
    ) {
        let (mz, y) = fragmented;
        let config = CentroidConfig::default();
        let whole = centroid(&mz, &y, &config).unwrap();
        let blocked = centroid(&mz, &y, &config.block_bytes(block_bytes)).unwrap();
        assert_eq!(whole, blocked);
    }

    #[test]
    fn test_blocks_do_not_split_runs() {
        let mz = [1.0, 1.0, 1.0, 2.0, 3.0, 3.0, 4.0];
        let blocks = plan_blocks(&mz, 10, 80);
        assert_eq!(blocks, vec![0..3, 3..4, 4..6, 6..7]);
        let blocks = plan_blocks(&mz, 10, 80 * 4);
        assert_eq!(blocks, vec![0..4, 4..7]);
    }

    #[test]
    fn test_mass_axis_mismatch() {
        let y = IntensityMatrix::zeros(3, 2);
        let err = centroid(&[1.0], &y, &CentroidConfig::default()).unwrap_err();
        assert_eq!(err, SignalError::MassAxisMismatch { columns: 2, masses: 1 });
    }
}
