//! Assignment of disjoint global label ranges to blocks.

use crate::{
    array::Array3,
    containers::HashMap,
    grid::{BlockCoord, BlockGrid},
};
use anyhow::{Result, bail};

/// The per-block label offsets that lift locally unique labels into one
/// global label space.
///
/// Each block gets the half-open range `[offset, offset + count)`; the
/// ranges are pairwise disjoint and together cover `[0, total_count)`.
/// Built once on the coordinator and read-only afterwards.
#[derive(Clone, Debug)]
pub struct LabelOffsets {
    offsets: HashMap<BlockCoord, u64>,
    total_count: u64,
}

impl LabelOffsets {
    /// Computes the offset for every block as a running prefix sum over the
    /// gathered per-block label counts, visiting blocks in the grid's fixed
    /// enumeration order.
    ///
    /// # Errors
    /// If any block in the grid is missing from the gathered counts. A block
    /// that silently failed upstream must not pass through an incomplete
    /// global label space.
    pub fn assign(grid: &BlockGrid, counts: &HashMap<BlockCoord, u64>) -> Result<Self> {
        let mut offsets = HashMap::default();
        let mut total_count = 0;
        for coord in grid.block_coords() {
            let Some(&count) = counts.get(&coord) else {
                bail!("Missing label count for block at {:?}", coord);
            };
            offsets.insert(coord, total_count);
            total_count += count;
        }
        Ok(Self {
            offsets,
            total_count,
        })
    }

    pub fn offset_of(&self, coord: BlockCoord) -> Option<u64> {
        self.offsets.get(&coord).copied()
    }

    /// The total number of labels across all blocks.
    pub fn total_count(&self) -> u64 {
        self.total_count
    }
}

/// Shifts every non-zero label in the block by the given offset. Zero means
/// background and is left untouched.
pub fn apply_offset(labels: &mut Array3<u64>, offset: u64) {
    for label in labels.data_mut() {
        if *label != 0 {
            *label += offset;
        }
    }
}
