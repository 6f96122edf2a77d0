//! Tiling of a volume into blocks.

use anyhow::{Result, bail};

/// The minimum voxel corner of a block in global voxel space. Uniquely
/// identifies the block within its [`BlockGrid`].
pub type BlockCoord = [u64; 3];

/// A 3-D spatial axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    X = 0,
    Y = 1,
    Z = 2,
}

/// A side of a block along some axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Lower,
    Upper,
}

impl Axis {
    pub const ALL: [Self; 3] = [Self::X, Self::Y, Self::Z];

    /// Returns the index of the axis (`0` for `X`, `1` for `Y` and `2` for
    /// `Z`).
    pub const fn idx(self) -> usize {
        self as usize
    }
}

impl Side {
    /// Returns the label used for this side in dataset names.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Lower => "lower",
            Self::Upper => "upper",
        }
    }
}

/// The decomposition of a volume into fixed-size blocks.
///
/// Blocks at the upper boundary of the volume are clamped to the volume
/// extent rather than padded, so the grid tiles the volume exactly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockGrid {
    volume_extent: [u64; 3],
    block_extent: [u64; 3],
}

impl BlockGrid {
    pub fn new(volume_extent: [u64; 3], block_extent: [u64; 3]) -> Result<Self> {
        if volume_extent.iter().any(|&extent| extent == 0) {
            bail!("Volume extent {:?} has a zero dimension", volume_extent);
        }
        if block_extent.iter().any(|&extent| extent == 0) {
            bail!("Block extent {:?} has a zero dimension", block_extent);
        }
        Ok(Self {
            volume_extent,
            block_extent,
        })
    }

    pub fn volume_extent(&self) -> [u64; 3] {
        self.volume_extent
    }

    pub fn block_extent(&self) -> [u64; 3] {
        self.block_extent
    }

    /// Returns the number of blocks along each axis.
    pub fn grid_counts(&self) -> [u64; 3] {
        let mut counts = [0; 3];
        for axis in 0..3 {
            counts[axis] = self.volume_extent[axis].div_ceil(self.block_extent[axis]);
        }
        counts
    }

    /// Returns the total number of blocks in the grid.
    pub fn block_count(&self) -> usize {
        self.grid_counts().iter().product::<u64>() as usize
    }

    /// Returns the coordinates of every block in the grid, in a fixed
    /// repeatable order: row-major with the last axis varying fastest.
    ///
    /// Label-offset assignment iterates blocks in this order, so the order
    /// must never change between calls with the same inputs.
    pub fn block_coords(&self) -> Vec<BlockCoord> {
        let counts = self.grid_counts();
        let mut coords = Vec::with_capacity(self.block_count());
        for i in 0..counts[0] {
            for j in 0..counts[1] {
                for k in 0..counts[2] {
                    coords.push([
                        i * self.block_extent[0],
                        j * self.block_extent[1],
                        k * self.block_extent[2],
                    ]);
                }
            }
        }
        coords
    }

    /// Returns the grid-cell position of the block with the given coordinate.
    pub fn grid_pos(&self, coord: BlockCoord) -> [u64; 3] {
        let mut pos = [0; 3];
        for axis in 0..3 {
            pos[axis] = coord[axis] / self.block_extent[axis];
        }
        pos
    }

    /// Returns the extent of the block with the given coordinate, clamped to
    /// the volume boundary.
    pub fn block_extent_at(&self, coord: BlockCoord) -> [usize; 3] {
        let mut extent = [0; 3];
        for axis in 0..3 {
            let end = u64::min(coord[axis] + self.block_extent[axis], self.volume_extent[axis]);
            extent[axis] = (end - coord[axis]) as usize;
        }
        extent
    }

    /// Returns the minimum corner and extent of the block with the given
    /// coordinate padded by the given halo along each axis, clamped to the
    /// volume on both sides.
    pub fn padded_interval(&self, coord: BlockCoord, halo: [u64; 3]) -> (BlockCoord, [usize; 3]) {
        let mut min = [0; 3];
        let mut extent = [0; 3];
        for axis in 0..3 {
            min[axis] = coord[axis].saturating_sub(halo[axis]);
            let end = u64::min(
                coord[axis] + self.block_extent[axis] + halo[axis],
                self.volume_extent[axis],
            );
            extent[axis] = (end - min[axis]) as usize;
        }
        (min, extent)
    }

    /// Whether the block with the given coordinate is at the maximum grid
    /// index along the given axis, that is, has no neighbor at grid-index+1.
    pub fn is_grid_max(&self, coord: BlockCoord, axis: Axis) -> bool {
        self.grid_pos(coord)[axis.idx()] + 1 == self.grid_counts()[axis.idx()]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zero_extents_are_rejected() {
        assert!(BlockGrid::new([0, 4, 4], [2, 2, 2]).is_err());
        assert!(BlockGrid::new([4, 4, 4], [2, 0, 2]).is_err());
    }

    #[test]
    fn enumeration_tiles_volume_including_partial_blocks() {
        let grid = BlockGrid::new([5, 4, 3], [2, 2, 2]).unwrap();
        assert_eq!(grid.grid_counts(), [3, 2, 2]);
        assert_eq!(grid.block_count(), 12);

        let coords = grid.block_coords();
        assert_eq!(coords.len(), 12);
        assert_eq!(coords[0], [0, 0, 0]);
        assert_eq!(coords[1], [0, 0, 2]);
        assert_eq!(coords[2], [0, 2, 0]);
        assert_eq!(coords[11], [4, 2, 2]);

        // Partial blocks at the upper boundary are clamped, not padded.
        assert_eq!(grid.block_extent_at([0, 0, 0]), [2, 2, 2]);
        assert_eq!(grid.block_extent_at([4, 2, 2]), [1, 2, 1]);
    }

    #[test]
    fn enumeration_is_repeatable() {
        let grid = BlockGrid::new([7, 5, 6], [3, 2, 4]).unwrap();
        assert_eq!(grid.block_coords(), grid.block_coords());
    }

    #[test]
    fn grid_pos_inverts_block_coords() {
        let grid = BlockGrid::new([5, 4, 3], [2, 2, 2]).unwrap();
        for (linear, coord) in grid.block_coords().into_iter().enumerate() {
            let pos = grid.grid_pos(coord);
            let counts = grid.grid_counts();
            let expected = (pos[0] * counts[1] + pos[1]) * counts[2] + pos[2];
            assert_eq!(linear as u64, expected);
        }
    }

    #[test]
    fn padded_interval_is_clamped_on_both_sides() {
        let grid = BlockGrid::new([6, 6, 6], [2, 2, 2]).unwrap();
        let (min, extent) = grid.padded_interval([0, 2, 4], [1, 1, 1]);
        assert_eq!(min, [0, 1, 3]);
        assert_eq!(extent, [3, 4, 3]);
    }

    #[test]
    fn grid_max_detection() {
        let grid = BlockGrid::new([5, 4, 3], [2, 2, 2]).unwrap();
        assert!(!grid.is_grid_max([0, 0, 0], Axis::X));
        assert!(grid.is_grid_max([4, 0, 0], Axis::X));
        assert!(grid.is_grid_max([0, 2, 0], Axis::Y));
        assert!(grid.is_grid_max([0, 0, 2], Axis::Z));
    }
}
