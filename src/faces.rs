//! Extraction and storage of block boundary planes.
//!
//! For every axis, each block contributes two faces of its labeled volume:
//! the "lower" face is the first slice along the axis and the "upper" face
//! is the last slice, the one adjacent to the next block. Faces are
//! persisted as their own datasets so that touching blocks can be compared
//! without re-reading full volumes.

use crate::{
    array::Array3,
    grid::{Axis, BlockGrid, Side},
    store::{DatasetAttributes, ElementType},
};

/// Returns the name of the dataset holding the faces on the given side of
/// every block along the given axis.
pub fn face_dataset_name(base: &str, axis: Axis, side: Side) -> String {
    format!("{}-{}-{}", base, side.label(), axis.idx())
}

/// Returns the attributes of a face dataset for the given axis: one voxel
/// thick along the axis, with one grid cell per block position so faces are
/// stored at their block's grid-cell position.
pub fn face_dataset_attributes(grid: &BlockGrid, axis: Axis) -> DatasetAttributes {
    let mut extent = grid.volume_extent();
    extent[axis.idx()] = grid.grid_counts()[axis.idx()];
    let mut block_extent = grid.block_extent();
    block_extent[axis.idx()] = 1;
    DatasetAttributes::new(extent, block_extent, ElementType::U64)
}

/// Extracts the boundary plane of the given labeled block on the given side
/// along the given axis. Does not mutate the source block.
pub fn extract_face(labels: &Array3<u64>, axis: Axis, side: Side) -> Array3<u64> {
    let layer = match side {
        Side::Lower => 0,
        Side::Upper => labels.extent()[axis.idx()] - 1,
    };
    labels.plane(axis.idx(), layer)
}

/// Returns an all-zero face of the given block extent along the given axis,
/// used as the upper-face placeholder for blocks at the maximum grid index,
/// which have no neighbor. Keeps the face dataset's indexing uniform.
pub fn zero_face(block_extent: [usize; 3], axis: Axis) -> Array3<u64> {
    let mut extent = block_extent;
    extent[axis.idx()] = 1;
    Array3::zeroed(extent)
}
