//! Block-wise segmentation of volumes too large for one machine's memory,
//! with stitching of the per-block label spaces into one globally
//! consistent labeling.

pub mod array;
pub mod config;
pub mod containers;
pub mod executor;
pub mod faces;
pub mod grid;
pub mod io;
pub mod merge;
pub mod offsets;
pub mod pipeline;
pub mod segmentation;
pub mod store;
pub mod union_find;
