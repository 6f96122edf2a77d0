//! Job configuration.

use crate::io;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{num::NonZeroUsize, path::Path};

/// Configuration for a segmentation job.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Foreground cutoff: voxels with intensity above this seed regions in
    /// local segmentation.
    pub threshold: f64,
    /// Distance-transform floor: voxels with intensity at or below this are
    /// never claimed by a region.
    pub min_value: f64,
    /// Extent of the blocks that are segmented independently.
    pub block_extent: [u64; 3],
    /// Halo of intensity context read around each block for local
    /// segmentation.
    pub halo_extent: [u64; 3],
    /// Number of worker threads. Defaults to the available parallelism.
    pub num_threads: Option<NonZeroUsize>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            min_value: 0.0,
            block_extent: [64; 3],
            halo_extent: [0; 3],
            num_threads: None,
        }
    }
}

impl JobConfig {
    /// Parses the configuration from the RON file at the given path.
    pub fn from_ron_file(file_path: impl AsRef<Path>) -> Result<Self> {
        io::parse_ron_file(file_path)
    }
}
