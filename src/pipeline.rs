//! The block-wise segmentation and stitching pipeline.
//!
//! Each phase is data-parallel over independent blocks, with small
//! summaries gathered to the coordinator between phases: per-block label
//! counts after segmentation, and per-block-pair union-find snapshots after
//! face matching. Offsets must be applied to every block before any face is
//! extracted, and all axes must be folded into the global union-find before
//! any block is relabeled; the phase methods are invoked in that order by
//! [`SegmentationPipeline::run`].

use crate::{
    containers::HashMap,
    executor::{Broadcast, TaskPool},
    faces::{self, face_dataset_attributes, face_dataset_name},
    grid::{Axis, BlockCoord, BlockGrid, Side},
    merge::match_faces,
    offsets::{self, LabelOffsets},
    segmentation::LocalSegmenter,
    store::{BlockStore, DatasetAttributes, ElementType},
    union_find::DisjointSets,
};
use anyhow::{Context, Result};
use log::{debug, info};

/// Names of the datasets a job writes, derived from the output base name.
///
/// The merged labels live under the base name itself and the globally
/// offset pre-merge labels under `<base>-unmerged`; both are job outputs.
/// The locally labeled blocks (`<base>-local`) and the per-axis face
/// datasets are intermediate artifacts that may be discarded after the run.
#[derive(Clone, Debug)]
pub struct JobDatasets {
    output_base: String,
}

impl JobDatasets {
    pub fn new(output_base: impl Into<String>) -> Self {
        Self {
            output_base: output_base.into(),
        }
    }

    pub fn merged_labels(&self) -> &str {
        &self.output_base
    }

    pub fn offset_labels(&self) -> String {
        format!("{}-unmerged", self.output_base)
    }

    pub fn local_labels(&self) -> String {
        format!("{}-local", self.output_base)
    }

    pub fn face(&self, axis: Axis, side: Side) -> String {
        face_dataset_name(&self.output_base, axis, side)
    }
}

/// Coordinator-side results of a completed job.
#[derive(Clone, Copy, Debug)]
pub struct JobSummary {
    /// The number of global labels before merging.
    pub total_label_count: u64,
    /// The number of distinct sets among the labels that took part in at
    /// least one merge.
    pub merged_set_count: usize,
}

/// The full segmentation-and-stitching job over one volume.
#[derive(Debug)]
pub struct SegmentationPipeline<'a, S, G> {
    store: &'a S,
    segmenter: G,
    pool: TaskPool,
    grid: BlockGrid,
    halo: [u64; 3],
    intensity_dataset: String,
    datasets: JobDatasets,
}

impl<'a, S, G> SegmentationPipeline<'a, S, G>
where
    S: BlockStore,
    G: LocalSegmenter,
{
    /// Sets up a pipeline reading intensities from the given dataset and
    /// writing label datasets under the given output base name. The block
    /// grid is derived from the intensity dataset's extent and the given
    /// block extent.
    pub fn new(
        store: &'a S,
        segmenter: G,
        pool: TaskPool,
        intensity_dataset: impl Into<String>,
        output_base: impl Into<String>,
        block_extent: [u64; 3],
        halo: [u64; 3],
    ) -> Result<Self> {
        let intensity_dataset = intensity_dataset.into();
        let intensity_attributes = store
            .attributes(&intensity_dataset)
            .context("Failed to look up the intensity dataset")?;
        let grid = BlockGrid::new(intensity_attributes.extent, block_extent)?;

        Ok(Self {
            store,
            segmenter,
            pool,
            grid,
            halo,
            intensity_dataset,
            datasets: JobDatasets::new(output_base),
        })
    }

    pub fn grid(&self) -> &BlockGrid {
        &self.grid
    }

    /// Runs all phases of the job and returns the coordinator's summary.
    pub fn run(&self) -> Result<JobSummary> {
        let counts = self.segment_blocks()?;

        let offsets = LabelOffsets::assign(&self.grid, &counts)?;
        let total_label_count = offsets.total_count();
        info!(
            "Assigned {} global labels across {} blocks",
            total_label_count,
            self.grid.block_count()
        );

        self.apply_offsets(&Broadcast::new(offsets))?;

        let mut merged = DisjointSets::new();
        for axis in Axis::ALL {
            self.extract_faces(axis)?;
            self.merge_axis(axis, &mut merged)?;
        }
        let merged_set_count = merged.set_count();
        info!(
            "Merging joined {} labels into {} sets",
            merged.len(),
            merged_set_count
        );

        self.relabel_blocks(&Broadcast::new(merged))?;

        Ok(JobSummary {
            total_label_count,
            merged_set_count,
        })
    }

    /// Segments every block independently and gathers the per-block counts
    /// of distinct non-zero labels. Writes the locally labeled blocks.
    fn segment_blocks(&self) -> Result<HashMap<BlockCoord, u64>> {
        self.store.create_dataset(
            &self.datasets.local_labels(),
            &self.label_dataset_attributes(),
        )?;

        let counts = self.pool.parallel_map(self.grid.block_coords(), |coord| {
            let (padded_min, padded_extent) = self.grid.padded_interval(coord, self.halo);
            let intensity =
                self.store
                    .read_interval::<f32>(&self.intensity_dataset, padded_min, padded_extent)?;

            let (labels, count) = self.segmenter.segment(&intensity);

            // Strip the halo; only the block proper is persisted. The count
            // stays that of the padded volume so that no label in the block
            // can exceed it.
            let mut core_offset = [0; 3];
            for axis in 0..3 {
                core_offset[axis] = (coord[axis] - padded_min[axis]) as usize;
            }
            let core = labels.crop(core_offset, self.grid.block_extent_at(coord));

            self.store
                .write_block(&self.datasets.local_labels(), self.grid.grid_pos(coord), &core)?;
            debug!("Segmented block at {:?} into {} labels", coord, count);
            Ok((coord, count))
        })?;

        Ok(counts.into_iter().collect())
    }

    /// Rewrites every block's labels from local to global by adding the
    /// block's offset to all non-zero values. Reads the locally labeled
    /// dataset and writes the offset dataset, so re-running with the same
    /// offset map is idempotent.
    fn apply_offsets(&self, offsets: &Broadcast<LabelOffsets>) -> Result<()> {
        self.store.create_dataset(
            &self.datasets.offset_labels(),
            &self.label_dataset_attributes(),
        )?;

        self.pool.parallel_map(self.grid.block_coords(), {
            let offsets = offsets.clone();
            move |coord| {
                let offset = offsets
                    .offset_of(coord)
                    .with_context(|| format!("No label offset for block at {:?}", coord))?;

                let grid_pos = self.grid.grid_pos(coord);
                let mut labels = self
                    .store
                    .read_block::<u64>(&self.datasets.local_labels(), grid_pos)?;
                offsets::apply_offset(&mut labels, offset);
                self.store
                    .write_block(&self.datasets.offset_labels(), grid_pos, &labels)
            }
        })?;
        Ok(())
    }

    /// Extracts and persists the two boundary planes of every block along
    /// the given axis. Blocks at the maximum grid index get a zero-filled
    /// upper-face placeholder to keep the face dataset's indexing uniform.
    fn extract_faces(&self, axis: Axis) -> Result<()> {
        let attributes = face_dataset_attributes(&self.grid, axis);
        self.store
            .create_dataset(&self.datasets.face(axis, Side::Lower), &attributes)?;
        self.store
            .create_dataset(&self.datasets.face(axis, Side::Upper), &attributes)?;

        self.pool.parallel_map(self.grid.block_coords(), |coord| {
            let grid_pos = self.grid.grid_pos(coord);
            let labels = self
                .store
                .read_block::<u64>(&self.datasets.offset_labels(), grid_pos)?;

            let lower = faces::extract_face(&labels, axis, Side::Lower);
            let upper = if self.grid.is_grid_max(coord, axis) {
                faces::zero_face(labels.extent(), axis)
            } else {
                faces::extract_face(&labels, axis, Side::Upper)
            };

            self.store
                .write_block(&self.datasets.face(axis, Side::Lower), grid_pos, &lower)?;
            self.store
                .write_block(&self.datasets.face(axis, Side::Upper), grid_pos, &upper)
        })?;
        Ok(())
    }

    /// Matches every block's upper face along the given axis against its
    /// grid-successor's lower face and folds the reported correspondences
    /// into the global union-find.
    fn merge_axis(&self, axis: Axis, merged: &mut DisjointSets) -> Result<()> {
        let reported = self.pool.parallel_map(self.grid.block_coords(), |coord| {
            if self.grid.is_grid_max(coord, axis) {
                // No neighbor at grid-index+1; contributes no pairs.
                return Ok(None);
            }
            let grid_pos = self.grid.grid_pos(coord);
            let mut successor_pos = grid_pos;
            successor_pos[axis.idx()] += 1;

            let upper = self
                .store
                .read_block::<u64>(&self.datasets.face(axis, Side::Upper), grid_pos)?;
            let lower = self
                .store
                .read_block::<u64>(&self.datasets.face(axis, Side::Lower), successor_pos)?;

            Ok(Some(match_faces(&upper, &lower)))
        })?;

        let mut pair_count = 0;
        let mut empty_count = 0;
        for pairs in reported.into_iter().flatten() {
            if pairs.is_empty() {
                empty_count += 1;
            }
            // Parent first: on a rank tie the first argument's root wins,
            // so the reported representative stays the representative.
            for (key, parent) in pairs {
                merged.join(parent, key);
                pair_count += 1;
            }
        }
        info!(
            "Axis {:?}: folded {} reported pairs ({} block pairs without correspondences)",
            axis, pair_count, empty_count
        );
        Ok(())
    }

    /// Rewrites every non-zero voxel label to its final representative
    /// under the merged union-find and persists the result. Idempotent: a
    /// representative is its own representative.
    fn relabel_blocks(&self, merged: &Broadcast<DisjointSets>) -> Result<()> {
        self.store.create_dataset(
            self.datasets.merged_labels(),
            &self.label_dataset_attributes(),
        )?;

        self.pool.parallel_map(self.grid.block_coords(), {
            let merged = merged.clone();
            move |coord| {
                let grid_pos = self.grid.grid_pos(coord);
                let mut labels = self
                    .store
                    .read_block::<u64>(&self.datasets.offset_labels(), grid_pos)?;

                // Root lookup compresses paths, so each task works on its
                // own copy of the broadcast snapshot.
                let mut sets = (*merged).clone();
                for label in labels.data_mut() {
                    if *label != 0 {
                        *label = sets.find_root(*label);
                    }
                }

                self.store
                    .write_block(self.datasets.merged_labels(), grid_pos, &labels)
            }
        })?;
        Ok(())
    }

    fn label_dataset_attributes(&self) -> DatasetAttributes {
        DatasetAttributes::new(
            self.grid.volume_extent(),
            self.grid.block_extent(),
            ElementType::U64,
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        array::Array3,
        segmentation::FloodFillSegmenter,
        store::MemoryBlockStore,
    };
    use std::num::NonZeroUsize;

    /// Labels every block `[1, 1, 2, 2]` along the first axis, regardless
    /// of intensity.
    struct StubSegmenter;

    impl LocalSegmenter for StubSegmenter {
        fn segment(&self, intensity: &Array3<f32>) -> (Array3<u64>, u64) {
            let extent = intensity.extent();
            assert_eq!(extent, [4, 1, 1]);
            (Array3::from_data(extent, vec![1, 1, 2, 2]), 2)
        }
    }

    fn filled_intensity_store(extent: [u64; 3], block_extent: [u64; 3], value: f32) -> MemoryBlockStore {
        let store = MemoryBlockStore::new();
        let attributes = DatasetAttributes::new(extent, block_extent, ElementType::F32);
        store.create_dataset("intensity", &attributes).unwrap();
        let grid = attributes.grid().unwrap();
        for coord in grid.block_coords() {
            let block_extent = grid.block_extent_at(coord);
            let len = block_extent.iter().product();
            let block = Array3::from_data(block_extent, vec![value; len]);
            store
                .write_block("intensity", grid.grid_pos(coord), &block)
                .unwrap();
        }
        store
    }

    fn test_pool() -> TaskPool {
        TaskPool::new(NonZeroUsize::new(2).unwrap())
    }

    fn read_row(store: &MemoryBlockStore, dataset: &str, grid: &BlockGrid) -> Vec<u64> {
        let extent = grid.volume_extent();
        store
            .read_interval::<u64>(
                dataset,
                [0, 0, 0],
                [extent[0] as usize, extent[1] as usize, extent[2] as usize],
            )
            .unwrap()
            .into_data()
    }

    #[test]
    fn two_adjacent_blocks_merge_across_their_touching_faces() {
        let store = filled_intensity_store([8, 1, 1], [4, 1, 1], 0.0);
        let pipeline = SegmentationPipeline::new(
            &store,
            StubSegmenter,
            test_pool(),
            "intensity",
            "labels",
            [4, 1, 1],
            [0; 3],
        )
        .unwrap();

        let summary = pipeline.run().unwrap();
        assert_eq!(summary.total_label_count, 4);
        assert_eq!(summary.merged_set_count, 1);

        // Block 0 keeps labels [1, 1, 2, 2]; block 1 is offset to
        // [3, 3, 4, 4]; the confirmed pair (2, 3) collapses to one root.
        assert_eq!(
            read_row(&store, &pipeline.datasets.offset_labels(), pipeline.grid()),
            vec![1, 1, 2, 2, 3, 3, 4, 4]
        );
        assert_eq!(
            read_row(&store, pipeline.datasets.merged_labels(), pipeline.grid()),
            vec![1, 1, 2, 2, 2, 2, 4, 4]
        );
    }

    #[test]
    fn relabeling_twice_with_the_same_snapshot_is_a_noop() {
        let store = filled_intensity_store([8, 1, 1], [4, 1, 1], 0.0);
        let pipeline = SegmentationPipeline::new(
            &store,
            StubSegmenter,
            test_pool(),
            "intensity",
            "labels",
            [4, 1, 1],
            [0; 3],
        )
        .unwrap();

        let counts = pipeline.segment_blocks().unwrap();
        let offsets = LabelOffsets::assign(pipeline.grid(), &counts).unwrap();
        pipeline.apply_offsets(&Broadcast::new(offsets)).unwrap();
        let mut merged = DisjointSets::new();
        for axis in Axis::ALL {
            pipeline.extract_faces(axis).unwrap();
            pipeline.merge_axis(axis, &mut merged).unwrap();
        }
        let merged = Broadcast::new(merged);

        pipeline.relabel_blocks(&merged).unwrap();
        let first = read_row(&store, pipeline.datasets.merged_labels(), pipeline.grid());
        pipeline.relabel_blocks(&merged).unwrap();
        let second = read_row(&store, pipeline.datasets.merged_labels(), pipeline.grid());
        assert_eq!(first, second);
    }

    #[test]
    fn reapplying_offsets_with_the_same_map_is_idempotent() {
        let store = filled_intensity_store([8, 1, 1], [4, 1, 1], 0.0);
        let pipeline = SegmentationPipeline::new(
            &store,
            StubSegmenter,
            test_pool(),
            "intensity",
            "labels",
            [4, 1, 1],
            [0; 3],
        )
        .unwrap();

        let counts = pipeline.segment_blocks().unwrap();
        let offsets = Broadcast::new(LabelOffsets::assign(pipeline.grid(), &counts).unwrap());

        pipeline.apply_offsets(&offsets).unwrap();
        let first = read_row(&store, &pipeline.datasets.offset_labels(), pipeline.grid());
        pipeline.apply_offsets(&offsets).unwrap();
        let second = read_row(&store, &pipeline.datasets.offset_labels(), pipeline.grid());
        assert_eq!(first, second);
    }

    #[test]
    fn uniform_foreground_volume_collapses_to_a_single_region() {
        let store = filled_intensity_store([4, 2, 2], [2, 2, 2], 1.0);
        let pipeline = SegmentationPipeline::new(
            &store,
            FloodFillSegmenter::new(0.5, 0.0),
            test_pool(),
            "intensity",
            "labels",
            [2, 2, 2],
            [0; 3],
        )
        .unwrap();

        let summary = pipeline.run().unwrap();
        assert_eq!(summary.total_label_count, 2);
        assert_eq!(summary.merged_set_count, 1);

        let merged = read_row(&store, pipeline.datasets.merged_labels(), pipeline.grid());
        assert!(merged.iter().all(|&label| label == merged[0]));
        assert_ne!(merged[0], 0);
    }

    #[test]
    fn background_stays_zero_through_the_whole_job() {
        let store = filled_intensity_store([4, 1, 1], [2, 1, 1], 0.0);
        let pipeline = SegmentationPipeline::new(
            &store,
            FloodFillSegmenter::new(0.5, 0.0),
            test_pool(),
            "intensity",
            "labels",
            [2, 1, 1],
            [0; 3],
        )
        .unwrap();

        let summary = pipeline.run().unwrap();
        assert_eq!(summary.total_label_count, 0);
        assert_eq!(
            read_row(&store, pipeline.datasets.merged_labels(), pipeline.grid()),
            vec![0, 0, 0, 0]
        );
    }
}
