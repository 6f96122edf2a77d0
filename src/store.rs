//! Chunked array storage addressed by block grid position.

use crate::{array::Array3, containers::HashMap, grid::BlockGrid};
use anyhow::{Context, Result, bail};
use bytemuck::Pod;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// The element type of a dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementType {
    F32,
    U64,
}

/// A primitive value that can be stored in a dataset.
pub trait Element: Pod + Default + Send + Sync + 'static {
    const TYPE: ElementType;
}

impl Element for f32 {
    const TYPE: ElementType = ElementType::F32;
}

impl Element for u64 {
    const TYPE: ElementType = ElementType::U64;
}

/// The shape of a dataset: total extent, block extent and element type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetAttributes {
    pub extent: [u64; 3],
    pub block_extent: [u64; 3],
    pub element_type: ElementType,
}

impl DatasetAttributes {
    pub fn new(extent: [u64; 3], block_extent: [u64; 3], element_type: ElementType) -> Self {
        Self {
            extent,
            block_extent,
            element_type,
        }
    }

    /// Returns the block grid implied by the extents.
    pub fn grid(&self) -> Result<BlockGrid> {
        BlockGrid::new(self.extent, self.block_extent)
    }
}

/// A store holding datasets that are read and written one block at a time,
/// with blocks addressed by their grid-cell position.
///
/// Any failure to read or write a required block is an error; a block is
/// never processed with partial data.
pub trait BlockStore: Sync {
    fn create_dataset(&self, name: &str, attributes: &DatasetAttributes) -> Result<()>;

    fn attributes(&self, name: &str) -> Result<DatasetAttributes>;

    fn read_block<T: Element>(&self, name: &str, grid_pos: [u64; 3]) -> Result<Array3<T>>;

    fn write_block<T: Element>(
        &self,
        name: &str,
        grid_pos: [u64; 3],
        block: &Array3<T>,
    ) -> Result<()>;

    /// Reads an arbitrary rectangular interval of the dataset by assembling
    /// it from the blocks covering the interval.
    fn read_interval<T: Element>(
        &self,
        name: &str,
        min: [u64; 3],
        extent: [usize; 3],
    ) -> Result<Array3<T>> {
        let attributes = self.attributes(name)?;
        let grid = attributes.grid()?;
        for axis in 0..3 {
            if min[axis] + extent[axis] as u64 > attributes.extent[axis] {
                bail!(
                    "Interval with min {:?} and extent {:?} exceeds extent {:?} of dataset {}",
                    min,
                    extent,
                    attributes.extent,
                    name
                );
            }
        }

        let block_extent = attributes.block_extent;
        let mut assembled = Array3::zeroed(extent);

        let mut first_cell = [0; 3];
        let mut last_cell = [0; 3];
        for axis in 0..3 {
            first_cell[axis] = min[axis] / block_extent[axis];
            last_cell[axis] = (min[axis] + extent[axis] as u64 - 1) / block_extent[axis];
        }

        for cell_i in first_cell[0]..=last_cell[0] {
            for cell_j in first_cell[1]..=last_cell[1] {
                for cell_k in first_cell[2]..=last_cell[2] {
                    let grid_pos = [cell_i, cell_j, cell_k];
                    let block = self.read_block::<T>(name, grid_pos)?;

                    let mut block_min = [0; 3];
                    for axis in 0..3 {
                        block_min[axis] = grid_pos[axis] * block_extent[axis];
                    }
                    let core_extent = grid.block_extent_at(block_min);

                    let mut overlap_min = [0; 3];
                    let mut overlap_extent = [0; 3];
                    for axis in 0..3 {
                        overlap_min[axis] = u64::max(min[axis], block_min[axis]);
                        let overlap_end = u64::min(
                            min[axis] + extent[axis] as u64,
                            block_min[axis] + core_extent[axis] as u64,
                        );
                        overlap_extent[axis] = (overlap_end - overlap_min[axis]) as usize;
                    }

                    for i in 0..overlap_extent[0] {
                        for j in 0..overlap_extent[1] {
                            for k in 0..overlap_extent[2] {
                                let mut source = [0; 3];
                                let mut target = [0; 3];
                                for (axis, offset) in [i, j, k].into_iter().enumerate() {
                                    source[axis] = (overlap_min[axis] - block_min[axis]) as usize
                                        + offset;
                                    target[axis] =
                                        (overlap_min[axis] - min[axis]) as usize + offset;
                                }
                                assembled.set(target, block.get(source));
                            }
                        }
                    }
                }
            }
        }
        Ok(assembled)
    }
}

fn check_element_type<T: Element>(name: &str, attributes: &DatasetAttributes) -> Result<()> {
    if attributes.element_type != T::TYPE {
        bail!(
            "Dataset {} holds {:?} elements, not {:?}",
            name,
            attributes.element_type,
            T::TYPE
        );
    }
    Ok(())
}

const ATTRIBUTES_FILE_NAME: &str = "attributes.ron";

/// A block store backed by a directory tree: one directory per dataset
/// holding a RON attributes file and one raw binary file per written block.
#[derive(Clone, Debug)]
pub struct FsBlockStore {
    root: PathBuf,
}

impl FsBlockStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dataset_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn block_path(&self, name: &str, grid_pos: [u64; 3]) -> PathBuf {
        self.dataset_dir(name).join(format!(
            "{}_{}_{}.blk",
            grid_pos[0], grid_pos[1], grid_pos[2]
        ))
    }
}

impl BlockStore for FsBlockStore {
    fn create_dataset(&self, name: &str, attributes: &DatasetAttributes) -> Result<()> {
        let dir = self.dataset_dir(name);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create dataset directory {}", dir.display()))?;
        let text = ron::ser::to_string_pretty(attributes, ron::ser::PrettyConfig::default())?;
        fs::write(dir.join(ATTRIBUTES_FILE_NAME), text).with_context(|| {
            format!("Failed to write attributes for dataset {name}")
        })?;
        Ok(())
    }

    fn attributes(&self, name: &str) -> Result<DatasetAttributes> {
        let path = self.dataset_dir(name).join(ATTRIBUTES_FILE_NAME);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read attributes for dataset {name}"))?;
        ron::from_str(&text)
            .with_context(|| format!("Failed to parse attributes for dataset {name}"))
    }

    fn read_block<T: Element>(&self, name: &str, grid_pos: [u64; 3]) -> Result<Array3<T>> {
        check_element_type::<T>(name, &self.attributes(name)?)?;
        let path = self.block_path(name, grid_pos);
        let bytes = fs::read(&path).with_context(|| {
            format!(
                "Failed to read block at {:?} of dataset {}",
                grid_pos, name
            )
        })?;

        const HEADER_LEN: usize = 3 * size_of::<u64>();
        if bytes.len() < HEADER_LEN {
            bail!("Corrupt block file {}", path.display());
        }
        let extent_values: Vec<u64> = bytemuck::pod_collect_to_vec(&bytes[..HEADER_LEN]);
        let extent = [
            extent_values[0] as usize,
            extent_values[1] as usize,
            extent_values[2] as usize,
        ];
        let data: Vec<T> = bytemuck::pod_collect_to_vec(&bytes[HEADER_LEN..]);
        if data.len() != extent[0] * extent[1] * extent[2] {
            bail!("Corrupt block file {}", path.display());
        }
        Ok(Array3::from_data(extent, data))
    }

    fn write_block<T: Element>(
        &self,
        name: &str,
        grid_pos: [u64; 3],
        block: &Array3<T>,
    ) -> Result<()> {
        check_element_type::<T>(name, &self.attributes(name)?)?;
        let extent = block.extent();
        let header = [extent[0] as u64, extent[1] as u64, extent[2] as u64];
        let mut bytes = Vec::with_capacity(3 * size_of::<u64>() + size_of_val(block.data()));
        bytes.extend_from_slice(bytemuck::cast_slice(&header));
        bytes.extend_from_slice(bytemuck::cast_slice(block.data()));

        let path = self.block_path(name, grid_pos);
        fs::write(&path, bytes).with_context(|| {
            format!(
                "Failed to write block at {:?} of dataset {}",
                grid_pos, name
            )
        })?;
        Ok(())
    }
}

#[derive(Debug)]
struct StoredBlock {
    extent: [usize; 3],
    bytes: Vec<u8>,
}

/// A block store keeping all data in memory. Intended for tests and small
/// volumes.
#[derive(Debug, Default)]
pub struct MemoryBlockStore {
    datasets: RwLock<HashMap<String, DatasetAttributes>>,
    blocks: RwLock<HashMap<(String, [u64; 3]), StoredBlock>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlockStore for MemoryBlockStore {
    fn create_dataset(&self, name: &str, attributes: &DatasetAttributes) -> Result<()> {
        self.datasets
            .write()
            .insert(name.to_string(), attributes.clone());
        Ok(())
    }

    fn attributes(&self, name: &str) -> Result<DatasetAttributes> {
        self.datasets
            .read()
            .get(name)
            .cloned()
            .with_context(|| format!("No dataset named {name}"))
    }

    fn read_block<T: Element>(&self, name: &str, grid_pos: [u64; 3]) -> Result<Array3<T>> {
        check_element_type::<T>(name, &self.attributes(name)?)?;
        let blocks = self.blocks.read();
        let block = blocks
            .get(&(name.to_string(), grid_pos))
            .with_context(|| {
                format!("No block at {:?} in dataset {}", grid_pos, name)
            })?;
        let data: Vec<T> = bytemuck::pod_collect_to_vec(&block.bytes);
        Ok(Array3::from_data(block.extent, data))
    }

    fn write_block<T: Element>(
        &self,
        name: &str,
        grid_pos: [u64; 3],
        block: &Array3<T>,
    ) -> Result<()> {
        check_element_type::<T>(name, &self.attributes(name)?)?;
        self.blocks.write().insert(
            (name.to_string(), grid_pos),
            StoredBlock {
                extent: block.extent(),
                bytes: bytemuck::cast_slice(block.data()).to_vec(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn label_attributes() -> DatasetAttributes {
        DatasetAttributes::new([4, 4, 2], [2, 2, 2], ElementType::U64)
    }

    #[test]
    fn memory_store_round_trips_blocks() {
        let store = MemoryBlockStore::new();
        store.create_dataset("labels", &label_attributes()).unwrap();

        let block = Array3::from_data([2, 2, 2], (1..=8).collect());
        store.write_block("labels", [1, 0, 0], &block).unwrap();

        let read_back: Array3<u64> = store.read_block("labels", [1, 0, 0]).unwrap();
        assert_eq!(read_back, block);
    }

    #[test]
    fn memory_store_rejects_wrong_element_type() {
        let store = MemoryBlockStore::new();
        store.create_dataset("labels", &label_attributes()).unwrap();
        assert!(store.read_block::<f32>("labels", [0, 0, 0]).is_err());
    }

    #[test]
    fn missing_block_is_an_error() {
        let store = MemoryBlockStore::new();
        store.create_dataset("labels", &label_attributes()).unwrap();
        assert!(store.read_block::<u64>("labels", [0, 0, 0]).is_err());
    }

    #[test]
    fn read_interval_assembles_from_multiple_blocks() {
        let store = MemoryBlockStore::new();
        let attributes = DatasetAttributes::new([4, 1, 1], [2, 1, 1], ElementType::U64);
        store.create_dataset("labels", &attributes).unwrap();
        store
            .write_block("labels", [0, 0, 0], &Array3::from_data([2, 1, 1], vec![1, 2]))
            .unwrap();
        store
            .write_block("labels", [1, 0, 0], &Array3::from_data([2, 1, 1], vec![3, 4]))
            .unwrap();

        let interval: Array3<u64> = store.read_interval("labels", [1, 0, 0], [3, 1, 1]).unwrap();
        assert_eq!(interval.data(), &[2, 3, 4]);

        assert!(
            store
                .read_interval::<u64>("labels", [2, 0, 0], [3, 1, 1])
                .is_err()
        );
    }

    #[test]
    fn fs_store_round_trips_blocks_and_attributes() {
        let root = std::env::temp_dir().join(format!(
            "blockseg-fs-store-test-{}",
            std::process::id()
        ));
        let store = FsBlockStore::new(&root);

        let attributes = DatasetAttributes::new([4, 4, 2], [2, 2, 2], ElementType::F32);
        store.create_dataset("intensity", &attributes).unwrap();
        assert_eq!(store.attributes("intensity").unwrap(), attributes);

        let block = Array3::from_data([2, 2, 1], vec![0.5_f32, 1.5, 2.5, 3.5]);
        store.write_block("intensity", [0, 1, 0], &block).unwrap();
        let read_back: Array3<f32> = store.read_block("intensity", [0, 1, 0]).unwrap();
        assert_eq!(read_back, block);

        std::fs::remove_dir_all(&root).unwrap();
    }
}
