//! Flat dense 3-D arrays.

use std::fmt::Debug;

/// A dense 3-D array backed by a flat [`Vec`], laid out so that the linear
/// index varies fastest with the last axis, then the middle axis, then the
/// first axis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Array3<T> {
    extent: [usize; 3],
    data: Vec<T>,
}

impl<T: Copy + Default> Array3<T> {
    /// Creates an array of the given extent filled with the default value of
    /// `T`.
    pub fn zeroed(extent: [usize; 3]) -> Self {
        Self {
            extent,
            data: vec![T::default(); extent[0] * extent[1] * extent[2]],
        }
    }

    /// Wraps the given flat data in an array of the given extent.
    ///
    /// # Panics
    /// If the data length does not match the extent.
    pub fn from_data(extent: [usize; 3], data: Vec<T>) -> Self {
        assert_eq!(data.len(), extent[0] * extent[1] * extent[2]);
        Self { extent, data }
    }

    pub fn extent(&self) -> [usize; 3] {
        self.extent
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    pub fn get(&self, indices: [usize; 3]) -> T {
        self.data[self.linear_idx(indices)]
    }

    pub fn set(&mut self, indices: [usize; 3], value: T) {
        let idx = self.linear_idx(indices);
        self.data[idx] = value;
    }

    /// Extracts the plane of values at the given layer along the given axis,
    /// as an array with extent 1 along that axis.
    pub fn plane(&self, axis: usize, layer: usize) -> Self {
        assert!(layer < self.extent[axis]);
        let mut extent = self.extent;
        extent[axis] = 1;
        let mut min = [0; 3];
        min[axis] = layer;
        self.crop(min, extent)
    }

    /// Extracts the sub-array with the given minimum corner and extent.
    ///
    /// # Panics
    /// If the requested region does not lie within the array.
    pub fn crop(&self, min: [usize; 3], extent: [usize; 3]) -> Self {
        for axis in 0..3 {
            assert!(min[axis] + extent[axis] <= self.extent[axis]);
        }
        let mut data = Vec::with_capacity(extent[0] * extent[1] * extent[2]);
        for i in min[0]..min[0] + extent[0] {
            for j in min[1]..min[1] + extent[1] {
                let start = self.linear_idx([i, j, min[2]]);
                data.extend_from_slice(&self.data[start..start + extent[2]]);
            }
        }
        Self { extent, data }
    }

    fn linear_idx(&self, indices: [usize; 3]) -> usize {
        (indices[0] * self.extent[1] + indices[1]) * self.extent[2] + indices[2]
    }
}
