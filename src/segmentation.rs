//! Local segmentation of single blocks.

use crate::array::Array3;
use std::collections::VecDeque;

/// Produces a locally labeled block from raw intensity data.
///
/// Implementations must be deterministic for identical inputs, use `0` for
/// background and label regions with the contiguous identifiers
/// `1..=count`. Label-offset assignment relies on the labels not exceeding
/// the reported count.
pub trait LocalSegmenter: Send + Sync {
    /// Segments the given intensity sub-volume (which may include halo
    /// context around the block proper) and returns a label volume of the
    /// same extent together with the number of distinct non-zero labels.
    fn segment(&self, intensity: &Array3<f32>) -> (Array3<u64>, u64);
}

/// A reference segmenter in the spirit of a watershed on thresholded
/// intensities: voxels brighter than `threshold` seed regions, and each
/// region grows breadth-first through 6-connected voxels brighter than
/// `min_value`. Voxels at or below `min_value` are never claimed.
#[derive(Clone, Debug)]
pub struct FloodFillSegmenter {
    threshold: f64,
    min_value: f64,
}

impl FloodFillSegmenter {
    pub fn new(threshold: f64, min_value: f64) -> Self {
        Self {
            threshold,
            min_value,
        }
    }
}

impl LocalSegmenter for FloodFillSegmenter {
    fn segment(&self, intensity: &Array3<f32>) -> (Array3<u64>, u64) {
        let extent = intensity.extent();
        let mut labels = Array3::zeroed(extent);
        let mut count = 0;

        let mut queue = VecDeque::new();
        for i in 0..extent[0] {
            for j in 0..extent[1] {
                for k in 0..extent[2] {
                    let seed = [i, j, k];
                    if labels.get(seed) != 0
                        || f64::from(intensity.get(seed)) <= self.threshold
                    {
                        continue;
                    }

                    count += 1;
                    labels.set(seed, count);
                    queue.push_back(seed);

                    while let Some(voxel) = queue.pop_front() {
                        for axis in 0..3 {
                            for step in [-1_isize, 1] {
                                let mut neighbor = voxel;
                                let along = voxel[axis] as isize + step;
                                if along < 0 || along as usize >= extent[axis] {
                                    continue;
                                }
                                neighbor[axis] = along as usize;

                                if labels.get(neighbor) == 0
                                    && f64::from(intensity.get(neighbor)) > self.min_value
                                {
                                    labels.set(neighbor, count);
                                    queue.push_back(neighbor);
                                }
                            }
                        }
                    }
                }
            }
        }

        (labels, count)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn row(values: &[f32]) -> Array3<f32> {
        Array3::from_data([values.len(), 1, 1], values.to_vec())
    }

    #[test]
    fn separated_regions_get_distinct_contiguous_labels() {
        let segmenter = FloodFillSegmenter::new(0.5, 0.5);
        let (labels, count) = segmenter.segment(&row(&[0.9, 0.9, 0.0, 0.8, 0.0, 0.7]));
        assert_eq!(count, 3);
        assert_eq!(labels.data(), &[1, 1, 0, 2, 0, 3]);
    }

    #[test]
    fn regions_grow_down_to_the_floor_value() {
        let segmenter = FloodFillSegmenter::new(0.5, 0.1);
        let (labels, count) = segmenter.segment(&row(&[0.9, 0.3, 0.2, 0.05, 0.8]));
        assert_eq!(count, 2);
        // The seed at index 0 claims the above-floor band before the voxel
        // at index 4 is visited as a seed.
        assert_eq!(labels.data(), &[1, 1, 1, 0, 2]);
    }

    #[test]
    fn segmentation_is_deterministic() {
        let segmenter = FloodFillSegmenter::new(0.5, 0.1);
        let intensity = Array3::from_data(
            [2, 2, 2],
            vec![0.9, 0.2, 0.2, 0.9, 0.0, 0.0, 0.6, 0.0],
        );
        let first = segmenter.segment(&intensity);
        let second = segmenter.segment(&intensity);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_volume_has_zero_labels() {
        let segmenter = FloodFillSegmenter::new(0.5, 0.1);
        let (labels, count) = segmenter.segment(&row(&[0.0, 0.1, 0.2]));
        assert_eq!(count, 0);
        assert!(labels.data().iter().all(|&label| label == 0));
    }
}
