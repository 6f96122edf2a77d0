//! Pairwise matching of touching block faces.
//!
//! A block's upper face along an axis and its grid-successor's lower face
//! cover adjacent voxel planes. A label pair co-occurring at the same
//! transverse position on both faces is evidence that the two global labels
//! denote the same physical region. Only one-to-one correspondences are
//! accepted: a label appearing against two distinct partners signals a
//! segmentation artifact at the seam and is excluded from merging rather
//! than risk fusing unrelated regions.

use crate::{array::Array3, containers::NoHashMap, union_find::DisjointSets};
use log::trace;

/// Marker recorded for a label whose face correspondence turned out to be
/// ambiguous. Valid labels never reach `u64::MAX` since label offsets are
/// assigned from zero upwards.
const INVALID: u64 = u64::MAX;

/// Compares a block's upper face with its successor's lower face,
/// position by position, and folds all confirmed one-to-one label
/// correspondences into a local union-find. Returns the union-find's raw
/// key-to-parent pairs for the coordinator to replay, which is smaller than
/// the position-level pair list since joining collapses duplicates.
pub fn match_faces(upper: &Array3<u64>, lower: &Array3<u64>) -> Vec<(u64, u64)> {
    assert_eq!(
        upper.extent(),
        lower.extent(),
        "Face planes of touching blocks must be position-aligned"
    );

    let mut forward: NoHashMap<u64, u64> = NoHashMap::default();
    let mut backward: NoHashMap<u64, u64> = NoHashMap::default();
    let mut co_occurrences: NoHashMap<u64, u64> = NoHashMap::default();

    for (&upper_label, &lower_label) in upper.data().iter().zip(lower.data()) {
        if upper_label == 0 || lower_label == 0 {
            continue;
        }
        match (
            forward.get(&upper_label).copied(),
            backward.get(&lower_label).copied(),
        ) {
            (Some(partner), Some(reverse_partner))
                if partner == lower_label && reverse_partner == upper_label =>
            {
                *co_occurrences.entry(upper_label).or_insert(0) += 1;
                *co_occurrences.entry(lower_label).or_insert(0) += 1;
            }
            (None, None) => {
                forward.insert(upper_label, lower_label);
                backward.insert(lower_label, upper_label);
                co_occurrences.insert(upper_label, 1);
            }
            // Conflict: at least one of the labels already has a different
            // partner. Permanently exclude both from this face pair.
            _ => {
                forward.insert(upper_label, INVALID);
                backward.insert(lower_label, INVALID);
            }
        }
    }

    let mut confirmed = DisjointSets::new();
    for (&upper_label, &lower_label) in &forward {
        if lower_label != INVALID && backward.get(&lower_label) == Some(&upper_label) {
            trace!(
                "Confirmed correspondence ({}, {}) with {} co-occurrences",
                upper_label,
                lower_label,
                co_occurrences.get(&upper_label).copied().unwrap_or(0)
            );
            confirmed.join(upper_label, lower_label);
        }
    }
    confirmed.parent_pairs().collect()
}
