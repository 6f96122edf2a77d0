//! Sparse union-find over 64-bit label identifiers.

use crate::containers::NoHashMap;

/// A union-find (disjoint-set) structure keyed by arbitrary, non-contiguous
/// 64-bit labels.
///
/// Nodes live in an arena indexed by a sparse key map, so the structure
/// grows only with the labels actually joined, never with the span of the
/// label space. Keys that were never inserted are implicitly their own
/// roots. Uses union by rank with path compression, so a sequence of joins
/// and root lookups has near-linear total cost.
#[derive(Clone, Debug, Default)]
pub struct DisjointSets {
    nodes: Vec<Node>,
    index: NoHashMap<u64, usize>,
}

#[derive(Clone, Copy, Debug)]
struct Node {
    key: u64,
    parent: usize,
    rank: u32,
}

impl DisjointSets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of labels that have been inserted through
    /// [`Self::join`].
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the representative label of the set containing the given
    /// label, compressing the traversed path. A label that was never joined
    /// is its own representative; it is not inserted.
    pub fn find_root(&mut self, key: u64) -> u64 {
        match self.index.get(&key) {
            Some(&node_idx) => {
                let root_idx = self.find_root_idx(node_idx);
                self.nodes[root_idx].key
            }
            None => key,
        }
    }

    /// Merges the sets containing the two given labels. Inserts labels that
    /// have not been seen before. A no-op if both labels are already in the
    /// same set.
    pub fn join(&mut self, a: u64, b: u64) {
        let a_idx = self.insert(a);
        let b_idx = self.insert(b);
        let a_root = self.find_root_idx(a_idx);
        let b_root = self.find_root_idx(b_idx);

        if a_root == b_root {
            return;
        }

        // Union by rank; on a tie the first argument's root becomes the
        // parent and its rank increments.
        if self.nodes[a_root].rank < self.nodes[b_root].rank {
            self.nodes[a_root].parent = b_root;
        } else {
            self.nodes[b_root].parent = a_root;
            if self.nodes[a_root].rank == self.nodes[b_root].rank {
                self.nodes[a_root].rank += 1;
            }
        }
    }

    /// Returns the number of distinct sets among all inserted labels.
    /// Computed on demand; not intended for hot paths.
    pub fn set_count(&self) -> usize {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(node_idx, node)| node.parent == *node_idx)
            .count()
    }

    /// Returns the raw key-to-parent-key mapping for every inserted label.
    /// Roots map to themselves. Replaying the pairs through [`Self::join`]
    /// on another instance reproduces this instance's partition.
    pub fn parent_pairs(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.nodes
            .iter()
            .map(|node| (node.key, self.nodes[node.parent].key))
    }

    fn insert(&mut self, key: u64) -> usize {
        let next_idx = self.nodes.len();
        match self.index.entry(key) {
            crate::containers::hash_map::Entry::Occupied(entry) => *entry.get(),
            crate::containers::hash_map::Entry::Vacant(entry) => {
                entry.insert(next_idx);
                self.nodes.push(Node {
                    key,
                    parent: next_idx,
                    rank: 0,
                });
                next_idx
            }
        }
    }

    fn find_root_idx(&mut self, node_idx: usize) -> usize {
        let mut root_idx = node_idx;
        while self.nodes[root_idx].parent != root_idx {
            root_idx = self.nodes[root_idx].parent;
        }
        // Path compression: repoint every traversed node at the root.
        let mut current_idx = node_idx;
        while current_idx != root_idx {
            let parent_idx = self.nodes[current_idx].parent;
            self.nodes[current_idx].parent = root_idx;
            current_idx = parent_idx;
        }
        root_idx
    }
}
