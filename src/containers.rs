//! Hash map types used throughout the crate.

pub use hashbrown::hash_map;

/// Hash map with a fast non-cryptographic hasher, for general keys.
pub type HashMap<K, V> = hashbrown::HashMap<K, V, rustc_hash::FxBuildHasher>;

/// Hash map for integer keys that are already well distributed, like label
/// identifiers. The key is used directly as the hash.
pub type NoHashMap<K, V> = hashbrown::HashMap<K, V, nohash_hasher::BuildNoHashHasher<K>>;
