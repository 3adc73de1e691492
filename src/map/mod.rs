//! Big-collection handles.
//!
//! A [`BigMap`] is a named key-value container whose size may exceed
//! available memory, backed either by a disk partition or by heap memory
//! depending on policy. Handles are cheap to clone and safe to share across
//! threads; all clones of one handle observe the same underlying collection.

pub mod codec;
mod disk;
mod memory;

use serde::{Deserialize, Serialize};

pub use codec::{decode_fallback, encode_fallback, BigKey, BigValue};
pub use disk::DiskMap;
pub use memory::MemoryMap;

use crate::error::{StoreError, StoreResult};

/// The indexing discipline of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MapKind {
    /// Hash-indexed: no iteration order guarantee.
    Hash,
    /// Order-indexed: iteration follows key order.
    Ordered,
}

/// The caller's declared intention for where a collection should live.
///
/// Hints steer partition routing; with hybridization enabled, `InMemory`
/// bypasses disk entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageHint {
    /// Keep the collection in heap memory if policy allows.
    InMemory,
    /// Keep the collection on disk behind the cache.
    InCache,
    /// Keep the collection on disk without caching.
    InDisk,
}

/// A request for a named big collection.
///
/// # Example
///
/// ```ignore
/// use granary::{MapKind, MapSpec, StorageHint};
///
/// let spec = MapSpec::new("counts")
///     .kind(MapKind::Ordered)
///     .hint(StorageHint::InCache)
///     .concurrent(true);
/// let counts = store.get_big_map::<String, i64>(&spec)?;
/// ```
#[derive(Debug, Clone)]
pub struct MapSpec {
    /// Collection name, unique across all partitions of one engine.
    pub name: String,
    /// Indexing discipline.
    pub kind: MapKind,
    /// Placement hint.
    pub hint: StorageHint,
    /// Whether the collection is declared for concurrent use.
    pub concurrent: bool,
    /// Whether the collection is ephemeral (never outlives the process).
    pub temporary: bool,
}

impl MapSpec {
    /// Create a spec with the default policy: hash-indexed, cached, not
    /// concurrent, not temporary.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: MapKind::Hash,
            hint: StorageHint::InCache,
            concurrent: false,
            temporary: false,
        }
    }

    /// Set the indexing discipline.
    #[must_use]
    pub const fn kind(mut self, kind: MapKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the placement hint.
    #[must_use]
    pub const fn hint(mut self, hint: StorageHint) -> Self {
        self.hint = hint;
        self
    }

    /// Declare the collection for concurrent use.
    #[must_use]
    pub const fn concurrent(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }

    /// Mark the collection as ephemeral.
    #[must_use]
    pub const fn temporary(mut self, temporary: bool) -> Self {
        self.temporary = temporary;
        self
    }

    /// Validate the collection name.
    ///
    /// Names become key prefixes and path components, so they must be
    /// non-empty and free of separators and NUL bytes.
    pub(crate) fn validate(&self) -> StoreResult<()> {
        validate_name("collection", &self.name)
    }
}

/// Shared name validation for collections, objects, and engine names.
pub(crate) fn validate_name(what: &str, name: &str) -> StoreResult<()> {
    if name.is_empty() {
        return Err(StoreError::InvalidArgument(format!("{what} name is empty")));
    }
    if name.bytes().any(|b| b == 0 || b == b'/' || b == b'\\') {
        return Err(StoreError::InvalidArgument(format!(
            "{what} name {name:?} contains a separator or NUL byte"
        )));
    }
    Ok(())
}

/// A handle to a named big collection.
///
/// Handles remain structurally valid after the owning engine closes;
/// operations against a closed disk partition fail with
/// [`StoreError::Closed`].
pub enum BigMap<K: BigKey, V: BigValue> {
    /// A heap-backed collection (hybrid in-memory escape).
    Memory(MemoryMap<K, V>),
    /// A disk-backed collection inside one partition.
    Disk(DiskMap<K, V>),
}

impl<K: BigKey, V: BigValue> std::fmt::Debug for BigMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory(_) => f.write_str("BigMap::Memory"),
            Self::Disk(_) => f.write_str("BigMap::Disk"),
        }
    }
}

impl<K: BigKey, V: BigValue> BigMap<K, V> {
    /// Look up a value by key.
    pub fn get(&self, key: &K) -> StoreResult<Option<V>> {
        match self {
            Self::Memory(m) => m.get(key),
            Self::Disk(m) => m.get(key),
        }
    }

    /// Insert a key-value pair, returning the previous value if any.
    pub fn insert(&self, key: K, value: V) -> StoreResult<Option<V>> {
        match self {
            Self::Memory(m) => m.insert(key, value),
            Self::Disk(m) => m.insert(key, value),
        }
    }

    /// Remove a key, returning its value if it was present.
    pub fn remove(&self, key: &K) -> StoreResult<Option<V>> {
        match self {
            Self::Memory(m) => m.remove(key),
            Self::Disk(m) => m.remove(key),
        }
    }

    /// Whether the collection contains `key`.
    pub fn contains_key(&self, key: &K) -> StoreResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Number of entries.
    pub fn len(&self) -> StoreResult<u64> {
        match self {
            Self::Memory(m) => m.len(),
            Self::Disk(m) => m.len(),
        }
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Remove every entry in place.
    pub fn clear(&self) -> StoreResult<()> {
        match self {
            Self::Memory(m) => m.clear(),
            Self::Disk(m) => m.clear(),
        }
    }

    /// Materialize all entries.
    ///
    /// Ordered collections return entries in ascending key order;
    /// hash-indexed collections make no ordering guarantee. Intended for
    /// drains and tests, not for collections larger than memory.
    pub fn entries(&self) -> StoreResult<Vec<(K, V)>> {
        match self {
            Self::Memory(m) => m.entries(),
            Self::Disk(m) => m.entries(),
        }
    }

    /// Whether this handle is a heap-only (untracked) collection.
    #[must_use]
    pub const fn is_in_memory(&self) -> bool {
        matches!(self, Self::Memory(_))
    }
}

impl<K: BigKey, V: BigValue> Clone for BigMap<K, V> {
    fn clone(&self) -> Self {
        match self {
            Self::Memory(m) => Self::Memory(m.clone()),
            Self::Disk(m) => Self::Disk(m.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_defaults() {
        let spec = MapSpec::new("counts");
        assert_eq!(spec.kind, MapKind::Hash);
        assert_eq!(spec.hint, StorageHint::InCache);
        assert!(!spec.concurrent);
        assert!(!spec.temporary);
    }

    #[test]
    fn test_name_validation() {
        assert!(MapSpec::new("counts").validate().is_ok());
        assert!(MapSpec::new("").validate().is_err());
        assert!(MapSpec::new("a/b").validate().is_err());
        assert!(MapSpec::new("a\\b").validate().is_err());
        assert!(MapSpec::new("a\0b").validate().is_err());
    }
}
