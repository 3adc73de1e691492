//! Declarative collection holders.
//!
//! A holder is a struct whose fields are big collections. Instead of wiring
//! each field to [`get_big_map`](crate::BigMapStore::get_big_map) by hand,
//! the struct declares its collections as [`MapDescriptor`]s and constructs
//! itself through [`BigMapHolder::attach`], which either attaches every
//! declared field or fails without handing out a partial holder.

use crate::engine::BigMapStore;
use crate::error::StoreResult;
use crate::map::{BigKey, BigMap, BigValue, MapKind, MapSpec, StorageHint};

/// Declaration of one big-collection field: its name and shape.
///
/// Descriptors are `const`-constructible so holders can declare them as
/// associated constants or statics.
#[derive(Debug, Clone, Copy)]
pub struct MapDescriptor {
    /// Collection name, unique within the owning engine.
    pub name: &'static str,
    /// Hash or ordered.
    pub kind: MapKind,
    /// Partition routing hint.
    pub hint: StorageHint,
    /// Whether the collection sees concurrent access.
    pub concurrent: bool,
}

impl MapDescriptor {
    /// A descriptor with default shape: hash-organized, cached, single-threaded.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self { name, kind: MapKind::Hash, hint: StorageHint::InCache, concurrent: false }
    }

    /// Set the collection kind.
    #[must_use]
    pub const fn kind(mut self, kind: MapKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the storage hint.
    #[must_use]
    pub const fn hint(mut self, hint: StorageHint) -> Self {
        self.hint = hint;
        self
    }

    /// Mark the collection as concurrently accessed.
    #[must_use]
    pub const fn concurrent(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }

    /// The full specification for this descriptor.
    #[must_use]
    pub fn spec(&self) -> MapSpec {
        MapSpec::new(self.name)
            .kind(self.kind)
            .hint(self.hint)
            .concurrent(self.concurrent)
    }

    /// Attach the described collection through `store`.
    ///
    /// # Errors
    ///
    /// Fails like `get_big_map` does: `InvalidArgument` on a kind mismatch,
    /// `Closed` after close.
    pub fn attach<K, V, S>(&self, store: &S) -> StoreResult<BigMap<K, V>>
    where
        K: BigKey,
        V: BigValue,
        S: BigMapStore,
    {
        store.get_big_map(&self.spec())
    }
}

/// A struct made of big-collection fields.
pub trait BigMapHolder: Sized {
    /// The collections this holder owns.
    fn descriptors() -> &'static [MapDescriptor];

    /// Construct the holder with every declared collection attached.
    /// All-or-nothing: a failure on any field returns the error and no
    /// holder.
    ///
    /// # Errors
    ///
    /// Propagates the first attachment failure.
    fn attach<S: BigMapStore>(store: &S) -> StoreResult<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_builds_spec() {
        const WEIGHTS: MapDescriptor = MapDescriptor::new("weights")
            .kind(MapKind::Ordered)
            .hint(StorageHint::InDisk)
            .concurrent(true);

        let spec = WEIGHTS.spec();
        assert_eq!(spec.name, "weights");
        assert_eq!(spec.kind, MapKind::Ordered);
        assert_eq!(spec.hint, StorageHint::InDisk);
        assert!(spec.concurrent);
        assert!(!spec.temporary);
    }
}
