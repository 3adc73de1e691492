//! Storage engine contract and implementations.
//!
//! [`BigMapStore`] is the operation set ML components program against;
//! [`DiskStore`] is the disk-backed engine behind it, spreading its
//! collections across the four [`Partition`]s.

mod core;
mod disk;
pub(crate) mod partition;

pub use disk::DiskStore;
pub use partition::Partition;

use crate::error::StoreResult;
use crate::map::{BigKey, BigMap, BigValue, MapSpec};
use crate::snapshot::Persistable;

/// The operation set every big-collection engine exposes.
///
/// ML components consume engines exclusively through this contract: named
/// collection access, whole-object save/load, rename, clear, and the
/// open/close lifecycle. Partitions and on-disk paths are never exposed.
pub trait BigMapStore {
    /// The engine's logical name.
    fn name(&self) -> String;

    /// Whether [`close`](Self::close) has been called.
    fn is_closed(&self) -> bool;

    /// Close the engine. Idempotent; every other operation fails with
    /// [`StoreError::Closed`](crate::StoreError::Closed) afterward.
    ///
    /// # Errors
    ///
    /// Returns an error if releasing a partition store fails.
    fn close(&self) -> StoreResult<()>;

    /// Create or reopen the named big collection.
    ///
    /// Idempotent under one name: concurrent or repeated calls yield handles
    /// onto the same underlying collection. With hybridization enabled, an
    /// `InMemory`-hinted request returns a fresh heap collection that is
    /// never tracked by name and never touches disk.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a malformed name or a kind mismatch
    /// with an existing collection, `Closed` after close.
    fn get_big_map<K: BigKey, V: BigValue>(&self, spec: &MapSpec) -> StoreResult<BigMap<K, V>>;

    /// Destroy the named collection.
    ///
    /// If the name resolves to an open partition, its on-disk entries are
    /// deleted there; otherwise (in-memory escape, or never persisted) the
    /// supplied handle is cleared in place. A subsequent
    /// [`get_big_map`](Self::get_big_map) yields an empty collection.
    ///
    /// # Errors
    ///
    /// Returns `Closed` after close.
    fn drop_big_map<K: BigKey, V: BigValue>(
        &self,
        name: &str,
        map: &BigMap<K, V>,
    ) -> StoreResult<()>;

    /// Persist an aggregate's snapshot into a single named slot.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` on snapshot encoding failure, `Closed` after
    /// close.
    fn save_object<T: Persistable>(&self, name: &str, value: &T) -> StoreResult<()>;

    /// Load a previously saved aggregate, reattaching its big-collection
    /// fields through this engine.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no slot with that name exists, `Closed` after
    /// close.
    fn load_object<T: Persistable>(&self, name: &str) -> StoreResult<T>;

    /// Whether a named object slot exists. Never materializes on-disk state.
    ///
    /// # Errors
    ///
    /// Returns `Closed` after close.
    fn exists_object(&self, name: &str) -> StoreResult<bool>;

    /// Rename the engine, moving its on-disk directory tree.
    ///
    /// Returns `false` without side effects when the name is unchanged.
    /// Temporary partitions are never renamed. Not atomic across the
    /// close-then-move boundary: a failure during the move can leave the
    /// persistent partitions closed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the target directory already exists
    /// (before any path is mutated), `CloseWait` if the bounded move retry
    /// is exhausted.
    fn rename(&self, new_name: &str) -> StoreResult<bool>;

    /// Destroy every collection and object of this engine and remove its
    /// directory tree from disk, pruning now-empty ancestors up to (but
    /// excluding) the configured root or the system temp directory.
    ///
    /// # Errors
    ///
    /// Returns `Io` on filesystem failure, `Closed` after close.
    fn clear(&self) -> StoreResult<()>;
}
