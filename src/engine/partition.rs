//! Partition stores.
//!
//! Each engine partitions its named collections across four storage areas
//! by persistence and caching policy. A [`PartitionHandle`] wraps one redb
//! database opened lazily for one partition. Since redb requires static
//! table names, dynamic collection names use a key-prefixing strategy over a
//! single physical data table; a catalog table records which collections
//! exist in the partition and with what shape.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use redb::{Database, Durability, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::map::codec::{decode_fallback, encode_fallback};
use crate::map::{MapKind, StorageHint};

/// The physical table storing all collection entries.
/// Logical collection names are prefixed to keys.
const DATA_TABLE: TableDefinition<'static, &[u8], &[u8]> = TableDefinition::new("granary_data");

/// Catalog of collections living in this partition.
const CATALOG_TABLE: TableDefinition<'static, &str, &[u8]> =
    TableDefinition::new("granary_catalog");

/// Named object slots (whole-aggregate snapshots).
const OBJECT_TABLE: TableDefinition<'static, &str, &[u8]> =
    TableDefinition::new("granary_objects");

/// Separator byte between collection name and key in the encoded key.
const KEY_SEPARATOR: u8 = 0x00;

/// Working cache floor for uncached partitions. redb needs some page cache
/// to operate, so "uncached" means this minimum rather than literally zero.
const UNCACHED_CACHE_BYTES: usize = 1024 * 1024;

/// One of the four storage areas of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    /// Persistent, cacheable.
    Primary,
    /// Persistent, uncached.
    Secondary,
    /// Ephemeral, cacheable.
    TempPrimary,
    /// Ephemeral, uncached.
    TempSecondary,
}

impl Partition {
    /// All partitions, in slot order.
    pub const ALL: [Self; 4] = [Self::Primary, Self::Secondary, Self::TempPrimary, Self::TempSecondary];

    pub(crate) const fn index(self) -> usize {
        match self {
            Self::Primary => 0,
            Self::Secondary => 1,
            Self::TempPrimary => 2,
            Self::TempSecondary => 3,
        }
    }

    /// Whether the partition's backing file lives in process-temp storage
    /// and is deleted on close.
    #[must_use]
    pub const fn is_temporary(self) -> bool {
        matches!(self, Self::TempPrimary | Self::TempSecondary)
    }

    /// Whether the partition participates in the configured cache.
    #[must_use]
    pub const fn is_cacheable(self) -> bool {
        matches!(self, Self::Primary | Self::TempPrimary)
    }

    /// Whether the partition survives `rename` (temp partitions never do).
    pub(crate) const fn is_renameable(self) -> bool {
        !self.is_temporary()
    }

    pub(crate) const fn file_name(self) -> &'static str {
        match self {
            Self::Primary => "PRIMARY_STORAGE",
            Self::Secondary => "SECONDARY_STORAGE",
            Self::TempPrimary => "TEMP_PRIMARY_STORAGE",
            Self::TempSecondary => "TEMP_SECONDARY_STORAGE",
        }
    }

    /// Route a storage hint to its target partition.
    ///
    /// An `InMemory` hint that was not intercepted by hybridization falls
    /// through to the cached partition.
    pub(crate) const fn select(hint: StorageHint, temporary: bool) -> Self {
        match (temporary, hint) {
            (false, StorageHint::InMemory | StorageHint::InCache) => Self::Primary,
            (false, StorageHint::InDisk) => Self::Secondary,
            (true, StorageHint::InMemory | StorageHint::InCache) => Self::TempPrimary,
            (true, StorageHint::InDisk) => Self::TempSecondary,
        }
    }
}

/// Catalog metadata for one collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CollectionMeta {
    pub kind: MapKind,
    pub concurrent: bool,
}

/// Encode a collection name and key into a physical key.
fn prefixed_key(collection: &str, key: &[u8]) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(collection.len() + 1 + key.len());
    encoded.extend_from_slice(collection.as_bytes());
    encoded.push(KEY_SEPARATOR);
    encoded.extend_from_slice(key);
    encoded
}

/// First physical key belonging to a collection.
fn prefix_start(collection: &str) -> Vec<u8> {
    prefixed_key(collection, &[])
}

/// First physical key that does NOT belong to a collection.
fn prefix_end(collection: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(collection.len() + 1);
    key.extend_from_slice(collection.as_bytes());
    key.push(KEY_SEPARATOR + 1);
    key
}

struct Inner {
    db: Database,
    /// Housing directory for temp partitions, removed when the handle closes.
    temp: Option<tempfile::TempDir>,
}

/// One open partition store.
///
/// Commit-on-demand, single-writer: every mutation runs in its own write
/// transaction committed before the call returns. The handle stays
/// structurally valid after `close()`; operations then fail with
/// [`StoreError::Closed`].
pub(crate) struct PartitionHandle {
    partition: Partition,
    path: PathBuf,
    compressed: bool,
    asynchronous: bool,
    inner: RwLock<Option<Inner>>,
}

impl PartitionHandle {
    /// Open the partition's backing store.
    ///
    /// Persistent partitions live at `<engine_dir>/<FILE_NAME>`; temporary
    /// partitions get a fresh process-temp directory that self-deletes on
    /// close. The cache is sized from the configuration for cacheable
    /// partitions only, and only when caching is enabled.
    pub(crate) fn open(
        partition: Partition,
        config: &StoreConfig,
        engine_dir: &Path,
    ) -> StoreResult<Self> {
        let (path, temp) = if partition.is_temporary() {
            let dir = tempfile::Builder::new().prefix("granary-").tempdir()?;
            (dir.path().join(partition.file_name()), Some(dir))
        } else {
            fs::create_dir_all(engine_dir)?;
            (engine_dir.join(partition.file_name()), None)
        };

        let cache_bytes = if partition.is_cacheable() && config.cache_size > 0 {
            config.cache_size
        } else {
            UNCACHED_CACHE_BYTES
        };

        let mut builder = Database::builder();
        builder.set_cache_size(cache_bytes);
        let db = builder.create(&path).map_err(StoreError::backend)?;

        debug!(?partition, path = %path.display(), cache_bytes, "opened partition store");

        Ok(Self {
            partition,
            path,
            compressed: config.compressed,
            asynchronous: config.asynchronous,
            inner: RwLock::new(Some(Inner { db, temp })),
        })
    }

    #[must_use]
    pub(crate) const fn compressed(&self) -> bool {
        self.compressed
    }

    fn guard(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, Option<Inner>>> {
        self.inner.read().map_err(|_| StoreError::backend("partition lock poisoned"))
    }

    fn begin_write(&self, inner: &Inner) -> StoreResult<redb::WriteTransaction> {
        let mut txn = inner.db.begin_write().map_err(StoreError::backend)?;
        if self.asynchronous {
            txn.set_durability(Durability::Eventual);
        }
        Ok(txn)
    }

    // =========================================================================
    // Collection entries
    // =========================================================================

    pub(crate) fn get(&self, collection: &str, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let guard = self.guard()?;
        let inner = guard.as_ref().ok_or(StoreError::Closed)?;
        let txn = inner.db.begin_read().map_err(StoreError::backend)?;
        let pk = prefixed_key(collection, key);
        match txn.open_table(DATA_TABLE) {
            Ok(t) => match t.get(pk.as_slice()).map_err(StoreError::backend)? {
                Some(value) => Ok(Some(value.value().to_vec())),
                None => Ok(None),
            },
            // No data table means no data, which is not an error.
            Err(redb::TableError::TableDoesNotExist(_)) => Ok(None),
            Err(e) => Err(StoreError::backend(e)),
        }
    }

    pub(crate) fn put(
        &self,
        collection: &str,
        key: &[u8],
        value: &[u8],
    ) -> StoreResult<Option<Vec<u8>>> {
        let guard = self.guard()?;
        let inner = guard.as_ref().ok_or(StoreError::Closed)?;
        let txn = self.begin_write(inner)?;
        let pk = prefixed_key(collection, key);
        let previous = {
            let mut t = txn.open_table(DATA_TABLE).map_err(StoreError::backend)?;
            let prev = t
                .insert(pk.as_slice(), value)
                .map_err(StoreError::backend)?
                .map(|g| g.value().to_vec());
            prev
        };
        txn.commit().map_err(StoreError::backend)?;
        Ok(previous)
    }

    pub(crate) fn remove(&self, collection: &str, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let guard = self.guard()?;
        let inner = guard.as_ref().ok_or(StoreError::Closed)?;
        let txn = self.begin_write(inner)?;
        let pk = prefixed_key(collection, key);
        let previous = {
            match txn.open_table(DATA_TABLE) {
                Ok(mut t) => t
                    .remove(pk.as_slice())
                    .map_err(StoreError::backend)?
                    .map(|g| g.value().to_vec()),
                Err(redb::TableError::TableDoesNotExist(_)) => None,
                Err(e) => return Err(StoreError::backend(e)),
            }
        };
        txn.commit().map_err(StoreError::backend)?;
        Ok(previous)
    }

    /// All `(key, value)` pairs of a collection, in encoded-key order.
    pub(crate) fn scan(&self, collection: &str) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let guard = self.guard()?;
        let inner = guard.as_ref().ok_or(StoreError::Closed)?;
        let txn = inner.db.begin_read().map_err(StoreError::backend)?;
        let start = prefix_start(collection);
        let end = prefix_end(collection);
        let prefix_len = start.len();
        match txn.open_table(DATA_TABLE) {
            Ok(t) => {
                let range = t
                    .range(start.as_slice()..end.as_slice())
                    .map_err(StoreError::backend)?;
                let mut entries = Vec::new();
                for item in range {
                    let (k, v) = item.map_err(StoreError::backend)?;
                    entries.push((k.value()[prefix_len..].to_vec(), v.value().to_vec()));
                }
                Ok(entries)
            }
            Err(redb::TableError::TableDoesNotExist(_)) => Ok(Vec::new()),
            Err(e) => Err(StoreError::backend(e)),
        }
    }

    /// Number of entries in a collection.
    pub(crate) fn count(&self, collection: &str) -> StoreResult<u64> {
        let guard = self.guard()?;
        let inner = guard.as_ref().ok_or(StoreError::Closed)?;
        let txn = inner.db.begin_read().map_err(StoreError::backend)?;
        let start = prefix_start(collection);
        let end = prefix_end(collection);
        match txn.open_table(DATA_TABLE) {
            Ok(t) => {
                let range = t
                    .range(start.as_slice()..end.as_slice())
                    .map_err(StoreError::backend)?;
                let mut count = 0u64;
                for item in range {
                    item.map_err(StoreError::backend)?;
                    count += 1;
                }
                Ok(count)
            }
            Err(redb::TableError::TableDoesNotExist(_)) => Ok(0),
            Err(e) => Err(StoreError::backend(e)),
        }
    }

    /// Delete every entry of a collection, leaving its catalog entry intact.
    pub(crate) fn clear_collection(&self, collection: &str) -> StoreResult<()> {
        self.delete_collection_data(collection, false)
    }

    /// Delete a collection outright: its entries and its catalog entry.
    pub(crate) fn remove_collection(&self, collection: &str) -> StoreResult<()> {
        self.delete_collection_data(collection, true)
    }

    fn delete_collection_data(&self, collection: &str, drop_catalog: bool) -> StoreResult<()> {
        let guard = self.guard()?;
        let inner = guard.as_ref().ok_or(StoreError::Closed)?;
        let txn = self.begin_write(inner)?;
        {
            let mut t = txn.open_table(DATA_TABLE).map_err(StoreError::backend)?;
            let start = prefix_start(collection);
            let end = prefix_end(collection);
            let keys = {
                let range = t
                    .range(start.as_slice()..end.as_slice())
                    .map_err(StoreError::backend)?;
                let mut keys = Vec::new();
                for item in range {
                    let (k, _) = item.map_err(StoreError::backend)?;
                    keys.push(k.value().to_vec());
                }
                keys
            };
            for key in keys {
                t.remove(key.as_slice()).map_err(StoreError::backend)?;
            }
            if drop_catalog {
                let mut catalog = txn.open_table(CATALOG_TABLE).map_err(StoreError::backend)?;
                catalog.remove(collection).map_err(StoreError::backend)?;
            }
        }
        txn.commit().map_err(StoreError::backend)?;
        Ok(())
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    /// Create-or-fetch a collection's catalog entry in one write transaction,
    /// so concurrent same-name creators converge on one collection.
    pub(crate) fn ensure_collection(
        &self,
        collection: &str,
        meta: &CollectionMeta,
    ) -> StoreResult<()> {
        let guard = self.guard()?;
        let inner = guard.as_ref().ok_or(StoreError::Closed)?;
        let txn = self.begin_write(inner)?;
        {
            let mut t = txn.open_table(CATALOG_TABLE).map_err(StoreError::backend)?;
            let existing = t
                .get(collection)
                .map_err(StoreError::backend)?
                .map(|g| g.value().to_vec());
            match existing {
                Some(bytes) => {
                    let current: CollectionMeta = decode_fallback(&bytes)?;
                    if current.kind != meta.kind {
                        // Early return drops the transaction, aborting it.
                        return Err(StoreError::InvalidArgument(format!(
                            "collection {collection:?} already exists with kind {:?}",
                            current.kind
                        )));
                    }
                }
                None => {
                    let bytes = encode_fallback(meta)?;
                    t.insert(collection, bytes.as_slice()).map_err(StoreError::backend)?;
                }
            }
        }
        txn.commit().map_err(StoreError::backend)?;
        Ok(())
    }

    /// All collections recorded in this partition's catalog.
    pub(crate) fn catalog(&self) -> StoreResult<Vec<(String, CollectionMeta)>> {
        let guard = self.guard()?;
        let inner = guard.as_ref().ok_or(StoreError::Closed)?;
        let txn = inner.db.begin_read().map_err(StoreError::backend)?;
        match txn.open_table(CATALOG_TABLE) {
            Ok(t) => {
                let mut entries = Vec::new();
                let range = t.range::<&str>(..).map_err(StoreError::backend)?;
                for item in range {
                    let (name, meta) = item.map_err(StoreError::backend)?;
                    entries.push((name.value().to_string(), decode_fallback(meta.value())?));
                }
                Ok(entries)
            }
            Err(redb::TableError::TableDoesNotExist(_)) => Ok(Vec::new()),
            Err(e) => Err(StoreError::backend(e)),
        }
    }

    // =========================================================================
    // Object slots
    // =========================================================================

    pub(crate) fn put_object(&self, name: &str, bytes: &[u8]) -> StoreResult<()> {
        let guard = self.guard()?;
        let inner = guard.as_ref().ok_or(StoreError::Closed)?;
        let txn = self.begin_write(inner)?;
        {
            let mut t = txn.open_table(OBJECT_TABLE).map_err(StoreError::backend)?;
            t.insert(name, bytes).map_err(StoreError::backend)?;
        }
        txn.commit().map_err(StoreError::backend)?;
        Ok(())
    }

    pub(crate) fn get_object(&self, name: &str) -> StoreResult<Option<Vec<u8>>> {
        let guard = self.guard()?;
        let inner = guard.as_ref().ok_or(StoreError::Closed)?;
        let txn = inner.db.begin_read().map_err(StoreError::backend)?;
        match txn.open_table(OBJECT_TABLE) {
            Ok(t) => Ok(t
                .get(name)
                .map_err(StoreError::backend)?
                .map(|g| g.value().to_vec())),
            Err(redb::TableError::TableDoesNotExist(_)) => Ok(None),
            Err(e) => Err(StoreError::backend(e)),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close the backing store: drop the database (flushing pending commits
    /// and releasing the file lock) and delete the temp housing, if any.
    /// Idempotent.
    pub(crate) fn close(&self) -> StoreResult<()> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| StoreError::backend("partition lock poisoned"))?;
        if let Some(Inner { db, temp }) = guard.take() {
            drop(db);
            if let Some(temp) = temp {
                temp.close()?;
            }
            debug!(partition = ?self.partition, path = %self.path.display(), "closed partition store");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(partition: Partition, config: &StoreConfig, dir: &Path) -> PartitionHandle {
        PartitionHandle::open(partition, config, dir).expect("failed to open partition")
    }

    #[test]
    fn test_hint_routing() {
        assert_eq!(Partition::select(StorageHint::InMemory, false), Partition::Primary);
        assert_eq!(Partition::select(StorageHint::InCache, false), Partition::Primary);
        assert_eq!(Partition::select(StorageHint::InDisk, false), Partition::Secondary);
        assert_eq!(Partition::select(StorageHint::InMemory, true), Partition::TempPrimary);
        assert_eq!(Partition::select(StorageHint::InCache, true), Partition::TempPrimary);
        assert_eq!(Partition::select(StorageHint::InDisk, true), Partition::TempSecondary);
    }

    #[test]
    fn test_prefix_keys_do_not_collide() {
        // "ab" and "ab2" must have disjoint key ranges.
        let in_ab = prefixed_key("ab", b"zzz");
        assert!(in_ab.as_slice() >= prefix_start("ab").as_slice());
        assert!(in_ab.as_slice() < prefix_end("ab").as_slice());
        let in_ab2 = prefixed_key("ab2", b"");
        assert!(in_ab2.as_slice() >= prefix_end("ab").as_slice());
    }

    #[test]
    fn test_put_get_remove() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new();
        let store = handle(Partition::Primary, &config, dir.path());

        assert_eq!(store.put("counts", b"a", b"1").unwrap(), None);
        assert_eq!(store.put("counts", b"a", b"2").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get("counts", b"a").unwrap(), Some(b"2".to_vec()));
        assert_eq!(store.count("counts").unwrap(), 1);
        assert_eq!(store.remove("counts", b"a").unwrap(), Some(b"2".to_vec()));
        assert_eq!(store.get("counts", b"a").unwrap(), None);
    }

    #[test]
    fn test_collections_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new();
        let store = handle(Partition::Primary, &config, dir.path());

        store.put("left", b"k", b"l").unwrap();
        store.put("right", b"k", b"r").unwrap();
        store.remove_collection("left").unwrap();
        assert_eq!(store.get("left", b"k").unwrap(), None);
        assert_eq!(store.get("right", b"k").unwrap(), Some(b"r".to_vec()));
    }

    #[test]
    fn test_catalog_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new();
        let store = handle(Partition::Primary, &config, dir.path());

        let meta = CollectionMeta { kind: MapKind::Ordered, concurrent: true };
        store.ensure_collection("weights", &meta).unwrap();
        // Idempotent with the same kind.
        store.ensure_collection("weights", &meta).unwrap();
        let catalog = store.catalog().unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].0, "weights");
        assert_eq!(catalog[0].1.kind, MapKind::Ordered);

        let clash = CollectionMeta { kind: MapKind::Hash, concurrent: false };
        assert!(matches!(
            store.ensure_collection("weights", &clash),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_temp_partition_self_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new();
        let store = handle(Partition::TempPrimary, &config, dir.path());
        let path = store.path.clone();
        store.put("scratch", b"k", b"v").unwrap();
        assert!(path.exists());
        store.close().unwrap();
        assert!(!path.exists());
        // Nothing was placed under the engine directory.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_operations_after_close_fail() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new();
        let store = handle(Partition::Primary, &config, dir.path());
        store.close().unwrap();
        store.close().unwrap(); // idempotent
        assert!(matches!(store.get("counts", b"a"), Err(StoreError::Closed)));
        assert!(matches!(store.put("counts", b"a", b"1"), Err(StoreError::Closed)));
    }
}
