//! The disk-backed engine.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::engine::core::EngineCore;
use crate::engine::partition::{CollectionMeta, Partition, PartitionHandle};
use crate::engine::BigMapStore;
use crate::error::{StoreError, StoreResult};
use crate::map::{
    validate_name, BigKey, BigMap, BigValue, DiskMap, MapSpec, MemoryMap, StorageHint,
};
use crate::snapshot::{decode_snapshot, encode_snapshot, Persistable};

/// Poll interval of the bounded directory-move retry in `rename`.
const RENAME_POLL: Duration = Duration::from_millis(50);

/// Attempt cap of the bounded directory-move retry in `rename`.
const RENAME_ATTEMPTS: u32 = 100;

/// Lifecycle state of one partition slot.
enum Slot {
    /// Never opened by this engine instance, or released by `rename`/`clear`
    /// and eligible for reopening.
    Unopened,
    Open(Arc<PartitionHandle>),
    /// Released by `close()`. Never reopened by this instance.
    Closed,
}

/// A named engine of disk-backed big collections.
///
/// Partition stores open lazily on first use; an engine that only ever
/// serves hybridized in-memory collections touches no disk at all. `rename`
/// and `clear` release the underlying partition stores, so handles returned
/// by [`get_big_map`](Self::get_big_map) before those calls fail with
/// `Closed` afterward and must be re-acquired; the collections themselves
/// persist across `rename`.
///
/// Lock order is partition table, then registry; never the reverse.
pub struct DiskStore {
    config: StoreConfig,
    core: EngineCore,
    /// One slot per [`Partition::ALL`] entry.
    partitions: Mutex<[Slot; 4]>,
    /// Which partition each known collection name lives in. Populated from
    /// each partition's catalog when it opens, so names persisted by an
    /// earlier run route correctly.
    registry: Mutex<HashMap<String, Partition>>,
}

impl DiskStore {
    pub(crate) fn new(config: StoreConfig, name: String) -> Self {
        Self {
            config,
            core: EngineCore::new(name),
            partitions: Mutex::new([Slot::Unopened, Slot::Unopened, Slot::Unopened, Slot::Unopened]),
            registry: Mutex::new(HashMap::new()),
        }
    }

    /// The configuration this engine was created with.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The engine's logical name.
    #[must_use]
    pub fn name(&self) -> String {
        self.core.name()
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    fn slots(&self) -> StoreResult<MutexGuard<'_, [Slot; 4]>> {
        self.partitions.lock().map_err(|_| StoreError::backend("partition table lock poisoned"))
    }

    fn registry(&self) -> StoreResult<MutexGuard<'_, HashMap<String, Partition>>> {
        self.registry.lock().map_err(|_| StoreError::backend("registry lock poisoned"))
    }

    /// Directory holding this engine's persistent partition files.
    fn engine_dir(&self) -> StoreResult<PathBuf> {
        let name = self.core.name();
        validate_name("engine", &name)?;
        Ok(self.config.root_dir().join(name))
    }

    /// Fetch a partition's store, opening it on first use.
    ///
    /// The slot mutex covers exactly the check-then-open step, so two
    /// threads racing on an unopened partition converge on one handle.
    fn partition(&self, partition: Partition) -> StoreResult<Arc<PartitionHandle>> {
        let mut slots = self.slots()?;
        match &slots[partition.index()] {
            Slot::Open(handle) => Ok(Arc::clone(handle)),
            Slot::Closed => Err(StoreError::Closed),
            Slot::Unopened => {
                let dir = self.engine_dir()?;
                let handle = Arc::new(PartitionHandle::open(partition, &self.config, &dir)?);
                let catalog = handle.catalog()?;
                {
                    let mut registry = self.registry()?;
                    for (name, _) in catalog {
                        registry.insert(name, partition);
                    }
                }
                slots[partition.index()] = Slot::Open(Arc::clone(&handle));
                Ok(handle)
            }
        }
    }

    /// The primary partition's store, but only if it is already open or its
    /// backing file exists. Read paths use this so probing for absent state
    /// never materializes partition files.
    fn primary_if_present(&self) -> StoreResult<Option<Arc<PartitionHandle>>> {
        {
            let slots = self.slots()?;
            if let Slot::Open(handle) = &slots[Partition::Primary.index()] {
                return Ok(Some(Arc::clone(handle)));
            }
        }
        let path = self.engine_dir()?.join(Partition::Primary.file_name());
        if path.exists() {
            self.partition(Partition::Primary).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Create or reopen the named big collection.
    ///
    /// See [`BigMapStore::get_big_map`] for semantics.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` on a malformed name or a kind mismatch with an
    /// existing collection, `Closed` after close.
    pub fn get_big_map<K: BigKey, V: BigValue>(&self, spec: &MapSpec) -> StoreResult<BigMap<K, V>> {
        self.core.assert_open()?;
        spec.validate()?;

        // Hybridized in-memory collections live on the heap, untracked by
        // name: two requests with the same name get independent maps.
        if self.config.hybridized && spec.hint == StorageHint::InMemory {
            debug!(name = %spec.name, "hybridized in-memory collection");
            return Ok(BigMap::Memory(MemoryMap::new(spec.kind)));
        }

        // A name already bound to a partition resolves there regardless of
        // the hint, so repeated requests reuse one collection.
        let bound = self.registry()?.get(&spec.name).copied();
        let partition = bound.unwrap_or_else(|| Partition::select(spec.hint, spec.temporary));

        let handle = self.partition(partition)?;
        let meta = CollectionMeta { kind: spec.kind, concurrent: spec.concurrent };
        handle.ensure_collection(&spec.name, &meta)?;
        self.registry()?.insert(spec.name.clone(), partition);

        Ok(BigMap::Disk(DiskMap::new(handle, spec.name.clone())))
    }

    /// Destroy the named collection.
    ///
    /// See [`BigMapStore::drop_big_map`] for semantics.
    ///
    /// # Errors
    ///
    /// `Closed` after close.
    pub fn drop_big_map<K: BigKey, V: BigValue>(
        &self,
        name: &str,
        map: &BigMap<K, V>,
    ) -> StoreResult<()> {
        self.core.assert_open()?;
        let bound = self.registry()?.get(name).copied();
        match bound {
            Some(partition) => {
                let handle = self.partition(partition)?;
                handle.remove_collection(name)?;
                self.registry()?.remove(name);
                debug!(name, ?partition, "dropped collection");
                Ok(())
            }
            // Unknown to every partition: a hybridized in-memory map, or a
            // handle this engine never persisted. Clear it in place.
            None => map.clear(),
        }
    }

    /// Persist an aggregate's snapshot under `name`.
    ///
    /// # Errors
    ///
    /// `Serialization` on encoding failure, `Closed` after close.
    pub fn save_object<T: Persistable>(&self, name: &str, value: &T) -> StoreResult<()> {
        self.core.assert_open()?;
        validate_name("object", name)?;
        let bytes = encode_snapshot(value, self.config.compressed)?;
        let handle = self.partition(Partition::Primary)?;
        handle.put_object(name, &bytes)?;
        debug!(name, len = bytes.len(), "saved object");
        Ok(())
    }

    /// Load a previously saved aggregate, reattaching its collections.
    ///
    /// # Errors
    ///
    /// `NotFound` if no slot with that name exists, `Closed` after close.
    pub fn load_object<T: Persistable>(&self, name: &str) -> StoreResult<T> {
        self.core.assert_open()?;
        validate_name("object", name)?;
        let bytes = match self.primary_if_present()? {
            Some(handle) => handle.get_object(name)?,
            None => None,
        };
        match bytes {
            Some(bytes) => T::from_snapshot(decode_snapshot::<T>(&bytes)?, self),
            None => Err(StoreError::NotFound(name.to_string())),
        }
    }

    /// Whether a named object slot exists. Never creates partition files.
    ///
    /// # Errors
    ///
    /// `Closed` after close.
    pub fn exists_object(&self, name: &str) -> StoreResult<bool> {
        self.core.assert_open()?;
        validate_name("object", name)?;
        match self.primary_if_present()? {
            Some(handle) => Ok(handle.get_object(name)?.is_some()),
            None => Ok(false),
        }
    }

    /// Rename the engine, moving `<root>/<old>` to `<root>/<new>`.
    ///
    /// The persistent partitions are committed and released first, then the
    /// directory moves with a bounded retry; they reopen lazily under the
    /// new name. Temporary partitions are untouched. Not atomic across the
    /// close-then-move boundary.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the target directory already exists (checked
    /// before any path is mutated), `CloseWait` if the retry is exhausted.
    pub fn rename(&self, new_name: &str) -> StoreResult<bool> {
        self.core.assert_open()?;
        validate_name("engine", new_name)?;
        let old_name = self.core.name();
        if old_name == new_name {
            return Ok(false);
        }

        let root = self.config.root_dir();
        let old_dir = root.join(&old_name);
        let new_dir = root.join(new_name);
        if new_dir.exists() {
            return Err(StoreError::InvalidArgument(format!(
                "target directory already exists: {}",
                new_dir.display()
            )));
        }

        // Release the persistent partitions so their files can move. The
        // slots revert to `Unopened` and reopen under the new name.
        {
            let mut slots = self.slots()?;
            for partition in Partition::ALL {
                if !partition.is_renameable() {
                    continue;
                }
                let slot = &mut slots[partition.index()];
                if let Slot::Open(handle) = std::mem::replace(slot, Slot::Unopened) {
                    handle.close()?;
                }
            }
        }

        if old_dir.exists() {
            move_dir_bounded(&old_dir, &new_dir)?;
        }
        self.core.set_name(new_name);
        debug!(from = %old_name, to = %new_name, "renamed engine");
        Ok(true)
    }

    /// Destroy all state of this engine and remove its directory tree.
    ///
    /// Every partition is released (temp backing dirs self-delete), the
    /// engine directory is deleted, and now-empty ancestors are pruned up
    /// to (excluding) the configured root or the system temp directory.
    /// The engine stays open: collections can be recreated afterward.
    ///
    /// # Errors
    ///
    /// `Io` on filesystem failure, `Closed` after close.
    pub fn clear(&self) -> StoreResult<()> {
        self.core.assert_open()?;
        {
            let mut slots = self.slots()?;
            for slot in slots.iter_mut() {
                if let Slot::Open(handle) = std::mem::replace(slot, Slot::Unopened) {
                    handle.close()?;
                }
            }
        }
        self.registry()?.clear();

        let dir = self.engine_dir()?;
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        prune_empty_ancestors(dir.parent(), &self.config)?;
        debug!(name = %self.core.name(), "cleared engine");
        Ok(())
    }

    /// Close the engine and release every partition. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if releasing a partition store fails; the engine
    /// still counts as closed.
    pub fn close(&self) -> StoreResult<()> {
        if !self.core.begin_close() {
            return Ok(());
        }
        let mut slots = self.slots()?;
        for slot in slots.iter_mut() {
            if let Slot::Open(handle) = std::mem::replace(slot, Slot::Closed) {
                handle.close()?;
            }
        }
        debug!(name = %self.core.name(), "closed engine");
        Ok(())
    }
}

impl BigMapStore for DiskStore {
    fn name(&self) -> String {
        Self::name(self)
    }

    fn is_closed(&self) -> bool {
        Self::is_closed(self)
    }

    fn close(&self) -> StoreResult<()> {
        Self::close(self)
    }

    fn get_big_map<K: BigKey, V: BigValue>(&self, spec: &MapSpec) -> StoreResult<BigMap<K, V>> {
        Self::get_big_map(self, spec)
    }

    fn drop_big_map<K: BigKey, V: BigValue>(
        &self,
        name: &str,
        map: &BigMap<K, V>,
    ) -> StoreResult<()> {
        Self::drop_big_map(self, name, map)
    }

    fn save_object<T: Persistable>(&self, name: &str, value: &T) -> StoreResult<()> {
        Self::save_object(self, name, value)
    }

    fn load_object<T: Persistable>(&self, name: &str) -> StoreResult<T> {
        Self::load_object(self, name)
    }

    fn exists_object(&self, name: &str) -> StoreResult<bool> {
        Self::exists_object(self, name)
    }

    fn rename(&self, new_name: &str) -> StoreResult<bool> {
        Self::rename(self, new_name)
    }

    fn clear(&self) -> StoreResult<()> {
        Self::clear(self)
    }
}

impl Drop for DiskStore {
    fn drop(&mut self) {
        if self.core.is_closed() {
            return;
        }
        if let Err(err) = self.close() {
            warn!(name = %self.core.name(), %err, "failed to close engine during drop");
        }
    }
}

/// Move a directory, retrying on a fixed interval while the backing files
/// become movable. Only access conflicts are retried (a just-closed store
/// may hold its files for a moment on some platforms); any other failure
/// is a plain I/O error. Exhaustion is a `CloseWait` error.
fn move_dir_bounded(from: &Path, to: &Path) -> StoreResult<()> {
    let mut last_err = None;
    for attempt in 0..RENAME_ATTEMPTS {
        match fs::rename(from, to) {
            Ok(()) => return Ok(()),
            Err(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::PermissionDenied | std::io::ErrorKind::ResourceBusy
                ) =>
            {
                last_err = Some(err);
                if attempt + 1 < RENAME_ATTEMPTS {
                    thread::sleep(RENAME_POLL);
                }
            }
            Err(err) => return Err(StoreError::Io(err)),
        }
    }
    Err(StoreError::CloseWait(format!(
        "could not move {} to {} after {RENAME_ATTEMPTS} attempts: {}",
        from.display(),
        to.display(),
        last_err.map_or_else(|| "unknown error".to_string(), |e| e.to_string())
    )))
}

/// Remove now-empty directories walking up from `start`, stopping before the
/// configured root or the system temp directory.
fn prune_empty_ancestors(start: Option<&Path>, config: &StoreConfig) -> StoreResult<()> {
    let temp_root = std::env::temp_dir();
    let mut current = start;
    while let Some(dir) = current {
        if config.is_root(dir) || dir == temp_root.as_path() {
            break;
        }
        let empty = match fs::read_dir(dir) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => break,
        };
        if !empty {
            break;
        }
        fs::remove_dir(dir)?;
        current = dir.parent();
    }
    Ok(())
}
