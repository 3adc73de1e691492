//! Disk-backed collection handles.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::engine::partition::PartitionHandle;
use crate::error::StoreResult;
use crate::map::codec::{key_bytes, value_bytes, value_from_bytes, BigKey, BigValue};

/// Typed view onto one named collection inside a partition store.
///
/// The handle is cheap to clone; all clones share the partition. Keys are
/// stored under their order-preserving encoding, so iteration over an
/// `Ordered` collection comes back in key order.
pub struct DiskMap<K: BigKey, V: BigValue> {
    partition: Arc<PartitionHandle>,
    collection: String,
    _types: PhantomData<fn() -> (K, V)>,
}

impl<K: BigKey, V: BigValue> DiskMap<K, V> {
    pub(crate) fn new(partition: Arc<PartitionHandle>, collection: String) -> Self {
        Self { partition, collection, _types: PhantomData }
    }

    pub(crate) fn get(&self, key: &K) -> StoreResult<Option<V>> {
        let kb = key_bytes(key);
        match self.partition.get(&self.collection, &kb)? {
            Some(bytes) => Ok(Some(value_from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn insert(&self, key: K, value: V) -> StoreResult<Option<V>> {
        let kb = key_bytes(&key);
        let vb = value_bytes(&value, self.partition.compressed())?;
        match self.partition.put(&self.collection, &kb, &vb)? {
            Some(bytes) => Ok(Some(value_from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn remove(&self, key: &K) -> StoreResult<Option<V>> {
        let kb = key_bytes(key);
        match self.partition.remove(&self.collection, &kb)? {
            Some(bytes) => Ok(Some(value_from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn len(&self) -> StoreResult<u64> {
        self.partition.count(&self.collection)
    }

    pub(crate) fn clear(&self) -> StoreResult<()> {
        self.partition.clear_collection(&self.collection)
    }

    pub(crate) fn entries(&self) -> StoreResult<Vec<(K, V)>> {
        let raw = self.partition.scan(&self.collection)?;
        let mut entries = Vec::with_capacity(raw.len());
        for (kb, vb) in raw {
            entries.push((K::decode_key(&kb)?, value_from_bytes(&vb)?));
        }
        Ok(entries)
    }
}

impl<K: BigKey, V: BigValue> Clone for DiskMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            partition: Arc::clone(&self.partition),
            collection: self.collection.clone(),
            _types: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::engine::partition::Partition;

    fn map(dir: &std::path::Path) -> DiskMap<i64, String> {
        let handle = PartitionHandle::open(Partition::Primary, &StoreConfig::new(), dir)
            .expect("failed to open partition");
        DiskMap::new(Arc::new(handle), "scores".to_string())
    }

    #[test]
    fn test_typed_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let map = map(dir.path());

        assert_eq!(map.insert(7, "seven".to_string()).unwrap(), None);
        assert_eq!(map.insert(7, "VII".to_string()).unwrap(), Some("seven".to_string()));
        assert_eq!(map.get(&7).unwrap(), Some("VII".to_string()));
        assert_eq!(map.len().unwrap(), 1);
        assert_eq!(map.remove(&7).unwrap(), Some("VII".to_string()));
        assert_eq!(map.get(&7).unwrap(), None);
    }

    #[test]
    fn test_entries_come_back_in_key_order() {
        let dir = tempfile::tempdir().unwrap();
        let map = map(dir.path());

        for k in [5i64, -3, 0, 42, -100] {
            map.insert(k, k.to_string()).unwrap();
        }
        let keys: Vec<i64> = map.entries().unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![-100, -3, 0, 5, 42]);
    }

    #[test]
    fn test_clones_share_state() {
        let dir = tempfile::tempdir().unwrap();
        let map = map(dir.path());
        let other = map.clone();

        map.insert(1, "one".to_string()).unwrap();
        assert_eq!(other.get(&1).unwrap(), Some("one".to_string()));
        other.clear().unwrap();
        assert_eq!(map.len().unwrap(), 0);
    }
}
