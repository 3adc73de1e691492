//! Heap-backed collections.
//!
//! These back the hybrid in-memory escape: fresh, untracked by name, never
//! touching disk. All handles are internally synchronized, so the
//! concurrent-use declaration in [`MapSpec`](super::MapSpec) needs no
//! separate wrapper type here.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use super::codec::{BigKey, BigValue};
use super::MapKind;
use crate::error::{StoreError, StoreResult};

enum MapRepr<K, V> {
    Hash(HashMap<K, V>),
    Ordered(BTreeMap<K, V>),
}

/// A heap-backed big collection.
pub struct MemoryMap<K: BigKey, V: BigValue> {
    repr: Arc<RwLock<MapRepr<K, V>>>,
}

impl<K: BigKey, V: BigValue> MemoryMap<K, V> {
    /// Create an empty collection of the given kind.
    #[must_use]
    pub fn new(kind: MapKind) -> Self {
        let repr = match kind {
            MapKind::Hash => MapRepr::Hash(HashMap::new()),
            MapKind::Ordered => MapRepr::Ordered(BTreeMap::new()),
        };
        Self { repr: Arc::new(RwLock::new(repr)) }
    }

    pub(crate) fn get(&self, key: &K) -> StoreResult<Option<V>> {
        let guard = self.repr.read().map_err(|_| StoreError::backend("lock poisoned"))?;
        Ok(match &*guard {
            MapRepr::Hash(m) => m.get(key).cloned(),
            MapRepr::Ordered(m) => m.get(key).cloned(),
        })
    }

    pub(crate) fn insert(&self, key: K, value: V) -> StoreResult<Option<V>> {
        let mut guard = self.repr.write().map_err(|_| StoreError::backend("lock poisoned"))?;
        Ok(match &mut *guard {
            MapRepr::Hash(m) => m.insert(key, value),
            MapRepr::Ordered(m) => m.insert(key, value),
        })
    }

    pub(crate) fn remove(&self, key: &K) -> StoreResult<Option<V>> {
        let mut guard = self.repr.write().map_err(|_| StoreError::backend("lock poisoned"))?;
        Ok(match &mut *guard {
            MapRepr::Hash(m) => m.remove(key),
            MapRepr::Ordered(m) => m.remove(key),
        })
    }

    pub(crate) fn len(&self) -> StoreResult<u64> {
        let guard = self.repr.read().map_err(|_| StoreError::backend("lock poisoned"))?;
        Ok(match &*guard {
            MapRepr::Hash(m) => m.len() as u64,
            MapRepr::Ordered(m) => m.len() as u64,
        })
    }

    pub(crate) fn clear(&self) -> StoreResult<()> {
        let mut guard = self.repr.write().map_err(|_| StoreError::backend("lock poisoned"))?;
        match &mut *guard {
            MapRepr::Hash(m) => m.clear(),
            MapRepr::Ordered(m) => m.clear(),
        }
        Ok(())
    }

    pub(crate) fn entries(&self) -> StoreResult<Vec<(K, V)>> {
        let guard = self.repr.read().map_err(|_| StoreError::backend("lock poisoned"))?;
        Ok(match &*guard {
            MapRepr::Hash(m) => m.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            MapRepr::Ordered(m) => m.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        })
    }
}

impl<K: BigKey, V: BigValue> Clone for MemoryMap<K, V> {
    fn clone(&self) -> Self {
        Self { repr: Arc::clone(&self.repr) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_map_operations() {
        let map = MemoryMap::<String, i64>::new(MapKind::Hash);
        assert_eq!(map.insert("a".to_string(), 1).unwrap(), None);
        assert_eq!(map.insert("a".to_string(), 2).unwrap(), Some(1));
        assert_eq!(map.get(&"a".to_string()).unwrap(), Some(2));
        assert_eq!(map.len().unwrap(), 1);
        assert_eq!(map.remove(&"a".to_string()).unwrap(), Some(2));
        assert_eq!(map.len().unwrap(), 0);
    }

    #[test]
    fn test_ordered_map_iterates_in_key_order() {
        let map = MemoryMap::<i64, String>::new(MapKind::Ordered);
        for n in [5, -3, 9, 0] {
            map.insert(n, n.to_string()).unwrap();
        }
        let keys: Vec<i64> = map.entries().unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![-3, 0, 5, 9]);
    }

    #[test]
    fn test_clones_share_state() {
        let map = MemoryMap::<i64, i64>::new(MapKind::Hash);
        let other = map.clone();
        map.insert(1, 10).unwrap();
        assert_eq!(other.get(&1).unwrap(), Some(10));
    }

    #[test]
    fn test_concurrent_writers() {
        let map = MemoryMap::<i64, i64>::new(MapKind::Ordered);
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let map = map.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        map.insert(t * 100 + i, i).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(map.len().unwrap(), 400);
    }
}
