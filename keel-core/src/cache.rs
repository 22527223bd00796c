use crate::{Entity, Error, ImmutableProp, ImmutableType, Result, Value};
use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Arc, RwLock},
};

/// Key/value store consulted before the database.
///
/// Implementations must be safe to share between concurrent saves, invalidation happens from
/// trigger listeners on the task that executed the write.
pub trait Cache<K: Eq + Hash + Clone, V>: Send + Sync {
    /// Entries found, missing keys are absent from the map.
    fn get_all(&self, keys: &[K]) -> Result<HashMap<K, V>>;

    fn put_all(&self, entries: HashMap<K, V>) -> Result<()>;

    /// Evicts `keys`, `reason` is the token of the change that caused the eviction.
    fn delete_all(&self, keys: &[K], reason: Option<&str>) -> Result<()>;

    fn get(&self, key: &K) -> Result<Option<V>> {
        Ok(self.get_all(std::slice::from_ref(key))?.remove(key))
    }

    fn put(&self, key: K, value: V) -> Result<()> {
        self.put_all(HashMap::from([(key, value)]))
    }

    fn delete(&self, key: &K, reason: Option<&str>) -> Result<()> {
        self.delete_all(std::slice::from_ref(key), reason)
    }
}

/// Entities by id.
pub type ObjectCache = Arc<dyn Cache<Value, Entity>>;
/// Target ids by source id.
pub type AssociationCache = Arc<dyn Cache<Value, Vec<Value>>>;

/// Decides which types and props are cached, called once per type and per list prop when the
/// client is built.
pub trait CacheFactory: Send + Sync {
    fn create_object_cache(&self, ty: &ImmutableType) -> Option<ObjectCache>;

    fn create_association_cache(&self, _prop: &ImmutableProp) -> Option<AssociationCache> {
        None
    }
}

/// In process cache backed by a `HashMap`.
#[derive(Debug)]
pub struct MemoryCache<K, V> {
    entries: RwLock<HashMap<K, V>>,
}

impl<K, V> MemoryCache<K, V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for MemoryCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> MemoryCache<K, V>
where
    K: Eq + Hash,
{
    pub fn len(&self) -> usize {
        self.entries.read().map(|v| v.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> Error {
    Error::msg("the cache lock is poisoned")
}

impl<K, V> Cache<K, V> for MemoryCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get_all(&self, keys: &[K]) -> Result<HashMap<K, V>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(keys
            .iter()
            .filter_map(|k| entries.get(k).map(|v| (k.clone(), v.clone())))
            .collect())
    }

    fn put_all(&self, entries: HashMap<K, V>) -> Result<()> {
        self.entries
            .write()
            .map_err(|_| poisoned())?
            .extend(entries);
        Ok(())
    }

    fn delete_all(&self, keys: &[K], _reason: Option<&str>) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}

/// Caches every entity type and every list association in memory.
#[derive(Default, Debug, Clone, Copy)]
pub struct MemoryCacheFactory;

impl CacheFactory for MemoryCacheFactory {
    fn create_object_cache(&self, _ty: &ImmutableType) -> Option<ObjectCache> {
        Some(Arc::new(MemoryCache::<Value, Entity>::new()))
    }

    fn create_association_cache(&self, prop: &ImmutableProp) -> Option<AssociationCache> {
        prop.is_list()
            .then(|| Arc::new(MemoryCache::<Value, Vec<Value>>::new()) as AssociationCache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_cache() {
        let cache = MemoryCache::<Value, Vec<Value>>::new();
        assert!(cache.is_empty());
        cache
            .put(Value::Int64(Some(1)), vec![Value::Int64(Some(10))])
            .unwrap();
        cache
            .put_all(HashMap::from([
                (Value::Int64(Some(2)), vec![]),
                (Value::Int64(Some(3)), vec![Value::Int64(Some(30))]),
            ]))
            .unwrap();
        // Int32 and Int64 keys are the same key
        let found = cache
            .get_all(&[Value::Int32(Some(1)), Value::Int64(Some(4))])
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(
            found.get(&Value::Int64(Some(1))),
            Some(&vec![Value::Int64(Some(10))])
        );
        cache
            .delete_all(&[Value::Int64(Some(1)), Value::Int64(Some(2))], Some("test"))
            .unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&Value::Int64(Some(1))).unwrap(), None);
    }
}
