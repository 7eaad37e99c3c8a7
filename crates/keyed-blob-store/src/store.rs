//! Capacity-bounded durable keyed store over a single-blob medium.

use crate::{StorageMedium, StoreResult, TicketLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// A mutex-guarded map of generated keys to serialized values, persisted as
/// one JSON blob under a fixed store key.
///
/// Every operation is a full read-mutate-write-back cycle executed under the
/// store's [`TicketLock`], so cycles from racing tasks never interleave and
/// no update is lost. Two instances typically exist in a delivery pipeline:
/// one for not-yet-batched events, one for undelivered batches.
pub struct KeyedStore<V> {
    store_key: String,
    capacity: usize,
    medium: Arc<dyn StorageMedium>,
    lock: TicketLock,
    _marker: std::marker::PhantomData<fn() -> V>,
}

impl<V> KeyedStore<V>
where
    V: Serialize + DeserializeOwned,
{
    /// Create a store persisting under `store_key` with at most `capacity`
    /// entries.
    pub fn new(store_key: impl Into<String>, capacity: usize, medium: Arc<dyn StorageMedium>) -> Self {
        Self {
            store_key: store_key.into(),
            capacity,
            medium,
            lock: TicketLock::new(),
            _marker: std::marker::PhantomData,
        }
    }

    /// The fixed key this store occupies in the medium.
    pub fn store_key(&self) -> &str {
        &self.store_key
    }

    /// Maximum number of entries this store will hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert or replace `value` under `key`.
    ///
    /// Returns `Ok(false)` without writing when the store is full and `key`
    /// is new; existing keys can always be overwritten.
    pub async fn set(&self, key: &str, value: &V) -> StoreResult<bool> {
        let _guard = self.lock.acquire().await;
        let mut map = self.read_map().await?;

        if map.len() >= self.capacity && !map.contains_key(key) {
            warn!(
                store = %self.store_key,
                capacity = self.capacity,
                key = %key,
                "Store at capacity, dropping insert"
            );
            return Ok(false);
        }

        map.insert(key.to_string(), serde_json::to_value(value)?);
        self.write_map(&map).await?;
        Ok(true)
    }

    /// Fetch the value under `key`, if present.
    pub async fn get(&self, key: &str) -> StoreResult<Option<V>> {
        let _guard = self.lock.acquire().await;
        let map = self.read_map().await?;
        match map.get(key) {
            Some(raw) => Ok(Some(serde_json::from_value(raw.clone())?)),
            None => Ok(None),
        }
    }

    /// Fetch every entry currently stored.
    pub async fn get_all(&self) -> StoreResult<HashMap<String, V>> {
        let _guard = self.lock.acquire().await;
        let map = self.read_map().await?;
        let mut out = HashMap::with_capacity(map.len());
        for (key, raw) in map {
            out.insert(key, serde_json::from_value(raw)?);
        }
        Ok(out)
    }

    /// Remove the entry under `key`. Removing a missing key is a no-op.
    pub async fn remove(&self, key: &str) -> StoreResult<()> {
        let _guard = self.lock.acquire().await;
        let mut map = self.read_map().await?;
        if map.remove(key).is_some() {
            self.write_map(&map).await?;
            debug!(store = %self.store_key, key = %key, "Removed entry");
        }
        Ok(())
    }

    /// Remove every listed key in one lock-held cycle. Missing keys are
    /// skipped.
    pub async fn remove_many(&self, keys: &[String]) -> StoreResult<()> {
        let _guard = self.lock.acquire().await;
        let mut map = self.read_map().await?;
        let before = map.len();
        for key in keys {
            map.remove(key);
        }
        if map.len() != before {
            self.write_map(&map).await?;
            debug!(
                store = %self.store_key,
                removed = before - map.len(),
                "Removed entries"
            );
        }
        Ok(())
    }

    /// Drop every entry.
    pub async fn clear(&self) -> StoreResult<()> {
        let _guard = self.lock.acquire().await;
        self.medium.delete(&self.store_key).await?;
        debug!(store = %self.store_key, "Cleared store");
        Ok(())
    }

    /// Number of entries currently stored.
    pub async fn len(&self) -> StoreResult<usize> {
        let _guard = self.lock.acquire().await;
        Ok(self.read_map().await?.len())
    }

    /// Whether the store holds no entries.
    pub async fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len().await? == 0)
    }

    async fn read_map(&self) -> StoreResult<HashMap<String, serde_json::Value>> {
        match self.medium.read(&self.store_key).await? {
            Some(blob) => Ok(serde_json::from_str(&blob)?),
            None => Ok(HashMap::new()),
        }
    }

    async fn write_map(&self, map: &HashMap<String, serde_json::Value>) -> StoreResult<()> {
        let blob = serde_json::to_string(map)?;
        self.medium.write(&self.store_key, &blob).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryMedium;

    fn store(capacity: usize) -> KeyedStore<String> {
        KeyedStore::new("test-store", capacity, Arc::new(MemoryMedium::new()))
    }

    #[tokio::test]
    async fn set_get_remove_round_trip() {
        let store = store(10);

        assert!(store.set("k1", &"v1".to_string()).await.unwrap());
        assert_eq!(store.get("k1").await.unwrap(), Some("v1".to_string()));
        assert_eq!(store.get("missing").await.unwrap(), None);

        store.remove("k1").await.unwrap();
        assert_eq!(store.get("k1").await.unwrap(), None);
        assert!(store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn remove_missing_key_is_noop() {
        let store = store(10);
        store.remove("ghost").await.unwrap();
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn capacity_rejects_new_keys_only() {
        let store = store(2);

        assert!(store.set("a", &"1".to_string()).await.unwrap());
        assert!(store.set("b", &"2".to_string()).await.unwrap());

        // New key past capacity is rejected and nothing is evicted.
        assert!(!store.set("c", &"3".to_string()).await.unwrap());
        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all.get("a"), Some(&"1".to_string()));
        assert_eq!(all.get("b"), Some(&"2".to_string()));
        assert_eq!(store.get("c").await.unwrap(), None);

        // Overwriting an existing key still works at capacity.
        assert!(store.set("a", &"1b".to_string()).await.unwrap());
        assert_eq!(store.get("a").await.unwrap(), Some("1b".to_string()));
    }

    #[tokio::test]
    async fn capacity_plus_one_inserts_leave_exactly_capacity_entries() {
        let capacity = 8;
        let store = store(capacity);

        let mut stored = 0;
        for i in 0..=capacity {
            if store.set(&format!("k{i}"), &i.to_string()).await.unwrap() {
                stored += 1;
            }
        }

        assert_eq!(stored, capacity);
        assert_eq!(store.get_all().await.unwrap().len(), capacity);
    }

    #[tokio::test]
    async fn concurrent_sets_with_distinct_keys_all_land() {
        let store = Arc::new(store(64));

        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                assert!(store.set(&format!("k{i}"), &i.to_string()).await.unwrap());
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 32);
        for i in 0..32 {
            assert_eq!(all.get(&format!("k{i}")), Some(&i.to_string()));
        }
    }

    #[tokio::test]
    async fn remove_many_removes_only_listed_keys() {
        let store = store(10);
        for key in ["a", "b", "c", "d"] {
            store.set(key, &key.to_string()).await.unwrap();
        }

        store
            .remove_many(&["a".to_string(), "c".to_string(), "ghost".to_string()])
            .await
            .unwrap();

        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.contains_key("b"));
        assert!(all.contains_key("d"));
    }

    #[tokio::test]
    async fn clear_empties_the_store() {
        let store = store(10);
        store.set("a", &"1".to_string()).await.unwrap();
        store.set("b", &"2".to_string()).await.unwrap();

        store.clear().await.unwrap();
        assert!(store.is_empty().await.unwrap());
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn two_stores_share_a_medium_without_collisions() {
        let medium: Arc<dyn StorageMedium> = Arc::new(MemoryMedium::new());
        let buffer: KeyedStore<String> = KeyedStore::new("buffer", 10, medium.clone());
        let pending: KeyedStore<String> = KeyedStore::new("pending", 10, medium);

        buffer.set("k", &"event".to_string()).await.unwrap();
        pending.set("k", &"batch".to_string()).await.unwrap();

        assert_eq!(buffer.get("k").await.unwrap(), Some("event".to_string()));
        assert_eq!(pending.get("k").await.unwrap(), Some("batch".to_string()));

        buffer.clear().await.unwrap();
        assert_eq!(pending.get("k").await.unwrap(), Some("batch".to_string()));
    }

    #[tokio::test]
    async fn persists_across_store_instances_on_same_medium() {
        let medium: Arc<dyn StorageMedium> = Arc::new(MemoryMedium::new());
        {
            let store: KeyedStore<String> = KeyedStore::new("events", 10, medium.clone());
            store.set("k1", &"v1".to_string()).await.unwrap();
        }
        let reopened: KeyedStore<String> = KeyedStore::new("events", 10, medium);
        assert_eq!(reopened.get("k1").await.unwrap(), Some("v1".to_string()));
    }
}
