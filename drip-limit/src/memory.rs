use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::bucket::Bucket;
use crate::store::Store;
use crate::store::StoreError;

/// Entry bound applied when no explicit capacity is given.
pub const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Debug)]
struct Entry {
    bucket: Bucket,
    stamp: u64,
}

#[derive(Debug)]
struct Table {
    entries: HashMap<String, Entry>,
    /// Access log of (stamp, key) pairs, oldest first. A pair whose
    /// stamp no longer matches its entry is stale and skipped.
    recency: VecDeque<(u64, String)>,
    next_stamp: u64,
}

impl Table {
    fn touch(&mut self, key: &str) -> u64 {
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        self.recency.push_back((stamp, key.to_string()));
        stamp
    }

    /// Drop stale recency records once they dominate the log, keeping
    /// eviction amortized O(1).
    fn compact(&mut self) {
        if self.recency.len() > 2 * self.entries.len().max(1) {
            let entries = &self.entries;
            self.recency
                .retain(|(stamp, key)| entries.get(key).is_some_and(|e| e.stamp == *stamp));
        }
    }

    fn evict_lru(&mut self) {
        while let Some((stamp, key)) = self.recency.pop_front() {
            if self.entries.get(&key).is_some_and(|e| e.stamp == stamp) {
                self.entries.remove(&key);
                return;
            }
        }
    }
}

/// The default bounded in-memory store.
///
/// Keeps at most `capacity` buckets and evicts the least-recently-used
/// key (by `load`/`save` recency) when a save of a new key would exceed
/// the bound. Eviction never errors: an evicted key simply resynthesizes
/// a fresh full bucket on next access, indistinguishable from a key
/// never seen before.
///
/// Operations never suspend, so a decision cycle backed by this store
/// is not interleaved with another cycle for the same key on a
/// single-threaded runtime. State is process-local: deployments that
/// need cross-process accounting must bring their own [`Store`].
#[derive(Debug)]
pub struct MemoryStore {
    capacity: usize,
    table: Mutex<Table>,
}

impl MemoryStore {
    /// Create a store bounded to [`DEFAULT_CAPACITY`] entries.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a store bounded to `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            table: Mutex::new(Table {
                entries: HashMap::new(),
                recency: VecDeque::new(),
                next_stamp: 0,
            }),
        }
    }

    /// The number of buckets currently held.
    pub fn len(&self) -> usize {
        self.table.lock().unwrap().entries.len()
    }

    /// Whether the store holds no buckets.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<Bucket>, StoreError> {
        let mut table = self.table.lock().unwrap();
        // A miss leaves a stamp with no matching entry; eviction and
        // compaction skip such records.
        let stamp = table.touch(key);
        let bucket = match table.entries.get_mut(key) {
            Some(entry) => {
                entry.stamp = stamp;
                entry.bucket.clone()
            }
            None => return Ok(None),
        };
        table.compact();
        Ok(Some(bucket))
    }

    async fn save(&self, key: &str, bucket: Bucket) -> Result<(), StoreError> {
        let mut table = self.table.lock().unwrap();
        if !table.entries.contains_key(key) && table.entries.len() >= self.capacity {
            table.evict_lru();
        }
        let stamp = table.touch(key);
        table.entries.insert(key.to_string(), Entry { bucket, stamp });
        table.compact();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(tokens: f64) -> Bucket {
        Bucket {
            tokens,
            mtime: 0,
            rtime: 0,
        }
    }

    #[tokio::test]
    async fn it_round_trips_buckets() {
        let store = MemoryStore::new();

        assert_eq!(store.load("a").await.unwrap(), None);
        store.save("a", bucket(3.0)).await.unwrap();
        assert_eq!(store.load("a").await.unwrap(), Some(bucket(3.0)));
    }

    #[tokio::test]
    async fn it_overwrites_in_place() {
        let store = MemoryStore::with_capacity(1);

        store.save("a", bucket(3.0)).await.unwrap();
        store.save("a", bucket(2.0)).await.unwrap();
        assert_eq!(store.load("a").await.unwrap(), Some(bucket(2.0)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn it_evicts_the_least_recently_used_key() {
        let store = MemoryStore::with_capacity(2);

        store.save("a", bucket(1.0)).await.unwrap();
        store.save("b", bucket(2.0)).await.unwrap();

        // Touch "a" so that "b" is the eviction candidate.
        let _ = store.load("a").await.unwrap();

        store.save("c", bucket(3.0)).await.unwrap();

        assert_eq!(store.load("b").await.unwrap(), None);
        assert_eq!(store.load("a").await.unwrap(), Some(bucket(1.0)));
        assert_eq!(store.load("c").await.unwrap(), Some(bucket(3.0)));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn it_never_exceeds_capacity() {
        let store = MemoryStore::with_capacity(10);

        for i in 0..100 {
            store.save(&format!("key-{i}"), bucket(i as f64)).await.unwrap();
            assert!(store.len() <= 10);
        }

        // The newest keys survive.
        assert_eq!(store.load("key-99").await.unwrap(), Some(bucket(99.0)));
        assert_eq!(store.load("key-0").await.unwrap(), None);
    }

    #[tokio::test]
    async fn stale_recency_records_do_not_evict_live_keys() {
        let store = MemoryStore::with_capacity(2);

        store.save("a", bucket(1.0)).await.unwrap();
        // Pile up stale records for "a" at the front of the log.
        for _ in 0..50 {
            let _ = store.load("a").await.unwrap();
        }
        store.save("b", bucket(2.0)).await.unwrap();
        // Touch "a" once more so it is newer than "b".
        let _ = store.load("a").await.unwrap();

        store.save("c", bucket(3.0)).await.unwrap();

        // Eviction must skip the stale "a" records and land on "b".
        assert_eq!(store.load("b").await.unwrap(), None);
        assert_eq!(store.load("a").await.unwrap(), Some(bucket(1.0)));
        assert_eq!(store.load("c").await.unwrap(), Some(bucket(3.0)));
    }
}
