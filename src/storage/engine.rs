//! Thread-Safe Storage Engine
//!
//! This module implements the key-value store shared by every connection.
//!
//! ## Design Decisions
//!
//! 1. **One RwLock**: The whole map sits behind a single reader/writer lock.
//!    `GET` takes the read side, `SET` and `DELETE` take the write side.
//! 2. **Encapsulated**: The map is private. Callers only see `set`, `get`,
//!    `delete` and the statistics snapshot.
//! 3. **Counters on success only**: A blank key, or a `GET`/`DELETE` on a
//!    missing key, leaves the counters untouched.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              StorageEngine               │
//! │  ┌────────────────────────────────────┐  │
//! │  │ RwLock<HashMap<String, Bytes>>     │  │
//! │  └────────────────────────────────────┘  │
//! │  set_count   get_count   delete_count    │
//! └──────────────────────────────────────────┘
//!        ▲            ▲             ▲
//!   conn task    conn task     conn task
//! ```

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A snapshot of the operation counters.
///
/// The three values are read independently and are not guaranteed to be
/// mutually consistent while operations are in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Successful `SET` operations
    pub sets: u64,
    /// `GET` operations that found a value
    pub gets: u64,
    /// `DELETE` operations that removed a value
    pub deletes: u64,
}

/// The in-memory key-value store.
///
/// # Thread Safety
///
/// This struct is designed to be wrapped in an `Arc` and shared across
/// all connection tasks. All operations are thread-safe.
///
/// # Example
///
/// ```
/// use linekv::storage::StorageEngine;
/// use bytes::Bytes;
///
/// let engine = StorageEngine::new();
///
/// engine.set("name", Bytes::from("Ariz"));
/// assert_eq!(engine.get("name"), Some(Bytes::from("Ariz")));
///
/// engine.delete("name");
/// assert_eq!(engine.get("name"), None);
/// ```
pub struct StorageEngine {
    /// The entries, keyed by exact key text
    data: RwLock<HashMap<String, Bytes>>,

    /// Statistics: successful SET operations
    set_count: AtomicU64,

    /// Statistics: GET operations on existing keys
    get_count: AtomicU64,

    /// Statistics: DELETE operations on existing keys
    delete_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("keys", &self.len())
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("delete_count", &self.delete_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates an empty storage engine.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            set_count: AtomicU64::new(0),
            get_count: AtomicU64::new(0),
            delete_count: AtomicU64::new(0),
        }
    }

    // No operation leaves the map half-updated, so a poisoned lock still
    // guards a consistent map.
    #[inline]
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Bytes>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Bytes>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts or overwrites a key.
    ///
    /// Does nothing if `key` is blank.
    pub fn set(&self, key: &str, value: Bytes) {
        if is_blank(key) {
            return;
        }

        let mut data = self.write();
        data.insert(key.to_string(), value);
        self.set_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key is blank or not present.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        if is_blank(key) {
            return None;
        }

        let data = self.read();
        let value = data.get(key)?.clone();
        self.get_count.fetch_add(1, Ordering::Relaxed);
        Some(value)
    }

    /// Removes a key.
    ///
    /// Does nothing if the key is blank or not present.
    pub fn delete(&self, key: &str) {
        if is_blank(key) {
            return;
        }

        let mut data = self.write();
        if data.remove(key).is_some() {
            self.delete_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Returns a snapshot of the operation counters.
    pub fn statistics(&self) -> StoreStats {
        StoreStats {
            sets: self.set_count.load(Ordering::Relaxed),
            gets: self.get_count.load(Ordering::Relaxed),
            deletes: self.delete_count.load(Ordering::Relaxed),
        }
    }

    /// Returns the number of keys currently stored.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns true if the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[inline]
fn is_blank(key: &str) -> bool {
    key.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_set_and_get() {
        let engine = StorageEngine::new();

        engine.set("key", Bytes::from("value"));
        assert_eq!(engine.get("key"), Some(Bytes::from("value")));
    }

    #[test]
    fn test_get_nonexistent() {
        let engine = StorageEngine::new();
        assert_eq!(engine.get("nonexistent"), None);
        assert_eq!(engine.statistics().gets, 0);
    }

    #[test]
    fn test_overwrite() {
        let engine = StorageEngine::new();

        engine.set("key", Bytes::from("old"));
        engine.set("key", Bytes::from("new"));

        assert_eq!(engine.get("key"), Some(Bytes::from("new")));
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.statistics().sets, 2);
    }

    #[test]
    fn test_delete() {
        let engine = StorageEngine::new();

        engine.set("key", Bytes::from("value"));
        engine.delete("key");
        assert_eq!(engine.get("key"), None);
        assert!(engine.is_empty());

        // Deleting again is a no-op
        engine.delete("key");
        assert_eq!(engine.statistics().deletes, 1);
    }

    #[test]
    fn test_blank_keys_ignored() {
        let engine = StorageEngine::new();

        engine.set("", Bytes::from("value"));
        engine.set("   ", Bytes::from("value"));
        engine.set("\t", Bytes::from("value"));
        assert_eq!(engine.get(""), None);
        assert_eq!(engine.get("  "), None);
        engine.delete("");

        assert!(engine.is_empty());
        assert_eq!(engine.statistics(), StoreStats::default());
    }

    #[test]
    fn test_keys_are_exact_match() {
        let engine = StorageEngine::new();

        engine.set("Key", Bytes::from("value"));
        assert_eq!(engine.get("key"), None);
        assert_eq!(engine.get(" Key"), None);
        assert_eq!(engine.get("Key"), Some(Bytes::from("value")));
    }

    #[test]
    fn test_statistics_concurrent() {
        for count in [5usize, 10, 50] {
            let engine = Arc::new(StorageEngine::new());
            for i in 0..count {
                engine.set(&format!("key{}", i), Bytes::from(vec![0u8]));
            }

            let mut handles = vec![];
            for i in 0..count {
                let current = i as u8;
                for op in 0..3 {
                    let engine = Arc::clone(&engine);
                    handles.push(thread::spawn(move || {
                        let key = format!("key{}", current);
                        if op == 1 {
                            engine.set(&key, Bytes::from(vec![current]));
                        } else {
                            engine.get(&key);
                        }
                    }));
                }
            }

            for handle in handles {
                handle.join().unwrap();
            }

            let stats = engine.statistics();
            assert_eq!(stats.sets, (count * 2) as u64);
            assert_eq!(stats.gets, (count * 2) as u64);
            for i in 0..count {
                let value = engine.get(&format!("key{}", i)).unwrap();
                assert_eq!(value[0], i as u8);
            }
        }
    }

    #[test]
    fn test_counters_skip_misses_concurrent() {
        let engine = Arc::new(StorageEngine::new());
        let mut handles = vec![];

        for t in 0..8 {
            let engine = Arc::clone(&engine);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    let key = format!("key-{}-{}", t, j);
                    engine.set(&key, Bytes::from("value"));
                    engine.get(&key);
                    engine.get(&format!("missing-{}-{}", t, j));
                    engine.set("", Bytes::from("ignored"));
                    if j % 2 == 0 {
                        engine.delete(&key);
                        engine.delete(&key);
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let stats = engine.statistics();
        assert_eq!(stats.sets, 800);
        assert_eq!(stats.gets, 800);
        assert_eq!(stats.deletes, 400);
        assert_eq!(engine.len(), 400);
    }

    #[test]
    fn test_last_write_wins() {
        let engine = Arc::new(StorageEngine::new());
        let v1 = Bytes::from("a".repeat(4096));
        let v2 = Bytes::from("b".repeat(4096));

        for _ in 0..50 {
            let writers: Vec<_> = [v1.clone(), v2.clone()]
                .into_iter()
                .map(|value| {
                    let engine = Arc::clone(&engine);
                    thread::spawn(move || engine.set("k", value))
                })
                .collect();

            for writer in writers {
                writer.join().unwrap();
            }

            let value = engine.get("k").unwrap();
            assert!(value == v1 || value == v2);
        }
    }
}
