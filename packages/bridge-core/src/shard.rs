//! Sharded lock table
//!
//! Serializes mutations per key without a global lock: keys hash onto a fixed
//! number of independently locked shards, so two operations on the same key
//! always contend while unrelated keys mostly do not.

use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Default shard count for ledger-sized tables
pub const DEFAULT_SHARDS: usize = 64;

pub struct ShardedMap<K, V> {
    shards: Box<[Mutex<HashMap<K, V>>]>,
    hasher: RandomState,
}

impl<K: Eq + Hash, V> ShardedMap<K, V> {
    /// Create a table with `shard_count` shards (at least one).
    pub fn new(shard_count: usize) -> Self {
        let shards = (0..shard_count.max(1))
            .map(|_| Mutex::new(HashMap::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            shards,
            hasher: RandomState::new(),
        }
    }

    /// Lock the shard owning `key`.
    ///
    /// Critical sections never leave a shard half-updated before a fallible
    /// step, so a poisoned lock still guards consistent data.
    pub fn lock(&self, key: &K) -> MutexGuard<'_, HashMap<K, V>> {
        let index = (self.hasher.hash_one(key) as usize) % self.shards.len();
        self.shards[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Visit every entry, one shard at a time.
    ///
    /// Not a consistent snapshot across shards; used for read-only reporting.
    pub fn for_each(&self, mut f: impl FnMut(&K, &V)) {
        for shard in self.shards.iter() {
            let guard = shard.lock().unwrap_or_else(PoisonError::into_inner);
            for (k, v) in guard.iter() {
                f(k, v);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash, V> Default for ShardedMap<K, V> {
    fn default() -> Self {
        Self::new(DEFAULT_SHARDS)
    }
}
