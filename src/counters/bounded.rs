// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Size-bounded keyed aggregation shared by the counters.
//!
//! A [`BoundedMap`] accumulates values per key inside a single short critical
//! section and hands its whole content over with [`BoundedMap::drain`], which
//! swaps the map for an empty one under the same lock. A concurrent update
//! therefore lands either in the drained batch or in the next one.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// What happens when a new key arrives at a full map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EvictionPolicy {
    /// Drop the new key; existing keys keep accumulating.
    #[default]
    RejectNew,
    /// Discard the earliest inserted key of the current window.
    EvictOldest,
}

struct Inner<K, V> {
    entries: HashMap<K, V>,
    /// Insertion order, tracked only for `EvictOldest`.
    order: VecDeque<K>,
    /// Keys rejected or evicted since the last drain.
    dropped: u64,
}

/// Mutex-guarded map with a key limit and atomic drain.
pub struct BoundedMap<K, V> {
    inner: Mutex<Inner<K, V>>,
    max_keys: usize,
    policy: EvictionPolicy,
    name: &'static str,
}

impl<K, V> BoundedMap<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create a map holding at most `max_keys` keys between drains.
    pub fn new(name: &'static str, max_keys: usize, policy: EvictionPolicy) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                dropped: 0,
            }),
            max_keys: max_keys.max(1),
            policy,
            name,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` to the value for `key`, creating it with `init` if absent.
    ///
    /// Returns `false` when the key was rejected because the map is full.
    pub fn update<I, F>(&self, key: K, init: I, f: F) -> bool
    where
        I: FnOnce() -> V,
        F: FnOnce(&mut V),
    {
        let mut guard = self.lock();
        let inner = &mut *guard;

        if let Some(value) = inner.entries.get_mut(&key) {
            f(value);
            return true;
        }

        if inner.entries.len() >= self.max_keys {
            match self.policy {
                EvictionPolicy::RejectNew => {
                    inner.dropped += 1;
                    return false;
                }
                EvictionPolicy::EvictOldest => {
                    while inner.entries.len() >= self.max_keys {
                        let Some(oldest) = inner.order.pop_front() else {
                            break;
                        };
                        if inner.entries.remove(&oldest).is_some() {
                            inner.dropped += 1;
                        }
                    }
                }
            }
        }

        let mut value = init();
        f(&mut value);
        if self.policy == EvictionPolicy::EvictOldest {
            inner.order.push_back(key.clone());
        }
        inner.entries.insert(key, value);
        true
    }

    /// Take every entry, leaving the map empty.
    pub fn drain(&self) -> Vec<(K, V)> {
        let (entries, dropped) = {
            let mut inner = self.lock();
            inner.order.clear();
            (
                std::mem::take(&mut inner.entries),
                std::mem::take(&mut inner.dropped),
            )
        };

        if dropped > 0 {
            debug!(
                counter = self.name,
                dropped,
                limit = self.max_keys,
                "Counter key limit reached since last drain"
            );
        }

        entries.into_iter().collect()
    }

    /// Read a single value.
    pub fn get_cloned(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.lock().entries.get(key).cloned()
    }

    /// Number of keys currently held.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys rejected or evicted since the last drain.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    pub fn max_keys(&self) -> usize {
        self.max_keys
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }
}
