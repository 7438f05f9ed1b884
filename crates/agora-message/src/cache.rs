//! Bounded read-through cache with adaptive replacement (ARC) and per-entry
//! expiry.
//!
//! Resident entries live in two LRU lists: `recent` (seen once) and
//! `frequent` (seen at least twice). Two ghost lists remember the keys most
//! recently evicted from each, and hits on a ghost shift `target`, the
//! preferred size of `recent`. A single pass over many cold keys therefore
//! only churns `recent` and leaves the frequently read entries alone.
//!
//! Every list keeps a key index next to its order, so each operation costs
//! O(log capacity) regardless of where the key sits in its list.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::trace;

/// Load strategy invoked on a miss. Returns the value and how long it stays fresh.
pub type Loader<K, V, E> = Box<dyn Fn(&K) -> Result<(V, Duration), E> + Send + Sync>;

pub struct Cache<K, V, E> {
    state: Mutex<ArcState<K, V>>,
    loader: Loader<K, V, E>,
}

impl<K, V, E> Cache<K, V, E>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// `capacity` is clamped to at least one entry.
    pub fn new<F>(capacity: usize, loader: F) -> Self
    where
        F: Fn(&K) -> Result<(V, Duration), E> + Send + Sync + 'static,
    {
        Self {
            state: Mutex::new(ArcState::new(capacity.max(1))),
            loader: Box::new(loader),
        }
    }

    /// Return the live entry for `key`, loading it on a miss or after expiry.
    ///
    /// Loader errors are returned as-is and nothing is inserted. The lock is
    /// not held while loading, so concurrent misses on one key may each load.
    pub fn get(&self, key: &K) -> Result<V, E> {
        if let Some(value) = self.state.lock().get(key, Instant::now()) {
            return Ok(value);
        }

        let (value, ttl) = (self.loader)(key)?;
        self.state
            .lock()
            .insert(key.clone(), value.clone(), Instant::now() + ttl);
        Ok(value)
    }

    /// Live entry for `key` without loading.
    pub fn get_if_present(&self, key: &K) -> Option<V> {
        self.state.lock().get(key, Instant::now())
    }

    pub fn set_with_expire(&self, key: K, value: V, ttl: Duration) {
        self.state.lock().insert(key, value, Instant::now() + ttl);
    }

    /// Drop the entry for `key`. Returns whether one was resident.
    pub fn remove(&self, key: &K) -> bool {
        self.state.lock().remove(key)
    }

    /// Resident entries, including ones that have expired but were not read since.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &K) -> bool {
        self.state.lock().entries.contains_key(key)
    }
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

struct ArcState<K, V> {
    capacity: usize,
    /// Preferred length of `recent`.
    target: usize,
    recent: LruList<K>,
    frequent: LruList<K>,
    recent_ghosts: LruList<K>,
    frequent_ghosts: LruList<K>,
    entries: HashMap<K, Entry<V>>,
}

impl<K, V> ArcState<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            target: 0,
            recent: LruList::default(),
            frequent: LruList::default(),
            recent_ghosts: LruList::default(),
            frequent_ghosts: LruList::default(),
            entries: HashMap::with_capacity(capacity),
        }
    }

    fn get(&mut self, key: &K, now: Instant) -> Option<V> {
        let expired = self.entries.get(key)?.expires_at <= now;
        if expired {
            trace!("cache entry expired");
            self.remove(key);
            return None;
        }

        if !self.recent.take(key) {
            self.frequent.take(key);
        }
        self.frequent.push_back(key.clone());
        self.entries.get(key).map(|e| e.value.clone())
    }

    fn insert(&mut self, key: K, value: V, expires_at: Instant) {
        let entry = Entry { value, expires_at };

        if self.entries.contains_key(&key) {
            if !self.recent.take(&key) {
                self.frequent.take(&key);
            }
            self.frequent.push_back(key.clone());
        } else if self.recent_ghosts.contains(&key) {
            let delta = (self.frequent_ghosts.len() / self.recent_ghosts.len()).max(1);
            self.target = (self.target + delta).min(self.capacity);
            self.recent_ghosts.take(&key);
            self.replace(false);
            self.frequent.push_back(key.clone());
        } else if self.frequent_ghosts.contains(&key) {
            let delta = (self.recent_ghosts.len() / self.frequent_ghosts.len()).max(1);
            self.target = self.target.saturating_sub(delta);
            self.frequent_ghosts.take(&key);
            self.replace(true);
            self.frequent.push_back(key.clone());
        } else {
            let l1 = self.recent.len() + self.recent_ghosts.len();
            let total = l1 + self.frequent.len() + self.frequent_ghosts.len();
            if l1 >= self.capacity {
                if self.recent.len() < self.capacity {
                    self.recent_ghosts.pop_front();
                    self.replace(false);
                } else if let Some(victim) = self.recent.pop_front() {
                    trace!("cache evicted a once-seen entry");
                    self.entries.remove(&victim);
                }
            } else if total >= self.capacity {
                if total >= 2 * self.capacity {
                    self.frequent_ghosts.pop_front();
                }
                self.replace(false);
            }
            self.recent.push_back(key.clone());
        }

        self.entries.insert(key, entry);
    }

    /// Make room for one entry by demoting an LRU entry to its ghost list.
    fn replace(&mut self, hit_frequent_ghost: bool) {
        if self.entries.len() < self.capacity {
            return;
        }

        let from_recent = self.frequent.is_empty()
            || (!self.recent.is_empty()
                && (self.recent.len() > self.target
                    || (hit_frequent_ghost && self.recent.len() == self.target)));

        if from_recent {
            if let Some(victim) = self.recent.pop_front() {
                self.entries.remove(&victim);
                self.recent_ghosts.push_back(victim);
            }
        } else if let Some(victim) = self.frequent.pop_front() {
            self.entries.remove(&victim);
            self.frequent_ghosts.push_back(victim);
        }
    }

    fn remove(&mut self, key: &K) -> bool {
        if self.entries.remove(key).is_none() {
            return false;
        }
        if !self.recent.take(key) {
            self.frequent.take(key);
        }
        true
    }
}

/// Keys in least-recently-used order. Each key carries the tick it was pushed
/// at; the front of the list is the smallest tick.
struct LruList<K> {
    order: BTreeMap<u64, K>,
    ticks: HashMap<K, u64>,
    next_tick: u64,
}

impl<K> Default for LruList<K> {
    fn default() -> Self {
        Self {
            order: BTreeMap::new(),
            ticks: HashMap::new(),
            next_tick: 0,
        }
    }
}

impl<K: Eq + Hash + Clone> LruList<K> {
    fn len(&self) -> usize {
        self.ticks.len()
    }

    fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    fn contains(&self, key: &K) -> bool {
        self.ticks.contains_key(key)
    }

    /// Append `key` as the most recently used. Callers take it out first.
    fn push_back(&mut self, key: K) {
        let tick = self.next_tick;
        self.next_tick += 1;
        if let Some(old) = self.ticks.insert(key.clone(), tick) {
            self.order.remove(&old);
        }
        self.order.insert(tick, key);
    }

    fn pop_front(&mut self) -> Option<K> {
        let (_, key) = self.order.pop_first()?;
        self.ticks.remove(&key);
        Some(key)
    }

    /// Remove `key`, reporting whether it was there.
    fn take(&mut self, key: &K) -> bool {
        match self.ticks.remove(key) {
            Some(tick) => {
                self.order.remove(&tick);
                true
            }
            None => false,
        }
    }
}
