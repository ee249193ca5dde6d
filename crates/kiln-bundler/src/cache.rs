//! In-memory cache with pluggable eviction.
//!
//! [`Cache`] stores cloned values behind a mutex and delegates the choice of
//! what to drop to an [`EvictionPolicy`]. Policies see keys only; values are
//! described to them by a weight computed once on insert.
//!
//! ```
//! use kiln_bundler::cache::{Cache, Lru};
//!
//! let cache: Cache<&str, u32, Lru<&str>> = Cache::new(2, Lru::default());
//! cache.insert("a", 1);
//! cache.insert("b", 2);
//! cache.get(&"a");
//! cache.insert("c", 3);
//! assert!(cache.get(&"b").is_none());
//! ```

use std::hash::Hash;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::Serialize;

/// Decides which entry leaves the cache when it is full.
pub trait EvictionPolicy<K>: Send {
    fn name(&self) -> &'static str;

    fn on_insert(&mut self, key: &K, weight: u64);

    fn on_access(&mut self, key: &K);

    fn on_remove(&mut self, key: &K);

    /// The next entry to evict.
    fn victim(&self) -> Option<K>;

    /// Entries reported expired are treated as misses and dropped.
    fn is_expired(&self, _key: &K) -> bool {
        false
    }

    fn clear(&mut self);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

type Weigher<V> = Box<dyn Fn(&V) -> u64 + Send + Sync>;

struct Inner<K, V, P> {
    entries: FxHashMap<K, V>,
    policy: P,
    stats: CacheStats,
}

pub struct Cache<K, V, P> {
    inner: Mutex<Inner<K, V, P>>,
    capacity: usize,
    weigher: Option<Weigher<V>>,
}

impl<K, V, P> Cache<K, V, P>
where
    K: Eq + Hash + Clone,
    V: Clone,
    P: EvictionPolicy<K>,
{
    /// A cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize, policy: P) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: FxHashMap::default(),
                policy,
                stats: CacheStats::default(),
            }),
            capacity: capacity.max(1),
            weigher: None,
        }
    }

    /// Weigh values for size-aware policies. Unweighted entries count as 1.
    pub fn with_weigher(mut self, weigher: impl Fn(&V) -> u64 + Send + Sync + 'static) -> Self {
        self.weigher = Some(Box::new(weigher));
        self
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        if inner.entries.contains_key(key) && inner.policy.is_expired(key) {
            inner.entries.remove(key);
            inner.policy.on_remove(key);
            inner.stats.evictions += 1;
        }

        match inner.entries.get(key).cloned() {
            Some(value) => {
                inner.policy.on_access(key);
                inner.stats.hits += 1;
                Some(value)
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    pub fn insert(&self, key: K, value: V) {
        let weight = self.weigher.as_ref().map_or(1, |w| w(&value));
        let mut inner = self.inner.lock();

        if inner.entries.remove(&key).is_some() {
            inner.policy.on_remove(&key);
        }

        while inner.entries.len() >= self.capacity {
            let Some(victim) = inner.policy.victim() else {
                break;
            };
            inner.entries.remove(&victim);
            inner.policy.on_remove(&victim);
            inner.stats.evictions += 1;
        }

        inner.policy.on_insert(&key, weight);
        inner.entries.insert(key, value);
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        let removed = inner.entries.remove(key);
        if removed.is_some() {
            inner.policy.on_remove(key);
        }
        removed
    }

    pub fn contains(&self, key: &K) -> bool {
        let inner = self.inner.lock();
        inner.entries.contains_key(key) && !inner.policy.is_expired(key)
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.policy.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.entries.len(),
            ..inner.stats
        }
    }

    pub fn policy_name(&self) -> &'static str {
        self.inner.lock().policy.name()
    }
}

impl<K, V, P> std::fmt::Debug for Cache<K, V, P>
where
    K: Eq + Hash + Clone,
    V: Clone,
    P: EvictionPolicy<K>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("policy", &self.policy_name())
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Least recently used.
#[derive(Debug)]
pub struct Lru<K> {
    clock: u64,
    last_used: FxHashMap<K, u64>,
}

impl<K> Default for Lru<K> {
    fn default() -> Self {
        Self {
            clock: 0,
            last_used: FxHashMap::default(),
        }
    }
}

impl<K: Eq + Hash + Clone + Send> EvictionPolicy<K> for Lru<K> {
    fn name(&self) -> &'static str {
        "lru"
    }

    fn on_insert(&mut self, key: &K, _weight: u64) {
        self.clock += 1;
        self.last_used.insert(key.clone(), self.clock);
    }

    fn on_access(&mut self, key: &K) {
        self.clock += 1;
        if let Some(tick) = self.last_used.get_mut(key) {
            *tick = self.clock;
        }
    }

    fn on_remove(&mut self, key: &K) {
        self.last_used.remove(key);
    }

    fn victim(&self) -> Option<K> {
        self.last_used
            .iter()
            .min_by_key(|(_, tick)| **tick)
            .map(|(key, _)| key.clone())
    }

    fn clear(&mut self) {
        self.last_used.clear();
    }
}

/// Least frequently used; ties go to the least recently touched entry.
#[derive(Debug)]
pub struct Lfu<K> {
    clock: u64,
    usage: FxHashMap<K, (u64, u64)>,
}

impl<K> Default for Lfu<K> {
    fn default() -> Self {
        Self {
            clock: 0,
            usage: FxHashMap::default(),
        }
    }
}

impl<K: Eq + Hash + Clone + Send> EvictionPolicy<K> for Lfu<K> {
    fn name(&self) -> &'static str {
        "lfu"
    }

    fn on_insert(&mut self, key: &K, _weight: u64) {
        self.clock += 1;
        self.usage.insert(key.clone(), (1, self.clock));
    }

    fn on_access(&mut self, key: &K) {
        self.clock += 1;
        if let Some((count, tick)) = self.usage.get_mut(key) {
            *count += 1;
            *tick = self.clock;
        }
    }

    fn on_remove(&mut self, key: &K) {
        self.usage.remove(key);
    }

    fn victim(&self) -> Option<K> {
        self.usage
            .iter()
            .min_by_key(|(_, usage)| **usage)
            .map(|(key, _)| key.clone())
    }

    fn clear(&mut self) {
        self.usage.clear();
    }
}

/// Evicts the heaviest entry first.
#[derive(Debug)]
pub struct SizeBased<K> {
    weights: FxHashMap<K, u64>,
}

impl<K> Default for SizeBased<K> {
    fn default() -> Self {
        Self {
            weights: FxHashMap::default(),
        }
    }
}

impl<K: Eq + Hash + Clone + Send> SizeBased<K> {
    pub fn total_weight(&self) -> u64 {
        self.weights.values().sum()
    }
}

impl<K: Eq + Hash + Clone + Send> EvictionPolicy<K> for SizeBased<K> {
    fn name(&self) -> &'static str {
        "size"
    }

    fn on_insert(&mut self, key: &K, weight: u64) {
        self.weights.insert(key.clone(), weight);
    }

    fn on_access(&mut self, _key: &K) {}

    fn on_remove(&mut self, key: &K) {
        self.weights.remove(key);
    }

    fn victim(&self) -> Option<K> {
        self.weights
            .iter()
            .max_by_key(|(_, weight)| **weight)
            .map(|(key, _)| key.clone())
    }

    fn clear(&mut self) {
        self.weights.clear();
    }
}

/// Entries expire a fixed time after insertion; when full the oldest goes.
#[derive(Debug)]
pub struct Ttl<K> {
    ttl: Duration,
    inserted: FxHashMap<K, Instant>,
}

impl<K> Ttl<K> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inserted: FxHashMap::default(),
        }
    }
}

impl<K: Eq + Hash + Clone + Send> EvictionPolicy<K> for Ttl<K> {
    fn name(&self) -> &'static str {
        "ttl"
    }

    fn on_insert(&mut self, key: &K, _weight: u64) {
        self.inserted.insert(key.clone(), Instant::now());
    }

    fn on_access(&mut self, _key: &K) {}

    fn on_remove(&mut self, key: &K) {
        self.inserted.remove(key);
    }

    fn victim(&self) -> Option<K> {
        self.inserted
            .iter()
            .min_by_key(|(_, at)| **at)
            .map(|(key, _)| key.clone())
    }

    fn is_expired(&self, key: &K) -> bool {
        self.inserted
            .get(key)
            .is_some_and(|at| at.elapsed() >= self.ttl)
    }

    fn clear(&mut self) {
        self.inserted.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lru_evicts_least_recent() {
        let cache = Cache::new(2, Lru::default());
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.get(&"a"), Some(1));
        cache.insert("c", 3);

        assert!(cache.contains(&"a"));
        assert!(!cache.contains(&"b"));
        assert!(cache.contains(&"c"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn lfu_evicts_least_used() {
        let cache = Cache::new(2, Lfu::default());
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.get(&"b");
        cache.get(&"b");
        cache.get(&"a");
        cache.insert("c", 3);

        assert!(!cache.contains(&"a"));
        assert!(cache.contains(&"b"));
    }

    #[test]
    fn size_based_evicts_heaviest() {
        let cache = Cache::new(2, SizeBased::default()).with_weigher(|v: &String| v.len() as u64);
        cache.insert(1, "x".repeat(100));
        cache.insert(2, "y".repeat(5));
        cache.insert(3, "z".repeat(10));

        assert!(!cache.contains(&1));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn ttl_expires_on_read() {
        let cache = Cache::new(4, Ttl::new(Duration::from_millis(0)));
        cache.insert("k", 1);
        assert_eq!(cache.get(&"k"), None);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn reinsert_replaces_without_eviction() {
        let cache = Cache::new(1, Lru::default());
        cache.insert("a", 1);
        cache.insert("a", 2);
        assert_eq!(cache.get(&"a"), Some(2));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn stats_track_hits_and_misses() {
        let cache = Cache::new(4, Lru::default());
        cache.insert("a", 1);
        cache.get(&"a");
        cache.get(&"missing");
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }
}
