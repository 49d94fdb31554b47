//! Bounded LRU result cache.
//!
//! Recency is tracked with a monotonically increasing tick per entry and a
//! tick-ordered index, so both lookup and eviction stay logarithmic.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use xw_protocol::ParsedCommand;

struct Entry<V> {
    value: V,
    tick: u64,
}

/// Strict least-recently-used map with a fixed capacity.
pub struct LruCache<K, V> {
    capacity: usize,
    entries: HashMap<K, Entry<V>>,
    recency: BTreeMap<u64, K>,
    next_tick: u64,
}

impl<K: Clone + Eq + Hash, V: Clone> LruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            recency: BTreeMap::new(),
            next_tick: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    /// Look up a key and mark it most-recently-used.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let tick = self.tick();
        let entry = self.entries.get_mut(key)?;
        self.recency.remove(&entry.tick);
        entry.tick = tick;
        self.recency.insert(tick, key.clone());
        Some(entry.value.clone())
    }

    /// Insert or replace, evicting the least-recently-used entry when full.
    pub fn put(&mut self, key: K, value: V) {
        let tick = self.tick();
        if let Some(old) = self.entries.insert(key.clone(), Entry { value, tick }) {
            self.recency.remove(&old.tick);
        } else if self.entries.len() > self.capacity
            && let Some((_, oldest)) = self.recency.pop_first()
        {
            self.entries.remove(&oldest);
        }
        self.recency.insert(tick, key);
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Keys from least to most recently used.
    pub fn keys(&self) -> Vec<K> {
        self.recency.values().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
    }
}

/// Snapshot of cache occupancy and effectiveness.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheInfo {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub capacity: usize,
    pub hit_rate: f64,
}

/// Normalized cache key: trimmed, internal whitespace collapsed, lowercased.
pub fn cache_key(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Thread-safe cache of remote parse results with hit/miss counters.
pub struct ResultCache {
    inner: Mutex<LruCache<String, ParsedCommand>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, ParsedCommand>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, key: &str) -> Option<ParsedCommand> {
        let found = self.lock().get(&key.to_string());
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    pub fn put(&self, key: &str, result: ParsedCommand) {
        self.lock().put(key.to_string(), result);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains(&key.to_string())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Drop every entry and reset the counters.
    pub fn clear(&self) {
        self.lock().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn info(&self) -> CacheInfo {
        let (size, capacity) = {
            let cache = self.lock();
            (cache.len(), cache.capacity())
        };
        let hits = self.hits();
        let misses = self.misses();
        let total = hits + misses;
        CacheInfo {
            hits,
            misses,
            size,
            capacity,
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xw_protocol::Intent;

    fn command(name: &str) -> ParsedCommand {
        ParsedCommand {
            raw: name.into(),
            normalized_command: name.into(),
            intent: Intent::Action,
            args: Default::default(),
            explanation: String::new(),
            confidence: 1.0,
        }
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut lru = LruCache::new(2);
        lru.put("a", 1);
        lru.put("b", 2);
        assert_eq!(lru.get(&"a"), Some(1));
        lru.put("c", 3);
        assert!(lru.contains(&"a"));
        assert!(!lru.contains(&"b"));
        assert!(lru.contains(&"c"));
        assert_eq!(lru.len(), 2);
    }

    #[test]
    fn replacing_does_not_evict() {
        let mut lru = LruCache::new(2);
        lru.put("a", 1);
        lru.put("b", 2);
        lru.put("a", 10);
        assert_eq!(lru.len(), 2);
        assert_eq!(lru.get(&"a"), Some(10));
        assert_eq!(lru.get(&"b"), Some(2));
    }

    #[test]
    fn bound_holds_most_recent_keys() {
        let capacity = 5;
        let mut lru = LruCache::new(capacity);
        for i in 0..(capacity + 7) {
            lru.put(i, i);
        }
        assert_eq!(lru.len(), capacity);
        assert_eq!(lru.keys(), (7..12).collect::<Vec<_>>());
    }

    #[test]
    fn counters_track_hits_and_misses() {
        let cache = ResultCache::new(4);
        assert!(cache.get("修炼").is_none());
        cache.put("修炼", command("修炼"));
        assert_eq!(cache.get("修炼").unwrap().normalized_command, "修炼");
        assert_eq!(cache.get("修炼").unwrap().normalized_command, "修炼");

        let info = cache.info();
        assert_eq!(info.hits, 2);
        assert_eq!(info.misses, 1);
        assert_eq!(info.size, 1);
        assert_eq!(info.capacity, 4);
        assert!((info.hit_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn clear_resets_everything() {
        let cache = ResultCache::new(4);
        cache.put("a", command("a"));
        cache.get("a");
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.info().hits, 0);
        assert_eq!(cache.info().hit_rate, 0.0);
    }

    #[test]
    fn key_normalization() {
        assert_eq!(cache_key("  Go   To\t丹药铺 "), "go to 丹药铺");
        assert_eq!(cache_key("修炼"), cache_key(" 修炼 "));
    }
}
