//! Bounded, sharded cache of resolved option lists
//!
//! Entries are keyed by the expression text plus the values of the fields
//! that expression references, so edits to unrelated fields never miss.
//! Each shard has its own lock; concurrent resolutions of the same key may
//! both insert, and the last write wins.

use ahash::{AHashMap, RandomState};
use formcalc_core::{FormData, OptionItem, Value};
use formcalc_formula::Expr;
use std::collections::VecDeque;
use std::hash::BuildHasher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Cache sizing and expiry
#[derive(Debug, Clone)]
pub struct OptionsCacheConfig {
    /// Maximum number of entries across all shards
    pub capacity: usize,
    /// Number of independently locked shards
    pub shards: usize,
    /// Entries older than this are treated as missing
    pub ttl: Duration,
}

impl Default for OptionsCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            shards: 16,
            ttl: Duration::from_secs(15 * 60),
        }
    }
}

/// Expression text plus the referenced subset of form data
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    expression: String,
    inputs: Vec<(String, Option<Value>)>,
}

impl CacheKey {
    /// Build the key for `expr` (parsed from `text`) against `data`
    pub fn new(text: &str, expr: &Expr, data: &FormData) -> Self {
        Self {
            expression: text.to_string(),
            inputs: expr
                .variables()
                .into_iter()
                .map(|name| (name.to_string(), data.get(name).cloned()))
                .collect(),
        }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Referenced field names with the values they had
    pub fn inputs(&self) -> &[(String, Option<Value>)] {
        &self.inputs
    }
}

/// Counters for cache effectiveness
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
    /// Entries currently stored, expired ones included
    pub len: usize,
}

struct Entry {
    options: Vec<OptionItem>,
    inserted: Instant,
}

#[derive(Default)]
struct Shard {
    entries: AHashMap<CacheKey, Entry>,
    /// Insertion order for eviction
    order: VecDeque<CacheKey>,
}

/// Concurrent cache of option lists
pub struct OptionsCache {
    shards: Vec<RwLock<Shard>>,
    shard_capacity: usize,
    ttl: Duration,
    hasher: RandomState,
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
}

impl OptionsCache {
    pub fn new(config: &OptionsCacheConfig) -> Self {
        let shards = config.shards.max(1);
        Self {
            shards: (0..shards).map(|_| RwLock::new(Shard::default())).collect(),
            shard_capacity: config.capacity.div_ceil(shards).max(1),
            ttl: config.ttl,
            hasher: RandomState::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            inserts: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn shard(&self, key: &CacheKey) -> &RwLock<Shard> {
        let index = (BuildHasher::hash_one(&self.hasher, key) % self.shards.len() as u64) as usize;
        &self.shards[index]
    }

    /// Look up a live entry
    pub fn get(&self, key: &CacheKey) -> Option<Vec<OptionItem>> {
        let found = {
            let shard = match self.shard(key).read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            shard
                .entries
                .get(key)
                .filter(|entry| entry.inserted.elapsed() < self.ttl)
                .map(|entry| entry.options.clone())
        };

        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Store an entry, replacing any previous value for the key and
    /// evicting the oldest entries of the shard when full
    pub fn insert(&self, key: CacheKey, options: Vec<OptionItem>) {
        let mut shard = match self.shard(&key).write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let entry = Entry {
            options,
            inserted: Instant::now(),
        };
        if let Some(existing) = shard.entries.get_mut(&key) {
            *existing = entry;
        } else {
            while shard.entries.len() >= self.shard_capacity {
                let Some(oldest) = shard.order.pop_front() else {
                    break;
                };
                if shard.entries.remove(&oldest).is_some() {
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
            }
            shard.order.push_back(key.clone());
            shard.entries.insert(key, entry);
        }
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop every entry; counters are kept
    pub fn clear(&self) {
        for lock in &self.shards {
            let mut shard = match lock.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            shard.entries.clear();
            shard.order.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|lock| match lock.read() {
                Ok(shard) => shard.entries.len(),
                Err(poisoned) => poisoned.into_inner().entries.len(),
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            len: self.len(),
        }
    }
}

impl Default for OptionsCache {
    fn default() -> Self {
        Self::new(&OptionsCacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formcalc_formula::parse_expression;
    use pretty_assertions::assert_eq;

    fn key(text: &str, data: &FormData) -> CacheKey {
        CacheKey::new(text, &parse_expression(text).unwrap(), data)
    }

    fn items(values: &[&str]) -> Vec<OptionItem> {
        values.iter().map(|v| OptionItem::new(*v, *v)).collect()
    }

    #[test]
    fn test_key_covers_only_referenced_fields() {
        let mut data = FormData::new();
        data.insert("country".into(), Value::string("US"));
        data.insert("name".into(), Value::string("Ann"));

        let text = "IF(country == 'US', 1, 2)";
        let before = key(text, &data);

        data.insert("name".into(), Value::string("Bob"));
        assert_eq!(key(text, &data), before);

        data.insert("country".into(), Value::string("CA"));
        assert_ne!(key(text, &data), before);
    }

    #[test]
    fn test_absent_and_null_inputs_differ() {
        let mut data = FormData::new();
        let absent = key("IS_NULL(x)", &data);
        data.insert("x".into(), Value::Null);
        assert_ne!(key("IS_NULL(x)", &data), absent);
    }

    #[test]
    fn test_get_and_insert() {
        let cache = OptionsCache::default();
        let k = key("STATIC('[\"a\"]')", &FormData::new());

        assert_eq!(cache.get(&k), None);
        cache.insert(k.clone(), items(&["a"]));
        assert_eq!(cache.get(&k), Some(items(&["a"])));

        // Last write wins
        cache.insert(k.clone(), items(&["b"]));
        assert_eq!(cache.get(&k), Some(items(&["b"])));

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.inserts, stats.len), (2, 1, 2, 1));
    }

    #[test]
    fn test_eviction_is_oldest_first() {
        let cache = OptionsCache::new(&OptionsCacheConfig {
            capacity: 2,
            shards: 1,
            ..Default::default()
        });
        let data = FormData::new();
        let (k1, k2, k3) = (key("1", &data), key("2", &data), key("3", &data));

        cache.insert(k1.clone(), items(&["1"]));
        cache.insert(k2.clone(), items(&["2"]));
        cache.insert(k3.clone(), items(&["3"]));

        assert_eq!(cache.get(&k1), None);
        assert!(cache.get(&k2).is_some());
        assert!(cache.get(&k3).is_some());
        assert_eq!(cache.stats().evictions, 1);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_expired_entries_miss() {
        let cache = OptionsCache::new(&OptionsCacheConfig {
            ttl: Duration::ZERO,
            ..Default::default()
        });
        let k = key("1", &FormData::new());
        cache.insert(k.clone(), items(&["1"]));
        assert_eq!(cache.get(&k), None);
    }

    #[test]
    fn test_concurrent_readers_and_writers() {
        const THREADS: usize = 8;
        const KEYS: usize = 50;

        let cache = OptionsCache::new(&OptionsCacheConfig {
            capacity: 4096,
            shards: 16,
            ..Default::default()
        });
        let data = FormData::new();
        let shared = key("STATIC('[\"shared\"]')", &data);
        cache.insert(shared.clone(), items(&["initial"]));

        std::thread::scope(|scope| {
            for t in 0..THREADS {
                let (cache, data, shared) = (&cache, &data, &shared);
                scope.spawn(move || {
                    for i in 0..KEYS {
                        let k = key(&format!("STATIC('[\"{}-{}\"]')", t, i), data);
                        let value = format!("{}-{}", t, i);
                        cache.insert(k.clone(), items(&[value.as_str()]));
                        assert_eq!(cache.get(&k), Some(items(&[value.as_str()])));
                    }
                    assert!(cache.get(shared).is_some());
                    cache.insert(shared.clone(), items(&[t.to_string().as_str()]));
                });
            }
        });

        // One of the writers won; the entry is whole either way
        let winner = cache.get(&shared).unwrap();
        assert_eq!(winner.len(), 1);
        assert!(winner[0].value.parse::<usize>().unwrap() < THREADS);

        let stats = cache.stats();
        assert_eq!(stats.len, THREADS * KEYS + 1);
        assert_eq!(stats.inserts, (THREADS * KEYS + THREADS + 1) as u64);
        assert_eq!(stats.hits, (THREADS * KEYS + THREADS + 1) as u64);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.evictions, 0);
    }

    #[test]
    fn test_clear() {
        let cache = OptionsCache::default();
        cache.insert(key("1", &FormData::new()), items(&["1"]));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().inserts, 1);
    }
}
