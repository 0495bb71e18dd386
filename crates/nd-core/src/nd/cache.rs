//! Session result cache.
//!
//! Memoizes values computed under a lock, keyed by any hashable value. The
//! cache is emptied whenever a read or write lock is released, so an entry
//! never outlives the lock it was computed under.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// A type-erased cache key.
///
/// Implemented for every `Hash + Eq` type. Keys of different types never
/// compare equal, even if their values would.
pub trait CacheKey: Send + Sync + 'static {
    /// Upcasts for downcasting in [`dyn_eq`](Self::dyn_eq).
    fn as_any(&self) -> &dyn Any;

    /// Compares against a key of any type.
    fn dyn_eq(&self, other: &dyn CacheKey) -> bool;

    /// Hashes the key together with its type.
    fn dyn_hash(&self, state: &mut dyn Hasher);
}

impl<K: Hash + Eq + Send + Sync + 'static> CacheKey for K {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn CacheKey) -> bool {
        other
            .as_any()
            .downcast_ref::<K>()
            .is_some_and(|other| other == self)
    }

    fn dyn_hash(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<K>().hash(&mut state);
        self.hash(&mut state);
    }
}

impl PartialEq for dyn CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.dyn_eq(other)
    }
}

impl Eq for dyn CacheKey {}

impl Hash for dyn CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.dyn_hash(state);
    }
}

/// Cache hit/miss counters.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    removals: AtomicU64,
    clears: AtomicU64,
}

impl CacheStats {
    #[inline]
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_removal(&self) {
        self.removals.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_clear(&self) {
        self.clears.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns lookups that found a value.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Returns lookups that found nothing usable.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Returns insertions.
    pub fn inserts(&self) -> u64 {
        self.inserts.load(Ordering::Relaxed)
    }

    /// Returns explicit removals.
    pub fn removals(&self) -> u64 {
        self.removals.load(Ordering::Relaxed)
    }

    /// Returns how many times the cache was emptied.
    pub fn clears(&self) -> u64 {
        self.clears.load(Ordering::Relaxed)
    }

    /// Returns the hit ratio (0.0 to 1.0).
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.hits() + self.misses();
        if lookups == 0 {
            0.0
        } else {
            self.hits() as f64 / lookups as f64
        }
    }
}

type CachedValue = Arc<dyn Any + Send + Sync>;

/// The session's memoization table.
#[derive(Default)]
pub(crate) struct ResultCache {
    entries: Mutex<HashMap<Box<dyn CacheKey>, CachedValue>>,
    stats: CacheStats,
}

impl ResultCache {
    pub(crate) fn get<K: CacheKey, V: Any + Send + Sync>(&self, key: &K) -> Option<Arc<V>> {
        let found = self.entries.lock().get(key as &dyn CacheKey).cloned();
        match found.map(|value| value.downcast::<V>()) {
            Some(Ok(value)) => {
                self.stats.record_hit();
                Some(value)
            }
            _ => {
                self.stats.record_miss();
                None
            }
        }
    }

    pub(crate) fn put<K: CacheKey, V: Any + Send + Sync>(&self, key: K, value: V) -> Arc<V> {
        let value = Arc::new(value);
        self.entries
            .lock()
            .insert(Box::new(key), Arc::clone(&value) as CachedValue);
        self.stats.record_insert();
        value
    }

    pub(crate) fn remove<K: CacheKey>(&self, key: &K) -> bool {
        let removed = self.entries.lock().remove(key as &dyn CacheKey).is_some();
        if removed {
            self.stats.record_removal();
        }
        removed
    }

    pub(crate) fn clear(&self) {
        self.entries.lock().clear();
        self.stats.record_clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub(crate) fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

impl fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCache")
            .field("entries", &self.len())
            .field("stats", &self.stats)
            .finish()
    }
}
