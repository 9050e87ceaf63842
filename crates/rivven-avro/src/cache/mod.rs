//! Lazily filled, never evicted caches keyed by schema identity
//!
//! [`MemoCache`] is the single get-or-compute primitive both caches are built
//! on. Each key owns a `tokio::sync::OnceCell`:
//!
//! - concurrent misses for one key await the same initialisation, so the
//!   loader runs at most once at a time per key (single-flight)
//! - a failed or cancelled load leaves nothing behind, not even an empty
//!   slot, and the next caller runs the loader again
//! - a stored value is never replaced

mod codec;
mod schema;

pub use codec::CodecCache;
pub use schema::SchemaCache;

use dashmap::DashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Counters describing cache traffic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from an initialised entry
    pub hits: u64,
    /// Lookups that found no initialised entry
    pub misses: u64,
    /// Loader invocations that stored a value
    pub loads: u64,
    /// Loader invocations that failed
    pub failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    failures: AtomicU64,
}

/// Concurrent get-or-compute map
pub struct MemoCache<K, V> {
    entries: DashMap<K, Arc<OnceCell<V>>>,
    counters: Counters,
}

impl<K, V> Default for MemoCache<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
            counters: Counters::default(),
        }
    }
}

impl<K, V> MemoCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached value for `key`, without loading
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries
            .get(key)
            .and_then(|cell| cell.get().cloned())
    }

    /// Whether a value is stored for `key`
    pub fn contains(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Number of stored values
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            loads: self.counters.loads.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    /// Value for `key`, running `load` if none is stored
    ///
    /// Callers arriving while a load for the same key is in flight wait for
    /// it instead of starting their own. If it fails, one of the waiters
    /// retries with its own loader.
    pub async fn get_or_try_load<F, Fut, E>(&self, key: &K, load: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        // clone the cell out so no map shard lock is held across the await
        let cell = match self.entries.get(key) {
            Some(cell) => cell.value().clone(),
            None => self.entries.entry(key.clone()).or_default().value().clone(),
        };
        // runs on every exit, including when this future is dropped mid-load
        let slot = SlotGuard {
            entries: &self.entries,
            key,
            cell,
        };

        if let Some(value) = slot.cell.get() {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value.clone());
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        let loaded = slot
            .cell
            .get_or_try_init(|| async {
                let loaded = load().await;
                match &loaded {
                    Ok(_) => self.counters.loads.fetch_add(1, Ordering::Relaxed),
                    Err(_) => self.counters.failures.fetch_add(1, Ordering::Relaxed),
                };
                loaded
            })
            .await
            .cloned();
        loaded
    }

    /// Number of slots in the map, including empty ones
    #[cfg(test)]
    fn slots(&self) -> usize {
        self.entries.len()
    }
}

/// Removes a slot that is still empty once its last user lets go of it
///
/// A caller still waiting on the cell holds its own reference and cleans up
/// when it finishes.
struct SlotGuard<'a, K: Eq + Hash, V> {
    entries: &'a DashMap<K, Arc<OnceCell<V>>>,
    key: &'a K,
    cell: Arc<OnceCell<V>>,
}

impl<K: Eq + Hash, V> Drop for SlotGuard<'_, K, V> {
    fn drop(&mut self) {
        if self.cell.initialized() {
            return;
        }

        // release our reference first so the last leaving user sees a count of 1
        let cell = std::mem::take(&mut self.cell);
        let ptr = Arc::as_ptr(&cell);
        drop(cell);

        self.entries.remove_if(self.key, |_, current| {
            std::ptr::eq(Arc::as_ptr(current), ptr)
                && !current.initialized()
                && Arc::strong_count(current) == 1
        });
    }
}
