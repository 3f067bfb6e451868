//! Kernel row cache
//!
//! LRU cache over full kernel rows keyed by sample index. The SMO gradient
//! update consumes whole rows K(i, .) at a time, so caching at row
//! granularity amortizes far better than caching single entries. Rows are
//! evicted least-recently-used once the byte budget is exhausted.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// LRU cache of kernel rows
pub struct RowCache {
    cache: LruCache<usize, Arc<Vec<f64>>>,
    hits: u64,
    misses: u64,
}

impl RowCache {
    /// Create a cache holding at most `capacity` rows
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// Create a cache sized from a byte budget for rows of `row_len` values
    ///
    /// Always admits at least two rows so the working pair of an SMO
    /// iteration fits regardless of budget.
    pub fn with_byte_budget(bytes: usize, row_len: usize) -> Self {
        let row_bytes = row_len.max(1) * std::mem::size_of::<f64>();
        Self::new((bytes / row_bytes).max(2))
    }

    /// Fetch row `i`, computing and inserting it on a miss
    pub fn row<F>(&mut self, i: usize, compute: F) -> Arc<Vec<f64>>
    where
        F: FnOnce() -> Vec<f64>,
    {
        if let Some(row) = self.cache.get(&i) {
            self.hits += 1;
            return Arc::clone(row);
        }
        self.misses += 1;
        let row = Arc::new(compute());
        self.cache.put(i, Arc::clone(&row));
        row
    }

    /// Fraction of lookups served from cache
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            capacity: self.cache.cap().get(),
            rows: self.cache.len(),
        }
    }

    /// Drop all rows and reset counters
    pub fn clear(&mut self) {
        self.cache.clear();
        self.hits = 0;
        self.misses = 0;
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub capacity: usize,
    pub rows: usize,
}
