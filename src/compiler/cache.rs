//! Bounded cache of compiled computations keyed by request
//!
//! Least-recently-used entries are evicted once the capacity is reached.
//! A lookup that hits promotes the entry to most recently used.

use super::ir::Computation;
use super::request::ComputationRequest;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Default number of cached computations
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Counters for cache behaviour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
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

pub struct ComputationCache {
    entries: LruCache<ComputationRequest, Arc<Computation>>,
    stats: CacheStats,
}

impl ComputationCache {
    /// A capacity of zero is raised to one
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            stats: CacheStats::default(),
        }
    }

    /// Look up a request, marking the entry as most recently used
    pub fn get(&mut self, request: &ComputationRequest) -> Option<Arc<Computation>> {
        match self.entries.get(request) {
            Some(computation) => {
                self.stats.hits += 1;
                Some(Arc::clone(computation))
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Look up without touching recency or counters
    pub fn peek(&self, request: &ComputationRequest) -> Option<&Arc<Computation>> {
        self.entries.peek(request)
    }

    /// Mark an entry as most recently used; false if absent
    pub fn touch(&mut self, request: &ComputationRequest) -> bool {
        if !self.entries.contains(request) {
            return false;
        }
        self.entries.promote(request);
        true
    }

    pub fn contains(&self, request: &ComputationRequest) -> bool {
        self.entries.contains(request)
    }

    /// Insert an entry; returns the request evicted to make room, if any
    pub fn insert(
        &mut self,
        request: ComputationRequest,
        computation: Arc<Computation>,
    ) -> Option<ComputationRequest> {
        match self.entries.push(request, computation) {
            // push also returns the old pair when the key was already present
            Some((old, _)) if !self.entries.contains(&old) => {
                self.stats.evictions += 1;
                Some(old)
            }
            _ => None,
        }
    }

    /// Drop the least recently used entry
    pub fn evict_oldest(&mut self) -> Option<ComputationRequest> {
        let (request, _) = self.entries.pop_lru()?;
        self.stats.evictions += 1;
        Some(request)
    }

    /// Drop every entry; statistics are kept
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of cached computations
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries before eviction
    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}
