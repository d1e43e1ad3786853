use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Cache metrics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    /// Lookups that found a factory no longer `Opened` and removed it
    pub stale_purges: u64,
    pub additions: u64,
    /// Entries trimmed by the watermark
    pub evictions: u64,
    /// Entries removed after a transient failure on the cached factory
    pub invalidations: u64,
    /// Factories aborted because the cache dropped their last reference
    pub factories_aborted: u64,
}

/// Lock-free counters behind `CacheMetrics`
#[derive(Debug, Default)]
pub struct AtomicCacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    stale_purges: AtomicU64,
    additions: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
    factories_aborted: AtomicU64,
}

impl AtomicCacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_stale_purge(&self) {
        self.stale_purges.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_addition(&self) {
        self.additions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_evictions(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_factory_aborted(&self) {
        self.factories_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheMetrics {
        CacheMetrics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale_purges: self.stale_purges.load(Ordering::Relaxed),
            additions: self.additions.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            factories_aborted: self.factories_aborted.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let metrics = AtomicCacheMetrics::new();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_miss();
        metrics.record_evictions(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.hits, 2);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.evictions, 3);
        assert_eq!(snapshot.additions, 0);
    }
}
