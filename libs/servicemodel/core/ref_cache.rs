use crate::core::endpoint_trait::EndpointTrait;
use crate::core::factory_ref::ChannelFactoryRef;
use crate::core::metrics::{AtomicCacheMetrics, CacheMetrics};
use crate::core::mru_cache::MruCache;
use crate::core::state::CommunicationState;
use crate::traits::*;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::sync::Arc;
use tracing::{debug, info};

/// Called once per entry trimmed by the watermark
pub type AgedOutObserver<C> = Arc<dyn Fn(&EndpointTrait<C>) + Send + Sync>;

type Entries<C> = MruCache<EndpointTrait<C>, Arc<ChannelFactoryRef<C>>>;

/// Bounded cache of shared channel factories, keyed by endpoint trait
///
/// Every entry holds one reference on its `ChannelFactoryRef`. Removing an
/// entry (explicitly, by replacement, by stale purge or by aging) releases
/// that reference; when it was the last one the factory is aborted after the
/// cache lock is dropped.
///
/// Compound sequences ("look up, else create and insert", "release, then
/// abort if last") go through `lock()`, which returns a guard holding the
/// cache's single lock for as long as the sequence needs.
pub struct ChannelFactoryRefCache<C: ClientChannel> {
    entries: Mutex<Entries<C>>,
    metrics: AtomicCacheMetrics,
    aged_out_observer: RwLock<Option<AgedOutObserver<C>>>,
}

impl<C: ClientChannel> ChannelFactoryRefCache<C> {
    pub fn new(watermark: usize) -> Self {
        Self {
            entries: Mutex::new(MruCache::new(watermark)),
            metrics: AtomicCacheMetrics::new(),
            aged_out_observer: RwLock::new(None),
        }
    }

    /// Take the cache lock
    pub fn lock(&self) -> CacheGuard<'_, C> {
        CacheGuard {
            entries: self.entries.lock(),
            deferred: Deferred {
                cache: self,
                aborts: Vec::new(),
                aged_out: Vec::new(),
            },
        }
    }

    /// Look up a live factory; see `CacheGuard::try_get_value`
    pub fn try_get_value(&self, key: &EndpointTrait<C>) -> Option<Arc<ChannelFactoryRef<C>>> {
        self.lock().try_get_value(key)
    }

    /// Insert; see `CacheGuard::add`
    pub fn add(&self, key: EndpointTrait<C>, factory_ref: Arc<ChannelFactoryRef<C>>) {
        self.lock().add(key, factory_ref);
    }

    /// Remove; see `CacheGuard::remove`
    pub fn remove(&self, key: &EndpointTrait<C>) -> bool {
        self.lock().remove(key)
    }

    pub fn contains(&self, key: &EndpointTrait<C>) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn watermark(&self) -> usize {
        self.entries.lock().watermark()
    }

    /// Drop every entry, releasing the cache's references
    ///
    /// # Returns
    /// Number of entries removed
    pub fn clear(&self) -> usize {
        let mut guard = self.lock();
        let drained = guard.entries.drain();
        let count = drained.len();
        for (_, factory_ref) in drained {
            guard.on_single_item_removed(factory_ref);
        }
        if count > 0 {
            info!("Cleared {} cached channel factories", count);
        }
        count
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.metrics.snapshot()
    }

    pub fn set_aged_out_observer<F>(&self, observer: F)
    where
        F: Fn(&EndpointTrait<C>) + Send + Sync + 'static,
    {
        *self.aged_out_observer.write() = Some(Arc::new(observer));
    }

    pub(crate) fn record_invalidation(&self) {
        self.metrics.record_invalidation();
    }
}

/// Exclusive access to the cache
///
/// Factory aborts and aged-out notifications queued while the guard is held
/// run after the lock is released, so teardown never blocks other lookups.
pub struct CacheGuard<'a, C: ClientChannel> {
    // Field order matters: the lock is released before `deferred` runs.
    entries: MutexGuard<'a, Entries<C>>,
    deferred: Deferred<'a, C>,
}

struct Deferred<'a, C: ClientChannel> {
    cache: &'a ChannelFactoryRefCache<C>,
    aborts: Vec<Arc<ChannelFactoryRef<C>>>,
    aged_out: Vec<EndpointTrait<C>>,
}

impl<C: ClientChannel> Drop for Deferred<'_, C> {
    fn drop(&mut self) {
        if !self.aged_out.is_empty() {
            let observer = self.cache.aged_out_observer.read().clone();
            if let Some(observer) = observer {
                for key in &self.aged_out {
                    observer(key);
                }
            }
        }
        for factory_ref in self.aborts.drain(..) {
            debug!("Aborting channel factory released by the cache");
            factory_ref.abort();
            self.cache.metrics.record_factory_aborted();
        }
    }
}

impl<C: ClientChannel> CacheGuard<'_, C> {
    /// Look up a factory, touching recency
    ///
    /// An entry whose factory is no longer `Opened` is removed on the spot
    /// and reported as absent.
    ///
    /// # Returns
    /// * `Some(handle)` - Live shared factory; the caller must `add_ref` to keep it
    /// * `None` - Nothing usable is cached for this key
    pub fn try_get_value(&mut self, key: &EndpointTrait<C>) -> Option<Arc<ChannelFactoryRef<C>>> {
        let cache = self.deferred.cache;
        let metrics = &cache.metrics;
        let Some(found) = self.entries.get(key).cloned() else {
            metrics.record_miss();
            return None;
        };

        if found.state() == CommunicationState::Opened {
            metrics.record_hit();
            return Some(found);
        }

        debug!("Purging stale {} cache entry ({})", key.kind(), found.state());
        self.entries.remove(key);
        metrics.record_stale_purge();
        metrics.record_miss();
        self.on_single_item_removed(found);
        None
    }

    /// Insert an entry
    ///
    /// The caller must already have taken the cache's reference (`add_ref`).
    /// A replaced entry and any entries trimmed by the watermark are released.
    pub fn add(&mut self, key: EndpointTrait<C>, factory_ref: Arc<ChannelFactoryRef<C>>) {
        debug!("Caching channel factory for {} endpoint", key.kind());
        let evicted = self.entries.insert(key, factory_ref);
        let cache = self.deferred.cache;
        let metrics = &cache.metrics;
        metrics.record_addition();

        if let Some(replaced) = evicted.replaced {
            self.on_single_item_removed(replaced);
        }

        if !evicted.aged_out.is_empty() {
            metrics.record_evictions(evicted.aged_out.len());
            debug!("Watermark exceeded, aged out {} entries", evicted.aged_out.len());
            for (key, factory_ref) in evicted.aged_out {
                self.on_single_item_removed(factory_ref);
                self.deferred.aged_out.push(key);
            }
        }
    }

    /// Remove an entry and release the cache's reference
    pub fn remove(&mut self, key: &EndpointTrait<C>) -> bool {
        match self.entries.remove(key) {
            Some(factory_ref) => {
                self.on_single_item_removed(factory_ref);
                true
            }
            None => false,
        }
    }

    /// Remove the entry only if it still holds `expected`
    ///
    /// Used when invalidating a factory that may already have been replaced
    /// by another client.
    pub fn remove_if_same(&mut self, key: &EndpointTrait<C>, expected: &Arc<ChannelFactoryRef<C>>) -> bool {
        let same = self
            .entries
            .peek(key)
            .is_some_and(|current| Arc::ptr_eq(current, expected));
        same && self.remove(key)
    }

    pub fn contains(&self, key: &EndpointTrait<C>) -> bool {
        self.entries.contains_key(key)
    }

    /// Look up without touching recency or purging
    pub fn peek(&self, key: &EndpointTrait<C>) -> Option<Arc<ChannelFactoryRef<C>>> {
        self.entries.peek(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Abort `factory_ref` once the lock is released
    pub fn defer_abort(&mut self, factory_ref: Arc<ChannelFactoryRef<C>>) {
        self.deferred.aborts.push(factory_ref);
    }

    fn on_single_item_removed(&mut self, factory_ref: Arc<ChannelFactoryRef<C>>) {
        if factory_ref.release() {
            self.defer_abort(factory_ref);
        }
    }
}
