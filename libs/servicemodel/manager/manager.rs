use crate::core::config::{CacheConfig, CacheSetting};
use crate::core::metrics::CacheMetrics;
use crate::core::ref_cache::ChannelFactoryRefCache;
use crate::traits::{ClientChannel, Result, ServiceModelError};
use parking_lot::{Mutex, RwLock};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Cache setting of one channel type; frozen once a client used it
#[derive(Debug, Clone, Copy)]
struct SettingState {
    value: CacheSetting,
    frozen: bool,
}

/// Everything the manager keeps for one channel type
struct TypeSlot<C: ClientChannel> {
    cache: Arc<ChannelFactoryRefCache<C>>,
    setting: Mutex<SettingState>,
}

/// Type-erased view of a `TypeSlot`
trait ErasedSlot: Send + Sync {
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
    fn entry_count(&self) -> usize;
    fn clear(&self) -> usize;
    fn metrics(&self) -> CacheMetrics;
    fn type_name(&self) -> &'static str;
}

impl<C: ClientChannel> ErasedSlot for TypeSlot<C> {
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn entry_count(&self) -> usize {
        self.cache.len()
    }

    fn clear(&self) -> usize {
        self.cache.clear()
    }

    fn metrics(&self) -> CacheMetrics {
        self.cache.metrics()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<C>()
    }
}

/// Owner of every channel-factory cache in an application
///
/// Holds one `ChannelFactoryRefCache` and one cache setting per channel type,
/// created on first use. Construct one at startup, hand it to every client
/// (the builder takes an `Arc`), and call `shutdown()` when done.
///
/// # Example
/// ```ignore
/// let manager = Arc::new(ChannelFactoryCacheManager::new(&config.cache));
///
/// let client = ClientBase::<EchoChannel>::builder(Arc::clone(&manager))
///     .configuration(registry, "echo")
///     .build()?;
///
/// // Later, on shutdown:
/// manager.shutdown();
/// ```
pub struct ChannelFactoryCacheManager {
    slots: RwLock<HashMap<TypeId, Arc<dyn ErasedSlot>>>,
    watermark: usize,
    default_setting: CacheSetting,
}

impl ChannelFactoryCacheManager {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            watermark: config.watermark.max(1),
            default_setting: config.default_setting,
        }
    }

    /// Manager with the default setting and a custom watermark
    pub fn with_watermark(watermark: usize) -> Self {
        Self::new(&CacheConfig {
            watermark,
            ..CacheConfig::default()
        })
    }

    pub fn watermark(&self) -> usize {
        self.watermark
    }

    fn slot<C: ClientChannel>(&self) -> Arc<TypeSlot<C>> {
        let id = TypeId::of::<C>();
        let existing = self.slots.read().get(&id).cloned();
        let slot = match existing {
            Some(slot) => slot,
            None => {
                let mut slots = self.slots.write();
                Arc::clone(slots.entry(id).or_insert_with(|| {
                    debug!("Creating channel factory cache for {}", std::any::type_name::<C>());
                    Arc::new(TypeSlot::<C> {
                        cache: Arc::new(ChannelFactoryRefCache::new(self.watermark)),
                        setting: Mutex::new(SettingState {
                            value: self.default_setting,
                            frozen: false,
                        }),
                    }) as Arc<dyn ErasedSlot>
                }))
            }
        };

        slot.as_any()
            .downcast::<TypeSlot<C>>()
            .unwrap_or_else(|_| unreachable!("cache slot keyed by a foreign TypeId"))
    }

    /// The cache shared by all clients of channel type `C`
    pub fn cache_for<C: ClientChannel>(&self) -> Arc<ChannelFactoryRefCache<C>> {
        Arc::clone(&self.slot::<C>().cache)
    }

    pub fn cache_setting<C: ClientChannel>(&self) -> CacheSetting {
        self.slot::<C>().setting.lock().value
    }

    /// Change the cache setting for `C`
    ///
    /// # Returns
    /// * `Ok(())` - Setting stored (or unchanged)
    /// * `Err(ServiceModelError::InvalidOperation)` - A client of `C` already fixed a different setting
    pub fn set_cache_setting<C: ClientChannel>(&self, setting: CacheSetting) -> Result<()> {
        let slot = self.slot::<C>();
        let mut state = slot.setting.lock();
        if state.frozen && state.value != setting {
            return Err(ServiceModelError::InvalidOperation(format!(
                "Cache setting for {} is already {:?} and can no longer change",
                std::any::type_name::<C>(),
                state.value
            )));
        }
        state.value = setting;
        Ok(())
    }

    /// Fix the cache setting for `C` and return it
    pub fn freeze_cache_setting<C: ClientChannel>(&self) -> CacheSetting {
        let slot = self.slot::<C>();
        let mut state = slot.setting.lock();
        state.frozen = true;
        state.value
    }

    pub fn entry_count<C: ClientChannel>(&self) -> usize {
        self.slot::<C>().cache.len()
    }

    /// Entries across every channel type
    pub fn total_entries(&self) -> usize {
        self.slots.read().values().map(|slot| slot.entry_count()).sum()
    }

    pub fn metrics<C: ClientChannel>(&self) -> CacheMetrics {
        self.slot::<C>().cache.metrics()
    }

    /// Metrics snapshot per channel type name
    pub fn all_metrics(&self) -> HashMap<&'static str, CacheMetrics> {
        self.slots
            .read()
            .values()
            .map(|slot| (slot.type_name(), slot.metrics()))
            .collect()
    }

    /// Purge every cache and forget every setting
    ///
    /// Clients created earlier keep the caches they already hold.
    pub fn reset(&self) {
        let slots: Vec<_> = self.slots.write().drain().map(|(_, slot)| slot).collect();
        for slot in slots {
            slot.clear();
        }
        debug!("Channel factory cache manager reset");
    }

    /// Purge every cache, aborting factories whose last reference the cache held
    ///
    /// # Returns
    /// Number of cache entries removed
    pub fn shutdown(&self) -> usize {
        let slots: Vec<_> = self.slots.read().values().cloned().collect();
        let removed: usize = slots.iter().map(|slot| slot.clear()).sum();
        info!("Channel factory caches shut down ({} entries released)", removed);
        removed
    }
}

impl Default for ChannelFactoryCacheManager {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

impl std::fmt::Debug for ChannelFactoryCacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelFactoryCacheManager")
            .field("watermark", &self.watermark)
            .field("default_setting", &self.default_setting)
            .field("channel_types", &self.slots.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::address::EndpointAddress;
    use crate::core::client::ClientBase;
    use crate::core::endpoint_trait::EndpointTrait;
    use crate::core::loopback::{LoopbackBinding, LoopbackChannel};
    use crate::traits::Binding;

    fn endpoint_trait(binding: &Arc<LoopbackBinding>) -> EndpointTrait<LoopbackChannel> {
        let binding: Arc<dyn Binding<LoopbackChannel>> = binding.clone();
        EndpointTrait::programmatic(binding, EndpointAddress::parse("loopback://echo/service").unwrap(), None)
    }

    #[test]
    fn test_one_cache_per_type() {
        let manager = ChannelFactoryCacheManager::with_watermark(4);
        let a = manager.cache_for::<LoopbackChannel>();
        let b = manager.cache_for::<LoopbackChannel>();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.watermark(), 4);
    }

    #[test]
    fn test_setting_is_mutable_until_frozen() {
        let manager = ChannelFactoryCacheManager::default();
        assert_eq!(manager.cache_setting::<LoopbackChannel>(), CacheSetting::Default);

        manager.set_cache_setting::<LoopbackChannel>(CacheSetting::AlwaysOn).unwrap();
        manager.set_cache_setting::<LoopbackChannel>(CacheSetting::AlwaysOff).unwrap();
        assert_eq!(manager.freeze_cache_setting::<LoopbackChannel>(), CacheSetting::AlwaysOff);

        // Same value is accepted, a different one is not
        manager.set_cache_setting::<LoopbackChannel>(CacheSetting::AlwaysOff).unwrap();
        let err = manager
            .set_cache_setting::<LoopbackChannel>(CacheSetting::Default)
            .unwrap_err();
        assert!(matches!(err, ServiceModelError::InvalidOperation(_)));
    }

    #[test]
    fn test_default_setting_from_config() {
        let manager = ChannelFactoryCacheManager::new(&CacheConfig {
            watermark: 10,
            default_setting: CacheSetting::AlwaysOff,
        });
        assert_eq!(manager.cache_setting::<LoopbackChannel>(), CacheSetting::AlwaysOff);
    }

    #[test]
    fn test_shutdown_aborts_factories_only_held_by_cache() {
        let manager = ChannelFactoryCacheManager::default();
        let binding = Arc::new(LoopbackBinding::new());

        let client = ClientBase::new(&manager, endpoint_trait(&binding)).unwrap();
        client.channel().unwrap();
        assert_eq!(manager.total_entries(), 1);
        client.abort();
        // The cache still holds the factory
        assert_eq!(binding.faults().factories_aborted(), 0);

        assert_eq!(manager.shutdown(), 1);
        assert_eq!(manager.total_entries(), 0);
        assert_eq!(binding.faults().factories_aborted(), 1);
    }

    #[test]
    fn test_reset_forgets_settings() {
        let manager = ChannelFactoryCacheManager::default();
        manager.set_cache_setting::<LoopbackChannel>(CacheSetting::AlwaysOff).unwrap();
        manager.freeze_cache_setting::<LoopbackChannel>();

        manager.reset();
        assert_eq!(manager.cache_setting::<LoopbackChannel>(), CacheSetting::Default);
        manager.set_cache_setting::<LoopbackChannel>(CacheSetting::AlwaysOn).unwrap();
    }
}
