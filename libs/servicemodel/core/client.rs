use crate::core::builder::{states::NoEndpoint, ClientBaseBuilder};
use crate::core::config::CacheSetting;
use crate::core::description::ServiceEndpoint;
use crate::core::endpoint_trait::EndpointTrait;
use crate::core::factory::ChannelFactory;
use crate::core::factory_ref::ChannelFactoryRef;
use crate::core::ref_cache::ChannelFactoryRefCache;
use crate::core::state::CommunicationState;
use crate::core::timeout::Deadline;
use crate::manager::ChannelFactoryCacheManager;
use crate::traits::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Which factory this client uses and whether it may be shared
struct SharingState<C: ClientChannel> {
    factory_ref: Arc<ChannelFactoryRef<C>>,
    /// `factory_ref` is (or was) the cached, shared instance
    use_cached: bool,
    /// This client may publish its factory to the cache
    can_share: bool,
    /// `factory_ref` was released; the client is closed or aborted
    released: bool,
}

/// Client proxy façade
///
/// Owns one channel, created lazily on first use, and a reference on the
/// channel factory that produced it. Depending on the cache setting for `C`
/// the factory is either private to this client or shared with every other
/// client whose endpoint trait is equal.
///
/// Sharing is decided once: the first channel creation finalises it, and
/// anything that hands the factory out for mutation (`channel_factory()`,
/// `endpoint()`) disables it beforehand.
///
/// Lock order: channel → sharing → cache.
///
/// # Type Parameters
/// - `C`: Channel type
pub struct ClientBase<C: ClientChannel> {
    cache: Arc<ChannelFactoryRefCache<C>>,
    setting: CacheSetting,
    /// `None` when the client never participates in the cache
    endpoint_trait: Option<EndpointTrait<C>>,
    channel: Mutex<Option<Arc<C>>>,
    sharing: Mutex<SharingState<C>>,
    sharing_finalized: AtomicBool,
}

impl<C: ClientChannel> ClientBase<C> {
    /// Start building a client against `manager`'s caches
    pub fn builder(manager: Arc<ChannelFactoryCacheManager>) -> ClientBaseBuilder<C, NoEndpoint> {
        ClientBaseBuilder::new(manager)
    }

    /// Create a client for `endpoint_trait`
    ///
    /// Fixes the cache setting for `C` on `manager` if it was not fixed yet.
    ///
    /// # Returns
    /// * `Ok(client)` - Client with a factory reference, no channel yet
    /// * `Err(ServiceModelError::Configuration)` - The endpoint cannot be resolved
    pub fn new(manager: &ChannelFactoryCacheManager, endpoint_trait: EndpointTrait<C>) -> Result<Self> {
        let setting = manager.freeze_cache_setting::<C>();
        let cache = manager.cache_for::<C>();

        if setting == CacheSetting::AlwaysOff {
            let factory = endpoint_trait.create_channel_factory()?;
            debug!("Cache disabled for {}, using a private factory", factory.endpoint().contract().name());
            return Ok(Self {
                cache,
                setting,
                endpoint_trait: None,
                channel: Mutex::new(None),
                sharing: Mutex::new(SharingState {
                    factory_ref: Arc::new(ChannelFactoryRef::new(factory)),
                    use_cached: false,
                    can_share: false,
                    released: false,
                }),
                sharing_finalized: AtomicBool::new(true),
            });
        }

        let (factory_ref, use_cached) = Self::initialize_channel_factory_ref(&cache, &endpoint_trait)?;
        Ok(Self {
            cache,
            setting,
            endpoint_trait: Some(endpoint_trait),
            channel: Mutex::new(None),
            sharing: Mutex::new(SharingState {
                factory_ref,
                use_cached,
                can_share: true,
                released: false,
            }),
            sharing_finalized: AtomicBool::new(false),
        })
    }

    /// Reuse the cached factory for the trait, or build a private one
    fn initialize_channel_factory_ref(
        cache: &ChannelFactoryRefCache<C>,
        endpoint_trait: &EndpointTrait<C>,
    ) -> Result<(Arc<ChannelFactoryRef<C>>, bool)> {
        {
            let mut guard = cache.lock();
            if let Some(cached) = guard.try_get_value(endpoint_trait) {
                cached.add_ref();
                debug!("Sharing cached channel factory ({} endpoint)", endpoint_trait.kind());
                return Ok((cached, true));
            }
        }

        let factory = endpoint_trait.create_channel_factory()?;
        Ok((Arc::new(ChannelFactoryRef::new(factory)), false))
    }

    /// The client's channel, created on first access
    ///
    /// When the shared factory fails with a transient error, the cache entry
    /// is invalidated and the creation retried once on a private factory.
    pub fn channel(&self) -> Result<Arc<C>> {
        let mut slot = self.channel.lock();
        if let Some(channel) = slot.as_ref() {
            return Ok(Arc::clone(channel));
        }

        if self.sharing.lock().released {
            return Err(ServiceModelError::ObjectDisposed(
                "Client was closed or aborted".to_string(),
            ));
        }

        let channel = if self.is_using_cached_factory() {
            match self.create_channel_internal() {
                Ok(channel) => channel,
                Err(e) if e.is_transient() && self.is_using_cached_factory() => {
                    warn!("Cached channel factory failed ({}), retrying on a private factory", e);
                    self.invalidate_cache_and_create_channel()?
                }
                Err(e) => return Err(e),
            }
        } else {
            self.create_channel_internal()?
        };

        *slot = Some(Arc::clone(&channel));
        Ok(channel)
    }

    fn create_channel_internal(&self) -> Result<Arc<C>> {
        match self.create_channel() {
            Ok(channel) => {
                self.try_add_channel_factory_to_cache();
                Ok(channel)
            }
            Err(e) => {
                if !self.sharing_finalized.load(Ordering::Acquire) {
                    // Never share a factory that failed before its state was known
                    self.try_disable_sharing();
                }
                Err(e)
            }
        }
    }

    /// Create a channel from the current factory, finalising sharing
    fn create_channel(&self) -> Result<Arc<C>> {
        let factory = {
            let sharing = self.sharing.lock();
            if sharing.released {
                return Err(ServiceModelError::ObjectDisposed(
                    "Client was closed or aborted".to_string(),
                ));
            }
            self.sharing_finalized.store(true, Ordering::Release);
            Arc::clone(sharing.factory_ref.channel_factory())
        };
        factory.create_channel()
    }

    fn try_add_channel_factory_to_cache(&self) {
        if self.setting == CacheSetting::AlwaysOff {
            return;
        }
        let Some(endpoint_trait) = &self.endpoint_trait else {
            return;
        };

        let mut sharing = self.sharing.lock();
        if !sharing.can_share || sharing.use_cached || sharing.released {
            return;
        }
        if sharing.factory_ref.state() != CommunicationState::Opened {
            return;
        }

        let mut guard = self.cache.lock();
        if guard.try_get_value(endpoint_trait).is_none() {
            sharing.factory_ref.add_ref();
            guard.add(endpoint_trait.clone(), Arc::clone(&sharing.factory_ref));
            sharing.use_cached = true;
            debug!("Published channel factory to the cache ({} endpoint)", endpoint_trait.kind());
        }
    }

    fn invalidate_cache_and_create_channel(&self) -> Result<Arc<C>> {
        {
            let mut sharing = self.sharing.lock();
            if sharing.released {
                return Err(ServiceModelError::ObjectDisposed(
                    "Client was closed or aborted".to_string(),
                ));
            }
            if let Some(endpoint_trait) = &self.endpoint_trait {
                if self.cache.lock().remove_if_same(endpoint_trait, &sharing.factory_ref) {
                    self.cache.record_invalidation();
                    info!("Invalidated cached channel factory ({} endpoint)", endpoint_trait.kind());
                }
            }
            sharing.can_share = false;
            self.sharing_finalized.store(true, Ordering::Release);
            self.switch_to_private_factory(&mut sharing)?;
        }
        self.create_channel_internal()
    }

    /// Stop participating in the cache before sharing is finalised
    fn try_disable_sharing(&self) {
        if self.sharing_finalized.load(Ordering::Acquire) {
            return;
        }
        let mut sharing = self.sharing.lock();
        if self.sharing_finalized.load(Ordering::Acquire) {
            return;
        }
        sharing.can_share = false;
        self.sharing_finalized.store(true, Ordering::Release);

        if sharing.use_cached && !sharing.released {
            if let Err(e) = self.switch_to_private_factory(&mut sharing) {
                // The cached factory stays in use; the error resurfaces on channel creation
                warn!("Could not build a private channel factory: {}", e);
            }
        }
    }

    /// Replace the shared factory with a fresh private one
    fn switch_to_private_factory(&self, sharing: &mut SharingState<C>) -> Result<()> {
        // A released reference must never be released again
        if !sharing.use_cached || sharing.released {
            return Ok(());
        }
        let Some(endpoint_trait) = &self.endpoint_trait else {
            return Ok(());
        };

        let factory = endpoint_trait.create_channel_factory()?;
        let previous = std::mem::replace(&mut sharing.factory_ref, Arc::new(ChannelFactoryRef::new(factory)));
        sharing.use_cached = false;

        let mut guard = self.cache.lock();
        if previous.release() {
            guard.defer_abort(previous);
        }
        Ok(())
    }

    /// Release this client's factory reference, once
    ///
    /// # Returns
    /// The reference and whether it was the cached instance, when this was the last holder
    fn release_factory_ref(&self) -> Option<(Arc<ChannelFactoryRef<C>>, bool)> {
        let mut sharing = self.sharing.lock();
        if sharing.released {
            return None;
        }
        let last = {
            let _guard = self.cache.lock();
            sharing.released = true;
            sharing.factory_ref.release()
        };
        last.then(|| (Arc::clone(&sharing.factory_ref), sharing.use_cached))
    }

    /// Open the channel, creating it if needed
    pub fn open(&self, timeout: Duration) -> Result<()> {
        self.channel()?.open(timeout)
    }

    /// Close the channel, then release the factory reference
    ///
    /// The last holder of a private factory closes it gracefully; the last
    /// holder of a formerly cached factory aborts it. Errors from the channel
    /// close are returned after the release has happened.
    pub fn close(&self, timeout: Duration) -> Result<()> {
        let deadline = Deadline::after("close client", timeout);
        let mut first_error = None;

        let channel = self.channel.lock().clone();
        if let Some(channel) = channel {
            if let Err(e) = deadline.check().and_then(|remaining| channel.close(remaining)) {
                warn!("Channel close failed, aborting: {}", e);
                channel.abort();
                first_error.get_or_insert(e);
            }
        }

        if let Some((factory_ref, was_cached)) = self.release_factory_ref() {
            if was_cached {
                factory_ref.abort();
            } else {
                match deadline.check() {
                    Ok(remaining) => {
                        if let Err(e) = factory_ref.close(remaining) {
                            first_error.get_or_insert(e);
                        }
                    }
                    Err(e) => {
                        factory_ref.abort();
                        first_error.get_or_insert(e);
                    }
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Abort the channel, then release the factory reference
    ///
    /// Never fails; the last holder aborts the factory.
    pub fn abort(&self) {
        let channel = self.channel.lock().clone();
        if let Some(channel) = channel {
            channel.abort();
        }
        if let Some((factory_ref, _)) = self.release_factory_ref() {
            factory_ref.abort();
        }
    }

    pub async fn open_async(self: &Arc<Self>, timeout: Duration) -> Result<()> {
        let client = Arc::clone(self);
        tokio::task::spawn_blocking(move || client.open(timeout))
            .await
            .map_err(|e| ServiceModelError::Other(format!("Open task failed: {}", e)))?
    }

    pub async fn close_async(self: &Arc<Self>, timeout: Duration) -> Result<()> {
        let client = Arc::clone(self);
        tokio::task::spawn_blocking(move || client.close(timeout))
            .await
            .map_err(|e| ServiceModelError::Other(format!("Close task failed: {}", e)))?
    }

    /// State of the channel; `Created` before it exists, `Closed` once released
    pub fn state(&self) -> CommunicationState {
        if let Some(channel) = self.channel.lock().as_ref() {
            return channel.state();
        }
        if self.sharing.lock().released {
            CommunicationState::Closed
        } else {
            CommunicationState::Created
        }
    }

    /// The channel factory; disables sharing for this client
    pub fn channel_factory(&self) -> Arc<ChannelFactory<C>> {
        self.try_disable_sharing();
        Arc::clone(self.sharing.lock().factory_ref.channel_factory())
    }

    /// The endpoint description; disables sharing for this client
    pub fn endpoint(&self) -> ServiceEndpoint<C> {
        self.channel_factory().endpoint().clone()
    }

    pub fn cache_setting(&self) -> CacheSetting {
        self.setting
    }

    pub fn endpoint_trait(&self) -> Option<&EndpointTrait<C>> {
        self.endpoint_trait.as_ref()
    }

    pub fn is_using_cached_factory(&self) -> bool {
        self.sharing.lock().use_cached
    }

    pub fn can_share_factory(&self) -> bool {
        self.sharing.lock().can_share
    }

    pub fn is_sharing_finalized(&self) -> bool {
        self.sharing_finalized.load(Ordering::Acquire)
    }

    /// Holders of this client's factory reference (clients plus the cache)
    pub fn factory_ref_count(&self) -> usize {
        self.sharing.lock().factory_ref.ref_count()
    }
}

impl<C: ClientChannel> Drop for ClientBase<C> {
    fn drop(&mut self) {
        self.abort();
    }
}

impl<C: ClientChannel> std::fmt::Debug for ClientBase<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBase")
            .field("setting", &self.setting)
            .field("endpoint_trait", &self.endpoint_trait)
            .field("state", &self.state())
            .field("use_cached", &self.is_using_cached_factory())
            .field("sharing_finalized", &self.is_sharing_finalized())
            .finish()
    }
}
