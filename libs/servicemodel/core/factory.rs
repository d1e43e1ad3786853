use crate::core::address::EndpointAddress;
use crate::core::communication::CommunicationObject;
use crate::core::description::ServiceEndpoint;
use crate::core::endpoint_trait::CallbackInstance;
use crate::core::state::{CommunicationState, LifecycleEvent};
use crate::core::timeout::Deadline;
use crate::traits::*;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Long-lived producer of channels for one endpoint
///
/// The factory owns the endpoint description and, once opened, the transport
/// factory built by the endpoint's binding. Channels it creates are tracked
/// weakly: closing the factory closes them first, aborting it aborts them.
///
/// # Type Parameters
/// - `C`: Channel type produced
pub struct ChannelFactory<C: ClientChannel> {
    endpoint: Arc<ServiceEndpoint<C>>,
    callback: Option<CallbackInstance>,
    lifecycle: CommunicationObject,
    inner: Mutex<Option<Arc<dyn TransportChannelFactory<C>>>>,
    /// Serialises explicit opens with the implicit open in `create_channel`
    open_lock: Mutex<()>,
    channels: Mutex<Vec<Weak<C>>>,
}

impl<C: ClientChannel> ChannelFactory<C> {
    /// Factory for a pre-built endpoint
    pub fn new(endpoint: Arc<ServiceEndpoint<C>>) -> Self {
        let label = format!("ChannelFactory<{}>", endpoint.contract().name());
        Self {
            endpoint,
            callback: None,
            lifecycle: CommunicationObject::new(label),
            inner: Mutex::new(None),
            open_lock: Mutex::new(()),
            channels: Mutex::new(Vec::new()),
        }
    }

    /// Factory for an explicit binding and remote address
    pub fn with_binding(binding: Arc<dyn Binding<C>>, address: EndpointAddress) -> Self {
        Self::new(Arc::new(Self::create_description(binding, address)))
    }

    /// Describe the endpoint for `C` over `binding` at `address`
    ///
    /// Deterministic: the contract comes from the channel type, so the same
    /// inputs always produce an equivalent description.
    pub fn create_description(binding: Arc<dyn Binding<C>>, address: EndpointAddress) -> ServiceEndpoint<C> {
        ServiceEndpoint::new(C::contract())
            .with_binding(binding)
            .with_address(address)
    }

    /// Attach the callback instance duplex channels are created with
    pub fn with_callback(mut self, callback: CallbackInstance) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn endpoint(&self) -> &ServiceEndpoint<C> {
        &self.endpoint
    }

    pub fn callback(&self) -> Option<&CallbackInstance> {
        self.callback.as_ref()
    }

    #[inline]
    pub fn state(&self) -> CommunicationState {
        self.lifecycle.state()
    }

    pub fn subscribe(&self) -> Receiver<LifecycleEvent> {
        self.lifecycle.subscribe()
    }

    /// Open the factory, building and opening the transport
    ///
    /// # Returns
    /// * `Ok(())` - Factory is `Opened` (or already was)
    /// * `Err(ServiceModelError::Configuration)` - The endpoint has no binding; never retryable
    /// * `Err(e)` - Transport failed to open; the factory is now `Faulted`
    pub fn open(&self, timeout: Duration) -> Result<()> {
        let _guard = self.open_lock.lock();
        self.lifecycle.open(&FactoryHooks { factory: self }, timeout)
    }

    /// Open with the binding's open timeout
    pub fn open_default(&self) -> Result<()> {
        self.open(self.endpoint.timeouts().open)
    }

    pub fn close(&self, timeout: Duration) -> Result<()> {
        self.lifecycle.close(&FactoryHooks { factory: self }, timeout)
    }

    /// Close with the binding's close timeout
    pub fn close_default(&self) -> Result<()> {
        self.close(self.endpoint.timeouts().close)
    }

    pub fn abort(&self) {
        self.lifecycle.abort(&FactoryHooks { factory: self });
    }

    pub async fn open_async(self: &Arc<Self>, timeout: Duration) -> Result<()> {
        let factory = Arc::clone(self);
        tokio::task::spawn_blocking(move || factory.open(timeout))
            .await
            .map_err(|e| ServiceModelError::Other(format!("Open task failed: {}", e)))?
    }

    pub async fn close_async(self: &Arc<Self>, timeout: Duration) -> Result<()> {
        let factory = Arc::clone(self);
        tokio::task::spawn_blocking(move || factory.close(timeout))
            .await
            .map_err(|e| ServiceModelError::Other(format!("Close task failed: {}", e)))?
    }

    /// Create a channel to the endpoint's own address
    pub fn create_channel(&self) -> Result<Arc<C>> {
        let address = self
            .endpoint
            .address()
            .ok_or(ServiceModelError::ArgumentMissing("address"))?;
        self.create_channel_with(address, None)
    }

    /// Create a channel to `address`, connecting physically to `via`
    ///
    /// Opens the factory on first use with the binding's open timeout.
    ///
    /// # Arguments
    /// * `address` - Logical destination of messages
    /// * `via` - Transport destination; defaults to `address`'s URI
    pub fn create_channel_with(&self, address: &EndpointAddress, via: Option<&Url>) -> Result<Arc<C>> {
        let contract = self.endpoint.contract();
        if contract.requires_duplex() && self.callback.is_none() {
            return Err(ServiceModelError::Configuration(format!(
                "Contract '{}' requires a duplex channel and a callback instance",
                contract.name()
            )));
        }

        self.ensure_opened()?;

        let via = via.unwrap_or_else(|| address.uri());
        if let Some(binding) = self.endpoint.binding() {
            if via.scheme() != binding.scheme() {
                return Err(ServiceModelError::Configuration(format!(
                    "Scheme '{}' does not match binding '{}' (expected '{}')",
                    via.scheme(),
                    binding.name(),
                    binding.scheme()
                )));
            }
        }

        let inner = self.inner.lock().clone().ok_or_else(|| {
            ServiceModelError::ObjectDisposed(format!("{} has no transport", self.lifecycle.label()))
        })?;
        let channel = Arc::new(inner.create_channel(address, via)?);

        let mut channels = self.channels.lock();
        channels.retain(|weak| weak.strong_count() > 0);
        channels.push(Arc::downgrade(&channel));
        debug!("{}: created channel to {} ({} live)", self.lifecycle.label(), address, channels.len());

        Ok(channel)
    }

    /// Number of channels created by this factory that are still alive
    pub fn channel_count(&self) -> usize {
        self.channels
            .lock()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    fn ensure_opened(&self) -> Result<()> {
        if self.lifecycle.state() == CommunicationState::Opened {
            return Ok(());
        }
        let _guard = self.open_lock.lock();
        if self.lifecycle.state() == CommunicationState::Created {
            let hooks = FactoryHooks { factory: self };
            return self.lifecycle.open(&hooks, self.endpoint.timeouts().open);
        }
        self.lifecycle.require_opened()
    }

    fn take_channels(&self) -> Vec<Arc<C>> {
        self.channels
            .lock()
            .drain(..)
            .filter_map(|weak| weak.upgrade())
            .collect()
    }

    fn transport(&self) -> Option<Arc<dyn TransportChannelFactory<C>>> {
        self.inner.lock().clone()
    }
}

impl<C: ClientChannel> std::fmt::Debug for ChannelFactory<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelFactory")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .field("callback", &self.callback)
            .finish()
    }
}

struct FactoryHooks<'a, C: ClientChannel> {
    factory: &'a ChannelFactory<C>,
}

impl<C: ClientChannel> CommunicationHooks for FactoryHooks<'_, C> {
    fn on_opening(&self) -> Result<()> {
        let endpoint = &self.factory.endpoint;
        endpoint.validate()?;
        let binding = endpoint
            .binding()
            .ok_or_else(|| ServiceModelError::Configuration("Endpoint has no binding".to_string()))?;
        let transport = binding.build_channel_factory(endpoint)?;
        *self.factory.inner.lock() = Some(Arc::from(transport));
        Ok(())
    }

    fn on_open(&self, timeout: Duration) -> Result<()> {
        match self.factory.transport() {
            Some(transport) => transport.open(timeout),
            None => Err(ServiceModelError::InvalidOperation(
                "Transport was not built before open".to_string(),
            )),
        }
    }

    fn on_close(&self, timeout: Duration) -> Result<()> {
        let deadline = Deadline::after("close channel factory", timeout);
        let mut first_error = None;

        for channel in self.factory.take_channels() {
            if let Err(e) = deadline.check().and_then(|remaining| channel.close(remaining)) {
                warn!("{}: channel close failed, aborting: {}", self.factory.lifecycle.label(), e);
                channel.abort();
                first_error.get_or_insert(e);
            }
        }

        if let Some(transport) = self.factory.transport() {
            if let Err(e) = deadline.check().and_then(|remaining| transport.close(remaining)) {
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    fn on_abort(&self) {
        for channel in self.factory.take_channels() {
            channel.abort();
        }
        if let Some(transport) = self.factory.transport() {
            transport.abort();
        }
    }
}
