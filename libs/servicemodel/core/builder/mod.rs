pub mod states;

use crate::core::address::EndpointAddress;
use crate::core::client::ClientBase;
use crate::core::config::CacheSetting;
use crate::core::description::ServiceEndpoint;
use crate::core::endpoint_trait::{CallbackInstance, EndpointTrait};
use crate::core::registry::EndpointRegistry;
use crate::manager::ChannelFactoryCacheManager;
use crate::traits::*;
use states::*;
use std::sync::Arc;

enum EndpointSource<C: ClientChannel> {
    Configuration {
        registry: Arc<EndpointRegistry<C>>,
        name: String,
        address: Option<EndpointAddress>,
    },
    Programmatic {
        binding: Arc<dyn Binding<C>>,
        address: EndpointAddress,
    },
    Endpoint(Arc<ServiceEndpoint<C>>),
}

/// Type-state builder for `ClientBase`
///
/// An endpoint source (configuration name, binding and address, or a
/// pre-built endpoint) must be chosen before `build()` is available.
///
/// # Example
/// ```ignore
/// let client = ClientBase::<EchoChannel>::builder(Arc::clone(&manager))
///     .configuration(registry, "echo")
///     .callback(CallbackInstance::new(events))
///     .build()?;
/// ```
pub struct ClientBaseBuilder<C, E>
where
    C: ClientChannel,
    E: EndpointState,
{
    _state: TypeState<E>,
    manager: Arc<ChannelFactoryCacheManager>,
    source: Option<EndpointSource<C>>,
    callback: Option<CallbackInstance>,
    cache_setting: Option<CacheSetting>,
}

impl<C: ClientChannel> ClientBaseBuilder<C, NoEndpoint> {
    /// Create a new builder instance
    pub fn new(manager: Arc<ChannelFactoryCacheManager>) -> Self {
        Self {
            _state: TypeState::new(),
            manager,
            source: None,
            callback: None,
            cache_setting: None,
        }
    }

    fn with_source(self, source: EndpointSource<C>) -> ClientBaseBuilder<C, HasEndpoint> {
        ClientBaseBuilder {
            _state: TypeState::new(),
            manager: self.manager,
            source: Some(source),
            callback: self.callback,
            cache_setting: self.cache_setting,
        }
    }

    /// Use the endpoint configured under `name` (`"*"` for the only one)
    pub fn configuration(
        self,
        registry: Arc<EndpointRegistry<C>>,
        name: impl Into<String>,
    ) -> ClientBaseBuilder<C, HasEndpoint> {
        self.with_source(EndpointSource::Configuration {
            registry,
            name: name.into(),
            address: None,
        })
    }

    /// Use the endpoint configured under `name`, sending to `address` instead
    pub fn configuration_with_address(
        self,
        registry: Arc<EndpointRegistry<C>>,
        name: impl Into<String>,
        address: EndpointAddress,
    ) -> ClientBaseBuilder<C, HasEndpoint> {
        self.with_source(EndpointSource::Configuration {
            registry,
            name: name.into(),
            address: Some(address),
        })
    }

    /// Use an explicit binding and remote address
    pub fn binding(self, binding: Arc<dyn Binding<C>>, address: EndpointAddress) -> ClientBaseBuilder<C, HasEndpoint> {
        self.with_source(EndpointSource::Programmatic { binding, address })
    }

    /// Use a pre-built endpoint
    pub fn service_endpoint(self, endpoint: Arc<ServiceEndpoint<C>>) -> ClientBaseBuilder<C, HasEndpoint> {
        self.with_source(EndpointSource::Endpoint(endpoint))
    }
}

// Optional configuration methods
impl<C, E> ClientBaseBuilder<C, E>
where
    C: ClientChannel,
    E: EndpointState,
{
    /// Callback instance for duplex contracts
    ///
    /// Part of the cache key: clients share a factory only when they pass
    /// the same instance.
    pub fn callback(mut self, callback: CallbackInstance) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Cache setting for `C`; fails at `build()` if `C` already uses another
    pub fn cache_setting(mut self, setting: CacheSetting) -> Self {
        self.cache_setting = Some(setting);
        self
    }
}

// Build method - only available once an endpoint source is set
impl<C: ClientChannel> ClientBaseBuilder<C, HasEndpoint> {
    pub fn build(self) -> Result<ClientBase<C>> {
        if let Some(setting) = self.cache_setting {
            self.manager.set_cache_setting::<C>(setting)?;
        }

        let callback = self.callback;
        let endpoint_trait = match self.source.ok_or(ServiceModelError::ArgumentMissing("endpoint"))? {
            EndpointSource::Configuration {
                registry,
                name,
                address,
            } => EndpointTrait::configuration(registry, name, address, callback),
            EndpointSource::Programmatic { binding, address } => {
                EndpointTrait::programmatic(binding, address, callback)
            }
            EndpointSource::Endpoint(endpoint) => EndpointTrait::endpoint(endpoint, callback),
        };

        ClientBase::new(&self.manager, endpoint_trait)
    }
}
