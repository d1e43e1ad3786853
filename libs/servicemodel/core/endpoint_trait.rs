use crate::core::address::EndpointAddress;
use crate::core::description::ServiceEndpoint;
use crate::core::factory::ChannelFactory;
use crate::core::registry::EndpointRegistry;
use crate::traits::*;
use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

#[inline]
fn arc_addr<T: ?Sized>(arc: &Arc<T>) -> usize {
    Arc::as_ptr(arc) as *const () as usize
}

/// Callback object handed to duplex channels
///
/// Compared by identity: two handles are equal only when they point at the
/// same allocation, whatever the contents.
#[derive(Clone)]
pub struct CallbackInstance(Arc<dyn Any + Send + Sync>);

impl CallbackInstance {
    pub fn new<T: Any + Send + Sync>(instance: T) -> Self {
        Self(Arc::new(instance))
    }

    pub fn from_arc<T: Any + Send + Sync>(instance: Arc<T>) -> Self {
        Self(instance)
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    #[inline]
    fn addr(&self) -> usize {
        arc_addr(&self.0)
    }
}

impl PartialEq for CallbackInstance {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for CallbackInstance {}

impl Hash for CallbackInstance {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for CallbackInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CallbackInstance({:#x})", self.addr())
    }
}

/// Cache key identifying "which endpoint configuration" a client uses
///
/// Holds everything needed to build a channel factory but never the factory
/// itself. Equality per variant:
/// - `Configuration`: ordinal name, structural address, same registry
/// - `Programmatic`: same binding instance, structural address
/// - `Endpoint`: same `ServiceEndpoint` instance
///
/// In every variant the callback instance is compared by identity.
pub enum EndpointTrait<C: ClientChannel> {
    Configuration {
        name: String,
        remote_address: Option<EndpointAddress>,
        callback: Option<CallbackInstance>,
        registry: Arc<EndpointRegistry<C>>,
    },
    Programmatic {
        binding: Arc<dyn Binding<C>>,
        remote_address: EndpointAddress,
        callback: Option<CallbackInstance>,
    },
    Endpoint {
        endpoint: Arc<ServiceEndpoint<C>>,
        callback: Option<CallbackInstance>,
    },
}

impl<C: ClientChannel> EndpointTrait<C> {
    pub fn configuration(
        registry: Arc<EndpointRegistry<C>>,
        name: impl Into<String>,
        remote_address: Option<EndpointAddress>,
        callback: Option<CallbackInstance>,
    ) -> Self {
        Self::Configuration {
            name: name.into(),
            remote_address,
            callback,
            registry,
        }
    }

    pub fn programmatic(
        binding: Arc<dyn Binding<C>>,
        remote_address: EndpointAddress,
        callback: Option<CallbackInstance>,
    ) -> Self {
        Self::Programmatic {
            binding,
            remote_address,
            callback,
        }
    }

    pub fn endpoint(endpoint: Arc<ServiceEndpoint<C>>, callback: Option<CallbackInstance>) -> Self {
        Self::Endpoint { endpoint, callback }
    }

    pub fn callback(&self) -> Option<&CallbackInstance> {
        match self {
            Self::Configuration { callback, .. }
            | Self::Programmatic { callback, .. }
            | Self::Endpoint { callback, .. } => callback.as_ref(),
        }
    }

    /// Short variant name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::Programmatic { .. } => "programmatic",
            Self::Endpoint { .. } => "endpoint",
        }
    }

    /// Build a fresh, unopened channel factory for this configuration
    ///
    /// # Returns
    /// * `Ok(factory)` - New factory, not yet shared with anyone
    /// * `Err(ServiceModelError::Configuration)` - The configuration name does not resolve
    pub fn create_channel_factory(&self) -> Result<ChannelFactory<C>> {
        let factory = match self {
            Self::Configuration {
                name,
                remote_address,
                registry,
                ..
            } => {
                let resolved = registry.resolve(name)?;
                let endpoint = match remote_address {
                    Some(address) => Arc::new(resolved.as_ref().clone().with_address(address.clone())),
                    None => resolved,
                };
                ChannelFactory::new(endpoint)
            }
            Self::Programmatic {
                binding,
                remote_address,
                ..
            } => ChannelFactory::with_binding(Arc::clone(binding), remote_address.clone()),
            Self::Endpoint { endpoint, .. } => ChannelFactory::new(Arc::clone(endpoint)),
        };

        Ok(match self.callback() {
            Some(callback) => factory.with_callback(callback.clone()),
            None => factory,
        })
    }
}

impl<C: ClientChannel> PartialEq for EndpointTrait<C> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Configuration {
                    name: n1,
                    remote_address: a1,
                    callback: c1,
                    registry: r1,
                },
                Self::Configuration {
                    name: n2,
                    remote_address: a2,
                    callback: c2,
                    registry: r2,
                },
            ) => n1 == n2 && a1 == a2 && c1 == c2 && arc_addr(r1) == arc_addr(r2),
            (
                Self::Programmatic {
                    binding: b1,
                    remote_address: a1,
                    callback: c1,
                },
                Self::Programmatic {
                    binding: b2,
                    remote_address: a2,
                    callback: c2,
                },
            ) => arc_addr(b1) == arc_addr(b2) && a1 == a2 && c1 == c2,
            (
                Self::Endpoint {
                    endpoint: e1,
                    callback: c1,
                },
                Self::Endpoint {
                    endpoint: e2,
                    callback: c2,
                },
            ) => arc_addr(e1) == arc_addr(e2) && c1 == c2,
            _ => false,
        }
    }
}

impl<C: ClientChannel> Eq for EndpointTrait<C> {}

impl<C: ClientChannel> Hash for EndpointTrait<C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Configuration {
                name,
                remote_address,
                callback,
                registry,
            } => {
                0u8.hash(state);
                name.hash(state);
                remote_address.hash(state);
                callback.hash(state);
                arc_addr(registry).hash(state);
            }
            Self::Programmatic {
                binding,
                remote_address,
                callback,
            } => {
                1u8.hash(state);
                arc_addr(binding).hash(state);
                remote_address.hash(state);
                callback.hash(state);
            }
            Self::Endpoint { endpoint, callback } => {
                2u8.hash(state);
                arc_addr(endpoint).hash(state);
                callback.hash(state);
            }
        }
    }
}

impl<C: ClientChannel> Clone for EndpointTrait<C> {
    fn clone(&self) -> Self {
        match self {
            Self::Configuration {
                name,
                remote_address,
                callback,
                registry,
            } => Self::Configuration {
                name: name.clone(),
                remote_address: remote_address.clone(),
                callback: callback.clone(),
                registry: Arc::clone(registry),
            },
            Self::Programmatic {
                binding,
                remote_address,
                callback,
            } => Self::Programmatic {
                binding: Arc::clone(binding),
                remote_address: remote_address.clone(),
                callback: callback.clone(),
            },
            Self::Endpoint { endpoint, callback } => Self::Endpoint {
                endpoint: Arc::clone(endpoint),
                callback: callback.clone(),
            },
        }
    }
}

impl<C: ClientChannel> fmt::Debug for EndpointTrait<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration {
                name,
                remote_address,
                callback,
                ..
            } => f
                .debug_struct("Configuration")
                .field("name", name)
                .field("remote_address", &remote_address.as_ref().map(|a| a.to_string()))
                .field("callback", callback)
                .finish(),
            Self::Programmatic {
                binding,
                remote_address,
                callback,
            } => f
                .debug_struct("Programmatic")
                .field("binding", &binding.name())
                .field("remote_address", &remote_address.to_string())
                .field("callback", callback)
                .finish(),
            Self::Endpoint { endpoint, callback } => f
                .debug_struct("Endpoint")
                .field("endpoint", endpoint)
                .field("callback", callback)
                .finish(),
        }
    }
}
