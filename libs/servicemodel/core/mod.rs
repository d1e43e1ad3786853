//! # Channel Lifecycle Core
//!
//! Communication state machine, endpoint model, channel factories, the shared
//! factory cache and the client proxy façade.
//!
//! ## Example
//!
//! ```rust,ignore
//! use servicemodel::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let manager = Arc::new(ChannelFactoryCacheManager::default());
//! let binding: Arc<dyn Binding<LoopbackChannel>> = Arc::new(LoopbackBinding::new());
//!
//! let client = ClientBase::<LoopbackChannel>::builder(Arc::clone(&manager))
//!     .binding(binding, EndpointAddress::parse("loopback://echo/service")?)
//!     .build()?;
//!
//! let reply = client.channel()?.echo("hello")?;
//! client.close(Duration::from_secs(5))?;
//! ```

pub mod address;
pub mod builder;
pub mod client;
pub mod communication;
pub mod config;
pub mod description;
pub mod endpoint_trait;
pub mod factory;
pub mod factory_ref;
pub mod loopback;
pub mod metrics;
pub mod mru_cache;
pub mod ref_cache;
pub mod registry;
pub mod state;
pub mod timeout;

// Re-export main types
pub use address::{AddressHeader, EndpointAddress};
pub use builder::{states, ClientBaseBuilder};
pub use client::ClientBase;
pub use communication::CommunicationObject;
pub use config::{CacheConfig, CacheSetting, ConfigError, EndpointConfig, ServiceModelConfig};
pub use description::{ContractDescription, OperationDescription, ServiceEndpoint, SessionMode};
pub use endpoint_trait::{CallbackInstance, EndpointTrait};
pub use factory::ChannelFactory;
pub use factory_ref::ChannelFactoryRef;
pub use loopback::{FaultKind, LoopbackBinding, LoopbackChannel, LoopbackConnect, LoopbackFaults};
pub use metrics::{AtomicCacheMetrics, CacheMetrics};
pub use mru_cache::MruCache;
pub use ref_cache::{CacheGuard, ChannelFactoryRefCache};
pub use registry::{EndpointRegistry, ANY_ENDPOINT};
pub use state::{AtomicCommunicationState, CommunicationState, LifecycleEvent, Transition};
pub use timeout::Deadline;

// Re-export traits for convenience
pub use crate::traits::*;
