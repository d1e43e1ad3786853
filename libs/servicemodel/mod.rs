//! # ServiceModel
//!
//! Client-side channel lifecycle and channel-factory sharing.
//!
//! ## Features
//!
//! - **Explicit state machine**: Transition table plus a lock-free state cell
//! - **Shared factories**: Ref-counted channel factories in a bounded LRU cache
//! - **Injectable cache manager**: No process-wide statics; one manager per application
//! - **Transient-failure recovery**: Cached factories are invalidated and retried privately
//! - **Type-state builder**: Compile-time guarantee that an endpoint source is set

pub mod traits;
pub mod core;
pub mod manager;

// Re-export all traits
pub use traits::*;

// Re-export core functionality
pub use crate::core::{
    address::{AddressHeader, EndpointAddress},
    builder::{states, ClientBaseBuilder},
    client::ClientBase,
    communication::CommunicationObject,
    config::{CacheConfig, CacheSetting, ConfigError, EndpointConfig, ServiceModelConfig},
    description::{ContractDescription, OperationDescription, ServiceEndpoint, SessionMode},
    endpoint_trait::{CallbackInstance, EndpointTrait},
    factory::ChannelFactory,
    factory_ref::ChannelFactoryRef,
    loopback::{FaultKind, LoopbackBinding, LoopbackChannel, LoopbackConnect, LoopbackFaults},
    metrics::CacheMetrics,
    ref_cache::ChannelFactoryRefCache,
    registry::{EndpointRegistry, ANY_ENDPOINT},
    state::{CommunicationState, LifecycleEvent},
    timeout::Deadline,
};

// Re-export manager
pub use manager::ChannelFactoryCacheManager;
