//! # ServiceModel Traits
//!
//! Collaborator contracts consumed by the channel lifecycle core:
//!
//! - **CommunicationHooks**: Per-transition work for a communication object
//! - **ClientChannel**: Channels handed out to client proxies
//! - **Binding / TransportChannelFactory**: Transport construction
//! - **ServiceModelError**: Error taxonomy (transient vs. fatal)

pub mod channel;
pub mod error;
pub mod hooks;
pub mod transport;

// Re-export commonly used types
pub use channel::ClientChannel;
pub use error::{Result, ServiceModelError};
pub use hooks::{CommunicationHooks, FnHooks, NoOpHooks};
pub use transport::{Binding, BindingTimeouts, TransportChannelFactory};
