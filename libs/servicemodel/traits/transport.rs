use crate::core::address::EndpointAddress;
use crate::core::description::ServiceEndpoint;
use crate::error::Result;
use std::time::Duration;
use url::Url;

/// Timeouts a binding applies when the caller does not pass one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingTimeouts {
    pub open: Duration,
    pub close: Duration,
    pub send: Duration,
    pub receive: Duration,
}

impl Default for BindingTimeouts {
    fn default() -> Self {
        Self {
            open: Duration::from_secs(60),
            close: Duration::from_secs(60),
            send: Duration::from_secs(60),
            receive: Duration::from_secs(600),
        }
    }
}

/// Transport-level channel factory built by a binding
///
/// Implementations follow the same open/close/abort contract as a
/// `CommunicationObject`; the owning `ChannelFactory` drives them from its
/// lifecycle hooks and never calls them concurrently with each other.
pub trait TransportChannelFactory<C>: Send + Sync {
    /// Open the transport (may perform network I/O)
    fn open(&self, timeout: Duration) -> Result<()>;

    /// Close the transport gracefully
    fn close(&self, timeout: Duration) -> Result<()>;

    /// Tear the transport down immediately
    fn abort(&self);

    /// Create a channel to `address`, physically connecting to `via`
    fn create_channel(&self, address: &EndpointAddress, via: &Url) -> Result<C>;
}

/// Trait for bindings: the configuration that knows how to build a transport
///
/// A binding instance is shared by reference; endpoint traits compare bindings
/// by identity, so two clients share a cached factory only when they were
/// handed the same `Arc`.
pub trait Binding<C>: Send + Sync {
    /// Binding name used in configuration files
    fn name(&self) -> &str;

    /// URI scheme this binding's transport accepts (e.g. "http", "net.tcp")
    fn scheme(&self) -> &str;

    /// Default timeouts for factories and channels built from this binding
    fn timeouts(&self) -> BindingTimeouts {
        BindingTimeouts::default()
    }

    /// Build the transport channel factory for an endpoint
    ///
    /// # Returns
    /// * `Ok(factory)` - Unopened transport factory
    /// * `Err(ServiceModelError::Configuration)` - Endpoint cannot be served by this binding
    fn build_channel_factory(
        &self,
        endpoint: &ServiceEndpoint<C>,
    ) -> Result<Box<dyn TransportChannelFactory<C>>>;
}
