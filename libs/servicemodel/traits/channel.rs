use crate::core::description::ContractDescription;
use crate::core::state::CommunicationState;
use crate::error::Result;
use std::time::Duration;

/// Trait for channels produced by a channel factory
///
/// A channel is itself a communication object: it is opened before use and
/// closed or aborted when the proxy that owns it shuts down. The contract
/// description is static per channel type, so two factories for the same
/// channel type always describe the same contract.
pub trait ClientChannel: Send + Sync + 'static {
    /// Describe the service contract this channel type speaks
    fn contract() -> ContractDescription
    where
        Self: Sized;

    /// Current lifecycle state of the channel
    fn state(&self) -> CommunicationState;

    /// Open the channel
    fn open(&self, timeout: Duration) -> Result<()>;

    /// Close the channel gracefully
    fn close(&self, timeout: Duration) -> Result<()>;

    /// Abort the channel; never fails
    fn abort(&self);
}
