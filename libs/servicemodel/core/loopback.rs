//! In-process transport
//!
//! A binding whose "network" is a function call. Every factory and channel it
//! builds reports into a shared `LoopbackFaults`, which also lets callers
//! inject open failures, open latency and channel-creation failures.

use crate::core::address::EndpointAddress;
use crate::core::communication::CommunicationObject;
use crate::core::description::{ContractDescription, ServiceEndpoint};
use crate::core::state::CommunicationState;
use crate::traits::*;
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const LOOPBACK_SCHEME: &str = "loopback";

/// Error class produced by an injected failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultKind {
    #[default]
    Communication,
    Timeout,
    Disposed,
    Configuration,
}

impl FaultKind {
    fn to_error(self, operation: &str) -> ServiceModelError {
        match self {
            Self::Communication => {
                ServiceModelError::Communication(format!("injected failure in {}", operation))
            }
            Self::Timeout => ServiceModelError::timeout(operation, Duration::ZERO),
            Self::Disposed => {
                ServiceModelError::ObjectDisposed(format!("injected failure in {}", operation))
            }
            Self::Configuration => {
                ServiceModelError::Configuration(format!("injected failure in {}", operation))
            }
        }
    }
}

/// Fault switches and counters shared by one binding's factories
#[derive(Debug, Default)]
pub struct LoopbackFaults {
    fail_open: AtomicBool,
    open_delay_ms: AtomicU64,
    fail_channel_close: AtomicBool,
    channel_close_delay_ms: AtomicU64,
    fail_next_creates: AtomicUsize,
    create_fault: Mutex<FaultKind>,
    factories_built: AtomicUsize,
    factories_opened: AtomicUsize,
    factories_closed: AtomicUsize,
    factories_aborted: AtomicUsize,
    channels_created: AtomicUsize,
}

impl LoopbackFaults {
    /// Make every transport open fail with a communication error
    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::Release);
    }

    /// Delay every transport open; a delay longer than the open timeout fails
    pub fn set_open_delay(&self, delay: Duration) {
        self.open_delay_ms.store(delay.as_millis() as u64, Ordering::Release);
    }

    /// Make every channel close fail with a communication error
    pub fn set_fail_channel_close(&self, fail: bool) {
        self.fail_channel_close.store(fail, Ordering::Release);
    }

    /// Delay every channel close; a delay longer than the close timeout fails
    pub fn set_channel_close_delay(&self, delay: Duration) {
        self.channel_close_delay_ms.store(delay.as_millis() as u64, Ordering::Release);
    }

    /// Fail the next `count` channel creations with `kind`
    pub fn fail_next_creates(&self, count: usize, kind: FaultKind) {
        *self.create_fault.lock() = kind;
        self.fail_next_creates.store(count, Ordering::Release);
    }

    pub fn factories_built(&self) -> usize {
        self.factories_built.load(Ordering::Acquire)
    }

    pub fn factories_opened(&self) -> usize {
        self.factories_opened.load(Ordering::Acquire)
    }

    pub fn factories_closed(&self) -> usize {
        self.factories_closed.load(Ordering::Acquire)
    }

    pub fn factories_aborted(&self) -> usize {
        self.factories_aborted.load(Ordering::Acquire)
    }

    pub fn channels_created(&self) -> usize {
        self.channels_created.load(Ordering::Acquire)
    }

    fn open_delay(&self) -> Duration {
        Duration::from_millis(self.open_delay_ms.load(Ordering::Acquire))
    }

    fn channel_close_delay(&self) -> Duration {
        Duration::from_millis(self.channel_close_delay_ms.load(Ordering::Acquire))
    }

    fn take_create_fault(&self) -> Option<FaultKind> {
        self.fail_next_creates
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .ok()
            .map(|_| *self.create_fault.lock())
    }
}

/// Channels the loopback transport can produce
pub trait LoopbackConnect: ClientChannel + Sized {
    fn connect(address: &EndpointAddress, via: &Url, faults: Arc<LoopbackFaults>) -> Self;
}

/// Binding for the `loopback://` scheme
pub struct LoopbackBinding {
    faults: Arc<LoopbackFaults>,
    timeouts: BindingTimeouts,
}

impl LoopbackBinding {
    pub fn new() -> Self {
        Self {
            faults: Arc::new(LoopbackFaults::default()),
            timeouts: BindingTimeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: BindingTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn faults(&self) -> &Arc<LoopbackFaults> {
        &self.faults
    }
}

impl Default for LoopbackBinding {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: LoopbackConnect> Binding<C> for LoopbackBinding {
    fn name(&self) -> &str {
        "loopback"
    }

    fn scheme(&self) -> &str {
        LOOPBACK_SCHEME
    }

    fn timeouts(&self) -> BindingTimeouts {
        self.timeouts
    }

    fn build_channel_factory(
        &self,
        endpoint: &ServiceEndpoint<C>,
    ) -> Result<Box<dyn TransportChannelFactory<C>>> {
        if let Some(address) = endpoint.address() {
            if address.scheme() != LOOPBACK_SCHEME {
                return Err(ServiceModelError::Configuration(format!(
                    "Loopback binding cannot reach '{}'",
                    address
                )));
            }
        }
        self.faults.factories_built.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(LoopbackFactory::<C> {
            faults: Arc::clone(&self.faults),
            _channel: PhantomData,
        }))
    }
}

struct LoopbackFactory<C> {
    faults: Arc<LoopbackFaults>,
    _channel: PhantomData<fn() -> C>,
}

impl<C: LoopbackConnect> TransportChannelFactory<C> for LoopbackFactory<C> {
    fn open(&self, timeout: Duration) -> Result<()> {
        let delay = self.faults.open_delay();
        if delay > timeout {
            std::thread::sleep(timeout);
            return Err(ServiceModelError::timeout("open loopback transport", timeout));
        }
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if self.faults.fail_open.load(Ordering::Acquire) {
            return Err(FaultKind::Communication.to_error("open loopback transport"));
        }
        self.faults.factories_opened.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn close(&self, _timeout: Duration) -> Result<()> {
        self.faults.factories_closed.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn abort(&self) {
        self.faults.factories_aborted.fetch_add(1, Ordering::AcqRel);
    }

    fn create_channel(&self, address: &EndpointAddress, via: &Url) -> Result<C> {
        if let Some(kind) = self.faults.take_create_fault() {
            return Err(kind.to_error("create loopback channel"));
        }
        self.faults.channels_created.fetch_add(1, Ordering::AcqRel);
        Ok(C::connect(address, via, Arc::clone(&self.faults)))
    }
}

/// Request/reply echo channel over the loopback transport
#[derive(Debug)]
pub struct LoopbackChannel {
    lifecycle: CommunicationObject,
    address: EndpointAddress,
    via: Url,
    messages: AtomicU64,
    faults: Arc<LoopbackFaults>,
}

impl LoopbackChannel {
    pub fn address(&self) -> &EndpointAddress {
        &self.address
    }

    pub fn via(&self) -> &Url {
        &self.via
    }

    /// Send `payload` and return the reply; opens the channel on first use
    pub fn echo(&self, payload: &str) -> Result<String> {
        if self.state() == CommunicationState::Created {
            self.open(BindingTimeouts::default().open)?;
        }
        self.lifecycle.require_opened()?;
        self.messages.fetch_add(1, Ordering::Relaxed);
        Ok(payload.to_string())
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages.load(Ordering::Relaxed)
    }
}

impl ClientChannel for LoopbackChannel {
    fn contract() -> ContractDescription {
        ContractDescription::new("IEchoService").with_operation("Echo")
    }

    fn state(&self) -> CommunicationState {
        self.lifecycle.state()
    }

    fn open(&self, timeout: Duration) -> Result<()> {
        self.lifecycle.open(&NoOpHooks, timeout)
    }

    fn close(&self, timeout: Duration) -> Result<()> {
        self.lifecycle.close(&ChannelHooks { faults: &self.faults }, timeout)
    }

    fn abort(&self) {
        self.lifecycle.abort(&NoOpHooks);
    }
}

impl LoopbackConnect for LoopbackChannel {
    fn connect(address: &EndpointAddress, via: &Url, faults: Arc<LoopbackFaults>) -> Self {
        Self {
            lifecycle: CommunicationObject::new(format!("LoopbackChannel({})", address)),
            address: address.clone(),
            via: via.clone(),
            messages: AtomicU64::new(0),
            faults,
        }
    }
}

/// Close behaviour of a loopback channel, driven by the injected faults
struct ChannelHooks<'a> {
    faults: &'a LoopbackFaults,
}

impl CommunicationHooks for ChannelHooks<'_> {
    fn on_open(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    fn on_close(&self, timeout: Duration) -> Result<()> {
        let delay = self.faults.channel_close_delay();
        if delay > timeout {
            std::thread::sleep(timeout);
            return Err(ServiceModelError::timeout("close loopback channel", timeout));
        }
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if self.faults.fail_channel_close.load(Ordering::Acquire) {
            return Err(FaultKind::Communication.to_error("close loopback channel"));
        }
        Ok(())
    }

    fn on_abort(&self) {}
}
