//! Common test utilities for servicemodel integration tests
//!
//! Fixtures over the loopback transport plus a duplex test channel.

#![allow(dead_code)]

use servicemodel::*;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn loopback_address(path: &str) -> EndpointAddress {
    EndpointAddress::parse(&format!("loopback://echo/{}", path)).unwrap()
}

/// One manager, one loopback binding and a registry with endpoint "echo"
pub struct Fixture {
    pub manager: Arc<ChannelFactoryCacheManager>,
    pub binding: Arc<LoopbackBinding>,
    pub registry: Arc<EndpointRegistry<LoopbackChannel>>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_watermark(32)
    }

    pub fn with_watermark(watermark: usize) -> Self {
        let binding = Arc::new(LoopbackBinding::new());
        let dyn_binding: Arc<dyn Binding<LoopbackChannel>> = binding.clone();
        let registry = Arc::new(EndpointRegistry::new().with_endpoint("echo", dyn_binding, loopback_address("service")));
        Self {
            manager: Arc::new(ChannelFactoryCacheManager::with_watermark(watermark)),
            binding,
            registry,
        }
    }

    pub fn faults(&self) -> &Arc<LoopbackFaults> {
        self.binding.faults()
    }

    pub fn dyn_binding(&self) -> Arc<dyn Binding<LoopbackChannel>> {
        self.binding.clone()
    }

    /// Trait for the configured "echo" endpoint
    pub fn config_trait(&self, callback: Option<CallbackInstance>) -> EndpointTrait<LoopbackChannel> {
        EndpointTrait::configuration(Arc::clone(&self.registry), "echo", None, callback)
    }

    /// Trait for the shared binding at `loopback://echo/{path}`
    pub fn programmatic_trait(&self, path: &str) -> EndpointTrait<LoopbackChannel> {
        EndpointTrait::programmatic(self.dyn_binding(), loopback_address(path), None)
    }

    /// Client on the configured "echo" endpoint
    pub fn client(&self) -> ClientBase<LoopbackChannel> {
        ClientBase::<LoopbackChannel>::builder(Arc::clone(&self.manager))
            .configuration(Arc::clone(&self.registry), "echo")
            .build()
            .unwrap()
    }

    pub fn client_with_callback(&self, callback: CallbackInstance) -> ClientBase<LoopbackChannel> {
        ClientBase::<LoopbackChannel>::builder(Arc::clone(&self.manager))
            .callback(callback)
            .configuration(Arc::clone(&self.registry), "echo")
            .build()
            .unwrap()
    }

    pub fn entries(&self) -> usize {
        self.manager.entry_count::<LoopbackChannel>()
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.manager.metrics::<LoopbackChannel>()
    }
}

/// Channel for a contract with a callback side; needs a callback instance
#[derive(Debug)]
pub struct DuplexEchoChannel {
    lifecycle: CommunicationObject,
}

impl ClientChannel for DuplexEchoChannel {
    fn contract() -> ContractDescription {
        ContractDescription::new("IDuplexEcho")
            .with_session_mode(SessionMode::Required)
            .with_one_way_operation("Publish")
            .with_callback_contract("IDuplexEchoCallback")
    }

    fn state(&self) -> CommunicationState {
        self.lifecycle.state()
    }

    fn open(&self, timeout: Duration) -> Result<()> {
        self.lifecycle.open(&NoOpHooks, timeout)
    }

    fn close(&self, timeout: Duration) -> Result<()> {
        self.lifecycle.close(&NoOpHooks, timeout)
    }

    fn abort(&self) {
        self.lifecycle.abort(&NoOpHooks);
    }
}

impl LoopbackConnect for DuplexEchoChannel {
    fn connect(address: &EndpointAddress, _via: &Url, _faults: Arc<LoopbackFaults>) -> Self {
        Self {
            lifecycle: CommunicationObject::new(format!("DuplexEchoChannel({})", address)),
        }
    }
}
