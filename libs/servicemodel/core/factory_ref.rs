use crate::core::factory::ChannelFactory;
use crate::core::state::CommunicationState;
use crate::traits::*;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Reference-counted handle to a channel factory shared between clients
///
/// The count starts at 1 for the creator. Every additional holder (another
/// client, or the cache itself) calls `add_ref`; every holder calls `release`
/// exactly once. Whoever sees `release` return `true` owns the factory's
/// teardown and must close or abort it.
pub struct ChannelFactoryRef<C: ClientChannel> {
    factory: Arc<ChannelFactory<C>>,
    ref_count: AtomicUsize,
    created_at: DateTime<Utc>,
}

impl<C: ClientChannel> ChannelFactoryRef<C> {
    pub fn new(factory: ChannelFactory<C>) -> Self {
        Self::from_arc(Arc::new(factory))
    }

    pub fn from_arc(factory: Arc<ChannelFactory<C>>) -> Self {
        Self {
            factory,
            ref_count: AtomicUsize::new(1),
            created_at: Utc::now(),
        }
    }

    /// Register another holder
    ///
    /// # Panics
    /// If called on a handle whose count already reached zero.
    pub fn add_ref(&self) {
        let previous = self.ref_count.fetch_add(1, Ordering::AcqRel);
        assert!(previous > 0, "add_ref on a released ChannelFactoryRef");
    }

    /// Drop one holder
    ///
    /// # Returns
    /// `true` exactly once: when the count goes from 1 to 0
    ///
    /// # Panics
    /// On underflow. A release without a matching reference is a bug in the
    /// caller's bookkeeping and cannot be recovered from.
    pub fn release(&self) -> bool {
        let previous = self
            .ref_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| count.checked_sub(1))
            .unwrap_or_else(|_| panic!("ChannelFactoryRef released more times than referenced"));
        previous == 1
    }

    #[inline]
    pub fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::Acquire)
    }

    pub fn channel_factory(&self) -> &Arc<ChannelFactory<C>> {
        &self.factory
    }

    #[inline]
    pub fn state(&self) -> CommunicationState {
        self.factory.state()
    }

    /// Close the wrapped factory; only after `release` returned `true`
    pub fn close(&self, timeout: Duration) -> Result<()> {
        self.factory.close(timeout)
    }

    /// Abort the wrapped factory; only after `release` returned `true`
    pub fn abort(&self) {
        self.factory.abort();
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl<C: ClientChannel> std::fmt::Debug for ChannelFactoryRef<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelFactoryRef")
            .field("ref_count", &self.ref_count())
            .field("state", &self.state())
            .field("created_at", &self.created_at)
            .finish()
    }
}
