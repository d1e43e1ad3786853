use crate::error::Result;
use std::time::Duration;

/// Trait for the work performed at each lifecycle transition
///
/// A `CommunicationObject` owns the state machine; the component that embeds
/// it supplies these hooks. The object calls them in order and moves its state
/// between calls, so implementations never touch the state themselves.
///
/// Open runs `on_opening` → `on_open` → `on_opened`.
/// Close runs `on_closing` → `on_close` → `on_closed`.
/// Abort runs `on_abort` → `on_closed`.
pub trait CommunicationHooks: Send + Sync {
    /// Prepare for opening (validation, building inner resources)
    fn on_opening(&self) -> Result<()> {
        Ok(())
    }

    /// Perform the open
    ///
    /// # Arguments
    /// * `timeout` - Time left from the caller's open timeout
    fn on_open(&self, timeout: Duration) -> Result<()>;

    /// Called once the object reached `Opened`
    fn on_opened(&self) {}

    /// Called before a graceful close starts
    fn on_closing(&self) {}

    /// Perform the graceful close
    ///
    /// # Arguments
    /// * `timeout` - Time left from the caller's close timeout
    fn on_close(&self, timeout: Duration) -> Result<()>;

    /// Called once the object reached `Closed`, gracefully or through abort
    fn on_closed(&self) {}

    /// Tear down immediately. Must not fail.
    fn on_abort(&self);

    /// Called once when the object enters `Faulted`
    fn on_faulted(&self) {}
}

/// Hooks that do nothing; for objects with no resources of their own
pub struct NoOpHooks;

impl CommunicationHooks for NoOpHooks {
    fn on_open(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    fn on_close(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    fn on_abort(&self) {}
}

type TimedHook = Box<dyn Fn(Duration) -> Result<()> + Send + Sync>;
type PlainHook = Box<dyn Fn() + Send + Sync>;

/// Hooks assembled from closures
///
/// Any hook left unset behaves like `NoOpHooks`.
///
/// # Example
/// ```ignore
/// let hooks = FnHooks::new()
///     .on_open(|timeout| transport.connect(timeout))
///     .on_close(|timeout| transport.shutdown(timeout))
///     .on_abort(|| transport.reset());
/// ```
#[derive(Default)]
pub struct FnHooks {
    open: Option<TimedHook>,
    close: Option<TimedHook>,
    abort: Option<PlainHook>,
}

impl FnHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_open<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) -> Result<()> + Send + Sync + 'static,
    {
        self.open = Some(Box::new(f));
        self
    }

    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) -> Result<()> + Send + Sync + 'static,
    {
        self.close = Some(Box::new(f));
        self
    }

    pub fn on_abort<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.abort = Some(Box::new(f));
        self
    }
}

impl CommunicationHooks for FnHooks {
    fn on_open(&self, timeout: Duration) -> Result<()> {
        self.open.as_ref().map_or(Ok(()), |f| f(timeout))
    }

    fn on_close(&self, timeout: Duration) -> Result<()> {
        self.close.as_ref().map_or(Ok(()), |f| f(timeout))
    }

    fn on_abort(&self) {
        if let Some(f) = &self.abort {
            f();
        }
    }
}
