use crate::core::state::{AtomicCommunicationState, CommunicationState, LifecycleEvent, Transition};
use crate::core::timeout::Deadline;
use crate::traits::*;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// Finite state machine shared by factories and channels
///
/// The embedding component owns one of these and passes its
/// `CommunicationHooks` on every call. State moves through the transition
/// table in `state.rs`; hooks always run outside any lock, so a slow open or
/// close on one object never blocks state reads.
///
/// Every entered state is published once to each subscriber.
pub struct CommunicationObject {
    /// Label used in logs and error messages
    label: String,
    state: AtomicCommunicationState,
    observers: Mutex<Vec<Sender<LifecycleEvent>>>,
}

impl CommunicationObject {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            state: AtomicCommunicationState::new(CommunicationState::Created),
            observers: Mutex::new(Vec::new()),
        }
    }

    #[inline]
    pub fn state(&self) -> CommunicationState {
        self.state.get()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Receive every lifecycle event fired after this call
    pub fn subscribe(&self) -> Receiver<LifecycleEvent> {
        let (tx, rx) = unbounded();
        self.observers.lock().push(tx);
        rx
    }

    fn emit(&self, event: LifecycleEvent) {
        debug!("{}: {:?}", self.label, event);
        // Dropped receivers are pruned on the way
        self.observers.lock().retain(|tx| tx.send(event).is_ok());
    }

    /// Open: `Created → Opening → Opened`
    ///
    /// A no-op when already `Opened`. Any hook failure, including running out
    /// of time, leaves the object `Faulted` and returns the error.
    pub fn open(&self, hooks: &dyn CommunicationHooks, timeout: Duration) -> Result<()> {
        if self.state.apply(Transition::BeginOpen).is_none() {
            return match self.state() {
                CommunicationState::Opened => Ok(()),
                state => Err(self.not_openable(state)),
            };
        }
        self.emit(LifecycleEvent::Opening);

        let deadline = Deadline::after("open", timeout);
        let result = hooks
            .on_opening()
            .and_then(|_| deadline.check())
            .and_then(|remaining| hooks.on_open(remaining));

        if let Err(e) = result {
            warn!("{}: open failed: {}", self.label, e);
            self.fault(hooks);
            return Err(e);
        }

        if self.state.apply(Transition::CompleteOpen).is_none() {
            // Aborted or faulted while the hooks were running
            return Err(self.not_openable(self.state()));
        }
        hooks.on_opened();
        self.emit(LifecycleEvent::Opened);
        Ok(())
    }

    /// Close: `Opened → Closing → Closed`
    ///
    /// Closing a `Closing` or `Closed` object is a no-op. An object that never
    /// finished opening is aborted instead. A failed close aborts and returns
    /// the error, so the object always ends up `Closed`.
    pub fn close(&self, hooks: &dyn CommunicationHooks, timeout: Duration) -> Result<()> {
        loop {
            match self.state() {
                CommunicationState::Created | CommunicationState::Opening => {
                    self.abort(hooks);
                    return Ok(());
                }
                CommunicationState::Closing | CommunicationState::Closed => return Ok(()),
                CommunicationState::Faulted => {
                    self.abort(hooks);
                    return Err(ServiceModelError::Faulted(format!(
                        "{} faulted before close and was aborted",
                        self.label
                    )));
                }
                CommunicationState::Opened => {
                    if self.state.apply(Transition::BeginClose).is_some() {
                        break;
                    }
                    // Lost a race; re-read the state
                }
            }
        }
        self.emit(LifecycleEvent::Closing);
        hooks.on_closing();

        let deadline = Deadline::after("close", timeout);
        let result = deadline.check().and_then(|remaining| hooks.on_close(remaining));

        if let Err(e) = result {
            warn!("{}: close failed, aborting: {}", self.label, e);
            self.abort(hooks);
            return Err(e);
        }

        if self.state.apply(Transition::CompleteClose).is_some() {
            hooks.on_closed();
            self.emit(LifecycleEvent::Closed);
        }
        Ok(())
    }

    /// Abort: drive to `Closed` from any state without waiting
    ///
    /// Idempotent and infallible.
    pub fn abort(&self, hooks: &dyn CommunicationHooks) {
        let Some((from, _)) = self.state.apply(Transition::Abort) else {
            return;
        };
        debug!("{}: aborting from {}", self.label, from);

        if from != CommunicationState::Closing {
            self.emit(LifecycleEvent::Closing);
        }
        hooks.on_abort();
        hooks.on_closed();
        self.emit(LifecycleEvent::Closed);
    }

    /// Enter `Faulted` from any live state; no-op otherwise
    pub fn fault(&self, hooks: &dyn CommunicationHooks) {
        if self.state.apply(Transition::Fault).is_some() {
            hooks.on_faulted();
            self.emit(LifecycleEvent::Faulted);
        }
    }

    /// Error for operations that need an `Opened` object
    pub fn require_opened(&self) -> Result<()> {
        match self.state() {
            CommunicationState::Opened => Ok(()),
            CommunicationState::Created | CommunicationState::Opening => {
                Err(ServiceModelError::InvalidOperation(format!(
                    "{} is not open yet",
                    self.label
                )))
            }
            state => Err(self.not_openable(state)),
        }
    }

    fn not_openable(&self, state: CommunicationState) -> ServiceModelError {
        match state {
            CommunicationState::Closing | CommunicationState::Closed => {
                ServiceModelError::ObjectDisposed(format!("{} is {}", self.label, state))
            }
            CommunicationState::Faulted => {
                ServiceModelError::Faulted(format!("{} is faulted", self.label))
            }
            _ => ServiceModelError::InvalidOperation(format!(
                "{} cannot be opened while {}",
                self.label, state
            )),
        }
    }
}

impl std::fmt::Debug for CommunicationObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommunicationObject")
            .field("label", &self.label)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingHooks {
        opens: AtomicUsize,
        closes: AtomicUsize,
        aborts: AtomicUsize,
        faults: AtomicUsize,
        fail_open: bool,
        fail_close: bool,
    }

    impl CommunicationHooks for CountingHooks {
        fn on_open(&self, _timeout: Duration) -> Result<()> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if self.fail_open {
                return Err(ServiceModelError::Communication("refused".into()));
            }
            Ok(())
        }

        fn on_close(&self, _timeout: Duration) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                return Err(ServiceModelError::timeout("close", Duration::ZERO));
            }
            Ok(())
        }

        fn on_abort(&self) {
            self.aborts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_faulted(&self) {
            self.faults.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn drain(rx: &Receiver<LifecycleEvent>) -> Vec<LifecycleEvent> {
        rx.try_iter().collect()
    }

    #[test]
    fn test_open_twice_is_noop() {
        let object = CommunicationObject::new("test");
        let hooks = CountingHooks::default();
        let events = object.subscribe();

        object.open(&hooks, Duration::from_secs(1)).unwrap();
        object.open(&hooks, Duration::from_secs(1)).unwrap();

        assert_eq!(object.state(), CommunicationState::Opened);
        assert_eq!(hooks.opens.load(Ordering::SeqCst), 1);
        assert_eq!(
            drain(&events),
            vec![LifecycleEvent::Opening, LifecycleEvent::Opened]
        );
    }

    #[test]
    fn test_close_twice_is_noop() {
        let object = CommunicationObject::new("test");
        let hooks = CountingHooks::default();
        object.open(&hooks, Duration::from_secs(1)).unwrap();
        let events = object.subscribe();

        object.close(&hooks, Duration::from_secs(1)).unwrap();
        object.close(&hooks, Duration::from_secs(1)).unwrap();

        assert_eq!(object.state(), CommunicationState::Closed);
        assert_eq!(hooks.closes.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.aborts.load(Ordering::SeqCst), 0);
        assert_eq!(
            drain(&events),
            vec![LifecycleEvent::Closing, LifecycleEvent::Closed]
        );
    }

    #[test]
    fn test_open_failure_faults() {
        let object = CommunicationObject::new("test");
        let hooks = CountingHooks {
            fail_open: true,
            ..Default::default()
        };
        let events = object.subscribe();

        let err = object.open(&hooks, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ServiceModelError::Communication(_)));
        assert_eq!(object.state(), CommunicationState::Faulted);
        assert_eq!(hooks.faults.load(Ordering::SeqCst), 1);
        assert_eq!(
            drain(&events),
            vec![LifecycleEvent::Opening, LifecycleEvent::Faulted]
        );

        // Faulted objects refuse to reopen
        let err = object.open(&hooks, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ServiceModelError::Faulted(_)));
    }

    #[test]
    fn test_open_after_close_is_disposed() {
        let object = CommunicationObject::new("test");
        let hooks = CountingHooks::default();
        object.open(&hooks, Duration::from_secs(1)).unwrap();
        object.close(&hooks, Duration::from_secs(1)).unwrap();

        let err = object.open(&hooks, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ServiceModelError::ObjectDisposed(_)));
    }

    #[test]
    fn test_zero_timeout_open_faults_with_timeout() {
        let object = CommunicationObject::new("test");
        let hooks = CountingHooks::default();

        let err = object.open(&hooks, Duration::ZERO).unwrap_err();
        assert!(matches!(err, ServiceModelError::Timeout { .. }));
        assert_eq!(object.state(), CommunicationState::Faulted);
        assert_eq!(hooks.opens.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_close_failure_aborts() {
        let object = CommunicationObject::new("test");
        let hooks = CountingHooks {
            fail_close: true,
            ..Default::default()
        };
        object.open(&hooks, Duration::from_secs(1)).unwrap();
        let events = object.subscribe();

        let err = object.close(&hooks, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ServiceModelError::Timeout { .. }));
        assert_eq!(object.state(), CommunicationState::Closed);
        assert_eq!(hooks.aborts.load(Ordering::SeqCst), 1);
        assert_eq!(
            drain(&events),
            vec![LifecycleEvent::Closing, LifecycleEvent::Closed]
        );
    }

    #[test]
    fn test_abort_is_idempotent() {
        for open_first in [false, true] {
            let object = CommunicationObject::new("test");
            let hooks = CountingHooks::default();
            if open_first {
                object.open(&hooks, Duration::from_secs(1)).unwrap();
            }
            let events = object.subscribe();

            object.abort(&hooks);
            object.abort(&hooks);
            object.abort(&hooks);

            assert_eq!(object.state(), CommunicationState::Closed);
            assert_eq!(hooks.aborts.load(Ordering::SeqCst), 1);
            assert_eq!(
                drain(&events),
                vec![LifecycleEvent::Closing, LifecycleEvent::Closed]
            );
        }
    }

    #[test]
    fn test_abort_from_faulted() {
        let object = CommunicationObject::new("test");
        let hooks = CountingHooks::default();
        object.fault(&hooks);
        assert_eq!(object.state(), CommunicationState::Faulted);

        object.abort(&hooks);
        assert_eq!(object.state(), CommunicationState::Closed);
    }

    #[test]
    fn test_close_faulted_aborts_and_reports() {
        let object = CommunicationObject::new("test");
        let hooks = CountingHooks::default();
        object.fault(&hooks);

        let err = object.close(&hooks, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ServiceModelError::Faulted(_)));
        assert_eq!(object.state(), CommunicationState::Closed);
        assert_eq!(hooks.aborts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_close_unopened_aborts() {
        let object = CommunicationObject::new("test");
        let hooks = CountingHooks::default();
        object.close(&hooks, Duration::from_secs(1)).unwrap();
        assert_eq!(object.state(), CommunicationState::Closed);
        assert_eq!(hooks.closes.load(Ordering::SeqCst), 0);
        assert_eq!(hooks.aborts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_open_single_on_open() {
        let object = Arc::new(CommunicationObject::new("test"));
        let hooks = Arc::new(CountingHooks::default());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let object = Arc::clone(&object);
                let hooks = Arc::clone(&hooks);
                std::thread::spawn(move || {
                    let _ = object.open(hooks.as_ref(), Duration::from_secs(1));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(hooks.opens.load(Ordering::SeqCst), 1);
        assert_eq!(object.state(), CommunicationState::Opened);
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let object = CommunicationObject::new("test");
        let hooks = NoOpHooks;
        drop(object.subscribe());
        object.open(&hooks, Duration::from_secs(1)).unwrap();
        assert!(object.observers.lock().is_empty());
    }
}
