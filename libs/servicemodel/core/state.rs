//! Communication state machine: states, transitions and the atomic state cell.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a communication object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommunicationState {
    Created = 0,
    Opening = 1,
    Opened = 2,
    Closing = 3,
    Closed = 4,
    Faulted = 5,
}

impl CommunicationState {
    #[inline]
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Opening,
            2 => Self::Opened,
            3 => Self::Closing,
            4 => Self::Closed,
            _ => Self::Faulted,
        }
    }

    /// `Closed` is the only state nothing can leave
    #[inline]
    pub fn is_terminal(self) -> bool {
        self == Self::Closed
    }

    /// `Closing`, `Closed` or `Faulted`: the object can no longer be opened or used
    #[inline]
    pub fn is_disposed(self) -> bool {
        matches!(self, Self::Closing | Self::Closed | Self::Faulted)
    }
}

impl fmt::Display for CommunicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "Created",
            Self::Opening => "Opening",
            Self::Opened => "Opened",
            Self::Closing => "Closing",
            Self::Closed => "Closed",
            Self::Faulted => "Faulted",
        };
        f.write_str(name)
    }
}

/// Inputs to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    BeginOpen,
    CompleteOpen,
    BeginClose,
    CompleteClose,
    Fault,
    Abort,
}

/// Observable lifecycle events, one per entered state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Opening,
    Opened,
    Closing,
    Closed,
    Faulted,
}

/// Transition table
///
/// Returns `None` when `transition` is not legal from `from`. Forward moves
/// are strictly monotonic; `Fault` is legal from every non-terminal state
/// except `Faulted` itself, and `Abort` from every state except `Closed`.
pub fn next_state(from: CommunicationState, transition: Transition) -> Option<CommunicationState> {
    use CommunicationState::*;

    match (from, transition) {
        (Created, Transition::BeginOpen) => Some(Opening),
        (Opening, Transition::CompleteOpen) => Some(Opened),
        (Opened, Transition::BeginClose) => Some(Closing),
        (Closing, Transition::CompleteClose) => Some(Closed),
        (Created | Opening | Opened | Closing, Transition::Fault) => Some(Faulted),
        (Created | Opening | Opened | Closing | Faulted, Transition::Abort) => Some(Closed),
        _ => None,
    }
}

/// Lock-free state cell
///
/// Reads never block; transitions are applied with compare-and-swap against
/// the transition table, so two threads racing on the same transition see
/// exactly one winner.
#[derive(Debug)]
pub struct AtomicCommunicationState(AtomicU8);

impl AtomicCommunicationState {
    pub fn new(state: CommunicationState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    #[inline]
    pub fn get(&self) -> CommunicationState {
        CommunicationState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Apply a transition
    ///
    /// # Returns
    /// * `Some((from, to))` - The transition was applied
    /// * `None` - The transition is illegal from the current state
    pub fn apply(&self, transition: Transition) -> Option<(CommunicationState, CommunicationState)> {
        let mut current = self.get();
        loop {
            let next = next_state(current, transition)?;
            match self.0.compare_exchange(
                current as u8,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some((current, next)),
                Err(actual) => current = CommunicationState::from_u8(actual),
            }
        }
    }

    #[inline]
    pub fn is_opened(&self) -> bool {
        self.get() == CommunicationState::Opened
    }
}
