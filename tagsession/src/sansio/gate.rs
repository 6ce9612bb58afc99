//! Single-shot delivery of a session outcome.

use super::types::Outcome;
use crate::error::{Error, InvalidationCause};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Open,
    Delivered,
    Swallowed,
}

/// Accepts at most one outcome per session.
///
/// Expected end-of-session signals from the reader close the gate without
/// producing an outcome. Every later attempt to deliver is dropped.
#[derive(Debug)]
pub struct CompletionGate {
    state: GateState,
    pending: Option<Outcome>,
}

impl CompletionGate {
    pub fn new() -> Self {
        CompletionGate {
            state: GateState::Open,
            pending: None,
        }
    }

    /// Offer an outcome. Returns `false` if the gate was already closed.
    pub fn deliver(&mut self, outcome: Outcome) -> bool {
        if self.state != GateState::Open {
            return false;
        }
        self.state = GateState::Delivered;
        self.pending = Some(outcome);
        true
    }

    /// Close the gate for an invalidation, swallowing expected reader stops.
    pub fn invalidate(&mut self, cause: InvalidationCause) -> bool {
        match cause {
            InvalidationCause::Reader(ref e) if e.is_expected() => {
                if self.state == GateState::Open {
                    self.state = GateState::Swallowed;
                }
                false
            }
            cause => self.deliver(Err(Error::Invalidated(cause))),
        }
    }

    /// Take the delivered outcome, if any. Yields a value at most once.
    pub fn take(&mut self) -> Option<Outcome> {
        self.pending.take()
    }

    pub fn is_closed(&self) -> bool {
        self.state != GateState::Open
    }

    /// `true` if the gate closed without an outcome.
    pub fn is_swallowed(&self) -> bool {
        self.state == GateState::Swallowed
    }
}

impl Default for CompletionGate {
    fn default() -> Self {
        Self::new()
    }
}
