//! Scheduler input and outcome types

use thiserror::Error;

use crate::domain::{ItemState, OperationKind, RequestId, RequestItem};

/// Which admission rules a scheduling pass applies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassMode {
    /// Regular pass after submit, completion, or cancellation
    Normal,
    /// Explicit retry: resume failed items only
    RetryOnly,
}

/// The scheduler's view of one queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSlot {
    pub id: RequestId,
    pub kind: OperationKind,
    pub state: ItemState,
    /// In flight as a retry of a failed attempt
    pub resumed: bool,
}

impl QueueSlot {
    pub fn new(id: RequestId, kind: OperationKind, state: ItemState) -> Self {
        Self {
            id,
            kind,
            state,
            resumed: false,
        }
    }

    pub fn is_in_flight(&self, kind: OperationKind) -> bool {
        self.state == ItemState::InFlight && self.kind == kind
    }
}

impl From<&RequestItem> for QueueSlot {
    fn from(item: &RequestItem) -> Self {
        Self {
            id: item.id(),
            kind: item.kind(),
            state: item.state(),
            resumed: item.is_resumed(),
        }
    }
}

/// Queue states the scheduler must never produce
///
/// Seeing one of these means admission logic is broken; the controller stops
/// rather than dispatching anything else.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("Cannot have both reads and writes in flight ({reads} reads, {writes} writes)")]
    ReadsAndWritesInFlight { reads: usize, writes: usize },

    #[error("Too many writes in flight: {0}")]
    MultipleWritesInFlight(usize),
}
