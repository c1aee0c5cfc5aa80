//! Queue controller messages
//!
//! Commands and completion events for the actor pattern.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::{
    CompletionListener, ItemSnapshot, OperationKind, Request, RequestError, RequestId, Response,
};
use crate::scheduler::InvariantViolation;
use crate::transport::TransportError;

use super::handle::RequestToken;

/// Errors from queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    #[error("Request was cancelled before it completed")]
    Cancelled,

    #[error("Queue controller is closed")]
    Closed,

    #[error("Scheduler invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),
}

/// Commands sent to the QueueController actor
pub enum QueueCommand {
    Submit {
        id: RequestId,
        request: Request,
        kind: OperationKind,
        cancelled: Arc<AtomicBool>,
        listener: Option<CompletionListener>,
    },
    Cancel {
        token: RequestToken,
        reply: oneshot::Sender<bool>,
    },
    Retry,
    ListTargets {
        reply: oneshot::Sender<Vec<String>>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<ItemSnapshot>>,
    },
    /// Reply once pending scheduling passes have run
    Settle {
        reply: oneshot::Sender<()>,
    },
    Shutdown,
}

impl fmt::Debug for QueueCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueCommand::Submit {
                id, request, kind, listener, ..
            } => f
                .debug_struct("Submit")
                .field("id", id)
                .field("url", &request.url)
                .field("kind", kind)
                .field("has_listener", &listener.is_some())
                .finish(),
            QueueCommand::Cancel { token, .. } => f.debug_struct("Cancel").field("id", &token.id()).finish(),
            QueueCommand::Retry => write!(f, "Retry"),
            QueueCommand::ListTargets { .. } => write!(f, "ListTargets"),
            QueueCommand::Snapshot { .. } => write!(f, "Snapshot"),
            QueueCommand::Settle { .. } => write!(f, "Settle"),
            QueueCommand::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Outcome of one dispatched attempt, reported by the transport
#[derive(Debug)]
pub struct CompletionEvent {
    pub id: RequestId,
    pub result: Result<Response, TransportError>,
}
