//! Transport error types

use std::time::Duration;
use thiserror::Error;

/// Failures that mean the backend was not reached
///
/// Any of these marks the attempt failed and freezes the queue until retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("No connection (status 0)")]
    NoConnection,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Completion dropped before a result was reported")]
    Dropped,

    #[error("Transport error: {0}")]
    Other(String),
}
