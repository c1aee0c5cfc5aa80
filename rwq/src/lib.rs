//! rwqueue - Read/write aware request queue
//!
//! Requests are submitted in order and dispatched through a pluggable
//! transport. Reads run concurrently; a write waits for every earlier read to
//! finish and then runs alone. A transport failure freezes the queue until the
//! caller asks for a retry, and connectivity loss and recovery are signalled
//! once per outage.
//!
//! # Modules
//!
//! - [`domain`] - Requests, responses and queue items
//! - [`scheduler`] - Pure admission decision over the queue state
//! - [`queue`] - Controller actor and its cloneable handle
//! - [`transport`] - Transport seam and the reqwest implementation
//! - [`config`] - Configuration types and loading
//! - [`script`] - Request scripts for the CLI
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod domain;
pub mod queue;
pub mod scheduler;
pub mod script;
pub mod transport;

// Re-export commonly used types
pub use config::{Config, HttpConfig};
pub use domain::{ItemSnapshot, ItemState, OperationKind, Request, RequestError, RequestId, Response};
pub use queue::{
    CancelReceipt, ConnectivitySignal, PendingResponse, QueueConfig, QueueController, QueueError, QueueHandle,
    RequestToken,
};
pub use scheduler::{InvariantViolation, PassMode, compute_next_batch};
pub use transport::{AbortHandle, Completion, HttpTransport, Transport, TransportError};
