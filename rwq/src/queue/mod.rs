//! Queue controller with actor pattern
//!
//! [`QueueController`] owns every request item and runs on a single tokio task.
//! [`QueueHandle`] is the cloneable client side: submissions, cancellations and
//! retries are commands sent over a channel, and scheduling passes run on the
//! controller task after the commands already in flight have been applied.

mod config;
mod connectivity;
mod controller;
mod handle;
mod messages;

pub use config::QueueConfig;
pub use connectivity::{ConnectivityCallback, ConnectivityMonitor, ConnectivitySignal};
pub use controller::QueueController;
pub use handle::{CancelReceipt, PendingResponse, QueueHandle, RequestToken};
pub use messages::{CompletionEvent, QueueCommand, QueueError};
