//! Connectivity signalling
//!
//! Connectivity is never stored. The queue counts as disconnected while any
//! item is failed or a resumed attempt is still in flight, and the monitor only
//! fans signals out to whoever is listening.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::domain::{ItemState, RequestItem};

/// Connectivity transitions reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectivitySignal {
    /// The first transport failure while connected
    #[serde(rename = "connection_lost")]
    Lost,
    /// The first resumed attempt that succeeded
    #[serde(rename = "connection_restored")]
    Restored,
}

impl fmt::Display for ConnectivitySignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectivitySignal::Lost => write!(f, "connection_lost"),
            ConnectivitySignal::Restored => write!(f, "connection_restored"),
        }
    }
}

pub type ConnectivityCallback = Arc<dyn Fn(ConnectivitySignal) + Send + Sync>;

/// Fans connectivity signals out to a callback and broadcast subscribers
#[derive(Clone)]
pub struct ConnectivityMonitor {
    callback: Option<ConnectivityCallback>,
    tx: broadcast::Sender<ConnectivitySignal>,
}

impl ConnectivityMonitor {
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "ConnectivityMonitor::new: called");
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { callback: None, tx }
    }

    pub fn with_callback(mut self, callback: ConnectivityCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Receive every signal emitted after subscribing
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectivitySignal> {
        self.tx.subscribe()
    }

    pub fn signal(&self, signal: ConnectivitySignal) {
        match signal {
            ConnectivitySignal::Lost => warn!("Connection lost, queue frozen until retry"),
            ConnectivitySignal::Restored => info!("Connection restored"),
        }
        if let Some(callback) = &self.callback {
            callback(signal);
        }
        // No subscribers is fine
        let _ = self.tx.send(signal);
    }
}

impl fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("has_callback", &self.callback.is_some())
            .field("subscribers", &self.tx.receiver_count())
            .finish()
    }
}

/// Derived connectivity: failed items or unconfirmed resumed attempts
pub(crate) fn is_disconnected<'a>(items: impl IntoIterator<Item = &'a RequestItem>) -> bool {
    items
        .into_iter()
        .any(|item| item.state() == ItemState::Failed || (item.state() == ItemState::InFlight && item.is_resumed()))
}
