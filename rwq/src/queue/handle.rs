//! QueueHandle - client interface for the queue controller

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::debug;

use crate::domain::{CompletionListener, ItemSnapshot, Request, RequestId, Response};

use super::connectivity::{ConnectivityMonitor, ConnectivitySignal};
use super::messages::{QueueCommand, QueueError};

/// Identifies a submitted request for cancellation
///
/// The token carries no access to queue internals beyond the cancelled flag,
/// which only the controller ever sets.
#[derive(Debug, Clone)]
pub struct RequestToken {
    id: RequestId,
    cancelled: Arc<AtomicBool>,
}

impl RequestToken {
    fn new(id: RequestId) -> Self {
        Self {
            id,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }
}

/// Outcome of a cancel request
///
/// The cancel is applied in submission order whether or not the receipt is
/// awaited, so listeners may cancel other requests and drop the receipt.
#[derive(Debug)]
pub struct CancelReceipt {
    rx: Option<oneshot::Receiver<bool>>,
}

impl CancelReceipt {
    /// `true` if the request was (or already had been) cancelled
    pub async fn outcome(self) -> Result<bool, QueueError> {
        let rx = self.rx.ok_or(QueueError::Closed)?;
        rx.await.map_err(|_| QueueError::Closed)
    }
}

/// A submitted request whose response can be awaited
#[derive(Debug)]
pub struct PendingResponse {
    token: RequestToken,
    rx: oneshot::Receiver<Response>,
}

impl PendingResponse {
    pub fn token(&self) -> &RequestToken {
        &self.token
    }

    /// Wait for the response
    ///
    /// Resolves to [`QueueError::Cancelled`] if the request is cancelled, its
    /// listener is suppressed by a later `ignore_previous_by_url` submission,
    /// or the controller shuts down first.
    pub async fn wait(self) -> Result<Response, QueueError> {
        debug!(id = %self.token.id(), "PendingResponse::wait: called");
        self.rx.await.map_err(|_| QueueError::Cancelled)
    }
}

/// Handle to send commands to the QueueController
#[derive(Clone)]
pub struct QueueHandle {
    tx: mpsc::UnboundedSender<QueueCommand>,
    sequence: Arc<AtomicU64>,
    monitor: ConnectivityMonitor,
}

impl QueueHandle {
    pub(crate) fn new(
        tx: mpsc::UnboundedSender<QueueCommand>,
        sequence: Arc<AtomicU64>,
        monitor: ConnectivityMonitor,
    ) -> Self {
        Self { tx, sequence, monitor }
    }

    /// Enqueue a request; `listener` runs once with the response of a successful attempt
    ///
    /// Invalid requests are rejected here, before anything is enqueued.
    pub fn submit<F>(&self, request: Request, listener: F) -> Result<RequestToken, QueueError>
    where
        F: FnOnce(Response) + Send + 'static,
    {
        self.enqueue(request, Some(Box::new(listener)))
    }

    /// Enqueue a request nobody listens to
    pub fn submit_without_listener(&self, request: Request) -> Result<RequestToken, QueueError> {
        self.enqueue(request, None)
    }

    /// Enqueue a request and get a future-like handle for its response
    pub fn submit_awaitable(&self, request: Request) -> Result<PendingResponse, QueueError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let token = self.enqueue(
            request,
            Some(Box::new(move |response| {
                // The waiter may have given up
                let _ = reply_tx.send(response);
            })),
        )?;
        Ok(PendingResponse { token, rx: reply_rx })
    }

    fn enqueue(&self, request: Request, listener: Option<CompletionListener>) -> Result<RequestToken, QueueError> {
        debug!(url = %request.url, has_listener = listener.is_some(), "QueueHandle::enqueue: called");
        let kind = request.resolve_kind()?;
        let id = RequestId::new(self.sequence.fetch_add(1, Ordering::Relaxed) + 1);
        let token = RequestToken::new(id);

        self.tx
            .send(QueueCommand::Submit {
                id,
                request,
                kind,
                cancelled: token.flag(),
                listener,
            })
            .map_err(|_| QueueError::Closed)?;

        debug!(%id, %kind, "QueueHandle::enqueue: sent");
        Ok(token)
    }

    /// Cancel a request
    ///
    /// Queued requests and in-flight reads are cancelled; in-flight writes and
    /// failed requests are not. The listener is never invoked for a cancelled request.
    ///
    /// Never await or block on the receipt from inside a listener: listeners run
    /// on the controller task, which would deadlock waiting for itself. Drop the
    /// receipt instead; the cancel still applies before the next pass.
    pub fn cancel(&self, token: &RequestToken) -> CancelReceipt {
        debug!(id = %token.id(), "QueueHandle::cancel: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = self
            .tx
            .send(QueueCommand::Cancel {
                token: token.clone(),
                reply: reply_tx,
            })
            .is_ok();

        CancelReceipt {
            rx: sent.then_some(reply_rx),
        }
    }

    /// Resume failed requests; nothing else is admitted until they succeed
    pub fn retry(&self) -> Result<(), QueueError> {
        debug!("QueueHandle::retry: called");
        self.tx.send(QueueCommand::Retry).map_err(|_| QueueError::Closed)
    }

    /// URLs of every request still in the queue, in queue order
    pub async fn list_queued_targets(&self) -> Result<Vec<String>, QueueError> {
        debug!("QueueHandle::list_queued_targets: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(QueueCommand::ListTargets { reply: reply_tx })
            .map_err(|_| QueueError::Closed)?;
        reply_rx.await.map_err(|_| QueueError::Closed)
    }

    /// Per-item view of the queue, in queue order
    pub async fn snapshot(&self) -> Result<Vec<ItemSnapshot>, QueueError> {
        debug!("QueueHandle::snapshot: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(QueueCommand::Snapshot { reply: reply_tx })
            .map_err(|_| QueueError::Closed)?;
        reply_rx.await.map_err(|_| QueueError::Closed)
    }

    /// Resolve once everything sent so far has been applied and scheduled
    pub async fn settled(&self) -> Result<(), QueueError> {
        debug!("QueueHandle::settled: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(QueueCommand::Settle { reply: reply_tx })
            .map_err(|_| QueueError::Closed)?;
        reply_rx.await.map_err(|_| QueueError::Closed)
    }

    /// Stop the controller; pending requests are dropped without notification
    pub fn shutdown(&self) -> Result<(), QueueError> {
        debug!("QueueHandle::shutdown: called");
        self.tx.send(QueueCommand::Shutdown).map_err(|_| QueueError::Closed)
    }

    pub fn subscribe_connectivity(&self) -> broadcast::Receiver<ConnectivitySignal> {
        self.monitor.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
