//! Single-shot completion reporter handed to transports

use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::{RequestId, Response};
use crate::queue::CompletionEvent;

use super::error::TransportError;

/// Reports the outcome of exactly one dispatched attempt
///
/// Consumed by [`Completion::complete`]. If it is dropped first (the transport
/// task was aborted or panicked) a [`TransportError::Dropped`] is reported
/// instead, so the controller always hears back once.
pub struct Completion {
    id: RequestId,
    tx: Option<mpsc::UnboundedSender<CompletionEvent>>,
}

impl Completion {
    pub(crate) fn new(id: RequestId, tx: mpsc::UnboundedSender<CompletionEvent>) -> Self {
        Self { id, tx: Some(tx) }
    }

    /// The request this completion belongs to
    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn complete(mut self, result: Result<Response, TransportError>) {
        self.report(result);
    }

    pub fn succeed(self, response: Response) {
        self.complete(Ok(response));
    }

    pub fn fail(self, error: TransportError) {
        self.complete(Err(error));
    }

    fn report(&mut self, result: Result<Response, TransportError>) {
        if let Some(tx) = self.tx.take() {
            debug!(id = %self.id, ok = result.is_ok(), "Completion::report: called");
            // The controller may already be gone; nothing left to notify
            let _ = tx.send(CompletionEvent { id: self.id, result });
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self.tx.is_some() {
            debug!(id = %self.id, "Completion::drop: dropped without a result");
            self.report(Err(TransportError::Dropped));
        }
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("id", &self.id)
            .field("reported", &self.tx.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let completion = Completion::new(RequestId::new(1), tx);
        completion.succeed(Response::new(200));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.id, RequestId::new(1));
        assert_eq!(event.result, Ok(Response::new(200)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_drop_reports_failure() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        drop(Completion::new(RequestId::new(2), tx));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.result, Err(TransportError::Dropped));
    }

    #[test]
    fn test_closed_controller_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        Completion::new(RequestId::new(3), tx).fail(TransportError::NoConnection);
    }
}
