//! QueueController - actor that owns the request queue
//!
//! All queue mutation happens on the controller task. Scheduling passes are
//! deferred: after a command or completion is handled the controller drains
//! everything already queued, yields once, drains again, and only then runs
//! the pending passes. Submissions and cancellations made together are
//! therefore reflected before anything is dispatched.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64};

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::{CompletionListener, ItemState, OperationKind, Request, RequestId, RequestItem, Response};
use crate::scheduler::{InvariantViolation, PassMode, QueueSlot, compute_next_batch, verify_invariants};
use crate::transport::{Completion, Transport, TransportError};

use super::config::QueueConfig;
use super::connectivity::{ConnectivityMonitor, ConnectivitySignal, is_disconnected};
use super::handle::{QueueHandle, RequestToken};
use super::messages::{CompletionEvent, QueueCommand, QueueError};

/// Scheduling passes requested since the last run
#[derive(Debug, Default, Clone, Copy)]
struct PendingPasses {
    normal: bool,
    retry: bool,
}

/// The queue controller task
pub struct QueueController {
    config: QueueConfig,
    transport: Arc<dyn Transport>,
    monitor: ConnectivityMonitor,
    rx: mpsc::UnboundedReceiver<QueueCommand>,
    completion_tx: mpsc::UnboundedSender<CompletionEvent>,
    completion_rx: mpsc::UnboundedReceiver<CompletionEvent>,
    /// Insertion order is queue order
    items: Vec<RequestItem>,
    pending: PendingPasses,
    settle_waiters: Vec<oneshot::Sender<()>>,
    shutting_down: bool,
}

impl QueueController {
    /// Create a controller and the first handle to it
    ///
    /// The controller does nothing until [`QueueController::run`] is awaited
    /// or [`QueueController::spawn`] is called.
    pub fn new(config: QueueConfig, transport: Arc<dyn Transport>) -> (Self, QueueHandle) {
        debug!(name = %config.name, "QueueController::new: called");
        let (tx, rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let monitor = ConnectivityMonitor::new(config.connectivity_buffer);
        let handle = QueueHandle::new(tx, Arc::new(AtomicU64::new(0)), monitor.clone());

        let controller = Self {
            config,
            transport,
            monitor,
            rx,
            completion_tx,
            completion_rx,
            items: Vec::new(),
            pending: PendingPasses::default(),
            settle_waiters: Vec::new(),
            shutting_down: false,
        };
        (controller, handle)
    }

    /// Invoke `callback` on every connectivity signal
    pub fn on_connectivity<F>(mut self, callback: F) -> Self
    where
        F: Fn(ConnectivitySignal) + Send + Sync + 'static,
    {
        self.monitor = self.monitor.with_callback(Arc::new(callback));
        self
    }

    /// Run the controller on its own task
    pub fn spawn(self) -> JoinHandle<Result<(), QueueError>> {
        tokio::spawn(self.run())
    }

    /// Run until shutdown, all handles are dropped, or an invariant is violated
    ///
    /// An invariant violation is a scheduler defect; the controller stops
    /// immediately and every handle starts returning [`QueueError::Closed`].
    pub async fn run(mut self) -> Result<(), QueueError> {
        info!(name = %self.config.name, "QueueController started");

        while !self.shutting_down {
            tokio::select! {
                biased;
                Some(event) = self.completion_rx.recv() => self.handle_completion(event),
                command = self.rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("QueueController::run: all handles dropped");
                        self.shutting_down = true;
                    }
                },
            }

            self.drain();
            tokio::task::yield_now().await;
            self.drain();

            if self.shutting_down {
                break;
            }

            if let Err(violation) = self.run_pending_passes() {
                error!(name = %self.config.name, %violation, queue = %self.render(), "Scheduler invariant violated, stopping queue");
                return Err(violation.into());
            }
            self.release_settle_waiters();
        }

        info!(name = %self.config.name, remaining = self.items.len(), "QueueController stopped");
        self.release_settle_waiters();
        Ok(())
    }

    /// Apply every command and completion that is already waiting
    fn drain(&mut self) {
        while !self.shutting_down {
            if let Ok(event) = self.completion_rx.try_recv() {
                self.handle_completion(event);
                continue;
            }
            match self.rx.try_recv() {
                Ok(command) => self.handle_command(command),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("QueueController::drain: all handles dropped");
                    self.shutting_down = true;
                }
            }
        }
    }

    fn handle_command(&mut self, command: QueueCommand) {
        debug!(?command, "QueueController::handle_command: called");
        match command {
            QueueCommand::Submit {
                id,
                request,
                kind,
                cancelled,
                listener,
            } => self.submit(id, request, kind, cancelled, listener),
            QueueCommand::Cancel { token, reply } => {
                let cancelled = self.cancel_token(&token);
                // The caller may have dropped the receipt
                let _ = reply.send(cancelled);
            }
            QueueCommand::Retry => {
                debug!("QueueController::handle_command: retry requested");
                self.pending.retry = true;
            }
            QueueCommand::ListTargets { reply } => {
                let targets = self.items.iter().map(|item| item.url().to_string()).collect();
                let _ = reply.send(targets);
            }
            QueueCommand::Snapshot { reply } => {
                let snapshot = self.items.iter().map(RequestItem::snapshot).collect();
                let _ = reply.send(snapshot);
            }
            QueueCommand::Settle { reply } => self.settle_waiters.push(reply),
            QueueCommand::Shutdown => {
                info!(name = %self.config.name, "QueueController shutdown requested");
                self.shutting_down = true;
            }
        }
    }

    fn submit(
        &mut self,
        id: RequestId,
        request: Request,
        kind: OperationKind,
        cancelled: Arc<AtomicBool>,
        listener: Option<CompletionListener>,
    ) {
        debug!(%id, url = %request.url, %kind, "QueueController::submit: called");

        if request.ignore_previous_by_url {
            let previous: Vec<RequestId> = self
                .items
                .iter()
                .filter(|item| item.url() == request.url)
                .map(RequestItem::id)
                .collect();

            for prev in previous {
                if let Some(pos) = self.position(prev) {
                    self.items[pos].clear_listener();
                }
                let cancelled = self.cancel_item(prev);
                debug!(%prev, cancelled, "QueueController::submit: suppressed previous request");
            }
        }

        self.items.push(RequestItem::new(id, request, kind, cancelled, listener));
        self.pending.normal = true;
    }

    fn cancel_token(&mut self, token: &RequestToken) -> bool {
        if token.is_cancelled() {
            debug!(id = %token.id(), "QueueController::cancel_token: already cancelled");
            return true;
        }
        self.cancel_item(token.id())
    }

    fn cancel_item(&mut self, id: RequestId) -> bool {
        let Some(pos) = self.position(id) else {
            debug!(%id, "QueueController::cancel_item: not in queue");
            return false;
        };

        let item = &mut self.items[pos];
        match (item.state(), item.kind()) {
            (ItemState::Failed, _) => {
                debug!(%id, "QueueController::cancel_item: failed requests resolve only through retry");
                false
            }
            (ItemState::InFlight, OperationKind::Write) => {
                debug!(%id, "QueueController::cancel_item: in-flight write cannot be aborted");
                false
            }
            (ItemState::InFlight, OperationKind::Read) => {
                item.abort();
                self.remove_cancelled(pos);
                true
            }
            (ItemState::Queued, _) => {
                self.remove_cancelled(pos);
                true
            }
        }
    }

    fn remove_cancelled(&mut self, pos: usize) {
        let item = self.items.remove(pos);
        item.mark_cancelled();
        debug!(id = %item.id(), url = %item.url(), "QueueController::remove_cancelled: removed");
        // Dropping the item drops its listener uncalled
        self.pending.normal = true;
    }

    fn handle_completion(&mut self, event: CompletionEvent) {
        let CompletionEvent { id, result } = event;
        debug!(%id, ok = result.is_ok(), "QueueController::handle_completion: called");

        let Some(pos) = self.position(id) else {
            debug!(%id, "QueueController::handle_completion: request no longer queued, ignoring");
            return;
        };
        if self.items[pos].state() != ItemState::InFlight {
            debug!(%id, state = ?self.items[pos].state(), "QueueController::handle_completion: not in flight, ignoring");
            return;
        }

        match result {
            Ok(response) if response.is_no_connection() => self.complete_failure(pos, TransportError::NoConnection),
            Ok(response) => self.complete_success(pos, response),
            Err(error) => self.complete_failure(pos, error),
        }
    }

    fn complete_failure(&mut self, pos: usize, error: TransportError) {
        let was_connected = !is_disconnected(&self.items);
        let item = &mut self.items[pos];
        warn!(id = %item.id(), url = %item.url(), %error, "Request failed to reach the backend, waiting for retry");
        item.mark_failed();

        if was_connected {
            self.monitor.signal(ConnectivitySignal::Lost);
        }
    }

    fn complete_success(&mut self, pos: usize, response: Response) {
        let mut item = self.items.remove(pos);
        debug!(id = %item.id(), status = response.status, "QueueController::complete_success: called");

        if item.is_resumed() {
            for other in &mut self.items {
                other.clear_resumed();
            }
            self.monitor.signal(ConnectivitySignal::Restored);
        }

        if response.is_application_error() && self.config.warn_on_application_error {
            warn!(
                id = %item.id(),
                url = %item.url(),
                status = response.status,
                "Request failed but subsequent requests in the queue continued processing"
            );
        }

        match item.take_listener() {
            Some(listener) => listener(response),
            None => debug!(id = %item.id(), "QueueController::complete_success: no listener"),
        }

        self.pending.normal = true;
    }

    fn run_pending_passes(&mut self) -> Result<(), InvariantViolation> {
        let pending = std::mem::take(&mut self.pending);
        if pending.retry {
            self.run_pass(PassMode::RetryOnly)?;
        }
        if pending.normal {
            self.run_pass(PassMode::Normal)?;
        }
        Ok(())
    }

    fn run_pass(&mut self, mode: PassMode) -> Result<(), InvariantViolation> {
        let slots: Vec<QueueSlot> = self.items.iter().map(QueueSlot::from).collect();
        let batch = compute_next_batch(&slots, mode)?;

        for id in &batch {
            self.dispatch(*id);
        }

        if !batch.is_empty() {
            let slots: Vec<QueueSlot> = self.items.iter().map(QueueSlot::from).collect();
            verify_invariants(&slots)?;
        }

        if self.config.debug_snapshots {
            debug!(name = %self.config.name, ?mode, admitted = batch.len(), queue = %self.render(), "Scheduling pass");
        }
        Ok(())
    }

    fn dispatch(&mut self, id: RequestId) {
        let Some(pos) = self.position(id) else {
            return;
        };
        let resumed = self.items[pos].state() == ItemState::Failed;
        let request = self.items[pos].request().clone();
        debug!(%id, url = %request.url, resumed, "QueueController::dispatch: called");

        let completion = Completion::new(id, self.completion_tx.clone());
        let abort = self.transport.dispatch(request, completion);
        self.items[pos].mark_in_flight(resumed, abort);
    }

    fn release_settle_waiters(&mut self) {
        for waiter in self.settle_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    fn position(&self, id: RequestId) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }

    /// Compact rendering such as `*[R001] *[R002] [W003]`
    fn render(&self) -> String {
        self.items
            .iter()
            .map(|item| item.snapshot().to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::transport::{AbortHandle, NoopAbort};

    /// Transport that records dispatches and never completes on its own
    #[derive(Default)]
    struct Recorder {
        dispatched: Mutex<Vec<(Request, Completion)>>,
    }

    impl Transport for Recorder {
        fn dispatch(&self, request: Request, completion: Completion) -> Box<dyn AbortHandle> {
            self.dispatched.lock().unwrap().push((request, completion));
            Box::new(NoopAbort)
        }
    }

    impl Recorder {
        fn take(&self, url: &str) -> Completion {
            let mut dispatched = self.dispatched.lock().unwrap();
            let pos = dispatched
                .iter()
                .position(|(r, _)| r.url == url)
                .expect("request was dispatched");
            dispatched.remove(pos).1
        }

        fn urls(&self) -> Vec<String> {
            self.dispatched.lock().unwrap().iter().map(|(r, _)| r.url.clone()).collect()
        }
    }

    fn start() -> (QueueHandle, Arc<Recorder>, JoinHandle<Result<(), QueueError>>) {
        let recorder = Arc::new(Recorder::default());
        let (controller, handle) = QueueController::new(QueueConfig::default(), recorder.clone());
        let join = controller.spawn();
        (handle, recorder, join)
    }

    #[tokio::test]
    async fn test_burst_of_submissions_is_scheduled_together() {
        let (handle, recorder, _join) = start();
        handle.submit_without_listener(Request::get("/a")).unwrap();
        handle.submit_without_listener(Request::get("/b")).unwrap();
        handle.submit_without_listener(Request::post("/c")).unwrap();
        handle.settled().await.unwrap();

        assert_eq!(recorder.urls(), vec!["/a", "/b"]);
    }

    #[tokio::test]
    async fn test_cancel_in_same_turn_prevents_dispatch() {
        let (handle, recorder, _join) = start();
        let token = handle.submit_without_listener(Request::get("/a")).unwrap();
        let receipt = handle.cancel(&token);
        handle.settled().await.unwrap();

        assert!(receipt.outcome().await.unwrap());
        assert!(recorder.urls().is_empty());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_completion_for_removed_item_is_ignored() {
        let (handle, recorder, _join) = start();
        let token = handle.submit_without_listener(Request::get("/a")).unwrap();
        handle.settled().await.unwrap();

        assert!(handle.cancel(&token).outcome().await.unwrap());
        recorder.take("/a").fail(TransportError::Dropped);
        handle.settled().await.unwrap();

        // No failure recorded, so the queue is not frozen
        handle.submit_without_listener(Request::get("/b")).unwrap();
        handle.settled().await.unwrap();
        assert_eq!(recorder.urls(), vec!["/b"]);
    }

    #[tokio::test]
    async fn test_shutdown_stops_controller() {
        let (handle, _recorder, join) = start();
        handle.shutdown().unwrap();
        assert!(join.await.unwrap().is_ok());
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_dropping_all_handles_stops_controller() {
        let (handle, _recorder, join) = start();
        drop(handle);
        assert!(join.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_invariant_violation_stops_controller() {
        let recorder = Arc::new(Recorder::default());
        let (mut controller, handle) = QueueController::new(QueueConfig::default(), recorder);
        // Force a read and a write in flight together
        let flag = || Arc::new(AtomicBool::new(false));
        controller.submit(RequestId::new(1), Request::get("/r"), OperationKind::Read, flag(), None);
        controller.submit(RequestId::new(2), Request::post("/w"), OperationKind::Write, flag(), None);
        controller.items[0].mark_in_flight(false, Box::new(NoopAbort));
        controller.items[1].mark_in_flight(false, Box::new(NoopAbort));

        let join = controller.spawn();
        handle.retry().unwrap();

        let result = join.await.unwrap();
        assert!(matches!(
            result,
            Err(QueueError::Invariant(InvariantViolation::ReadsAndWritesInFlight { .. }))
        ));
        assert!(matches!(handle.settled().await, Err(QueueError::Closed)));
    }
}
