//! Request items owned by the queue controller

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::transport::AbortHandle;

use super::request::{OperationKind, Request, Response};

/// Callback invoked once with the response of a successful attempt
pub type CompletionListener = Box<dyn FnOnce(Response) + Send + 'static>;

/// Per-controller sequence number, used for diagnostics and as the lookup key
///
/// Ordering inside the queue is insertion order, never this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

/// Lifecycle state of an item that is still in the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemState {
    /// Waiting for the scheduler to admit it
    Queued,
    /// Dispatched to the transport, awaiting completion
    InFlight,
    /// The last attempt hit a transport failure; only `retry` resumes it
    Failed,
}

/// One pending, in-flight, or failed request
pub struct RequestItem {
    id: RequestId,
    request: Request,
    kind: OperationKind,
    state: ItemState,
    /// The in-flight attempt was started by a retry
    resumed: bool,
    cancelled: Arc<AtomicBool>,
    abort: Option<Box<dyn AbortHandle>>,
    listener: Option<CompletionListener>,
    submitted_at: DateTime<Utc>,
}

impl RequestItem {
    pub(crate) fn new(
        id: RequestId,
        request: Request,
        kind: OperationKind,
        cancelled: Arc<AtomicBool>,
        listener: Option<CompletionListener>,
    ) -> Self {
        Self {
            id,
            request,
            kind,
            state: ItemState::Queued,
            resumed: false,
            cancelled,
            abort: None,
            listener,
            submitted_at: Utc::now(),
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn url(&self) -> &str {
        &self.request.url
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn state(&self) -> ItemState {
        self.state
    }

    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn has_listener(&self) -> bool {
        self.listener.is_some()
    }

    /// Diagnostic label such as `R001` or `W042`
    pub fn label(&self) -> String {
        format!("{}{}", self.kind.label(), self.id)
    }

    /// Move to in-flight; `resumed` marks an attempt started by retry
    pub(crate) fn mark_in_flight(&mut self, resumed: bool, abort: Box<dyn AbortHandle>) {
        debug!(id = %self.id, resumed, "RequestItem::mark_in_flight: called");
        self.state = ItemState::InFlight;
        self.resumed = resumed;
        self.abort = Some(abort);
    }

    pub(crate) fn mark_failed(&mut self) {
        debug!(id = %self.id, "RequestItem::mark_failed: called");
        self.state = ItemState::Failed;
        self.resumed = false;
        self.abort = None;
    }

    /// Connectivity is back; this attempt is no longer a recovery probe
    pub(crate) fn clear_resumed(&mut self) {
        self.resumed = false;
    }

    /// Set once, never reset
    pub(crate) fn mark_cancelled(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Best effort: the transport may still finish the call
    pub(crate) fn abort(&mut self) {
        if let Some(handle) = self.abort.take() {
            debug!(id = %self.id, "RequestItem::abort: aborting in-flight attempt");
            handle.abort();
        }
    }

    pub(crate) fn clear_listener(&mut self) {
        self.listener = None;
    }

    pub(crate) fn take_listener(&mut self) -> Option<CompletionListener> {
        self.listener.take()
    }

    pub fn snapshot(&self) -> ItemSnapshot {
        ItemSnapshot {
            id: self.id,
            kind: self.kind,
            state: self.state,
            url: self.request.url.clone(),
            resumed: self.resumed,
            has_listener: self.listener.is_some(),
            submitted_at: self.submitted_at,
        }
    }
}

impl fmt::Debug for RequestItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestItem")
            .field("id", &self.id)
            .field("url", &self.request.url)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("resumed", &self.resumed)
            .field("cancelled", &self.is_cancelled())
            .field("has_listener", &self.listener.is_some())
            .finish()
    }
}

/// Point-in-time view of a queue entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemSnapshot {
    pub id: RequestId,
    pub kind: OperationKind,
    pub state: ItemState,
    pub url: String,
    pub resumed: bool,
    pub has_listener: bool,
    pub submitted_at: DateTime<Utc>,
}

impl fmt::Display for ItemSnapshot {
    /// `[R001]` for queued, `*[R001]` in flight, `![R001]` failed
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match self.state {
            ItemState::Queued => "",
            ItemState::InFlight => "*",
            ItemState::Failed => "!",
        };
        write!(f, "{}[{}{}]", marker, self.kind.label(), self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::NoopAbort;

    fn item(id: u64, request: Request) -> RequestItem {
        let kind = request.resolve_kind().unwrap();
        RequestItem::new(RequestId::new(id), request, kind, Arc::new(AtomicBool::new(false)), None)
    }

    #[test]
    fn test_request_id_display_is_padded() {
        assert_eq!(RequestId::new(7).to_string(), "007");
        assert_eq!(RequestId::new(1234).to_string(), "1234");
    }

    #[test]
    fn test_new_item_is_queued() {
        let item = item(1, Request::get("/a"));
        assert_eq!(item.state(), ItemState::Queued);
        assert!(!item.is_resumed());
        assert!(!item.is_cancelled());
        assert_eq!(item.label(), "R001");
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut item = item(2, Request::post("/w"));
        item.mark_in_flight(false, Box::new(NoopAbort));
        assert_eq!(item.state(), ItemState::InFlight);

        item.mark_failed();
        assert_eq!(item.state(), ItemState::Failed);

        item.mark_in_flight(true, Box::new(NoopAbort));
        assert!(item.is_resumed());
        item.clear_resumed();
        assert!(!item.is_resumed());
    }

    #[test]
    fn test_cancelled_flag_is_shared() {
        let flag = Arc::new(AtomicBool::new(false));
        let item = RequestItem::new(
            RequestId::new(3),
            Request::get("/a"),
            OperationKind::Read,
            flag.clone(),
            None,
        );
        item.mark_cancelled();
        assert!(flag.load(Ordering::Acquire));
    }

    #[test]
    fn test_listener_can_be_cleared() {
        let mut item = RequestItem::new(
            RequestId::new(4),
            Request::get("/a"),
            OperationKind::Read,
            Arc::new(AtomicBool::new(false)),
            Some(Box::new(|_| {})),
        );
        assert!(item.has_listener());
        item.clear_listener();
        assert!(item.take_listener().is_none());
    }

    #[test]
    fn test_snapshot_rendering() {
        let mut item = item(5, Request::put("/w"));
        assert_eq!(item.snapshot().to_string(), "[W005]");
        item.mark_in_flight(false, Box::new(NoopAbort));
        assert_eq!(item.snapshot().to_string(), "*[W005]");
        item.mark_failed();
        assert_eq!(item.snapshot().to_string(), "![W005]");
    }
}
