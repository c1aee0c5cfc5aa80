//! Transport adapter seam
//!
//! The queue never performs network calls itself. A [`Transport`] receives a
//! copy of the request payload plus a single-shot [`Completion`] and returns an
//! [`AbortHandle`] for best-effort cancellation.

mod completion;
mod error;
pub mod http;

pub use completion::Completion;
pub use error::TransportError;
pub use http::HttpTransport;

use crate::domain::Request;

/// Best-effort cancellation of an in-flight call
pub trait AbortHandle: Send {
    fn abort(&self);
}

impl AbortHandle for tokio::task::AbortHandle {
    fn abort(&self) {
        tokio::task::AbortHandle::abort(self);
    }
}

/// Abort handle for transports that cannot stop a call once started
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAbort;

impl AbortHandle for NoopAbort {
    fn abort(&self) {}
}

/// Performs requests on behalf of the queue
///
/// `dispatch` must not block. The completion must be reported at most once;
/// dropping it without reporting counts as a transport failure.
pub trait Transport: Send + Sync {
    fn dispatch(&self, request: Request, completion: Completion) -> Box<dyn AbortHandle>;
}
