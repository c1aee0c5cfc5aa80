//! Domain types for the request queue
//!
//! - [`Request`] / [`Response`] - the opaque payload handed to a transport and what comes back
//! - [`OperationKind`] - read or write, the only property the scheduler cares about
//! - [`RequestItem`] - one queued, in-flight, or failed entry owned by the controller

mod item;
mod request;

pub use item::{CompletionListener, ItemSnapshot, ItemState, RequestId, RequestItem};
pub use request::{OperationKind, Request, RequestError, Response};
