//! Admission scheduler for the request queue
//!
//! Decides, from the current queue state alone, which queued items may move to
//! in-flight. Reads run concurrently with each other; a write waits until no
//! read before it is outstanding and then runs alone. Any failed item freezes
//! admission until an explicit retry.

mod core;
mod slot;

pub use core::{compute_next_batch, verify_invariants};
pub use slot::{InvariantViolation, PassMode, QueueSlot};
