//! Batch selection

use tracing::debug;

use crate::domain::{ItemState, OperationKind, RequestId};

use super::slot::{InvariantViolation, PassMode, QueueSlot};

/// Select the items that may move from queued (or failed) to in-flight
///
/// The result preserves queue order. Items are never reordered; the scheduler
/// only picks a subset.
///
/// # Normal mode
///
/// 1. Any failed item freezes the queue.
/// 2. An in-flight write is exclusive.
/// 3. Otherwise scan in order: queued reads are admitted; the first queued write
///    stops the scan and is admitted only if nothing before it is in flight or
///    was admitted in this pass.
///
/// # Retry mode
///
/// Every failed item is selected and nothing else is touched.
pub fn compute_next_batch(slots: &[QueueSlot], mode: PassMode) -> Result<Vec<RequestId>, InvariantViolation> {
    debug!(len = slots.len(), ?mode, "compute_next_batch: called");
    let (in_flight_reads, in_flight_writes) = verify_invariants(slots)?;

    if mode == PassMode::RetryOnly {
        let batch: Vec<RequestId> = slots
            .iter()
            .filter(|s| s.state == ItemState::Failed)
            .map(|s| s.id)
            .collect();
        debug!(count = batch.len(), "compute_next_batch: resuming failed items");
        return Ok(batch);
    }

    let failed = slots.iter().filter(|s| s.state == ItemState::Failed).count();
    if failed > 0 {
        debug!(failed, "compute_next_batch: frozen by failed items");
        return Ok(Vec::new());
    }

    if in_flight_writes > 0 {
        debug!("compute_next_batch: write in flight");
        return Ok(Vec::new());
    }

    let mut batch = Vec::new();
    for slot in slots {
        match (slot.state, slot.kind) {
            (ItemState::InFlight, _) => continue,
            (ItemState::Queued, OperationKind::Read) => batch.push(slot.id),
            (ItemState::Queued, OperationKind::Write) => {
                if in_flight_reads == 0 && batch.is_empty() {
                    batch.push(slot.id);
                } else {
                    debug!(id = %slot.id, "compute_next_batch: write waits for earlier reads");
                }
                break;
            }
            // Unreachable: failed items froze the pass above
            (ItemState::Failed, _) => break,
        }
    }

    debug!(count = batch.len(), "compute_next_batch: selected");
    Ok(batch)
}

/// Check the in-flight invariants, returning the in-flight (reads, writes) counts
pub fn verify_invariants(slots: &[QueueSlot]) -> Result<(usize, usize), InvariantViolation> {
    let reads = slots.iter().filter(|s| s.is_in_flight(OperationKind::Read)).count();
    let writes = slots.iter().filter(|s| s.is_in_flight(OperationKind::Write)).count();

    if reads > 0 && writes > 0 {
        return Err(InvariantViolation::ReadsAndWritesInFlight { reads, writes });
    }
    if writes > 1 {
        return Err(InvariantViolation::MultipleWritesInFlight(writes));
    }
    Ok((reads, writes))
}
