//! Thread-local worker identity.
//!
//! Every worker thread records its index here on startup. The thread that
//! builds the scheduler is worker 0, which is also the default, so task
//! submission and the wait primitives work from that thread without any
//! registration step.

use std::cell::Cell;

thread_local! {
    static WORKER_ID: Cell<u32> = const { Cell::new(0) };
}

/// Index of the worker the current thread belongs to.
///
/// Returns 0 on threads that are not scheduler workers; such threads act as
/// worker 0 when they interact with the scheduler.
#[inline]
pub fn worker_id() -> u32 {
    WORKER_ID.with(Cell::get)
}

pub(crate) fn set_worker_id(worker_id: u32) {
    WORKER_ID.with(|id| id.set(worker_id));
}
