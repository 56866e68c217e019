use std::sync::Arc;

use tracing::trace;

use crate::context;
use crate::scheduler::shared::Shared;

/// Failed attempts tolerated before a worker enters the sleep protocol.
pub(crate) const DEFAULT_SPIN_COUNT: u32 = 100;

/// Pause cycles per failed attempt while backing off.
const SPIN_BACKOFF_MULTIPLIER: u32 = 10;

/// Main loop for spawned workers.
///
/// Repeats: run one sub-task (pinned work first, local pipe, then steal);
/// on failure back off with a growing busy-wait, and after enough misses
/// park on the new-task event. Exits when the scheduler clears its running
/// flag.
pub(super) fn worker_main(shared: Arc<Shared>, worker_id: u32) {
    context::set_worker_id(worker_id);
    shared.profiler().emit_thread_start(worker_id);
    trace!(worker_id, "task worker started");

    let mut spin_count = 0u32;
    let mut hint = worker_id + 1;
    while shared.is_running() {
        if shared.try_run_one(worker_id, &mut hint) {
            spin_count = 0;
        } else {
            spin_count += 1;
            if spin_count > shared.cfg().spin_count {
                shared.wait_for_tasks(worker_id);
                spin_count = 0;
            } else {
                spin_wait(spin_count * SPIN_BACKOFF_MULTIPLIER);
            }
        }
    }

    shared.worker_exited();
    shared.profiler().emit_thread_stop(worker_id);
    trace!(worker_id, "task worker stopped");
}

#[inline]
fn spin_wait(pause_cycles: u32) {
    for _ in 0..pause_cycles {
        std::hint::spin_loop();
    }
}
