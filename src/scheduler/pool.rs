use std::sync::Arc;
use std::thread;

use anyhow::{Context as _, Result};
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::scheduler::shared::Shared;
use crate::scheduler::worker::worker_main;

/// Join handles for the spawned workers. Worker 0 is the thread that built
/// the scheduler and never appears here.
pub(super) struct ThreadPool {
    handles: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl ThreadPool {
    /// Spawn workers `1..num_threads`. On failure the already spawned
    /// workers are shut down before the error is returned.
    pub(super) fn spawn(shared: &Arc<Shared>) -> Result<Self> {
        let cfg = shared.cfg();
        let num_threads = cfg.num_threads;

        let mut handles = Vec::with_capacity(num_threads.saturating_sub(1) as usize);
        for worker_id in 1..num_threads {
            let mut builder =
                thread::Builder::new().name(format!("{}-{worker_id}", cfg.thread_name_prefix));
            if let Some(stack_size) = cfg.thread_stack_size {
                builder = builder.stack_size(stack_size);
            }

            // Count the worker before it exists so a stop that races the
            // spawn still waits for it.
            shared.worker_started();
            let spawned = {
                let shared = Arc::clone(shared);
                builder.spawn(move || worker_main(shared, worker_id))
            };

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    shared.worker_exited();
                    let pool = Self {
                        handles: Mutex::new(handles),
                    };
                    pool.shutdown(shared);
                    return Err(e)
                        .with_context(|| format!("failed to spawn task worker {worker_id}"));
                }
            }
        }

        debug!(num_threads, "task worker pool started");
        Ok(Self {
            handles: Mutex::new(handles),
        })
    }

    /// Clear the running flag, keep signalling sleepers until every spawned
    /// worker has left its loop, then join them all.
    pub(super) fn shutdown(&self, shared: &Shared) {
        if !shared.begin_shutdown() {
            return;
        }

        // Keep firing the event so parked workers observe the cleared flag.
        while shared.num_threads_running() > 1 {
            shared.notify_all_sleepers();
            thread::yield_now();
        }

        let mut panicked = 0usize;
        for handle in self.handles.lock().drain(..) {
            if handle.join().is_err() {
                panicked += 1;
            }
        }
        if panicked > 0 {
            error!(panicked, "worker thread(s) panicked before shutdown");
        }
        debug!("task worker pool stopped");
    }
}
