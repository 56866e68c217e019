mod pool;
pub(crate) mod shared;
mod worker;

pub(crate) use worker::DEFAULT_SPIN_COUNT;


use std::sync::Arc;

use anyhow::Result;

use crate::builder::Builder;
use crate::context;
use crate::profiler::ProfilerCallbacks;
use crate::task::{Completion, PinnedTask, Priority, TaskSet};
use pool::ThreadPool;
use shared::{Config, Shared};

/// Work-stealing scheduler over a fixed pool of worker threads.
///
/// The thread that builds the scheduler is worker 0 and takes part in
/// execution whenever it calls one of the wait primitives. `num_threads - 1`
/// further workers are spawned; each owns one queue per [`Priority`] and
/// steals from its peers when its own queues run dry.
///
/// Dropping the scheduler stops and joins the workers, discarding any
/// sub-tasks still queued; call [`wait_for_all`](TaskScheduler::wait_for_all)
/// first if queued work must finish.
pub struct TaskScheduler {
    shared: Arc<Shared>,
    pool: ThreadPool,
}

impl TaskScheduler {
    /// Scheduler with one worker per available hardware thread.
    pub fn new() -> Result<Self> {
        Builder::new().build()
    }

    /// Configuration entry point; see [`Builder`].
    pub fn builder() -> Builder {
        Builder::new()
    }

    pub(crate) fn with_config(cfg: Config, profiler: ProfilerCallbacks) -> Result<Self> {
        // The building thread is worker 0, including when an old worker
        // thread builds a replacement scheduler.
        context::set_worker_id(0);

        let shared = Arc::new(Shared::new(cfg, profiler));
        let pool = ThreadPool::spawn(&shared)?;
        Ok(Self { shared, pool })
    }

    /// Number of workers, counting the calling thread.
    pub fn num_task_threads(&self) -> u32 {
        self.shared.num_threads()
    }

    /// The profiler hooks installed at build time.
    pub fn profiler_callbacks(&self) -> &ProfilerCallbacks {
        self.shared.profiler()
    }

    /// Submit a task set: partition its range and publish the pieces on the
    /// calling worker's queue at the task's priority.
    ///
    /// Non-blocking, except that pieces may execute inline on this thread
    /// when the queue is full. Resubmitting a task set before its previous
    /// submission completed restarts its completion count and must be
    /// avoided. Task bodies may themselves submit further task sets.
    pub fn add_task_set(&self, task: Arc<dyn TaskSet>) {
        self.shared.add_task_set(task);
    }

    /// Submit a pinned task to its target worker and wake sleepers.
    ///
    /// # Panics
    ///
    /// Panics if `target_worker` is out of range.
    pub fn add_pinned_task(&self, task: Arc<dyn PinnedTask>) {
        self.shared.add_pinned_task(task);
    }

    /// Drain the calling worker's own pinned lists across all priorities.
    pub fn run_pinned_tasks(&self) {
        self.shared.run_pinned_tasks(context::worker_id());
    }

    /// Make one attempt at each priority from best to `lowest_priority`,
    /// running at most one sub-task. Returns whether one ran.
    pub fn try_run_task(&self, lowest_priority: Priority) -> bool {
        let worker_id = context::worker_id();
        let mut hint = worker_id + 1;
        for priority in 0..=lowest_priority.index() {
            if self.shared.try_run_one_at(worker_id, priority, &mut hint) {
                return true;
            }
        }
        false
    }

    /// Cooperatively wait until `completion` reports done, running queued
    /// sub-tasks at priorities up to `lowest_priority` meanwhile.
    ///
    /// Never sleeps; the caller stays productive the whole time. Obtain the
    /// completion from [`TaskState::completion`](crate::TaskState::completion)
    /// or [`PinnedState::completion`](crate::PinnedState::completion).
    pub fn wait_for(&self, completion: &Completion, lowest_priority: Priority) {
        let worker_id = context::worker_id();
        let mut hint = worker_id + 1;
        while !completion.is_complete() {
            let mut ran = false;
            for priority in 0..=lowest_priority.index() {
                if self.shared.try_run_one_at(worker_id, priority, &mut hint) {
                    ran = true;
                    break;
                }
            }
            if !ran {
                std::hint::spin_loop();
            }
        }
    }

    /// Run tasks until every pipe is drained and every peer worker is
    /// asleep.
    ///
    /// The dual condition keeps this from returning while a peer still
    /// holds a popped sub-task mid-execution.
    pub fn wait_for_all(&self) {
        let worker_id = context::worker_id();
        let mut hint = worker_id + 1;
        let peers = self.shared.num_threads_running().saturating_sub(1);

        let mut have_tasks = true;
        while have_tasks || self.shared.num_threads_waiting() < peers {
            have_tasks = self.shared.try_run_one(worker_id, &mut hint);
            if !have_tasks {
                std::hint::spin_loop();
            }
        }
    }

    /// [`wait_for_all`](TaskScheduler::wait_for_all), then stop and join
    /// every worker. Returns only after the workers have exited.
    pub fn wait_for_all_and_shutdown(self) {
        self.wait_for_all();
        self.pool.shutdown(&self.shared);
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.pool.shutdown(&self.shared);
    }
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("num_threads", &self.num_task_threads())
            .field("running", &self.shared.is_running())
            .finish()
    }
}
