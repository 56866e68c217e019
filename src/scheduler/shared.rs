use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;
use parking_lot::{Condvar, Mutex};

use crate::context;
use crate::profiler::ProfilerCallbacks;
use crate::sync::{PinnedTaskList, Pipe};
use crate::task::{PinnedTask, Priority, SubTask, TaskSet};

/// Submission never seeds more than this many initial chunks, no matter how
/// many workers exist; split-on-pop refines them further.
const MAX_NUM_INITIAL_PARTITIONS: u32 = 8;

pub(crate) type TaskPipe = Pipe<SubTask>;

#[derive(Debug, Clone)]
pub(crate) struct Config {
    pub(crate) num_threads: u32,
    pub(crate) spin_count: u32,
    pub(crate) thread_name_prefix: String,
    pub(crate) thread_stack_size: Option<usize>,
}

/// State shared between the scheduler handle and every worker thread.
///
/// Pipes and pinned lists form a `priority x worker` matrix allocated once
/// at startup; indices alone identify them. Everything here is lock-free
/// except the event mutex, which only guards the condition variable used to
/// park idle workers.
pub(crate) struct Shared {
    cfg: Config,

    /// `pipes[priority][worker]`; each worker owns the front of its pipe,
    /// everyone else steals from the back.
    pipes: Box<[Box<[TaskPipe]>]>,

    /// `pinned[priority][worker]`; multi-writer, drained only by the owner.
    pinned: Box<[Box<[PinnedTaskList]>]>,

    /// Cleared once to stop the worker loops. Re-read continuously, so
    /// relaxed loads suffice.
    running: AtomicBool,

    /// Worker 0 plus every spawned worker still inside its main loop.
    num_threads_running: CachePadded<AtomicU32>,

    /// Workers currently inside the sleep protocol.
    num_threads_waiting: CachePadded<AtomicU32>,

    /// Parked workers wait here for new work; the mutex guards nothing but
    /// the wait itself.
    new_task_event: Condvar,
    event_mutex: Mutex<()>,

    /// Split unit denominators, fixed at startup.
    num_partitions: u32,
    num_initial_partitions: u32,

    profiler: ProfilerCallbacks,
}

impl Shared {
    pub(crate) fn new(cfg: Config, profiler: ProfilerCallbacks) -> Self {
        let num_threads = cfg.num_threads;
        debug_assert!(num_threads >= 1);

        let pipes = (0..Priority::NUM)
            .map(|_| (0..num_threads).map(|_| TaskPipe::new()).collect())
            .collect();
        let pinned = (0..Priority::NUM)
            .map(|_| (0..num_threads).map(|_| PinnedTaskList::new()).collect())
            .collect();

        // Enough split units to refill every other worker's steal window
        // while one runs, seeded with a handful of coarse chunks.
        let (num_partitions, num_initial_partitions) = if num_threads == 1 {
            (1, 1)
        } else {
            (
                num_threads * (num_threads - 1),
                (num_threads - 1).min(MAX_NUM_INITIAL_PARTITIONS),
            )
        };

        Self {
            cfg,
            pipes,
            pinned,
            running: AtomicBool::new(true),
            num_threads_running: CachePadded::new(AtomicU32::new(1)),
            num_threads_waiting: CachePadded::new(AtomicU32::new(0)),
            new_task_event: Condvar::new(),
            event_mutex: Mutex::new(()),
            num_partitions,
            num_initial_partitions,
            profiler,
        }
    }

    #[inline]
    pub(crate) fn cfg(&self) -> &Config {
        &self.cfg
    }

    #[inline]
    pub(crate) fn num_threads(&self) -> u32 {
        self.cfg.num_threads
    }

    #[inline]
    pub(crate) fn profiler(&self) -> &ProfilerCallbacks {
        &self.profiler
    }

    #[inline]
    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Clears the running flag; returns false if it was already cleared.
    pub(crate) fn begin_shutdown(&self) -> bool {
        self.running.swap(false, Ordering::Relaxed)
    }

    pub(crate) fn worker_started(&self) {
        self.num_threads_running.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn worker_exited(&self) {
        self.num_threads_running.fetch_sub(1, Ordering::Release);
    }

    pub(crate) fn num_threads_running(&self) -> u32 {
        self.num_threads_running.load(Ordering::Acquire)
    }

    pub(crate) fn num_threads_waiting(&self) -> u32 {
        self.num_threads_waiting.load(Ordering::Relaxed)
    }

    // ---- Submission ----------------------------------------------------

    /// Partition a task set and publish it from the calling worker's pipe.
    pub(crate) fn add_task_set(&self, task: Arc<dyn TaskSet>) {
        let set_size = task.set_size();
        // A zero minimum would produce empty pieces and never drain.
        let min_range = task.min_range().max(1);

        let state = task.state();
        state.completion().reset();
        state.set_range_to_run((set_size / self.num_partitions).max(min_range));

        let initial_split = (set_size / self.num_initial_partitions).max(min_range);
        let sub_task = SubTask::new(task, 0..set_size);
        self.split_and_add(context::worker_id(), sub_task, initial_split);
    }

    /// Chop `sub_task` into pieces of at most `range_to_split` and push them
    /// onto the calling worker's pipe.
    ///
    /// Each piece bumps the parent's completion count before it becomes
    /// visible in a slot. When the pipe is full the pending piece is shrunk
    /// to the execution granularity and run right here, which guarantees
    /// progress no matter how small the pipe is relative to the submission.
    pub(crate) fn split_and_add(&self, worker_id: u32, mut sub_task: SubTask, range_to_split: u32) {
        debug_assert!(range_to_split > 0);
        let pipe = &self.pipes[sub_task.task.priority().index()][worker_id as usize];

        let mut num_added = 0u32;
        while !sub_task.is_empty() {
            let piece = sub_task.split_off(range_to_split);
            num_added += 1;
            sub_task.task.state().completion().add_one();

            if let Err(mut piece) = pipe.push_front(piece) {
                if num_added > 1 {
                    self.wake();
                }
                num_added = 0;

                // Run inline, but only a split unit's worth; the tail goes
                // back into the pending range so peers can still steal it.
                let range_to_run = piece.task.state().range_to_run();
                if range_to_run < piece.len() {
                    piece.range.end = piece.range.start + range_to_run;
                    sub_task.range.start = piece.range.end;
                }
                piece.run(worker_id);
            }
        }

        self.wake();
    }

    /// Route a pinned task to its target worker's list and wake sleepers.
    pub(crate) fn add_pinned_task(&self, task: Arc<dyn PinnedTask>) {
        let target = task.target_worker();
        assert!(
            target < self.num_threads(),
            "pinned task targets worker {target} but only {} exist",
            self.num_threads()
        );

        task.state().completion().start_one();
        self.pinned[task.priority().index()][target as usize].push(task);
        self.wake();
    }

    // ---- Execution -----------------------------------------------------

    /// One attempt at each priority, best first.
    pub(crate) fn try_run_one(&self, worker_id: u32, hint: &mut u32) -> bool {
        for priority in 0..Priority::NUM {
            if self.try_run_one_at(worker_id, priority, hint) {
                return true;
            }
        }
        false
    }

    /// Try to run one sub-task at `priority`: drain pinned work, pop the
    /// local pipe, then sweep peers starting at the steal hint.
    ///
    /// Returns whether a sub-task ran; pinned work alone does not count, so
    /// an otherwise idle worker still winds down toward sleep.
    pub(crate) fn try_run_one_at(&self, worker_id: u32, priority: usize, hint: &mut u32) -> bool {
        self.run_pinned_tasks_at(worker_id, priority);

        let pipes = &self.pipes[priority];
        let num_threads = self.num_threads();

        let mut donor = worker_id;
        let mut sub_task = pipes[worker_id as usize].pop_front();
        if sub_task.is_none() {
            for step in 0..num_threads {
                let candidate = (*hint + step) % num_threads;
                if candidate == worker_id {
                    continue;
                }
                if let Some(stolen) = pipes[candidate as usize].steal_back() {
                    sub_task = Some(stolen);
                    donor = candidate;
                    break;
                }
            }
        }

        let Some(mut sub_task) = sub_task else {
            return false;
        };
        if donor != worker_id {
            // Sticky steal affinity: keep checking the donor that last had
            // surplus work.
            *hint = donor;
        }

        let range_to_run = sub_task.task.state().range_to_run();
        if range_to_run < sub_task.len() {
            // Carve one execution unit off the front and republish the rest
            // before running, so peers can steal the remainder meanwhile.
            let piece = sub_task.split_off(range_to_run);
            self.split_and_add(worker_id, sub_task, range_to_run);
            piece.run(worker_id);
        } else {
            sub_task.run(worker_id);
        }
        true
    }

    /// Drain the calling worker's pinned lists at every priority.
    pub(crate) fn run_pinned_tasks(&self, worker_id: u32) {
        for priority in 0..Priority::NUM {
            self.run_pinned_tasks_at(worker_id, priority);
        }
    }

    fn run_pinned_tasks_at(&self, worker_id: u32, priority: usize) {
        let list = &self.pinned[priority][worker_id as usize];
        if list.is_empty() {
            return;
        }
        for task in list.take_all() {
            task.execute();
            task.state().completion().finish_one();
        }
    }

    // ---- Sleep / wake --------------------------------------------------

    /// Any queued work visible to `worker_id`: a non-empty pipe anywhere,
    /// or the worker's own pinned lists.
    pub(crate) fn have_tasks(&self, worker_id: u32) -> bool {
        for priority in 0..Priority::NUM {
            if self.pipes[priority].iter().any(|pipe| !pipe.is_empty()) {
                return true;
            }
            if !self.pinned[priority][worker_id as usize].is_empty() {
                return true;
            }
        }
        false
    }

    /// Park until a producer signals new work.
    ///
    /// The waiting count is raised before the recheck, so a producer that
    /// publishes work either sees us waiting or we see its work; combined
    /// with `wake` taking the event mutex before notifying, a wakeup can
    /// never fall between the recheck and the wait.
    pub(crate) fn wait_for_tasks(&self, worker_id: u32) {
        self.num_threads_waiting.fetch_add(1, Ordering::Acquire);

        if !self.have_tasks(worker_id) {
            self.profiler.emit_wait_start(worker_id);
            {
                let mut guard = self.event_mutex.lock();
                if !self.have_tasks(worker_id) {
                    self.new_task_event.wait(&mut guard);
                }
            }
            self.profiler.emit_wait_stop(worker_id);
        }

        self.num_threads_waiting.fetch_sub(1, Ordering::Release);
    }

    /// Signal sleepers that work arrived. Cheap when nobody is waiting.
    pub(crate) fn wake(&self) {
        if self.num_threads_waiting.load(Ordering::Relaxed) > 0 {
            let _guard = self.event_mutex.lock();
            self.new_task_event.notify_all();
        }
    }

    /// Unconditional broadcast, used while tearing the pool down.
    pub(crate) fn notify_all_sleepers(&self) {
        let _guard = self.event_mutex.lock();
        self.new_task_event.notify_all();
    }
}
