use std::ops::Range;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;

/// Priority band for task sets and pinned tasks. Lower bands are always
/// served first: a worker exhausts every `High` queue before it looks at
/// `Normal`, and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Number of priority bands.
    pub const NUM: usize = 3;

    #[inline]
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// Outstanding work counter shared between the scheduler and waiters.
///
/// The count is the number of sub-ranges (or pinned executions) that have
/// been published but have not finished running. It reaches zero exactly
/// once per submission. The decrement after execution uses release ordering
/// and [`Completion::is_complete`] loads with acquire, so an observer that
/// sees zero also sees every write the task body made.
#[derive(Debug, Default)]
pub struct Completion {
    running: AtomicI32,
}

impl Completion {
    pub const fn new() -> Self {
        Self {
            running: AtomicI32::new(0),
        }
    }

    /// True once every published piece of the most recent submission has
    /// finished executing.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.running.load(Ordering::Acquire) == 0
    }

    /// Number of published pieces still outstanding.
    #[inline]
    pub fn running_count(&self) -> i32 {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn reset(&self) {
        self.running.store(0, Ordering::Relaxed);
    }

    pub(crate) fn start_one(&self) {
        self.running.store(1, Ordering::Relaxed);
    }

    /// Acquire pairs with the publication of the piece in a pipe slot.
    pub(crate) fn add_one(&self) {
        self.running.fetch_add(1, Ordering::Acquire);
    }

    /// Release publishes the execution's side effects to anyone observing
    /// the counter hit zero.
    pub(crate) fn finish_one(&self) {
        self.running.fetch_sub(1, Ordering::Release);
    }
}

/// Bookkeeping the scheduler needs inside every task set. Embed one and
/// return it from [`TaskSet::state`].
#[derive(Debug, Default)]
pub struct TaskState {
    completion: Completion,
    // Split unit for this submission, written once in `add_task_set` and
    // read by worker split logic while pieces are in flight.
    range_to_run: AtomicU32,
}

impl TaskState {
    pub const fn new() -> Self {
        Self {
            completion: Completion::new(),
            range_to_run: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn completion(&self) -> &Completion {
        &self.completion
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.completion.is_complete()
    }

    pub(crate) fn set_range_to_run(&self, range_to_run: u32) {
        self.range_to_run.store(range_to_run, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn range_to_run(&self) -> u32 {
        self.range_to_run.load(Ordering::Relaxed)
    }
}

/// Bookkeeping embedded in every pinned task; see [`PinnedTask::state`].
///
/// The completion count is 1 from enqueue until just after `execute`
/// returns.
#[derive(Debug, Default)]
pub struct PinnedState {
    completion: Completion,
}

impl PinnedState {
    pub const fn new() -> Self {
        Self {
            completion: Completion::new(),
        }
    }

    #[inline]
    pub fn completion(&self) -> &Completion {
        &self.completion
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.completion.is_complete()
    }
}

/// A data-parallel submission over the range `[0, set_size)`.
///
/// The scheduler partitions the range, hands slices to workers, and calls
/// [`execute_range`](TaskSet::execute_range) with disjoint sub-ranges whose
/// union is exactly `[0, set_size)`. Execution order across sub-ranges is
/// unspecified.
///
/// `execute_range` must return normally; unwinding out of a task body
/// leaves the scheduler in an unspecified state.
pub trait TaskSet: Send + Sync + 'static {
    /// Scheduler bookkeeping for this task. Implementations usually embed a
    /// [`TaskState`] field and return a reference to it.
    fn state(&self) -> &TaskState;

    /// Total range length.
    fn set_size(&self) -> u32 {
        1
    }

    /// Minimum sub-range length. Partitioning never produces a shorter
    /// piece except when the residual itself is smaller.
    fn min_range(&self) -> u32 {
        1
    }

    fn priority(&self) -> Priority {
        Priority::Normal
    }

    /// The work function. `worker_id` is the executing worker and can be
    /// used to index per-worker scratch space.
    fn execute_range(&self, range: Range<u32>, worker_id: u32);

    /// True once the most recent submission has fully executed.
    fn is_complete(&self) -> bool {
        self.state().is_complete()
    }
}

/// A single-shot callable bound to a specific worker thread.
///
/// `execute` runs exactly once, on the worker named by
/// [`target_worker`](PinnedTask::target_worker).
pub trait PinnedTask: Send + Sync + 'static {
    /// Scheduler bookkeeping; implementations embed a [`PinnedState`].
    fn state(&self) -> &PinnedState;

    /// Index of the worker this task must run on, in `[0, num_task_threads)`.
    fn target_worker(&self) -> u32;

    fn priority(&self) -> Priority {
        Priority::Normal
    }

    fn execute(&self);

    fn is_complete(&self) -> bool {
        self.state().is_complete()
    }
}

/// A slice of a task set's range, queued in a pipe slot.
pub(crate) struct SubTask {
    pub(crate) task: Arc<dyn TaskSet>,
    pub(crate) range: Range<u32>,
}

impl SubTask {
    pub(crate) fn new(task: Arc<dyn TaskSet>, range: Range<u32>) -> Self {
        Self { task, range }
    }

    #[inline]
    pub(crate) fn len(&self) -> u32 {
        self.range.end - self.range.start
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.range.start == self.range.end
    }

    /// Carves a piece of at most `range_to_split` off the front, advancing
    /// this sub-task past it.
    pub(crate) fn split_off(&mut self, range_to_split: u32) -> SubTask {
        let take = range_to_split.min(self.len());
        let piece = SubTask {
            task: Arc::clone(&self.task),
            range: self.range.start..self.range.start + take,
        };
        self.range.start += take;
        piece
    }

    /// Executes the slice and retires it from the parent's completion count.
    pub(crate) fn run(self, worker_id: u32) {
        let SubTask { task, range } = self;
        task.execute_range(range, worker_id);
        task.state().completion().finish_one();
    }
}
