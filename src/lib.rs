//! Work-stealing parallel task scheduler for data-parallel and pinned
//! workloads.
//!
//! Clients submit *task sets*, a logical range `[0, set_size)` executed by a
//! range function, or *pinned tasks*, single callables bound to a specific
//! worker. The scheduler partitions ranges into per-worker lock-free queues,
//! lets idle workers steal from peers, serves a small priority ladder, and
//! offers cooperative waits that keep the calling thread working instead of
//! blocking it.
//!
//! The thread that builds the scheduler is worker 0 and participates in
//! execution through [`TaskScheduler::wait_for`] and
//! [`TaskScheduler::wait_for_all`].
//!
//! ```
//! use std::ops::Range;
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use std::sync::Arc;
//! use taskmill::{Priority, TaskScheduler, TaskSet, TaskState};
//!
//! struct Sum {
//!     state: TaskState,
//!     total: AtomicU64,
//! }
//!
//! impl TaskSet for Sum {
//!     fn state(&self) -> &TaskState {
//!         &self.state
//!     }
//!
//!     fn set_size(&self) -> u32 {
//!         1_000
//!     }
//!
//!     fn execute_range(&self, range: Range<u32>, _worker_id: u32) {
//!         let part: u64 = range.map(u64::from).sum();
//!         self.total.fetch_add(part, Ordering::Relaxed);
//!     }
//! }
//!
//! let scheduler = TaskScheduler::new().unwrap();
//! let task = Arc::new(Sum {
//!     state: TaskState::new(),
//!     total: AtomicU64::new(0),
//! });
//!
//! scheduler.add_task_set(task.clone());
//! scheduler.wait_for(task.state().completion(), Priority::Low);
//! assert_eq!(task.total.load(Ordering::Relaxed), 499_500);
//! ```

mod builder;
mod context;
mod profiler;
mod scheduler;
mod sync;
mod task;

pub use builder::Builder;
pub use context::worker_id;
pub use profiler::{ProfilerCallback, ProfilerCallbacks};
pub use scheduler::TaskScheduler;
pub use task::{Completion, PinnedState, PinnedTask, Priority, TaskSet, TaskState};
