use anyhow::Result;

use crate::profiler::{ProfilerCallback, ProfilerCallbacks};
use crate::scheduler::shared::Config;
use crate::scheduler::{DEFAULT_SPIN_COUNT, TaskScheduler};

const DEFAULT_THREAD_NAME_PREFIX: &str = "taskmill";

/// Configures and builds a [`TaskScheduler`].
///
/// ```
/// use taskmill::Builder;
///
/// let scheduler = Builder::new()
///     .num_threads(2)
///     .thread_name_prefix("render")
///     .build()
///     .unwrap();
/// assert_eq!(scheduler.num_task_threads(), 2);
/// ```
pub struct Builder {
    num_threads: Option<u32>,
    spin_count: u32,
    thread_name_prefix: String,
    thread_stack_size: Option<usize>,
    profiler: ProfilerCallbacks,
}

impl Builder {
    pub fn new() -> Self {
        Self {
            num_threads: None,
            spin_count: DEFAULT_SPIN_COUNT,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
            thread_stack_size: None,
            profiler: ProfilerCallbacks::default(),
        }
    }

    /// Total worker count, including the building thread as worker 0.
    ///
    /// Defaults to the available hardware parallelism.
    ///
    /// # Panics
    ///
    /// Panics if `num_threads` is zero.
    pub fn num_threads(mut self, num_threads: u32) -> Self {
        assert!(num_threads > 0, "num_threads cannot be set to 0");
        self.num_threads = Some(num_threads);
        self
    }

    /// Failed attempts a worker tolerates before parking; the default is a
    /// hundred.
    pub fn spin_count(mut self, spin_count: u32) -> Self {
        self.spin_count = spin_count.max(1);
        self
    }

    /// Spawned workers are named `<prefix>-<index>`.
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Stack size in bytes for spawned workers; the platform default when
    /// unset.
    pub fn thread_stack_size(mut self, stack_size: usize) -> Self {
        self.thread_stack_size = Some(stack_size);
        self
    }

    /// Called on each spawned worker as it enters its main loop.
    pub fn on_thread_start(mut self, callback: impl Fn(u32) + Send + Sync + 'static) -> Self {
        self.profiler.thread_start = Some(Box::new(callback) as ProfilerCallback);
        self
    }

    /// Called on each spawned worker right before it exits.
    pub fn on_thread_stop(mut self, callback: impl Fn(u32) + Send + Sync + 'static) -> Self {
        self.profiler.thread_stop = Some(Box::new(callback) as ProfilerCallback);
        self
    }

    /// Called when a worker is about to park waiting for tasks.
    pub fn on_wait_start(mut self, callback: impl Fn(u32) + Send + Sync + 'static) -> Self {
        self.profiler.wait_start = Some(Box::new(callback) as ProfilerCallback);
        self
    }

    /// Called when a parked worker resumes.
    pub fn on_wait_stop(mut self, callback: impl Fn(u32) + Send + Sync + 'static) -> Self {
        self.profiler.wait_stop = Some(Box::new(callback) as ProfilerCallback);
        self
    }

    /// Build the scheduler and spawn its workers.
    pub fn build(self) -> Result<TaskScheduler> {
        let num_threads = self.num_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get() as u32)
                .unwrap_or(1)
        });

        let cfg = Config {
            num_threads,
            spin_count: self.spin_count,
            thread_name_prefix: self.thread_name_prefix,
            thread_stack_size: self.thread_stack_size,
        };
        TaskScheduler::with_config(cfg, self.profiler)
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}
