use std::fmt;

/// Callback invoked with the worker index that triggered the event.
pub type ProfilerCallback = Box<dyn Fn(u32) + Send + Sync + 'static>;

/// Optional instrumentation hooks, installed through the
/// [`Builder`](crate::Builder) before worker threads start.
///
/// `thread_start` / `thread_stop` fire on each spawned worker as it enters
/// and leaves its main loop. `wait_start` / `wait_stop` bracket the time a
/// worker spends asleep waiting for new tasks. Unset hooks are skipped.
#[derive(Default)]
pub struct ProfilerCallbacks {
    pub(crate) thread_start: Option<ProfilerCallback>,
    pub(crate) thread_stop: Option<ProfilerCallback>,
    pub(crate) wait_start: Option<ProfilerCallback>,
    pub(crate) wait_stop: Option<ProfilerCallback>,
}

impl ProfilerCallbacks {
    #[inline]
    pub(crate) fn emit_thread_start(&self, worker_id: u32) {
        if let Some(callback) = &self.thread_start {
            callback(worker_id);
        }
    }

    #[inline]
    pub(crate) fn emit_thread_stop(&self, worker_id: u32) {
        if let Some(callback) = &self.thread_stop {
            callback(worker_id);
        }
    }

    #[inline]
    pub(crate) fn emit_wait_start(&self, worker_id: u32) {
        if let Some(callback) = &self.wait_start {
            callback(worker_id);
        }
    }

    #[inline]
    pub(crate) fn emit_wait_stop(&self, worker_id: u32) {
        if let Some(callback) = &self.wait_stop {
            callback(worker_id);
        }
    }
}

impl fmt::Debug for ProfilerCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfilerCallbacks")
            .field("thread_start", &self.thread_start.is_some())
            .field("thread_stop", &self.thread_stop.is_some())
            .field("wait_start", &self.wait_start.is_some())
            .field("wait_stop", &self.wait_stop.is_some())
            .finish()
    }
}
