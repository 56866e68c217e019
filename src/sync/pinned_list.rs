//! Lock-free multi-writer list of pinned tasks.
//!
//! Any thread inserts by swinging the head pointer with a CAS; only the
//! owning worker drains, by swapping the whole list out in one atomic
//! exchange and then walking it. Tasks come back in LIFO order and each
//! task is handed out exactly once.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;

use crate::task::PinnedTask;

struct Node {
    task: Arc<dyn PinnedTask>,
    next: *mut Node,
}

pub(crate) struct PinnedTaskList {
    head: AtomicPtr<Node>,
}

unsafe impl Send for PinnedTaskList {}
unsafe impl Sync for PinnedTaskList {}

impl PinnedTaskList {
    pub(crate) fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Insert at the head. Safe from any thread.
    pub(crate) fn push(&self, task: Arc<dyn PinnedTask>) {
        let node = Box::into_raw(Box::new(Node {
            task,
            next: ptr::null_mut(),
        }));

        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            unsafe { (*node).next = head };
            match self
                .head
                .compare_exchange_weak(head, node, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(current) => head = current,
            }
        }
    }

    /// Detach the whole list and return its tasks, newest first. Only the
    /// owning worker calls this.
    pub(crate) fn take_all(&self) -> TakenTasks {
        TakenTasks {
            head: self.head.swap(ptr::null_mut(), Ordering::Acquire),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire).is_null()
    }
}

impl Drop for PinnedTaskList {
    fn drop(&mut self) {
        // Tasks never executed are discarded with the list.
        drop(self.take_all());
    }
}

/// Draining iterator over a detached list.
pub(crate) struct TakenTasks {
    head: *mut Node,
}

impl Iterator for TakenTasks {
    type Item = Arc<dyn PinnedTask>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.head.is_null() {
            return None;
        }
        let node = unsafe { Box::from_raw(self.head) };
        self.head = node.next;
        Some(node.task)
    }
}

impl Drop for TakenTasks {
    fn drop(&mut self) {
        for task in self {
            drop(task);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::PinnedState;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::thread;

    struct Tagged {
        state: PinnedState,
        tag: u64,
        log: Arc<Mutex<Vec<u64>>>,
    }

    impl PinnedTask for Tagged {
        fn state(&self) -> &PinnedState {
            &self.state
        }

        fn target_worker(&self) -> u32 {
            0
        }

        fn execute(&self) {
            self.log.lock().unwrap().push(self.tag);
        }
    }

    fn tagged(tag: u64, log: &Arc<Mutex<Vec<u64>>>) -> Arc<dyn PinnedTask> {
        Arc::new(Tagged {
            state: PinnedState::new(),
            tag,
            log: Arc::clone(log),
        })
    }

    #[test]
    fn drains_in_lifo_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let list = PinnedTaskList::new();
        for tag in 0..3 {
            list.push(tagged(tag, &log));
        }
        assert!(!list.is_empty());

        for task in list.take_all() {
            task.execute();
        }
        assert_eq!(*log.lock().unwrap(), vec![2, 1, 0]);
        assert!(list.is_empty());
    }

    #[test]
    fn take_all_on_empty_list_yields_nothing() {
        let list = PinnedTaskList::new();
        assert_eq!(list.take_all().count(), 0);
    }

    #[test]
    fn concurrent_pushers_lose_nothing() {
        const PUSHERS: u64 = 4;
        const PER_PUSHER: u64 = 1_000;
        const TOTAL: usize = (PUSHERS * PER_PUSHER) as usize;

        let log = Arc::new(Mutex::new(Vec::new()));
        let list = Arc::new(PinnedTaskList::new());

        let pushers: Vec<_> = (0..PUSHERS)
            .map(|pusher| {
                let list = Arc::clone(&list);
                let log = Arc::clone(&log);
                thread::spawn(move || {
                    for i in 0..PER_PUSHER {
                        list.push(tagged(pusher * PER_PUSHER + i, &log));
                    }
                })
            })
            .collect();

        // Drain concurrently with the pushers, the way the owning worker
        // does, until every task has been seen.
        let mut drained = 0;
        while drained < TOTAL {
            for task in list.take_all() {
                task.execute();
                drained += 1;
            }
        }

        for pusher in pushers {
            pusher.join().unwrap();
        }

        let log = log.lock().unwrap();
        let unique: HashSet<u64> = log.iter().copied().collect();
        assert_eq!(log.len(), TOTAL, "a task was drained twice");
        assert_eq!(unique.len(), TOTAL, "a task was lost");
    }

    #[test]
    fn dropping_the_list_releases_tasks() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let task = Arc::new(Tagged {
            state: PinnedState::new(),
            tag: 0,
            log,
        });
        {
            let list = PinnedTaskList::new();
            list.push(task.clone());
            list.push(task.clone());
            assert_eq!(Arc::strong_count(&task), 3);
        }
        assert_eq!(Arc::strong_count(&task), 1);
    }
}
