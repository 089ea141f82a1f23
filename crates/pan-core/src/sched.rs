//! Coalescing draw scheduler
//!
//! Tasks are requested from anywhere (frame arrival, geometry change) but run
//! at most once per tick: repeated requests before the next tick collapse
//! into a single entry. This bounds render cost to one draw per task per tick
//! regardless of the incoming frame rate.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

/// Identity of a scheduled task, dispatched by the owning widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

struct TaskInner {
    id: TaskId,
    pending: AtomicBool,
    queue: Arc<Mutex<Vec<Arc<TaskInner>>>>,
}

/// Requestable handle to a scheduled task. Cloneable; all clones share the
/// same pending flag.
#[derive(Clone)]
pub struct TaskHandle {
    inner: Arc<TaskInner>,
}

impl TaskHandle {
    /// Mark the task for execution on the next tick. A task already pending
    /// is not enqueued again.
    pub fn request(&self) {
        if !self.inner.pending.swap(true, Ordering::AcqRel) {
            self.inner.queue.lock().push(Arc::clone(&self.inner));
        }
    }

    #[inline]
    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.inner.pending.load(Ordering::Acquire)
    }
}

/// Single-threaded cooperative scheduler. The host loop calls `tick` once per
/// UI tick and dispatches the returned task ids.
pub struct Scheduler {
    queue: Arc<Mutex<Vec<Arc<TaskInner>>>>,
    next_id: AtomicU64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Allocate a new task handle bound to this scheduler.
    pub fn task(&self) -> TaskHandle {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        TaskHandle {
            inner: Arc::new(TaskInner {
                id,
                pending: AtomicBool::new(false),
                queue: Arc::clone(&self.queue),
            }),
        }
    }

    /// Drain all pending tasks in request order, clearing their pending
    /// flags. A task requesting itself during its own dispatch lands in the
    /// next tick.
    pub fn tick(&self) -> Vec<TaskId> {
        let drained: Vec<_> = std::mem::take(&mut *self.queue.lock());
        drained
            .into_iter()
            .map(|task| {
                task.pending.store(false, Ordering::Release);
                task.id
            })
            .collect()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_request_runs_once() {
        let scheduler = Scheduler::new();
        let task = scheduler.task();

        task.request();
        task.request();

        let ran = scheduler.tick();
        assert_eq!(ran, vec![task.id()]);
        assert!(scheduler.is_idle());
    }

    #[test]
    fn test_request_after_tick_runs_again() {
        let scheduler = Scheduler::new();
        let task = scheduler.task();

        task.request();
        assert_eq!(scheduler.tick().len(), 1);

        task.request();
        assert_eq!(scheduler.tick(), vec![task.id()]);
    }

    #[test]
    fn test_tasks_preserve_request_order() {
        let scheduler = Scheduler::new();
        let a = scheduler.task();
        let b = scheduler.task();

        b.request();
        a.request();
        b.request(); // already pending, keeps its slot

        assert_eq!(scheduler.tick(), vec![b.id(), a.id()]);
    }

    #[test]
    fn test_pending_flag() {
        let scheduler = Scheduler::new();
        let task = scheduler.task();
        assert!(!task.is_pending());
        task.request();
        assert!(task.is_pending());
        scheduler.tick();
        assert!(!task.is_pending());
    }
}
