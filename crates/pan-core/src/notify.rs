//! Edge-triggered change notification
//!
//! Listeners are single-shot: `notify` drains the listener list, so anything
//! that wants to hear the next change must re-register. A renderer that stops
//! drawing therefore also stops listening.

use parking_lot::Mutex;

use crate::sched::TaskHandle;

pub struct Notifier {
    listeners: Mutex<Vec<TaskHandle>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Register a task for the next change only. Registering the same task
    /// again before the change is a no-op.
    pub fn listen(&self, task: TaskHandle) {
        let mut listeners = self.listeners.lock();
        if !listeners.iter().any(|t| t.id() == task.id()) {
            listeners.push(task);
        }
    }

    /// Fire the change: every registered task is requested once and the
    /// listener list is cleared.
    pub fn notify(&self) {
        let drained: Vec<_> = std::mem::take(&mut *self.listeners.lock());
        for task in drained {
            task.request();
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
