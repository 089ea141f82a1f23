//! Runtime configuration cells
//!
//! A `Cell` is a readable value with an edge-triggered notifier: readers that
//! want to react to the next write register a task via `notifier().listen`.

use parking_lot::RwLock;

use crate::notify::Notifier;

pub struct Cell<T: Copy> {
    value: RwLock<T>,
    notifier: Notifier,
}

impl<T: Copy> Cell<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: RwLock::new(value),
            notifier: Notifier::new(),
        }
    }

    #[inline]
    pub fn get(&self) -> T {
        *self.value.read()
    }

    pub fn set(&self, value: T) {
        *self.value.write() = value;
        self.notifier.notify();
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }
}

/// Monitor-level knobs, owned by the widget layer and shared with both
/// renderers.
pub struct MonitorConfig {
    /// Exponential averaging factor, in (0, 1].
    pub averaging_alpha: Cell<f32>,
    /// Attempt GPU rendering; a false value forces the rasterizer path.
    pub use_gpu: Cell<bool>,
    /// Use float history textures when the device allows it.
    pub use_float_textures: Cell<bool>,
    /// Vertical proportion given to the spectrum plot, in (0, 1).
    pub spectrum_split: Cell<f32>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            averaging_alpha: Cell::new(0.5),
            use_gpu: Cell::new(true),
            use_float_textures: Cell::new(true),
            spectrum_split: Cell::new(0.5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::Scheduler;

    #[test]
    fn test_get_set() {
        let cell = Cell::new(0.25f32);
        assert_eq!(cell.get(), 0.25);
        cell.set(0.5);
        assert_eq!(cell.get(), 0.5);
    }

    #[test]
    fn test_set_notifies_once() {
        let scheduler = Scheduler::new();
        let task = scheduler.task();
        let cell = Cell::new(1u32);

        cell.notifier().listen(task.clone());
        cell.set(2);
        assert_eq!(scheduler.tick(), vec![task.id()]);

        // Listener was single-shot.
        cell.set(3);
        assert!(scheduler.tick().is_empty());
    }

    #[test]
    fn test_config_defaults() {
        let config = MonitorConfig::default();
        assert!(config.use_gpu.get());
        assert!(config.averaging_alpha.get() > 0.0);
        assert!(config.spectrum_split.get() > 0.0 && config.spectrum_split.get() < 1.0);
    }
}
