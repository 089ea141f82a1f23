//! Frequency/level view geometry contract
//!
//! A `SpectrumView` supplies the frequency window, the visible (zoomed)
//! sub-window, the level range mapping dB to normalized [0,1], and a change
//! notifier. Renderers read one snapshot per draw and re-listen per draw.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::notify::Notifier;

/// Per-draw snapshot of the view geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewGeometry {
    /// Lowest frequency covered by the FFT band (Hz).
    pub left_freq: f64,
    /// Highest frequency covered by the FFT band (Hz).
    pub right_freq: f64,
    /// Lowest frequency currently on screen (Hz).
    pub left_visible_freq: f64,
    /// Highest frequency currently on screen (Hz).
    pub right_visible_freq: f64,
    /// Tuned center frequency (Hz).
    pub center_freq: f64,
    /// Level mapped to the bottom of the plot / gradient start (dB).
    pub min_level: f32,
    /// Level mapped to the top of the plot / gradient end (dB).
    pub max_level: f32,
    /// Width of the whole band in layout pixels.
    pub total_pixel_width: f64,
    /// Real FFTs start at DC; complex FFTs are centered on the tuned
    /// frequency and need a half-band rotation when indexed.
    pub is_real_fft: bool,
}

impl Default for ViewGeometry {
    fn default() -> Self {
        Self {
            left_freq: 99e6,
            right_freq: 101e6,
            left_visible_freq: 99e6,
            right_visible_freq: 101e6,
            center_freq: 100e6,
            min_level: -130.0,
            max_level: -20.0,
            total_pixel_width: 1024.0,
            is_real_fft: false,
        }
    }
}

impl ViewGeometry {
    /// Full band width in Hz.
    #[inline]
    pub fn band_width(&self) -> f64 {
        self.right_freq - self.left_freq
    }

    /// On-screen width in Hz.
    #[inline]
    pub fn visible_width(&self) -> f64 {
        self.right_visible_freq - self.left_visible_freq
    }

    /// A zero-width frequency window cannot be drawn (division by zero);
    /// callers skip the draw.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.band_width() <= 0.0 || self.visible_width() <= 0.0
    }

    /// Horizontal pixel position of `freq` on a surface `width` pixels wide
    /// spanning the visible window.
    #[inline]
    pub fn freq_to_x(&self, freq: f64, width: f64) -> f64 {
        (freq - self.left_visible_freq) / self.visible_width() * width
    }

    /// Map a dB level into [0,1] over the configured level range. Not
    /// clamped; callers clamp where it matters.
    #[inline]
    pub fn normalize_level(&self, db: f32) -> f32 {
        (db - self.min_level) / (self.max_level - self.min_level)
    }

    #[inline]
    pub fn level_span(&self) -> f32 {
        self.max_level - self.min_level
    }
}

/// Shared view object: geometry snapshot plus edge-triggered change notifier.
pub struct SpectrumView {
    geometry: RwLock<ViewGeometry>,
    notifier: Notifier,
}

impl SpectrumView {
    pub fn new(geometry: ViewGeometry) -> Self {
        Self {
            geometry: RwLock::new(geometry),
            notifier: Notifier::new(),
        }
    }

    #[inline]
    pub fn snapshot(&self) -> ViewGeometry {
        *self.geometry.read()
    }

    /// Replace the geometry and fire the change notifier.
    pub fn set(&self, geometry: ViewGeometry) {
        *self.geometry.write() = geometry;
        self.notifier.notify();
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }
}

impl Default for SpectrumView {
    fn default() -> Self {
        Self::new(ViewGeometry::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::Scheduler;

    #[test]
    fn test_freq_to_x() {
        let geometry = ViewGeometry::default();
        // Left edge at 0, right edge at width, center in the middle.
        assert_eq!(geometry.freq_to_x(99e6, 800.0), 0.0);
        assert_eq!(geometry.freq_to_x(101e6, 800.0), 800.0);
        assert_eq!(geometry.freq_to_x(100e6, 800.0), 400.0);
    }

    #[test]
    fn test_normalize_level() {
        let geometry = ViewGeometry {
            min_level: -110.0,
            max_level: -10.0,
            ..ViewGeometry::default()
        };
        assert_eq!(geometry.normalize_level(-110.0), 0.0);
        assert_eq!(geometry.normalize_level(-10.0), 1.0);
        assert_eq!(geometry.normalize_level(-60.0), 0.5);
    }

    #[test]
    fn test_degenerate_window() {
        let geometry = ViewGeometry {
            left_freq: 100e6,
            right_freq: 100e6,
            ..ViewGeometry::default()
        };
        assert!(geometry.is_degenerate());
        assert!(!ViewGeometry::default().is_degenerate());
    }

    #[test]
    fn test_set_notifies_listener_once() {
        let scheduler = Scheduler::new();
        let task = scheduler.task();
        let view = SpectrumView::default();

        view.notifier().listen(task.clone());
        view.set(ViewGeometry {
            center_freq: 144e6,
            ..view.snapshot()
        });
        assert_eq!(scheduler.tick(), vec![task.id()]);
        assert_eq!(view.snapshot().center_freq, 144e6);

        // Edge-triggered: must re-listen to hear the next change.
        view.set(ViewGeometry::default());
        assert!(scheduler.tick().is_empty());
    }
}
