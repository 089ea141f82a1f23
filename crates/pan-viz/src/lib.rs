//! pan-viz: Dual-backend spectrum and waterfall rendering for Panorama
//!
//! Renders a stream of FFT frames as two synchronized live views:
//! - Spectrum: exponentially averaged curve, windowed peak/average shading
//! - Waterfall: scrolling history with frequency-locked row alignment
//!
//! Each view renders through a wgpu shader pipeline when a GPU is available
//! and falls back to an immediate CPU rasterizer otherwise. GPU context loss
//! is survived by rebuilding all GPU resources from CPU-side state.

pub mod common;
pub mod gradient;
pub mod layout;
pub mod ring;
pub mod shell;
pub mod spectrum;
pub mod waterfall;

pub use common::{GpuContext, LostSignal, VizError, VizResult};
pub use gradient::GradientLut;
pub use layout::{Monitor, probe_gpu, split_heights};
pub use ring::HistoryRing;
pub use shell::{ContextState, PixelSurface, RenderShell, RenderSurface};
pub use spectrum::{AverageBuffer, SpectrumRenderer};
pub use waterfall::{WaterfallRenderer, history_capacity};
