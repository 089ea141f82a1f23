//! Common GPU utilities for visualization

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

/// Visualization errors
#[derive(Error, Debug)]
pub enum VizError {
    #[error("GPU initialization failed: {0}")]
    GpuInit(String),
    #[error("Shader compilation failed: {0}")]
    Shader(String),
    #[error("Buffer creation failed: {0}")]
    Buffer(String),
    #[error("Render failed: {0}")]
    Render(String),
}

pub type VizResult<T> = Result<T, VizError>;

/// Clonable handle to a context's loss flag.
///
/// The host obtains one via [`GpuContext::lost_signal`] and moves it into
/// whatever surface delivers device-loss notifications on its platform (a
/// wgpu error callback, a windowing event, a poll watchdog). Raising it moves
/// every shell on the context to the Lost state at its next poll.
#[derive(Clone, Default)]
pub struct LostSignal {
    flag: Arc<AtomicBool>,
}

impl LostSignal {
    pub fn raise(&self) {
        self.flag.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_raised(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Shared GPU context for all visualizations.
///
/// Carries a loss flag raised when the device is lost; the rendering shell
/// observes it and transitions to the Lost state until a replacement context
/// is supplied.
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub adapter_info: wgpu::AdapterInfo,
    lost: LostSignal,
}

impl GpuContext {
    /// Create GPU context (async)
    pub async fn new() -> VizResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| VizError::GpuInit(e.to_string()))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Using GPU: {} ({:?})",
            adapter_info.name,
            adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Panorama Viz Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await
            .map_err(|e| VizError::GpuInit(e.to_string()))?;

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_info,
            lost: LostSignal::default(),
        })
    }

    /// Create GPU context (blocking)
    pub fn new_blocking() -> VizResult<Self> {
        pollster::block_on(Self::new())
    }

    /// The loss flag handle for the host to wire into its device-loss
    /// notification path.
    pub fn lost_signal(&self) -> LostSignal {
        self.lost.clone()
    }

    /// Flag this context as lost. Everything GPU-side is invalid from here
    /// on; frames keep folding into CPU-side state until restore.
    pub fn mark_lost(&self) {
        log::warn!("GPU context lost; draws suspended until restore");
        self.lost.raise();
    }

    #[inline]
    pub fn is_lost(&self) -> bool {
        self.lost.is_raised()
    }
}

/// Quantize dB levels into bytes over `[min_level, max_level]`, clamped.
/// `out` is reused between frames to avoid per-frame allocation.
pub fn quantize_levels(values: &[f32], min_level: f32, max_level: f32, out: &mut Vec<u8>) {
    out.clear();
    let scale = 255.0 / (max_level - min_level);
    out.extend(
        values
            .iter()
            .map(|&v| ((v - min_level) * scale).clamp(0.0, 255.0) as u8),
    );
}

/// Build a shader module, surfacing compile errors instead of panicking.
///
/// A shader that fails validation is a programming defect, fatal for the
/// renderer instance that owns it.
pub fn build_shader(
    device: &wgpu::Device,
    label: &str,
    source: &str,
) -> VizResult<wgpu::ShaderModule> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    match pollster::block_on(device.pop_error_scope()) {
        None => Ok(module),
        Some(err) => Err(VizError::Shader(format!("{label}: {err}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lost_signal_latches_across_clones() {
        let signal = LostSignal::default();
        let handle = signal.clone();
        assert!(!signal.is_raised());
        handle.raise();
        assert!(signal.is_raised());
    }

    #[test]
    fn test_quantize_clamps_and_scales() {
        let mut out = Vec::new();
        quantize_levels(&[-130.0, -20.0, -500.0, 10.0], -130.0, -20.0, &mut out);
        assert_eq!(out, vec![0, 255, 0, 255]);
    }
}
