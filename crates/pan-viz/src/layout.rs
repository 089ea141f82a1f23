//! Monitor widget layout
//!
//! Stacks the spectrum plot above the waterfall inside one panel, splitting
//! the panel height by the configured proportion, and owns the glue between
//! the frame channel, the scheduler, and the two renderers: one `pump` per
//! UI tick drains queued frames into both views and dispatches at most one
//! draw per view.

use std::sync::Arc;

use pan_core::{
    FrameSender, FrameSource, MonitorConfig, Scheduler, SpectrumView, TaskId, frame_channel,
};

use crate::common::{GpuContext, VizResult};
use crate::spectrum::SpectrumRenderer;
use crate::waterfall::WaterfallRenderer;

/// Acquire a shared GPU context, honoring the configuration switch. Returns
/// `None` when GPU rendering is disabled or unavailable; the caller falls
/// back to the rasterizer.
pub fn probe_gpu(config: &MonitorConfig) -> Option<Arc<GpuContext>> {
    if !config.use_gpu.get() {
        log::info!("GPU rendering disabled by configuration");
        return None;
    }
    match GpuContext::new_blocking() {
        Ok(ctx) => Some(Arc::new(ctx)),
        Err(err) => {
            log::warn!("GPU unavailable, falling back to rasterizer: {err}");
            None
        }
    }
}

/// Split a panel height between the spectrum plot (top) and the waterfall
/// (bottom). Each view gets at least one row when the panel allows it.
pub fn split_heights(total: u32, proportion: f32) -> (u32, u32) {
    if total < 2 {
        return (total, 0);
    }
    let spectrum = ((total as f32 * proportion).round() as u32).clamp(1, total - 1);
    (spectrum, total - spectrum)
}

/// The full monitor panel: spectrum over waterfall, fed by one frame channel
/// and driven by one scheduler tick.
pub struct Monitor {
    scheduler: Scheduler,
    spectrum: SpectrumRenderer,
    waterfall: WaterfallRenderer,
    spectrum_task: TaskId,
    waterfall_task: TaskId,
    frames: FrameSource,
    view: Arc<SpectrumView>,
    config: Arc<MonitorConfig>,
}

impl Monitor {
    /// Build the panel. Returns the monitor and the producer handle the FFT
    /// source pushes frames into.
    pub fn new(
        width: u32,
        total_height: u32,
        gpu_ctx: Option<Arc<GpuContext>>,
        config: Arc<MonitorConfig>,
    ) -> VizResult<(Self, FrameSender)> {
        let view = Arc::new(SpectrumView::default());
        let scheduler = Scheduler::new();
        let (sender, frames) = frame_channel();

        let (spectrum_height, waterfall_height) =
            split_heights(total_height, config.spectrum_split.get());

        let spectrum_handle = scheduler.task();
        let spectrum_task = spectrum_handle.id();
        let spectrum = SpectrumRenderer::new(
            width,
            spectrum_height,
            gpu_ctx.clone(),
            spectrum_handle,
            Arc::clone(&view),
            Arc::clone(&config),
        )?;

        let waterfall_handle = scheduler.task();
        let waterfall_task = waterfall_handle.id();
        let waterfall = WaterfallRenderer::new(
            width,
            waterfall_height,
            gpu_ctx,
            waterfall_handle,
            Arc::clone(&view),
            Arc::clone(&config),
        )?;

        Ok((
            Self {
                scheduler,
                spectrum,
                waterfall,
                spectrum_task,
                waterfall_task,
                frames,
                view,
                config,
            },
            sender,
        ))
    }

    /// One UI tick: drain every queued frame into both views, then run the
    /// coalesced draws. However many frames arrived since the last tick,
    /// each view draws at most once.
    pub fn pump(&mut self) {
        self.frames.drain(|frame| {
            self.spectrum.handle_frame(&frame);
            self.waterfall.handle_frame(&frame);
        });
        for task in self.scheduler.tick() {
            if task == self.spectrum_task {
                self.spectrum.draw();
            } else if task == self.waterfall_task {
                self.waterfall.draw();
            }
        }
    }

    /// Forward a replacement context to both views after device loss.
    pub fn restore_gpu(&mut self, ctx: Arc<GpuContext>) -> VizResult<()> {
        self.spectrum.restore_context(Arc::clone(&ctx))?;
        self.waterfall.restore_context(ctx)?;
        Ok(())
    }

    /// Shared view geometry; writes through it wake both renderers.
    #[inline]
    pub fn view(&self) -> &Arc<SpectrumView> {
        &self.view
    }

    #[inline]
    pub fn config(&self) -> &Arc<MonitorConfig> {
        &self.config
    }

    #[inline]
    pub fn spectrum(&self) -> &SpectrumRenderer {
        &self.spectrum
    }

    #[inline]
    pub fn waterfall(&self) -> &WaterfallRenderer {
        &self.waterfall
    }

    #[inline]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}
