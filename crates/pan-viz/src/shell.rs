//! Dual-backend rendering shell
//!
//! Selects, at construction time, between a GPU surface (wgpu offscreen
//! target drawn by full-surface quad pipelines) and a CPU pixel surface
//! (immediate rasterizer writing RGBA rows). The choice is permanent for the
//! surface's lifetime: a failed GPU acquisition never retries.
//!
//! GPU context loss is an explicit state machine: Active -> Lost on the
//! loss flag, Lost -> Active on `restore`, which rebuilds every GPU resource
//! from CPU-side state. Lost state skips draws but keeps accepting frames.

use std::sync::Arc;

use pan_core::TaskHandle;

use crate::common::GpuContext;

/// Shared vertex stage: full-surface quad from the vertex index, uv with
/// origin at the top-left.
pub const FULLSCREEN_VS: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var positions = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, 1.0),
    );

    var uvs = array<vec2<f32>, 6>(
        vec2<f32>(0.0, 1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(1.0, 0.0),
        vec2<f32>(0.0, 1.0),
        vec2<f32>(1.0, 0.0),
        vec2<f32>(0.0, 0.0),
    );

    var output: VertexOutput;
    output.position = vec4<f32>(positions[vertex_index], 0.0, 1.0);
    output.uv = uvs[vertex_index];
    return output;
}
"#;

/// GPU context lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Active,
    Lost,
}

/// Offscreen GPU render target.
pub struct GpuSurface {
    ctx: Arc<GpuContext>,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    state: ContextState,
}

impl GpuSurface {
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

    fn new(ctx: Arc<GpuContext>, width: u32, height: u32) -> Self {
        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Shell Target Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            ctx,
            texture,
            view,
            width,
            height,
            state: ContextState::Active,
        }
    }

    #[inline]
    pub fn ctx(&self) -> &Arc<GpuContext> {
        &self.ctx
    }

    /// The view backends render into; recreated on restore.
    #[inline]
    pub fn target_view(&self) -> &wgpu::TextureView {
        &self.view
    }

    #[inline]
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    #[inline]
    pub fn state(&self) -> ContextState {
        self.state
    }
}

/// CPU framebuffer for the rasterizer fallback: tightly packed RGBA8 rows.
pub struct PixelSurface {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl PixelSurface {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height * 4],
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 4] {
        let base = (y * self.width + x) * 4;
        [
            self.data[base],
            self.data[base + 1],
            self.data[base + 2],
            self.data[base + 3],
        ]
    }

    pub fn fill(&mut self, color: [u8; 4]) {
        for pixel in self.data.chunks_exact_mut(4) {
            pixel.copy_from_slice(&color);
        }
    }

    pub fn fill_row(&mut self, y: usize, color: [u8; 4]) {
        if y >= self.height {
            return;
        }
        let stride = self.width * 4;
        for pixel in self.data[y * stride..(y + 1) * stride].chunks_exact_mut(4) {
            pixel.copy_from_slice(&color);
        }
    }

    /// Shift the whole image down by `rows`; the vacated top rows keep their
    /// previous content and must be repainted by the caller.
    pub fn scroll_down(&mut self, rows: usize) {
        if rows == 0 || rows >= self.height {
            return;
        }
        let stride = self.width * 4;
        let moved = (self.height - rows) * stride;
        self.data.copy_within(0..moved, rows * stride);
    }

    /// Blit one RGBA row at a horizontal pixel offset, clipping both sides.
    pub fn put_row(&mut self, y: usize, x_offset: isize, row: &[u8]) {
        if y >= self.height {
            return;
        }
        debug_assert_eq!(row.len() % 4, 0);
        let row_pixels = (row.len() / 4) as isize;
        let dst_start = x_offset.max(0);
        let dst_end = (x_offset + row_pixels).min(self.width as isize);
        if dst_start >= dst_end {
            return;
        }
        let src_start = ((dst_start - x_offset) * 4) as usize;
        let src_end = ((dst_end - x_offset) * 4) as usize;
        let base = (y * self.width + dst_start as usize) * 4;
        self.data[base..base + (src_end - src_start)].copy_from_slice(&row[src_start..src_end]);
    }

    /// Reallocate at a new size, clearing the contents.
    pub fn resize(&mut self, width: usize, height: usize) {
        self.width = width;
        self.height = height;
        self.data = vec![0; width * height * 4];
    }
}

/// Backend-selected surface.
pub enum RenderSurface {
    Gpu(GpuSurface),
    Raster(PixelSurface),
}

/// Per-visualization rendering shell: one surface plus the debounced draw
/// task shared with the scheduler.
pub struct RenderShell {
    surface: RenderSurface,
    draw_task: TaskHandle,
}

impl RenderShell {
    /// Select the backend: GPU when a context is supplied, rasterizer
    /// otherwise. The selection is permanent for this shell.
    pub fn new(
        width: u32,
        height: u32,
        gpu: Option<Arc<GpuContext>>,
        draw_task: TaskHandle,
    ) -> Self {
        let surface = match gpu {
            Some(ctx) => RenderSurface::Gpu(GpuSurface::new(ctx, width, height)),
            None => {
                log::info!("no GPU context; using rasterizer backend");
                RenderSurface::Raster(PixelSurface::new(width as usize, height as usize))
            }
        };
        Self { surface, draw_task }
    }

    /// Coalesced draw request: at most one pending draw per scheduler tick.
    pub fn request_draw(&self) {
        self.draw_task.request();
    }

    #[inline]
    pub fn draw_task(&self) -> &TaskHandle {
        &self.draw_task
    }

    #[inline]
    pub fn is_gpu(&self) -> bool {
        matches!(self.surface, RenderSurface::Gpu(_))
    }

    #[inline]
    pub fn surface(&self) -> &RenderSurface {
        &self.surface
    }

    #[inline]
    pub fn surface_mut(&mut self) -> &mut RenderSurface {
        &mut self.surface
    }

    pub fn width(&self) -> u32 {
        match &self.surface {
            RenderSurface::Gpu(surface) => surface.width,
            RenderSurface::Raster(surface) => surface.width() as u32,
        }
    }

    pub fn height(&self) -> u32 {
        match &self.surface {
            RenderSurface::Gpu(surface) => surface.height,
            RenderSurface::Raster(surface) => surface.height() as u32,
        }
    }

    /// Observe the context state, latching Lost when the device loss flag
    /// has been raised. The rasterizer backend is always Active.
    pub fn poll(&mut self) -> ContextState {
        match &mut self.surface {
            RenderSurface::Gpu(surface) => {
                if surface.state == ContextState::Active && surface.ctx.is_lost() {
                    surface.state = ContextState::Lost;
                }
                surface.state
            }
            RenderSurface::Raster(_) => ContextState::Active,
        }
    }

    /// Lost -> Active transition: adopt a replacement context and rebuild
    /// the target. Returns the new surface for the owning renderer to
    /// rebuild its own resources against; `None` on the rasterizer backend.
    pub fn restore(&mut self, ctx: Arc<GpuContext>) -> Option<&GpuSurface> {
        match &mut self.surface {
            RenderSurface::Gpu(surface) => {
                *surface = GpuSurface::new(ctx, surface.width, surface.height);
                log::info!("GPU context restored; resources rebuilt");
                Some(surface)
            }
            RenderSurface::Raster(_) => None,
        }
    }
}
