//! Waterfall plot renderer
//!
//! Keeps a fixed-depth circular history of magnitude rows and scrolls it one
//! row per frame. Rows are frequency-locked: each row records the center
//! frequency it was captured at and is remapped horizontally against the
//! current view at draw time, so panning or retuning never invalidates
//! already-captured history.
//!
//! GPU path: the history lives in a 2-D texture (one row per slice), a
//! 1-column texture carries each row's center frequency (raw float, or
//! packed into RGBA bytes and decoded base-256 in the shader when float
//! textures are disabled), and a small gradient texture assigns color by
//! normalized magnitude.
//!
//! Rasterizer path: a ring of pre-colorized RGBA rows. When only a new frame
//! arrived, the framebuffer scrolls down one row and just the new top row is
//! painted; any pan, clear, or resize repaints every retained row at its own
//! offset, newest to oldest.

use std::sync::Arc;

use wgpu::util::DeviceExt;

use pan_core::{Frame, MonitorConfig, SpectrumView, TaskHandle, ViewGeometry};

use crate::common::{GpuContext, VizResult, build_shader, quantize_levels};
use crate::gradient::{BACKGROUND, GradientLut};
use crate::ring::HistoryRing;
use crate::shell::{ContextState, FULLSCREEN_VS, GpuSurface, PixelSurface, RenderShell, RenderSurface};

/// Minimum history depth in rows.
pub const MIN_HISTORY: usize = 1024;

/// History depth for a surface: at least `MIN_HISTORY`, or the surface
/// height if that is larger.
pub fn history_capacity(surface_height: u32) -> usize {
    MIN_HISTORY.max(surface_height as usize)
}

/// Pack a center frequency into RGBA bytes, least significant byte first.
/// Used when float textures are unavailable; the shader reconstructs the
/// value base-256.
pub(crate) fn pack_freq_base256(freq: f64) -> [u8; 4] {
    let f = freq.clamp(0.0, u32::MAX as f64) as u32;
    f.to_le_bytes()
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct WaterfallUniforms {
    scroll: f32,
    y_scale: f32,
    freq_scale: f32,
    texture_rotation: f32,
    current_freq: f32,
    gradient_zero: f32,
    gradient_scale: f32,
    float_freq: u32,
}

struct WaterfallGpu {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
    uniform_buffer: wgpu::Buffer,
    data_texture: wgpu::Texture,
    freq_texture: wgpu::Texture,
    gradient_texture: wgpu::Texture,
    gradient_sampler: wgpu::Sampler,
    gradient: GradientLut,
    /// CPU mirror of the history in raw dB. Frames arriving while the
    /// context is lost still land here, so restore loses no data.
    history: HistoryRing<f32>,
    use_float: bool,
    fft_size: usize,
    quantized: Vec<u8>,
}

impl WaterfallGpu {
    fn new(
        surface: &GpuSurface,
        capacity: usize,
        fft_size: usize,
        use_float: bool,
    ) -> VizResult<Self> {
        let device = &surface.ctx().device;
        let fft_size = fft_size.max(1);
        let gradient = GradientLut::new();

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Waterfall Uniform Buffer"),
            contents: bytemuck::bytes_of(&WaterfallUniforms {
                scroll: 0.0,
                y_scale: 1.0,
                freq_scale: 0.0,
                texture_rotation: 0.0,
                current_freq: 0.0,
                gradient_zero: 0.0,
                gradient_scale: 1.0,
                float_freq: use_float as u32,
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Waterfall Bind Group Layout"),
            entries: &[
                texture_entry(0, false),
                texture_entry(1, false),
                texture_entry(2, true),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let shader_source = format!("{FULLSCREEN_VS}\n{WATERFALL_SHADER}");
        let shader = build_shader(device, "Waterfall Shader", &shader_source)?;

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Waterfall Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Waterfall Render Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: GpuSurface::FORMAT,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        // Built once: the gradient never changes for the renderer lifetime.
        let gradient_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Waterfall Gradient Texture"),
            size: wgpu::Extent3d {
                width: 1,
                height: gradient.len() as u32,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        surface.ctx().queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &gradient_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &gradient.texture_data(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4),
                rows_per_image: None,
            },
            wgpu::Extent3d {
                width: 1,
                height: gradient.len() as u32,
                depth_or_array_layers: 1,
            },
        );

        let gradient_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Waterfall Gradient Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let history = HistoryRing::new(capacity, fft_size);
        let bindings = HistoryBindings::build(
            surface.ctx(),
            &bind_group_layout,
            &uniform_buffer,
            &gradient_texture,
            &gradient_sampler,
            fft_size,
            capacity,
            use_float,
        );

        Ok(Self {
            pipeline,
            bind_group_layout,
            bind_group: bindings.bind_group,
            uniform_buffer,
            data_texture: bindings.data_texture,
            freq_texture: bindings.freq_texture,
            gradient_texture,
            gradient_sampler,
            gradient,
            history,
            use_float,
            fft_size,
            quantized: Vec::new(),
        })
    }

    /// (Re)create the history and frequency textures for the current fft
    /// size and rebuild the bind group.
    fn configure_textures(&mut self, surface: &GpuSurface) {
        let bindings = HistoryBindings::build(
            surface.ctx(),
            &self.bind_group_layout,
            &self.uniform_buffer,
            &self.gradient_texture,
            &self.gradient_sampler,
            self.fft_size,
            self.history.capacity(),
            self.use_float,
        );
        self.data_texture = bindings.data_texture;
        self.freq_texture = bindings.freq_texture;
        self.bind_group = bindings.bind_group;
    }

    /// Fold one frame into the CPU mirror and, when a live surface is
    /// supplied, into the GPU textures at the same slot.
    fn record_frame(
        &mut self,
        surface: Option<&GpuSurface>,
        frame: &Frame,
        geometry: &ViewGeometry,
    ) {
        if frame.len() != self.fft_size {
            self.fft_size = frame.len();
            self.history.reset(self.fft_size);
            if let Some(surface) = surface {
                self.configure_textures(surface);
            }
        }

        let slot = self.history.push(&frame.magnitudes, frame.center_freq);
        if let Some(surface) = surface {
            self.write_row(surface, slot, &frame.magnitudes, frame.center_freq, geometry);
        }
    }

    fn write_row(
        &mut self,
        surface: &GpuSurface,
        slot: usize,
        magnitudes: &[f32],
        center_freq: f64,
        geometry: &ViewGeometry,
    ) {
        let queue = &surface.ctx().queue;
        let row_extent = wgpu::Extent3d {
            width: self.fft_size as u32,
            height: 1,
            depth_or_array_layers: 1,
        };
        let row_origin = wgpu::Origin3d {
            x: 0,
            y: slot as u32,
            z: 0,
        };

        if self.use_float {
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &self.data_texture,
                    mip_level: 0,
                    origin: row_origin,
                    aspect: wgpu::TextureAspect::All,
                },
                bytemuck::cast_slice(magnitudes),
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.fft_size as u32 * 4),
                    rows_per_image: None,
                },
                row_extent,
            );
        } else {
            quantize_levels(
                magnitudes,
                geometry.min_level,
                geometry.max_level,
                &mut self.quantized,
            );
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &self.data_texture,
                    mip_level: 0,
                    origin: row_origin,
                    aspect: wgpu::TextureAspect::All,
                },
                &self.quantized,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.fft_size as u32),
                    rows_per_image: None,
                },
                row_extent,
            );
        }

        let freq_bytes = if self.use_float {
            (center_freq as f32).to_le_bytes()
        } else {
            pack_freq_base256(center_freq)
        };
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.freq_texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: slot as u32,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            &freq_bytes,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4),
                rows_per_image: None,
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Wholesale re-upload of the retained history after context restore.
    fn upload_history(&mut self, surface: &GpuSurface, geometry: &ViewGeometry) {
        let rows: Vec<(usize, Vec<f32>, f64)> = self
            .history
            .iter_oldest_first()
            .map(|(slot, row, freq)| (slot, row.to_vec(), freq))
            .collect();
        for (slot, row, freq) in rows {
            self.write_row(surface, slot, &row, freq, geometry);
        }
    }

    fn render(&self, surface: &GpuSurface, geometry: &ViewGeometry, height: u32) {
        let ctx = surface.ctx();
        let capacity = self.history.capacity();

        // Gradient coordinate mapping: half-texel inset composed with the
        // value scaling. Float rows hold raw dB, so the level range folds in
        // here; quantized rows are already normalized.
        let (value_zero, value_scale) = if self.use_float {
            let scale = 1.0 / geometry.level_span();
            (-geometry.min_level * scale, scale)
        } else {
            (0.0, 1.0)
        };
        let uniforms = WaterfallUniforms {
            scroll: self.history.cursor() as f32 / capacity as f32,
            y_scale: height.min(capacity as u32) as f32 / capacity as f32,
            freq_scale: (1.0 / geometry.band_width()) as f32,
            texture_rotation: if geometry.is_real_fft {
                0.0
            } else {
                -(0.5 - 0.5 / self.fft_size as f32)
            },
            current_freq: geometry.center_freq as f32,
            gradient_zero: self.gradient.inset_zero() + self.gradient.inset_scale() * value_zero,
            gradient_scale: self.gradient.inset_scale() * value_scale,
            float_freq: self.use_float as u32,
        };
        ctx.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Waterfall Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Waterfall Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: surface.target_view(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            render_pass.set_pipeline(&self.pipeline);
            render_pass.set_bind_group(0, &self.bind_group, &[]);
            render_pass.draw(0..6, 0..1);
        }
        ctx.queue.submit(Some(encoder.finish()));
    }
}

/// Size-dependent GPU resources, rebuilt whenever the bin count changes.
struct HistoryBindings {
    data_texture: wgpu::Texture,
    freq_texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

impl HistoryBindings {
    #[allow(clippy::too_many_arguments)]
    fn build(
        ctx: &GpuContext,
        layout: &wgpu::BindGroupLayout,
        uniform_buffer: &wgpu::Buffer,
        gradient_texture: &wgpu::Texture,
        gradient_sampler: &wgpu::Sampler,
        fft_size: usize,
        capacity: usize,
        use_float: bool,
    ) -> Self {
        let data_texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Waterfall History Texture"),
            size: wgpu::Extent3d {
                width: fft_size as u32,
                height: capacity as u32,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: if use_float {
                wgpu::TextureFormat::R32Float
            } else {
                wgpu::TextureFormat::R8Unorm
            },
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let freq_texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Waterfall Frequency Texture"),
            size: wgpu::Extent3d {
                width: 1,
                height: capacity as u32,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: if use_float {
                wgpu::TextureFormat::R32Float
            } else {
                wgpu::TextureFormat::Rgba8Unorm
            },
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        if use_float {
            // Dummy frequency far outside any viewport: unwritten rows get a
            // huge offset and fall through to the background color.
            let sentinel = vec![-1e20f32; capacity];
            ctx.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &freq_texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                bytemuck::cast_slice(&sentinel),
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(4),
                    rows_per_image: None,
                },
                wgpu::Extent3d {
                    width: 1,
                    height: capacity as u32,
                    depth_or_array_layers: 1,
                },
            );
        }

        let data_view = data_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let freq_view = freq_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let gradient_view = gradient_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Waterfall Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&data_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&freq_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&gradient_view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(gradient_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: uniform_buffer.as_entire_binding(),
                },
            ],
        });

        Self {
            data_texture,
            freq_texture,
            bind_group,
        }
    }
}

fn texture_entry(binding: u32, filterable: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

/// Rasterizer backend: pre-colorized rows plus scroll/repaint draw logic.
struct WaterfallRaster {
    /// RGBA rows at surface width; `width` is in bytes (4 per pixel).
    rows: HistoryRing<u8>,
    fft_size: usize,
    last_drawn_center_freq: f64,
    new_rows_since_draw: usize,
    cleared: bool,
    scratch: Vec<u8>,
}

impl WaterfallRaster {
    fn new(capacity: usize, surface_width: usize) -> Self {
        Self {
            rows: HistoryRing::new(capacity, surface_width * 4),
            fft_size: 0,
            last_drawn_center_freq: f64::NAN,
            new_rows_since_draw: 0,
            cleared: true,
            scratch: Vec::new(),
        }
    }

    /// Colorize the frame into one RGBA row and push it into the ring. A
    /// bin-count change discards the cached rows.
    fn record_frame(&mut self, frame: &Frame, geometry: &ViewGeometry, surface_width: usize) {
        if frame.len() != self.fft_size {
            self.fft_size = frame.len();
            self.rows.clear();
            self.cleared = true;
        }

        let fft_len = frame.len();
        let x_scale = fft_len as f64 / surface_width as f64;
        let x_zero = if geometry.is_real_fft {
            0.0
        } else {
            fft_len as f64 / 2.0
        };
        let c_scale = 1.0 / geometry.level_span();
        let c_zero = 1.0 - geometry.max_level * c_scale;

        self.scratch.clear();
        for x in 0..surface_width {
            let i = ((x as f64 * x_scale + x_zero).round() as i64).rem_euclid(fft_len as i64);
            let value = frame.magnitudes[i as usize] * c_scale + c_zero;
            self.scratch.extend_from_slice(&GradientLut::color(value));
        }
        self.rows.push(&self.scratch, frame.center_freq);
        self.new_rows_since_draw += 1;
    }

    /// Scroll when exactly one frame arrived and the window is unchanged;
    /// repaint everything otherwise (including a pan and a frame landing in
    /// the same tick).
    fn draw(&mut self, surface: &mut PixelSurface, geometry: &ViewGeometry) {
        let w = surface.width();
        let offset_scale = w as f64 / geometry.band_width();
        let center = geometry.center_freq;
        let offset_px = |row_freq: f64| ((row_freq - center) * offset_scale).round() as isize;

        let fast = self.new_rows_since_draw == 1
            && self.last_drawn_center_freq == center
            && !self.cleared
            && !self.rows.is_empty();

        if fast {
            surface.scroll_down(1);
            surface.fill_row(0, BACKGROUND);
            if let Some((row, freq)) = self.rows.iter_newest_first().next() {
                surface.put_row(0, offset_px(freq), row);
            }
        } else {
            surface.fill(BACKGROUND);
            for (y, (row, freq)) in self.rows.iter_newest_first().enumerate() {
                if y >= surface.height() {
                    break;
                }
                surface.put_row(y, offset_px(freq), row);
            }
            self.last_drawn_center_freq = center;
        }

        self.new_rows_since_draw = 0;
        self.cleared = false;
    }
}

enum WaterfallBackend {
    Gpu(WaterfallGpu),
    Raster(WaterfallRaster),
}

/// Waterfall renderer: frame intake, history management, and backend
/// dispatch.
pub struct WaterfallRenderer {
    shell: RenderShell,
    backend: WaterfallBackend,
    view: Arc<SpectrumView>,
    config: Arc<MonitorConfig>,
}

impl WaterfallRenderer {
    pub fn new(
        width: u32,
        height: u32,
        gpu_ctx: Option<Arc<GpuContext>>,
        draw_task: TaskHandle,
        view: Arc<SpectrumView>,
        config: Arc<MonitorConfig>,
    ) -> VizResult<Self> {
        Self::with_capacity(width, height, history_capacity(height), gpu_ctx, draw_task, view, config)
    }

    /// Constructor with an explicit history depth; `new` derives it from the
    /// surface height.
    pub fn with_capacity(
        width: u32,
        height: u32,
        capacity: usize,
        gpu_ctx: Option<Arc<GpuContext>>,
        draw_task: TaskHandle,
        view: Arc<SpectrumView>,
        config: Arc<MonitorConfig>,
    ) -> VizResult<Self> {
        let shell = RenderShell::new(width, height, gpu_ctx, draw_task);
        let backend = match shell.surface() {
            RenderSurface::Gpu(surface) => WaterfallBackend::Gpu(WaterfallGpu::new(
                surface,
                capacity,
                1,
                config.use_float_textures.get(),
            )?),
            RenderSurface::Raster(_) => {
                WaterfallBackend::Raster(WaterfallRaster::new(capacity, width as usize))
            }
        };
        Ok(Self {
            shell,
            backend,
            view,
            config,
        })
    }

    /// Frame intake: write one history row (CPU-side always; GPU-side only
    /// while the context is live) and request one coalesced draw.
    pub fn handle_frame(&mut self, frame: &Frame) {
        if frame.is_empty() {
            return;
        }
        let geometry = self.view.snapshot();

        match (&mut self.backend, self.shell.surface()) {
            (WaterfallBackend::Gpu(gpu), RenderSurface::Gpu(surface)) => {
                let live = surface.state() == ContextState::Active && !surface.ctx().is_lost();
                gpu.record_frame(live.then_some(surface), frame, &geometry);
            }
            (WaterfallBackend::Raster(raster), RenderSurface::Raster(surface)) => {
                raster.record_frame(frame, &geometry, surface.width());
            }
            _ => unreachable!("backend kind always matches surface kind"),
        }

        self.shell.request_draw();
    }

    /// Scheduled draw: re-listen for the next geometry change, then render.
    pub fn draw(&mut self) {
        self.view.notifier().listen(self.shell.draw_task().clone());

        let geometry = self.view.snapshot();
        if geometry.is_degenerate() {
            return;
        }
        if self.shell.poll() == ContextState::Lost {
            return;
        }

        let height = self.shell.height();
        match (&mut self.backend, self.shell.surface_mut()) {
            (WaterfallBackend::Gpu(gpu), RenderSurface::Gpu(surface)) => {
                if gpu.history.is_empty() {
                    return;
                }
                gpu.render(surface, &geometry, height);
            }
            (WaterfallBackend::Raster(raster), RenderSurface::Raster(surface)) => {
                raster.draw(surface, &geometry);
            }
            _ => unreachable!("backend kind always matches surface kind"),
        }
    }

    /// Lost -> Active: rebuild pipeline and textures against the
    /// replacement context and re-upload the full retained history.
    pub fn restore_context(&mut self, ctx: Arc<GpuContext>) -> VizResult<()> {
        if self.shell.restore(ctx).is_none() {
            return Ok(());
        }
        if let (WaterfallBackend::Gpu(gpu), RenderSurface::Gpu(surface)) =
            (&mut self.backend, self.shell.surface())
        {
            let history = std::mem::replace(&mut gpu.history, HistoryRing::new(1, 1));
            let mut rebuilt =
                WaterfallGpu::new(surface, history.capacity(), history.width(), gpu.use_float)?;
            rebuilt.history = history;
            let geometry = self.view.snapshot();
            rebuilt.upload_history(surface, &geometry);
            *gpu = rebuilt;
            self.shell.request_draw();
        }
        Ok(())
    }

    /// Retained history depth (rows holding data).
    pub fn history_len(&self) -> usize {
        match &self.backend {
            WaterfallBackend::Gpu(gpu) => gpu.history.len(),
            WaterfallBackend::Raster(raster) => raster.rows.len(),
        }
    }

    #[inline]
    pub fn shell(&self) -> &RenderShell {
        &self.shell
    }
}

const WATERFALL_SHADER: &str = r#"
struct Params {
    scroll: f32,
    y_scale: f32,
    freq_scale: f32,
    texture_rotation: f32,
    current_freq: f32,
    gradient_zero: f32,
    gradient_scale: f32,
    float_freq: u32,
}

@group(0) @binding(0) var data_tex: texture_2d<f32>;
@group(0) @binding(1) var freq_tex: texture_2d<f32>;
@group(0) @binding(2) var gradient_tex: texture_2d<f32>;
@group(0) @binding(3) var gradient_samp: sampler;
@group(0) @binding(4) var<uniform> params: Params;

const BACKGROUND: vec4<f32> = vec4<f32>(0.46666667, 0.46666667, 0.46666667, 1.0);

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    // Scroll/scale into history-texture space; newest row lands at the top.
    let unit_pos = vec2<f32>(input.uv.x, 1.0 - input.uv.y);
    let scale_pos = vec2<f32>(1.0) - (vec2<f32>(1.0) - unit_pos) * vec2<f32>(1.0, params.y_scale);
    let tex_lookup = fract(scale_pos + vec2<f32>(0.0, params.scroll));

    let freq_dims = textureDimensions(freq_tex);
    let row = min(i32(tex_lookup.y * f32(freq_dims.y)), i32(freq_dims.y) - 1);
    let freq_texel = textureLoad(freq_tex, vec2<i32>(0, row), 0);
    var history_freq = freq_texel.r;
    if (params.float_freq == 0u) {
        history_freq = ((freq_texel.a * 255.0 * 256.0 + freq_texel.b * 255.0) * 256.0
            + freq_texel.g * 255.0) * 256.0 + freq_texel.r * 255.0;
    }

    // Frequency-locked remap: rows recorded off-center slide horizontally.
    let freq_offset = (params.current_freq - history_freq) * params.freq_scale;
    let shift_x = tex_lookup.x + freq_offset;
    if (shift_x < 0.0 || shift_x > 1.0) {
        return BACKGROUND;
    }

    let data_dims = textureDimensions(data_tex);
    let col = i32(fract(shift_x + params.texture_rotation) * f32(data_dims.x));
    let data = textureLoad(data_tex, vec2<i32>(min(col, i32(data_dims.x) - 1), row), 0).r;
    let grad_v = params.gradient_zero + params.gradient_scale * data;
    return textureSampleLevel(gradient_tex, gradient_samp, vec2<f32>(0.5, grad_v), 0.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use pan_core::Scheduler;

    /// Mirror of the shader's base-256 frequency reconstruction.
    fn decode_freq_base256(bytes: [u8; 4]) -> f64 {
        u32::from_le_bytes(bytes) as f64
    }

    const RED: [u8; 4] = [255, 0, 0, 255];
    const BLACK: [u8; 4] = [0, 0, 0, 255];

    fn raster_waterfall(width: u32, height: u32, capacity: usize) -> WaterfallRenderer {
        let scheduler = Scheduler::new();
        WaterfallRenderer::with_capacity(
            width,
            height,
            capacity,
            None,
            scheduler.task(),
            Arc::new(SpectrumView::default()),
            Arc::new(MonitorConfig::default()),
        )
        .unwrap()
    }

    fn hot_frame(freq: f64, bins: usize) -> Frame {
        // At or above max_level everywhere: colorizes to solid red.
        Frame::new(freq, vec![0.0; bins])
    }

    fn cold_frame(freq: f64, bins: usize) -> Frame {
        // At or below min_level everywhere: colorizes to solid black.
        Frame::new(freq, vec![-200.0; bins])
    }

    #[test]
    fn test_capacity_floor() {
        assert_eq!(history_capacity(200), MIN_HISTORY);
        assert_eq!(history_capacity(4096), 4096);
    }

    #[test]
    fn test_freq_base256_round_trip() {
        for freq in [0.0, 100e6, 1.296e9, 4.2e9] {
            let decoded = decode_freq_base256(pack_freq_base256(freq));
            assert!((decoded - freq).abs() < 1.0, "freq {freq} -> {decoded}");
        }
    }

    #[test]
    fn test_history_ring_eviction_through_renderer() {
        let mut wf = raster_waterfall(8, 8, 4);
        for i in 0..5 {
            wf.handle_frame(&hot_frame(100e6 + i as f64 * 1e3, 16));
        }
        assert_eq!(wf.history_len(), 4);
    }

    #[test]
    fn test_first_draw_paints_full_width_row() {
        let mut wf = raster_waterfall(32, 8, 16);
        // Recorded at the view center: zero offset, row spans the surface.
        wf.handle_frame(&hot_frame(100e6, 64));
        wf.draw();
        let RenderSurface::Raster(surface) = wf.shell().surface() else {
            panic!("expected raster surface");
        };
        assert_eq!(surface.pixel(0, 0), RED);
        assert_eq!(surface.pixel(31, 0), RED);
        // Rows below the history are background.
        assert_eq!(surface.pixel(0, 3), BACKGROUND);
    }

    #[test]
    fn test_fast_path_scrolls_one_row() {
        let mut wf = raster_waterfall(32, 8, 16);
        wf.handle_frame(&hot_frame(100e6, 64));
        wf.draw();
        wf.handle_frame(&cold_frame(100e6, 64));
        wf.draw();

        let RenderSurface::Raster(surface) = wf.shell().surface() else {
            panic!("expected raster surface");
        };
        // New row on top, previous row scrolled down one.
        assert_eq!(surface.pixel(5, 0), BLACK);
        assert_eq!(surface.pixel(5, 1), RED);
    }

    #[test]
    fn test_frequency_locked_remap_on_pan() {
        let view = Arc::new(SpectrumView::default());
        let scheduler = Scheduler::new();
        let mut wf = WaterfallRenderer::with_capacity(
            32,
            8,
            16,
            None,
            scheduler.task(),
            Arc::clone(&view),
            Arc::new(MonitorConfig::default()),
        )
        .unwrap();

        // Row captured at 100 MHz, then the view retunes +0.5 MHz. Band is
        // 2 MHz over 32 px, so the row slides left by exactly 8 px.
        wf.handle_frame(&hot_frame(100e6, 64));
        wf.draw();
        view.set(ViewGeometry {
            left_freq: 99.5e6,
            right_freq: 101.5e6,
            left_visible_freq: 99.5e6,
            right_visible_freq: 101.5e6,
            center_freq: 100.5e6,
            ..view.snapshot()
        });
        wf.draw();

        let RenderSurface::Raster(surface) = wf.shell().surface() else {
            panic!("expected raster surface");
        };
        assert_eq!(surface.pixel(0, 0), RED);
        assert_eq!(surface.pixel(23, 0), RED);
        assert_eq!(surface.pixel(24, 0), BACKGROUND);
    }

    #[test]
    fn test_remap_fully_outside_renders_background() {
        let view = Arc::new(SpectrumView::default());
        let scheduler = Scheduler::new();
        let mut wf = WaterfallRenderer::with_capacity(
            32,
            8,
            16,
            None,
            scheduler.task(),
            Arc::clone(&view),
            Arc::new(MonitorConfig::default()),
        )
        .unwrap();

        wf.handle_frame(&hot_frame(100e6, 64));
        // Retune by more than the full band: the row leaves the window.
        view.set(ViewGeometry {
            left_freq: 102e6,
            right_freq: 104e6,
            left_visible_freq: 102e6,
            right_visible_freq: 104e6,
            center_freq: 103e6,
            ..view.snapshot()
        });
        wf.draw();

        let RenderSurface::Raster(surface) = wf.shell().surface() else {
            panic!("expected raster surface");
        };
        for x in 0..32 {
            assert_eq!(surface.pixel(x, 0), BACKGROUND);
        }
    }

    #[test]
    fn test_pan_plus_frame_in_same_tick_repaints() {
        let view = Arc::new(SpectrumView::default());
        let scheduler = Scheduler::new();
        let mut wf = WaterfallRenderer::with_capacity(
            32,
            8,
            16,
            None,
            scheduler.task(),
            Arc::clone(&view),
            Arc::new(MonitorConfig::default()),
        )
        .unwrap();

        wf.handle_frame(&hot_frame(100e6, 64));
        wf.draw();

        // Both a pan and a new frame before the next draw: full repaint, so
        // the older row is re-placed at its remapped offset too.
        view.set(ViewGeometry {
            left_freq: 99.5e6,
            right_freq: 101.5e6,
            left_visible_freq: 99.5e6,
            right_visible_freq: 101.5e6,
            center_freq: 100.5e6,
            ..view.snapshot()
        });
        wf.handle_frame(&cold_frame(100.5e6, 64));
        wf.draw();

        let RenderSurface::Raster(surface) = wf.shell().surface() else {
            panic!("expected raster surface");
        };
        // New row recorded at the new center: full width.
        assert_eq!(surface.pixel(0, 0), BLACK);
        assert_eq!(surface.pixel(31, 0), BLACK);
        // Old row shifted left by 8 px.
        assert_eq!(surface.pixel(23, 1), RED);
        assert_eq!(surface.pixel(24, 1), BACKGROUND);
    }

    #[test]
    fn test_bin_count_change_clears_history() {
        let mut wf = raster_waterfall(16, 8, 8);
        wf.handle_frame(&hot_frame(100e6, 64));
        wf.handle_frame(&hot_frame(100e6, 64));
        assert_eq!(wf.history_len(), 2);
        wf.handle_frame(&hot_frame(100e6, 32));
        assert_eq!(wf.history_len(), 1);
    }

    #[test]
    fn test_empty_frame_is_skipped() {
        let mut wf = raster_waterfall(16, 8, 8);
        wf.handle_frame(&Frame::new(100e6, vec![]));
        assert_eq!(wf.history_len(), 0);
        assert!(!wf.shell().draw_task().is_pending());
    }

    // Needs a real adapter; returns early when none is available.
    #[test]
    fn test_frames_during_lost_context_survive_restore() {
        let Ok(ctx) = GpuContext::new_blocking() else {
            eprintln!("no GPU adapter available; skipping");
            return;
        };
        let ctx = Arc::new(ctx);
        let scheduler = Scheduler::new();
        let mut wf = WaterfallRenderer::with_capacity(
            16,
            8,
            8,
            Some(Arc::clone(&ctx)),
            scheduler.task(),
            Arc::new(SpectrumView::default()),
            Arc::new(MonitorConfig::default()),
        )
        .unwrap();

        wf.handle_frame(&hot_frame(100e6, 16));
        wf.draw();

        ctx.lost_signal().raise();
        wf.draw();
        if let RenderSurface::Gpu(surface) = wf.shell().surface() {
            assert_eq!(surface.state(), ContextState::Lost);
        } else {
            panic!("expected GPU surface");
        }

        // Frames delivered during the outage still land in the CPU mirror.
        wf.handle_frame(&cold_frame(100e6, 16));
        assert_eq!(wf.history_len(), 2);

        let replacement = Arc::new(GpuContext::new_blocking().unwrap());
        wf.restore_context(replacement).unwrap();
        assert_eq!(wf.history_len(), 2);
        if let RenderSurface::Gpu(surface) = wf.shell().surface() {
            assert_eq!(surface.state(), ContextState::Active);
        }
        wf.draw();
    }

    #[test]
    fn test_frames_coalesce_to_one_draw() {
        let scheduler = Scheduler::new();
        let task = scheduler.task();
        let mut wf = WaterfallRenderer::with_capacity(
            16,
            8,
            8,
            None,
            task,
            Arc::new(SpectrumView::default()),
            Arc::new(MonitorConfig::default()),
        )
        .unwrap();
        wf.handle_frame(&hot_frame(100e6, 16));
        wf.handle_frame(&hot_frame(100e6, 16));
        assert_eq!(scheduler.tick().len(), 1);
    }
}
