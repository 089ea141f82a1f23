//! Spectrum plot renderer
//!
//! Maintains an exponentially averaged magnitude buffer over the incoming
//! frame stream and rasterizes it as a stroked-and-filled curve.
//!
//! GPU path: the average buffer is quantized into a 1-row texture every
//! frame; the fragment shader samples a +/-8 bin window around each pixel's
//! frequency and blends stroke/fill/background from the windowed peak and
//! average, giving an anti-aliased line plus fill with no per-vertex
//! geometry. Panning only changes the x offset/scale uniforms.
//!
//! Rasterizer path: a closed polygon following the averaged curve across the
//! visible bin range, stroke first, fill layered over the stroke.

use std::sync::Arc;

use wgpu::util::DeviceExt;

use pan_core::{Frame, MonitorConfig, SpectrumView, TaskHandle, ViewGeometry};

use crate::common::{GpuContext, VizResult, build_shader, quantize_levels};
use crate::shell::{ContextState, FULLSCREEN_VS, GpuSurface, PixelSurface, RenderShell, RenderSurface};

/// Exponential moving average over incoming magnitudes.
///
/// Reseeded from the incoming frame (not blended) when the bin count changes
/// or the stream retunes to a different center frequency.
pub struct AverageBuffer {
    values: Vec<f32>,
    last_center_freq: f64,
}

impl AverageBuffer {
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            last_center_freq: f64::NAN,
        }
    }

    pub fn update(&mut self, frame: &Frame, alpha: f32) {
        let retuned = self.last_center_freq != frame.center_freq && !frame.center_freq.is_nan();
        if self.values.len() != frame.len() || retuned {
            self.last_center_freq = frame.center_freq;
            self.values.clear();
            self.values.extend_from_slice(&frame.magnitudes);
        }

        let inv_alpha = 1.0 - alpha;
        for (avg, &mag) in self.values.iter_mut().zip(&frame.magnitudes) {
            *avg = *avg * inv_alpha + mag * alpha;
        }
    }

    #[inline]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Default for AverageBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct SpectrumUniforms {
    x_zero: f32,
    x_scale: f32,
    x_res: f32,
    y_res: f32,
}

struct SpectrumGpu {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
    uniform_buffer: wgpu::Buffer,
    data_texture: wgpu::Texture,
    fft_size: usize,
    quantized: Vec<u8>,
}

impl SpectrumGpu {
    fn new(surface: &GpuSurface, fft_size: usize) -> VizResult<Self> {
        let device = &surface.ctx().device;
        let fft_size = fft_size.max(1);

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Spectrum Uniform Buffer"),
            contents: bytemuck::bytes_of(&SpectrumUniforms {
                x_zero: 0.0,
                x_scale: 1.0,
                x_res: 1.0,
                y_res: 1.0,
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Spectrum Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
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

        let shader_source = format!("{FULLSCREEN_VS}\n{SPECTRUM_SHADER}");
        let shader = build_shader(device, "Spectrum Shader", &shader_source)?;

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Spectrum Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Spectrum Render Pipeline"),
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

        let (data_texture, bind_group) =
            Self::build_data_texture(device, &bind_group_layout, &uniform_buffer, fft_size);

        Ok(Self {
            pipeline,
            bind_group_layout,
            bind_group,
            uniform_buffer,
            data_texture,
            fft_size,
            quantized: Vec::new(),
        })
    }

    fn build_data_texture(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        uniform_buffer: &wgpu::Buffer,
        fft_size: usize,
    ) -> (wgpu::Texture, wgpu::BindGroup) {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Spectrum Data Texture"),
            size: wgpu::Extent3d {
                width: fft_size as u32,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Spectrum Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: uniform_buffer.as_entire_binding(),
                },
            ],
        });
        (texture, bind_group)
    }

    /// Quantize the average buffer with the current level range and push it
    /// into the 1-row data texture, resizing the texture on bin-count change.
    fn upload(&mut self, surface: &GpuSurface, values: &[f32], geometry: &ViewGeometry) {
        if values.is_empty() {
            return;
        }
        let ctx = surface.ctx();
        if values.len() != self.fft_size {
            self.fft_size = values.len();
            let (texture, bind_group) = Self::build_data_texture(
                &ctx.device,
                &self.bind_group_layout,
                &self.uniform_buffer,
                self.fft_size,
            );
            self.data_texture = texture;
            self.bind_group = bind_group;
        }

        quantize_levels(
            values,
            geometry.min_level,
            geometry.max_level,
            &mut self.quantized,
        );
        ctx.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.data_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &self.quantized,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.fft_size as u32),
                rows_per_image: None,
            },
            wgpu::Extent3d {
                width: self.fft_size as u32,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
    }

    fn render(&self, surface: &GpuSurface, geometry: &ViewGeometry, width: u32, height: u32) {
        let ctx = surface.ctx();

        // Reuse the same texture under panning/zooming: only the horizontal
        // offset and scale change per draw. The half-bin term compensates for
        // texel-center sampling.
        let bandwidth = geometry.band_width();
        let half_bin_width = bandwidth / self.fft_size as f64 / 2.0;
        let x_scale = geometry.visible_width() / bandwidth;
        let x_zero = (geometry.left_visible_freq - geometry.center_freq + half_bin_width) / bandwidth;
        let uniforms = SpectrumUniforms {
            x_zero: x_zero as f32,
            x_scale: x_scale as f32,
            x_res: width as f32,
            y_res: height as f32,
        };
        ctx.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Spectrum Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Spectrum Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: surface.target_view(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
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

pub(crate) const SPECTRUM_STROKE: [u8; 4] = [0, 255, 173, 255];
pub(crate) const SPECTRUM_FILL: [u8; 4] = [48, 75, 75, 191];

/// Rasterizer path: curve y positions per column, stroke pass connecting
/// neighboring columns, then fill painted over the stroke so downward noise
/// spikes read quieter than upward ones.
fn render_raster(surface: &mut PixelSurface, values: &[f32], geometry: &ViewGeometry) {
    surface.fill([0, 0, 0, 0]);

    let fft_len = values.len();
    if fft_len / 2 == 0 {
        return;
    }

    let w = surface.width();
    let h = surface.height();
    if w == 0 || h == 0 {
        return;
    }

    // Pixels per bin across the full band; columns map back to (possibly
    // wrapped) bin positions so one bin of overscan on each side comes for
    // free from the modular indexing.
    let x_zero = geometry.freq_to_x(geometry.center_freq, w as f64);
    let x_neg = geometry.freq_to_x(geometry.left_freq, w as f64);
    let x_pos = geometry.freq_to_x(geometry.right_freq, w as f64);
    let x_scale = (x_pos - x_neg) / fft_len as f64;
    if x_scale <= 0.0 {
        return;
    }
    let y_scale = -(h as f64) / geometry.level_span() as f64;
    let y_zero = -(geometry.max_level as f64) * y_scale;

    let sample = |bin_pos: f64| -> f64 {
        let floor = bin_pos.floor();
        let frac = bin_pos - floor;
        let i0 = (floor as i64).rem_euclid(fft_len as i64) as usize;
        let i1 = (i0 + 1) % fft_len;
        values[i0] as f64 * (1.0 - frac) + values[i1] as f64 * frac
    };

    let curve: Vec<f64> = (0..w)
        .map(|x| {
            let bin_pos = (x as f64 - x_zero) / x_scale;
            y_zero + sample(bin_pos) * y_scale
        })
        .collect();

    let clamp_y = |y: f64| y.round().clamp(0.0, (h - 1) as f64) as usize;

    // Stroke: vertical spans joining each column to its neighbor.
    for x in 0..w {
        let y_here = curve[x];
        let y_prev = if x > 0 { curve[x - 1] } else { y_here };
        let (top, bottom) = if y_prev <= y_here {
            (clamp_y(y_prev), clamp_y(y_here))
        } else {
            (clamp_y(y_here), clamp_y(y_prev))
        };
        for y in top..=bottom {
            put_pixel(surface, x, y, SPECTRUM_STROKE);
        }
    }

    // Fill, over the stroke, from just below the curve to the bottom.
    for x in 0..w {
        let start = (curve[x].round() as i64 + 1).max(0) as usize;
        for y in start..h {
            put_pixel(surface, x, y, SPECTRUM_FILL);
        }
    }
}

fn put_pixel(surface: &mut PixelSurface, x: usize, y: usize, color: [u8; 4]) {
    surface.put_row(y, x as isize, &color);
}

/// Spectrum renderer: frame intake, averaging, and backend dispatch.
pub struct SpectrumRenderer {
    shell: RenderShell,
    gpu: Option<SpectrumGpu>,
    average: AverageBuffer,
    view: Arc<SpectrumView>,
    config: Arc<MonitorConfig>,
}

impl SpectrumRenderer {
    pub fn new(
        width: u32,
        height: u32,
        gpu_ctx: Option<Arc<GpuContext>>,
        draw_task: TaskHandle,
        view: Arc<SpectrumView>,
        config: Arc<MonitorConfig>,
    ) -> VizResult<Self> {
        let shell = RenderShell::new(width, height, gpu_ctx, draw_task);
        let gpu = match shell.surface() {
            RenderSurface::Gpu(surface) => Some(SpectrumGpu::new(surface, 1)?),
            RenderSurface::Raster(_) => None,
        };
        Ok(Self {
            shell,
            gpu,
            average: AverageBuffer::new(),
            view,
            config,
        })
    }

    /// Frame intake: fold into the average buffer, push to the GPU when the
    /// context is live, and request one coalesced draw.
    pub fn handle_frame(&mut self, frame: &Frame) {
        if frame.is_empty() {
            return;
        }
        let alpha = self.config.averaging_alpha.get();
        self.average.update(frame, alpha);

        if let (Some(gpu), RenderSurface::Gpu(surface)) = (&mut self.gpu, self.shell.surface()) {
            if surface.state() == ContextState::Active && !surface.ctx().is_lost() {
                let geometry = self.view.snapshot();
                gpu.upload(surface, self.average.values(), &geometry);
            }
        }

        self.shell.request_draw();
    }

    /// Scheduled draw: re-listen for the next geometry change, then render
    /// through whichever backend this shell selected.
    pub fn draw(&mut self) {
        self.view.notifier().listen(self.shell.draw_task().clone());

        let geometry = self.view.snapshot();
        if geometry.is_degenerate() || self.average.is_empty() {
            return;
        }
        if self.shell.poll() == ContextState::Lost {
            return;
        }

        let (width, height) = (self.shell.width(), self.shell.height());
        match self.shell.surface_mut() {
            RenderSurface::Gpu(surface) => {
                if let Some(gpu) = &self.gpu {
                    gpu.render(surface, &geometry, width, height);
                }
            }
            RenderSurface::Raster(surface) => {
                render_raster(surface, self.average.values(), &geometry);
            }
        }
    }

    /// Lost -> Active: rebuild the pipeline, texture, and bind group against
    /// the replacement context and re-upload the retained average buffer.
    pub fn restore_context(&mut self, ctx: Arc<GpuContext>) -> VizResult<()> {
        if self.shell.restore(ctx).is_none() {
            return Ok(());
        }
        if let RenderSurface::Gpu(surface) = self.shell.surface() {
            let mut gpu = SpectrumGpu::new(surface, self.average.len().max(1))?;
            if !self.average.is_empty() {
                let geometry = self.view.snapshot();
                gpu.upload(surface, self.average.values(), &geometry);
            }
            self.gpu = Some(gpu);
            self.shell.request_draw();
        }
        Ok(())
    }

    #[inline]
    pub fn average(&self) -> &AverageBuffer {
        &self.average
    }

    #[inline]
    pub fn shell(&self) -> &RenderShell {
        &self.shell
    }
}

const SPECTRUM_SHADER: &str = r#"
struct Params {
    x_zero: f32,
    x_scale: f32,
    x_res: f32,
    y_res: f32,
}

@group(0) @binding(0) var data_tex: texture_2d<f32>;
@group(0) @binding(1) var<uniform> params: Params;

const STEP_RANGE: i32 = 8;
const BACKGROUND: vec4<f32> = vec4<f32>(0.0, 0.0, 0.0, 0.0);
const STROKE: vec4<f32> = vec4<f32>(0.0, 1.0, 0.68, 1.0);
const FILL: vec4<f32> = vec4<f32>(0.1875, 0.2925, 0.2925, 0.75);

fn wrap_bin(i: i32, n: i32) -> i32 {
    return ((i % n) + n) % n;
}

// Wrapping sample with manual linear interpolation between texel centers.
fn sample_mag(x: f32) -> f32 {
    let n = i32(textureDimensions(data_tex).x);
    let pos = fract(x) * f32(n) - 0.5;
    let i0 = i32(floor(pos));
    let t = pos - floor(pos);
    let a = textureLoad(data_tex, vec2<i32>(wrap_bin(i0, n), 0), 0).r;
    let b = textureLoad(data_tex, vec2<i32>(wrap_bin(i0 + 1, n), 0), 0).r;
    return mix(a, b, t);
}

fn cmix(before: vec4<f32>, after: vec4<f32>, a: f32) -> vec4<f32> {
    return mix(before, after, clamp(a, 0.0, 1.0));
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let x = params.x_scale * input.uv.x + params.x_zero;
    let y = 1.0 - input.uv.y;
    let d_tex = params.x_scale / params.x_res * (1.3 / f32(STEP_RANGE));

    var accum = 0.0;
    var peak = -1.0;
    var valley = 2.0;
    for (var i = -STEP_RANGE; i <= STEP_RANGE; i++) {
        let value = sample_mag(x + d_tex * f32(i));
        accum += value;
        peak = max(peak, value);
        valley = min(valley, value);
    }
    accum *= 1.0 / (f32(STEP_RANGE) * 2.0 + 1.0);

    // Below the windowed average: fill. Between average and peak: stroke,
    // feathered by one pixel at each boundary. Above the peak: background.
    let curve = cmix(STROKE, FILL, (accum - y) * params.y_res);
    return cmix(BACKGROUND, curve, (peak - y) * params.y_res + 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use pan_core::Scheduler;

    fn frame(freq: f64, mags: Vec<f32>) -> Frame {
        Frame::new(freq, mags)
    }

    #[test]
    fn test_average_single_step_is_exact() {
        let mut avg = AverageBuffer::new();
        avg.update(&frame(100e6, vec![-80.0, -80.0]), 0.25);
        avg.update(&frame(100e6, vec![-40.0, -40.0]), 0.25);
        // a1 = a0*(1-alpha) + v*alpha
        let expected = -80.0 * 0.75 + -40.0 * 0.25;
        assert_eq!(avg.values(), &[expected, expected]);
    }

    #[test]
    fn test_average_scenario_half_alpha() {
        let mut avg = AverageBuffer::new();
        avg.update(&frame(100e6, vec![0.0; 4]), 0.5);
        avg.update(&frame(100e6, vec![1.0; 4]), 0.5);
        assert_eq!(avg.values(), &[0.5, 0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_average_converges_monotonically() {
        let mut avg = AverageBuffer::new();
        avg.update(&frame(100e6, vec![0.0]), 0.3);
        let mut last = avg.values()[0];
        for _ in 0..20 {
            avg.update(&frame(100e6, vec![1.0]), 0.3);
            let now = avg.values()[0];
            assert!(now > last && now <= 1.0);
            last = now;
        }
    }

    #[test]
    fn test_average_reseeds_on_bin_count_change() {
        let mut avg = AverageBuffer::new();
        avg.update(&frame(100e6, vec![-80.0; 8]), 0.5);
        avg.update(&frame(100e6, vec![-20.0; 16]), 0.5);
        assert_eq!(avg.len(), 16);
        // Reseeded, not blended against stale state.
        assert_eq!(avg.values()[0], -20.0);
    }

    #[test]
    fn test_average_reseeds_on_retune() {
        let mut avg = AverageBuffer::new();
        avg.update(&frame(100e6, vec![-80.0; 4]), 0.5);
        avg.update(&frame(145e6, vec![-20.0; 4]), 0.5);
        assert_eq!(avg.values(), &[-20.0; 4]);
    }

    #[test]
    fn test_average_length_tracks_bin_count() {
        let mut avg = AverageBuffer::new();
        for n in [16usize, 16, 32, 8] {
            avg.update(&frame(100e6, vec![-50.0; n]), 0.5);
            assert_eq!(avg.len(), n);
        }
    }

    #[test]
    fn test_quantize_level_range() {
        let mut out = Vec::new();
        quantize_levels(&[-130.0, -75.0, -20.0, 0.0, -200.0], -130.0, -20.0, &mut out);
        assert_eq!(out, vec![0, 127, 255, 255, 0]);
    }

    fn raster_renderer(width: u32, height: u32) -> SpectrumRenderer {
        let scheduler = Scheduler::new();
        SpectrumRenderer::new(
            width,
            height,
            None,
            scheduler.task(),
            Arc::new(SpectrumView::default()),
            Arc::new(MonitorConfig::default()),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_frame_skipped() {
        let mut renderer = raster_renderer(16, 16);
        renderer.handle_frame(&frame(100e6, vec![]));
        assert!(renderer.average().is_empty());
        assert!(!renderer.shell().draw_task().is_pending());
    }

    #[test]
    fn test_degenerate_geometry_skips_draw() {
        let scheduler = Scheduler::new();
        let view = Arc::new(SpectrumView::new(pan_core::ViewGeometry {
            left_freq: 100e6,
            right_freq: 100e6,
            left_visible_freq: 100e6,
            right_visible_freq: 100e6,
            ..Default::default()
        }));
        let mut renderer = SpectrumRenderer::new(
            8,
            8,
            None,
            scheduler.task(),
            view,
            Arc::new(MonitorConfig::default()),
        )
        .unwrap();
        renderer.handle_frame(&frame(100e6, vec![-50.0; 4]));
        renderer.draw();
        // No panic, no pixels: the surface stays blank.
        if let RenderSurface::Raster(surface) = renderer.shell().surface() {
            assert!(surface.data().iter().all(|&b| b == 0));
        } else {
            panic!("expected raster surface");
        }
    }

    #[test]
    fn test_raster_draw_paints_curve_and_fill() {
        let mut renderer = raster_renderer(32, 32);
        // Mid-range flat signal with the default -130..-20 level window.
        renderer.handle_frame(&frame(100e6, vec![-75.0; 64]));
        renderer.draw();

        let RenderSurface::Raster(surface) = renderer.shell().surface() else {
            panic!("expected raster surface");
        };
        // Flat -75 dB sits at the vertical midpoint.
        let y_curve = 16usize;
        assert_eq!(surface.pixel(10, y_curve), SPECTRUM_STROKE);
        assert_eq!(surface.pixel(10, y_curve + 4), SPECTRUM_FILL);
        assert_eq!(surface.pixel(10, y_curve - 4), [0, 0, 0, 0]);
    }

    #[test]
    fn test_resize_does_not_throw_and_resets() {
        let mut renderer = raster_renderer(16, 16);
        renderer.handle_frame(&frame(100e6, vec![-80.0; 32]));
        renderer.handle_frame(&frame(100e6, vec![-30.0; 8]));
        renderer.draw();
        assert_eq!(renderer.average().len(), 8);
        assert_eq!(renderer.average().values()[0], -30.0);
    }

    #[test]
    fn test_frames_coalesce_to_one_draw() {
        let scheduler = Scheduler::new();
        let task = scheduler.task();
        let mut renderer = SpectrumRenderer::new(
            8,
            8,
            None,
            task,
            Arc::new(SpectrumView::default()),
            Arc::new(MonitorConfig::default()),
        )
        .unwrap();
        renderer.handle_frame(&frame(100e6, vec![-50.0; 4]));
        renderer.handle_frame(&frame(100e6, vec![-51.0; 4]));
        assert_eq!(scheduler.tick().len(), 1);
    }

    // Needs a real adapter; returns early when none is available.
    #[test]
    fn test_average_survives_lost_context_and_restore() {
        let Ok(ctx) = GpuContext::new_blocking() else {
            eprintln!("no GPU adapter available; skipping");
            return;
        };
        let ctx = Arc::new(ctx);
        let scheduler = Scheduler::new();
        let mut renderer = SpectrumRenderer::new(
            16,
            16,
            Some(Arc::clone(&ctx)),
            scheduler.task(),
            Arc::new(SpectrumView::default()),
            Arc::new(MonitorConfig::default()),
        )
        .unwrap();

        renderer.handle_frame(&frame(100e6, vec![-80.0; 32]));
        ctx.mark_lost();
        renderer.draw();

        // Frames delivered during the outage still fold into the average.
        renderer.handle_frame(&frame(100e6, vec![-40.0; 32]));
        assert_eq!(renderer.average().values()[0], -60.0);

        let replacement = Arc::new(GpuContext::new_blocking().unwrap());
        renderer.restore_context(replacement).unwrap();
        assert_eq!(renderer.average().len(), 32);
        renderer.draw();
    }

    #[test]
    fn test_draw_relistens_to_view_changes() {
        let scheduler = Scheduler::new();
        let task = scheduler.task();
        let view = Arc::new(SpectrumView::default());
        let mut renderer = SpectrumRenderer::new(
            8,
            8,
            None,
            task.clone(),
            Arc::clone(&view),
            Arc::new(MonitorConfig::default()),
        )
        .unwrap();

        renderer.handle_frame(&frame(100e6, vec![-50.0; 4]));
        scheduler.tick();
        renderer.draw();

        // The draw registered a single-shot listener for the next change.
        view.set(pan_core::ViewGeometry {
            center_freq: 101e6,
            ..view.snapshot()
        });
        assert_eq!(scheduler.tick(), vec![task.id()]);
    }
}
