use crate::shaders;
use crate::upload::{CopyPass, TEXTURE_FORMAT};
use bytemuck::{Pod, Zeroable};
use pixelcraft_common::{Rect, Rgba, Viewport};
use pixelcraft_render::{Bitmap, RenderBackend, RenderError};
use std::sync::Arc;

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
struct QuadVertex {
    position: [f32; 2],
    uv: [f32; 2],
}

const VERTICES_PER_QUAD: u64 = 6;

/// Two triangles covering `dst`, in clip space of a `viewport`-sized target.
fn quad_vertices(dst: Rect, viewport: Viewport) -> [QuadVertex; 6] {
    let to_clip = |x: f32, y: f32| {
        [
            x / viewport.width as f32 * 2.0 - 1.0,
            1.0 - y / viewport.height as f32 * 2.0,
        ]
    };
    let top_left = QuadVertex {
        position: to_clip(dst.x, dst.y),
        uv: [0.0, 0.0],
    };
    let top_right = QuadVertex {
        position: to_clip(dst.x + dst.w, dst.y),
        uv: [1.0, 0.0],
    };
    let bottom_left = QuadVertex {
        position: to_clip(dst.x, dst.y + dst.h),
        uv: [0.0, 1.0],
    };
    let bottom_right = QuadVertex {
        position: to_clip(dst.x + dst.w, dst.y + dst.h),
        uv: [1.0, 1.0],
    };
    [
        top_left,
        bottom_left,
        top_right,
        top_right,
        bottom_left,
        bottom_right,
    ]
}

fn srgb_to_linear(channel: u8) -> f64 {
    let c = f64::from(channel) / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn clear_color(color: Rgba, surface_is_srgb: bool) -> wgpu::Color {
    let channel = |c: u8| {
        if surface_is_srgb {
            srgb_to_linear(c)
        } else {
            f64::from(c) / 255.0
        }
    };
    wgpu::Color {
        r: channel(color.r),
        g: channel(color.g),
        b: channel(color.b),
        a: f64::from(color.a) / 255.0,
    }
}

/// A sampled texture ready to be drawn as a sprite.
#[derive(Debug, Clone)]
pub struct SpriteTexture {
    bind_group: Arc<wgpu::BindGroup>,
    pub width: u32,
    pub height: u32,
}

/// [`RenderBackend`] drawing into a window surface through wgpu.
///
/// The logical viewport is letterboxed into the surface: scaled to fit and
/// centered, with the remainder left in the clear color.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    pipeline: wgpu::RenderPipeline,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    vertex_buffer: wgpu::Buffer,
    max_quads: u64,
    frame: Vec<(SpriteTexture, Rect)>,
    viewport: Viewport,
    clear: wgpu::Color,
}

impl WgpuBackend {
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
        viewport: Viewport,
        clear_color: Rgba,
    ) -> Self {
        surface.configure(&device, &config);

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sprite_texture_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("sprite_pipeline_layout"),
            bind_group_layouts: &[&texture_layout],
            push_constant_ranges: &[],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("sprite_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::SPRITE_SHADER.into()),
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("sprite_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<QuadVertex>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![
                        0 => Float32x2,
                        1 => Float32x2,
                    ],
                }],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: config.format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });

        // Pixel art: no smoothing when scaling up to the window.
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("sprite_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let max_quads = 1024;
        let vertex_buffer = Self::create_vertex_buffer(&device, max_quads);
        let clear = self::clear_color(clear_color, config.format.is_srgb());

        tracing::info!(
            "wgpu backend ready: {:?} surface {}x{}, viewport {}x{}",
            config.format,
            config.width,
            config.height,
            viewport.width,
            viewport.height
        );

        Self {
            device,
            queue,
            surface,
            config,
            pipeline,
            texture_layout,
            sampler,
            vertex_buffer,
            max_quads,
            frame: Vec::new(),
            viewport,
            clear,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.config.width = width.max(1);
        self.config.height = height.max(1);
        self.surface.configure(&self.device, &self.config);
    }

    fn create_vertex_buffer(device: &wgpu::Device, quads: u64) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("sprite_vertex_buffer"),
            size: quads * VERTICES_PER_QUAD * std::mem::size_of::<QuadVertex>() as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn ensure_capacity(&mut self, quads: u64) {
        if quads <= self.max_quads {
            return;
        }
        let grown = quads.next_power_of_two();
        tracing::debug!("growing sprite vertex buffer to {grown} quads");
        self.vertex_buffer = Self::create_vertex_buffer(&self.device, grown);
        self.max_quads = grown;
    }
}

impl RenderBackend for WgpuBackend {
    type Texture = SpriteTexture;

    fn create_texture(&mut self, label: &str, image: &Bitmap) -> Result<SpriteTexture, RenderError> {
        let mut pass = CopyPass::begin(&self.device, label);
        let uploaded = pass
            .upload_texture(label, image.width, image.height, &image.pixels)
            .map_err(|e| RenderError::Texture(Box::new(e)))?;
        pass.finish(&self.queue)
            .map_err(|e| RenderError::Texture(Box::new(e)))?;

        debug_assert_eq!(uploaded.texture.format(), TEXTURE_FORMAT);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&uploaded.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        Ok(SpriteTexture {
            bind_group: Arc::new(bind_group),
            width: uploaded.width,
            height: uploaded.height,
        })
    }

    fn clear(&mut self) {
        self.frame.clear();
    }

    fn draw(&mut self, texture: &SpriteTexture, dst: Rect) {
        self.frame.push((texture.clone(), dst));
    }

    fn present(&mut self) -> Result<(), RenderError> {
        let frame = std::mem::take(&mut self.frame);
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                tracing::warn!("surface timed out, dropping frame");
                return Ok(());
            }
            Err(e) => return Err(RenderError::Present(Box::new(e))),
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        self.ensure_capacity(frame.len() as u64);
        let vertices: Vec<QuadVertex> = frame
            .iter()
            .flat_map(|(_, dst)| quad_vertices(*dst, self.viewport))
            .collect();
        if !vertices.is_empty() {
            self.queue
                .write_buffer(&self.vertex_buffer, 0, bytemuck::cast_slice(&vertices));
        }

        let letterbox = self
            .viewport
            .letterbox(self.config.width, self.config.height);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("sprite_encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("sprite_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                ..Default::default()
            });

            if letterbox.w >= 1.0 && letterbox.h >= 1.0 {
                pass.set_viewport(letterbox.x, letterbox.y, letterbox.w, letterbox.h, 0.0, 1.0);
                pass.set_pipeline(&self.pipeline);
                pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
                for (i, (texture, _)) in frame.iter().enumerate() {
                    let first = i as u32 * VERTICES_PER_QUAD as u32;
                    pass.set_bind_group(0, texture.bind_group.as_ref(), &[]);
                    pass.draw(first..first + VERTICES_PER_QUAD as u32, 0..1);
                }
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}
