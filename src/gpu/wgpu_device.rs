//! wgpu implementation of `GpuDevice`
//!
//! This module manages all the wgpu boilerplate:
//! - Device and queue initialization
//! - Program (shader module + render pipeline) creation with error scopes
//! - Luma texture creation, re-specification and uploads
//! - An offscreen RGBA render target sized to the viewport
//! - Per-frame command encoding and readback of the target

use std::collections::HashMap;

// Use wgpu from iced to avoid dependency conflicts with iced hosts
use iced_wgpu::wgpu;
use wgpu::util::DeviceExt;

use super::{
    BufferHandle, BufferKind, DrawCall, FilterMode, GpuDevice, ProgramDesc, ProgramHandle,
    SamplerParams, TextureHandle, VertexFormat, Viewport, WrapMode,
};
use crate::config::{GpuConfig, PowerPreference};
use crate::error::{PreviewError, Result};

/// Format of the offscreen render target
const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

struct WgpuProgram {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    texture_binding: u32,
    sampler_binding: u32,
}

struct LumaImage {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

struct WgpuTexture {
    sampler: wgpu::Sampler,
    image: Option<LumaImage>,
    /// Bind group for the last program this texture was drawn with
    bind_group: Option<(ProgramHandle, wgpu::BindGroup)>,
}

struct RenderTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

/// GPU device backed by wgpu, rendering into an offscreen target
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    next_id: u32,
    programs: HashMap<ProgramHandle, WgpuProgram>,
    buffers: HashMap<BufferHandle, wgpu::Buffer>,
    textures: HashMap<TextureHandle, WgpuTexture>,
    viewport: Viewport,
    target: Option<RenderTarget>,
    encoder: Option<wgpu::CommandEncoder>,
}

// Manual Debug implementation (wgpu types don't implement Debug)
impl std::fmt::Debug for WgpuDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuDevice")
            .field("programs", &self.programs.len())
            .field("buffers", &self.buffers.len())
            .field("textures", &self.textures.len())
            .field("viewport", &self.viewport)
            .finish_non_exhaustive()
    }
}

/// Run `f` inside an error scope and report whatever error it raised
fn scoped<T>(
    device: &wgpu::Device,
    filter: wgpu::ErrorFilter,
    f: impl FnOnce(&wgpu::Device) -> T,
) -> std::result::Result<T, wgpu::Error> {
    device.push_error_scope(filter);
    let value = f(device);
    match pollster::block_on(device.pop_error_scope()) {
        Some(err) => Err(err),
        None => Ok(value),
    }
}

fn vertex_format(format: VertexFormat) -> wgpu::VertexFormat {
    match format {
        VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
        VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
    }
}

impl WgpuDevice {
    /// Request an adapter and device according to `config`
    pub async fn new(config: &GpuConfig) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let power_preference = match config.power_preference {
            PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
            PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
        };

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter: config.force_fallback_adapter,
            })
            .await
            .ok_or(PreviewError::NoAdapter)?;

        let info = adapter.get_info();
        tracing::info!(adapter = %info.name, backend = ?info.backend, "GPU adapter selected");

        // Downlevel limits so GLES-class mobile GPUs qualify
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some(&config.label),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults()
                        .using_resolution(adapter.limits()),
                },
                None,
            )
            .await
            .map_err(|e| PreviewError::DeviceRequest(e.to_string()))?;

        Ok(Self::from_parts(device, queue))
    }

    /// Wrap a device and queue the host already owns
    pub fn from_parts(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            next_id: 0,
            programs: HashMap::new(),
            buffers: HashMap::new(),
            textures: HashMap::new(),
            viewport: Viewport::default(),
            target: None,
            encoder: None,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// The offscreen target frames are rendered into, for host compositing
    pub fn target_view(&self) -> Option<&wgpu::TextureView> {
        self.target.as_ref().map(|target| &target.view)
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    /// Copy the render target back as tightly packed RGBA bytes
    ///
    /// Slow (full GPU round trip); meant for snapshots, not the frame loop.
    pub fn read_target(&self) -> Result<Option<(u32, u32, Vec<u8>)>> {
        let Some(target) = &self.target else {
            return Ok(None);
        };
        let (width, height) = (target.width, target.height);

        // Buffer copies need rows aligned to 256 bytes
        let bytes_per_row = width * 4;
        let padded_bytes_per_row = (bytes_per_row + 255) & !255;
        let buffer_size = (padded_bytes_per_row * height) as u64;

        let output_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Target Readback Buffer"),
            size: buffer_size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &output_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let buffer_slice = output_buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            // The receiver only disappears if we already bailed out
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| PreviewError::Readback(e.to_string()))?
            .map_err(|e| PreviewError::Readback(e.to_string()))?;

        let data = buffer_slice.get_mapped_range();
        let mut output = Vec::with_capacity((bytes_per_row * height) as usize);
        for y in 0..height {
            let start = (y * padded_bytes_per_row) as usize;
            let end = start + bytes_per_row as usize;
            output.extend_from_slice(&data[start..end]);
        }

        drop(data);
        output_buffer.unmap();
        Ok(Some((width, height, output)))
    }

    fn resize_target(&mut self) {
        if self.viewport.is_empty() {
            self.target = None;
            return;
        }
        let max = self.device.limits().max_texture_dimension_2d;
        if self.viewport.width > max || self.viewport.height > max {
            tracing::warn!(viewport = ?self.viewport, max, "viewport exceeds device limit, clamping target");
        }
        let (width, height) = (self.viewport.width.min(max), self.viewport.height.min(max));

        if let Some(target) = &self.target {
            if target.width == width && target.height == height {
                return;
            }
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Preview Render Target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        if let Some(old) = self.target.replace(RenderTarget {
            texture,
            view,
            width,
            height,
        }) {
            old.texture.destroy();
        }
        tracing::debug!(width, height, "render target resized");
    }
}

impl GpuDevice for WgpuDevice {
    fn create_program(&mut self, desc: &ProgramDesc<'_>) -> Result<ProgramHandle> {
        let shader = scoped(&self.device, wgpu::ErrorFilter::Validation, |device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(desc.label),
                source: wgpu::ShaderSource::Wgsl(desc.source.into()),
            })
        })
        .map_err(|e| PreviewError::ShaderCompile(e.to_string()))?;

        let bind_group_layout =
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("Luma Bind Group Layout"),
                    entries: &[
                        wgpu::BindGroupLayoutEntry {
                            binding: desc.texture_binding,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Texture {
                                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                                view_dimension: wgpu::TextureViewDimension::D2,
                                multisampled: false,
                            },
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: desc.sampler_binding,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                            count: None,
                        },
                    ],
                });

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Luma Pipeline Layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let attributes: Vec<wgpu::VertexAttribute> = desc
            .layout
            .attributes
            .iter()
            .map(|attribute| wgpu::VertexAttribute {
                format: vertex_format(attribute.format),
                offset: attribute.offset,
                shader_location: attribute.location,
            })
            .collect();

        // Pipeline creation is where stage interfaces get matched up
        let pipeline = scoped(&self.device, wgpu::ErrorFilter::Validation, |device| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(desc.label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: desc.vertex_entry,
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: desc.layout.stride,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &attributes,
                    }],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: desc.fragment_entry,
                    targets: &[Some(wgpu::ColorTargetState {
                        format: TARGET_FORMAT,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    unclipped_depth: false,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState {
                    count: 1,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview: None,
            })
        })
        .map_err(|e| PreviewError::ProgramLink(e.to_string()))?;

        let handle = ProgramHandle::from_raw(self.next_id());
        self.programs.insert(
            handle,
            WgpuProgram {
                pipeline,
                bind_group_layout,
                texture_binding: desc.texture_binding,
                sampler_binding: desc.sampler_binding,
            },
        );
        Ok(handle)
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program);
        for texture in self.textures.values_mut() {
            if matches!(&texture.bind_group, Some((owner, _)) if *owner == program) {
                texture.bind_group = None;
            }
        }
    }

    fn create_buffer(&mut self, kind: BufferKind, contents: &[u8]) -> Result<BufferHandle> {
        let usage = match kind {
            BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
            BufferKind::Index => wgpu::BufferUsages::INDEX,
        };
        let buffer = scoped(&self.device, wgpu::ErrorFilter::OutOfMemory, |device| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(kind.label()),
                contents,
                usage,
            })
        })
        .map_err(|e| PreviewError::BufferCreation {
            kind: kind.label(),
            reason: e.to_string(),
        })?;

        let handle = BufferHandle::from_raw(self.next_id());
        self.buffers.insert(handle, buffer);
        Ok(handle)
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if let Some(buffer) = self.buffers.remove(&buffer) {
            buffer.destroy();
        }
    }

    fn create_texture(&mut self, params: &SamplerParams) -> Result<TextureHandle> {
        let filter = match params.filter {
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
            FilterMode::Linear => wgpu::FilterMode::Linear,
        };
        let address_mode = match params.wrap {
            WrapMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            WrapMode::Repeat => wgpu::AddressMode::Repeat,
        };
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Luma Sampler"),
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: wgpu::FilterMode::Nearest,
            lod_max_clamp: if params.mipmaps { 32.0 } else { 0.0 },
            ..Default::default()
        });

        let handle = TextureHandle::from_raw(self.next_id());
        self.textures.insert(
            handle,
            WgpuTexture {
                sampler,
                image: None,
                bind_group: None,
            },
        );
        Ok(handle)
    }

    fn upload_luma(
        &mut self,
        texture: TextureHandle,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<()> {
        if width == 0 || height == 0 || pixels.len() != width as usize * height as usize {
            return Err(PreviewError::TextureCreation(format!(
                "{width}x{height} upload with {} bytes",
                pixels.len()
            )));
        }
        let max = self.device.limits().max_texture_dimension_2d;
        if width > max || height > max {
            return Err(PreviewError::TextureCreation(format!(
                "{width}x{height} exceeds the device limit of {max}"
            )));
        }
        let respecify = match self.textures.get(&texture) {
            None => return Err(PreviewError::UnknownHandle("texture")),
            Some(entry) => entry
                .image
                .as_ref()
                .map_or(true, |image| image.width != width || image.height != height),
        };

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        if respecify {
            let new_texture = scoped(&self.device, wgpu::ErrorFilter::OutOfMemory, |device| {
                device.create_texture(&wgpu::TextureDescriptor {
                    label: Some("Luma Texture (R8Unorm)"),
                    size,
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: wgpu::TextureFormat::R8Unorm,
                    usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                    view_formats: &[],
                })
            })
            .map_err(|e| PreviewError::TextureCreation(e.to_string()))?;
            let view = new_texture.create_view(&wgpu::TextureViewDescriptor::default());

            if let Some(entry) = self.textures.get_mut(&texture) {
                if let Some(old) = entry.image.replace(LumaImage {
                    texture: new_texture,
                    view,
                    width,
                    height,
                }) {
                    old.texture.destroy();
                }
                entry.bind_group = None;
            }
            tracing::debug!(width, height, "luma texture respecified");
        }

        let Some(image) = self
            .textures
            .get(&texture)
            .and_then(|entry| entry.image.as_ref())
        else {
            return Err(PreviewError::UnknownHandle("texture"));
        };

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &image.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(width), // 1 byte per pixel (luma)
                rows_per_image: Some(height),
            },
            size,
        );
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if let Some(entry) = self.textures.remove(&texture) {
            if let Some(image) = entry.image {
                image.texture.destroy();
            }
        }
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.resize_target();
    }

    fn begin_frame(&mut self, clear_color: [f32; 4]) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Preview Frame Encoder"),
            });

        if let Some(target) = &self.target {
            let [r, g, b, a] = clear_color.map(f64::from);
            let _clear = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Clear Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }

        if self.encoder.replace(encoder).is_some() {
            tracing::warn!("begin_frame without end_frame; previous frame discarded");
        }
    }

    fn draw_indexed(&mut self, call: &DrawCall) {
        let Some(encoder) = self.encoder.as_mut() else {
            tracing::warn!("draw outside begin_frame/end_frame ignored");
            return;
        };
        let Some(target) = &self.target else {
            tracing::trace!("no render target (zero viewport), draw skipped");
            return;
        };
        let (Some(program), Some(vertices), Some(indices), Some(texture)) = (
            self.programs.get(&call.program),
            self.buffers.get(&call.vertices),
            self.buffers.get(&call.indices),
            self.textures.get_mut(&call.texture),
        ) else {
            tracing::warn!(?call, "draw with unknown handle ignored");
            return;
        };
        let Some(image) = &texture.image else {
            tracing::trace!("texture has no image yet, draw skipped");
            return;
        };

        let stale = !matches!(&texture.bind_group, Some((owner, _)) if *owner == call.program);
        if stale {
            let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Luma Bind Group"),
                layout: &program.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: program.texture_binding,
                        resource: wgpu::BindingResource::TextureView(&image.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: program.sampler_binding,
                        resource: wgpu::BindingResource::Sampler(&texture.sampler),
                    },
                ],
            });
            texture.bind_group = Some((call.program, group));
        }
        let Some((_, bind_group)) = &texture.bind_group else {
            return;
        };

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Luma Quad Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        render_pass.set_viewport(
            0.0,
            0.0,
            target.width as f32,
            target.height as f32,
            0.0,
            1.0,
        );
        render_pass.set_pipeline(&program.pipeline);
        render_pass.set_bind_group(0, bind_group, &[]);
        render_pass.set_vertex_buffer(0, vertices.slice(..));
        render_pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint16);
        render_pass.draw_indexed(0..call.index_count, 0, 0..1);
    }

    fn end_frame(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(Some(encoder.finish()));
        }
    }
}
