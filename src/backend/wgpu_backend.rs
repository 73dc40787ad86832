//! Offscreen wgpu backend
//!
//! No surface or swapchain: the composer renders into its own targets and the
//! presentation texture is readable like any other. Render pass commands are
//! buffered and replayed at `end_render_pass`, so callers never hold the
//! encoder borrow across trait calls.

use crate::backend::traits::*;
use crate::backend::types::*;
use std::collections::HashMap;

/// Buffered render pass command
#[derive(Clone)]
enum RenderCommand {
    SetPipeline(RenderPipelineHandle),
    SetBindGroup(BindGroupHandle),
    SetViewport {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
    Draw {
        vertices: std::ops::Range<u32>,
        instances: std::ops::Range<u32>,
    },
}

/// Pending render pass with buffered commands
struct PendingRenderPass {
    descriptor: RenderPassDescriptor,
    commands: Vec<RenderCommand>,
}

/// wgpu backend implementation
pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    device: wgpu::Device,
    queue: wgpu::Queue,

    next_handle: u64,
    textures: HashMap<TextureHandle, wgpu::Texture>,
    views: HashMap<TextureViewHandle, wgpu::TextureView>,
    buffers: HashMap<BufferHandle, wgpu::Buffer>,
    samplers: HashMap<SamplerHandle, wgpu::Sampler>,
    pipelines: HashMap<RenderPipelineHandle, wgpu::RenderPipeline>,
    bind_groups: HashMap<BindGroupHandle, wgpu::BindGroup>,

    encoder: Option<wgpu::CommandEncoder>,
    pending_render_pass: Option<PendingRenderPass>,
}

fn map_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
    }
}

fn map_texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
    let mut out = wgpu::TextureUsages::empty();
    if usage.contains(TextureUsage::COPY_SRC) {
        out |= wgpu::TextureUsages::COPY_SRC;
    }
    if usage.contains(TextureUsage::COPY_DST) {
        out |= wgpu::TextureUsages::COPY_DST;
    }
    if usage.contains(TextureUsage::TEXTURE_BINDING) {
        out |= wgpu::TextureUsages::TEXTURE_BINDING;
    }
    if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
        out |= wgpu::TextureUsages::RENDER_ATTACHMENT;
    }
    out
}

fn map_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
    let mut out = wgpu::BufferUsages::empty();
    if usage.contains(BufferUsage::COPY_DST) {
        out |= wgpu::BufferUsages::COPY_DST;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        out |= wgpu::BufferUsages::UNIFORM;
    }
    if usage.contains(BufferUsage::VERTEX) {
        out |= wgpu::BufferUsages::VERTEX;
    }
    if usage.contains(BufferUsage::INDEX) {
        out |= wgpu::BufferUsages::INDEX;
    }
    out
}

fn map_filter(mode: FilterMode) -> wgpu::FilterMode {
    match mode {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

impl WgpuBackend {
    /// Create an offscreen backend on the first available adapter
    pub fn new() -> BackendResult<Self> {
        pollster::block_on(Self::new_async())
    }

    pub async fn new_async() -> BackendResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| BackendError::InitializationFailed("No suitable adapter found".into()))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?} backend)",
            adapter_info.name,
            adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Marble Scene Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))?;

        Ok(Self {
            instance,
            device,
            queue,
            next_handle: 0,
            textures: HashMap::new(),
            views: HashMap::new(),
            buffers: HashMap::new(),
            samplers: HashMap::new(),
            pipelines: HashMap::new(),
            bind_groups: HashMap::new(),
            encoder: None,
            pending_render_pass: None,
        })
    }

    fn next(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        if self.encoder.is_none() {
            self.encoder = Some(
                self.device
                    .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                        label: Some("Frame Encoder"),
                    }),
            );
        }
        self.encoder.as_mut().unwrap()
    }
}

impl GraphicsBackend for WgpuBackend {
    fn begin_frame(&mut self) -> BackendResult<()> {
        self.encoder = Some(
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Frame Encoder"),
                }),
        );
        Ok(())
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
        Ok(())
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: desc.label.as_deref(),
            size: desc.size,
            usage: map_buffer_usage(desc.usage),
            mapped_at_creation: false,
        });
        let handle = BufferHandle(self.next());
        self.buffers.insert(handle, buffer);
        Ok(handle)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        if let Some(buf) = self.buffers.get(&buffer) {
            self.queue.write_buffer(buf, offset, data);
        }
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: map_format(desc.format),
            usage: map_texture_usage(desc.usage),
            view_formats: &[],
        });
        let handle = TextureHandle(self.next());
        self.textures.insert(handle, texture);
        Ok(handle)
    }

    fn create_texture_view(&mut self, texture: TextureHandle) -> BackendResult<TextureViewHandle> {
        let tex = self.textures.get(&texture).ok_or_else(|| {
            BackendError::TextureCreationFailed("view requested for unknown texture".into())
        })?;
        let view = tex.create_view(&wgpu::TextureViewDescriptor::default());
        let handle = TextureViewHandle(self.next());
        self.views.insert(handle, view);
        Ok(handle)
    }

    fn write_texture(&mut self, texture: TextureHandle, data: &[u8], width: u32, height: u32) {
        let Some(tex) = self.textures.get(&texture) else {
            return;
        };
        let bytes_per_row = data.len() as u32 / height;
        self.queue.write_texture(
            tex.as_image_copy(),
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: desc.label.as_deref(),
            mag_filter: map_filter(desc.mag_filter),
            min_filter: map_filter(desc.min_filter),
            ..Default::default()
        });
        let handle = SamplerHandle(self.next());
        self.samplers.insert(handle, sampler);
        Ok(handle)
    }

    fn create_render_pipeline(
        &mut self,
        desc: &PipelineDescriptor,
    ) -> BackendResult<RenderPipelineHandle> {
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: desc.label.as_deref(),
                source: wgpu::ShaderSource::Wgsl(desc.shader_source.as_str().into()),
            });

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: desc.label.as_deref(),
                layout: None,
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: "vs_main",
                    compilation_options: Default::default(),
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: "fs_main",
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: map_format(desc.color_format),
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            });

        let handle = RenderPipelineHandle(self.next());
        self.pipelines.insert(handle, pipeline);
        Ok(handle)
    }

    fn create_bind_group(
        &mut self,
        pipeline: RenderPipelineHandle,
        desc: &BindGroupDescriptor,
    ) -> BackendResult<BindGroupHandle> {
        let layout = self
            .pipelines
            .get(&pipeline)
            .ok_or_else(|| {
                BackendError::PipelineCreationFailed(
                    "bind group requested for unknown pipeline".into(),
                )
            })?
            .get_bind_group_layout(0);

        let mut entries = Vec::with_capacity(desc.entries.len());
        for (binding, resource) in desc.entries.iter().enumerate() {
            let resource = match resource {
                BindingResource::TextureView(handle) => wgpu::BindingResource::TextureView(
                    self.views.get(handle).ok_or_else(|| {
                        BackendError::PipelineCreationFailed(
                            "bind group references unknown texture view".into(),
                        )
                    })?,
                ),
                BindingResource::Sampler(handle) => wgpu::BindingResource::Sampler(
                    self.samplers.get(handle).ok_or_else(|| {
                        BackendError::PipelineCreationFailed(
                            "bind group references unknown sampler".into(),
                        )
                    })?,
                ),
                BindingResource::Buffer(handle) => self
                    .buffers
                    .get(handle)
                    .ok_or_else(|| {
                        BackendError::PipelineCreationFailed(
                            "bind group references unknown buffer".into(),
                        )
                    })?
                    .as_entire_binding(),
            };
            entries.push(wgpu::BindGroupEntry {
                binding: binding as u32,
                resource,
            });
        }

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: desc.label.as_deref(),
            layout: &layout,
            entries: &entries,
        });
        let handle = BindGroupHandle(self.next());
        self.bind_groups.insert(handle, bind_group);
        Ok(handle)
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        self.pending_render_pass = Some(PendingRenderPass {
            descriptor: desc.clone(),
            commands: Vec::new(),
        });
    }

    fn end_render_pass(&mut self) {
        let Some(pending) = self.pending_render_pass.take() else {
            return;
        };

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = pending
            .descriptor
            .color_attachments
            .iter()
            .filter_map(|att| {
                self.views
                    .get(&att.view)
                    .map(|view| (view, att.load_op.clone(), att.store_op))
            })
            .map(|(view, load_op, store_op)| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: match load_op {
                            LoadOp::Clear([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                                r: r as f64,
                                g: g as f64,
                                b: b as f64,
                                a: a as f64,
                            }),
                            LoadOp::Load => wgpu::LoadOp::Load,
                        },
                        store: match store_op {
                            StoreOp::Store => wgpu::StoreOp::Store,
                            StoreOp::Discard => wgpu::StoreOp::Discard,
                        },
                    },
                })
            })
            .collect();

        let depth_stencil_attachment = pending.descriptor.depth_attachment.as_ref().and_then(|d| {
            self.views
                .get(&d.view)
                .map(|view| wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: match d.load_op {
                            DepthLoadOp::Clear(value) => wgpu::LoadOp::Clear(value),
                            DepthLoadOp::Load => wgpu::LoadOp::Load,
                        },
                        store: match d.store_op {
                            StoreOp::Store => wgpu::StoreOp::Store,
                            StoreOp::Discard => wgpu::StoreOp::Discard,
                        },
                    }),
                    stencil_ops: None,
                })
        });

        let pipelines = &self.pipelines;
        let bind_groups = &self.bind_groups;
        let encoder = match self.encoder.as_mut() {
            Some(encoder) => encoder,
            None => return,
        };

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: pending.descriptor.label.as_deref(),
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        let mut pipeline_bound = false;
        for command in &pending.commands {
            match command {
                RenderCommand::SetPipeline(handle) => {
                    if let Some(pipeline) = pipelines.get(handle) {
                        render_pass.set_pipeline(pipeline);
                        pipeline_bound = true;
                    }
                }
                RenderCommand::SetBindGroup(handle) => {
                    if let Some(bind_group) = bind_groups.get(handle) {
                        render_pass.set_bind_group(0, bind_group, &[]);
                    }
                }
                RenderCommand::SetViewport {
                    x,
                    y,
                    width,
                    height,
                } => {
                    render_pass.set_viewport(*x, *y, *width, *height, 0.0, 1.0);
                }
                RenderCommand::Draw {
                    vertices,
                    instances,
                } => {
                    // scene passes record per-object draws that have no GPU
                    // pipeline behind them; a draw without a pipeline cannot
                    // pass wgpu validation, so only pipelined draws replay
                    if pipeline_bound {
                        render_pass.draw(vertices.clone(), instances.clone());
                    }
                }
            }
        }
        // render_pass drops here, closing the pass
    }

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        if let Some(pending) = self.pending_render_pass.as_mut() {
            pending.commands.push(RenderCommand::SetPipeline(pipeline));
        }
    }

    fn set_bind_group(&mut self, bind_group: BindGroupHandle) {
        if let Some(pending) = self.pending_render_pass.as_mut() {
            pending.commands.push(RenderCommand::SetBindGroup(bind_group));
        }
    }

    fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32) {
        if let Some(pending) = self.pending_render_pass.as_mut() {
            pending.commands.push(RenderCommand::SetViewport {
                x,
                y,
                width,
                height,
            });
        }
    }

    fn draw(&mut self, vertices: std::ops::Range<u32>, instances: std::ops::Range<u32>) {
        if let Some(pending) = self.pending_render_pass.as_mut() {
            pending.commands.push(RenderCommand::Draw {
                vertices,
                instances,
            });
        }
    }

    fn copy_texture(&mut self, src: TextureHandle, dst: TextureHandle, width: u32, height: u32) {
        self.encoder();
        let (Some(src), Some(dst)) = (self.textures.get(&src), self.textures.get(&dst)) else {
            return;
        };
        let encoder = self.encoder.as_mut().expect("encoder created above");
        encoder.copy_texture_to_texture(
            src.as_image_copy(),
            dst.as_image_copy(),
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer);
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture);
    }
}
