//! Headless backend
//!
//! Allocates handles and tracks texture metadata without touching a GPU.
//! Every executed render pass is appended to an ordered log, which is what
//! the pipeline tests assert against.

use crate::backend::traits::*;
use crate::backend::types::*;
use std::collections::HashMap;

/// Metadata kept per allocated texture
#[derive(Debug, Clone)]
pub struct TextureRecord {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
    pub label: Option<String>,
}

/// One executed render pass, as seen by the headless backend
#[derive(Debug, Clone)]
pub struct PassRecord {
    pub label: Option<String>,
    pub color_views: Vec<TextureViewHandle>,
    pub has_depth: bool,
    pub draws: u32,
}

/// Headless backend implementation
#[derive(Default)]
pub struct HeadlessBackend {
    next_handle: u64,
    textures: HashMap<TextureHandle, TextureRecord>,
    views: HashMap<TextureViewHandle, TextureHandle>,
    buffers: HashMap<BufferHandle, BufferDescriptor>,
    samplers: Vec<SamplerHandle>,
    pipelines: Vec<RenderPipelineHandle>,
    bind_groups: Vec<BindGroupHandle>,
    open_pass: Option<PassRecord>,
    pass_log: Vec<PassRecord>,
    in_frame: bool,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    /// Ordered log of render passes executed since the last `begin_frame`
    pub fn pass_log(&self) -> &[PassRecord] {
        &self.pass_log
    }

    /// Metadata for an allocated texture
    pub fn texture_record(&self, texture: TextureHandle) -> Option<&TextureRecord> {
        self.textures.get(&texture)
    }

    /// Metadata for the texture behind a view
    pub fn view_record(&self, view: TextureViewHandle) -> Option<&TextureRecord> {
        self.views.get(&view).and_then(|t| self.textures.get(t))
    }

    /// Position of the first pass whose label contains `needle`
    pub fn pass_index(&self, needle: &str) -> Option<usize> {
        self.pass_log
            .iter()
            .position(|p| p.label.as_deref().is_some_and(|l| l.contains(needle)))
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn sampler_count(&self) -> usize {
        self.samplers.len()
    }

    pub fn bind_group_count(&self) -> usize {
        self.bind_groups.len()
    }
}

impl GraphicsBackend for HeadlessBackend {
    fn begin_frame(&mut self) -> BackendResult<()> {
        self.pass_log.clear();
        self.in_frame = true;
        Ok(())
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        self.in_frame = false;
        Ok(())
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        let handle = BufferHandle(self.next());
        self.buffers.insert(handle, desc.clone());
        Ok(handle)
    }

    fn write_buffer(&mut self, _buffer: BufferHandle, _offset: u64, _data: &[u8]) {}

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        let handle = TextureHandle(self.next());
        self.textures.insert(
            handle,
            TextureRecord {
                width: desc.width,
                height: desc.height,
                format: desc.format,
                usage: desc.usage,
                label: desc.label.clone(),
            },
        );
        Ok(handle)
    }

    fn create_texture_view(&mut self, texture: TextureHandle) -> BackendResult<TextureViewHandle> {
        if !self.textures.contains_key(&texture) {
            return Err(BackendError::TextureCreationFailed(
                "view requested for unknown texture".into(),
            ));
        }
        let view = TextureViewHandle(self.next());
        self.views.insert(view, texture);
        Ok(view)
    }

    fn write_texture(&mut self, _texture: TextureHandle, _data: &[u8], _width: u32, _height: u32) {}

    fn create_sampler(&mut self, _desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        let handle = SamplerHandle(self.next());
        self.samplers.push(handle);
        Ok(handle)
    }

    fn create_render_pipeline(
        &mut self,
        _desc: &PipelineDescriptor,
    ) -> BackendResult<RenderPipelineHandle> {
        let handle = RenderPipelineHandle(self.next());
        self.pipelines.push(handle);
        Ok(handle)
    }

    fn create_bind_group(
        &mut self,
        pipeline: RenderPipelineHandle,
        _desc: &BindGroupDescriptor,
    ) -> BackendResult<BindGroupHandle> {
        if !self.pipelines.contains(&pipeline) {
            return Err(BackendError::PipelineCreationFailed(
                "bind group requested for unknown pipeline".into(),
            ));
        }
        let handle = BindGroupHandle(self.next());
        self.bind_groups.push(handle);
        Ok(handle)
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        self.open_pass = Some(PassRecord {
            label: desc.label.clone(),
            color_views: desc.color_attachments.iter().map(|a| a.view).collect(),
            has_depth: desc.depth_attachment.is_some(),
            draws: 0,
        });
    }

    fn end_render_pass(&mut self) {
        if let Some(record) = self.open_pass.take() {
            self.pass_log.push(record);
        }
    }

    fn set_render_pipeline(&mut self, _pipeline: RenderPipelineHandle) {}

    fn set_bind_group(&mut self, _bind_group: BindGroupHandle) {}

    fn set_viewport(&mut self, _x: f32, _y: f32, _width: f32, _height: f32) {}

    fn draw(&mut self, _vertices: std::ops::Range<u32>, _instances: std::ops::Range<u32>) {
        if let Some(record) = self.open_pass.as_mut() {
            record.draws += 1;
        }
    }

    fn copy_texture(&mut self, _src: TextureHandle, _dst: TextureHandle, _width: u32, _height: u32) {
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer);
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture);
        self.views.retain(|_, t| *t != texture);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_metadata_is_tracked() {
        let mut backend = HeadlessBackend::new();
        let tex = backend
            .create_texture(&TextureDescriptor {
                label: Some("frame".into()),
                width: 640,
                height: 480,
                format: TextureFormat::Rgba16Float,
                usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
            })
            .unwrap();
        let view = backend.create_texture_view(tex).unwrap();

        let record = backend.view_record(view).unwrap();
        assert_eq!((record.width, record.height), (640, 480));
        assert_eq!(record.format, TextureFormat::Rgba16Float);
    }

    #[test]
    fn pass_log_preserves_order() {
        let mut backend = HeadlessBackend::new();
        backend.begin_frame().unwrap();
        for label in ["first", "second", "third"] {
            backend.begin_render_pass(&RenderPassDescriptor {
                label: Some(label.into()),
                color_attachments: Vec::new(),
                depth_attachment: None,
            });
            backend.end_render_pass();
        }
        backend.end_frame().unwrap();

        assert_eq!(backend.pass_log().len(), 3);
        assert!(backend.pass_index("first") < backend.pass_index("third"));
    }

    #[test]
    fn view_of_unknown_texture_fails() {
        let mut backend = HeadlessBackend::new();
        assert!(backend.create_texture_view(TextureHandle(99)).is_err());
    }

    #[test]
    fn depth_attachment_is_recorded() {
        let mut backend = HeadlessBackend::new();
        let tex = backend
            .create_texture(&TextureDescriptor {
                label: Some("depth".into()),
                width: 640,
                height: 480,
                format: TextureFormat::Depth32Float,
                usage: TextureUsage::RENDER_ATTACHMENT,
            })
            .unwrap();
        let view = backend.create_texture_view(tex).unwrap();

        backend.begin_frame().unwrap();
        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some("clear-depth".into()),
            color_attachments: Vec::new(),
            depth_attachment: Some(DepthAttachment {
                view,
                load_op: DepthLoadOp::Clear(1.0),
                store_op: StoreOp::Store,
            }),
        });
        backend.end_render_pass();
        backend.end_frame().unwrap();

        assert!(backend.pass_log()[0].has_depth);
    }

    #[test]
    fn bind_group_needs_a_known_pipeline() {
        let mut backend = HeadlessBackend::new();
        let desc = BindGroupDescriptor {
            label: None,
            entries: Vec::new(),
        };
        assert!(backend
            .create_bind_group(RenderPipelineHandle(99), &desc)
            .is_err());

        let pipeline = backend
            .create_render_pipeline(&PipelineDescriptor {
                label: None,
                shader_source: String::new(),
                color_format: TextureFormat::Rgba16Float,
            })
            .unwrap();
        assert!(backend.create_bind_group(pipeline, &desc).is_ok());
        assert_eq!(backend.bind_group_count(), 1);
    }
}
