//! Off-screen render targets
//!
//! All targets are owned by the [`Composer`](crate::composer::Composer);
//! consumers only ever see read-only view handles.

use crate::backend::{
    BackendResult, GraphicsBackend, TextureDescriptor, TextureFormat, TextureHandle, TextureUsage,
    TextureViewHandle,
};

/// Index of a render target inside the composer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(pub(crate) usize);

/// An off-screen color or depth buffer
pub struct RenderTarget {
    name: String,
    texture: TextureHandle,
    view: TextureViewHandle,
    width: u32,
    height: u32,
    format: TextureFormat,
    usage: TextureUsage,
}

impl RenderTarget {
    pub fn new<B: GraphicsBackend>(
        backend: &mut B,
        name: &str,
        width: u32,
        height: u32,
        format: TextureFormat,
        usage: TextureUsage,
    ) -> BackendResult<Self> {
        let texture = backend.create_texture(&TextureDescriptor {
            label: Some(name.to_string()),
            width,
            height,
            format,
            usage,
        })?;
        let view = backend.create_texture_view(texture)?;
        Ok(Self {
            name: name.to_string(),
            texture,
            view,
            width,
            height,
            format,
            usage,
        })
    }

    /// Recreate the texture at a new size, preserving format and usage.
    /// Calling with the current size is a no-op.
    pub fn resize<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        width: u32,
        height: u32,
    ) -> BackendResult<()> {
        if self.width == width && self.height == height {
            return Ok(());
        }
        backend.destroy_texture(self.texture);
        self.texture = backend.create_texture(&TextureDescriptor {
            label: Some(self.name.clone()),
            width,
            height,
            format: self.format,
            usage: self.usage,
        })?;
        self.view = backend.create_texture_view(self.texture)?;
        self.width = width;
        self.height = height;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn texture(&self) -> TextureHandle {
        self.texture
    }

    pub fn view(&self) -> TextureViewHandle {
        self.view
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;

    fn hdr_target(backend: &mut HeadlessBackend) -> RenderTarget {
        RenderTarget::new(
            backend,
            "frame",
            800,
            600,
            TextureFormat::Rgba16Float,
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
        )
        .unwrap()
    }

    #[test]
    fn resize_preserves_format() {
        let mut backend = HeadlessBackend::new();
        let mut target = hdr_target(&mut backend);

        target.resize(&mut backend, 1920, 1080).unwrap();
        assert_eq!(target.size(), (1920, 1080));
        assert_eq!(target.format(), TextureFormat::Rgba16Float);

        let record = backend.view_record(target.view()).unwrap();
        assert_eq!((record.width, record.height), (1920, 1080));
        assert_eq!(record.format, TextureFormat::Rgba16Float);
    }

    #[test]
    fn resize_to_same_size_keeps_handles() {
        let mut backend = HeadlessBackend::new();
        let mut target = hdr_target(&mut backend);
        let view = target.view();
        target.resize(&mut backend, 800, 600).unwrap();
        assert_eq!(target.view(), view);
    }
}
