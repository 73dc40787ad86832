//! Texture loading and management

use crate::backend::{
    BackendResult, GraphicsBackend, TextureDescriptor, TextureFormat, TextureHandle, TextureUsage,
    TextureViewHandle,
};
use crate::error::{SceneError, SceneResult};
use image::GenericImageView;
use std::path::Path;

/// CPU-side texture data
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub data: Vec<u8>,
    pub name: String,
}

impl TextureData {
    /// Load texture from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> SceneResult<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let img = image::open(path).map_err(|e| SceneError::Texture(e.to_string()))?;
        Ok(Self::from_image(img, &name))
    }

    /// Load texture from bytes
    pub fn from_bytes(bytes: &[u8], name: &str) -> SceneResult<Self> {
        let img =
            image::load_from_memory(bytes).map_err(|e| SceneError::Texture(e.to_string()))?;
        Ok(Self::from_image(img, name))
    }

    fn from_image(img: image::DynamicImage, name: &str) -> Self {
        let (width, height) = img.dimensions();
        let data = img.to_rgba8().into_raw();
        Self {
            width,
            height,
            format: TextureFormat::Rgba8UnormSrgb,
            data,
            name: name.to_string(),
        }
    }

    /// Create a solid color texture
    pub fn solid_color(color: [u8; 4], name: &str) -> Self {
        Self {
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8UnormSrgb,
            data: color.to_vec(),
            name: name.to_string(),
        }
    }

    /// Create a default white texture
    pub fn white() -> Self {
        Self::solid_color([255, 255, 255, 255], "white")
    }

    /// Deterministic grayscale noise used as the glitch perturbation map
    pub fn perturbation(size: u32) -> Self {
        let mut data = Vec::with_capacity((size * size * 4) as usize);
        let mut state: u32 = 0x9e37_79b9;
        for _ in 0..size * size {
            // xorshift32
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let v = (state >> 24) as u8;
            data.extend_from_slice(&[v, v, v, 255]);
        }
        Self {
            width: size,
            height: size,
            format: TextureFormat::Rgba8Unorm,
            data,
            name: "perturbation".to_string(),
        }
    }
}

/// GPU texture with its view
pub struct GpuTexture {
    pub handle: TextureHandle,
    pub view: TextureViewHandle,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub name: String,
}

impl GpuTexture {
    /// Create and upload texture to GPU
    pub fn create<B: GraphicsBackend>(
        backend: &mut B,
        data: &TextureData,
    ) -> BackendResult<Self> {
        let handle = backend.create_texture(&TextureDescriptor {
            label: Some(data.name.clone()),
            width: data.width,
            height: data.height,
            format: data.format,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        })?;
        let view = backend.create_texture_view(handle)?;
        backend.write_texture(handle, &data.data, data.width, data.height);

        Ok(Self {
            handle,
            view,
            width: data.width,
            height: data.height,
            format: data.format,
            name: data.name.clone(),
        })
    }
}

/// Named texture store with a fallback for assets that are not ready yet
///
/// Lookups by name never fail: until an asset is inserted, consumers get the
/// solid white fallback and keep rendering.
pub struct AssetStore {
    fallback: GpuTexture,
    textures: std::collections::HashMap<String, GpuTexture>,
}

impl AssetStore {
    pub fn new<B: GraphicsBackend>(backend: &mut B) -> BackendResult<Self> {
        let fallback = GpuTexture::create(backend, &TextureData::white())?;
        Ok(Self {
            fallback,
            textures: std::collections::HashMap::new(),
        })
    }

    /// Insert or replace a named texture, resolving any fallback users
    pub fn insert(&mut self, name: &str, texture: GpuTexture) {
        self.textures.insert(name.to_string(), texture);
    }

    pub fn get(&self, name: &str) -> Option<&GpuTexture> {
        self.textures.get(name)
    }

    /// View for a named texture, or the fallback while it is not ready
    pub fn view_or_fallback(&self, name: &str) -> TextureViewHandle {
        match self.textures.get(name) {
            Some(texture) => texture.view,
            None => {
                log::warn!("texture '{name}' not ready, using fallback");
                self.fallback.view
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;

    #[test]
    fn missing_asset_falls_back_then_resolves() {
        let mut backend = HeadlessBackend::new();
        let mut store = AssetStore::new(&mut backend).unwrap();
        let fallback_view = store.view_or_fallback("noise");
        assert!(store.get("noise").is_none());

        let noise = GpuTexture::create(&mut backend, &TextureData::perturbation(8)).unwrap();
        let noise_view = noise.view;
        store.insert("noise", noise);

        assert_ne!(store.view_or_fallback("noise"), fallback_view);
        assert_eq!(store.view_or_fallback("noise"), noise_view);
    }

    #[test]
    fn perturbation_map_is_deterministic() {
        let a = TextureData::perturbation(16);
        let b = TextureData::perturbation(16);
        assert_eq!(a.data, b.data);
        assert_eq!(a.data.len(), 16 * 16 * 4);
    }

    #[test]
    fn invalid_image_bytes_are_an_error() {
        let result = TextureData::from_bytes(&[0, 1, 2, 3], "broken");
        assert!(matches!(result, Err(SceneError::Texture(_))));
    }

    #[test]
    fn upload_records_dimensions() {
        let mut backend = HeadlessBackend::new();
        let texture = GpuTexture::create(&mut backend, &TextureData::perturbation(32)).unwrap();
        let record = backend.texture_record(texture.handle).unwrap();
        assert_eq!((record.width, record.height), (32, 32));
    }
}
