//! Material definitions
//!
//! Materials describe how render objects consume the composer's layer
//! captures. The refraction material reads all three saved layers; the
//! animated background material only needs the frame time.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::backend::TextureViewHandle;

/// How a marble bends the layers behind it
#[derive(Debug, Clone, Copy)]
pub struct RefractionParams {
    pub ior: f32,
    pub fresnel_power: f32,
    pub tint: Vec3,
}

impl Default for RefractionParams {
    fn default() -> Self {
        Self {
            ior: 1.2,
            fresnel_power: 5.0,
            tint: Vec3::ONE,
        }
    }
}

/// Material sampling the saved target, backface and environment captures
#[derive(Debug, Clone)]
pub struct RefractionMaterial {
    pub params: RefractionParams,
    pub target_map: TextureViewHandle,
    pub backface_map: TextureViewHandle,
    pub environment_map: TextureViewHandle,
}

impl RefractionMaterial {
    pub fn new(
        target_map: TextureViewHandle,
        backface_map: TextureViewHandle,
        environment_map: TextureViewHandle,
    ) -> Self {
        Self {
            params: RefractionParams::default(),
            target_map,
            backface_map,
            environment_map,
        }
    }

    /// Refresh the capture views after a composer resize
    pub fn set_layer_views(
        &mut self,
        target_map: TextureViewHandle,
        backface_map: TextureViewHandle,
        environment_map: TextureViewHandle,
    ) {
        self.target_map = target_map;
        self.backface_map = backface_map;
        self.environment_map = environment_map;
    }

    pub fn uniform_data(&self, width: u32, height: u32) -> RefractionUniformData {
        RefractionUniformData {
            resolution: [width as f32, height as f32],
            ior: self.params.ior,
            fresnel_power: self.params.fresnel_power,
            tint: [self.params.tint.x, self.params.tint.y, self.params.tint.z, 1.0],
        }
    }
}

/// Refraction uniform data for GPU
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct RefractionUniformData {
    pub resolution: [f32; 2],
    pub ior: f32,
    pub fresnel_power: f32,
    pub tint: [f32; 4],
}

/// Material for the animated plane in the target scene
#[derive(Debug, Clone, Copy, Default)]
pub struct AnimatedBackgroundMaterial {
    pub speed: f32,
}

impl AnimatedBackgroundMaterial {
    pub fn uniform_data(&self, width: u32, height: u32, time: f32) -> BackgroundUniformData {
        BackgroundUniformData {
            resolution: [width as f32, height as f32],
            time: time * self.speed,
            _pad: 0.0,
        }
    }
}

/// Background uniform data for GPU
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BackgroundUniformData {
    pub resolution: [f32; 2],
    pub time: f32,
    pub _pad: f32,
}

/// All material kinds known to the scene
pub enum MaterialKind {
    Refraction(RefractionMaterial),
    /// Flat marker rendered only into the backface capture
    Backface,
    AnimatedBackground(AnimatedBackgroundMaterial),
    /// Unlit color modulated by an albedo texture, used for the room walls
    Unlit {
        color: Vec3,
        albedo: TextureViewHandle,
    },
}

/// Registry of materials addressed by `material_id` on render objects
#[derive(Default)]
pub struct MaterialRegistry {
    materials: Vec<MaterialKind>,
}

impl MaterialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, material: MaterialKind) -> usize {
        self.materials.push(material);
        self.materials.len() - 1
    }

    pub fn get(&self, id: usize) -> Option<&MaterialKind> {
        self.materials.get(id)
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut MaterialKind> {
        self.materials.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refraction_uniform_layout() {
        assert_eq!(std::mem::size_of::<RefractionUniformData>(), 32);
        assert_eq!(std::mem::size_of::<BackgroundUniformData>(), 16);
    }

    #[test]
    fn registry_hands_out_sequential_ids() {
        let mut registry = MaterialRegistry::new();
        let a = registry.add(MaterialKind::Backface);
        let b = registry.add(MaterialKind::AnimatedBackground(Default::default()));
        assert_eq!((a, b), (0, 1));
        assert!(matches!(registry.get(a), Some(MaterialKind::Backface)));
        assert!(registry.get(2).is_none());
    }
}
