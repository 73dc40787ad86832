//! Scene management

mod camera;
mod layers;
mod rig;
mod transform;

pub use camera::*;
pub use layers::*;
pub use rig::*;
pub use transform::*;

use glam::Vec3;

/// Identifier of a render object inside a [`Scene`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectId(pub usize);

/// A renderable object in the scene
#[derive(Debug, Clone)]
pub struct RenderObject {
    pub mesh_id: usize,
    pub material_id: usize,
    pub transform: Transform,
    pub layers: LayerMask,
}

impl RenderObject {
    pub fn new(mesh_id: usize, material_id: usize) -> Self {
        Self {
            mesh_id,
            material_id,
            transform: Transform::default(),
            layers: LayerMask::DEFAULT,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.transform.position = position;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.transform.scale = scale;
        self
    }

    pub fn with_layers(mut self, layers: LayerMask) -> Self {
        self.layers = layers;
        self
    }
}

/// The scene containing all renderable content
///
/// Marble proxies live here as ordinary objects; the physics chain writes
/// their transforms every frame and never reads them back.
pub struct Scene {
    pub objects: Vec<RenderObject>,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
        }
    }

    /// Add a render object to the scene
    pub fn add_object(&mut self, object: RenderObject) -> ObjectId {
        let id = ObjectId(self.objects.len());
        self.objects.push(object);
        id
    }

    pub fn object(&self, id: ObjectId) -> &RenderObject {
        &self.objects[id.0]
    }

    pub fn object_mut(&mut self, id: ObjectId) -> &mut RenderObject {
        &mut self.objects[id.0]
    }

    /// Objects visible to a camera with the given layer mask
    pub fn visible_objects(&self, layers: LayerMask) -> impl Iterator<Item = &RenderObject> {
        self.objects.iter().filter(move |o| o.layers.intersects(layers))
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_filtering() {
        let mut scene = Scene::new();
        scene.add_object(RenderObject::new(0, 0)); // default layer
        scene.add_object(RenderObject::new(1, 0).with_layers(LayerMask::ENVIRONMENT));
        scene.add_object(
            RenderObject::new(2, 0).with_layers(LayerMask::DEFAULT | LayerMask::ENVIRONMENT),
        );

        assert_eq!(scene.visible_objects(LayerMask::DEFAULT).count(), 2);
        assert_eq!(scene.visible_objects(LayerMask::ENVIRONMENT).count(), 2);
        assert_eq!(scene.visible_objects(LayerMask::BACKFACE).count(), 0);
    }

    #[test]
    fn object_ids_are_stable() {
        let mut scene = Scene::new();
        let a = scene.add_object(RenderObject::new(7, 0));
        let b = scene.add_object(RenderObject::new(8, 0));
        assert_eq!(scene.object(a).mesh_id, 7);
        assert_eq!(scene.object(b).mesh_id, 8);
    }
}
