//! Camera system

use crate::scene::layers::LayerMask;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec2, Vec3, Vec4, Vec4Swizzles};

/// Perspective projection parameters
#[derive(Debug, Clone, Copy)]
pub struct Projection {
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            fov_y: 50f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

impl Projection {
    pub fn new(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            fov_y: fov_y_degrees.to_radians(),
            aspect,
            near,
            far,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }
}

/// Camera with a world pose and a visibility layer mask
///
/// The pose is stored as position + rotation (not look-at) because layer
/// cameras mirror the primary camera by copying both fields verbatim.
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub rotation: Quat,
    pub projection: Projection,
    pub layers: LayerMask,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 40.0),
            rotation: Quat::IDENTITY,
            projection: Projection::default(),
            layers: LayerMask::DEFAULT,
        }
    }
}

impl Camera {
    pub fn new(position: Vec3, projection: Projection, layers: LayerMask) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
            projection,
            layers,
        }
    }

    /// Point the camera at a target position
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        let view = Mat4::look_at_rh(self.position, target, up);
        self.rotation = Quat::from_mat4(&view.inverse());
    }

    /// Copy position and orientation from another camera
    pub fn copy_pose(&mut self, other: &Camera) {
        self.position = other.position;
        self.rotation = other.rotation;
    }

    /// World matrix of the camera pose
    pub fn world_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }

    /// View matrix (inverse of the world pose)
    pub fn view_matrix(&self) -> Mat4 {
        self.world_matrix().inverse()
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection.matrix()
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Forward direction (local -Z in world space)
    pub fn forward(&self) -> Vec3 {
        self.rotation * -Vec3::Z
    }

    /// Update aspect ratio after a viewport resize
    pub fn set_aspect(&mut self, width: f32, height: f32) {
        self.projection.aspect = width / height;
    }

    /// Project a viewport pixel onto the world plane `z = plane_z`
    ///
    /// Used to turn pointer positions into drag targets. Returns `None` when
    /// the pick ray runs parallel to the plane.
    pub fn unproject_to_plane(
        &self,
        pixel: Vec2,
        viewport: Vec2,
        plane_z: f32,
    ) -> Option<Vec3> {
        let ndc = Vec2::new(
            2.0 * pixel.x / viewport.x - 1.0,
            1.0 - 2.0 * pixel.y / viewport.y,
        );
        let inv = self.view_projection_matrix().inverse();

        let near = inv * Vec4::new(ndc.x, ndc.y, 0.0, 1.0);
        let far = inv * Vec4::new(ndc.x, ndc.y, 1.0, 1.0);
        let near = near.xyz() / near.w;
        let far = far.xyz() / far.w;

        let dir = far - near;
        // the ray spans the whole frustum depth, so the parallel test has to
        // be relative to its length
        if dir.z.abs() < 1e-6 * dir.length() {
            return None;
        }
        let t = (plane_z - near.z) / dir.z;
        (t >= 0.0).then(|| near + dir * t)
    }

    /// Build camera uniform data for shaders
    pub fn uniform_data(&self) -> CameraUniformData {
        let view = self.view_matrix();
        let proj = self.projection_matrix();
        let view_proj = proj * view;

        CameraUniformData {
            view,
            proj,
            view_proj,
            inv_view: view.inverse(),
            inv_proj: proj.inverse(),
            position: self.position.extend(1.0),
            near_far: Vec4::new(self.projection.near, self.projection.far, 0.0, 0.0),
        }
    }
}

/// Camera uniform data for GPU
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CameraUniformData {
    pub view: Mat4,
    pub proj: Mat4,
    pub view_proj: Mat4,
    pub inv_view: Mat4,
    pub inv_proj: Mat4,
    pub position: Vec4,
    pub near_far: Vec4,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_pose_matches_source() {
        let mut main = Camera::default();
        main.position = Vec3::new(3.0, -2.0, 12.0);
        main.look_at(Vec3::ZERO, Vec3::Y);

        let mut aux = Camera::new(Vec3::ZERO, main.projection, LayerMask::ENVIRONMENT);
        aux.copy_pose(&main);

        assert!((aux.position - main.position).length() < 1e-6);
        assert!(aux.rotation.dot(main.rotation).abs() > 1.0 - 1e-6);
        assert_eq!(aux.layers, LayerMask::ENVIRONMENT);
    }

    #[test]
    fn unproject_center_hits_plane_on_axis() {
        let camera = Camera::default(); // at (0, 0, 40) looking down -Z
        let hit = camera
            .unproject_to_plane(
                Vec2::new(400.0, 300.0),
                Vec2::new(800.0, 600.0),
                0.0,
            )
            .unwrap();
        assert!(hit.abs().max_element() < 1e-3);
    }

    #[test]
    fn unproject_rejects_parallel_ray() {
        let mut camera = Camera::default();
        camera.look_at(camera.position + Vec3::Y, Vec3::Z); // looking straight up
        let hit = camera.unproject_to_plane(
            Vec2::new(400.0, 300.0),
            Vec2::new(800.0, 600.0),
            0.0,
        );
        assert!(hit.is_none());
    }
}
