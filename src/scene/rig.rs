//! Layer camera rig
//!
//! The environment and backface captures use auxiliary cameras that are
//! always co-located with the primary camera and differ only in their layer
//! mask. The scheduler calls [`LayerCameraRig::sync`] every frame before any
//! pass executes.

use crate::scene::camera::Camera;
use crate::scene::layers::LayerMask;

/// Auxiliary cameras for the environment and backface layers
#[derive(Debug, Clone)]
pub struct LayerCameraRig {
    environment: Camera,
    backface: Camera,
}

impl LayerCameraRig {
    /// Build the rig from the primary camera's projection and pose
    pub fn new(main: &Camera) -> Self {
        let mut environment = Camera::new(main.position, main.projection, LayerMask::ENVIRONMENT);
        let mut backface = Camera::new(main.position, main.projection, LayerMask::BACKFACE);
        environment.copy_pose(main);
        backface.copy_pose(main);
        Self {
            environment,
            backface,
        }
    }

    /// Copy the primary camera's position and orientation into both layer
    /// cameras. Layer masks and projections are left untouched.
    pub fn sync(&mut self, main: &Camera) {
        self.environment.copy_pose(main);
        self.backface.copy_pose(main);
    }

    /// Propagate a viewport resize
    pub fn set_aspect(&mut self, width: f32, height: f32) {
        self.environment.set_aspect(width, height);
        self.backface.set_aspect(width, height);
    }

    pub fn environment_camera(&self) -> &Camera {
        &self.environment
    }

    pub fn backface_camera(&self) -> &Camera {
        &self.backface
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn sync_copies_pose_only() {
        let mut main = Camera::default();
        let mut rig = LayerCameraRig::new(&main);

        main.position = Vec3::new(5.0, 7.0, -3.0);
        main.look_at(Vec3::new(0.0, 1.0, 0.0), Vec3::Y);
        rig.sync(&main);

        for aux in [rig.environment_camera(), rig.backface_camera()] {
            assert!((aux.position - main.position).length() < 1e-6);
            assert!(aux.rotation.dot(main.rotation).abs() > 1.0 - 1e-6);
        }
        assert_eq!(rig.environment_camera().layers, LayerMask::ENVIRONMENT);
        assert_eq!(rig.backface_camera().layers, LayerMask::BACKFACE);
    }

    #[test]
    fn sync_is_stable_across_frames() {
        let mut main = Camera::default();
        let mut rig = LayerCameraRig::new(&main);

        for i in 0..10 {
            main.position = Vec3::new(i as f32, 0.0, 40.0 - i as f32);
            rig.sync(&main);
            assert_eq!(rig.environment_camera().position, main.position);
            assert_eq!(rig.backface_camera().position, main.position);
        }
    }
}
