//! Application orchestration
//!
//! [`MarbleApp`] wires the whole scene together: the physics chain, the
//! room, the layered camera rig, the composer pipeline and pointer
//! interaction. The host only has to feed it frame deltas, pointer events
//! and resize notifications.

use glam::{Quat, Vec2, Vec3};
use rapier3d::prelude::{ColliderBuilder, Vector};

use crate::backend::GraphicsBackend;
use crate::composer::{Composer, FrameData, LayerOutput};
use crate::error::SceneResult;
use crate::physics::{ChainConfig, MarbleChain, PhysicsWorld};
use crate::resources::{
    AnimatedBackgroundMaterial, AssetStore, GpuTexture, MaterialKind, MaterialRegistry,
    RefractionMaterial, TextureData,
};
use crate::scene::{Camera, LayerCameraRig, LayerMask, RenderObject, Scene, Transform};
use crate::scheduler::FrameScheduler;

/// Mesh slots used by the built-in scene
pub const MESH_SPHERE: usize = 0;
pub const MESH_PLANE: usize = 1;

/// Top-level scene parameters
#[derive(Debug, Clone, Copy)]
pub struct SceneConfig {
    pub width: u32,
    pub height: u32,
    pub gravity: Vec3,
    pub chain: ChainConfig,
    /// Half extent of the cubic room enclosing the chain
    pub room_half_extent: f32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            gravity: Vec3::new(0.0, -100.0, 0.0),
            chain: ChainConfig::default(),
            room_half_extent: 15.0,
        }
    }
}

/// The marble chain scene, ready to be driven by a host loop
pub struct MarbleApp<B: GraphicsBackend> {
    backend: B,
    config: SceneConfig,
    scene: Scene,
    target_scene: Scene,
    camera: Camera,
    rig: LayerCameraRig,
    target_camera: Camera,
    composer: Composer<B>,
    physics: PhysicsWorld,
    chain: MarbleChain,
    materials: MaterialRegistry,
    assets: AssetStore,
    scheduler: FrameScheduler,
    refraction_material: usize,
    width: u32,
    height: u32,
}

impl<B: GraphicsBackend> MarbleApp<B> {
    pub fn new(mut backend: B, config: SceneConfig) -> SceneResult<Self> {
        let mut assets = AssetStore::new(&mut backend)?;
        assets.insert(
            "perturbation",
            GpuTexture::create(&mut backend, &TextureData::perturbation(64))?,
        );
        // optional on disk; the walls fall back to plain white
        match TextureData::from_file("assets/wall_albedo.png") {
            Ok(data) => assets.insert("wall-albedo", GpuTexture::create(&mut backend, &data)?),
            Err(err) => log::debug!("wall albedo not loaded: {err}"),
        }
        let composer = Composer::new(
            &mut backend,
            config.width,
            config.height,
            Some(assets.view_or_fallback("perturbation")),
        )?;

        let mut materials = MaterialRegistry::new();
        let refraction_material = materials.add(MaterialKind::Refraction(RefractionMaterial::new(
            composer.layer_output(LayerOutput::Target),
            composer.layer_output(LayerOutput::Backface),
            composer.layer_output(LayerOutput::Environment),
        )));
        let backface_material = materials.add(MaterialKind::Backface);
        let background_material = materials.add(MaterialKind::AnimatedBackground(
            AnimatedBackgroundMaterial { speed: 1.0 },
        ));
        let wall_material = materials.add(MaterialKind::Unlit {
            color: Vec3::new(0.85, 0.85, 0.9),
            albedo: assets.view_or_fallback("wall-albedo"),
        });

        let mut scene = Scene::new();
        Self::build_room(&mut scene, wall_material, config.room_half_extent);

        let mut target_scene = Scene::new();
        target_scene.add_object(
            RenderObject::new(MESH_PLANE, background_material)
                .with_scale(Vec3::splat(4.0 * config.room_half_extent)),
        );

        let mut physics = PhysicsWorld::with_gravity(Vector::new(
            config.gravity.x,
            config.gravity.y,
            config.gravity.z,
        ));
        Self::build_room_colliders(&mut physics, config.room_half_extent);

        let mut chain = MarbleChain::new(&mut physics, config.chain)?;
        chain.register_proxies(
            &mut scene,
            MESH_SPHERE,
            refraction_material,
            backface_material,
        );
        chain.sync_transforms(&physics, &mut scene);

        let mut camera = Camera::default();
        camera.set_aspect(config.width as f32, config.height as f32);
        camera.look_at(Vec3::ZERO, Vec3::Y);
        let rig = LayerCameraRig::new(&camera);
        let mut target_camera = Camera::default();
        target_camera.set_aspect(config.width as f32, config.height as f32);

        Ok(Self {
            backend,
            config,
            scene,
            target_scene,
            camera,
            rig,
            target_camera,
            composer,
            physics,
            chain,
            materials,
            assets,
            scheduler: FrameScheduler::default(),
            refraction_material,
            width: config.width,
            height: config.height,
        })
    }

    fn build_room(scene: &mut Scene, wall_material: usize, half: f32) {
        let walls = [
            // floor, ceiling, back, left, right
            (Vec3::new(0.0, -half, 0.0), Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2)),
            (Vec3::new(0.0, half, 0.0), Quat::from_rotation_x(std::f32::consts::FRAC_PI_2)),
            (Vec3::new(0.0, 0.0, -half), Quat::IDENTITY),
            (Vec3::new(-half, 0.0, 0.0), Quat::from_rotation_y(std::f32::consts::FRAC_PI_2)),
            (Vec3::new(half, 0.0, 0.0), Quat::from_rotation_y(-std::f32::consts::FRAC_PI_2)),
        ];
        for (position, rotation) in walls {
            let mut transform = Transform::from_position(position);
            transform.rotation = rotation;
            transform.scale = Vec3::splat(2.0 * half);
            scene.add_object(
                RenderObject::new(MESH_PLANE, wall_material)
                    .with_transform(transform)
                    .with_layers(LayerMask::DEFAULT | LayerMask::ENVIRONMENT),
            );
        }
    }

    fn build_room_colliders(physics: &mut PhysicsWorld, half: f32) {
        let thickness = 0.5;
        let spans = [
            (vector_from(Vec3::new(0.0, -half, 0.0)), (half, thickness, half)),
            (vector_from(Vec3::new(0.0, half, 0.0)), (half, thickness, half)),
            (vector_from(Vec3::new(0.0, 0.0, -half)), (half, half, thickness)),
            (vector_from(Vec3::new(0.0, 0.0, half)), (half, half, thickness)),
            (vector_from(Vec3::new(-half, 0.0, 0.0)), (thickness, half, half)),
            (vector_from(Vec3::new(half, 0.0, 0.0)), (thickness, half, half)),
        ];
        for (translation, (hx, hy, hz)) in spans {
            physics.add_free_collider(
                ColliderBuilder::cuboid(hx, hy, hz)
                    .translation(translation)
                    .build(),
            );
        }
    }

    /// Advance the simulation and render one frame
    pub fn frame(&mut self, dt: f32) -> SceneResult<()> {
        let steps = self.scheduler.advance(dt);
        for _ in 0..steps {
            self.physics.step();
        }
        if steps > 0 {
            self.chain.sync_transforms(&self.physics, &mut self.scene);
        }
        self.rig.sync(&self.camera);

        let frame = FrameData {
            scene: &self.scene,
            target_scene: &self.target_scene,
            main_camera: &self.camera,
            environment_camera: self.rig.environment_camera(),
            backface_camera: self.rig.backface_camera(),
            target_camera: &self.target_camera,
            time: self.scheduler.elapsed(),
            dt,
        };
        self.composer.render(&mut self.backend, &frame)
    }

    /// Resize the viewport. Recreates every composer target and refreshes
    /// the refraction material's capture views.
    pub fn resize(&mut self, width: u32, height: u32) -> SceneResult<()> {
        if (width, height) == (self.width, self.height) {
            return Ok(());
        }
        self.camera.set_aspect(width as f32, height as f32);
        self.rig.set_aspect(width as f32, height as f32);
        self.target_camera.set_aspect(width as f32, height as f32);
        self.composer.resize(&mut self.backend, width, height)?;
        self.width = width;
        self.height = height;

        if let Some(MaterialKind::Refraction(material)) =
            self.materials.get_mut(self.refraction_material)
        {
            material.set_layer_views(
                self.composer.layer_output(LayerOutput::Target),
                self.composer.layer_output(LayerOutput::Backface),
                self.composer.layer_output(LayerOutput::Environment),
            );
        }
        Ok(())
    }

    /// Start dragging the marble under the pointer, if any
    pub fn pointer_down(&mut self, pixel: Vec2) {
        let Some(point) = self.unproject(pixel) else {
            return;
        };
        if let Some(marble) = self.chain.marble_at(&self.physics, point) {
            log::debug!("drag start on marble {marble} at {point}");
            self.chain.begin_drag(&mut self.physics, marble, point);
        }
    }

    /// Move the active drag target
    pub fn pointer_move(&mut self, pixel: Vec2) {
        if self.chain.dragged_marble().is_none() {
            return;
        }
        if let Some(point) = self.unproject(pixel) {
            self.chain.update_drag(&mut self.physics, point);
        }
    }

    /// Release the active drag
    pub fn pointer_up(&mut self) {
        self.chain.end_drag(&mut self.physics);
    }

    fn unproject(&self, pixel: Vec2) -> Option<Vec3> {
        // drags move marbles in the plane the chain lives in
        self.camera.unproject_to_plane(
            pixel,
            Vec2::new(self.width as f32, self.height as f32),
            0.0,
        )
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn chain(&self) -> &MarbleChain {
        &self.chain
    }

    pub fn physics(&self) -> &PhysicsWorld {
        &self.physics
    }

    pub fn composer(&self) -> &Composer<B> {
        &self.composer
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn materials(&self) -> &MaterialRegistry {
        &self.materials
    }

    pub fn assets(&self) -> &AssetStore {
        &self.assets
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

fn vector_from(v: Vec3) -> Vector<f32> {
    Vector::new(v.x, v.y, v.z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;

    fn app() -> MarbleApp<HeadlessBackend> {
        MarbleApp::new(HeadlessBackend::new(), SceneConfig::default()).unwrap()
    }

    #[test]
    fn builds_full_scene() {
        let app = app();
        // 5 walls + 2 proxies per marble
        assert_eq!(app.scene().objects.len(), 5 + 2 * app.chain().marble_count());
        assert_eq!(app.chain().structural_joint_count(), 16);
    }

    #[test]
    fn frame_runs_the_whole_pipeline() {
        let mut app = app();
        app.frame(1.0 / 60.0).unwrap();
        assert!(app.backend().pass_index("render-main").is_some());
        assert!(app.backend().pass_index("main-effects").is_some());
    }

    #[test]
    fn walls_use_the_albedo_fallback_until_loaded() {
        let app = app();
        let fallback = app.assets().view_or_fallback("definitely-missing");
        let wall_albedo = (0..app.materials().len())
            .find_map(|id| match app.materials().get(id) {
                Some(MaterialKind::Unlit { albedo, .. }) => Some(*albedo),
                _ => None,
            })
            .unwrap();
        assert_eq!(wall_albedo, fallback);
    }

    #[test]
    fn pointer_miss_does_not_start_a_drag() {
        let mut app = app();
        app.pointer_down(Vec2::new(1.0, 1.0));
        assert_eq!(app.chain().dragged_marble(), None);
    }
}
