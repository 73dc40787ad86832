//! Closed marble chain
//!
//! A ring of N spherical rigid bodies joined head-to-tail by point-to-point
//! constraints. Each marble carries two pivots on its local X axis at
//! `±radius * pivot_fraction`; because the pivots sit inside the sphere,
//! adjacent marbles interpenetrate and the linking joints disable contacts
//! between their bodies.
//!
//! The rest pose is constructed so every constraint is exactly satisfied at
//! spawn: with pivot offset `d = radius * pivot_fraction`, placing marble `i`
//! at angle `theta_i = 2*pi*i/N` on a ring of radius `d / tan(pi/N)` and
//! rotating it about Z by `theta_i + pi/2` makes each marble's outgoing pivot
//! coincide with its successor's incoming pivot.

use glam::{Quat, Vec3};
use rapier3d::prelude::*;

use crate::error::{SceneError, SceneResult};
use crate::physics::PhysicsWorld;
use crate::scene::{LayerMask, ObjectId, RenderObject, Scene, Transform};

/// Chain construction parameters
#[derive(Debug, Clone, Copy)]
pub struct ChainConfig {
    /// Number of marbles in the ring
    pub count: usize,
    /// Sphere radius
    pub radius: f32,
    /// Pivot offset along local X as a fraction of the radius
    pub pivot_fraction: f32,
    /// Collider restitution
    pub restitution: f32,
    /// Collider density
    pub density: f32,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            count: 8,
            radius: 2.4,
            pivot_fraction: 0.9,
            restitution: 0.1,
            density: 1.0,
        }
    }
}

struct DragState {
    anchor_body: RigidBodyHandle,
    joint: ImpulseJointHandle,
    marble: usize,
}

/// Render proxies for one marble: the refractive front mesh and the backface
/// capture mesh, sharing one transform
#[derive(Debug, Clone, Copy)]
struct MarbleProxies {
    front: ObjectId,
    backface: ObjectId,
}

/// A closed ring of rigid spherical marbles
pub struct MarbleChain {
    config: ChainConfig,
    bodies: Vec<RigidBodyHandle>,
    structural_joints: Vec<ImpulseJointHandle>,
    proxies: Vec<MarbleProxies>,
    drag: Option<DragState>,
}

impl MarbleChain {
    /// Build the chain in its exact rest pose and register its bodies,
    /// colliders and joints with the physics world.
    pub fn new(world: &mut PhysicsWorld, config: ChainConfig) -> SceneResult<Self> {
        if config.count < 3 {
            return Err(SceneError::DegenerateChain(config.count));
        }

        let n = config.count;
        let pivot = config.radius * config.pivot_fraction;
        let half_angle = std::f32::consts::PI / n as f32;
        let ring_radius = pivot / half_angle.tan();

        let mut bodies = Vec::with_capacity(n);
        for i in 0..n {
            let theta = 2.0 * half_angle * i as f32;
            let position = vector![
                ring_radius * theta.cos(),
                ring_radius * theta.sin(),
                0.0
            ];
            let spin = theta + std::f32::consts::FRAC_PI_2;
            let body = world.add_body(
                RigidBodyBuilder::dynamic()
                    .translation(position)
                    .rotation(vector![0.0, 0.0, spin])
                    .build(),
            );
            world.add_collider(
                ColliderBuilder::ball(config.radius)
                    .restitution(config.restitution)
                    .density(config.density)
                    .build(),
                body,
            );
            bodies.push(body);
        }

        // Each adjacent pair is constrained twice, once registered from each
        // side, so every body owns a joint to both of its neighbours.
        let mut structural_joints = Vec::with_capacity(2 * n);
        for i in 0..n {
            let next = (i + 1) % n;
            let prev = (i + n - 1) % n;
            structural_joints.push(world.add_impulse_joint(
                bodies[i],
                bodies[next],
                SphericalJointBuilder::new()
                    .local_anchor1(point![pivot, 0.0, 0.0])
                    .local_anchor2(point![-pivot, 0.0, 0.0])
                    .contacts_enabled(false),
            ));
            structural_joints.push(world.add_impulse_joint(
                bodies[i],
                bodies[prev],
                SphericalJointBuilder::new()
                    .local_anchor1(point![-pivot, 0.0, 0.0])
                    .local_anchor2(point![pivot, 0.0, 0.0])
                    .contacts_enabled(false),
            ));
        }

        log::info!(
            "marble chain: {} bodies, {} structural joints, ring radius {:.2}",
            n,
            structural_joints.len(),
            ring_radius
        );

        Ok(Self {
            config,
            bodies,
            structural_joints,
            proxies: Vec::new(),
            drag: None,
        })
    }

    /// Create one front and one backface render object per marble. The front
    /// proxies live on the default layer, the backface proxies on the
    /// backface layer.
    pub fn register_proxies(
        &mut self,
        scene: &mut Scene,
        mesh_id: usize,
        front_material: usize,
        backface_material: usize,
    ) {
        let scale = Vec3::splat(self.config.radius);
        self.proxies = (0..self.bodies.len())
            .map(|_| MarbleProxies {
                front: scene.add_object(
                    RenderObject::new(mesh_id, front_material).with_scale(scale),
                ),
                backface: scene.add_object(
                    RenderObject::new(mesh_id, backface_material)
                        .with_scale(scale)
                        .with_layers(LayerMask::BACKFACE),
                ),
            })
            .collect();
    }

    /// Copy body poses into the registered render proxies
    pub fn sync_transforms(&self, world: &PhysicsWorld, scene: &mut Scene) {
        for (body, proxies) in self.bodies.iter().zip(&self.proxies) {
            let Some(body) = world.bodies.get(*body) else {
                continue;
            };
            let position = body.position();
            let t = position.translation;
            let r = position.rotation;
            let mut transform = Transform::from_position(Vec3::new(t.x, t.y, t.z));
            transform.rotation = Quat::from_xyzw(r.i, r.j, r.k, r.w);
            transform.scale = Vec3::splat(self.config.radius);
            scene.object_mut(proxies.front).transform = transform;
            scene.object_mut(proxies.backface).transform = transform;
        }
    }

    /// Attach a kinematic drag anchor to a marble at a world-space grab
    /// point. An active drag is released first.
    pub fn begin_drag(&mut self, world: &mut PhysicsWorld, marble: usize, grab_point: Vec3) {
        self.end_drag(world);
        let Some(&body) = self.bodies.get(marble) else {
            log::warn!("begin_drag: marble index {marble} out of range");
            return;
        };

        let grab = point![grab_point.x, grab_point.y, grab_point.z];
        let local_anchor = world.bodies[body].position().inverse_transform_point(&grab);

        let anchor_body = world.add_body(
            RigidBodyBuilder::kinematic_position_based()
                .translation(grab.coords)
                .build(),
        );
        let joint = world.add_impulse_joint(
            anchor_body,
            body,
            SphericalJointBuilder::new()
                .local_anchor1(point![0.0, 0.0, 0.0])
                .local_anchor2(local_anchor)
                .contacts_enabled(false),
        );
        self.drag = Some(DragState {
            anchor_body,
            joint,
            marble,
        });
    }

    /// Move the drag anchor to a new world-space point
    pub fn update_drag(&mut self, world: &mut PhysicsWorld, point: Vec3) {
        if let Some(drag) = &self.drag {
            if let Some(body) = world.bodies.get_mut(drag.anchor_body) {
                body.set_next_kinematic_translation(vector![point.x, point.y, point.z]);
            }
        }
    }

    /// Release the current drag, removing both the joint and the anchor body
    pub fn end_drag(&mut self, world: &mut PhysicsWorld) {
        if let Some(drag) = self.drag.take() {
            world.remove_impulse_joint(drag.joint);
            world.remove_body(drag.anchor_body);
        }
    }

    pub fn dragged_marble(&self) -> Option<usize> {
        self.drag.as_ref().map(|d| d.marble)
    }

    pub fn marble_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn structural_joint_count(&self) -> usize {
        self.structural_joints.len()
    }

    pub fn body_handle(&self, marble: usize) -> RigidBodyHandle {
        self.bodies[marble]
    }

    pub fn body_position(&self, world: &PhysicsWorld, marble: usize) -> Vec3 {
        let t = world.bodies[self.bodies[marble]].position().translation;
        Vec3::new(t.x, t.y, t.z)
    }

    /// Find the marble whose center is nearest to a world-space point, if it
    /// is within the sphere radius
    pub fn marble_at(&self, world: &PhysicsWorld, point: Vec3) -> Option<usize> {
        (0..self.bodies.len())
            .map(|i| (i, (self.body_position(world, i) - point).length()))
            .filter(|(_, dist)| *dist <= self.config.radius)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    /// Separation between the two world-space pivots of a structural joint.
    /// Zero when the constraint is exactly satisfied.
    pub fn joint_error(&self, world: &PhysicsWorld, joint_index: usize) -> Option<f32> {
        let handle = *self.structural_joints.get(joint_index)?;
        let joint = world.impulse_joints.get(handle)?;
        let anchor1 = world.bodies[joint.body1]
            .position()
            .transform_point(&joint.data.local_anchor1());
        let anchor2 = world.bodies[joint.body2]
            .position()
            .transform_point(&joint.data.local_anchor2());
        Some((anchor1 - anchor2).norm())
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zero_gravity_world() -> PhysicsWorld {
        PhysicsWorld::with_gravity(Vector::new(0.0, 0.0, 0.0))
    }

    #[test]
    fn rejects_degenerate_chain() {
        let mut world = PhysicsWorld::default();
        let config = ChainConfig {
            count: 2,
            ..Default::default()
        };
        assert!(matches!(
            MarbleChain::new(&mut world, config),
            Err(SceneError::DegenerateChain(2))
        ));
    }

    #[test]
    fn every_body_has_two_structural_joints() {
        let mut world = PhysicsWorld::default();
        let chain = MarbleChain::new(&mut world, ChainConfig::default()).unwrap();
        assert_eq!(chain.structural_joint_count(), 2 * chain.marble_count());
        assert_eq!(world.impulse_joints.len(), 16);
    }

    #[test]
    fn rest_pose_satisfies_all_constraints() {
        let mut world = zero_gravity_world();
        let chain = MarbleChain::new(&mut world, ChainConfig::default()).unwrap();
        for i in 0..chain.structural_joint_count() {
            let error = chain.joint_error(&world, i).unwrap();
            assert!(error < 1e-4, "joint {i} error {error}");
        }
    }

    #[test]
    fn rest_pose_is_stationary_without_gravity() {
        let mut world = zero_gravity_world();
        let chain = MarbleChain::new(&mut world, ChainConfig::default()).unwrap();
        let before: Vec<Vec3> = (0..chain.marble_count())
            .map(|i| chain.body_position(&world, i))
            .collect();

        world.step();

        for (i, before) in before.iter().enumerate() {
            let after = chain.body_position(&world, i);
            assert!(
                (after - *before).length() < 1e-3,
                "marble {i} moved by {}",
                (after - *before).length()
            );
        }
    }

    #[test]
    fn drag_attach_and_release_leaves_no_extra_state() {
        let mut world = PhysicsWorld::default();
        let mut chain = MarbleChain::new(&mut world, ChainConfig::default()).unwrap();
        let bodies_before = world.bodies.len();
        let joints_before = world.impulse_joints.len();

        let grab = chain.body_position(&world, 0);
        chain.begin_drag(&mut world, 0, grab);
        assert_eq!(chain.dragged_marble(), Some(0));
        assert_eq!(world.bodies.len(), bodies_before + 1);
        assert_eq!(world.impulse_joints.len(), joints_before + 1);

        chain.update_drag(&mut world, grab + Vec3::new(1.0, 0.0, 0.0));
        world.step();

        chain.end_drag(&mut world);
        assert_eq!(chain.dragged_marble(), None);
        assert_eq!(world.bodies.len(), bodies_before);
        assert_eq!(world.impulse_joints.len(), joints_before);
    }

    #[test]
    fn marble_at_finds_nearest_hit() {
        let mut world = PhysicsWorld::default();
        let chain = MarbleChain::new(&mut world, ChainConfig::default()).unwrap();
        let center = chain.body_position(&world, 3);
        assert_eq!(chain.marble_at(&world, center), Some(3));
        assert_eq!(chain.marble_at(&world, center + Vec3::splat(100.0)), None);
    }
}
