//! Chain simulation behavior

use marble_scene::glam::Vec3;
use marble_scene::physics::{ChainConfig, MarbleChain, PhysicsWorld};
use marble_scene::rapier3d::prelude::Vector;
use marble_scene::SceneError;

fn default_chain(gravity: Vector<f32>) -> (PhysicsWorld, MarbleChain) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut world = PhysicsWorld::with_gravity(gravity);
    let chain = MarbleChain::new(&mut world, ChainConfig::default()).unwrap();
    (world, chain)
}

#[test]
fn chain_shorter_than_three_is_rejected() {
    let mut world = PhysicsWorld::default();
    for count in [0, 1, 2] {
        let result = MarbleChain::new(
            &mut world,
            ChainConfig {
                count,
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(SceneError::DegenerateChain(_))));
    }
}

#[test]
fn ring_rest_pose_survives_repeated_steps_without_gravity() {
    let (mut world, chain) = default_chain(Vector::new(0.0, 0.0, 0.0));
    let before: Vec<Vec3> = (0..chain.marble_count())
        .map(|i| chain.body_position(&world, i))
        .collect();

    for _ in 0..10 {
        world.step();
    }

    for (i, before) in before.iter().enumerate() {
        let drift = (chain.body_position(&world, i) - *before).length();
        assert!(drift < 1e-2, "marble {i} drifted {drift}");
    }
}

#[test]
fn joints_stay_tight_under_gravity() {
    let (mut world, chain) = default_chain(Vector::new(0.0, -100.0, 0.0));
    for _ in 0..120 {
        world.step();
    }

    let pivot = chain.config().radius * chain.config().pivot_fraction;
    for i in 0..chain.marble_count() {
        let next = (i + 1) % chain.marble_count();
        let distance =
            (chain.body_position(&world, i) - chain.body_position(&world, next)).length();
        // centers can never separate farther than the two pivot arms plus
        // solver slack
        assert!(
            distance < 2.0 * pivot + 0.5,
            "marbles {i},{next} separated by {distance}"
        );
    }
}

#[test]
fn dragged_marble_follows_the_anchor() {
    let (mut world, mut chain) = default_chain(Vector::new(0.0, 0.0, 0.0));
    let start = chain.body_position(&world, 0);
    let target = start + Vec3::new(6.0, 0.0, 0.0);

    chain.begin_drag(&mut world, 0, start);
    chain.update_drag(&mut world, target);
    for _ in 0..60 {
        chain.update_drag(&mut world, target);
        world.step();
    }

    let end = chain.body_position(&world, 0);
    assert!(
        (end - target).length() < (start - target).length(),
        "marble did not move toward the drag target"
    );
    chain.end_drag(&mut world);
}

#[test]
fn dragging_one_marble_pulls_the_ring_along() {
    let (mut world, mut chain) = default_chain(Vector::new(0.0, 0.0, 0.0));
    let opposite = chain.marble_count() / 2;
    let before = chain.body_position(&world, opposite);

    let start = chain.body_position(&world, 0);
    let target = start + Vec3::new(12.0, 0.0, 0.0);
    chain.begin_drag(&mut world, 0, start);
    for _ in 0..240 {
        chain.update_drag(&mut world, target);
        world.step();
    }

    let after = chain.body_position(&world, opposite);
    assert!(
        (after - before).length() > 0.5,
        "opposite marble never moved ({before} -> {after})"
    );
}
