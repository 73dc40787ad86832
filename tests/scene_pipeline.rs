//! End-to-end pipeline tests on the headless backend

use marble_scene::backend::HeadlessBackend;
use marble_scene::composer::LayerOutput;
use marble_scene::glam::{Vec2, Vec4Swizzles};
use marble_scene::{MarbleApp, SceneConfig};

fn app() -> MarbleApp<HeadlessBackend> {
    let _ = env_logger::builder().is_test(true).try_init();
    MarbleApp::new(HeadlessBackend::new(), SceneConfig::default()).unwrap()
}

#[test]
fn frame_executes_passes_in_capture_order() {
    let mut app = app();
    app.frame(1.0 / 60.0).unwrap();

    let backend = app.backend();
    let order = [
        "render-target-layer",
        "target-distortion",
        "render-backface-layer",
        "backface-gamma",
        "render-env-layer",
        "env-gamma",
        "render-main",
        "normal-buffer",
        "main-effects",
    ];
    let indices: Vec<usize> = order
        .iter()
        .map(|name| {
            backend
                .pass_index(name)
                .unwrap_or_else(|| panic!("pass '{name}' did not run"))
        })
        .collect();
    for window in indices.windows(2) {
        assert!(window[0] < window[1]);
    }
}

#[test]
fn pass_log_resets_every_frame() {
    let mut app = app();
    app.frame(1.0 / 60.0).unwrap();
    let first = app.backend().pass_log().len();
    app.frame(1.0 / 60.0).unwrap();
    assert_eq!(app.backend().pass_log().len(), first);
}

#[test]
fn resize_rebuilds_every_capture_target() {
    let mut app = app();
    app.resize(1920, 1080).unwrap();

    for output in [
        LayerOutput::Target,
        LayerOutput::Backface,
        LayerOutput::Environment,
    ] {
        let view = app.composer().layer_output(output);
        let record = app
            .backend()
            .view_record(view)
            .expect("capture view must stay valid after resize");
        assert_eq!((record.width, record.height), (1920, 1080));
    }

    let record = app
        .backend()
        .view_record(app.composer().presentation_view())
        .unwrap();
    assert_eq!((record.width, record.height), (1920, 1080));

    // rendering still works at the new size
    app.frame(1.0 / 60.0).unwrap();
    assert!(app.backend().pass_index("main-effects").is_some());
}

#[test]
fn resize_to_current_size_changes_nothing() {
    let mut app = app();
    let view = app.composer().presentation_view();
    app.resize(800, 600).unwrap();
    assert_eq!(app.composer().presentation_view(), view);
}

#[test]
fn pointer_drag_round_trip() {
    let mut app = app();

    // project marble 0's center back to a pixel
    let world = app.chain().body_position(app.physics(), 0);
    let (width, height) = app.size();
    let clip = app.camera_mut().view_projection_matrix() * world.extend(1.0);
    let ndc = clip.xyz() / clip.w;
    let pixel = Vec2::new(
        (ndc.x + 1.0) * 0.5 * width as f32,
        (1.0 - ndc.y) * 0.5 * height as f32,
    );

    app.pointer_down(pixel);
    assert_eq!(app.chain().dragged_marble(), Some(0));

    app.pointer_move(pixel + Vec2::new(40.0, 0.0));
    app.frame(1.0 / 60.0).unwrap();

    app.pointer_up();
    assert_eq!(app.chain().dragged_marble(), None);
    // only the chain's own joints remain
    assert_eq!(
        app.physics().impulse_joints.len(),
        app.chain().structural_joint_count()
    );
}
