//! Frame composition
//!
//! The composer owns every off-screen target and runs a fixed pipeline each
//! frame: capture the animated target layer, the backface layer and the
//! environment layer into persistent textures, then render the main scene
//! and push it through the primary effect stack into the presentation
//! target. The pass order is validated once at construction; a pass that
//! reads a target before anything has written it is a wiring bug, not a
//! runtime condition.

pub mod effects;
pub mod pass;
pub mod target;

pub use effects::{
    AmbientOcclusionParams, BlendFunction, EffectDescriptor, EffectKind, EffectStack, KernelSize,
};
pub use pass::{CameraSlot, FrameData, Pass, PassContext, SceneSlot};
pub use target::{RenderTarget, TargetId};

use crate::backend::{GraphicsBackend, TextureFormat, TextureUsage, TextureViewHandle};
use crate::error::{SceneError, SceneResult};
use pass::{ClearPass, EffectPass, NormalPass, RenderScenePass, SavePass};

/// Named layer captures exposed to materials
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerOutput {
    /// Animated background seen through refraction
    Target,
    /// Back faces of the marbles
    Backface,
    /// Everything behind and around the marbles
    Environment,
}

struct Targets {
    frame_a: TargetId,
    frame_b: TargetId,
    depth: TargetId,
    normal: TargetId,
    saved_target: TargetId,
    saved_backface: TargetId,
    saved_env: TargetId,
    presentation: TargetId,
}

/// Fixed multi-layer capture and postprocessing pipeline
pub struct Composer<B: GraphicsBackend> {
    targets: Vec<RenderTarget>,
    passes: Vec<Box<dyn Pass<B>>>,
    ids: Targets,
    width: u32,
    height: u32,
}

impl<B: GraphicsBackend> Composer<B> {
    pub fn new(
        backend: &mut B,
        width: u32,
        height: u32,
        perturbation_map: Option<TextureViewHandle>,
    ) -> SceneResult<Self> {
        let mut targets = Vec::new();
        let add = |targets: &mut Vec<RenderTarget>,
                       backend: &mut B,
                       name: &str,
                       format: TextureFormat,
                       usage: TextureUsage|
         -> SceneResult<TargetId> {
            let target = RenderTarget::new(backend, name, width, height, format, usage)?;
            targets.push(target);
            Ok(TargetId(targets.len() - 1))
        };

        let frame_usage = TextureUsage::RENDER_ATTACHMENT
            | TextureUsage::TEXTURE_BINDING
            | TextureUsage::COPY_SRC;
        let saved_usage = TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST;

        let ids = Targets {
            frame_a: add(
                &mut targets,
                backend,
                "frame-a",
                TextureFormat::Rgba16Float,
                frame_usage,
            )?,
            frame_b: add(
                &mut targets,
                backend,
                "frame-b",
                TextureFormat::Rgba16Float,
                frame_usage,
            )?,
            depth: add(
                &mut targets,
                backend,
                "depth",
                TextureFormat::Depth32Float,
                TextureUsage::RENDER_ATTACHMENT,
            )?,
            normal: add(
                &mut targets,
                backend,
                "normal",
                TextureFormat::Rgba16Float,
                TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
            )?,
            saved_target: add(
                &mut targets,
                backend,
                "saved-target",
                TextureFormat::Rgba16Float,
                saved_usage,
            )?,
            saved_backface: add(
                &mut targets,
                backend,
                "saved-backface",
                TextureFormat::Rgba16Float,
                saved_usage,
            )?,
            saved_env: add(
                &mut targets,
                backend,
                "saved-env",
                TextureFormat::Rgba16Float,
                saved_usage,
            )?,
            presentation: add(
                &mut targets,
                backend,
                "presentation",
                TextureFormat::Rgba8UnormSrgb,
                frame_usage,
            )?,
        };

        let passes = Self::build_passes(backend, &targets, &ids, width, height, perturbation_map)?;
        let composer = Self {
            targets,
            passes,
            ids,
            width,
            height,
        };
        composer.validate_order()?;
        log::info!(
            "composer ready: {} passes, {} targets, {}x{}",
            composer.passes.len(),
            composer.targets.len(),
            width,
            height
        );
        Ok(composer)
    }

    fn build_passes(
        backend: &mut B,
        targets: &[RenderTarget],
        ids: &Targets,
        width: u32,
        height: u32,
        perturbation_map: Option<TextureViewHandle>,
    ) -> SceneResult<Vec<Box<dyn Pass<B>>>> {
        let hdr = TextureFormat::Rgba16Float;
        let passes: Vec<Box<dyn Pass<B>>> = vec![
            // Phase 1: animated target layer
            Box::new(
                RenderScenePass::new(
                    "render-target-layer",
                    SceneSlot::Target,
                    CameraSlot::TargetScene,
                    ids.frame_a,
                )
                .with_depth(ids.depth),
            ),
            Box::new(
                EffectPass::new(
                    backend,
                    "target-distortion",
                    CameraSlot::TargetScene,
                    EffectStack::target_stack(perturbation_map),
                    targets,
                    ids.frame_a,
                    ids.frame_b,
                    None,
                    hdr,
                    width,
                    height,
                )?
                .with_encode_output(false),
            ),
            Box::new(SavePass::new(
                "save-target",
                ids.frame_b,
                ids.saved_target,
            )),
            Box::new(ClearPass::new("clear-frame", ids.frame_a, ids.depth)),
            // Phase 2: marble back faces
            Box::new(
                RenderScenePass::new(
                    "render-backface-layer",
                    SceneSlot::Main,
                    CameraSlot::Backface,
                    ids.frame_a,
                )
                .with_depth(ids.depth),
            ),
            Box::new(
                EffectPass::new(
                    backend,
                    "backface-gamma",
                    CameraSlot::Backface,
                    EffectStack::gamma_stack(),
                    targets,
                    ids.frame_a,
                    ids.frame_b,
                    None,
                    hdr,
                    width,
                    height,
                )?
                .with_encode_output(false),
            ),
            Box::new(SavePass::new(
                "save-backface",
                ids.frame_b,
                ids.saved_backface,
            )),
            // Phase 3: environment
            Box::new(
                RenderScenePass::new(
                    "render-env-layer",
                    SceneSlot::Main,
                    CameraSlot::Environment,
                    ids.frame_a,
                )
                .with_depth(ids.depth),
            ),
            Box::new(
                EffectPass::new(
                    backend,
                    "env-gamma",
                    CameraSlot::Environment,
                    EffectStack::gamma_stack(),
                    targets,
                    ids.frame_a,
                    ids.frame_b,
                    None,
                    hdr,
                    width,
                    height,
                )?
                .with_encode_output(false),
            ),
            Box::new(SavePass::new("save-env", ids.frame_b, ids.saved_env)),
            // Phase 4: main view and final effect stack
            Box::new(
                RenderScenePass::new(
                    "render-main",
                    SceneSlot::Main,
                    CameraSlot::Main,
                    ids.frame_a,
                )
                .with_depth(ids.depth),
            ),
            Box::new(NormalPass::new("normal-buffer", ids.normal)),
            Box::new(EffectPass::new(
                backend,
                "main-effects",
                CameraSlot::Main,
                EffectStack::main_stack(),
                targets,
                ids.frame_a,
                ids.presentation,
                Some(ids.normal),
                TextureFormat::Rgba8UnormSrgb,
                width,
                height,
            )?),
        ];
        Ok(passes)
    }

    /// Check that no pass reads a target before an earlier pass writes it
    fn validate_order(&self) -> SceneResult<()> {
        let mut written = vec![false; self.targets.len()];
        for pass in &self.passes {
            for read in pass.reads() {
                if !written[read.0] {
                    return Err(SceneError::PipelineOrder {
                        pass: pass.name().to_string(),
                        target: self.targets[read.0].name().to_string(),
                    });
                }
            }
            for write in pass.writes() {
                written[write.0] = true;
            }
        }
        Ok(())
    }

    /// Run the full pipeline for one frame
    pub fn render(&mut self, backend: &mut B, frame: &FrameData<'_>) -> SceneResult<()> {
        for (name, camera) in [
            ("main", frame.main_camera),
            ("environment", frame.environment_camera),
            ("backface", frame.backface_camera),
            ("target", frame.target_camera),
        ] {
            if camera.layers.is_empty() {
                return Err(SceneError::MissingLayerMask(name.to_string()));
            }
        }

        backend.begin_frame()?;
        let mut ctx = PassContext {
            backend,
            targets: &self.targets,
            frame,
            width: self.width,
            height: self.height,
        };
        for pass in &self.passes {
            log::trace!("executing pass '{}'", pass.name());
            pass.execute(&mut ctx);
        }
        backend.end_frame()?;
        Ok(())
    }

    /// Resize every target and pass. Calling with the current size is a
    /// no-op; saved-layer textures are recreated so materials must refresh
    /// their views afterwards.
    pub fn resize(&mut self, backend: &mut B, width: u32, height: u32) -> SceneResult<()> {
        if width == self.width && height == self.height {
            return Ok(());
        }
        log::debug!(
            "resizing composer {}x{} -> {}x{}",
            self.width,
            self.height,
            width,
            height
        );
        for target in &mut self.targets {
            target.resize(backend, width, height)?;
        }
        self.verify_target_sizes(width, height)?;
        for pass in &mut self.passes {
            pass.resize(backend, &self.targets, width, height)?;
        }
        self.width = width;
        self.height = height;
        Ok(())
    }

    /// Check that every target ended up at the expected size. Passes sample
    /// targets assuming they all match the viewport, so a stray size would
    /// corrupt every downstream read.
    fn verify_target_sizes(&self, width: u32, height: u32) -> SceneResult<()> {
        for target in &self.targets {
            let (actual_width, actual_height) = target.size();
            if (actual_width, actual_height) != (width, height) {
                return Err(SceneError::TargetSizeMismatch {
                    name: target.name().to_string(),
                    expected_width: width,
                    expected_height: height,
                    actual_width,
                    actual_height,
                });
            }
        }
        Ok(())
    }

    /// Current view of a persistent layer capture
    pub fn layer_output(&self, output: LayerOutput) -> TextureViewHandle {
        let id = match output {
            LayerOutput::Target => self.ids.saved_target,
            LayerOutput::Backface => self.ids.saved_backface,
            LayerOutput::Environment => self.ids.saved_env,
        };
        self.targets[id.0].view()
    }

    /// View of the final composited frame
    pub fn presentation_view(&self) -> TextureViewHandle {
        self.targets[self.ids.presentation.0].view()
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use crate::scene::{Camera, LayerCameraRig, LayerMask, RenderObject, Scene};

    fn frame_cameras() -> (Camera, LayerCameraRig, Camera) {
        let main = Camera::default();
        let rig = LayerCameraRig::new(&main);
        let target_camera = Camera::default();
        (main, rig, target_camera)
    }

    fn render_once(composer: &mut Composer<HeadlessBackend>, backend: &mut HeadlessBackend) {
        let mut scene = Scene::new();
        scene.add_object(RenderObject::new(0, 0));
        scene.add_object(RenderObject::new(1, 1).with_layers(LayerMask::BACKFACE));
        let mut target_scene = Scene::new();
        target_scene.add_object(RenderObject::new(2, 2));
        let (main, rig, target_camera) = frame_cameras();

        composer
            .render(
                backend,
                &FrameData {
                    scene: &scene,
                    target_scene: &target_scene,
                    main_camera: &main,
                    environment_camera: rig.environment_camera(),
                    backface_camera: rig.backface_camera(),
                    target_camera: &target_camera,
                    time: 0.0,
                    dt: 1.0 / 60.0,
                },
            )
            .unwrap();
    }

    #[test]
    fn pipeline_order_is_valid() {
        let mut backend = HeadlessBackend::new();
        let composer = Composer::new(&mut backend, 800, 600, None).unwrap();
        assert_eq!(composer.pass_names().len(), 13);
    }

    #[test]
    fn normal_buffer_precedes_main_effects() {
        let mut backend = HeadlessBackend::new();
        let mut composer = Composer::new(&mut backend, 800, 600, None).unwrap();
        render_once(&mut composer, &mut backend);

        let normal = backend.pass_index("normal-buffer").unwrap();
        let effects = backend.pass_index("main-effects").unwrap();
        assert!(normal < effects);
    }

    #[test]
    fn layer_captures_happen_before_main_render() {
        let mut backend = HeadlessBackend::new();
        let mut composer = Composer::new(&mut backend, 800, 600, None).unwrap();
        render_once(&mut composer, &mut backend);

        let main = backend.pass_index("render-main").unwrap();
        for capture in ["render-target-layer", "render-backface-layer", "render-env-layer"] {
            assert!(backend.pass_index(capture).unwrap() < main);
        }
    }

    #[test]
    fn resize_updates_all_targets() {
        let mut backend = HeadlessBackend::new();
        let mut composer = Composer::new(&mut backend, 800, 600, None).unwrap();
        composer.resize(&mut backend, 1920, 1080).unwrap();

        for output in [
            LayerOutput::Target,
            LayerOutput::Backface,
            LayerOutput::Environment,
        ] {
            let record = backend.view_record(composer.layer_output(output)).unwrap();
            assert_eq!((record.width, record.height), (1920, 1080));
        }
        let record = backend.view_record(composer.presentation_view()).unwrap();
        assert_eq!((record.width, record.height), (1920, 1080));
    }

    #[test]
    fn empty_camera_mask_is_rejected() {
        let mut backend = HeadlessBackend::new();
        let mut composer = Composer::new(&mut backend, 800, 600, None).unwrap();

        let mut main = Camera::default();
        let rig = LayerCameraRig::new(&main);
        main.layers = LayerMask::NONE;
        let target_camera = Camera::default();
        let scene = Scene::new();
        let target_scene = Scene::new();

        let err = composer
            .render(
                &mut backend,
                &FrameData {
                    scene: &scene,
                    target_scene: &target_scene,
                    main_camera: &main,
                    environment_camera: rig.environment_camera(),
                    backface_camera: rig.backface_camera(),
                    target_camera: &target_camera,
                    time: 0.0,
                    dt: 1.0 / 60.0,
                },
            )
            .unwrap_err();
        assert!(matches!(err, SceneError::MissingLayerMask(name) if name == "main"));
    }

    // minimal composer with a miswired pass list, bypassing the checked
    // constructor
    fn hand_wired_composer(backend: &mut HeadlessBackend) -> Composer<HeadlessBackend> {
        let usage = TextureUsage::RENDER_ATTACHMENT
            | TextureUsage::TEXTURE_BINDING
            | TextureUsage::COPY_SRC
            | TextureUsage::COPY_DST;
        let targets = vec![
            RenderTarget::new(backend, "scratch", 8, 8, TextureFormat::Rgba16Float, usage)
                .unwrap(),
            RenderTarget::new(backend, "saved", 8, 8, TextureFormat::Rgba16Float, usage).unwrap(),
        ];
        let id = TargetId(0);
        Composer {
            passes: vec![Box::new(SavePass::new("early-save", TargetId(0), TargetId(1)))],
            targets,
            ids: Targets {
                frame_a: id,
                frame_b: id,
                depth: id,
                normal: id,
                saved_target: id,
                saved_backface: id,
                saved_env: id,
                presentation: id,
            },
            width: 8,
            height: 8,
        }
    }

    #[test]
    fn read_before_write_is_rejected() {
        let mut backend = HeadlessBackend::new();
        let composer = hand_wired_composer(&mut backend);
        let err = composer.validate_order().unwrap_err();
        assert!(matches!(
            err,
            SceneError::PipelineOrder { pass, target } if pass == "early-save" && target == "scratch"
        ));
    }

    #[test]
    fn stray_target_size_is_reported() {
        let mut backend = HeadlessBackend::new();
        let composer = hand_wired_composer(&mut backend);
        assert!(composer.verify_target_sizes(8, 8).is_ok());

        let err = composer.verify_target_sizes(16, 16).unwrap_err();
        assert!(matches!(
            err,
            SceneError::TargetSizeMismatch {
                name,
                expected_width: 16,
                actual_width: 8,
                ..
            } if name == "scratch"
        ));
    }

    #[test]
    fn resize_to_same_size_is_noop() {
        let mut backend = HeadlessBackend::new();
        let mut composer = Composer::new(&mut backend, 800, 600, None).unwrap();
        let view = composer.presentation_view();
        composer.resize(&mut backend, 800, 600).unwrap();
        assert_eq!(composer.presentation_view(), view);
    }
}
