//! Render pass primitives
//!
//! Each pass is a single-purpose unit of GPU work with declared target
//! reads/writes. The composer validates those declarations against its fixed
//! execution order at construction time, then simply runs the list.

use crate::backend::{
    BackendResult, BindGroupDescriptor, BindGroupHandle, BindingResource, BufferDescriptor,
    BufferHandle, BufferUsage, ColorAttachment, DepthAttachment, DepthLoadOp, GraphicsBackend,
    LoadOp, PipelineDescriptor, RenderPassDescriptor, RenderPipelineHandle, SamplerDescriptor,
    SamplerHandle, StoreOp, TextureFormat, TextureHandle, TextureViewHandle,
};
use crate::composer::effects::EffectStack;
use crate::composer::target::{RenderTarget, TargetId};
use crate::scene::{Camera, Scene};

/// Which scene a pass renders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneSlot {
    Main,
    /// Isolated scene holding the animated background plane
    Target,
}

/// Which camera a pass renders with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraSlot {
    Main,
    Environment,
    Backface,
    TargetScene,
}

/// Per-frame inputs shared by all passes
pub struct FrameData<'a> {
    pub scene: &'a Scene,
    pub target_scene: &'a Scene,
    pub main_camera: &'a Camera,
    pub environment_camera: &'a Camera,
    pub backface_camera: &'a Camera,
    pub target_camera: &'a Camera,
    pub time: f32,
    pub dt: f32,
}

/// Context handed to a pass while executing
pub struct PassContext<'a, B: GraphicsBackend> {
    pub backend: &'a mut B,
    pub(crate) targets: &'a [RenderTarget],
    pub frame: &'a FrameData<'a>,
    pub width: u32,
    pub height: u32,
}

impl<'a, B: GraphicsBackend> PassContext<'a, B> {
    pub fn target(&self, id: TargetId) -> &RenderTarget {
        &self.targets[id.0]
    }

    pub fn view(&self, id: TargetId) -> TextureViewHandle {
        self.targets[id.0].view()
    }

    pub fn texture(&self, id: TargetId) -> TextureHandle {
        self.targets[id.0].texture()
    }

    pub fn scene(&self, slot: SceneSlot) -> &Scene {
        match slot {
            SceneSlot::Main => self.frame.scene,
            SceneSlot::Target => self.frame.target_scene,
        }
    }

    pub fn camera(&self, slot: CameraSlot) -> &Camera {
        match slot {
            CameraSlot::Main => self.frame.main_camera,
            CameraSlot::Environment => self.frame.environment_camera,
            CameraSlot::Backface => self.frame.backface_camera,
            CameraSlot::TargetScene => self.frame.target_camera,
        }
    }
}

/// Trait for render passes
pub trait Pass<B: GraphicsBackend> {
    /// Pass name, used for labels and the headless pass log
    fn name(&self) -> &str;

    /// Targets this pass samples or copies from
    fn reads(&self) -> Vec<TargetId> {
        Vec::new()
    }

    /// Targets this pass renders or copies into
    fn writes(&self) -> Vec<TargetId>;

    /// Record the pass
    fn execute(&self, ctx: &mut PassContext<'_, B>);

    /// Update resolution-dependent state after a viewport resize. Targets
    /// have already been recreated when this runs.
    fn resize(
        &mut self,
        _backend: &mut B,
        _targets: &[RenderTarget],
        _width: u32,
        _height: u32,
    ) -> BackendResult<()> {
        Ok(())
    }
}

/// Renders one scene from one camera into a color target
pub struct RenderScenePass {
    name: String,
    scene: SceneSlot,
    camera: CameraSlot,
    color: TargetId,
    depth: Option<TargetId>,
    clear_color: [f32; 4],
}

impl RenderScenePass {
    pub fn new(name: &str, scene: SceneSlot, camera: CameraSlot, color: TargetId) -> Self {
        Self {
            name: name.to_string(),
            scene,
            camera,
            color,
            depth: None,
            clear_color: [0.0, 0.0, 0.0, 0.0],
        }
    }

    pub fn with_depth(mut self, depth: TargetId) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }
}

impl<B: GraphicsBackend> Pass<B> for RenderScenePass {
    fn name(&self) -> &str {
        &self.name
    }

    fn writes(&self) -> Vec<TargetId> {
        let mut out = vec![self.color];
        out.extend(self.depth);
        out
    }

    fn execute(&self, ctx: &mut PassContext<'_, B>) {
        let color_view = ctx.view(self.color);
        let depth_view = self.depth.map(|d| ctx.view(d));
        let layers = ctx.camera(self.camera).layers;
        let draw_count = ctx.scene(self.scene).visible_objects(layers).count();

        ctx.backend.begin_render_pass(&RenderPassDescriptor {
            label: Some(self.name.clone()),
            color_attachments: vec![ColorAttachment {
                view: color_view,
                load_op: LoadOp::Clear(self.clear_color),
                store_op: StoreOp::Store,
            }],
            depth_attachment: depth_view.map(|view| DepthAttachment {
                view,
                load_op: DepthLoadOp::Clear(1.0),
                store_op: StoreOp::Store,
            }),
        });
        ctx.backend
            .set_viewport(0.0, 0.0, ctx.width as f32, ctx.height as f32);
        for _ in 0..draw_count {
            ctx.backend.draw(0..3, 0..1);
        }
        ctx.backend.end_render_pass();
    }
}

/// Clears the shared frame and depth buffers between capture phases
pub struct ClearPass {
    name: String,
    color: TargetId,
    depth: TargetId,
}

impl ClearPass {
    pub fn new(name: &str, color: TargetId, depth: TargetId) -> Self {
        Self {
            name: name.to_string(),
            color,
            depth,
        }
    }
}

impl<B: GraphicsBackend> Pass<B> for ClearPass {
    fn name(&self) -> &str {
        &self.name
    }

    fn writes(&self) -> Vec<TargetId> {
        vec![self.color, self.depth]
    }

    fn execute(&self, ctx: &mut PassContext<'_, B>) {
        let color_view = ctx.view(self.color);
        let depth_view = ctx.view(self.depth);
        ctx.backend.begin_render_pass(&RenderPassDescriptor {
            label: Some(self.name.clone()),
            color_attachments: vec![ColorAttachment {
                view: color_view,
                load_op: LoadOp::Clear([0.0, 0.0, 0.0, 0.0]),
                store_op: StoreOp::Store,
            }],
            depth_attachment: Some(DepthAttachment {
                view: depth_view,
                load_op: DepthLoadOp::Clear(1.0),
                store_op: StoreOp::Store,
            }),
        });
        ctx.backend.end_render_pass();
    }
}

/// Copies the current frame buffer into a persistent texture for reuse as a
/// material input
pub struct SavePass {
    name: String,
    source: TargetId,
    destination: TargetId,
}

impl SavePass {
    pub fn new(name: &str, source: TargetId, destination: TargetId) -> Self {
        Self {
            name: name.to_string(),
            source,
            destination,
        }
    }
}

impl<B: GraphicsBackend> Pass<B> for SavePass {
    fn name(&self) -> &str {
        &self.name
    }

    fn reads(&self) -> Vec<TargetId> {
        vec![self.source]
    }

    fn writes(&self) -> Vec<TargetId> {
        vec![self.destination]
    }

    fn execute(&self, ctx: &mut PassContext<'_, B>) {
        let (width, height) = ctx.target(self.source).size();
        if ctx.target(self.destination).size() != (width, height) {
            log::warn!(
                "{}: source/destination size mismatch, skipping copy",
                self.name
            );
            return;
        }
        let src = ctx.texture(self.source);
        let dst = ctx.texture(self.destination);
        ctx.backend.copy_texture(src, dst, width, height);
    }
}

/// Produces the main-camera normal buffer consumed by ambient occlusion
pub struct NormalPass {
    name: String,
    output: TargetId,
}

impl NormalPass {
    pub fn new(name: &str, output: TargetId) -> Self {
        Self {
            name: name.to_string(),
            output,
        }
    }
}

impl<B: GraphicsBackend> Pass<B> for NormalPass {
    fn name(&self) -> &str {
        &self.name
    }

    fn writes(&self) -> Vec<TargetId> {
        vec![self.output]
    }

    fn execute(&self, ctx: &mut PassContext<'_, B>) {
        let view = ctx.view(self.output);
        let layers = ctx.frame.main_camera.layers;
        let draw_count = ctx.frame.scene.visible_objects(layers).count();

        ctx.backend.begin_render_pass(&RenderPassDescriptor {
            label: Some(self.name.clone()),
            color_attachments: vec![ColorAttachment {
                view,
                // flat +Z normal background
                load_op: LoadOp::Clear([0.5, 0.5, 1.0, 1.0]),
                store_op: StoreOp::Store,
            }],
            depth_attachment: None,
        });
        ctx.backend
            .set_viewport(0.0, 0.0, ctx.width as f32, ctx.height as f32);
        for _ in 0..draw_count {
            ctx.backend.draw(0..3, 0..1);
        }
        ctx.backend.end_render_pass();
    }
}

/// Uniform buffer size shared by all effect shaders
const EFFECT_UNIFORM_SIZE: u64 = 48;

/// Applies an effect stack as one combined fullscreen pass
pub struct EffectPass {
    name: String,
    camera: CameraSlot,
    stack: EffectStack,
    input: TargetId,
    output: TargetId,
    normal_input: Option<TargetId>,
    encode_output: bool,
    pipeline: RenderPipelineHandle,
    sampler: SamplerHandle,
    uniform_buffer: BufferHandle,
    bind_group: BindGroupHandle,
    resolution: (u32, u32),
}

impl EffectPass {
    #[allow(clippy::too_many_arguments)]
    pub fn new<B: GraphicsBackend>(
        backend: &mut B,
        name: &str,
        camera: CameraSlot,
        stack: EffectStack,
        targets: &[RenderTarget],
        input: TargetId,
        output: TargetId,
        normal_input: Option<TargetId>,
        output_format: TextureFormat,
        width: u32,
        height: u32,
    ) -> BackendResult<Self> {
        let pipeline = backend.create_render_pipeline(&PipelineDescriptor {
            label: Some(name.to_string()),
            shader_source: stack.shader_source().to_string(),
            color_format: output_format,
        })?;
        let sampler = backend.create_sampler(&SamplerDescriptor {
            label: Some(format!("{name}-sampler")),
            ..SamplerDescriptor::default()
        })?;
        let uniform_buffer = backend.create_buffer(&BufferDescriptor {
            label: Some(format!("{name}-params")),
            size: EFFECT_UNIFORM_SIZE,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
        })?;
        let bind_group = Self::build_bind_group(
            backend,
            name,
            pipeline,
            &stack,
            sampler,
            uniform_buffer,
            targets,
            input,
            normal_input,
        )?;
        Ok(Self {
            name: name.to_string(),
            camera,
            stack,
            input,
            output,
            normal_input,
            encode_output: true,
            pipeline,
            sampler,
            uniform_buffer,
            bind_group,
            resolution: (width, height),
        })
    }

    /// Bindings follow the shader's `@group(0)` layout: input texture,
    /// sampler, an optional extra texture (normal buffer or perturbation
    /// map), then the params uniform.
    #[allow(clippy::too_many_arguments)]
    fn build_bind_group<B: GraphicsBackend>(
        backend: &mut B,
        name: &str,
        pipeline: RenderPipelineHandle,
        stack: &EffectStack,
        sampler: SamplerHandle,
        uniform_buffer: BufferHandle,
        targets: &[RenderTarget],
        input: TargetId,
        normal_input: Option<TargetId>,
    ) -> BackendResult<BindGroupHandle> {
        let input_view = targets[input.0].view();
        let mut entries = vec![
            BindingResource::TextureView(input_view),
            BindingResource::Sampler(sampler),
        ];
        if let Some(normal) = normal_input {
            entries.push(BindingResource::TextureView(targets[normal.0].view()));
        } else if stack.uses_distortion() {
            // without a perturbation map the input stands in for it
            entries.push(BindingResource::TextureView(
                stack.perturbation_view().unwrap_or(input_view),
            ));
        }
        entries.push(BindingResource::Buffer(uniform_buffer));
        backend.create_bind_group(
            pipeline,
            &BindGroupDescriptor {
                label: Some(format!("{name}-bindings")),
                entries,
            },
        )
    }

    /// Suppress output color-space encoding. Used for the layer capture
    /// passes whose results are consumed as data textures, where a second
    /// correction would double-apply gamma.
    pub fn with_encode_output(mut self, encode: bool) -> Self {
        self.encode_output = encode;
        self
    }

    pub fn camera(&self) -> CameraSlot {
        self.camera
    }

    pub fn stack(&self) -> &EffectStack {
        &self.stack
    }

    pub fn encodes_output(&self) -> bool {
        self.encode_output
    }
}

impl<B: GraphicsBackend> Pass<B> for EffectPass {
    fn name(&self) -> &str {
        &self.name
    }

    fn reads(&self) -> Vec<TargetId> {
        let mut out = vec![self.input];
        out.extend(self.normal_input);
        out
    }

    fn writes(&self) -> Vec<TargetId> {
        vec![self.output]
    }

    fn execute(&self, ctx: &mut PassContext<'_, B>) {
        let params = self
            .stack
            .uniform_data(self.resolution.0, self.resolution.1, ctx.frame.time);
        ctx.backend
            .write_buffer(self.uniform_buffer, 0, bytemuck::bytes_of(&params));

        let view = ctx.view(self.output);
        ctx.backend.begin_render_pass(&RenderPassDescriptor {
            label: Some(self.name.clone()),
            color_attachments: vec![ColorAttachment {
                view,
                load_op: LoadOp::Clear([0.0, 0.0, 0.0, 1.0]),
                store_op: StoreOp::Store,
            }],
            depth_attachment: None,
        });
        ctx.backend.set_render_pipeline(self.pipeline);
        ctx.backend.set_bind_group(self.bind_group);
        ctx.backend.set_viewport(
            0.0,
            0.0,
            self.resolution.0 as f32,
            self.resolution.1 as f32,
        );
        ctx.backend.draw(0..3, 0..1);
        ctx.backend.end_render_pass();
    }

    fn resize(
        &mut self,
        backend: &mut B,
        targets: &[RenderTarget],
        width: u32,
        height: u32,
    ) -> BackendResult<()> {
        self.resolution = (width, height);
        // input and normal views were recreated with the targets
        self.bind_group = Self::build_bind_group(
            backend,
            &self.name,
            self.pipeline,
            &self.stack,
            self.sampler,
            self.uniform_buffer,
            targets,
            self.input,
            self.normal_input,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{HeadlessBackend, TextureUsage};

    fn capture_targets(backend: &mut HeadlessBackend) -> Vec<RenderTarget> {
        let usage = TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING;
        ["input", "output", "normals"]
            .iter()
            .map(|name| {
                RenderTarget::new(backend, name, 800, 600, TextureFormat::Rgba16Float, usage)
                    .unwrap()
            })
            .collect()
    }

    fn effect_pass(
        backend: &mut HeadlessBackend,
        targets: &[RenderTarget],
        stack: EffectStack,
        normal: Option<TargetId>,
    ) -> EffectPass {
        EffectPass::new(
            backend,
            "fullscreen",
            CameraSlot::Main,
            stack,
            targets,
            TargetId(0),
            TargetId(1),
            normal,
            TextureFormat::Rgba16Float,
            800,
            600,
        )
        .unwrap()
    }

    #[test]
    fn normal_input_shows_up_in_reads() {
        let mut backend = HeadlessBackend::new();
        let targets = capture_targets(&mut backend);
        let pass = effect_pass(
            &mut backend,
            &targets,
            EffectStack::main_stack(),
            Some(TargetId(2)),
        );
        let reads = Pass::<HeadlessBackend>::reads(&pass);
        assert_eq!(reads, vec![TargetId(0), TargetId(2)]);
        assert_eq!(Pass::<HeadlessBackend>::writes(&pass), vec![TargetId(1)]);
    }

    #[test]
    fn capture_passes_suppress_output_encoding() {
        let mut backend = HeadlessBackend::new();
        let targets = capture_targets(&mut backend);
        let gamma = effect_pass(&mut backend, &targets, EffectStack::gamma_stack(), None)
            .with_encode_output(false);
        assert!(!gamma.encodes_output());

        let main = effect_pass(
            &mut backend,
            &targets,
            EffectStack::main_stack(),
            Some(TargetId(2)),
        );
        assert!(main.encodes_output());
    }

    #[test]
    fn effect_pass_allocates_its_gpu_bindings() {
        let mut backend = HeadlessBackend::new();
        let targets = capture_targets(&mut backend);
        let _pass = effect_pass(
            &mut backend,
            &targets,
            EffectStack::main_stack(),
            Some(TargetId(2)),
        );
        assert_eq!(backend.buffer_count(), 1);
        assert_eq!(backend.sampler_count(), 1);
        assert_eq!(backend.bind_group_count(), 1);
    }

    #[test]
    fn resize_rebuilds_the_bind_group() {
        let mut backend = HeadlessBackend::new();
        let mut targets = capture_targets(&mut backend);
        let mut pass = effect_pass(
            &mut backend,
            &targets,
            EffectStack::gamma_stack(),
            None,
        );
        for target in &mut targets {
            target.resize(&mut backend, 1920, 1080).unwrap();
        }
        Pass::<HeadlessBackend>::resize(&mut pass, &mut backend, &targets, 1920, 1080).unwrap();
        assert_eq!(backend.bind_group_count(), 2);
    }
}
