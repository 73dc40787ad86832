//! Postprocessing effects
//!
//! Effects are merged into a single combined render pass per camera. The
//! order inside a stack is caller-specified and never reordered; blend
//! functions describe how each effect's output combines with the frame
//! accumulated so far.

use crate::backend::TextureViewHandle;
use glam::Vec2;

/// How an effect's output combines with the accumulated frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFunction {
    Normal,
    Screen,
    Multiply,
    ColorDodge,
    Add,
}

/// Convolution kernel footprint for blur-based effects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelSize {
    Small,
    Medium,
    Large,
}

/// Ambient occlusion parameters
///
/// Two variants of this run in the main stack with different sample counts
/// and intensities; both read the main-camera normal buffer.
#[derive(Debug, Clone)]
pub struct AmbientOcclusionParams {
    pub samples: u32,
    pub rings: u32,
    pub distance_threshold: f32,
    pub distance_falloff: f32,
    pub range_threshold: f32,
    pub range_falloff: f32,
    pub luminance_influence: f32,
    pub radius: f32,
    pub intensity: f32,
    pub bias: f32,
    pub color: Option<[f32; 3]>,
}

impl Default for AmbientOcclusionParams {
    fn default() -> Self {
        Self {
            samples: 4,
            rings: 4,
            distance_threshold: 0.2,
            distance_falloff: 1.0,
            range_threshold: 1.0,
            range_falloff: 0.01,
            luminance_influence: 0.6,
            radius: 8.0,
            intensity: 5.0,
            bias: 0.5,
            color: None,
        }
    }
}

/// A single named effect with its numeric parameters
#[derive(Debug, Clone)]
pub enum EffectKind {
    Bloom {
        luminance_threshold: f32,
        luminance_smoothing: f32,
        kernel_size: KernelSize,
        height: u32,
    },
    AmbientOcclusion(AmbientOcclusionParams),
    Antialiasing {
        edge_threshold: f32,
    },
    GammaCorrection {
        gamma: f32,
    },
    ChromaticAberration {
        offset: Vec2,
    },
    Glitch {
        perturbation_map: Option<TextureViewHandle>,
        chromatic_aberration_offset: Vec2,
    },
    Noise,
}

impl EffectKind {
    pub fn name(&self) -> &'static str {
        match self {
            EffectKind::Bloom { .. } => "bloom",
            EffectKind::AmbientOcclusion(_) => "ambient-occlusion",
            EffectKind::Antialiasing { .. } => "antialiasing",
            EffectKind::GammaCorrection { .. } => "gamma-correction",
            EffectKind::ChromaticAberration { .. } => "chromatic-aberration",
            EffectKind::Glitch { .. } => "glitch",
            EffectKind::Noise => "noise",
        }
    }
}

/// An effect plus its blend semantics
#[derive(Debug, Clone)]
pub struct EffectDescriptor {
    pub kind: EffectKind,
    pub blend: BlendFunction,
    pub opacity: f32,
}

impl EffectDescriptor {
    pub fn new(kind: EffectKind, blend: BlendFunction) -> Self {
        Self {
            kind,
            blend,
            opacity: 1.0,
        }
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }
}

/// Ordered list of effects merged into one combined pass
#[derive(Debug, Clone)]
pub struct EffectStack {
    effects: Vec<EffectDescriptor>,
}

impl EffectStack {
    pub fn new(effects: Vec<EffectDescriptor>) -> Self {
        Self { effects }
    }

    /// Main-camera stack: antialiasing, two ambient occlusion variants, bloom
    pub fn main_stack() -> Self {
        let coarse = AmbientOcclusionParams {
            samples: 21,
            radius: 10.0,
            intensity: 20.0,
            color: Some([0.5, 0.0, 0.5]),
            ..AmbientOcclusionParams::default()
        };
        let fine = AmbientOcclusionParams::default();

        Self::new(vec![
            EffectDescriptor::new(
                EffectKind::Antialiasing {
                    edge_threshold: 0.2,
                },
                BlendFunction::Normal,
            ),
            EffectDescriptor::new(
                EffectKind::AmbientOcclusion(coarse),
                BlendFunction::Multiply,
            ),
            EffectDescriptor::new(EffectKind::AmbientOcclusion(fine), BlendFunction::Multiply),
            EffectDescriptor::new(
                EffectKind::Bloom {
                    luminance_threshold: 0.6,
                    luminance_smoothing: 0.2,
                    kernel_size: KernelSize::Large,
                    height: 300,
                },
                BlendFunction::Screen,
            ),
        ])
    }

    /// Target-scene stack: glitch distortion, chromatic aberration, and a
    /// faint color-dodge noise. The distortion amount is a tunable, not a
    /// timing contract.
    pub fn target_stack(perturbation_map: Option<TextureViewHandle>) -> Self {
        let offset = Vec2::new(0.01, 0.01);
        Self::new(vec![
            EffectDescriptor::new(
                EffectKind::Glitch {
                    perturbation_map,
                    chromatic_aberration_offset: offset,
                },
                BlendFunction::Normal,
            ),
            EffectDescriptor::new(
                EffectKind::ChromaticAberration { offset },
                BlendFunction::Normal,
            ),
            EffectDescriptor::new(EffectKind::Noise, BlendFunction::ColorDodge).with_opacity(0.01),
        ])
    }

    /// Layer-camera stack: gamma correction only. The saved layer textures
    /// are consumed as material inputs, so they carry their own display
    /// gamma; output encoding is suppressed at the pass level to avoid a
    /// second correction.
    pub fn gamma_stack() -> Self {
        Self::new(vec![EffectDescriptor::new(
            EffectKind::GammaCorrection { gamma: 0.5 },
            BlendFunction::Normal,
        )])
    }

    pub fn effects(&self) -> &[EffectDescriptor] {
        &self.effects
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Whether any effect in the stack reads the camera normal buffer
    pub fn requires_normal_buffer(&self) -> bool {
        self.effects
            .iter()
            .any(|e| matches!(e.kind, EffectKind::AmbientOcclusion(_)))
    }

    /// Whether the stack samples the glitch perturbation map
    pub fn uses_distortion(&self) -> bool {
        self.effects
            .iter()
            .any(|e| matches!(e.kind, EffectKind::Glitch { .. } | EffectKind::Noise))
    }

    /// View of the glitch perturbation map, if one was provided
    pub fn perturbation_view(&self) -> Option<TextureViewHandle> {
        self.effects.iter().find_map(|e| match e.kind {
            EffectKind::Glitch {
                perturbation_map, ..
            } => perturbation_map,
            _ => None,
        })
    }

    /// Uniform contents for the combined pass, laid out to match
    /// [`shader_source`](Self::shader_source)'s params struct
    pub fn uniform_data(&self, width: u32, height: u32, time: f32) -> [f32; 12] {
        let mut data = [0.0f32; 12];
        if self.requires_normal_buffer() {
            // CompositeParams
            data[0] = width as f32;
            data[1] = height as f32;
            let mut ao_slot = 0;
            for effect in &self.effects {
                match &effect.kind {
                    EffectKind::Bloom {
                        luminance_threshold,
                        luminance_smoothing,
                        ..
                    } => {
                        data[2] = *luminance_threshold;
                        data[3] = *luminance_smoothing;
                    }
                    EffectKind::AmbientOcclusion(params) if ao_slot < 2 => {
                        data[4 + ao_slot] = params.radius;
                        data[6 + ao_slot] = params.intensity;
                        ao_slot += 1;
                    }
                    EffectKind::Antialiasing { edge_threshold } => {
                        data[8] = *edge_threshold;
                    }
                    _ => {}
                }
            }
        } else if self.uses_distortion() {
            // DistortionParams
            for effect in &self.effects {
                match &effect.kind {
                    EffectKind::Glitch {
                        chromatic_aberration_offset,
                        ..
                    } => {
                        data[0] = chromatic_aberration_offset.x;
                        data[1] = chromatic_aberration_offset.y;
                    }
                    EffectKind::Noise => data[2] = effect.opacity,
                    _ => {}
                }
            }
            data[3] = time;
        } else {
            // GammaParams
            for effect in &self.effects {
                if let EffectKind::GammaCorrection { gamma } = effect.kind {
                    data[0] = gamma;
                }
            }
        }
        data
    }

    /// WGSL source of the combined fullscreen pass for this stack
    pub fn shader_source(&self) -> &'static str {
        if self.requires_normal_buffer() {
            MAIN_COMPOSITE_SHADER
        } else if self
            .effects
            .iter()
            .any(|e| matches!(e.kind, EffectKind::Glitch { .. } | EffectKind::Noise))
        {
            DISTORTION_SHADER
        } else {
            GAMMA_CORRECTION_SHADER
        }
    }
}

pub const GAMMA_CORRECTION_SHADER: &str = r#"
struct GammaParams {
    gamma: f32,
}

@group(0) @binding(0) var frame_texture: texture_2d<f32>;
@group(0) @binding(1) var frame_sampler: sampler;
@group(0) @binding(2) var<uniform> params: GammaParams;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var output: VertexOutput;
    let x = f32((vertex_index << 1u) & 2u);
    let y = f32(vertex_index & 2u);
    output.position = vec4<f32>(x * 2.0 - 1.0, y * 2.0 - 1.0, 0.0, 1.0);
    output.uv = vec2<f32>(x, 1.0 - y);
    return output;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let color = textureSample(frame_texture, frame_sampler, input.uv);
    return vec4<f32>(pow(color.rgb, vec3<f32>(1.0 / params.gamma)), color.a);
}
"#;

pub const DISTORTION_SHADER: &str = r#"
struct DistortionParams {
    chromatic_offset: vec2<f32>,
    noise_opacity: f32,
    time: f32,
}

@group(0) @binding(0) var frame_texture: texture_2d<f32>;
@group(0) @binding(1) var frame_sampler: sampler;
@group(0) @binding(2) var perturbation_map: texture_2d<f32>;
@group(0) @binding(3) var<uniform> params: DistortionParams;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var output: VertexOutput;
    let x = f32((vertex_index << 1u) & 2u);
    let y = f32(vertex_index & 2u);
    output.position = vec4<f32>(x * 2.0 - 1.0, y * 2.0 - 1.0, 0.0, 1.0);
    output.uv = vec2<f32>(x, 1.0 - y);
    return output;
}

fn hash(p: vec2<f32>) -> f32 {
    return fract(sin(dot(p, vec2<f32>(12.9898, 78.233))) * 43758.5453);
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let wobble = textureSample(perturbation_map, frame_sampler, input.uv + vec2<f32>(params.time, params.time)).rg;
    let uv = input.uv + (wobble - 0.5) * 0.02;

    let r = textureSample(frame_texture, frame_sampler, uv + params.chromatic_offset).r;
    let g = textureSample(frame_texture, frame_sampler, uv).g;
    let b = textureSample(frame_texture, frame_sampler, uv - params.chromatic_offset).b;
    var color = vec3<f32>(r, g, b);

    // color-dodge noise at low opacity
    let n = hash(input.uv * (params.time + 1.0));
    let dodged = color / max(vec3<f32>(1.0 - n), vec3<f32>(0.001));
    color = mix(color, min(dodged, vec3<f32>(1.0)), params.noise_opacity);

    return vec4<f32>(color, 1.0);
}
"#;

pub const MAIN_COMPOSITE_SHADER: &str = r#"
struct CompositeParams {
    resolution: vec2<f32>,
    bloom_threshold: f32,
    bloom_smoothing: f32,
    ao_radius: vec2<f32>,
    ao_intensity: vec2<f32>,
    smaa_edge_threshold: f32,
}

@group(0) @binding(0) var frame_texture: texture_2d<f32>;
@group(0) @binding(1) var frame_sampler: sampler;
@group(0) @binding(2) var normal_texture: texture_2d<f32>;
@group(0) @binding(3) var<uniform> params: CompositeParams;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var output: VertexOutput;
    let x = f32((vertex_index << 1u) & 2u);
    let y = f32(vertex_index & 2u);
    output.position = vec4<f32>(x * 2.0 - 1.0, y * 2.0 - 1.0, 0.0, 1.0);
    output.uv = vec2<f32>(x, 1.0 - y);
    return output;
}

fn luminance(color: vec3<f32>) -> f32 {
    return dot(color, vec3<f32>(0.2126, 0.7152, 0.0722));
}

fn occlusion(uv: vec2<f32>, radius: f32, intensity: f32) -> f32 {
    let texel = radius / params.resolution;
    let center = textureSample(normal_texture, frame_sampler, uv).xyz;
    var occ = 0.0;
    var offsets = array<vec2<f32>, 4>(
        vec2<f32>(texel.x, 0.0),
        vec2<f32>(-texel.x, 0.0),
        vec2<f32>(0.0, texel.y),
        vec2<f32>(0.0, -texel.y),
    );
    for (var i = 0; i < 4; i++) {
        let sample_n = textureSample(normal_texture, frame_sampler, uv + offsets[i]).xyz;
        occ += max(0.0, 1.0 - dot(center, sample_n));
    }
    return clamp(1.0 - occ * intensity * 0.25, 0.0, 1.0);
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    var color = textureSample(frame_texture, frame_sampler, input.uv).rgb;

    // antialiasing: edge-aware neighbor blend
    let texel = 1.0 / params.resolution;
    let north = textureSample(frame_texture, frame_sampler, input.uv + vec2<f32>(0.0, texel.y)).rgb;
    let east = textureSample(frame_texture, frame_sampler, input.uv + vec2<f32>(texel.x, 0.0)).rgb;
    let edge = abs(luminance(north) - luminance(color)) + abs(luminance(east) - luminance(color));
    if (edge > params.smaa_edge_threshold) {
        color = (color + north + east) / 3.0;
    }

    // two ambient occlusion variants, multiply blend
    color *= occlusion(input.uv, params.ao_radius.x, params.ao_intensity.x);
    color *= occlusion(input.uv, params.ao_radius.y, params.ao_intensity.y);

    // bloom, screen blend
    let lum = luminance(color);
    let weight = smoothstep(params.bloom_threshold, params.bloom_threshold + params.bloom_smoothing, lum);
    let bloom = color * weight;
    color = 1.0 - (1.0 - color) * (1.0 - bloom);

    return vec4<f32>(color, 1.0);
}
"#;
