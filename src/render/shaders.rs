//! WGSL sources for the four programs and the uniform block they share.
//!
//! Every draw gets one [`DrawUniforms`] snapshot. Programs read only the
//! fields named by [`Program::slots`](crate::render::uniforms::Program::slots).

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3};

use crate::render::uniforms::{Program, Uniform};

/// Uniform block layout shared by every program (std140-compatible).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DrawUniforms {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub light_space: [[f32; 4]; 4],
    pub normal_matrix: [[f32; 4]; 3],
    pub light_dir: [f32; 4],
    pub light_color: [f32; 4],
    pub point_light_pos: [f32; 4],
    pub base_color: [f32; 4],
    /// `x` is the flat-shading flag.
    pub flags: [u32; 4],
}

impl Default for DrawUniforms {
    fn default() -> Self {
        let identity = Mat4::IDENTITY.to_cols_array_2d();
        Self {
            model: identity,
            view: identity,
            projection: identity,
            light_space: identity,
            normal_matrix: mat3_to_3x4(Mat3::IDENTITY),
            light_dir: [0.0, 1.0, 0.0, 0.0],
            light_color: [1.0; 4],
            point_light_pos: [0.0, 0.0, 0.0, 1.0],
            base_color: [1.0; 4],
            flags: [0; 4],
        }
    }
}

impl DrawUniforms {
    pub const SIZE: u64 = std::mem::size_of::<DrawUniforms>() as u64;

    /// Stores a uniform value. `ShadowMap` selects a texture unit and has no
    /// storage in the block, so it is ignored here.
    pub fn apply(&mut self, uniform: &Uniform) {
        match *uniform {
            Uniform::Model(m) => self.model = m.to_cols_array_2d(),
            Uniform::View(m) => self.view = m.to_cols_array_2d(),
            Uniform::Projection(m) => self.projection = m.to_cols_array_2d(),
            Uniform::LightSpaceTrMatrix(m) => self.light_space = m.to_cols_array_2d(),
            Uniform::NormalMatrix(m) => self.normal_matrix = mat3_to_3x4(m),
            Uniform::LightDir(v) => self.light_dir = v.extend(0.0).into(),
            Uniform::LightColor(v) => self.light_color = v.extend(1.0).into(),
            Uniform::PointLightPos(v) => self.point_light_pos = v.extend(1.0).into(),
            Uniform::BaseColor(v) => self.base_color = v.extend(1.0).into(),
            Uniform::IsFlat(flat) => self.flags[0] = u32::from(flat),
            Uniform::ShadowMap(_) => {}
        }
    }
}

fn mat3_to_3x4(matrix: Mat3) -> [[f32; 4]; 3] {
    let cols = matrix.to_cols_array();
    [
        [cols[0], cols[1], cols[2], 0.0],
        [cols[3], cols[4], cols[5], 0.0],
        [cols[6], cols[7], cols[8], 0.0],
    ]
}

/// Colour the default framebuffer is cleared to.
pub const CLEAR_COLOR: Vec3 = Vec3::new(0.5, 0.5, 0.5);

/// Depth bias subtracted before the shadow comparison.
pub const SHADOW_BIAS: f32 = 0.005;

pub fn source(program: Program) -> String {
    let body = match program {
        Program::Depth => DEPTH_SHADER,
        Program::Main => MAIN_SHADER,
        Program::LightMarker => MARKER_SHADER,
        Program::Skybox => SKYBOX_SHADER,
    };
    match program {
        Program::Main => format!("{UNIFORM_BLOCK}\nconst SHADOW_BIAS: f32 = {SHADOW_BIAS:?};\n{body}"),
        _ => format!("{UNIFORM_BLOCK}\n{body}"),
    }
}

/// Whether the program writes a colour target.
pub fn has_fragment_stage(program: Program) -> bool {
    !matches!(program, Program::Depth)
}

const UNIFORM_BLOCK: &str = r#"
struct DrawUniforms {
    model: mat4x4<f32>,
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
    light_space: mat4x4<f32>,
    normal_matrix: mat3x3<f32>,
    light_dir: vec4<f32>,
    light_color: vec4<f32>,
    point_light_pos: vec4<f32>,
    base_color: vec4<f32>,
    flags: vec4<u32>,
}

@group(0) @binding(0)
var<uniform> u: DrawUniforms;
"#;

const DEPTH_SHADER: &str = r#"
@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return u.light_space * u.model * vec4<f32>(position, 1.0);
}
"#;

const MAIN_SHADER: &str = r#"

@group(1) @binding(0)
var shadow_map: texture_depth_2d;
@group(1) @binding(1)
var shadow_sampler: sampler_comparison;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

struct VertexOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) eye_pos: vec3<f32>,
    @location(1) eye_normal: vec3<f32>,
    @location(2) light_space_pos: vec4<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world = u.model * vec4<f32>(input.position, 1.0);
    let eye = u.view * world;
    out.clip = u.projection * eye;
    out.eye_pos = eye.xyz;
    out.eye_normal = u.normal_matrix * input.normal;
    out.light_space_pos = u.light_space * world;
    return out;
}

fn shadow_factor(light_space_pos: vec4<f32>) -> f32 {
    let ndc = light_space_pos.xyz / light_space_pos.w;
    // Texture rows grow downwards.
    let uv = vec2<f32>(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
    let lit = textureSampleCompareLevel(shadow_map, shadow_sampler, uv, ndc.z - SHADOW_BIAS);
    let outside = any(uv < vec2<f32>(0.0)) || any(uv > vec2<f32>(1.0)) || ndc.z > 1.0;
    return select(1.0 - lit, 0.0, outside);
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    // Derivatives need uniform control flow, so both normals are computed.
    // Framebuffer y points down, hence dpdy before dpdx.
    let flat_normal = normalize(cross(dpdy(input.eye_pos), dpdx(input.eye_pos)));
    let smooth_normal = normalize(input.eye_normal);
    let normal = select(smooth_normal, flat_normal, u.flags.x != 0u);

    let color = u.light_color.rgb;
    let view_dir = normalize(-input.eye_pos);

    let light_dir = normalize((u.view * vec4<f32>(u.light_dir.xyz, 0.0)).xyz);
    let ambient = 0.2 * color;
    let diffuse = max(dot(normal, light_dir), 0.0) * color;
    let reflected = reflect(-light_dir, normal);
    let specular = 0.5 * pow(max(dot(view_dir, reflected), 0.0), 32.0) * color;

    let point_eye = (u.view * u.point_light_pos).xyz;
    let to_point = point_eye - input.eye_pos;
    let dist = length(to_point);
    let attenuation = 1.0 / (1.0 + 0.09 * dist + 0.032 * dist * dist);
    let point = max(dot(normal, normalize(to_point)), 0.0) * attenuation * color;

    let shadow = shadow_factor(input.light_space_pos);
    let lit = ambient + (1.0 - shadow) * (diffuse + specular) + point;
    return vec4<f32>(min(lit * u.base_color.rgb, vec3<f32>(1.0)), 1.0);
}
"#;

const MARKER_SHADER: &str = r#"
@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return u.projection * u.view * u.model * vec4<f32>(position, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 1.0, 1.0, 1.0);
}
"#;

const SKYBOX_SHADER: &str = r#"
@group(1) @binding(0)
var sky_texture: texture_cube<f32>;
@group(1) @binding(1)
var sky_sampler: sampler;

struct VertexOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) direction: vec3<f32>,
}

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> VertexOutput {
    var out: VertexOutput;
    let clip = u.projection * u.view * vec4<f32>(position, 1.0);
    // Depth of w/w = 1 keeps the sky behind everything else.
    out.clip = clip.xyww;
    out.direction = position;
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(sky_texture, sky_sampler, input.direction);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_size_matches_wgsl_layout() {
        assert_eq!(DrawUniforms::SIZE, 384);
        assert_eq!(std::mem::offset_of!(DrawUniforms, normal_matrix), 256);
        assert_eq!(std::mem::offset_of!(DrawUniforms, light_dir), 304);
        assert_eq!(std::mem::offset_of!(DrawUniforms, flags), 368);
    }

    #[test]
    fn apply_writes_matching_field() {
        let mut block = DrawUniforms::default();
        block.apply(&Uniform::IsFlat(true));
        block.apply(&Uniform::LightDir(Vec3::new(0.0, 0.5, 0.5)));
        block.apply(&Uniform::Model(Mat4::from_translation(Vec3::X)));
        assert_eq!(block.flags[0], 1);
        assert_eq!(block.light_dir, [0.0, 0.5, 0.5, 0.0]);
        assert_eq!(block.model[3], [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn every_program_shares_the_uniform_block() {
        for program in Program::ALL {
            let source = source(program);
            assert!(source.contains("var<uniform> u: DrawUniforms"));
            assert!(source.contains("fn vs_main"));
            assert_eq!(source.contains("fn fs_main"), has_fragment_stage(program));
        }
    }

    #[test]
    fn shadow_bias_is_declared_once_for_the_main_program() {
        let main = source(Program::Main);
        assert_eq!(main.matches("const SHADOW_BIAS").count(), 1);
        assert!(main.contains("const SHADOW_BIAS: f32 = 0.005;"));
        assert!(!MAIN_SHADER.contains("const SHADOW_BIAS"));
        assert!(!source(Program::Depth).contains("SHADOW_BIAS"));
    }
}
