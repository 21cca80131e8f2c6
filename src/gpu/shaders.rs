//! WGSL shader for the full-viewport luma quad
//!
//! Vertex stage: the quad's XY goes straight to clip space (Z = 0, W = 1),
//! texture coordinates pass through untouched.
//! Fragment stage: the texture's red channel is the gray level, replicated
//! to RGB with full opacity.

use super::{ProgramDesc, VertexAttribute, VertexFormat, VertexLayout};

/// Shader input location of the 3-float position
pub const ATTRIB_POSITION: u32 = 0;
/// Shader input location of the 2-float texture coordinate
pub const ATTRIB_TEX_COORD: u32 = 1;
/// Group 0 binding of the luma texture
pub const BINDING_TEXTURE: u32 = 0;
/// Group 0 binding of its sampler
pub const BINDING_SAMPLER: u32 = 1;

pub const QUAD_SHADER: &str = r#"
// ========== Vertex Shader ==========

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) tex_coord: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) tex_coord: vec2<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var output: VertexOutput;
    output.clip_position = vec4<f32>(input.position.xy, 0.0, 1.0);
    output.tex_coord = input.tex_coord;
    return output;
}

// ========== Fragment Shader ==========

@group(0) @binding(0)
var luma_texture: texture_2d<f32>;

@group(0) @binding(1)
var luma_sampler: sampler;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let gray = textureSample(luma_texture, luma_sampler, input.tex_coord).r;
    return vec4<f32>(gray, gray, gray, 1.0);
}
"#;

const QUAD_ATTRIBUTES: [VertexAttribute; 2] = [
    VertexAttribute {
        location: ATTRIB_POSITION,
        format: VertexFormat::Float32x3,
        offset: 0,
    },
    VertexAttribute {
        location: ATTRIB_TEX_COORD,
        format: VertexFormat::Float32x2,
        offset: 3 * 4,
    },
];

/// Interleaved position (3 floats) + texcoord (2 floats)
pub const QUAD_LAYOUT: VertexLayout = VertexLayout {
    stride: 5 * 4,
    attributes: &QUAD_ATTRIBUTES,
};

/// Program description for the quad shader
pub fn quad_program() -> ProgramDesc<'static> {
    ProgramDesc {
        label: "Luma Quad Program",
        source: QUAD_SHADER,
        vertex_entry: "vs_main",
        fragment_entry: "fs_main",
        layout: QUAD_LAYOUT,
        texture_binding: BINDING_TEXTURE,
        sampler_binding: BINDING_SAMPLER,
    }
}
