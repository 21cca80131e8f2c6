//! GPU device seam
//!
//! Everything the renderer and session need from a GPU goes through
//! `GpuDevice`, a small handle-based API shaped after what a textured-quad
//! preview actually does. Two implementations:
//! - `wgpu_device.rs` - `WgpuDevice`, real rendering through wgpu
//! - `headless.rs` - `HeadlessDevice`, records calls and injects faults
//!
//! `shaders.rs` holds the WGSL source for the quad program.
//!
//! Devices are owned by the render thread only. The camera thread never
//! sees one, so no GPU-side synchronisation is needed.

pub mod headless;
pub mod shaders;
pub mod wgpu_device;

pub use headless::{Faults, HeadlessDevice};
pub use wgpu_device::WgpuDevice;

use crate::error::Result;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(u32);

        impl $name {
            pub fn from_raw(id: u32) -> Self {
                Self(id)
            }

            pub fn raw(self) -> u32 {
                self.0
            }
        }
    };
}

handle!(
    /// A linked vertex + fragment program
    ProgramHandle
);
handle!(
    /// A static vertex or index buffer
    BufferHandle
);
handle!(
    /// A single-channel texture plus its sampler
    TextureHandle
);

/// What a buffer is bound as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Vertex,
    /// 16-bit indices
    Index,
}

impl BufferKind {
    pub fn label(self) -> &'static str {
        match self {
            BufferKind::Vertex => "vertex",
            BufferKind::Index => "index",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    Float32x2,
    Float32x3,
}

/// One interleaved vertex attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    /// Shader input location
    pub location: u32,
    pub format: VertexFormat,
    /// Byte offset inside one vertex
    pub offset: u64,
}

/// Interleaved layout of the single vertex buffer a program reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexLayout {
    /// Bytes per vertex
    pub stride: u64,
    pub attributes: &'static [VertexAttribute],
}

/// Everything needed to build a program
#[derive(Debug, Clone, Copy)]
pub struct ProgramDesc<'a> {
    pub label: &'a str,
    /// WGSL source holding both stages
    pub source: &'a str,
    pub vertex_entry: &'a str,
    pub fragment_entry: &'a str,
    pub layout: VertexLayout,
    /// Binding slot of the sampled texture in group 0
    pub texture_binding: u32,
    /// Binding slot of its sampler in group 0
    pub sampler_binding: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapMode {
    ClampToEdge,
    Repeat,
}

/// Sampling state baked into a texture at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerParams {
    pub filter: FilterMode,
    pub wrap: WrapMode,
    pub mipmaps: bool,
}

impl SamplerParams {
    /// Bilinear, clamped, single mip level
    pub const BILINEAR_CLAMP: Self = Self {
        filter: FilterMode::Linear,
        wrap: WrapMode::ClampToEdge,
        mipmaps: false,
    };
}

/// Output size in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// One indexed draw of a textured mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCall {
    pub program: ProgramHandle,
    pub texture: TextureHandle,
    pub vertices: BufferHandle,
    pub indices: BufferHandle,
    pub index_count: u32,
}

/// Handle-based GPU API used by the quad renderer and the session
///
/// Creation calls fail with a `PreviewError` instead of panicking. Destroy
/// calls ignore handles they do not know, so releasing twice is harmless.
/// Draw state (program, texture, buffers) is scoped to a single
/// `draw_indexed` call; nothing stays bound afterwards.
pub trait GpuDevice {
    fn create_program(&mut self, desc: &ProgramDesc<'_>) -> Result<ProgramHandle>;
    fn destroy_program(&mut self, program: ProgramHandle);

    fn create_buffer(&mut self, kind: BufferKind, contents: &[u8]) -> Result<BufferHandle>;
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    /// Create a texture with no image yet
    fn create_texture(&mut self, sampler: &SamplerParams) -> Result<TextureHandle>;

    /// Upload a tightly packed 8-bit luma image
    ///
    /// The image storage is re-specified whenever `width`/`height` differ
    /// from the previous upload, and overwritten in place otherwise.
    fn upload_luma(
        &mut self,
        texture: TextureHandle,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<()>;
    fn destroy_texture(&mut self, texture: TextureHandle);

    fn set_viewport(&mut self, viewport: Viewport);

    /// Start a frame by clearing the output to `clear_color`
    fn begin_frame(&mut self, clear_color: [f32; 4]);

    fn draw_indexed(&mut self, call: &DrawCall);

    /// Submit everything recorded since `begin_frame`
    fn end_frame(&mut self);
}
