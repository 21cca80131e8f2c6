//! Quad Renderer: one shader program and static geometry for a textured
//! full-viewport quad
//!
//! Nothing about the geometry changes per frame; all variability lives in
//! the texture, so the hot path is a single indexed draw.

use crate::error::Result;
use crate::gpu::shaders::quad_program;
use crate::gpu::{BufferHandle, BufferKind, DrawCall, GpuDevice, ProgramHandle, TextureHandle};

/// Interleaved quad vertex, must match `shaders::QUAD_LAYOUT`
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct QuadVertex {
    position: [f32; 3],
    tex_coord: [f32; 2],
}

/// Corners of clip space [-1, 1]²; v grows downward so the first image row is on top
const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex { position: [-1.0, -1.0, 0.0], tex_coord: [0.0, 1.0] },
    QuadVertex { position: [1.0, -1.0, 0.0], tex_coord: [1.0, 1.0] },
    QuadVertex { position: [-1.0, 1.0, 0.0], tex_coord: [0.0, 0.0] },
    QuadVertex { position: [1.0, 1.0, 0.0], tex_coord: [1.0, 0.0] },
];

/// Two triangles sharing the 1-2 diagonal
const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 1, 3];

#[derive(Debug, Clone, Copy)]
struct QuadResources {
    program: ProgramHandle,
    vertices: BufferHandle,
    indices: BufferHandle,
}

/// Draws a luma texture over the whole viewport
#[derive(Debug, Default)]
pub struct QuadRenderer {
    resources: Option<QuadResources>,
}

impl QuadRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `setup` succeeded and `destroy` has not run since
    pub fn is_ready(&self) -> bool {
        self.resources.is_some()
    }

    /// Build the program and upload the quad geometry
    ///
    /// On failure every object created so far is released again and the
    /// renderer stays unusable.
    pub fn setup<D: GpuDevice + ?Sized>(&mut self, gpu: &mut D) -> Result<()> {
        if self.resources.is_some() {
            return Ok(());
        }

        let program = gpu.create_program(&quad_program())?;

        let vertices = match gpu.create_buffer(
            BufferKind::Vertex,
            bytemuck::cast_slice(&QUAD_VERTICES),
        ) {
            Ok(buffer) => buffer,
            Err(err) => {
                gpu.destroy_program(program);
                return Err(err);
            }
        };

        let indices = match gpu.create_buffer(BufferKind::Index, bytemuck::cast_slice(&QUAD_INDICES))
        {
            Ok(buffer) => buffer,
            Err(err) => {
                gpu.destroy_buffer(vertices);
                gpu.destroy_program(program);
                return Err(err);
            }
        };

        self.resources = Some(QuadResources {
            program,
            vertices,
            indices,
        });
        tracing::debug!(program = program.raw(), "quad renderer ready");
        Ok(())
    }

    /// Draw `texture` over the viewport; does nothing unless set up
    pub fn draw<D: GpuDevice + ?Sized>(&self, gpu: &mut D, texture: TextureHandle) {
        let Some(resources) = self.resources else {
            return;
        };
        gpu.draw_indexed(&DrawCall {
            program: resources.program,
            texture,
            vertices: resources.vertices,
            indices: resources.indices,
            index_count: QUAD_INDICES.len() as u32,
        });
    }

    /// Release program and buffers; no-op when nothing is held
    pub fn destroy<D: GpuDevice + ?Sized>(&mut self, gpu: &mut D) {
        if let Some(resources) = self.resources.take() {
            gpu.destroy_program(resources.program);
            gpu.destroy_buffer(resources.vertices);
            gpu.destroy_buffer(resources.indices);
            tracing::debug!("quad renderer destroyed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PreviewError;
    use crate::gpu::{Faults, HeadlessDevice, SamplerParams, Viewport};

    fn texture(gpu: &mut HeadlessDevice) -> TextureHandle {
        gpu.create_texture(&SamplerParams::BILINEAR_CLAMP).unwrap()
    }

    #[test]
    fn test_setup_uploads_quad_geometry() {
        let mut gpu = HeadlessDevice::new();
        let mut renderer = QuadRenderer::new();
        renderer.setup(&mut gpu).unwrap();

        assert!(renderer.is_ready());
        assert_eq!(gpu.live_programs(), 1);
        assert_eq!(gpu.live_buffers(), 2);

        let resources = renderer.resources.unwrap();
        let (kind, bytes) = gpu.buffer(resources.vertices).unwrap();
        assert_eq!(kind, BufferKind::Vertex);
        // 4 vertices x 5 floats
        assert_eq!(bytes.len(), 4 * 5 * 4);

        let (kind, bytes) = gpu.buffer(resources.indices).unwrap();
        assert_eq!(kind, BufferKind::Index);
        let indices: &[u16] = bytemuck::cast_slice(bytes);
        assert_eq!(indices, &[0, 1, 2, 2, 1, 3]);
    }

    #[test]
    fn test_draw_before_setup_is_noop() {
        let mut gpu = HeadlessDevice::new();
        let tex = texture(&mut gpu);
        let renderer = QuadRenderer::new();

        gpu.begin_frame([0.0; 4]);
        renderer.draw(&mut gpu, tex);
        gpu.end_frame();

        assert!(gpu.last_frame().unwrap().draws.is_empty());
    }

    #[test]
    fn test_draw_issues_six_indices() {
        let mut gpu = HeadlessDevice::new();
        gpu.set_viewport(Viewport {
            width: 64,
            height: 48,
        });
        let tex = texture(&mut gpu);
        let mut renderer = QuadRenderer::new();
        renderer.setup(&mut gpu).unwrap();

        gpu.begin_frame([0.0; 4]);
        renderer.draw(&mut gpu, tex);
        gpu.end_frame();

        let draws = &gpu.last_frame().unwrap().draws;
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].index_count, 6);
        assert_eq!(draws[0].texture, tex);
    }

    #[test]
    fn test_compile_failure_leaks_nothing() {
        let mut gpu = HeadlessDevice::with_faults(Faults {
            shader_compile: true,
            ..Faults::default()
        });
        let mut renderer = QuadRenderer::new();

        let err = renderer.setup(&mut gpu).unwrap_err();
        assert!(matches!(err, PreviewError::ShaderCompile(_)));
        assert!(!renderer.is_ready());
        assert_eq!(gpu.live_objects(), 0);
    }

    #[test]
    fn test_link_failure_leaks_nothing() {
        let mut gpu = HeadlessDevice::with_faults(Faults {
            program_link: true,
            ..Faults::default()
        });
        let mut renderer = QuadRenderer::new();

        assert!(matches!(
            renderer.setup(&mut gpu),
            Err(PreviewError::ProgramLink(_))
        ));
        assert_eq!(gpu.live_objects(), 0);
    }

    #[test]
    fn test_buffer_failure_releases_partial_setup() {
        for failing in 0..2 {
            let mut gpu = HeadlessDevice::with_faults(Faults {
                buffer_at: Some(failing),
                ..Faults::default()
            });
            let mut renderer = QuadRenderer::new();

            assert!(matches!(
                renderer.setup(&mut gpu),
                Err(PreviewError::BufferCreation { .. })
            ));
            assert!(!renderer.is_ready());
            assert_eq!(gpu.live_objects(), 0, "buffer #{failing} failing leaked");
        }
    }

    #[test]
    fn test_destroy_twice() {
        let mut gpu = HeadlessDevice::new();
        let mut renderer = QuadRenderer::new();
        renderer.setup(&mut gpu).unwrap();

        renderer.destroy(&mut gpu);
        renderer.destroy(&mut gpu);
        assert!(!renderer.is_ready());
        assert_eq!(gpu.live_objects(), 0);
    }

    #[test]
    fn test_setup_after_failure_retries() {
        let mut gpu = HeadlessDevice::with_faults(Faults {
            shader_compile: true,
            ..Faults::default()
        });
        let mut renderer = QuadRenderer::new();
        assert!(renderer.setup(&mut gpu).is_err());

        gpu.faults_mut().shader_compile = false;
        renderer.setup(&mut gpu).unwrap();
        assert!(renderer.is_ready());
        assert_eq!(gpu.live_objects(), 3);
    }
}
