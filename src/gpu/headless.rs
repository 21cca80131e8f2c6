//! Recording GPU device for hosts without a GPU and for tests
//!
//! Keeps the same bookkeeping a real driver would (live objects, texture
//! images, viewport) and records frames and draw calls, but never touches
//! hardware. `Faults` makes individual operations fail on demand so setup
//! failure paths can be exercised.

use std::collections::{HashMap, HashSet};

use super::{
    BufferHandle, BufferKind, DrawCall, GpuDevice, ProgramDesc, ProgramHandle, SamplerParams,
    TextureHandle, Viewport,
};
use crate::error::{PreviewError, Result};

/// Operations to fail on purpose
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Faults {
    pub shader_compile: bool,
    pub program_link: bool,
    /// Fail the n-th buffer creation attempt (0-based, counted over the device's lifetime)
    pub buffer_at: Option<usize>,
    pub texture: bool,
    /// Every creation fails with `ContextLost`
    pub context_lost: bool,
}

/// Image storage of one headless texture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessTexture {
    pub sampler: SamplerParams,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    /// Number of times the image storage was (re)allocated
    pub respecified: u32,
}

/// A completed frame
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRecord {
    pub clear_color: [f32; 4],
    pub viewport: Viewport,
    pub draws: Vec<DrawCall>,
}

#[derive(Debug, Default)]
pub struct HeadlessDevice {
    faults: Faults,
    next_id: u32,
    buffer_attempts: usize,
    programs: HashSet<ProgramHandle>,
    buffers: HashMap<BufferHandle, (BufferKind, Vec<u8>)>,
    textures: HashMap<TextureHandle, HeadlessTexture>,
    viewport: Viewport,
    current: Option<FrameRecord>,
    frames: Vec<FrameRecord>,
    uploads: u64,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: Faults) -> Self {
        Self {
            faults,
            ..Self::default()
        }
    }

    pub fn faults_mut(&mut self) -> &mut Faults {
        &mut self.faults
    }

    /// Programs, buffers and textures currently alive
    pub fn live_objects(&self) -> usize {
        self.programs.len() + self.buffers.len() + self.textures.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn buffer(&self, handle: BufferHandle) -> Option<(BufferKind, &[u8])> {
        self.buffers
            .get(&handle)
            .map(|(kind, data)| (*kind, data.as_slice()))
    }

    pub fn texture(&self, handle: TextureHandle) -> Option<&HeadlessTexture> {
        self.textures.get(&handle)
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Frames completed with `end_frame`, oldest first
    pub fn frames(&self) -> &[FrameRecord] {
        &self.frames
    }

    pub fn last_frame(&self) -> Option<&FrameRecord> {
        self.frames.last()
    }

    /// Total `upload_luma` calls that succeeded
    pub fn uploads(&self) -> u64 {
        self.uploads
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn check_context(&self) -> Result<()> {
        if self.faults.context_lost {
            return Err(PreviewError::ContextLost);
        }
        Ok(())
    }
}

impl GpuDevice for HeadlessDevice {
    fn create_program(&mut self, desc: &ProgramDesc<'_>) -> Result<ProgramHandle> {
        self.check_context()?;
        if self.faults.shader_compile {
            return Err(PreviewError::ShaderCompile(format!(
                "{}: injected compile failure",
                desc.label
            )));
        }
        for entry in [desc.vertex_entry, desc.fragment_entry] {
            if !desc.source.contains(&format!("fn {entry}(")) {
                return Err(PreviewError::ShaderCompile(format!(
                    "{}: entry point `{entry}` not found",
                    desc.label
                )));
            }
        }
        if self.faults.program_link {
            return Err(PreviewError::ProgramLink(format!(
                "{}: injected link failure",
                desc.label
            )));
        }

        let handle = ProgramHandle::from_raw(self.next_id());
        self.programs.insert(handle);
        Ok(handle)
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program);
    }

    fn create_buffer(&mut self, kind: BufferKind, contents: &[u8]) -> Result<BufferHandle> {
        self.check_context()?;
        let attempt = self.buffer_attempts;
        self.buffer_attempts += 1;
        if self.faults.buffer_at == Some(attempt) {
            return Err(PreviewError::BufferCreation {
                kind: kind.label(),
                reason: "injected allocation failure".to_string(),
            });
        }

        let handle = BufferHandle::from_raw(self.next_id());
        self.buffers.insert(handle, (kind, contents.to_vec()));
        Ok(handle)
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer);
    }

    fn create_texture(&mut self, sampler: &SamplerParams) -> Result<TextureHandle> {
        self.check_context()?;
        if self.faults.texture {
            return Err(PreviewError::TextureCreation(
                "injected allocation failure".to_string(),
            ));
        }

        let handle = TextureHandle::from_raw(self.next_id());
        self.textures.insert(
            handle,
            HeadlessTexture {
                sampler: *sampler,
                width: 0,
                height: 0,
                pixels: Vec::new(),
                respecified: 0,
            },
        );
        Ok(handle)
    }

    fn upload_luma(
        &mut self,
        texture: TextureHandle,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<()> {
        self.check_context()?;
        let expected = width as usize * height as usize;
        if expected == 0 || pixels.len() != expected {
            return Err(PreviewError::TextureCreation(format!(
                "{width}x{height} upload with {} bytes",
                pixels.len()
            )));
        }
        let entry = self
            .textures
            .get_mut(&texture)
            .ok_or(PreviewError::UnknownHandle("texture"))?;

        if entry.width != width || entry.height != height {
            entry.width = width;
            entry.height = height;
            entry.pixels = pixels.to_vec();
            entry.respecified += 1;
        } else {
            entry.pixels.copy_from_slice(pixels);
        }
        self.uploads += 1;
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture);
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn begin_frame(&mut self, clear_color: [f32; 4]) {
        if self.current.is_some() {
            tracing::warn!("begin_frame without end_frame; previous frame discarded");
        }
        self.current = Some(FrameRecord {
            clear_color,
            viewport: self.viewport,
            draws: Vec::new(),
        });
    }

    fn draw_indexed(&mut self, call: &DrawCall) {
        let known = self.programs.contains(&call.program)
            && self.textures.contains_key(&call.texture)
            && self.buffers.contains_key(&call.vertices)
            && self.buffers.contains_key(&call.indices);
        if !known {
            tracing::warn!(?call, "draw with unknown handle ignored");
            return;
        }
        match self.current.as_mut() {
            Some(frame) => frame.draws.push(*call),
            None => tracing::warn!("draw outside begin_frame/end_frame ignored"),
        }
    }

    fn end_frame(&mut self) {
        if let Some(frame) = self.current.take() {
            self.frames.push(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::shaders::quad_program;

    #[test]
    fn test_upload_respecifies_only_on_resize() {
        let mut gpu = HeadlessDevice::new();
        let tex = gpu.create_texture(&SamplerParams::BILINEAR_CLAMP).unwrap();

        gpu.upload_luma(tex, 2, 2, &[1, 2, 3, 4]).unwrap();
        gpu.upload_luma(tex, 2, 2, &[5, 6, 7, 8]).unwrap();
        assert_eq!(gpu.texture(tex).unwrap().respecified, 1);
        assert_eq!(gpu.texture(tex).unwrap().pixels, vec![5, 6, 7, 8]);

        gpu.upload_luma(tex, 4, 1, &[9; 4]).unwrap();
        assert_eq!(gpu.texture(tex).unwrap().respecified, 2);
        assert_eq!(gpu.uploads(), 3);
    }

    #[test]
    fn test_upload_size_mismatch_rejected() {
        let mut gpu = HeadlessDevice::new();
        let tex = gpu.create_texture(&SamplerParams::BILINEAR_CLAMP).unwrap();
        assert!(gpu.upload_luma(tex, 2, 2, &[1, 2, 3]).is_err());
        assert_eq!(gpu.uploads(), 0);
    }

    #[test]
    fn test_missing_entry_point_fails_compile() {
        let mut gpu = HeadlessDevice::new();
        let mut desc = quad_program();
        desc.fragment_entry = "missing_main";
        assert!(matches!(
            gpu.create_program(&desc),
            Err(PreviewError::ShaderCompile(_))
        ));
        assert_eq!(gpu.live_objects(), 0);
    }

    #[test]
    fn test_context_lost_fails_everything() {
        let mut gpu = HeadlessDevice::with_faults(Faults {
            context_lost: true,
            ..Faults::default()
        });
        assert!(matches!(
            gpu.create_program(&quad_program()),
            Err(PreviewError::ContextLost)
        ));
        assert!(gpu.create_buffer(BufferKind::Vertex, &[0; 4]).is_err());
        assert!(gpu.create_texture(&SamplerParams::BILINEAR_CLAMP).is_err());
    }

    #[test]
    fn test_double_destroy_is_harmless() {
        let mut gpu = HeadlessDevice::new();
        let buffer = gpu.create_buffer(BufferKind::Index, &[0; 12]).unwrap();
        gpu.destroy_buffer(buffer);
        gpu.destroy_buffer(buffer);
        assert_eq!(gpu.live_buffers(), 0);
    }

    #[test]
    fn test_frames_record_clear_and_viewport() {
        let mut gpu = HeadlessDevice::new();
        gpu.set_viewport(Viewport {
            width: 320,
            height: 240,
        });
        gpu.begin_frame([0.2, 0.2, 0.2, 1.0]);
        gpu.end_frame();

        let frame = gpu.last_frame().unwrap();
        assert_eq!(frame.clear_color, [0.2, 0.2, 0.2, 1.0]);
        assert_eq!(frame.viewport.width, 320);
        assert!(frame.draws.is_empty());
    }
}
