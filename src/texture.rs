//! The session's single luma texture

use crate::error::Result;
use crate::frame::FilteredFrame;
use crate::gpu::{GpuDevice, SamplerParams, TextureHandle};

/// Owning wrapper around one GPU texture
///
/// The texture is always drawn at 1:1 quad coverage, so it samples bilinear
/// with clamped edges and no mipmaps. `destroy` is idempotent.
#[derive(Debug)]
pub struct LumaTexture {
    handle: Option<TextureHandle>,
    size: Option<(u32, u32)>,
}

impl LumaTexture {
    pub fn create<D: GpuDevice + ?Sized>(gpu: &mut D) -> Result<Self> {
        let handle = gpu.create_texture(&SamplerParams::BILINEAR_CLAMP)?;
        tracing::debug!(texture = handle.raw(), "luma texture created");
        Ok(Self {
            handle: Some(handle),
            size: None,
        })
    }

    /// The GPU handle, or `None` once destroyed
    pub fn handle(&self) -> Option<TextureHandle> {
        self.handle
    }

    pub fn is_valid(&self) -> bool {
        self.handle.is_some()
    }

    /// Dimensions of the current image, `None` before the first upload
    pub fn size(&self) -> Option<(u32, u32)> {
        self.size
    }

    /// Whether an image has been uploaded, i.e. there is something to draw
    pub fn is_specified(&self) -> bool {
        self.size.is_some()
    }

    /// Upload `frame` as the texture image (re-specified when its size changed)
    pub fn upload<D: GpuDevice + ?Sized>(
        &mut self,
        gpu: &mut D,
        frame: &FilteredFrame,
    ) -> Result<()> {
        let Some(handle) = self.handle else {
            return Err(crate::error::PreviewError::UnknownHandle("texture"));
        };
        let size = (frame.width(), frame.height());
        gpu.upload_luma(handle, size.0, size.1, frame.pixels())?;

        if self.size != Some(size) {
            tracing::debug!(width = size.0, height = size.1, "texture image respecified");
            self.size = Some(size);
        }
        Ok(())
    }

    /// Release the GPU texture; no-op when already released
    pub fn destroy<D: GpuDevice + ?Sized>(&mut self, gpu: &mut D) {
        if let Some(handle) = self.handle.take() {
            gpu.destroy_texture(handle);
            tracing::debug!(texture = handle.raw(), "luma texture destroyed");
        }
        self.size = None;
    }
}
