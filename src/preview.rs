//! Host lifecycle entry points
//!
//! `EdgePreview` is the one long-lived object a host keeps. The render thread
//! drives it through the surface callbacks; the camera thread gets a
//! `FrameSink` from it. Calls made before `on_init` or after `on_destroy` are
//! logged and otherwise ignored.

use std::sync::Arc;

use crate::config::PreviewConfig;
use crate::exchange::{FrameExchange, FrameStats};
use crate::filter::EdgeFilter;
use crate::frame::RawFrame;
use crate::gpu::{GpuDevice, Viewport};
use crate::session::{GpuSession, SessionState};

/// Snapshot of what the preview is doing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewStats {
    pub frames: FrameStats,
    /// Smoothed draw rate in frames per second
    pub rate: f32,
    pub viewport: Viewport,
    pub state: SessionState,
}

/// Producer-thread handle that feeds camera planes into the preview
#[derive(Debug, Clone)]
pub struct FrameSink {
    exchange: Arc<FrameExchange>,
}

impl FrameSink {
    /// Filter and publish one camera plane
    ///
    /// Returns whether the frame was accepted. Malformed planes are logged
    /// and dropped, as are frames arriving after the preview was destroyed.
    pub fn on_frame_available(
        &self,
        data: &[u8],
        width: u32,
        height: u32,
        row_stride: usize,
    ) -> bool {
        self.exchange.publish_plane(data, width, height, row_stride)
    }

    /// Like `on_frame_available`, for a plane handed over as a raw address
    ///
    /// # Safety
    ///
    /// Unless `ptr` is null, it must point to `len` readable bytes that stay
    /// valid and unmodified for the duration of the call.
    pub unsafe fn on_frame_available_raw(
        &self,
        ptr: *const u8,
        len: usize,
        width: u32,
        height: u32,
        row_stride: usize,
    ) -> bool {
        match RawFrame::from_raw_parts(ptr, len, width, height, row_stride) {
            Ok(raw) => self.exchange.publish(&raw),
            Err(err) => {
                self.exchange.reject(&err);
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.exchange.is_closed()
    }
}

/// The preview core as seen by the host application
#[derive(Debug)]
pub struct EdgePreview<D: GpuDevice> {
    config: PreviewConfig,
    session: Option<GpuSession<D>>,
    exchange: Option<Arc<FrameExchange>>,
}

impl<D: GpuDevice> EdgePreview<D> {
    pub fn new(config: PreviewConfig) -> Self {
        Self {
            config,
            session: None,
            exchange: None,
        }
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.config
    }

    /// Start a session on `device` with the default edge filter
    pub fn on_init(&mut self, device: D) {
        self.on_init_with_filter(device, Box::new(crate::filter::CannyFilter::new()));
    }

    pub fn on_init_with_filter(&mut self, device: D, filter: Box<dyn EdgeFilter>) {
        if self.session.is_some() {
            tracing::warn!("on_init while already initialized; restarting session");
            self.on_destroy();
        }

        let exchange = Arc::new(FrameExchange::new(filter));
        self.session = Some(GpuSession::new(device, Arc::clone(&exchange), &self.config));
        self.exchange = Some(exchange);
        tracing::debug!("preview initialized");
    }

    /// Tear everything down; outstanding `FrameSink`s become no-ops
    pub fn on_destroy(&mut self) {
        let Some(mut session) = self.session.take() else {
            tracing::warn!("on_destroy without a live session ignored");
            return;
        };
        if let Some(exchange) = self.exchange.take() {
            exchange.close();
        }
        session.teardown();
        tracing::debug!("preview destroyed");
    }

    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    pub fn on_surface_created(&mut self) {
        match self.session.as_mut() {
            Some(session) => session.on_surface_created(),
            None => tracing::warn!("on_surface_created before init ignored"),
        }
    }

    pub fn on_surface_resized(&mut self, width: u32, height: u32) {
        match self.session.as_mut() {
            Some(session) => session.on_surface_resized(width, height),
            None => tracing::warn!(width, height, "on_surface_resized before init ignored"),
        }
    }

    /// Draw one frame; returns the smoothed draw rate (0 when not initialized)
    pub fn on_draw_frame(&mut self) -> f32 {
        match self.session.as_mut() {
            Some(session) => session.on_draw_frame(),
            None => {
                tracing::warn!("on_draw_frame before init ignored");
                0.0
            }
        }
    }

    /// Handle for the producer thread, `None` when not initialized
    pub fn frame_sink(&self) -> Option<FrameSink> {
        self.exchange.as_ref().map(|exchange| FrameSink {
            exchange: Arc::clone(exchange),
        })
    }

    /// Publish from the calling thread without holding a `FrameSink`
    pub fn on_frame_available(&self, data: &[u8], width: u32, height: u32, row_stride: usize) -> bool {
        match &self.exchange {
            Some(exchange) => exchange.publish_plane(data, width, height, row_stride),
            None => {
                tracing::warn!(width, height, row_stride, "frame before init ignored");
                false
            }
        }
    }

    pub fn stats(&self) -> Option<PreviewStats> {
        let session = self.session.as_ref()?;
        Some(PreviewStats {
            frames: session.exchange().stats(),
            rate: session.rate(),
            viewport: session.viewport(),
            state: session.state(),
        })
    }

    /// The latest filtered frame as an image
    pub fn snapshot(&self) -> Option<image::GrayImage> {
        self.exchange.as_ref()?.snapshot()
    }

    pub fn session(&self) -> Option<&GpuSession<D>> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut GpuSession<D>> {
        self.session.as_mut()
    }
}
