//! GPU Session: lifecycle state machine around one device
//!
//! Owns the quad renderer, the luma texture and the viewport, and turns the
//! host's surface callbacks into GPU work. Everything here runs on the render
//! thread; the only shared state is the `FrameExchange`.

use std::sync::Arc;
use std::time::Instant;

use crate::config::PreviewConfig;
use crate::exchange::FrameExchange;
use crate::gpu::{GpuDevice, Viewport};
use crate::rate::FrameRateEstimator;
use crate::renderer::QuadRenderer;
use crate::texture::LumaTexture;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Ready,
    /// Ready, and the viewport changed since the surface was created
    Resized,
    TornDown,
}

impl SessionState {
    /// Whether draws do GPU work in this state
    pub fn is_ready(self) -> bool {
        matches!(self, SessionState::Ready | SessionState::Resized)
    }
}

#[derive(Debug)]
pub struct GpuSession<D: GpuDevice> {
    device: D,
    exchange: Arc<FrameExchange>,
    clear_color: [f32; 4],
    state: SessionState,
    renderer: Option<QuadRenderer>,
    texture: Option<LumaTexture>,
    viewport: Viewport,
    fps: FrameRateEstimator,
}

impl<D: GpuDevice> GpuSession<D> {
    pub fn new(device: D, exchange: Arc<FrameExchange>, config: &PreviewConfig) -> Self {
        Self {
            device,
            exchange,
            clear_color: config.clear_color,
            state: SessionState::Uninitialized,
            renderer: None,
            texture: None,
            viewport: Viewport::default(),
            fps: FrameRateEstimator::new(Instant::now()),
        }
    }

    pub fn on_surface_created(&mut self) {
        self.on_surface_created_at(Instant::now());
    }

    /// (Re)create whatever GPU resources are missing
    ///
    /// Setup failures are logged and leave renderer and texture absent; the
    /// session still becomes ready so rate reporting keeps working, and the
    /// next call retries.
    pub fn on_surface_created_at(&mut self, now: Instant) {
        if self.renderer.is_none() {
            let mut renderer = QuadRenderer::new();
            match renderer.setup(&mut self.device) {
                Ok(()) => self.renderer = Some(renderer),
                Err(err) => tracing::error!(%err, "quad renderer setup failed"),
            }
        }

        if self.renderer.is_some() && self.texture.is_none() {
            match LumaTexture::create(&mut self.device) {
                Ok(texture) => self.texture = Some(texture),
                Err(err) => tracing::error!(%err, "luma texture creation failed"),
            }
        }

        if !self.viewport.is_empty() {
            self.device.set_viewport(self.viewport);
        }

        self.fps.reset(now);
        self.state = SessionState::Ready;
        tracing::debug!(
            renderer = self.renderer.is_some(),
            texture = self.texture.is_some(),
            "surface created"
        );
    }

    pub fn on_surface_resized(&mut self, width: u32, height: u32) {
        if self.state == SessionState::TornDown {
            tracing::warn!(width, height, "resize after teardown ignored");
            return;
        }

        self.viewport = Viewport { width, height };
        self.device.set_viewport(self.viewport);
        if self.state == SessionState::Ready {
            self.state = SessionState::Resized;
        }
        tracing::debug!(width, height, "viewport resized");
    }

    pub fn on_draw_frame(&mut self) -> f32 {
        self.on_draw_frame_at(Instant::now())
    }

    /// Draw one frame and return the smoothed draw rate
    pub fn on_draw_frame_at(&mut self, now: Instant) -> f32 {
        if !self.state.is_ready() {
            tracing::trace!(state = ?self.state, "draw outside ready state");
            return self.fps.rate();
        }

        let rate = self.fps.update(now);
        self.device.begin_frame(self.clear_color);

        if let (Some(renderer), Some(texture)) = (&self.renderer, &mut self.texture) {
            if let Some(frame) = self.exchange.try_take_pending() {
                if let Err(err) = texture.upload(&mut self.device, &frame) {
                    tracing::error!(%err, "texture upload failed");
                }
                // Release the slot before the draw
                drop(frame);
            }

            match texture.handle() {
                Some(handle) if texture.is_specified() => renderer.draw(&mut self.device, handle),
                _ => tracing::trace!("no frame uploaded yet, clear only"),
            }
        }

        self.device.end_frame();
        tracing::trace!(rate, "frame drawn");
        rate
    }

    /// Release renderer then texture; safe to call repeatedly
    pub fn teardown(&mut self) {
        if let Some(mut renderer) = self.renderer.take() {
            renderer.destroy(&mut self.device);
        }
        if let Some(mut texture) = self.texture.take() {
            texture.destroy(&mut self.device);
        }
        if self.state != SessionState::TornDown {
            tracing::debug!("session torn down");
            self.state = SessionState::TornDown;
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// The current smoothed draw rate
    pub fn rate(&self) -> f32 {
        self.fps.rate()
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn exchange(&self) -> &Arc<FrameExchange> {
        &self.exchange
    }

    pub fn has_renderer(&self) -> bool {
        self.renderer.is_some()
    }

    pub fn has_texture(&self) -> bool {
        self.texture.is_some()
    }
}

impl<D: GpuDevice> Drop for GpuSession<D> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{Faults, HeadlessDevice};
    use std::time::Duration;

    fn session(device: HeadlessDevice) -> GpuSession<HeadlessDevice> {
        GpuSession::new(
            device,
            Arc::new(FrameExchange::default()),
            &PreviewConfig::default(),
        )
    }

    #[test]
    fn test_surface_created_allocates_everything() {
        let mut session = session(HeadlessDevice::new());
        assert_eq!(session.state(), SessionState::Uninitialized);

        session.on_surface_created();
        assert_eq!(session.state(), SessionState::Ready);
        assert!(session.has_renderer());
        assert!(session.has_texture());
        // program + 2 buffers + texture
        assert_eq!(session.device().live_objects(), 4);
    }

    #[test]
    fn test_draw_before_surface_touches_nothing() {
        let mut session = session(HeadlessDevice::new());
        assert_eq!(session.on_draw_frame(), 0.0);
        assert!(session.device().frames().is_empty());
    }

    #[test]
    fn test_zero_interval_leaves_rate_unchanged() {
        let mut session = session(HeadlessDevice::new());
        let t0 = Instant::now();
        session.on_surface_created_at(t0);

        let first = session.on_draw_frame_at(t0 + Duration::from_millis(20));
        let second = session.on_draw_frame_at(t0 + Duration::from_millis(20));
        assert_eq!(first, second);
    }

    #[test]
    fn test_one_second_from_zero_gives_tenth() {
        let mut session = session(HeadlessDevice::new());
        let t0 = Instant::now();
        session.on_surface_created_at(t0);

        let rate = session.on_draw_frame_at(t0 + Duration::from_secs(1));
        assert!((rate - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_surface_created_resets_rate() {
        let mut session = session(HeadlessDevice::new());
        let t0 = Instant::now();
        session.on_surface_created_at(t0);
        session.on_draw_frame_at(t0 + Duration::from_millis(10));
        assert!(session.rate() > 0.0);

        session.on_surface_created_at(t0 + Duration::from_millis(20));
        assert_eq!(session.rate(), 0.0);
    }

    #[test]
    fn test_setup_failure_keeps_rate_and_skips_draws() {
        let mut session = session(HeadlessDevice::with_faults(Faults {
            shader_compile: true,
            ..Faults::default()
        }));
        let t0 = Instant::now();
        session.on_surface_created_at(t0);
        assert_eq!(session.state(), SessionState::Ready);
        assert!(!session.has_renderer());
        assert!(!session.has_texture());
        assert_eq!(session.device().live_objects(), 0);

        session.exchange().publish_plane(&[0; 16], 4, 4, 4);
        let rate = session.on_draw_frame_at(t0 + Duration::from_secs(1));
        assert!((rate - 0.1).abs() < 1e-6);

        let frame = session.device().last_frame().unwrap();
        assert!(frame.draws.is_empty());
        assert_eq!(session.device().uploads(), 0);
        // Nobody consumed the frame
        assert!(session.exchange().has_pending());
    }

    #[test]
    fn test_next_surface_created_recovers() {
        let mut session = session(HeadlessDevice::with_faults(Faults {
            program_link: true,
            ..Faults::default()
        }));
        session.on_surface_created();
        assert!(!session.has_renderer());

        session.device_mut().faults_mut().program_link = false;
        session.on_surface_created();
        assert!(session.has_renderer());
        assert!(session.has_texture());
    }

    #[test]
    fn test_texture_failure_keeps_renderer() {
        let mut session = session(HeadlessDevice::with_faults(Faults {
            texture: true,
            ..Faults::default()
        }));
        session.on_surface_created();
        assert!(session.has_renderer());
        assert!(!session.has_texture());

        session.on_draw_frame();
        assert!(session.device().last_frame().unwrap().draws.is_empty());
    }

    #[test]
    fn test_draw_uploads_latest_then_redraws_stale() {
        let mut session = session(HeadlessDevice::new());
        session.on_surface_created();

        // Clear only until the first frame shows up
        session.on_draw_frame();
        assert!(session.device().last_frame().unwrap().draws.is_empty());

        session.exchange().publish_plane(&[0; 16], 4, 4, 4);
        session.exchange().publish_plane(&[0; 48], 8, 6, 8);
        session.on_draw_frame();
        assert_eq!(session.device().uploads(), 1);
        let draws = &session.device().last_frame().unwrap().draws;
        assert_eq!(draws.len(), 1);

        let stored = session.device().texture(draws[0].texture).unwrap();
        assert_eq!((stored.width, stored.height), (8, 6));
        assert!(stored.pixels.iter().all(|&p| p == 0));

        // Nothing new: redraw without upload
        session.on_draw_frame();
        assert_eq!(session.device().uploads(), 1);
        assert_eq!(session.device().last_frame().unwrap().draws.len(), 1);
    }

    #[test]
    fn test_clear_color_from_config() {
        let config = PreviewConfig {
            clear_color: [1.0, 0.0, 0.0, 1.0],
            ..PreviewConfig::default()
        };
        let mut session = GpuSession::new(
            HeadlessDevice::new(),
            Arc::new(FrameExchange::default()),
            &config,
        );
        session.on_surface_created();
        session.on_draw_frame();
        assert_eq!(
            session.device().last_frame().unwrap().clear_color,
            [1.0, 0.0, 0.0, 1.0]
        );
    }

    #[test]
    fn test_resize_sets_viewport() {
        let mut session = session(HeadlessDevice::new());
        session.on_surface_created();
        session.on_surface_resized(640, 480);

        assert_eq!(session.state(), SessionState::Resized);
        assert_eq!(
            session.device().viewport(),
            Viewport {
                width: 640,
                height: 480
            }
        );

        session.on_draw_frame();
        assert_eq!(session.device().last_frame().unwrap().viewport.width, 640);
        // Resources untouched
        assert_eq!(session.device().live_objects(), 4);
    }

    #[test]
    fn test_resize_before_surface_is_kept() {
        let mut session = session(HeadlessDevice::new());
        session.on_surface_resized(320, 200);
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert_eq!(session.viewport().height, 200);
    }

    #[test]
    fn test_teardown_twice() {
        let mut session = session(HeadlessDevice::new());
        session.on_surface_created();

        session.teardown();
        session.teardown();
        assert_eq!(session.state(), SessionState::TornDown);
        assert_eq!(session.device().live_objects(), 0);

        // Torn down sessions ignore resizes and draw nothing
        session.on_surface_resized(10, 10);
        assert!(session.viewport().is_empty());
        let frames = session.device().frames().len();
        session.on_draw_frame();
        assert_eq!(session.device().frames().len(), frames);
    }

    #[test]
    fn test_surface_created_after_teardown_rebuilds() {
        let mut session = session(HeadlessDevice::new());
        session.on_surface_created();
        session.teardown();

        session.on_surface_created();
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.device().live_objects(), 4);
    }
}
