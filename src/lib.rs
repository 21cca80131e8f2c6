//! Edge-detected live camera preview
//!
//! A camera thread publishes luma planes into a latest-wins `FrameExchange`,
//! filtering them with a Canny edge detector on the way in. The render
//! thread pulls the newest frame into a GPU texture and draws it as a
//! full-viewport quad, driven by the host's surface callbacks on
//! `EdgePreview`.

pub mod config;
pub mod error;
pub mod exchange;
pub mod filter;
pub mod frame;
pub mod gpu;
pub mod preview;
pub mod rate;
pub mod renderer;
pub mod session;
pub mod texture;

pub use config::{GpuConfig, PowerPreference, PreviewConfig};
pub use error::{PreviewError, Result};
pub use exchange::{FrameExchange, FrameStats, PendingFrame};
pub use filter::{CannyFilter, EdgeFilter};
pub use frame::{FilteredFrame, RawFrame};
pub use gpu::{GpuDevice, HeadlessDevice, Viewport, WgpuDevice};
pub use preview::{EdgePreview, FrameSink, PreviewStats};
pub use rate::FrameRateEstimator;
pub use renderer::QuadRenderer;
pub use session::{GpuSession, SessionState};
pub use texture::LumaTexture;
