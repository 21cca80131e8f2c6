//! Error type shared by every layer of the preview pipeline.
//!
//! Nothing here is fatal: the lifecycle entry points log these and degrade
//! (see `preview.rs`), internal code propagates them with `?`.

use thiserror::Error;

/// Errors raised while validating frames, creating GPU resources or loading config
#[derive(Debug, Error)]
pub enum PreviewError {
    /// The producer handed us a null plane pointer
    #[error("frame buffer pointer is null")]
    NullFrame,

    /// Zero-sized frame, stride narrower than a row, or a buffer too short for its geometry
    #[error("invalid frame geometry {width}x{height} (row stride {row_stride}, {len} bytes)")]
    InvalidFrame {
        width: u32,
        height: u32,
        row_stride: usize,
        len: usize,
    },

    #[error("shader compilation failed: {0}")]
    ShaderCompile(String),

    #[error("program link failed: {0}")]
    ProgramLink(String),

    #[error("{kind} buffer creation failed: {reason}")]
    BufferCreation { kind: &'static str, reason: String },

    #[error("texture allocation failed: {0}")]
    TextureCreation(String),

    #[error("no suitable GPU adapter found")]
    NoAdapter,

    #[error("failed to create GPU device: {0}")]
    DeviceRequest(String),

    /// The GPU context went away underneath us; the host must recreate the surface
    #[error("GPU context lost")]
    ContextLost,

    #[error("unknown {0} handle")]
    UnknownHandle(&'static str),

    #[error("render target readback failed: {0}")]
    Readback(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("image export failed: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, PreviewError>;
