//! Edge Filter Stage
//!
//! The producer runs one of these over every camera frame before publishing
//! it. Filters read a strided `RawFrame` and write a tightly packed
//! `FilteredFrame` of the same size, never touching the input.
//!
//! - `sobel.rs` - 3x3 Sobel gradients over a strided view
//! - `canny.rs` - Canny edge detector with fixed 50/100 hysteresis thresholds

pub mod canny;
pub mod sobel;

pub use canny::CannyFilter;

use crate::frame::{FilteredFrame, RawFrame};

/// Lower hysteresis threshold: weaker gradients are never edges
pub const LOW_THRESHOLD: i32 = 50;

/// Upper hysteresis threshold: stronger gradients are always edges
pub const HIGH_THRESHOLD: i32 = 100;

/// Pixel-processing stage run on the producer thread
///
/// `Send` because the filter lives inside the exchange and moves with it to
/// whichever thread delivers camera frames.
pub trait EdgeFilter: Send {
    /// Filter `src` into `dst`
    ///
    /// `dst` arrives already shaped to `src`'s width and height; implementations
    /// must overwrite every pixel.
    fn apply(&mut self, src: &RawFrame<'_>, dst: &mut FilteredFrame);
}
