//! Frame types flowing through the preview pipeline
//!
//! - `RawFrame`: borrowed, possibly row-padded view of a camera luma plane
//! - `FilteredFrame`: owned, tightly packed edge map

use crate::error::{PreviewError, Result};

/// Borrowed view into a producer-supplied single-channel plane
///
/// Only valid for the duration of the producer callback; everything that
/// needs the pixels later must copy them out before returning.
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
    row_stride: usize,
}

impl<'a> RawFrame<'a> {
    /// Wrap a luma plane, checking that the geometry fits inside `data`
    ///
    /// The last row only needs `width` bytes, since camera planes commonly
    /// omit the trailing padding of the final row.
    pub fn new(data: &'a [u8], width: u32, height: u32, row_stride: usize) -> Result<Self> {
        let invalid = || PreviewError::InvalidFrame {
            width,
            height,
            row_stride,
            len: data.len(),
        };

        if width == 0 || height == 0 || row_stride < width as usize {
            return Err(invalid());
        }

        let required = row_stride
            .checked_mul(height as usize - 1)
            .and_then(|n| n.checked_add(width as usize))
            .ok_or_else(invalid)?;
        if data.len() < required {
            return Err(invalid());
        }

        Ok(Self {
            data,
            width,
            height,
            row_stride,
        })
    }

    /// Wrap a plane handed over as a raw pointer by platform glue
    ///
    /// # Safety
    /// If `ptr` is non-null it must point to `len` readable bytes that stay
    /// valid and unmodified for `'a`.
    pub unsafe fn from_raw_parts(
        ptr: *const u8,
        len: usize,
        width: u32,
        height: u32,
        row_stride: usize,
    ) -> Result<Self> {
        if ptr.is_null() {
            return Err(PreviewError::NullFrame);
        }
        // SAFETY: non-null checked above, validity guaranteed by the caller.
        let data = unsafe { std::slice::from_raw_parts(ptr, len) };
        Self::new(data, width, height, row_stride)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn row_stride(&self) -> usize {
        self.row_stride
    }

    /// Pixel row `y`, without its padding
    #[inline]
    pub fn row(&self, y: usize) -> &'a [u8] {
        let start = y * self.row_stride;
        &self.data[start..start + self.width as usize]
    }

    /// Pixel at (x, y)
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.row_stride + x]
    }
}

/// Owned, tightly packed single-channel frame (`width * height` bytes)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilteredFrame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl FilteredFrame {
    /// Zero-filled frame of the given size
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            data: vec![0; width as usize * height as usize],
            width,
            height,
        }
    }

    /// Make the frame `width x height`
    ///
    /// Reallocates only when the dimensions differ from the current ones, and
    /// returns whether it did. Matching dimensions keep the same buffer.
    pub fn reshape(&mut self, width: u32, height: u32) -> bool {
        if self.width == width && self.height == height && !self.data.is_empty() {
            return false;
        }
        self.data = vec![0; width as usize * height as usize];
        self.width = width;
        self.height = height;
        true
    }

    /// Copy another frame's pixels in, reshaping first if needed
    pub fn copy_from(&mut self, other: &FilteredFrame) {
        self.reshape(other.width, other.height);
        self.data.copy_from_slice(&other.data);
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Address of the pixel buffer, for checking that it was not reallocated
    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_frame_rejects_zero_size() {
        let data = [0u8; 16];
        assert!(matches!(
            RawFrame::new(&data, 0, 4, 4),
            Err(PreviewError::InvalidFrame { .. })
        ));
        assert!(RawFrame::new(&data, 4, 0, 4).is_err());
    }

    #[test]
    fn test_raw_frame_rejects_short_buffer() {
        let data = [0u8; 15];
        assert!(RawFrame::new(&data, 4, 4, 4).is_err());
    }

    #[test]
    fn test_raw_frame_rejects_stride_narrower_than_width() {
        let data = [0u8; 64];
        assert!(RawFrame::new(&data, 8, 4, 6).is_err());
    }

    #[test]
    fn test_raw_frame_last_row_may_omit_padding() {
        // 3 rows of stride 8, last row only 5 bytes: 8 + 8 + 5
        let data = [7u8; 21];
        let frame = RawFrame::new(&data, 5, 3, 8).unwrap();
        assert_eq!(frame.row(2).len(), 5);
    }

    #[test]
    fn test_raw_frame_row_skips_padding() {
        let data = [1, 2, 99, 99, 3, 4, 99, 99];
        let frame = RawFrame::new(&data, 2, 2, 4).unwrap();
        assert_eq!(frame.row(0), &[1, 2]);
        assert_eq!(frame.row(1), &[3, 4]);
        assert_eq!(frame.get(1, 1), 4);
    }

    #[test]
    fn test_null_pointer_rejected() {
        let result = unsafe { RawFrame::from_raw_parts(std::ptr::null(), 16, 4, 4, 4) };
        assert!(matches!(result, Err(PreviewError::NullFrame)));
    }

    #[test]
    fn test_reshape_keeps_buffer_for_same_dimensions() {
        let mut frame = FilteredFrame::default();
        assert!(frame.reshape(8, 6));
        let before = frame.as_ptr();

        assert!(!frame.reshape(8, 6));
        assert_eq!(frame.as_ptr(), before);
        assert_eq!(frame.pixels().len(), 48);
    }

    #[test]
    fn test_reshape_reallocates_on_dimension_change() {
        let mut frame = FilteredFrame::new(8, 6);
        assert!(frame.reshape(6, 8));
        assert_eq!((frame.width(), frame.height()), (6, 8));
        assert_eq!(frame.pixels().len(), 48);
    }
}
