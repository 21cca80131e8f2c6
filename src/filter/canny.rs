// canny.rs — Canny edge detector with fixed hysteresis thresholds.
//
// Pipeline per frame:
//   1. 3x3 Sobel gradients (sobel.rs), replicated borders.
//   2. L1 magnitude |Gx| + |Gy|.
//   3. Non-maximum suppression along the gradient direction, quantized to
//      horizontal / vertical / two diagonals. Quantization uses the
//      fixed-point tan(22.5°) trick so no floats or atan2 are involved:
//        |Gy| < |Gx|·tan22.5   → horizontal neighbours
//        |Gy| > |Gx|·tan67.5   → vertical neighbours
//        otherwise             → diagonal, picked by the sign of Gx·Gy
//      Neighbours outside the image count as zero magnitude.
//   4. Hysteresis: pixels above HIGH seed edges, which then grow through
//      8-connected surviving pixels above LOW.
//
// Output is 255 on edges, 0 elsewhere. All scratch buffers are kept across
// frames and only reallocated when the frame size changes.

use super::sobel::sobel_into;
use super::{EdgeFilter, HIGH_THRESHOLD, LOW_THRESHOLD};
use crate::frame::{FilteredFrame, RawFrame};

/// tan(22.5°) in Q15 fixed point
const TG22: i32 = 13573;

const EDGE: u8 = 255;

/// Per-pixel classification after non-maximum suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    None,
    Weak,
    Strong,
}

/// Canny edge detector, thresholds fixed at 50 / 100
#[derive(Debug)]
pub struct CannyFilter {
    low: i32,
    high: i32,
    width: usize,
    height: usize,
    dx: Vec<i32>,
    dy: Vec<i32>,
    mag: Vec<i32>,
    marks: Vec<Mark>,
    stack: Vec<usize>,
}

impl Default for CannyFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl CannyFilter {
    pub fn new() -> Self {
        Self {
            low: LOW_THRESHOLD,
            high: HIGH_THRESHOLD,
            width: 0,
            height: 0,
            dx: Vec::new(),
            dy: Vec::new(),
            mag: Vec::new(),
            marks: Vec::new(),
            stack: Vec::new(),
        }
    }

    /// Size the scratch buffers for a `width x height` frame.
    fn prepare(&mut self, width: usize, height: usize) {
        if self.width == width && self.height == height {
            return;
        }
        let n = width * height;
        self.dx = vec![0; n];
        self.dy = vec![0; n];
        self.mag = vec![0; n];
        self.marks = vec![Mark::None; n];
        self.width = width;
        self.height = height;
        tracing::debug!(width, height, "canny scratch buffers allocated");
    }

    #[inline]
    fn mag_at(&self, x: isize, y: isize) -> i32 {
        if x < 0 || y < 0 || x >= self.width as isize || y >= self.height as isize {
            return 0;
        }
        self.mag[y as usize * self.width + x as usize]
    }

    /// Is the pixel at (x, y) a local maximum along its gradient direction?
    fn is_local_max(&self, x: usize, y: usize) -> bool {
        let i = y * self.width + x;
        let (gx, gy, m) = (self.dx[i], self.dy[i], self.mag[i]);
        let (x, y) = (x as isize, y as isize);

        let ax = gx.abs();
        let ay = gy.abs();
        let tg22x = ax * TG22;
        let y15 = ay << 15;

        if y15 < tg22x {
            return m > self.mag_at(x - 1, y) && m >= self.mag_at(x + 1, y);
        }

        let tg67x = tg22x + (ax << 16);
        if y15 > tg67x {
            return m > self.mag_at(x, y - 1) && m >= self.mag_at(x, y + 1);
        }

        let s = if (gx ^ gy) < 0 { -1 } else { 1 };
        m > self.mag_at(x - s, y - 1) && m > self.mag_at(x + s, y + 1)
    }
}

/// Promote every weak pixel 8-connected to a strong one. `stack` holds the
/// strong seeds on entry and is empty on return.
fn hysteresis(marks: &mut [Mark], width: usize, height: usize, stack: &mut Vec<usize>) {
    while let Some(i) = stack.pop() {
        let (x, y) = ((i % width) as isize, (i / width) as isize);
        for ny in y - 1..=y + 1 {
            for nx in x - 1..=x + 1 {
                if nx < 0 || ny < 0 || nx >= width as isize || ny >= height as isize {
                    continue;
                }
                let n = ny as usize * width + nx as usize;
                if marks[n] == Mark::Weak {
                    marks[n] = Mark::Strong;
                    stack.push(n);
                }
            }
        }
    }
}

impl EdgeFilter for CannyFilter {
    fn apply(&mut self, src: &RawFrame<'_>, dst: &mut FilteredFrame) {
        let (w, h) = (src.width() as usize, src.height() as usize);
        dst.reshape(src.width(), src.height());
        self.prepare(w, h);

        sobel_into(src, &mut self.dx, &mut self.dy);
        for ((m, gx), gy) in self.mag.iter_mut().zip(&self.dx).zip(&self.dy) {
            *m = gx.abs() + gy.abs();
        }

        self.stack.clear();
        for y in 0..h {
            for x in 0..w {
                let i = y * w + x;
                let m = self.mag[i];
                let mark = if m <= self.low || !self.is_local_max(x, y) {
                    Mark::None
                } else if m > self.high {
                    self.stack.push(i);
                    Mark::Strong
                } else {
                    Mark::Weak
                };
                self.marks[i] = mark;
            }
        }

        hysteresis(&mut self.marks, w, h, &mut self.stack);

        for (out, mark) in dst.pixels_mut().iter_mut().zip(&self.marks) {
            *out = if *mark == Mark::Strong { EDGE } else { 0 };
        }
    }
}
