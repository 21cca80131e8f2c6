// sobel.rs — 3x3 Sobel gradients over a strided luma view.
//
// Kernels (unnormalized, standard convention):
//   Gx = [-1 0 1; -2 0 2; -1 0 1]     (intensity increasing to the right)
//   Gy = [-1 -2 -1; 0 0 0; 1 2 1]     (intensity increasing downward)
//
// Borders replicate the edge pixel, so a flat image has zero gradient
// everywhere including the outermost rows and columns. For u8 input the
// output range is [-1020, 1020], which fits comfortably in i32.

use crate::frame::RawFrame;

/// Compute Gx and Gy for every pixel of `src` into tightly packed buffers.
///
/// Both `dx` and `dy` must hold exactly `width * height` values.
pub fn sobel_into(src: &RawFrame<'_>, dx: &mut [i32], dy: &mut [i32]) {
    let w = src.width() as usize;
    let h = src.height() as usize;
    debug_assert_eq!(dx.len(), w * h);
    debug_assert_eq!(dy.len(), w * h);

    for y in 0..h {
        let up = src.row(y.saturating_sub(1));
        let mid = src.row(y);
        let down = src.row((y + 1).min(h - 1));
        let out = y * w;

        for x in 0..w {
            let l = x.saturating_sub(1);
            let r = (x + 1).min(w - 1);

            let gx = (up[r] as i32 - up[l] as i32)
                + 2 * (mid[r] as i32 - mid[l] as i32)
                + (down[r] as i32 - down[l] as i32);
            let gy = (down[l] as i32 + 2 * down[x] as i32 + down[r] as i32)
                - (up[l] as i32 + 2 * up[x] as i32 + up[r] as i32);

            dx[out + x] = gx;
            dy[out + x] = gy;
        }
    }
}
