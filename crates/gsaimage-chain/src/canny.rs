//! Canny edge detection on an already-smoothed image.
//!
//! Derived from `imageproc::edges::canny` (0.26) with three changes:
//!
//! 1. No built-in Gaussian pass. The CannyEdge modification smooths with
//!    its own `gaussian_size` first, so a second fixed-sigma blur would
//!    make the stored parameter meaningless.
//! 2. Hysteresis visits all eight neighbours (upstream skipped north and
//!    northeast, see <https://github.com/image-rs/imageproc/pull/746>).
//! 3. Neighbour coordinates are bounds-checked instead of wrapping, which
//!    panicked at the image border
//!    (<https://github.com/image-rs/imageproc/issues/705>).

use image::{GrayImage, Luma};
use imageproc::definitions::Image;
use imageproc::filter::filter_clamped;
use imageproc::kernel;

/// Minimum allowed hysteresis threshold.
pub const MIN_THRESHOLD: f32 = 1.0;
const _: () = assert!(MIN_THRESHOLD > 0.0);

/// Run gradient, non-maximum suppression and hysteresis on `smoothed`.
///
/// Thresholds are clamped so that both are at least [`MIN_THRESHOLD`] and
/// `low <= high`. Returns 255 for edge pixels and 0 elsewhere.
#[must_use = "returns the binary edge map"]
pub fn canny_smoothed(smoothed: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    let high = high_threshold.max(MIN_THRESHOLD);
    let low = low_threshold.max(MIN_THRESHOLD).min(high);
    let (w, h) = smoothed.dimensions();
    if w < 3 || h < 3 {
        return GrayImage::new(w, h);
    }

    let gx: Image<Luma<i16>> = filter_clamped(smoothed, kernel::SOBEL_HORIZONTAL_3X3);
    let gy: Image<Luma<i16>> = filter_clamped(smoothed, kernel::SOBEL_VERTICAL_3X3);
    let magnitude: Image<Luma<f32>> = Image::from_fn(w, h, |x, y| {
        let dx = f32::from(gx.get_pixel(x, y).0[0]);
        let dy = f32::from(gy.get_pixel(x, y).0[0]);
        Luma([dx.hypot(dy)])
    });

    let thinned = non_maximum_suppression(&magnitude, &gx, &gy);
    hysteresis(&thinned, low, high)
}

/// Quantise a gradient direction to one of the four neighbour axes.
fn direction_bucket(dx: f32, dy: f32) -> u8 {
    let mut angle = dy.atan2(dx).to_degrees();
    if angle < 0.0 {
        angle += 180.0;
    }
    if (22.5..67.5).contains(&angle) {
        1
    } else if (67.5..112.5).contains(&angle) {
        2
    } else if (112.5..157.5).contains(&angle) {
        3
    } else {
        0
    }
}

/// Zero every pixel that is not a local maximum across its edge.
fn non_maximum_suppression(
    g: &Image<Luma<f32>>,
    gx: &Image<Luma<i16>>,
    gy: &Image<Luma<i16>>,
) -> Image<Luma<f32>> {
    let (w, h) = g.dimensions();
    let mut out = Image::from_pixel(w, h, Luma([0.0f32]));
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let bucket = direction_bucket(
                f32::from(gx.get_pixel(x, y).0[0]),
                f32::from(gy.get_pixel(x, y).0[0]),
            );
            let ((ax, ay), (bx, by)) = match bucket {
                0 => ((x - 1, y), (x + 1, y)),
                1 => ((x + 1, y + 1), (x - 1, y - 1)),
                2 => ((x, y - 1), (x, y + 1)),
                _ => ((x - 1, y + 1), (x + 1, y - 1)),
            };
            let here = g.get_pixel(x, y).0[0];
            if here >= g.get_pixel(ax, ay).0[0] && here >= g.get_pixel(bx, by).0[0] {
                out.put_pixel(x, y, Luma([here]));
            }
        }
    }
    out
}

/// Keep strong pixels and every weak pixel 8-connected to one.
fn hysteresis(input: &Image<Luma<f32>>, low: f32, high: f32) -> GrayImage {
    let (w, h) = input.dimensions();
    let mut out = GrayImage::new(w, h);
    let mut stack: Vec<(u32, u32)> = Vec::new();
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            if input.get_pixel(x, y).0[0] < high || out.get_pixel(x, y).0[0] != 0 {
                continue;
            }
            out.put_pixel(x, y, Luma([u8::MAX]));
            stack.push((x, y));
            while let Some((cx, cy)) = stack.pop() {
                for (dx, dy) in NEIGHBOURS {
                    let Some(nx) = cx.checked_add_signed(dx).filter(|&v| v < w) else {
                        continue;
                    };
                    let Some(ny) = cy.checked_add_signed(dy).filter(|&v| v < h) else {
                        continue;
                    };
                    if input.get_pixel(nx, ny).0[0] >= low && out.get_pixel(nx, ny).0[0] == 0 {
                        out.put_pixel(nx, ny, Luma([u8::MAX]));
                        stack.push((nx, ny));
                    }
                }
            }
        }
    }
    out
}

const NEIGHBOURS: [(i32, i32); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn border_edge_does_not_panic() {
        let img = GrayImage::from_fn(10, 10, |x, _| Luma([if x == 1 { 255 } else { 0 }]));
        let edges = canny_smoothed(&img, 1.0, 2.0);
        assert_eq!(edges.dimensions(), (10, 10));
    }

    #[test]
    fn uniform_image_has_no_edges() {
        let img = GrayImage::from_pixel(20, 20, Luma([128]));
        let edges = canny_smoothed(&img, 50.0, 150.0);
        assert!(edges.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn sharp_edge_detected() {
        let img = GrayImage::from_fn(20, 20, |x, _| Luma([if x < 10 { 0 } else { 255 }]));
        let edges = canny_smoothed(&img, 50.0, 150.0);
        let count = edges.pixels().filter(|p| p.0[0] > 0).count();
        assert!(count > 0, "expected edges at sharp boundary");
    }

    #[test]
    fn tiny_image_returns_blank_map() {
        let img = GrayImage::from_pixel(2, 2, Luma([9]));
        assert_eq!(canny_smoothed(&img, 10.0, 20.0), GrayImage::new(2, 2));
    }

    #[test]
    fn inverted_thresholds_are_clamped() {
        let img = GrayImage::from_fn(20, 20, |x, _| Luma([if x < 10 { 0 } else { 255 }]));
        assert_eq!(
            canny_smoothed(&img, 200.0, 100.0),
            canny_smoothed(&img, 100.0, 100.0)
        );
    }

    #[test]
    fn direction_buckets_cover_axes() {
        assert_eq!(direction_bucket(1.0, 0.0), 0);
        assert_eq!(direction_bucket(1.0, 1.0), 1);
        assert_eq!(direction_bucket(0.0, 1.0), 2);
        assert_eq!(direction_bucket(-1.0, 1.0), 3);
        assert_eq!(direction_bucket(-1.0, 0.0), 0);
    }
}
