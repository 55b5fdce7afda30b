//! Overlay drawing and raster line measurement.

use image::{Rgb, RgbImage};
use imageproc::drawing::{BresenhamLineIter, draw_line_segment_mut};

use crate::types::Point;

/// Contour overlay colour.
pub const GREEN: Rgb<u8> = Rgb([0, 255, 0]);

/// Line overlay colour.
pub const RED: Rgb<u8> = Rgb([255, 0, 0]);

/// Number of pixels a rasterised segment from `start` to `end` covers.
#[must_use]
pub fn line_pixel_count(start: Point, end: Point) -> usize {
    BresenhamLineIter::new(start.as_f32_tuple(), end.as_f32_tuple()).count()
}

/// Draw a closed polygon outline.
pub fn draw_polygon(canvas: &mut RgbImage, points: &[Point], color: Rgb<u8>) {
    if points.len() < 2 {
        return;
    }
    for (i, p1) in points.iter().enumerate() {
        let p2 = points[(i + 1) % points.len()];
        draw_line_segment_mut(canvas, p1.as_f32_tuple(), p2.as_f32_tuple(), color);
    }
}

/// Draw a single segment.
pub fn draw_segment(canvas: &mut RgbImage, start: Point, end: Point, color: Rgb<u8>) {
    draw_line_segment_mut(canvas, start.as_f32_tuple(), end.as_f32_tuple(), color);
}
