//! Closed-contour extraction and polygon filtering.
//!
//! Borders are traced with `imageproc::contours::find_contours`
//! (Suzuki-Abe border following), approximated with closed RDP at a
//! tolerance proportional to each contour's perimeter, and filtered by
//! vertex count, orientation and relative area.
//!
//! Orientation is taken from the border type rather than the winding the
//! tracer happens to emit: outer borders carry negative signed area,
//! hole borders positive.

use image::GrayImage;
use imageproc::contours::{BorderType, find_contours};

use crate::error::KernelError;
use crate::simplify::simplify_closed;
use crate::types::Point;

/// One traced border.
#[derive(Debug, Clone, PartialEq)]
pub struct TracedContour {
    /// Border pixels in tracing order.
    pub points: Vec<Point>,
    /// Outer boundary (`true`) or hole boundary.
    pub outer: bool,
}

impl TracedContour {
    /// Signed area with the outer-negative convention.
    #[must_use]
    pub fn signed_area(&self) -> f64 {
        oriented_area(&self.points, self.outer)
    }
}

/// Acceptance rule for approximated polygons.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolygonCriteria {
    /// Approximation tolerance as a fraction of contour perimeter.
    pub tolerance: f64,
    /// Fewest vertices an accepted polygon may have.
    pub min_vertices: usize,
    /// Most vertices an accepted polygon may have.
    pub max_vertices: usize,
    /// Minimum `|area|` as a fraction of the largest contour's `|area|`.
    pub area_threshold: f64,
}

/// Trace every border of the nonzero foreground.
#[must_use = "returns the traced contours"]
pub fn trace_contours(binary: &GrayImage) -> Vec<TracedContour> {
    find_contours::<u32>(binary)
        .into_iter()
        .map(|c| TracedContour {
            points: c
                .points
                .into_iter()
                .map(|p| Point::new(f64::from(p.x), f64::from(p.y)))
                .collect(),
            outer: c.border_type == BorderType::Outer,
        })
        .collect()
}

/// Unsigned shoelace area of a closed polygon.
#[must_use]
pub fn polygon_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: f64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x.mul_add(b.y, -(b.x * a.y)))
        .sum();
    twice.abs() / 2.0
}

fn oriented_area(points: &[Point], outer: bool) -> f64 {
    let area = polygon_area(points);
    if outer { -area } else { area }
}

/// Perimeter of a closed polygon.
#[must_use]
pub fn arc_length(points: &[Point]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.distance(*b))
        .sum()
}

/// Approximate every contour and keep the polygons `criteria` accepts.
///
/// # Errors
///
/// Returns [`KernelError::EmptyContourSet`] if `contours` is empty.
pub fn select_polygons(
    contours: &[TracedContour],
    criteria: &PolygonCriteria,
) -> Result<Vec<Vec<Point>>, KernelError> {
    if contours.is_empty() {
        return Err(KernelError::EmptyContourSet);
    }
    let largest = contours
        .iter()
        .map(|c| c.signed_area().abs())
        .fold(0.0_f64, f64::max);
    let min_area = criteria.area_threshold * largest;

    let accepted = contours
        .iter()
        .filter_map(|contour| {
            let epsilon = criteria.tolerance * arc_length(&contour.points);
            let approx = simplify_closed(&contour.points, epsilon);
            let vertices = approx.len();
            let area = oriented_area(&approx, contour.outer);
            let keep = (criteria.min_vertices..=criteria.max_vertices).contains(&vertices)
                && area < 0.0
                && area.abs() >= min_area;
            keep.then_some(approx)
        })
        .collect();
    Ok(accepted)
}
