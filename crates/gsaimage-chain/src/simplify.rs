//! Polygon approximation using the Ramer-Douglas-Peucker algorithm.
//!
//! [`simplify_closed`] treats the input as a closed ring: the first point
//! is appended before simplification and the duplicate is dropped after,
//! so the closing edge is considered like any other.

use crate::types::Point;

/// Simplify an open polyline.
///
/// Points within `tolerance` pixels of the chord between their kept
/// neighbours are removed. Fewer than 3 points are returned unchanged.
#[must_use = "returns the simplified points"]
pub fn simplify_open(points: &[Point], tolerance: f64) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let mut kept = vec![false; points.len()];
    kept[0] = true;
    kept[points.len() - 1] = true;
    rdp_recurse(points, 0, points.len() - 1, tolerance, &mut kept);

    points
        .iter()
        .zip(&kept)
        .filter(|&(_, k)| *k)
        .map(|(&p, _)| p)
        .collect()
}

/// Simplify a closed polygon.
#[must_use = "returns the simplified polygon"]
pub fn simplify_closed(points: &[Point], tolerance: f64) -> Vec<Point> {
    let Some(&first) = points.first() else {
        return Vec::new();
    };
    let mut ring = points.to_vec();
    ring.push(first);
    let mut out = simplify_open(&ring, tolerance);
    if out.len() > 1 {
        out.pop();
    }
    out
}

fn rdp_recurse(points: &[Point], start: usize, end: usize, tolerance: f64, kept: &mut [bool]) {
    if end <= start + 1 {
        return;
    }

    let mut max_dist = 0.0;
    let mut max_idx = start;
    for i in (start + 1)..end {
        let d = perpendicular_distance(points[i], points[start], points[end]);
        if d > max_dist {
            max_dist = d;
            max_idx = i;
        }
    }

    if max_dist > tolerance {
        kept[max_idx] = true;
        rdp_recurse(points, start, max_idx, tolerance, kept);
        rdp_recurse(points, max_idx, end, tolerance, kept);
    }
}

/// Distance from `p` to the line through `a` and `b`, or to `a` when the
/// two coincide (the closing chord of a ring).
fn perpendicular_distance(p: Point, a: Point, b: Point) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let length_sq = dx.mul_add(dx, dy * dy);
    if length_sq == 0.0 {
        return p.distance(a);
    }
    let cross = dx.mul_add(a.y - p.y, -(dy * (a.x - p.x)));
    cross.abs() / length_sq.sqrt()
}
