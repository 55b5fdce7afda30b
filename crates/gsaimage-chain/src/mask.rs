//! Threshold masks and the boolean mask buffer used by pattern layers.
//!
//! [`binary_mask`] and [`color_mask`] are sample-wise thresholds over an
//! [`ImageBuffer`]. [`BoolMask`] is a packed-per-pixel boolean grid that
//! filter and erase layers accumulate into.

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, ImageBuffer, Point, WHITE};

/// Threshold at the maximum sample value.
///
/// Anything below 255 becomes 0; samples already at 255 stay.
#[must_use = "returns the thresholded buffer"]
pub fn binary_mask(image: &ImageBuffer) -> ImageBuffer {
    image.map_samples(|v| if v < WHITE { 0 } else { v })
}

/// Returns `true` when `value` lies strictly between `min` and `max`.
#[must_use]
pub const fn in_open_range(value: u8, min: u8, max: u8) -> bool {
    min < value && value < max
}

/// Keep samples strictly inside `(min, max)` and pin the rest to white.
///
/// Equivalent to `image * mask + 255 * (1 - mask)` with a 0/1 mask.
#[must_use = "returns the masked buffer"]
pub fn color_mask(image: &ImageBuffer, min: u8, max: u8) -> ImageBuffer {
    image.map_samples(|v| if in_open_range(v, min, max) { v } else { WHITE })
}

/// Boolean per-pixel mask.
///
/// Serialises as a row-major `bool[][]` grid.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<bool>>", into = "Vec<Vec<bool>>")]
pub struct BoolMask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl BoolMask {
    /// All-false mask of the given size.
    #[must_use]
    pub fn new(dims: Dimensions) -> Self {
        let len = usize::try_from(dims.area()).unwrap_or(0);
        Self {
            width: dims.width,
            height: dims.height,
            bits: vec![false; len],
        }
    }

    /// Mask built from a predicate over pixel coordinates.
    #[must_use]
    pub fn from_fn(dims: Dimensions, mut f: impl FnMut(u32, u32) -> bool) -> Self {
        let mut mask = Self::new(dims);
        for y in 0..dims.height {
            for x in 0..dims.width {
                if f(x, y) {
                    mask.set(x, y, true);
                }
            }
        }
        mask
    }

    /// Mask size.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        usize::try_from(u64::from(y) * u64::from(self.width) + u64::from(x)).ok()
    }

    /// Value at `(x, y)`; out-of-bounds reads are `false`.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.index(x, y).is_some_and(|i| self.bits[i])
    }

    /// Set `(x, y)`; out-of-bounds writes are ignored.
    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        if let Some(i) = self.index(x, y) {
            self.bits[i] = value;
        }
    }

    /// `self |= other`, pixel-wise. Sizes must match.
    pub fn or_assign(&mut self, other: &Self) {
        for (a, b) in self.bits.iter_mut().zip(&other.bits) {
            *a |= *b;
        }
    }

    /// `self &= !other`, pixel-wise. Sizes must match.
    pub fn and_not_assign(&mut self, other: &Self) {
        for (a, b) in self.bits.iter_mut().zip(&other.bits) {
            *a &= !*b;
        }
    }

    /// Number of `true` pixels.
    #[must_use]
    pub fn count(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    /// Set every pixel within `radius` of `center` to `value`.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn paint_disc(&mut self, center: Point, radius: f64, value: bool) {
        if self.width == 0 || self.height == 0 || radius < 0.0 {
            return;
        }
        let r2 = radius * radius;
        let x0 = (center.x - radius).floor().max(0.0) as u32;
        let y0 = (center.y - radius).floor().max(0.0) as u32;
        let x1 = ((center.x + radius).ceil().max(0.0) as u32).min(self.width - 1);
        let y1 = ((center.y + radius).ceil().max(0.0) as u32).min(self.height - 1);
        for y in y0..=y1 {
            for x in x0..=x1 {
                let p = Point::new(f64::from(x), f64::from(y));
                if p.distance_squared(center) <= r2 {
                    self.set(x, y, value);
                }
            }
        }
    }
}

impl TryFrom<Vec<Vec<bool>>> for BoolMask {
    type Error = String;

    fn try_from(rows: Vec<Vec<bool>>) -> Result<Self, Self::Error> {
        let height = rows.len();
        let width = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().position(|r| r.len() != width) {
            return Err(format!(
                "mask row {bad} has {} columns, expected {width}",
                rows[bad].len()
            ));
        }
        let width = u32::try_from(width).map_err(|_| "mask too wide".to_string())?;
        let height = u32::try_from(height).map_err(|_| "mask too tall".to_string())?;
        Ok(Self {
            width,
            height,
            bits: rows.into_iter().flatten().collect(),
        })
    }
}

impl From<BoolMask> for Vec<Vec<bool>> {
    fn from(mask: BoolMask) -> Self {
        let width = usize::try_from(mask.width).unwrap_or(0).max(1);
        mask.bits.chunks(width).map(<[bool]>::to_vec).collect()
    }
}
