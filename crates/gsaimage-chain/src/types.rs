//! Shared types for the modification chain: image buffers, geometry and
//! property bags.

use std::collections::BTreeMap;
use std::hash::Hasher;

use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher13;

/// Re-export `GrayImage` so downstream crates can build buffers without
/// depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage` for color overlay outputs.
pub use image::RgbImage;

/// Sample value every "outside" pixel is pinned to.
pub const WHITE: u8 = u8::MAX;

/// A 2D point in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Point as the `(f32, f32)` tuple `imageproc::drawing` expects.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_f32_tuple(self) -> (f32, f32) {
        (self.x as f32, self.y as f32)
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create a new dimension pair.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels.
    #[must_use]
    pub const fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Returns `true` if either side is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Axis-aligned rectangle in pixel coordinates.
///
/// The origin may lie outside the image (a region dragged partially off
/// the edge); use [`Region::clip`] before indexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Region {
    /// Left edge.
    pub x: i64,
    /// Top edge.
    pub y: i64,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Region {
    /// Create a new region.
    #[must_use]
    pub const fn new(x: i64, y: i64, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Square region of side `size` at `(x, y)`.
    #[must_use]
    pub const fn square(x: i64, y: i64, size: u32) -> Self {
        Self::new(x, y, size, size)
    }

    /// Intersection with an image of the given dimensions.
    ///
    /// Returns `None` when the intersection has zero area.
    #[must_use]
    pub fn clip(self, dims: Dimensions) -> Option<Self> {
        let x0 = self.x.max(0);
        let y0 = self.y.max(0);
        let x1 = (self.x + i64::from(self.width)).min(i64::from(dims.width));
        let y1 = (self.y + i64::from(self.height)).min(i64::from(dims.height));
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        let width = u32::try_from(x1 - x0).ok()?;
        let height = u32::try_from(y1 - y0).ok()?;
        Some(Self::new(x0, y0, width, height))
    }
}

/// An owned 8-bit image: single channel, or RGB for color overlays.
///
/// Equality compares dimensions, channel layout and every sample, so two
/// buffers are equal exactly when they are bit-identical. Cloning is a
/// deep copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageBuffer {
    /// One sample per pixel.
    Gray(GrayImage),
    /// Three samples per pixel, used by overlay-drawing modifications.
    Rgb(RgbImage),
}

impl ImageBuffer {
    /// Image dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        match self {
            Self::Gray(img) => Dimensions::new(img.width(), img.height()),
            Self::Rgb(img) => Dimensions::new(img.width(), img.height()),
        }
    }

    /// Number of samples per pixel.
    #[must_use]
    pub const fn channels(&self) -> usize {
        match self {
            Self::Gray(_) => 1,
            Self::Rgb(_) => 3,
        }
    }

    /// All samples in row-major, channel-interleaved order.
    #[must_use]
    pub fn as_raw(&self) -> &[u8] {
        match self {
            Self::Gray(img) => img.as_raw(),
            Self::Rgb(img) => img.as_raw(),
        }
    }

    /// Returns `true` if the buffer holds no pixels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dimensions().is_empty()
    }

    /// Single-channel view of the buffer (luminance for RGB).
    #[must_use]
    pub fn to_gray(&self) -> GrayImage {
        match self {
            Self::Gray(img) => img.clone(),
            Self::Rgb(img) => image::imageops::grayscale(img),
        }
    }

    /// Three-channel copy of the buffer, replicating gray samples.
    #[must_use]
    pub fn to_rgb(&self) -> RgbImage {
        match self {
            Self::Gray(img) => {
                RgbImage::from_fn(img.width(), img.height(), |x, y| {
                    let v = img.get_pixel(x, y).0[0];
                    image::Rgb([v, v, v])
                })
            }
            Self::Rgb(img) => img.clone(),
        }
    }

    /// Apply `f` to every sample, keeping the channel layout.
    #[must_use]
    pub fn map_samples(&self, mut f: impl FnMut(u8) -> u8) -> Self {
        match self {
            Self::Gray(img) => {
                let mut out = img.clone();
                out.iter_mut().for_each(|s| *s = f(*s));
                Self::Gray(out)
            }
            Self::Rgb(img) => {
                let mut out = img.clone();
                out.iter_mut().for_each(|s| *s = f(*s));
                Self::Rgb(out)
            }
        }
    }

    /// Keep pixels where `keep(x, y)` holds and pin every other pixel to
    /// white.
    #[must_use]
    pub fn pin_outside_white(&self, mut keep: impl FnMut(u32, u32) -> bool) -> Self {
        match self {
            Self::Gray(img) => {
                let mut out = img.clone();
                for (x, y, p) in out.enumerate_pixels_mut() {
                    if !keep(x, y) {
                        p.0 = [WHITE];
                    }
                }
                Self::Gray(out)
            }
            Self::Rgb(img) => {
                let mut out = img.clone();
                for (x, y, p) in out.enumerate_pixels_mut() {
                    if !keep(x, y) {
                        p.0 = [WHITE; 3];
                    }
                }
                Self::Rgb(out)
            }
        }
    }

    /// Smallest and largest sample, or `(0, 0)` for an empty buffer.
    #[must_use]
    pub fn levels(&self) -> (u8, u8) {
        let raw = self.as_raw();
        let low = raw.iter().copied().min().unwrap_or(0);
        let high = raw.iter().copied().max().unwrap_or(0);
        (low, high)
    }

    /// Stable 64-bit fingerprint over layout and samples.
    ///
    /// Used as a cache key for expensive per-input precomputation.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let dims = self.dimensions();
        let mut hasher = SipHasher13::new();
        hasher.write_u32(dims.width);
        hasher.write_u32(dims.height);
        hasher.write_usize(self.channels());
        hasher.write(self.as_raw());
        hasher.finish()
    }
}

impl From<GrayImage> for ImageBuffer {
    fn from(img: GrayImage) -> Self {
        Self::Gray(img)
    }
}

impl From<RgbImage> for ImageBuffer {
    fn from(img: RgbImage) -> Self {
        Self::Rgb(img)
    }
}

/// Serde proxy: images travel as nested pixel grids, `[row][col]` for
/// gray and `[row][col][channel]` for RGB.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PixelGrid {
    Gray(Vec<Vec<u8>>),
    Rgb(Vec<Vec<[u8; 3]>>),
}

fn grid_dimensions<T>(rows: &[Vec<T>]) -> Result<(u32, u32), String> {
    let height = rows.len();
    let width = rows.first().map_or(0, Vec::len);
    if width == 0 || height == 0 {
        return Err("pixel grid is empty".to_string());
    }
    if let Some(bad) = rows.iter().position(|r| r.len() != width) {
        return Err(format!(
            "pixel grid row {bad} has {} columns, expected {width}",
            rows[bad].len()
        ));
    }
    let w = u32::try_from(width).map_err(|_| "pixel grid too wide".to_string())?;
    let h = u32::try_from(height).map_err(|_| "pixel grid too tall".to_string())?;
    Ok((w, h))
}

impl Serialize for ImageBuffer {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let grid = match self {
            Self::Gray(img) => PixelGrid::Gray(
                img.rows()
                    .map(|row| row.map(|p| p.0[0]).collect())
                    .collect(),
            ),
            Self::Rgb(img) => {
                PixelGrid::Rgb(img.rows().map(|row| row.map(|p| p.0).collect()).collect())
            }
        };
        grid.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ImageBuffer {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match PixelGrid::deserialize(deserializer)? {
            PixelGrid::Gray(rows) => {
                let (w, h) = grid_dimensions(&rows).map_err(serde::de::Error::custom)?;
                let raw: Vec<u8> = rows.into_iter().flatten().collect();
                GrayImage::from_raw(w, h, raw)
                    .map(Self::Gray)
                    .ok_or_else(|| serde::de::Error::custom("invalid gray pixel grid"))
            }
            PixelGrid::Rgb(rows) => {
                let (w, h) = grid_dimensions(&rows).map_err(serde::de::Error::custom)?;
                let raw: Vec<u8> = rows.into_iter().flatten().flatten().collect();
                RgbImage::from_raw(w, h, raw)
                    .map(Self::Rgb)
                    .ok_or_else(|| serde::de::Error::custom("invalid RGB pixel grid"))
            }
        }
    }
}

/// Node-local property bag, ordered by key so documents are stable.
pub type Properties = BTreeMap<String, PropertyValue>;

/// A single property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// Boolean flag.
    Bool(bool),
    /// Any numeric value.
    Number(f64),
    /// Free text.
    Text(String),
    /// Numeric array, e.g. a histogram.
    Array(Vec<f64>),
    /// Nested mapping.
    Map(Properties),
}

impl PropertyValue {
    /// The numeric value, if this is a number.
    #[must_use]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// The array, if this is a numeric array.
    #[must_use]
    pub fn as_array(&self) -> Option<&[f64]> {
        match self {
            Self::Array(v) => Some(v),
            _ => None,
        }
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<f64>> for PropertyValue {
    fn from(v: Vec<f64>) -> Self {
        Self::Array(v)
    }
}

/// Merge `overrides` into `base`; colliding keys take the override value,
/// unrelated keys in `base` survive.
pub fn merge_properties(base: &mut Properties, overrides: &Properties) {
    for (key, value) in overrides {
        base.insert(key.clone(), value.clone());
    }
}
