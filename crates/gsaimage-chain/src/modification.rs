//! The closed set of modifications a chain node can apply.
//!
//! Each variant stores only its own parameters and delegates the numeric
//! work to the kernel modules. [`Modification`] serialises internally
//! tagged on `@class`, so a document object carries its discriminator
//! next to the variant's fields.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::blur::gaussian_blur_buffer;
use crate::contour::{PolygonCriteria, select_polygons, trace_contours};
use crate::draw::{GREEN, RED, draw_polygon, draw_segment, line_pixel_count};
use crate::edge::{canny, invert};
use crate::error::{ChainError, KernelError};
use crate::filter_pattern::FilterPattern;
use crate::gradient::gradient_stats;
use crate::hough::{
    HoughAccumulator, SegmentSearch, line_peaks, peak_angle_histogram, probabilistic_lines,
};
use crate::mask::{BoolMask, binary_mask, color_mask};
use crate::morphology::{Operator, morph_buffer};
use crate::types::{ImageBuffer, Point, Properties, PropertyValue, Region, WHITE};

/// Discriminator for every modification kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModificationKind {
    /// Chain root holding the raw image.
    InitialImage,
    /// Threshold at the maximum sample.
    BinaryMask,
    /// Gaussian smoothing.
    Blur,
    /// Smoothed Canny edges.
    CannyEdge,
    /// Open-interval value mask.
    ColorMask,
    /// Rectangular (optionally rotated) crop.
    Crop,
    /// Clicked domain centres and their density.
    DomainCenters,
    /// Scale calibration from a drawn segment.
    DrawScale,
    /// Hand-painted white strokes.
    Erase,
    /// Square-kernel morphology (see [`Morphology`]).
    Erosion,
    /// Square-kernel morphology (see [`Morphology`]).
    Dilation,
    /// Polygon detection.
    FindContours,
    /// Layered template-match masks.
    FilterPattern,
    /// Hough line detection.
    HoughTransform,
    /// Sobel gradient statistics.
    SobelFilter,
}

impl ModificationKind {
    /// Every kind, root first.
    pub const ALL: [Self; 15] = [
        Self::InitialImage,
        Self::BinaryMask,
        Self::Blur,
        Self::CannyEdge,
        Self::ColorMask,
        Self::Crop,
        Self::DomainCenters,
        Self::DrawScale,
        Self::Erase,
        Self::Erosion,
        Self::Dilation,
        Self::FindContours,
        Self::FilterPattern,
        Self::HoughTransform,
        Self::SobelFilter,
    ];

    /// Document discriminator.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::InitialImage => "InitialImage",
            Self::BinaryMask => "BinaryMask",
            Self::Blur => "Blur",
            Self::CannyEdge => "CannyEdge",
            Self::ColorMask => "ColorMask",
            Self::Crop => "Crop",
            Self::DomainCenters => "DomainCenters",
            Self::DrawScale => "DrawScale",
            Self::Erase => "Erase",
            Self::Erosion => "Erosion",
            Self::Dilation => "Dilation",
            Self::FindContours => "FindContours",
            Self::FilterPattern => "FilterPattern",
            Self::HoughTransform => "HoughTransform",
            Self::SobelFilter => "SobelFilter",
        }
    }

    /// Kind for a document discriminator.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.tag() == tag)
    }
}

impl fmt::Display for ModificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.tag())
    }
}

/// Raw image at the root of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialImage {
    /// The imported pixels.
    pub img_out: ImageBuffer,
}

/// Gaussian smoothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blur {
    /// Requested kernel size; forced odd and clamped to `[3, 51]` on use.
    pub gaussian_size: u32,
}

impl Blur {
    /// Default kernel size.
    pub const DEFAULT_GAUSSIAN_SIZE: u32 = 5;
}

impl Default for Blur {
    fn default() -> Self {
        Self {
            gaussian_size: Self::DEFAULT_GAUSSIAN_SIZE,
        }
    }
}

/// Smoothed Canny edge detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CannyEdge {
    /// Hysteresis low threshold.
    pub low_threshold: f32,
    /// Hysteresis high threshold.
    pub high_threshold: f32,
    /// Pre-smoothing kernel size.
    pub gaussian_size: u32,
}

impl CannyEdge {
    /// Default low threshold.
    pub const DEFAULT_LOW_THRESHOLD: f32 = 50.0;
    /// Default high threshold.
    pub const DEFAULT_HIGH_THRESHOLD: f32 = 150.0;
}

impl Default for CannyEdge {
    fn default() -> Self {
        Self {
            low_threshold: Self::DEFAULT_LOW_THRESHOLD,
            high_threshold: Self::DEFAULT_HIGH_THRESHOLD,
            gaussian_size: Blur::DEFAULT_GAUSSIAN_SIZE,
        }
    }
}

/// Keep samples strictly inside `(min, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorMask {
    /// Exclusive lower bound.
    pub min: u8,
    /// Exclusive upper bound.
    pub max: u8,
}

impl Default for ColorMask {
    fn default() -> Self {
        Self { min: 0, max: WHITE }
    }
}

/// Rectangular crop, optionally rotated about the region centre.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Crop {
    /// Region to extract.
    pub roi: Region,
    /// Rotation in degrees, counter-clockwise in image coordinates.
    #[serde(default)]
    pub angle: f64,
}

/// Clicked domain centres.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DomainCenters {
    /// Click positions in order.
    pub centers: Vec<Point>,
}

impl DomainCenters {
    /// Record a click.
    pub fn add_center(&mut self, p: Point) {
        self.centers.push(p);
    }

    /// Drop the most recent click.
    pub fn remove_last_center(&mut self) -> Option<Point> {
        self.centers.pop()
    }
}

/// Scale calibration segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrawScale {
    /// Segment start.
    pub start: Point,
    /// Segment end.
    pub end: Point,
    /// Physical length of the segment.
    pub length: f64,
}

impl Default for DrawScale {
    fn default() -> Self {
        Self {
            start: Point::new(0.0, 0.0),
            end: Point::new(0.0, 0.0),
            length: 1.0,
        }
    }
}

/// One painted stroke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    /// Brush radius in pixels.
    pub radius: f64,
    /// Brush centres along the stroke.
    pub points: Vec<Point>,
}

/// Persisted eraser strokes, replayed on every recompute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Erase {
    /// Radius used for new strokes.
    pub radius: f64,
    /// Strokes in paint order.
    #[serde(default)]
    pub strokes: Vec<Stroke>,
}

impl Erase {
    /// Default brush radius.
    pub const DEFAULT_RADIUS: f64 = 5.0;

    /// Append a stroke painted with the current radius.
    pub fn push_stroke(&mut self, points: Vec<Point>) {
        self.strokes.push(Stroke {
            radius: self.radius,
            points,
        });
    }

    /// Remove the most recent stroke.
    pub fn undo_stroke(&mut self) -> Option<Stroke> {
        self.strokes.pop()
    }
}

impl Default for Erase {
    fn default() -> Self {
        Self {
            radius: Self::DEFAULT_RADIUS,
            strokes: Vec::new(),
        }
    }
}

/// Kernel size shared by [`Modification::Erosion`] and
/// [`Modification::Dilation`].
///
/// Erosion runs the max filter and Dilation the min filter. Saved chains
/// depend on that pairing, so it is kept as is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Morphology {
    /// Square kernel side; forced odd and clamped to 20 on use.
    pub size: u32,
}

impl Morphology {
    /// Default kernel side.
    pub const DEFAULT_SIZE: u32 = 3;
}

impl Default for Morphology {
    fn default() -> Self {
        Self {
            size: Self::DEFAULT_SIZE,
        }
    }
}

/// Polygon detection on the dark features of the input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FindContours {
    /// RDP tolerance as a fraction of perimeter, `[0, 1]`.
    pub tolerance: f64,
    /// Fewest accepted vertices.
    pub min_vertices: usize,
    /// Most accepted vertices.
    pub max_vertices: usize,
    /// Minimum area as a fraction of the largest contour, `[0, 1]`.
    pub area_threshold: f64,
}

impl FindContours {
    /// Default tolerance.
    pub const DEFAULT_TOLERANCE: f64 = 0.02;
    /// Default minimum vertex count.
    pub const DEFAULT_MIN_VERTICES: usize = 3;
    /// Default maximum vertex count.
    pub const DEFAULT_MAX_VERTICES: usize = 20;
    /// Default area fraction.
    pub const DEFAULT_AREA_THRESHOLD: f64 = 0.1;
}

impl Default for FindContours {
    fn default() -> Self {
        Self {
            tolerance: Self::DEFAULT_TOLERANCE,
            min_vertices: Self::DEFAULT_MIN_VERTICES,
            max_vertices: Self::DEFAULT_MAX_VERTICES,
            area_threshold: Self::DEFAULT_AREA_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone)]
struct AccumulatorCache {
    fingerprint: u64,
    accumulator: HoughAccumulator,
}

/// Hough line detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoughTransform {
    /// Peak suppression distance in rho bins.
    pub min_distance: u32,
    /// Peak suppression angle in degrees.
    pub min_angle: u32,
    /// Peak threshold tick in `[1, 200]`, relative to the strongest cell.
    pub threshold: u32,
    /// Minimum segment extent.
    pub line_length: u32,
    /// Largest bridged gap.
    pub line_gap: u32,
    /// Votes a candidate segment needs before it is walked.
    #[serde(default = "HoughTransform::default_segment_threshold")]
    pub segment_threshold: u32,
    #[serde(skip)]
    cache: Option<AccumulatorCache>,
}

impl HoughTransform {
    /// Default suppression distance.
    pub const DEFAULT_MIN_DISTANCE: u32 = 9;
    /// Default suppression angle.
    pub const DEFAULT_MIN_ANGLE: u32 = 10;
    /// Default peak tick (half the strongest cell).
    pub const DEFAULT_THRESHOLD: u32 = 100;
    /// Default minimum segment extent.
    pub const DEFAULT_LINE_LENGTH: u32 = 50;
    /// Default bridged gap.
    pub const DEFAULT_LINE_GAP: u32 = 10;
    /// Default segment vote threshold.
    pub const DEFAULT_SEGMENT_THRESHOLD: u32 = 10;

    const fn default_segment_threshold() -> u32 {
        Self::DEFAULT_SEGMENT_THRESHOLD
    }

    /// Accumulator for `input`, reusing the cached one when the input is
    /// unchanged.
    fn accumulator(&mut self, input: &ImageBuffer) -> &HoughAccumulator {
        let fingerprint = input.fingerprint();
        let cache = match self.cache.take() {
            Some(c) if c.fingerprint == fingerprint => c,
            _ => AccumulatorCache {
                fingerprint,
                accumulator: HoughAccumulator::compute(&input.to_gray()),
            },
        };
        &self.cache.insert(cache).accumulator
    }
}

impl Default for HoughTransform {
    fn default() -> Self {
        Self {
            min_distance: Self::DEFAULT_MIN_DISTANCE,
            min_angle: Self::DEFAULT_MIN_ANGLE,
            threshold: Self::DEFAULT_THRESHOLD,
            line_length: Self::DEFAULT_LINE_LENGTH,
            line_gap: Self::DEFAULT_LINE_GAP,
            segment_threshold: Self::DEFAULT_SEGMENT_THRESHOLD,
            cache: None,
        }
    }
}

/// Sobel gradient statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SobelFilter {
    /// Half-size `k` of the `2k + 1` aperture.
    pub half_size: u32,
}

impl Default for SobelFilter {
    fn default() -> Self {
        Self { half_size: 1 }
    }
}

/// A chain step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "@class")]
pub enum Modification {
    /// See [`InitialImage`].
    InitialImage(InitialImage),
    /// Threshold at the maximum sample value.
    BinaryMask,
    /// See [`Blur`].
    Blur(Blur),
    /// See [`CannyEdge`].
    CannyEdge(CannyEdge),
    /// See [`ColorMask`].
    ColorMask(ColorMask),
    /// See [`Crop`].
    Crop(Crop),
    /// See [`DomainCenters`].
    DomainCenters(DomainCenters),
    /// See [`DrawScale`].
    DrawScale(DrawScale),
    /// See [`Erase`].
    Erase(Erase),
    /// Max filter; see [`Morphology`].
    Erosion(Morphology),
    /// Min filter; see [`Morphology`].
    Dilation(Morphology),
    /// See [`FindContours`].
    FindContours(FindContours),
    /// See [`FilterPattern`].
    FilterPattern(FilterPattern),
    /// See [`HoughTransform`].
    HoughTransform(HoughTransform),
    /// See [`SobelFilter`].
    SobelFilter(SobelFilter),
}

/// Fresh output and node-local properties from one recompute.
#[derive(Debug, Clone, PartialEq)]
pub struct Recomputed {
    /// New cached output.
    pub output: ImageBuffer,
    /// Properties to merge into the node's own bag.
    pub properties: Properties,
}

impl Recomputed {
    fn image(output: ImageBuffer) -> Self {
        Self {
            output,
            properties: Properties::new(),
        }
    }

    fn with(mut self, key: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }
}

macro_rules! variant_accessors {
    ($($fn_name:ident => $variant:ident($ty:ty)),* $(,)?) => {
        $(
            #[doc = concat!("Mutable parameters of a `", stringify!($variant), "` step.")]
            ///
            /// # Errors
            ///
            /// Returns [`ChainError::WrongVariant`] for any other kind.
            pub fn $fn_name(&mut self) -> Result<&mut $ty, ChainError> {
                match self {
                    Self::$variant(params) => Ok(params),
                    other => Err(ChainError::WrongVariant {
                        expected: ModificationKind::$variant,
                        found: other.kind(),
                    }),
                }
            }
        )*
    };
}

fn scale_of(context: &Properties) -> Result<f64, KernelError> {
    let scale = context
        .get("scale")
        .and_then(PropertyValue::as_f64)
        .unwrap_or(1.0);
    checked_scale(scale)
}

fn checked_scale(scale: f64) -> Result<f64, KernelError> {
    if scale.is_finite() && scale > 0.0 {
        Ok(scale)
    } else {
        Err(KernelError::InvalidScale)
    }
}

impl Modification {
    /// Discriminator of this step.
    #[must_use]
    pub const fn kind(&self) -> ModificationKind {
        match self {
            Self::InitialImage(_) => ModificationKind::InitialImage,
            Self::BinaryMask => ModificationKind::BinaryMask,
            Self::Blur(_) => ModificationKind::Blur,
            Self::CannyEdge(_) => ModificationKind::CannyEdge,
            Self::ColorMask(_) => ModificationKind::ColorMask,
            Self::Crop(_) => ModificationKind::Crop,
            Self::DomainCenters(_) => ModificationKind::DomainCenters,
            Self::DrawScale(_) => ModificationKind::DrawScale,
            Self::Erase(_) => ModificationKind::Erase,
            Self::Erosion(_) => ModificationKind::Erosion,
            Self::Dilation(_) => ModificationKind::Dilation,
            Self::FindContours(_) => ModificationKind::FindContours,
            Self::FilterPattern(_) => ModificationKind::FilterPattern,
            Self::HoughTransform(_) => ModificationKind::HoughTransform,
            Self::SobelFilter(_) => ModificationKind::SobelFilter,
        }
    }

    /// Default parameters for `kind`; `None` for the root, which needs
    /// an image.
    #[must_use]
    pub fn with_defaults(kind: ModificationKind) -> Option<Self> {
        Some(match kind {
            ModificationKind::InitialImage => return None,
            ModificationKind::BinaryMask => Self::BinaryMask,
            ModificationKind::Blur => Self::Blur(Blur::default()),
            ModificationKind::CannyEdge => Self::CannyEdge(CannyEdge::default()),
            ModificationKind::ColorMask => Self::ColorMask(ColorMask::default()),
            ModificationKind::Crop => Self::Crop(Crop::default()),
            ModificationKind::DomainCenters => Self::DomainCenters(DomainCenters::default()),
            ModificationKind::DrawScale => Self::DrawScale(DrawScale::default()),
            ModificationKind::Erase => Self::Erase(Erase::default()),
            ModificationKind::Erosion => Self::Erosion(Morphology::default()),
            ModificationKind::Dilation => Self::Dilation(Morphology::default()),
            ModificationKind::FindContours => Self::FindContours(FindContours::default()),
            ModificationKind::FilterPattern => Self::FilterPattern(FilterPattern::default()),
            ModificationKind::HoughTransform => Self::HoughTransform(HoughTransform::default()),
            ModificationKind::SobelFilter => Self::SobelFilter(SobelFilter::default()),
        })
    }

    variant_accessors! {
        blur_mut => Blur(Blur),
        canny_edge_mut => CannyEdge(CannyEdge),
        color_mask_mut => ColorMask(ColorMask),
        crop_mut => Crop(Crop),
        domain_centers_mut => DomainCenters(DomainCenters),
        draw_scale_mut => DrawScale(DrawScale),
        erase_mut => Erase(Erase),
        erosion_mut => Erosion(Morphology),
        dilation_mut => Dilation(Morphology),
        find_contours_mut => FindContours(FindContours),
        filter_pattern_mut => FilterPattern(FilterPattern),
        hough_transform_mut => HoughTransform(HoughTransform),
        sobel_filter_mut => SobelFilter(SobelFilter),
    }

    /// Display levels for an output of this step.
    #[must_use]
    pub fn levels(&self, output: &ImageBuffer) -> (u8, u8) {
        match self {
            Self::BinaryMask | Self::CannyEdge(_) => (0, WHITE),
            _ => match output.levels() {
                (low, high) if low < high => (low, high),
                _ => (0, WHITE),
            },
        }
    }

    /// Recompute from `input` (the predecessor's output, absent only at
    /// the root). `context` is the merged property bag visible to this
    /// node.
    ///
    /// Returns `None` when the step leaves its previous output in place.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::MissingPredecessor`] when a non-root step has
    /// no input and [`ChainError::Kernel`] when a kernel precondition
    /// fails.
    pub fn apply(
        &mut self,
        input: Option<&ImageBuffer>,
        context: &Properties,
    ) -> Result<Option<Recomputed>, ChainError> {
        if let Self::InitialImage(root) = self {
            return Ok(Some(Recomputed::image(root.img_out.clone())));
        }
        let kind = self.kind();
        let input = input.ok_or(ChainError::MissingPredecessor { kind })?;
        if input.is_empty() {
            return Err(KernelError::EmptyImage.into());
        }

        let step = match self {
            Self::InitialImage(root) => Recomputed::image(root.img_out.clone()),
            Self::BinaryMask => Recomputed::image(binary_mask(input)),
            Self::Blur(p) => Recomputed::image(gaussian_blur_buffer(input, p.gaussian_size)),
            Self::CannyEdge(p) => Recomputed::image(ImageBuffer::Gray(canny(
                &input.to_gray(),
                p.gaussian_size,
                p.low_threshold,
                p.high_threshold,
            ))),
            Self::ColorMask(p) => Recomputed::image(color_mask(input, p.min, p.max)),
            Self::Crop(p) => Recomputed::image(crop(input, p.roi, p.angle)?),
            Self::DomainCenters(p) => {
                let scale = scale_of(context)?;
                #[allow(clippy::cast_precision_loss)]
                let area = input.dimensions().area() as f64;
                #[allow(clippy::cast_precision_loss)]
                let density = p.centers.len() as f64 / (area * scale * scale);
                Recomputed::image(input.clone()).with("domain_density", density)
            }
            Self::DrawScale(p) => {
                #[allow(clippy::cast_precision_loss)]
                let pixels = line_pixel_count(p.start, p.end).max(1) as f64;
                let scale = checked_scale(p.length / pixels)?;
                Recomputed::image(input.clone()).with("scale", scale)
            }
            Self::Erase(p) => {
                let mut painted = BoolMask::new(input.dimensions());
                for stroke in &p.strokes {
                    for &point in &stroke.points {
                        painted.paint_disc(point, stroke.radius, true);
                    }
                }
                Recomputed::image(input.pin_outside_white(|x, y| !painted.get(x, y)))
            }
            Self::Erosion(p) => Recomputed::image(morph_buffer(input, Operator::Dilate, p.size)?),
            Self::Dilation(p) => Recomputed::image(morph_buffer(input, Operator::Erode, p.size)?),
            Self::FindContours(p) => find_contours(input, p)?,
            Self::FilterPattern(p) => match p.apply(input, scale_of(context)?)? {
                Some((output, properties)) => Recomputed { output, properties },
                None => return Ok(None),
            },
            Self::HoughTransform(p) => hough(input, p),
            Self::SobelFilter(p) => {
                let stats = gradient_stats(&input.to_gray(), p.half_size);
                let periodic_std = stats.periodic_std();
                Recomputed::image(ImageBuffer::Gray(stats.magnitude))
                    .with("periodic_mean", stats.periodic_mean)
                    .with("periodic_variance", stats.periodic_variance)
                    .with("periodic_std", periodic_std)
                    .with("angle_histogram", stats.histogram)
            }
        };
        Ok(Some(step))
    }
}

fn find_contours(input: &ImageBuffer, p: &FindContours) -> Result<Recomputed, KernelError> {
    let binary = binary_mask(&ImageBuffer::Gray(input.to_gray())).to_gray();
    let contours = trace_contours(&invert(&binary));
    let criteria = PolygonCriteria {
        tolerance: p.tolerance.clamp(0.0, 1.0),
        min_vertices: p.min_vertices,
        max_vertices: p.max_vertices,
        area_threshold: p.area_threshold.clamp(0.0, 1.0),
    };
    let polygons = select_polygons(&contours, &criteria)?;
    let mut overlay = input.to_rgb();
    for polygon in &polygons {
        draw_polygon(&mut overlay, polygon, GREEN);
    }
    #[allow(clippy::cast_precision_loss)]
    let count = polygons.len() as f64;
    Ok(Recomputed::image(ImageBuffer::Rgb(overlay)).with("polygon_count", count))
}

fn hough(input: &ImageBuffer, p: &mut HoughTransform) -> Recomputed {
    let (min_distance, min_angle, threshold) = (p.min_distance, p.min_angle, p.threshold);
    let search = SegmentSearch {
        threshold: p.segment_threshold.max(1),
        line_length: p.line_length,
        line_gap: p.line_gap,
    };
    let peaks = line_peaks(p.accumulator(input), min_distance, min_angle, threshold);
    let histogram = peak_angle_histogram(&peaks);
    let mut angles: Vec<usize> = peaks.iter().map(|pk| pk.theta_index).collect();
    angles.sort_unstable();
    angles.dedup();
    let gray = input.to_gray();
    let segments = probabilistic_lines(&gray, &angles, search);
    let mut overlay = input.to_rgb();
    for &(a, b) in &segments {
        draw_segment(&mut overlay, a, b, RED);
    }
    #[allow(clippy::cast_precision_loss)]
    let count = segments.len() as f64;
    Recomputed::image(ImageBuffer::Rgb(overlay))
        .with("line_angle_histogram", histogram)
        .with("line_count", count)
}

/// Extract `roi` from `input`, rotated by `angle` degrees about the
/// region centre. Samples falling outside the image are white.
///
/// # Errors
///
/// Returns [`KernelError::DegenerateRegion`] if the region has no area
/// (for an unrotated crop: no area inside the image).
#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
pub fn crop(input: &ImageBuffer, roi: Region, angle: f64) -> Result<ImageBuffer, KernelError> {
    if angle == 0.0 {
        let r = roi
            .clip(input.dimensions())
            .ok_or(KernelError::DegenerateRegion)?;
        let (x, y) = (r.x as u32, r.y as u32);
        return Ok(match input {
            ImageBuffer::Gray(img) => ImageBuffer::Gray(
                image::imageops::crop_imm(img, x, y, r.width, r.height).to_image(),
            ),
            ImageBuffer::Rgb(img) => ImageBuffer::Rgb(
                image::imageops::crop_imm(img, x, y, r.width, r.height).to_image(),
            ),
        });
    }
    if roi.width == 0 || roi.height == 0 {
        return Err(KernelError::DegenerateRegion);
    }
    Ok(match input {
        ImageBuffer::Gray(img) => {
            ImageBuffer::Gray(rotated_crop(img, roi, angle, image::Luma([WHITE])))
        }
        ImageBuffer::Rgb(img) => {
            ImageBuffer::Rgb(rotated_crop(img, roi, angle, image::Rgb([WHITE; 3])))
        }
    })
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn rotated_crop<P: image::Pixel<Subpixel = u8>>(
    img: &image::ImageBuffer<P, Vec<u8>>,
    roi: Region,
    angle: f64,
    outside: P,
) -> image::ImageBuffer<P, Vec<u8>> {
    let (sin, cos) = angle.to_radians().sin_cos();
    let half_w = f64::from(roi.width) / 2.0;
    let half_h = f64::from(roi.height) / 2.0;
    let cx = roi.x as f64 + half_w;
    let cy = roi.y as f64 + half_h;
    let (w, h) = (f64::from(img.width()), f64::from(img.height()));
    image::ImageBuffer::from_fn(roi.width, roi.height, |u, v| {
        let du = f64::from(u) + 0.5 - half_w;
        let dv = f64::from(v) + 0.5 - half_h;
        let sx = cos.mul_add(du, -(sin * dv)) + cx;
        let sy = sin.mul_add(du, cos * dv) + cy;
        if sx < 0.0 || sy < 0.0 || sx >= w || sy >= h {
            outside
        } else {
            *img.get_pixel(sx.floor() as u32, sy.floor() as u32)
        }
    })
}
