//! Edge maps: smoothed Canny detection and binary inversion.
//!
//! [`canny`] smooths with the kernel-size-driven Gaussian from
//! [`crate::blur`] and then runs the detector in [`crate::canny`]. White
//! pixels (255) are edges, black (0) is background.

use image::GrayImage;

use crate::blur::gaussian_blur;
use crate::canny::canny_smoothed;

/// Gaussian pre-smoothing followed by Canny edge detection.
#[must_use = "returns the binary edge map"]
pub fn canny(
    image: &GrayImage,
    gaussian_size: u32,
    low_threshold: f32,
    high_threshold: f32,
) -> GrayImage {
    let smoothed = gaussian_blur(image, gaussian_size);
    canny_smoothed(&smoothed, low_threshold, high_threshold)
}

/// Bitwise NOT of every sample.
///
/// Dark features on the light background of a micrograph become the
/// nonzero foreground that contour and line detection look for.
#[must_use = "returns the inverted image"]
pub fn invert(image: &GrayImage) -> GrayImage {
    let mut out = image.clone();
    out.iter_mut().for_each(|s| *s = !*s);
    out
}
