//! Gaussian smoothing parameterised by kernel size.
//!
//! Users pick a kernel size on a slider rather than a sigma, so the sigma
//! is derived from the size with the usual `0.3 * ((n - 1) / 2 - 1) + 0.8`
//! rule and the separable kernel is built explicitly. The convolution
//! itself runs through [`imageproc::filter::separable_filter_equal`].
//!
//! [`gaussian_blur_buffer`] applies the same blur independently to each
//! channel of an RGB overlay.

use image::GrayImage;

use crate::types::{ImageBuffer, RgbImage};

/// Smallest kernel size accepted by [`normalize_kernel_size`].
pub const MIN_KERNEL_SIZE: u32 = 3;

/// Largest kernel size accepted by [`normalize_kernel_size`].
pub const MAX_KERNEL_SIZE: u32 = 51;

const _: () = assert!(MAX_KERNEL_SIZE % 2 == 1);

/// Clamp a requested kernel size to `[3, 51]` and force it odd.
///
/// Even sizes are bumped up by one, so the result is always odd and never
/// smaller than the (clamped) request.
#[must_use]
pub const fn normalize_kernel_size(size: u32) -> u32 {
    let clamped = if size < MIN_KERNEL_SIZE {
        MIN_KERNEL_SIZE
    } else if size > MAX_KERNEL_SIZE {
        MAX_KERNEL_SIZE
    } else {
        size
    };
    if clamped % 2 == 0 { clamped + 1 } else { clamped }
}

/// Sigma implied by an odd kernel size.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn sigma_for_kernel_size(size: u32) -> f64 {
    0.3f64.mul_add((size as f64 - 1.0).mul_add(0.5, -1.0), 0.8)
}

/// Normalised 1D Gaussian taps for an odd kernel size.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn gaussian_kernel(size: u32) -> Vec<f32> {
    let sigma = sigma_for_kernel_size(size);
    let radius = f64::from(size / 2);
    let taps: Vec<f64> = (0..size)
        .map(|i| {
            let d = f64::from(i) - radius;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f64 = taps.iter().sum();
    taps.into_iter().map(|t| (t / total) as f32).collect()
}

/// Blur a grayscale image with a Gaussian of the given kernel size.
///
/// The size goes through [`normalize_kernel_size`] first.
#[must_use = "returns the blurred image"]
pub fn gaussian_blur(image: &GrayImage, kernel_size: u32) -> GrayImage {
    let kernel = gaussian_kernel(normalize_kernel_size(kernel_size));
    imageproc::filter::separable_filter_equal(image, &kernel)
}

/// Blur every channel of a buffer independently.
#[must_use = "returns the blurred buffer"]
pub fn gaussian_blur_buffer(image: &ImageBuffer, kernel_size: u32) -> ImageBuffer {
    match image {
        ImageBuffer::Gray(img) => ImageBuffer::Gray(gaussian_blur(img, kernel_size)),
        ImageBuffer::Rgb(img) => {
            let (w, h) = (img.width(), img.height());
            let channels: [GrayImage; 3] = std::array::from_fn(|c| {
                GrayImage::from_fn(w, h, |x, y| image::Luma([img.get_pixel(x, y).0[c]]))
            });
            let blurred: [GrayImage; 3] =
                std::array::from_fn(|c| gaussian_blur(&channels[c], kernel_size));
            ImageBuffer::Rgb(RgbImage::from_fn(w, h, |x, y| {
                image::Rgb([
                    blurred[0].get_pixel(x, y).0[0],
                    blurred[1].get_pixel(x, y).0[0],
                    blurred[2].get_pixel(x, y).0[0],
                ])
            }))
        }
    }
}

#[cfg(test)]
#[allow(clippy::cast_possible_truncation)]
mod tests {
    use super::*;

    fn sharp_edge_image() -> GrayImage {
        GrayImage::from_fn(12, 12, |x, _y| {
            if x < 6 {
                image::Luma([0])
            } else {
                image::Luma([255])
            }
        })
    }

    #[test]
    fn every_size_in_range_normalizes_to_odd_not_smaller() {
        for k in MIN_KERNEL_SIZE..=MAX_KERNEL_SIZE {
            let n = normalize_kernel_size(k);
            assert_eq!(n % 2, 1, "size {k} normalized to even {n}");
            assert!(n >= k, "size {k} normalized down to {n}");
            assert!(n <= MAX_KERNEL_SIZE);
        }
    }

    #[test]
    fn out_of_range_sizes_are_clamped() {
        assert_eq!(normalize_kernel_size(0), 3);
        assert_eq!(normalize_kernel_size(2), 3);
        assert_eq!(normalize_kernel_size(200), 51);
    }

    #[test]
    fn kernel_is_normalized_and_symmetric() {
        let k = gaussian_kernel(7);
        assert_eq!(k.len(), 7);
        let total: f32 = k.iter().sum();
        assert!((total - 1.0).abs() < 1e-5);
        for i in 0..3 {
            assert!((k[i] - k[6 - i]).abs() < f32::EPSILON);
        }
        assert!(k[3] > k[2]);
    }

    #[test]
    fn sigma_matches_size_rule() {
        assert!((sigma_for_kernel_size(3) - 0.8).abs() < 1e-12);
        assert!((sigma_for_kernel_size(7) - 1.4).abs() < 1e-12);
    }

    #[test]
    fn output_dimensions_preserved() {
        let img = GrayImage::new(17, 31);
        let blurred = gaussian_blur(&img, 5);
        assert_eq!(blurred.dimensions(), (17, 31));
    }

    #[test]
    fn blur_smooths_sharp_edge() {
        let blurred = gaussian_blur(&sharp_edge_image(), 9);
        assert!(blurred.get_pixel(5, 6).0[0] > 0);
        assert!(blurred.get_pixel(6, 6).0[0] < 255);
    }

    #[test]
    fn blur_is_deterministic() {
        let img = sharp_edge_image();
        assert_eq!(gaussian_blur(&img, 5), gaussian_blur(&img, 5));
    }

    #[test]
    fn rgb_blur_matches_per_channel_gray_blur() {
        let img = RgbImage::from_fn(10, 10, |x, y| {
            image::Rgb([(x * 25) as u8, (y * 20) as u8, ((x + y) * 10) as u8])
        });
        let ImageBuffer::Rgb(out) = gaussian_blur_buffer(&ImageBuffer::Rgb(img.clone()), 5)
        else {
            unreachable!("rgb input yields rgb output");
        };
        let red = GrayImage::from_fn(10, 10, |x, y| image::Luma([img.get_pixel(x, y).0[0]]));
        let red_blurred = gaussian_blur(&red, 5);
        for (x, y, p) in out.enumerate_pixels() {
            assert_eq!(p.0[0], red_blurred.get_pixel(x, y).0[0]);
        }
    }
}
