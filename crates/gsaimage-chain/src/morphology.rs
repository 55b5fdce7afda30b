//! Square-kernel morphology.
//!
//! Grayscale dilation is a max filter and erosion a min filter over a
//! square all-ones structuring element; on 0/255 masks they reduce to the
//! binary operators. Both wrap `imageproc::morphology`.
//!
//! A size of zero is the one input that cannot be coerced into a usable
//! kernel and is reported as [`KernelError::EmptyKernel`].

use image::GrayImage;
use imageproc::morphology::{Mask, grayscale_dilate, grayscale_erode};

use crate::error::KernelError;
use crate::types::{ImageBuffer, RgbImage};

/// Largest kernel size a user can request.
pub const MAX_KERNEL_SIZE: u32 = 20;

/// Which operator to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Max filter.
    Dilate,
    /// Min filter.
    Erode,
}

/// Clamp to the largest odd size within [`MAX_KERNEL_SIZE`], then force
/// odd by incrementing even sizes.
///
/// Returns `None` for zero.
#[must_use]
pub const fn normalize_kernel_size(size: u32) -> Option<u32> {
    if size == 0 {
        return None;
    }
    let largest_odd = MAX_KERNEL_SIZE - 1 + MAX_KERNEL_SIZE % 2;
    let clamped = if size > largest_odd {
        largest_odd
    } else {
        size
    };
    Some(if clamped % 2 == 0 { clamped + 1 } else { clamped })
}

fn square_mask(kernel_size: u32) -> Result<Mask, KernelError> {
    let side = normalize_kernel_size(kernel_size).ok_or(KernelError::EmptyKernel)?;
    let radius = u8::try_from(side / 2).map_err(|_| KernelError::EmptyKernel)?;
    Ok(Mask::square(radius))
}

fn run(image: &GrayImage, op: Operator, mask: &Mask) -> GrayImage {
    match op {
        Operator::Dilate => grayscale_dilate(image, mask),
        Operator::Erode => grayscale_erode(image, mask),
    }
}

/// Apply `op` with a square kernel of side `kernel_size` (normalised).
///
/// # Errors
///
/// Returns [`KernelError::EmptyKernel`] if `kernel_size` is zero.
pub fn morph(image: &GrayImage, op: Operator, kernel_size: u32) -> Result<GrayImage, KernelError> {
    let mask = square_mask(kernel_size)?;
    Ok(run(image, op, &mask))
}

/// Apply `op` to every channel of a buffer.
///
/// # Errors
///
/// Returns [`KernelError::EmptyKernel`] if `kernel_size` is zero.
pub fn morph_buffer(
    image: &ImageBuffer,
    op: Operator,
    kernel_size: u32,
) -> Result<ImageBuffer, KernelError> {
    let mask = square_mask(kernel_size)?;
    Ok(match image {
        ImageBuffer::Gray(img) => ImageBuffer::Gray(run(img, op, &mask)),
        ImageBuffer::Rgb(img) => {
            let (w, h) = img.dimensions();
            let planes: [GrayImage; 3] = std::array::from_fn(|c| {
                let plane =
                    GrayImage::from_fn(w, h, |x, y| image::Luma([img.get_pixel(x, y).0[c]]));
                run(&plane, op, &mask)
            });
            ImageBuffer::Rgb(RgbImage::from_fn(w, h, |x, y| {
                image::Rgb(std::array::from_fn(|c| planes[c].get_pixel(x, y).0[0]))
            }))
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn dot() -> GrayImage {
        let mut img = GrayImage::new(9, 9);
        img.put_pixel(4, 4, image::Luma([255]));
        img
    }

    #[test]
    fn sizes_are_odd_and_clamped() {
        assert_eq!(normalize_kernel_size(0), None);
        assert_eq!(normalize_kernel_size(1), Some(1));
        assert_eq!(normalize_kernel_size(4), Some(5));
        assert_eq!(normalize_kernel_size(19), Some(19));
        assert_eq!(normalize_kernel_size(20), Some(19));
        assert_eq!(normalize_kernel_size(99), Some(19));
    }

    #[test]
    fn normalized_sizes_stay_in_range() {
        for size in 1..=40 {
            let side = normalize_kernel_size(size).unwrap();
            assert!(side % 2 == 1 && side <= MAX_KERNEL_SIZE, "{size} -> {side}");
        }
    }

    #[test]
    fn dilate_grows_dot_into_square() {
        let out = morph(&dot(), Operator::Dilate, 3).unwrap();
        let lit: Vec<(u32, u32)> = out
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0[0] == 255)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert_eq!(lit.len(), 9);
        assert!(lit.iter().all(|&(x, y)| (3..=5).contains(&x) && (3..=5).contains(&y)));
    }

    #[test]
    fn erode_removes_isolated_dot() {
        let out = morph(&dot(), Operator::Erode, 3).unwrap();
        assert!(out.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn size_one_is_identity() {
        let img = dot();
        assert_eq!(morph(&img, Operator::Dilate, 1).unwrap(), img);
        assert_eq!(morph(&img, Operator::Erode, 1).unwrap(), img);
    }

    #[test]
    fn zero_size_is_an_empty_kernel() {
        assert_eq!(
            morph(&dot(), Operator::Dilate, 0),
            Err(KernelError::EmptyKernel)
        );
    }
}
