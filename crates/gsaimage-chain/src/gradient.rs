//! Sobel gradients and the 60-degree periodic angle statistics.
//!
//! The derivative kernels follow the usual aperture construction: for
//! an odd size `n`, the smoothing taps are the binomial coefficients of
//! order `n - 1` and the derivative taps are the order `n - 2` binomial
//! convolved with `[-1, 0, 1]`. Borders are reflected without repeating
//! the edge sample.
//!
//! Gradient angles are folded into `[0, 180)` and accumulated into a
//! one-degree histogram weighted by magnitude. Hexagonal lattices repeat
//! every 60 degrees, so the histogram is folded with a three-tooth comb
//! and summarised with circular statistics on that period.

use std::f64::consts::TAU;

use image::GrayImage;

use crate::border::reflect_101;

/// Smallest accepted half-size `k` (kernel `2k + 1`).
pub const MIN_HALF_SIZE: u32 = 1;

/// Largest accepted half-size.
pub const MAX_HALF_SIZE: u32 = 15;

/// Bins in the folded angle histogram.
pub const ANGLE_BINS: usize = 180;

/// Period of the comb-folded histogram, in bins.
pub const PERIOD: usize = 60;

/// Index the periodic mean is moved to before taking the second moment.
pub const CENTER: usize = PERIOD / 2;

/// Kernel size for a half-size, clamped to `[1, 15]`.
#[must_use]
pub const fn kernel_size(half_size: u32) -> u32 {
    let k = if half_size < MIN_HALF_SIZE {
        MIN_HALF_SIZE
    } else if half_size > MAX_HALF_SIZE {
        MAX_HALF_SIZE
    } else {
        half_size
    };
    2 * k + 1
}

fn binomial_row(order: usize) -> Vec<f64> {
    let mut row = vec![1.0];
    for _ in 0..order {
        let mut next = vec![0.0; row.len() + 1];
        for (i, v) in row.iter().enumerate() {
            next[i] += v;
            next[i + 1] += v;
        }
        row = next;
    }
    row
}

/// `(smoothing, derivative)` taps for an odd kernel size `n >= 3`.
#[must_use]
pub fn sobel_taps(n: u32) -> (Vec<f64>, Vec<f64>) {
    let n = usize::try_from(n.max(3)).unwrap_or(3);
    let smooth = binomial_row(n - 1);
    let base = binomial_row(n - 3);
    let mut deriv = vec![0.0; n];
    for (i, b) in base.iter().enumerate() {
        deriv[i] -= b;
        deriv[i + 2] += b;
    }
    (smooth, deriv)
}

/// Dense `f64` plane.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    /// Width in samples.
    pub width: u32,
    /// Height in samples.
    pub height: u32,
    /// Row-major samples.
    pub data: Vec<f64>,
}

impl Plane {
    fn at(&self, x: u32, y: u32) -> f64 {
        self.data[y as usize * self.width as usize + x as usize]
    }
}

fn to_plane(image: &GrayImage) -> Plane {
    Plane {
        width: image.width(),
        height: image.height(),
        data: image.as_raw().iter().map(|&v| f64::from(v)).collect(),
    }
}

fn convolve_rows(src: &Plane, taps: &[f64]) -> Plane {
    let half = i64::try_from(taps.len() / 2).unwrap_or(0);
    let mut data = Vec::with_capacity(src.data.len());
    for y in 0..src.height {
        for x in 0..src.width {
            let acc: f64 = taps
                .iter()
                .zip(-half..)
                .map(|(t, d)| t * src.at(reflect_101(i64::from(x) + d, src.width), y))
                .sum();
            data.push(acc);
        }
    }
    Plane { data, ..*src }
}

fn convolve_cols(src: &Plane, taps: &[f64]) -> Plane {
    let half = i64::try_from(taps.len() / 2).unwrap_or(0);
    let mut data = Vec::with_capacity(src.data.len());
    for y in 0..src.height {
        for x in 0..src.width {
            let acc: f64 = taps
                .iter()
                .zip(-half..)
                .map(|(t, d)| t * src.at(x, reflect_101(i64::from(y) + d, src.height)))
                .sum();
            data.push(acc);
        }
    }
    Plane { data, ..*src }
}

/// Horizontal and vertical derivatives at the given half-size.
#[must_use = "returns the (dx, dy) planes"]
pub fn sobel(image: &GrayImage, half_size: u32) -> (Plane, Plane) {
    let (smooth, deriv) = sobel_taps(kernel_size(half_size));
    let src = to_plane(image);
    let dx = convolve_cols(&convolve_rows(&src, &deriv), &smooth);
    let dy = convolve_rows(&convolve_cols(&src, &deriv), &smooth);
    (dx, dy)
}

/// Angle of `(dx, dy)` in degrees, folded into `[0, 180)`.
#[must_use]
pub fn folded_angle(dx: f64, dy: f64) -> f64 {
    let mut deg = dy.atan2(dx).to_degrees();
    if deg < 0.0 {
        deg += 180.0;
    }
    if deg >= 180.0 { deg - 180.0 } else { deg }
}

/// Summary of a Sobel pass.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientStats {
    /// Magnitude scaled so the strongest gradient is 255.
    pub magnitude: GrayImage,
    /// Magnitude-weighted histogram of folded angles, one bin per degree.
    pub histogram: Vec<f64>,
    /// Comb-folded histogram re-centred so the periodic mean is at
    /// [`CENTER`].
    pub centered: Vec<f64>,
    /// Circular mean on the 60-bin period, in bins.
    pub periodic_mean: f64,
    /// Weighted second moment of `centered` about [`CENTER`].
    pub periodic_variance: f64,
}

impl GradientStats {
    /// Square root of [`Self::periodic_variance`].
    #[must_use]
    pub fn periodic_std(&self) -> f64 {
        self.periodic_variance.sqrt()
    }
}

/// Fold a 180-bin histogram with a comb of period [`PERIOD`].
#[must_use]
pub fn comb_fold(histogram: &[f64]) -> Vec<f64> {
    (0..PERIOD)
        .map(|i| {
            (0..ANGLE_BINS / PERIOD)
                .map(|t| histogram.get(i + t * PERIOD).copied().unwrap_or(0.0))
                .sum()
        })
        .collect()
}

/// Circular mean of a periodic histogram, in bins within `[0, len)`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn circular_mean(weights: &[f64]) -> f64 {
    let len = weights.len() as f64;
    let (c, s) = weights
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(c, s), (i, w)| {
            let phi = TAU * i as f64 / len;
            (w.mul_add(phi.cos(), c), w.mul_add(phi.sin(), s))
        });
    if c == 0.0 && s == 0.0 {
        return 0.0;
    }
    let phi = s.atan2(c).rem_euclid(TAU);
    (phi * len / TAU).rem_euclid(len)
}

/// Rotate `weights` so that bin `mean` lands on [`CENTER`].
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn recenter(weights: &[f64], mean: f64) -> Vec<f64> {
    let len = i64::try_from(weights.len()).unwrap_or(0);
    if len == 0 {
        return Vec::new();
    }
    let shift = (CENTER as f64 - mean).round() as i64;
    (0..len)
        .map(|j| {
            let src = usize::try_from((j - shift).rem_euclid(len)).unwrap_or(0);
            weights[src]
        })
        .collect()
}

/// Weighted second moment about [`CENTER`].
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn variance_about_center(weights: &[f64]) -> f64 {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let moment: f64 = weights
        .iter()
        .enumerate()
        .map(|(j, w)| {
            let d = j as f64 - CENTER as f64;
            w * d * d
        })
        .sum();
    moment / total
}

/// Sobel magnitude, angle histogram and periodic statistics.
#[must_use = "returns the gradient statistics"]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn gradient_stats(image: &GrayImage, half_size: u32) -> GradientStats {
    let (dx, dy) = sobel(image, half_size);
    let magnitudes: Vec<f64> = dx
        .data
        .iter()
        .zip(&dy.data)
        .map(|(gx, gy)| gx.hypot(*gy))
        .collect();

    let mut histogram = vec![0.0; ANGLE_BINS];
    for ((gx, gy), m) in dx.data.iter().zip(&dy.data).zip(&magnitudes) {
        if *m == 0.0 {
            continue;
        }
        let bin = (folded_angle(*gx, *gy).floor() as usize).min(ANGLE_BINS - 1);
        histogram[bin] += m;
    }

    let folded = comb_fold(&histogram);
    let periodic_mean = circular_mean(&folded);
    let centered = recenter(&folded, periodic_mean);
    let periodic_variance = variance_about_center(&centered);

    let peak = magnitudes.iter().copied().fold(0.0_f64, f64::max);
    let raw = magnitudes
        .iter()
        .map(|m| {
            if peak > 0.0 {
                (m / peak * 255.0).round().clamp(0.0, 255.0) as u8
            } else {
                0
            }
        })
        .collect();
    let magnitude = GrayImage::from_raw(dx.width, dx.height, raw)
        .unwrap_or_else(|| GrayImage::new(dx.width, dx.height));

    GradientStats {
        magnitude,
        histogram,
        centered,
        periodic_mean,
        periodic_variance,
    }
}
