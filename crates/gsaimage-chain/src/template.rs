//! Template matching with the six standard scoring methods.
//!
//! The source is padded by reflection (without repeating the edge) by
//! half the template size, so the score map has the same dimensions as
//! the source and each score is centred on its pixel. Window sums of
//! `I` and `I^2` come from integral images; the cross term is summed
//! directly.
//!
//! # Cost
//!
//! The direct cross term makes [`match_template`] `O(N * T)` for `N`
//! source pixels and `T` template pixels. A 512x512 source with the
//! default region takes a few seconds in a release build, and cost grows
//! with both the image and the region, so interactive callers should
//! crop large micrographs or keep filter regions small.

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::border::reflect_101;
use crate::error::KernelError;
use crate::mask::BoolMask;
use crate::types::{Dimensions, Region};

/// Scoring method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchMethod {
    /// Sum of squared differences.
    #[serde(rename = "TM_SQDIFF")]
    SqDiff,
    /// Normalised sum of squared differences.
    #[default]
    #[serde(rename = "TM_SQDIFF_NORMED")]
    SqDiffNormed,
    /// Cross-correlation.
    #[serde(rename = "TM_CCORR")]
    CCorr,
    /// Normalised cross-correlation.
    #[serde(rename = "TM_CCORR_NORMED")]
    CCorrNormed,
    /// Mean-subtracted cross-correlation.
    #[serde(rename = "TM_CCOEFF")]
    CCoeff,
    /// Normalised mean-subtracted cross-correlation.
    #[serde(rename = "TM_CCOEFF_NORMED")]
    CCoeffNormed,
}

impl MatchMethod {
    /// Every method, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::SqDiff,
        Self::SqDiffNormed,
        Self::CCorr,
        Self::CCorrNormed,
        Self::CCoeff,
        Self::CCoeffNormed,
    ];

    /// Whether scores are bounded by 1.
    #[must_use]
    pub const fn is_normalized(self) -> bool {
        matches!(
            self,
            Self::SqDiffNormed | Self::CCorrNormed | Self::CCoeffNormed
        )
    }
}

/// Smallest threshold tick.
pub const MIN_TICK: u16 = 1;

/// Largest threshold tick.
pub const MAX_TICK: u16 = 1000;

/// Position `tick - 1` of a 1000-point log scale from `1e-3` to `1`.
#[must_use]
pub fn threshold_fraction(tick: u16) -> f64 {
    let i = tick.clamp(MIN_TICK, MAX_TICK) - 1;
    let step = 3.0 / f64::from(MAX_TICK - 1);
    let exponent = f64::from(i).mul_add(step, -3.0);
    10f64.powf(exponent)
}

/// Per-pixel match scores.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreMap {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Row-major scores.
    pub scores: Vec<f64>,
}

impl ScoreMap {
    /// Largest score, or 0 for an empty map.
    #[must_use]
    pub fn max(&self) -> f64 {
        self.scores.iter().copied().fold(0.0, f64::max)
    }

    /// Absolute threshold for a tick under `method`.
    #[must_use]
    pub fn threshold(&self, method: MatchMethod, tick: u16) -> f64 {
        let max_score = if method.is_normalized() {
            1.0
        } else {
            self.max()
        };
        max_score * threshold_fraction(tick)
    }

    /// Mask of every pixel scoring strictly below `threshold`.
    #[must_use]
    pub fn below(&self, threshold: f64) -> BoolMask {
        let width = self.width as usize;
        BoolMask::from_fn(Dimensions::new(self.width, self.height), |x, y| {
            self.scores[y as usize * width + x as usize] < threshold
        })
    }
}

/// Summed-area table with a zero row and column prepended.
struct Integral {
    stride: usize,
    sums: Vec<f64>,
}

impl Integral {
    fn new(width: usize, height: usize, value: impl Fn(usize, usize) -> f64) -> Self {
        let stride = width + 1;
        let mut sums = vec![0.0; stride * (height + 1)];
        for y in 0..height {
            let mut row = 0.0;
            for x in 0..width {
                row += value(x, y);
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row;
            }
        }
        Self { stride, sums }
    }

    fn window(&self, x: usize, y: usize, w: usize, h: usize) -> f64 {
        let s = self.stride;
        self.sums[(y + h) * s + x + w] - self.sums[y * s + x + w] - self.sums[(y + h) * s + x]
            + self.sums[y * s + x]
    }
}

fn normalize(num: f64, denom: f64, method: MatchMethod) -> f64 {
    if num.abs() < denom {
        num / denom
    } else if num.abs() < denom * 1.125 {
        num.signum()
    } else if method == MatchMethod::SqDiffNormed {
        1.0
    } else {
        0.0
    }
}

/// Score `template` against every position of `image`.
///
/// # Errors
///
/// Returns [`KernelError::DegenerateRegion`] if the template or image has
/// no pixels.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap,
    clippy::many_single_char_names
)]
pub fn match_template(
    image: &GrayImage,
    template: &GrayImage,
    method: MatchMethod,
) -> Result<ScoreMap, KernelError> {
    let (w, h) = image.dimensions();
    let (tw, th) = template.dimensions();
    if w == 0 || h == 0 || tw == 0 || th == 0 {
        return Err(KernelError::DegenerateRegion);
    }

    let left = i64::from(tw / 2);
    let top = i64::from(th / 2);
    let pw = (w + tw - 1) as usize;
    let ph = (h + th - 1) as usize;
    let padded: Vec<f64> = (0..ph)
        .flat_map(|py| {
            (0..pw).map(move |px| {
                let sx = reflect_101(px as i64 - left, w);
                let sy = reflect_101(py as i64 - top, h);
                f64::from(image.get_pixel(sx, sy).0[0])
            })
        })
        .collect();
    let at = |x: usize, y: usize| padded[y * pw + x];
    let sum = Integral::new(pw, ph, at);
    let sum_sq = Integral::new(pw, ph, |x, y| at(x, y) * at(x, y));

    let tpl: Vec<f64> = template.as_raw().iter().map(|&v| f64::from(v)).collect();
    let (twu, thu) = (tw as usize, th as usize);
    let n = tpl.len() as f64;
    let t_sum: f64 = tpl.iter().sum();
    let t_sq: f64 = tpl.iter().map(|v| v * v).sum();
    let t_var = t_sum.mul_add(-t_sum / n, t_sq);

    let mut scores = Vec::with_capacity(w as usize * h as usize);
    for y in 0..h as usize {
        for x in 0..w as usize {
            let mut cross = 0.0;
            for ty in 0..thu {
                let row = (y + ty) * pw + x;
                for tx in 0..twu {
                    cross = tpl[ty * twu + tx].mul_add(padded[row + tx], cross);
                }
            }
            let i_sum = sum.window(x, y, twu, thu);
            let i_sq = sum_sq.window(x, y, twu, thu);
            let score = match method {
                MatchMethod::SqDiff => (2.0f64).mul_add(-cross, t_sq + i_sq).max(0.0),
                MatchMethod::SqDiffNormed => normalize(
                    (2.0f64).mul_add(-cross, t_sq + i_sq).max(0.0),
                    (t_sq * i_sq).sqrt(),
                    method,
                ),
                MatchMethod::CCorr => cross,
                MatchMethod::CCorrNormed => normalize(cross, (t_sq * i_sq).sqrt(), method),
                MatchMethod::CCoeff => t_sum.mul_add(-i_sum / n, cross),
                MatchMethod::CCoeffNormed => {
                    let i_var = i_sum.mul_add(-i_sum / n, i_sq).max(0.0);
                    normalize(
                        t_sum.mul_add(-i_sum / n, cross),
                        (t_var.max(0.0) * i_var).sqrt(),
                        method,
                    )
                }
            };
            scores.push(score);
        }
    }

    Ok(ScoreMap {
        width: w,
        height: h,
        scores,
    })
}

/// Match the `roi` patch of `image` against the whole image and mask
/// every pixel scoring below the tick's threshold.
///
/// # Errors
///
/// Returns [`KernelError::DegenerateRegion`] if `roi` has no area inside
/// the image.
#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
pub fn match_mask(
    image: &GrayImage,
    roi: Region,
    method: MatchMethod,
    tick: u16,
) -> Result<BoolMask, KernelError> {
    let dims = Dimensions::new(image.width(), image.height());
    let clipped = roi.clip(dims).ok_or(KernelError::DegenerateRegion)?;
    let patch = image::imageops::crop_imm(
        image,
        clipped.x as u32,
        clipped.y as u32,
        clipped.width,
        clipped.height,
    )
    .to_image();
    let scores = match_template(image, &patch, method)?;
    let threshold = scores.threshold(method, tick);
    log::debug!(
        "template match {method:?} over {}x{} patch, threshold {threshold}",
        clipped.width,
        clipped.height
    );
    Ok(scores.below(threshold))
}
