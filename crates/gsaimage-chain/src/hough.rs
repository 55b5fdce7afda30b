//! Straight-line Hough transform: accumulator, peak extraction and a
//! progressive probabilistic segment search.
//!
//! Angles are sampled at one degree from -90 to 89. A pixel is
//! foreground when it is nonzero after inversion, i.e. darker than white
//! in the source. The segment search visits foreground pixels in raster
//! order instead of at random, so results are reproducible run to run.

use image::GrayImage;

use crate::edge::invert;
use crate::types::Point;

/// Number of sampled angles.
pub const THETA_BINS: usize = 180;

const FIXED_SHIFT: u32 = 16;

/// Angle of bin `index` in radians.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn theta_radians(index: usize) -> f64 {
    (index as f64 - 90.0).to_radians()
}

/// Angle of bin `index` in degrees.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn theta_degrees(index: usize) -> f64 {
    index as f64 - 90.0
}

/// `(cos, sin)` for every angle bin.
fn trig_table() -> Vec<(f64, f64)> {
    (0..THETA_BINS)
        .map(|i| {
            let t = theta_radians(i);
            (t.cos(), t.sin())
        })
        .collect()
}

/// Nonzero-after-inversion foreground mask.
#[must_use]
pub fn foreground(image: &GrayImage) -> GrayImage {
    let mut fg = invert(image);
    fg.iter_mut().for_each(|s| *s = if *s > 0 { u8::MAX } else { 0 });
    fg
}

#[allow(clippy::cast_possible_truncation)]
fn rho_index(x: u32, y: u32, (cos, sin): (f64, f64), offset: i64) -> usize {
    let rho = cos.mul_add(f64::from(x), sin * f64::from(y)).round() as i64;
    usize::try_from(rho + offset).unwrap_or(0)
}

/// Vote counts indexed by `(rho, theta)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoughAccumulator {
    offset: u32,
    votes: Vec<u32>,
}

impl HoughAccumulator {
    /// Accumulate votes for every foreground pixel of `image`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn compute(image: &GrayImage) -> Self {
        let offset = f64::from(image.width())
            .hypot(f64::from(image.height()))
            .ceil() as u32;
        let rho_bins = 2 * offset as usize + 1;
        let mut votes = vec![0u32; rho_bins * THETA_BINS];
        let trig = trig_table();
        let fg = foreground(image);
        for (x, y, p) in fg.enumerate_pixels() {
            if p.0[0] == 0 {
                continue;
            }
            for (t, &cs) in trig.iter().enumerate() {
                let r = rho_index(x, y, cs, i64::from(offset));
                votes[r * THETA_BINS + t] += 1;
            }
        }
        log::debug!(
            "hough accumulator: {rho_bins}x{THETA_BINS} bins for {}x{} input",
            image.width(),
            image.height()
        );
        Self { offset, votes }
    }

    /// Distance offset added to every rho before indexing.
    #[must_use]
    pub const fn offset(&self) -> u32 {
        self.offset
    }

    /// Number of distance bins.
    #[must_use]
    pub fn rho_bins(&self) -> usize {
        self.votes.len() / THETA_BINS
    }

    /// Votes at `(rho_index, theta_index)`.
    #[must_use]
    pub fn get(&self, rho_index: usize, theta_index: usize) -> u32 {
        self.votes
            .get(rho_index * THETA_BINS + theta_index)
            .copied()
            .unwrap_or(0)
    }

    /// Largest vote count.
    #[must_use]
    pub fn max(&self) -> u32 {
        self.votes.iter().copied().max().unwrap_or(0)
    }
}

/// One accepted accumulator peak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinePeak {
    /// Votes at the peak.
    pub votes: u32,
    /// Distance bin (rho + offset).
    pub rho_index: usize,
    /// Angle bin.
    pub theta_index: usize,
}

/// Vote threshold for a tick in `[1, 200]`: `max * tick / 200`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn peak_threshold(max_votes: u32, tick: u32) -> f64 {
    f64::from(max_votes) * f64::from(tick.clamp(1, 200)) / 200.0
}

/// Extract peaks strongest-first, suppressing any candidate closer than
/// `min_distance` rho bins and `min_angle` degrees to an accepted peak.
#[must_use = "returns the accepted peaks"]
pub fn line_peaks(
    acc: &HoughAccumulator,
    min_distance: u32,
    min_angle: u32,
    threshold_tick: u32,
) -> Vec<LinePeak> {
    let threshold = peak_threshold(acc.max(), threshold_tick);
    let mut candidates: Vec<LinePeak> = acc
        .votes
        .iter()
        .enumerate()
        .filter(|&(_, &v)| v > 0 && f64::from(v) >= threshold)
        .map(|(i, &votes)| LinePeak {
            votes,
            rho_index: i / THETA_BINS,
            theta_index: i % THETA_BINS,
        })
        .collect();
    candidates.sort_by(|a, b| b.votes.cmp(&a.votes));

    let min_distance = usize::try_from(min_distance).unwrap_or(usize::MAX);
    let min_angle = usize::try_from(min_angle).unwrap_or(usize::MAX);
    let mut peaks: Vec<LinePeak> = Vec::new();
    for c in candidates {
        let suppressed = peaks.iter().any(|p| {
            p.rho_index.abs_diff(c.rho_index) < min_distance
                && p.theta_index.abs_diff(c.theta_index) < min_angle
        });
        if !suppressed {
            peaks.push(c);
        }
    }
    peaks
}

/// Count of peaks per angle bin.
#[must_use]
pub fn peak_angle_histogram(peaks: &[LinePeak]) -> Vec<f64> {
    let mut hist = vec![0.0; THETA_BINS];
    for p in peaks {
        if let Some(bin) = hist.get_mut(p.theta_index) {
            *bin += 1.0;
        }
    }
    hist
}

/// Parameters for [`probabilistic_lines`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentSearch {
    /// Votes a line needs before it is walked.
    pub threshold: u32,
    /// Minimum accepted segment extent along either axis.
    pub line_length: u32,
    /// Largest run of background pixels bridged inside a segment.
    pub line_gap: u32,
}

/// Fixed-point walk along one line direction.
#[derive(Clone, Copy)]
struct Walk {
    x0: i64,
    y0: i64,
    dx0: i64,
    dy0: i64,
    x_major: bool,
}

impl Walk {
    #[allow(clippy::cast_possible_truncation)]
    fn new(x: u32, y: u32, (cos, sin): (f64, f64)) -> Self {
        let a = -sin;
        let b = cos;
        let one = f64::from(1u32 << FIXED_SHIFT);
        let half = 1i64 << (FIXED_SHIFT - 1);
        let (x, y) = (i64::from(x), i64::from(y));
        if a.abs() > b.abs() {
            Self {
                x0: x,
                y0: (y << FIXED_SHIFT) + half,
                dx0: if a > 0.0 { 1 } else { -1 },
                dy0: (b * one / a.abs()).round() as i64,
                x_major: true,
            }
        } else {
            Self {
                x0: (x << FIXED_SHIFT) + half,
                y0: y,
                dx0: (a * one / b.abs()).round() as i64,
                dy0: if b > 0.0 { 1 } else { -1 },
                x_major: false,
            }
        }
    }

    /// Pixel positions visited walking away from the seed.
    fn steps(self, backward: bool) -> impl Iterator<Item = (i64, i64)> {
        let (dx, dy) = if backward {
            (-self.dx0, -self.dy0)
        } else {
            (self.dx0, self.dy0)
        };
        (0i64..).map(move |n| {
            let px = self.x0 + n * dx;
            let py = self.y0 + n * dy;
            if self.x_major {
                (px, py >> FIXED_SHIFT)
            } else {
                (px >> FIXED_SHIFT, py)
            }
        })
    }
}

/// Progressive probabilistic Hough restricted to `theta_indices`.
///
/// Returns segment endpoints in pixel coordinates.
#[must_use = "returns the detected segments"]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::too_many_lines
)]
pub fn probabilistic_lines(
    image: &GrayImage,
    theta_indices: &[usize],
    search: SegmentSearch,
) -> Vec<(Point, Point)> {
    let (w, h) = image.dimensions();
    if theta_indices.is_empty() || w == 0 || h == 0 {
        return Vec::new();
    }
    let all = trig_table();
    let trig: Vec<(f64, f64)> = theta_indices
        .iter()
        .filter_map(|&i| all.get(i).copied())
        .collect();
    let offset = i64::from(w).max(i64::from(h)) * 2;
    let rho_bins = usize::try_from(2 * offset + 1).unwrap_or(0);
    let mut accum = vec![0u32; rho_bins * trig.len()];
    let fg = foreground(image);
    let mut mask: Vec<bool> = fg.as_raw().iter().map(|&v| v > 0).collect();
    let width = w as usize;
    let in_bounds = |x: i64, y: i64| x >= 0 && y >= 0 && x < i64::from(w) && y < i64::from(h);
    let mut lines = Vec::new();

    for y in 0..h {
        for x in 0..w {
            if !mask[y as usize * width + x as usize] {
                continue;
            }
            let mut best = search.threshold.saturating_sub(1);
            let mut best_theta = None;
            for (t, &cs) in trig.iter().enumerate() {
                let cell = &mut accum[rho_index(x, y, cs, offset) * trig.len() + t];
                *cell += 1;
                if *cell > best {
                    best = *cell;
                    best_theta = Some(t);
                }
            }
            let Some(t) = best_theta else {
                continue;
            };
            if best < search.threshold {
                continue;
            }

            let walk = Walk::new(x, y, trig[t]);
            let mut ends = [(i64::from(x), i64::from(y)); 2];
            for (k, end) in ends.iter_mut().enumerate() {
                let mut gap = 0u32;
                for (x1, y1) in walk.steps(k > 0) {
                    if !in_bounds(x1, y1) {
                        break;
                    }
                    gap += 1;
                    if mask[y1 as usize * width + x1 as usize] {
                        gap = 0;
                        *end = (x1, y1);
                    } else if gap > search.line_gap {
                        break;
                    }
                }
            }

            let span_x = ends[0].0.abs_diff(ends[1].0);
            let span_y = ends[0].1.abs_diff(ends[1].1);
            let good = span_x >= u64::from(search.line_length)
                || span_y >= u64::from(search.line_length);

            for (k, end) in ends.iter().enumerate() {
                for (x1, y1) in walk.steps(k > 0) {
                    if !in_bounds(x1, y1) {
                        break;
                    }
                    let idx = y1 as usize * width + x1 as usize;
                    if mask[idx] {
                        if good {
                            let (ux, uy) = (x1 as u32, y1 as u32);
                            for (j, &cs) in trig.iter().enumerate() {
                                let cell = &mut accum[rho_index(ux, uy, cs, offset) * trig.len() + j];
                                *cell = cell.saturating_sub(1);
                            }
                        }
                        mask[idx] = false;
                    }
                    if (x1, y1) == *end {
                        break;
                    }
                }
            }

            if good {
                lines.push((
                    Point::new(ends[0].0 as f64, ends[0].1 as f64),
                    Point::new(ends[1].0 as f64, ends[1].1 as f64),
                ));
            }
        }
    }
    log::debug!("probabilistic hough: {} segment(s)", lines.len());
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn horizontal_line_image() -> GrayImage {
        GrayImage::from_fn(60, 40, |x, y| {
            image::Luma([if y == 20 && (5..55).contains(&x) { 0 } else { 255 }])
        })
    }

    #[test]
    fn white_image_has_empty_accumulator() {
        let acc = HoughAccumulator::compute(&GrayImage::from_pixel(10, 10, image::Luma([255])));
        assert_eq!(acc.max(), 0);
        assert!(line_peaks(&acc, 9, 10, 100).is_empty());
    }

    #[test]
    fn accumulator_size_follows_diagonal() {
        let acc = HoughAccumulator::compute(&GrayImage::new(3, 4));
        assert_eq!(acc.offset(), 5);
        assert_eq!(acc.rho_bins(), 11);
    }

    #[test]
    fn horizontal_line_peaks_at_ninety_degrees() {
        let acc = HoughAccumulator::compute(&horizontal_line_image());
        assert_eq!(acc.max(), 50);
        let peaks = line_peaks(&acc, 9, 10, 100);
        assert!(!peaks.is_empty());
        let top = peaks[0];
        assert_eq!(top.votes, 50);
        assert!((theta_degrees(top.theta_index).abs() - 90.0).abs() < 1e-9);
        let hist = peak_angle_histogram(&peaks);
        assert!(hist[top.theta_index] >= 1.0);
    }

    #[test]
    fn nearby_candidates_are_suppressed() {
        let acc = HoughAccumulator::compute(&horizontal_line_image());
        let loose = line_peaks(&acc, 1, 1, 100);
        let strict = line_peaks(&acc, 9, 10, 100);
        assert!(strict.len() <= loose.len());
        for (i, a) in strict.iter().enumerate() {
            for b in &strict[i + 1..] {
                assert!(
                    a.rho_index.abs_diff(b.rho_index) >= 9
                        || a.theta_index.abs_diff(b.theta_index) >= 10
                );
            }
        }
    }

    #[test]
    fn threshold_tick_scales_with_max() {
        assert!((peak_threshold(1000, 100) - 500.0).abs() < 1e-9);
        assert!((peak_threshold(1000, 200) - 1000.0).abs() < 1e-9);
        assert!((peak_threshold(1000, 0) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn segment_search_finds_the_line() {
        let img = horizontal_line_image();
        let segments = probabilistic_lines(
            &img,
            &[0],
            SegmentSearch {
                threshold: 10,
                line_length: 30,
                line_gap: 3,
            },
        );
        assert_eq!(segments.len(), 1);
        let (a, b) = segments[0];
        assert!((a.y - 20.0).abs() < 1e-9 && (b.y - 20.0).abs() < 1e-9);
        assert!((a.x - b.x).abs() >= 30.0);
    }

    #[test]
    fn segment_search_is_deterministic() {
        let img = horizontal_line_image();
        let search = SegmentSearch {
            threshold: 10,
            line_length: 30,
            line_gap: 3,
        };
        assert_eq!(
            probabilistic_lines(&img, &[0, 1], search),
            probabilistic_lines(&img, &[0, 1], search)
        );
    }

    #[test]
    fn no_angles_no_segments() {
        let segments = probabilistic_lines(
            &horizontal_line_image(),
            &[],
            SegmentSearch {
                threshold: 1,
                line_length: 1,
                line_gap: 1,
            },
        );
        assert!(segments.is_empty());
    }
}
