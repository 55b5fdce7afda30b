//! Border extrapolation shared by the padded kernels.

/// Map a possibly out-of-range index into `[0, len)` by mirroring about
/// the edge samples without repeating them (`dcb|abcd|cba`).
///
/// `len` must be nonzero.
#[must_use]
pub fn reflect_101(index: i64, len: u32) -> u32 {
    let n = i64::from(len);
    if n <= 1 {
        return 0;
    }
    let period = 2 * (n - 1);
    let mut i = index.rem_euclid(period);
    if i >= n {
        i = period - i;
    }
    u32::try_from(i).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_range_is_identity() {
        for i in 0..5 {
            assert_eq!(reflect_101(i, 5), u32::try_from(i).unwrap_or(99));
        }
    }

    #[test]
    fn mirrors_without_repeating_edge() {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(-2, 5), 2);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(6, 5), 2);
    }

    #[test]
    fn far_indices_wrap_periodically() {
        assert_eq!(reflect_101(-9, 5), 1);
        assert_eq!(reflect_101(13, 5), 3);
    }

    #[test]
    fn single_sample_always_zero() {
        assert_eq!(reflect_101(-3, 1), 0);
        assert_eq!(reflect_101(7, 1), 0);
    }
}
