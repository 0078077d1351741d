//! Helpers for sizing NDRanges.

/// Number of `divisor`-sized groups needed to cover `dividend`. Zero for a
/// zero divisor.
pub fn div_up(dividend: usize, divisor: usize) -> usize {
    if divisor == 0 {
        return 0;
    }
    dividend.div_ceil(divisor)
}

/// Smallest power of two not below `value`. Zero stays zero.
pub fn next_power_of_two(value: u32) -> u32 {
    if value == 0 {
        return 0;
    }
    value.checked_next_power_of_two().unwrap_or(0)
}

/// `value` rounded up to a multiple of `base`. Zero for a zero base.
pub fn to_multiple_of(value: usize, base: usize) -> usize {
    div_up(value, base) * base
}

/// Global work size covering `extent` items with local groups of `local`.
pub fn global_size(extent: [usize; 3], local: [usize; 3]) -> [usize; 3] {
    [
        to_multiple_of(extent[0], local[0]),
        to_multiple_of(extent[1], local[1]),
        to_multiple_of(extent[2], local[2]),
    ]
}
