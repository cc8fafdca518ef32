use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
pub type Fixed64 = I32F32;

/// Simulated milliseconds.
pub type Millis = u64;

/// Convert Fixed64 to f64. Use only for display, never in sim loop.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

/// `num / den` as a fixed-point fraction. A zero denominator yields zero.
#[inline]
pub fn ratio(num: u64, den: u64) -> Fixed64 {
    if den == 0 {
        return Fixed64::ZERO;
    }
    Fixed64::from_num(num)
        .checked_div(Fixed64::from_num(den))
        .unwrap_or(Fixed64::ZERO)
}

/// Clamp a value into `[0, 1]`.
#[inline]
pub fn clamp_unit(v: Fixed64) -> Fixed64 {
    v.clamp(Fixed64::ZERO, Fixed64::from_num(1))
}
