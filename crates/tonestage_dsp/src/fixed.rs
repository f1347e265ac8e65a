//! Fixed-Point Number Formats
//!
//! Two formats are used across the pipeline:
//!
//! - **Q8.24** for biquad coefficients and filter memory: 8 integer bits
//!   (including sign) and 24 fractional bits, so `1.0 == 1 << 24`.
//! - **Q1.31** ("full scale") for audio samples, limiter gains and the
//!   limiter's one-pole smoothing coefficients: `i32::MAX` is the largest
//!   representable magnitude and stands in for 1.0.

/// Integer bits of the coefficient format (including sign)
pub const INTEGER_BITS: u32 = 8;

/// Fractional bits of the coefficient format
pub const FRACTIONAL_BITS: u32 = 24;

/// 1.0 in Q8.24
pub const FIXED_ONE: i32 = 1 << FRACTIONAL_BITS;

/// Mask selecting the bits discarded when quantizing a Q8.24 product back to
/// a sample. Used for quantization-error feedback.
pub const ERROR_MASK: i64 = (u32::MAX >> INTEGER_BITS) as i64;

/// Largest positive sample magnitude (≈ 1.0 in Q1.31)
pub const FULL_SCALE: i32 = i32::MAX;

/// Convert a real value to Q8.24, rounding to nearest and saturating at the
/// representable range.
#[inline]
pub fn to_q8_24(value: f64) -> i32 {
    let scaled = (value * FIXED_ONE as f64).round();
    if scaled.is_nan() {
        return 0;
    }
    scaled.clamp(i32::MIN as f64, i32::MAX as f64) as i32
}

/// Convert a Q8.24 value back to a real number
#[inline]
pub fn from_q8_24(value: i32) -> f64 {
    value as f64 / FIXED_ONE as f64
}

/// Convert decibels to linear amplitude
/// Formula: amplitude = 10^(dB/20)
#[inline]
pub fn db_to_amplitude(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// Map a threshold in dBFS to a full-scale linear ceiling.
///
/// Thresholds at or above 0 dB (and NaN) map to [`FULL_SCALE`], which
/// effectively disables limiting.
#[inline]
pub fn threshold_to_linear(threshold_db: f64) -> i32 {
    if !(threshold_db < 0.0) {
        return FULL_SCALE;
    }
    // Truncating float → int cast saturates; the product is in [0, FULL_SCALE]
    (db_to_amplitude(threshold_db) * FULL_SCALE as f64) as i32
}

/// One-pole smoothing coefficients `(a, b)` in Q1.31 for a time constant.
///
/// `b = FULL_SCALE / (seconds * sample_rate)` and `a = FULL_SCALE - b`.
/// Time constants shorter than one sample collapse to `b = FULL_SCALE`
/// (no smoothing).
#[inline]
pub fn one_pole_coefficients(seconds: f64, sample_rate: f64) -> (i32, i32) {
    let samples = seconds * sample_rate;
    let samples = if samples.is_nan() { 1.0 } else { samples.max(1.0) };
    let b = ((1.0 / samples) * FULL_SCALE as f64) as i32;
    (FULL_SCALE - b, b)
}

/// Number of whole samples covered by a duration (truncating, never negative)
#[inline]
pub fn seconds_to_samples(seconds: f64, sample_rate: f64) -> usize {
    let samples = seconds * sample_rate;
    if samples.is_nan() || samples <= 0.0 {
        0
    } else {
        samples as usize
    }
}

/// Multiply two Q1.31 values, truncating toward negative infinity
#[inline]
pub fn mul_q31(a: i32, b: i32) -> i32 {
    ((a as i64 * b as i64) >> 31) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_one() {
        assert_eq!(FIXED_ONE, 16_777_216);
        assert_eq!(to_q8_24(1.0), FIXED_ONE);
        assert_eq!(to_q8_24(-1.0), -FIXED_ONE);
        assert_eq!(to_q8_24(0.0), 0);
    }

    #[test]
    fn test_error_mask_keeps_fractional_bits() {
        assert_eq!(ERROR_MASK, 0x00FF_FFFF);
    }

    #[test]
    fn test_to_q8_24_rounds_to_nearest() {
        let lsb = 1.0 / FIXED_ONE as f64;
        assert_eq!(to_q8_24(0.6 * lsb), 1);
        assert_eq!(to_q8_24(0.4 * lsb), 0);
        assert_eq!(to_q8_24(-0.6 * lsb), -1);
    }

    #[test]
    fn test_to_q8_24_saturates() {
        assert_eq!(to_q8_24(1000.0), i32::MAX);
        assert_eq!(to_q8_24(-1000.0), i32::MIN);
        assert_eq!(to_q8_24(f64::NAN), 0);
    }

    #[test]
    fn test_round_trip_within_one_lsb() {
        for value in [0.5, -0.25, 1.999, -3.14159, 127.5] {
            let back = from_q8_24(to_q8_24(value));
            assert!((back - value).abs() <= 1.0 / FIXED_ONE as f64);
        }
    }

    #[test]
    fn test_threshold_mapping() {
        assert_eq!(threshold_to_linear(0.0), FULL_SCALE);
        assert_eq!(threshold_to_linear(3.0), FULL_SCALE);
        assert_eq!(threshold_to_linear(f64::NAN), FULL_SCALE);

        // -6 dBFS ≈ 0.501
        let lin = threshold_to_linear(-6.0);
        let ratio = lin as f64 / FULL_SCALE as f64;
        assert!((ratio - 0.501187).abs() < 1e-5);

        assert_eq!(threshold_to_linear(f64::NEG_INFINITY), 0);
    }

    #[test]
    fn test_one_pole_coefficients_sum_to_full_scale() {
        let (a, b) = one_pole_coefficients(0.002, 48000.0);
        assert_eq!(a + b, FULL_SCALE);
        assert_eq!(b, FULL_SCALE / 96);

        // Shorter than a sample: no smoothing
        let (a, b) = one_pole_coefficients(0.0, 48000.0);
        assert_eq!(b, FULL_SCALE);
        assert_eq!(a, 0);
    }

    #[test]
    fn test_seconds_to_samples() {
        assert_eq!(seconds_to_samples(0.01, 48000.0), 480);
        assert_eq!(seconds_to_samples(0.002, 48000.0), 96);
        assert_eq!(seconds_to_samples(-1.0, 48000.0), 0);
        assert_eq!(seconds_to_samples(f64::NAN, 48000.0), 0);
    }

    #[test]
    fn test_mul_q31() {
        let half = 1 << 30;
        assert_eq!(mul_q31(FULL_SCALE, half), half - 1);
        assert_eq!(mul_q31(half, half), 1 << 29);
        assert_eq!(mul_q31(0, FULL_SCALE), 0);
    }
}
