//! Quantization utilities and scalar fixed-point helpers.

use serde::{Deserialize, Serialize};

use crate::tensor::QuantElement;

/// Scale / zero point of one quantized tensor: `real = scale * (q - zero_point)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TensorQuantization {
    pub scale: f32,
    #[serde(default)]
    pub zero_point: i32,
}

impl TensorQuantization {
    pub fn new(scale: f32, zero_point: i32) -> Self { Self { scale, zero_point } }

    pub fn symmetric(scale: f32) -> Self { Self { scale, zero_point: 0 } }
}

/// Splits `x` into a significand in `[0.5, 1)` and a power of two, like C's `frexp`.
pub fn frexp(x: f64) -> (f64, i32) {
    if x == 0.0 || !x.is_finite() { return (x, 0); }
    let bits = x.to_bits();
    let biased = ((bits >> 52) & 0x7ff) as i32;
    if biased == 0 {
        // subnormal: scale into the normal range first
        let (m, e) = frexp(x * 2f64.powi(54));
        return (m, e - 54);
    }
    let significand = f64::from_bits((bits & !(0x7ffu64 << 52)) | (1022u64 << 52));
    (significand, biased - 1022)
}

/// Decomposes a positive real multiplier into a Q31 significand and a shift
/// (positive = left). `multiplier * 2^(shift - 31)` approximates `real_multiplier`.
pub fn quantize_multiplier(real_multiplier: f64) -> (i32, i32) {
    if real_multiplier == 0.0 { return (0, 0); }
    debug_assert!(real_multiplier > 0.0, "negative multiplier {}", real_multiplier);
    let (q, mut shift) = frexp(real_multiplier);
    let mut q_fixed = (q * (1i64 << 31) as f64).round() as i64;
    debug_assert!(q_fixed <= 1i64 << 31);
    if q_fixed == 1i64 << 31 {
        q_fixed /= 2;
        shift += 1;
    }
    // Too small to represent: flush to zero.
    if shift < -31 {
        shift = 0;
        q_fixed = 0;
    }
    (q_fixed as i32, shift)
}

/// Real value represented by a (multiplier, shift) pair.
pub fn dequantize_multiplier(multiplier: i32, shift: i32) -> f64 {
    multiplier as f64 * 2f64.powi(shift - 31)
}

#[inline]
pub fn saturating_rounding_doubling_high_mul(a: i32, b: i32) -> i32 {
    if a == i32::MIN && b == i32::MIN { return i32::MAX; }
    let ab = a as i64 * b as i64;
    let nudge: i64 = if ab >= 0 { 1 << 30 } else { 1 - (1 << 30) };
    ((ab + nudge) / (1i64 << 31)) as i32
}

/// Division by `2^exponent` rounding half away from zero.
#[inline]
pub fn rounding_divide_by_pot(x: i32, exponent: i32) -> i32 {
    debug_assert!(exponent >= 0);
    let exponent = exponent.min(62);
    let x = x as i64;
    let mask = (1i64 << exponent) - 1;
    let remainder = x & mask;
    let threshold = (mask >> 1) + i64::from(x < 0);
    ((x >> exponent) + i64::from(remainder > threshold)) as i32
}

/// `round(x * multiplier * 2^(shift - 31))` for 32-bit operands.
#[inline]
pub fn multiply_by_quantized_multiplier(x: i32, quantized_multiplier: i32, shift: i32) -> i32 {
    let left_shift = shift.clamp(0, 31);
    let right_shift = (-shift).max(0);
    let shifted = ((x as i64) << left_shift).clamp(i32::MIN as i64, i32::MAX as i64) as i32;
    rounding_divide_by_pot(saturating_rounding_doubling_high_mul(shifted, quantized_multiplier), right_shift)
}

/// 64-bit accumulator variant; the multiplier is reduced to 16 bits first.
/// The result saturates to the i32 range.
#[inline]
pub fn multiply_by_quantized_multiplier_i64(x: i64, quantized_multiplier: i32, shift: i32) -> i32 {
    debug_assert!(quantized_multiplier >= 0);
    let reduced: i64 = if quantized_multiplier < 0x7FFF_0000 {
        ((quantized_multiplier as i64) + (1 << 15)) >> 16
    } else {
        0x7FFF
    };
    let total_shift = 15 - shift;
    let prod = x as i128 * reduced as i128;
    let result = if total_shift > 0 {
        (prod + (1i128 << (total_shift - 1))) >> total_shift
    } else {
        prod << (-total_shift).min(64)
    };
    result.clamp(i32::MIN as i128, i32::MAX as i128) as i32
}

/// Base-2 exponent of `x` when it is a power of two (within 1e-3 in log space).
pub fn checked_log2(x: f32) -> Option<i32> {
    let x_log2 = x.log2();
    let rounded = x_log2.round();
    if (x_log2 - rounded).abs() < 1e-3 { Some(rounded as i32) } else { None }
}

/// Float to integer, rounding half away from zero and saturating to `T`.
pub fn quantize<T: QuantElement>(input: &[f32], output: &mut [T], q: TensorQuantization) {
    debug_assert_eq!(input.len(), output.len());
    for (o, &x) in output.iter_mut().zip(input) {
        let v = (x as f64 / q.scale as f64).round() as i64 + q.zero_point as i64;
        *o = T::saturate_from(v);
    }
}

pub fn dequantize<T: QuantElement>(input: &[T], output: &mut [f32], q: TensorQuantization) {
    debug_assert_eq!(input.len(), output.len());
    for (o, &v) in output.iter_mut().zip(input) {
        *o = ((v.to_i64() - q.zero_point as i64) as f64 * q.scale as f64) as f32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frexp_matches_definition() {
        for &x in &[1.0f64, 0.75, 3.0, 1e-9, 123456.789, f64::MIN_POSITIVE / 8.0] {
            let (m, e) = frexp(x);
            assert!((0.5..1.0).contains(&m), "significand {} for {}", m, x);
            // rebuild in two steps so 2^e cannot underflow for subnormals
            assert_eq!(m * 2f64.powi(e + 54) / 2f64.powi(54), x);
        }
        let (m, e) = frexp(f64::MIN_POSITIVE / 8.0);
        assert_eq!((m, e), (0.5, -1024));
        assert_eq!(frexp(0.0), (0.0, 0));
    }

    #[test]
    fn quantize_multiplier_powers_of_two() {
        assert_eq!(quantize_multiplier(0.5), (1 << 30, 0));
        assert_eq!(quantize_multiplier(1.0), (1 << 30, 1));
        assert_eq!(quantize_multiplier(2f64.powi(-15)), (1 << 30, -14));
        assert_eq!(quantize_multiplier(0.0), (0, 0));
        assert_eq!(quantize_multiplier(1e-20), (0, 0));
    }

    #[test]
    fn rounding_divide_rounds_half_away_from_zero() {
        assert_eq!(rounding_divide_by_pot(5, 1), 3);
        assert_eq!(rounding_divide_by_pot(-5, 1), -3);
        assert_eq!(rounding_divide_by_pot(4, 1), 2);
        assert_eq!(rounding_divide_by_pot(-7, 2), -2);
        assert_eq!(rounding_divide_by_pot(9, 0), 9);
    }

    #[test]
    fn multiply_by_quantized_multiplier_tracks_real_scale() {
        let (m, s) = quantize_multiplier(0.3);
        assert_eq!(multiply_by_quantized_multiplier(1000, m, s), 300);
        assert_eq!(multiply_by_quantized_multiplier(-1000, m, s), -300);
        assert_eq!(multiply_by_quantized_multiplier_i64(1000, m, s), 300);
        assert_eq!(multiply_by_quantized_multiplier_i64(-1000, m, s), -300);
        let (m, s) = quantize_multiplier(3.5);
        assert_eq!(multiply_by_quantized_multiplier(100, m, s), 350);
    }

    #[test]
    fn wide_multiply_saturates() {
        let (m, s) = quantize_multiplier(4.0);
        assert_eq!(multiply_by_quantized_multiplier_i64(1i64 << 40, m, s), i32::MAX);
        assert_eq!(multiply_by_quantized_multiplier_i64(-(1i64 << 40), m, s), i32::MIN);
    }

    #[test]
    fn checked_log2_accepts_only_powers_of_two() {
        assert_eq!(checked_log2(2f32.powi(-12)), Some(-12));
        assert_eq!(checked_log2(1.0), Some(0));
        assert_eq!(checked_log2(8.0), Some(3));
        assert_eq!(checked_log2(0.3), None);
        assert_eq!(checked_log2(0.0), None);
        assert_eq!(checked_log2(-0.5), None);
    }

    #[test]
    fn quantize_saturates_and_dequantize_inverts() {
        let q = TensorQuantization::new(0.5, 3);
        let mut out = [0i8; 4];
        quantize(&[1.0, -1.25, 1000.0, -1000.0], &mut out, q);
        assert_eq!(out, [5, 0, 127, -128]);
        let mut back = [0f32; 2];
        dequantize(&out[..2], &mut back, q);
        assert_eq!(back, [1.0, -1.5]);
    }
}
