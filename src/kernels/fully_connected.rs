use crate::quant::{multiply_by_quantized_multiplier, multiply_by_quantized_multiplier_i64};
use crate::tensor::QuantElement;

/// Requantization parameters of one fully-connected projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FullyConnectedParams {
    /// Negated input zero point.
    pub input_offset: i32,
    /// Negated filter zero point.
    pub weights_offset: i32,
    pub output_offset: i32,
    pub output_multiplier: i32,
    pub output_shift: i32,
    pub quantized_activation_min: i32,
    pub quantized_activation_max: i32,
}

/// Accumulator of a fully-connected projection and its requantization.
///
/// `i32` wraps on overflow and rescales with the full 31-bit multiplier;
/// `i64` rescales with the multiplier reduced to 16 bits.
pub trait Accumulator: Copy {
    const ZERO: Self;

    fn mac(self, a: i64, b: i64) -> Self;

    fn add_bias(self, bias: i64) -> Self;

    fn requantize(self, multiplier: i32, shift: i32) -> i32;
}

impl Accumulator for i32 {
    const ZERO: Self = 0;

    #[inline]
    fn mac(self, a: i64, b: i64) -> Self { self.wrapping_add((a * b) as i32) }

    #[inline]
    fn add_bias(self, bias: i64) -> Self { self.wrapping_add(bias as i32) }

    #[inline]
    fn requantize(self, multiplier: i32, shift: i32) -> i32 { multiply_by_quantized_multiplier(self, multiplier, shift) }
}

impl Accumulator for i64 {
    const ZERO: Self = 0;

    #[inline]
    fn mac(self, a: i64, b: i64) -> Self { self + a * b }

    #[inline]
    fn add_bias(self, bias: i64) -> Self { self + bias }

    #[inline]
    fn requantize(self, multiplier: i32, shift: i32) -> i32 { multiply_by_quantized_multiplier_i64(self, multiplier, shift) }
}

/// Quantized `output = W * input + bias`, rescaled and clamped.
///
/// `input` is `[n_batch, accum_depth]`, `weights` is `[output_depth, accum_depth]`
/// and `output` is `[n_batch, output_depth]`; the depths are taken from the slice
/// lengths. `A` is the accumulator width.
pub fn fully_connected<A, I, W, B, O>(
    params: &FullyConnectedParams,
    n_batch: usize,
    input: &[I],
    weights: &[W],
    bias: Option<&[B]>,
    output: &mut [O],
) where
    A: Accumulator,
    I: QuantElement,
    W: QuantElement,
    B: QuantElement,
    O: QuantElement,
{
    if n_batch == 0 { return; }
    let output_depth = output.len() / n_batch;
    let accum_depth = input.len() / n_batch;
    debug_assert_eq!(weights.len(), output_depth * accum_depth, "weight matrix does not match input/output");
    let input_offset = params.input_offset as i64;
    let weights_offset = params.weights_offset as i64;
    let min = params.quantized_activation_min as i64;
    let max = params.quantized_activation_max as i64;

    for (x, out_row) in input.chunks_exact(accum_depth.max(1)).zip(output.chunks_exact_mut(output_depth.max(1))) {
        for (o, out) in out_row.iter_mut().enumerate() {
            let row = &weights[o * accum_depth..(o + 1) * accum_depth];
            let mut acc = A::ZERO;
            for (w, v) in row.iter().zip(x) {
                acc = acc.mac(w.to_i64() + weights_offset, v.to_i64() + input_offset);
            }
            if let Some(bias) = bias { acc = acc.add_bias(bias[o].to_i64()); }
            let scaled = acc.requantize(params.output_multiplier, params.output_shift) as i64 + params.output_offset as i64;
            *out = O::saturate_from(scaled.clamp(min, max));
        }
    }
}
