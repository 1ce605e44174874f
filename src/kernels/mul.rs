use crate::quant::multiply_by_quantized_multiplier;
use crate::tensor::QuantElement;

/// Parameters of a quantized elementwise binary op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArithmeticParams {
    pub input1_offset: i32,
    pub input2_offset: i32,
    pub output_offset: i32,
    pub output_multiplier: i32,
    pub output_shift: i32,
    pub quantized_activation_min: i32,
    pub quantized_activation_max: i32,
}

#[inline]
fn mul_one(params: &ArithmeticParams, a: i32, b: i32) -> i64 {
    let a = params.input1_offset + a;
    let b = params.input2_offset + b;
    let prod = multiply_by_quantized_multiplier(a.saturating_mul(b), params.output_multiplier, params.output_shift);
    (params.output_offset as i64 + prod as i64)
        .clamp(params.quantized_activation_min as i64, params.quantized_activation_max as i64)
}

/// `output[i] = clamp(rescale((a[i] + off1) * (b[i] + off2)) + out_off)`.
pub fn mul_elementwise<O: QuantElement>(params: &ArithmeticParams, input1: &[i16], input2: &[i16], output: &mut [O]) {
    debug_assert!(input1.len() == output.len() && input2.len() == output.len());
    for ((o, &a), &b) in output.iter_mut().zip(input1).zip(input2) {
        *o = O::saturate_from(mul_one(params, a as i32, b as i32));
    }
}

/// In-place form: `inout[i] = input[i] * inout[i]`.
pub fn mul_elementwise_assign(params: &ArithmeticParams, input: &[i16], inout: &mut [i16]) {
    debug_assert_eq!(input.len(), inout.len());
    for (o, &a) in inout.iter_mut().zip(input) {
        *o = i16::saturate_from(mul_one(params, a as i32, *o as i32));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quant::quantize_multiplier;

    fn q15_params<O: QuantElement>(output_offset: i32) -> ArithmeticParams {
        // Q0.15 x Q0.15 -> Q0.15
        let (m, s) = quantize_multiplier(2f64.powi(-15));
        ArithmeticParams {
            output_offset,
            output_multiplier: m,
            output_shift: s,
            quantized_activation_min: O::MIN as i32,
            quantized_activation_max: O::MAX as i32,
            ..Default::default()
        }
    }

    #[test]
    fn q15_products() {
        let half = 1 << 14;
        let mut out = [0i16; 3];
        mul_elementwise(&q15_params::<i16>(0), &[half, -half, i16::MAX], &[half, half, i16::MAX], &mut out);
        assert_eq!(out, [1 << 13, -(1 << 13), 32766]);

        let mut inout = [half, 100];
        mul_elementwise_assign(&q15_params::<i16>(0), &[half, half], &mut inout);
        assert_eq!(inout, [1 << 13, 50]);
    }

    #[test]
    fn narrow_output_saturates_with_offset() {
        let (m, s) = quantize_multiplier(2f64.powi(-15 - 15 + 7));
        let params = ArithmeticParams {
            output_offset: 10,
            output_multiplier: m,
            output_shift: s,
            quantized_activation_min: -128,
            quantized_activation_max: 127,
            ..Default::default()
        };
        let mut out = [0i8; 2];
        mul_elementwise(&params, &[i16::MAX, 0], &[i16::MAX, i16::MAX], &mut out);
        assert_eq!(out, [127, 10]);
    }
}
