//! Cell and hidden state updates for one step.

use crate::kernels::{cwise_add_assign, cwise_clipping, mul_elementwise, mul_elementwise_assign, tanh, ArithmeticParams};
use crate::lstm::step::StepManager;
use crate::lstm::types::CellType;
use crate::tensor::QuantElement;

/// `cell = clip(forget * cell + input_gate * cell_gate)` over the step's state slice.
///
/// `buffer` receives the `input_gate * cell_gate` product. Clipping is skipped
/// when `quantized_cell_clip` is not positive.
#[allow(clippy::too_many_arguments)]
pub fn update_lstm_cell(
    step: &StepManager,
    cell_state: &mut [CellType],
    forget_gate_output: &[CellType],
    input_gate_output: &[CellType],
    cell_gate_output: &[CellType],
    forget_cell_mul_params: &ArithmeticParams,
    input_mul_params: &ArithmeticParams,
    buffer: &mut [CellType],
    quantized_cell_clip: CellType,
) {
    let start = step.cell_state_offset();
    let cell = &mut cell_state[start..start + step.state_len()];

    mul_elementwise_assign(forget_cell_mul_params, forget_gate_output, cell);
    mul_elementwise(input_mul_params, input_gate_output, cell_gate_output, buffer);
    cwise_add_assign(cell, buffer);

    if quantized_cell_clip > 0 {
        cwise_clipping(cell, quantized_cell_clip);
    }
}

/// `hidden = tanh(cell) * output_gate` over the step's state slice.
///
/// `buffer` receives `tanh(cell)`. When the cell scale is finer than Q3.12 the
/// cell state is right-shifted in place to Q3.12 before the tanh, so the stored
/// state loses those low bits.
pub fn update_lstm_hidden<A: QuantElement>(
    step: &StepManager,
    cell_state: &mut [CellType],
    hidden_state: &mut [A],
    output_gate_output: &[CellType],
    mul_params: &ArithmeticParams,
    cell_state_scale_power: i32,
    buffer: &mut [CellType],
) {
    let len = step.state_len();
    let start = step.cell_state_offset();
    let cell = &mut cell_state[start..start + len];

    let mut tanh_left_shift = 15 + cell_state_scale_power - 3;
    if tanh_left_shift < 0 {
        let right_shift = (-tanh_left_shift).min(15);
        cell.iter_mut().for_each(|c| *c >>= right_shift);
        tanh_left_shift = 0;
    }
    tanh(0, tanh_left_shift, cell, buffer);

    let start = step.hidden_state_offset();
    mul_elementwise(mul_params, buffer, output_gate_output, &mut hidden_state[start..start + len]);
}
