use crate::kernels::{cwise_add_assign, fully_connected, logistic_in_place, tanh_in_place};
use crate::lstm::params::{FusedActivation, GateParameters};
use crate::lstm::step::StepManager;
use crate::lstm::tensors::GateTensors;
use crate::lstm::types::{CellType, LstmConfig};

/// One gate for the current step:
/// `gate_output = activation(FC(input) + FC(hidden))`.
///
/// `input` and `recurrent` are the whole input and hidden-state tensors; the
/// step manager selects the slices. The input projection accumulates in i64 and
/// the recurrent one in i32. `fc_output_buffer` receives the recurrent
/// projection and is clobbered.
///
/// # Panics
/// On any activation other than sigmoid or tanh. Preparation rejects those,
/// so reaching this is a programming error.
#[allow(clippy::too_many_arguments)]
pub fn calculate_lstm_gate<C: LstmConfig>(
    step: &StepManager,
    params: &GateParameters,
    tensors: &GateTensors<'_, C>,
    input: &[C::Activation],
    recurrent: &[C::Activation],
    gate_output: &mut [CellType],
    fc_output_buffer: &mut [CellType],
    activation: FusedActivation,
) {
    let (rows, _) = step.input_shape();
    let input_start = step.input_offset();
    let input = &input[input_start..input_start + step.input_len()];
    let hidden_start = step.hidden_state_offset();
    let recurrent = &recurrent[hidden_start..hidden_start + step.state_len()];

    fully_connected::<i64, _, _, _, _>(&params.input_fc_params, rows, input, tensors.input_weight, tensors.bias, gate_output);
    fully_connected::<i32, _, _, _, _>(
        &params.recurrent_fc_params,
        rows,
        recurrent,
        tensors.recurrent_weight,
        tensors.recurrent_bias,
        fc_output_buffer,
    );
    cwise_add_assign(gate_output, fc_output_buffer);

    match activation {
        FusedActivation::Sigmoid => logistic_in_place(0, 0, gate_output),
        FusedActivation::Tanh => tanh_in_place(0, 0, gate_output),
        other => panic!("unsupported LSTM gate activation {:?}", other),
    }
}
