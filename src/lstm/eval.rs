use log::{debug, trace};

use crate::error::{LstmError, Status};
use crate::lstm::gate::calculate_lstm_gate;
use crate::lstm::params::{FusedActivation, OpDataLstm};
use crate::lstm::step::StepManager;
use crate::lstm::tensors::{LstmKernelContents, ScratchBuffers};
use crate::lstm::types::LstmConfig;
use crate::lstm::update::{update_lstm_cell, update_lstm_hidden};

/// Runs one time step for the rows selected by `step`, then copies the new
/// hidden state into the output tensor at the step's output offset.
pub fn lstm_step<C: LstmConfig>(
    step: &StepManager,
    op_data: &OpDataLstm,
    contents: &mut LstmKernelContents<'_, C>,
    scratch: &mut ScratchBuffers,
) {
    let len = step.state_len();
    let [b0, b1, b2, b3] = scratch.split(len);
    let inter = &op_data.inter_gate_parameters;

    calculate_lstm_gate::<C>(
        step,
        &op_data.forget_gate_parameters,
        &contents.forget_gate,
        contents.input,
        &*contents.hidden_state,
        b0,
        b3,
        FusedActivation::Sigmoid,
    );
    calculate_lstm_gate::<C>(
        step,
        &op_data.input_gate_parameters,
        &contents.input_gate,
        contents.input,
        &*contents.hidden_state,
        b1,
        b3,
        FusedActivation::Sigmoid,
    );
    calculate_lstm_gate::<C>(
        step,
        &op_data.cell_gate_parameters,
        &contents.cell_gate,
        contents.input,
        &*contents.hidden_state,
        b2,
        b3,
        op_data.cell_gate_nonlinear_type,
    );

    update_lstm_cell(
        step,
        contents.cell_state,
        b0,
        b1,
        b2,
        &inter.forget_cell_mul_params,
        &inter.input_mul_params,
        b3,
        op_data.cell_state_info.quantized_cell_clip,
    );

    // input gate output is dead once the cell is updated
    calculate_lstm_gate::<C>(
        step,
        &op_data.output_gate_parameters,
        &contents.output_gate,
        contents.input,
        &*contents.hidden_state,
        b1,
        b3,
        FusedActivation::Sigmoid,
    );

    update_lstm_hidden(
        step,
        contents.cell_state,
        contents.hidden_state,
        b1,
        &inter.output_mul_params,
        op_data.cell_state_info.cell_state_scale_power,
        b0,
    );

    let hidden = step.hidden_state_offset();
    let out = step.output_offset();
    contents.output[out..out + len].copy_from_slice(&contents.hidden_state[hidden..hidden + len]);
    trace!("lstm step t={} b={} output offset {}", step.current_time(), step.current_batch(), out);
}

/// Evaluates the whole sequence. Time-major input runs every batch row in one
/// step per time index; batch-major input walks the time steps of one row
/// before moving to the next.
pub fn eval_lstm<C: LstmConfig>(
    op_data: &OpDataLstm,
    contents: &mut LstmKernelContents<'_, C>,
    scratch: &mut ScratchBuffers,
) -> Status {
    let size = op_data.size_info;
    let mut step = StepManager::new(size);
    if scratch.buffer_len() < step.state_len() {
        return Status::from(Err::<(), _>(LstmError::ScratchTooSmall {
            expected: step.state_len(),
            found: scratch.buffer_len(),
        }));
    }
    debug!(
        "lstm sequence: {:?}, batch {}, steps {}, time major {}",
        C::SCHEME,
        size.batch_size,
        size.time_steps,
        size.time_major
    );

    if size.time_major {
        for _ in 0..size.time_steps {
            lstm_step(&step, op_data, contents, scratch);
            step.update_time();
        }
    } else {
        for _ in 0..size.batch_size {
            for _ in 0..size.time_steps {
                lstm_step(&step, op_data, contents, scratch);
                step.update_time();
            }
            step.update_batch();
            step.reset_time();
        }
    }
    Status::Ok
}
