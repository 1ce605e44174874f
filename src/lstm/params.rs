//! Quantization parameter derivation.
//!
//! Everything here runs once per operator instance. The derived
//! [`OpDataLstm`] is cached by the operator and shared by every step.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::LstmError;
use crate::kernels::{ArithmeticParams, FullyConnectedParams};
use crate::lstm::types::{CellType, QuantScheme};
use crate::quant::{checked_log2, quantize_multiplier, TensorQuantization};

/// Fused activation codes as they appear in model metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusedActivation {
    None,
    Relu,
    ReluN1To1,
    Relu6,
    #[default]
    Tanh,
    SignBit,
    Sigmoid,
}

/// Builtin operator options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LstmParams {
    /// Nonlinearity of the cell-candidate gate.
    #[serde(default)]
    pub activation: FusedActivation,
    /// Real-valued cell clip; 0 disables clipping.
    #[serde(default)]
    pub cell_clip: f32,
    #[serde(default)]
    pub time_major: bool,
}

impl Default for LstmParams {
    fn default() -> Self { Self { activation: FusedActivation::Tanh, cell_clip: 0.0, time_major: false } }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateQuantization {
    pub activation_weight: TensorQuantization,
    pub recurrent_weight: TensorQuantization,
}

pub const DEFAULT_NONLINEAR_INPUT_SCALE: f32 = 1.0 / 4096.0; // Q3.12
pub const DEFAULT_NONLINEAR_OUTPUT_SCALE: f32 = 1.0 / 32768.0; // Q0.15

fn default_nonlinear_input_scale() -> f32 { DEFAULT_NONLINEAR_INPUT_SCALE }
fn default_nonlinear_output_scale() -> f32 { DEFAULT_NONLINEAR_OUTPUT_SCALE }

/// Per-tensor quantization of a whole LSTM model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LstmQuantization {
    pub input: TensorQuantization,
    /// Also the quantization of the output tensor.
    pub hidden_state: TensorQuantization,
    pub cell_state: TensorQuantization,
    pub forget_gate: GateQuantization,
    pub input_gate: GateQuantization,
    pub cell_gate: GateQuantization,
    pub output_gate: GateQuantization,
    #[serde(default = "default_nonlinear_input_scale")]
    pub nonlinear_activation_input_scale: f32,
    #[serde(default = "default_nonlinear_output_scale")]
    pub nonlinear_activation_output_scale: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GateParameters {
    pub input_fc_params: FullyConnectedParams,
    pub recurrent_fc_params: FullyConnectedParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InterGateParameters {
    /// forget gate x cell state -> cell state
    pub forget_cell_mul_params: ArithmeticParams,
    /// input gate x cell gate -> cell state
    pub input_mul_params: ArithmeticParams,
    /// tanh(cell state) x output gate -> hidden state
    pub output_mul_params: ArithmeticParams,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellStateInfo {
    pub cell_clip: f32,
    pub quantized_cell_clip: CellType,
    /// `2^cell_state_scale_power` is the cell state scale.
    pub cell_state_scale_power: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LstmSizeInfo {
    pub time_major: bool,
    pub batch_size: usize,
    pub time_steps: usize,
    pub input_dimension: usize,
    pub state_dimension: usize,
}

impl LstmSizeInfo {
    /// Sizes from a rank-3 input shape (`[T, B, I]` time-major, `[B, T, I]` otherwise).
    pub fn from_input_shape(input_dims: &[usize], state_dimension: usize, time_major: bool) -> Result<Self, LstmError> {
        if input_dims.len() != 3 {
            return Err(LstmError::InvalidInputRank(input_dims.to_vec()));
        }
        let (batch_size, time_steps) = if time_major { (input_dims[1], input_dims[0]) } else { (input_dims[0], input_dims[1]) };
        Ok(Self { time_major, batch_size, time_steps, input_dimension: input_dims[2], state_dimension })
    }

    pub fn input_len(&self) -> usize { self.batch_size * self.time_steps * self.input_dimension }

    pub fn state_len(&self) -> usize { self.batch_size * self.state_dimension }

    pub fn output_len(&self) -> usize { self.batch_size * self.time_steps * self.state_dimension }
}

/// Operator state built at preparation time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpDataLstm {
    pub size_info: LstmSizeInfo,
    pub cell_gate_nonlinear_type: FusedActivation,
    pub forget_gate_parameters: GateParameters,
    pub input_gate_parameters: GateParameters,
    pub cell_gate_parameters: GateParameters,
    pub output_gate_parameters: GateParameters,
    pub inter_gate_parameters: InterGateParameters,
    pub cell_state_info: CellStateInfo,
}

/// FC parameters producing a Q3.12 (or `nonlinear_input_scale`) int16 gate input.
pub fn create_fc_params(input: TensorQuantization, weight: TensorQuantization, nonlinear_input_scale: f32) -> FullyConnectedParams {
    let effective_scale = input.scale as f64 * weight.scale as f64 / nonlinear_input_scale as f64;
    let (output_multiplier, output_shift) = quantize_multiplier(effective_scale);
    FullyConnectedParams {
        input_offset: -input.zero_point,
        // weights and gate outputs are symmetric
        weights_offset: 0,
        output_offset: 0,
        output_multiplier,
        output_shift,
        quantized_activation_min: CellType::MIN as i32,
        quantized_activation_max: CellType::MAX as i32,
    }
}

pub fn create_gate_params(
    input: TensorQuantization,
    hidden_state: TensorQuantization,
    gate: &GateQuantization,
    nonlinear_input_scale: f32,
) -> GateParameters {
    GateParameters {
        input_fc_params: create_fc_params(input, gate.activation_weight, nonlinear_input_scale),
        recurrent_fc_params: create_fc_params(hidden_state, gate.recurrent_weight, nonlinear_input_scale),
    }
}

pub fn create_inter_gate_mul_params(
    input1_scale: f32,
    input2_scale: f32,
    output_scale: f32,
    output_zero_point: i32,
    (min, max): (i32, i32),
) -> ArithmeticParams {
    let effective_scale = input1_scale as f64 * input2_scale as f64 / output_scale as f64;
    let (output_multiplier, output_shift) = quantize_multiplier(effective_scale);
    ArithmeticParams {
        input1_offset: 0,
        input2_offset: 0,
        output_offset: output_zero_point,
        output_multiplier,
        output_shift,
        quantized_activation_min: min,
        quantized_activation_max: max,
    }
}

pub fn create_inter_gate_params(q: &LstmQuantization, activation_bounds: (i32, i32)) -> InterGateParameters {
    let cell_bounds = (CellType::MIN as i32, CellType::MAX as i32);
    let nl_out = q.nonlinear_activation_output_scale;
    InterGateParameters {
        forget_cell_mul_params: create_inter_gate_mul_params(nl_out, q.cell_state.scale, q.cell_state.scale, 0, cell_bounds),
        input_mul_params: create_inter_gate_mul_params(nl_out, nl_out, q.cell_state.scale, 0, cell_bounds),
        output_mul_params: create_inter_gate_mul_params(
            nl_out,
            nl_out,
            q.hidden_state.scale,
            q.hidden_state.zero_point,
            activation_bounds,
        ),
    }
}

/// Real clip bound expressed in cell-state units, saturated to int16.
pub fn quantize_cell_clip(cell_clip: f32, cell_scale: f32) -> CellType {
    (cell_clip as f64 / cell_scale as f64).clamp(-32768.0, 32767.0) as CellType
}

pub fn cell_state_scale_power(cell_scale: f32) -> Result<i32, LstmError> {
    checked_log2(cell_scale).ok_or(LstmError::CellScaleNotPowerOfTwo(cell_scale))
}

fn check_scale(what: &'static str, scale: f32) -> Result<(), LstmError> {
    if scale.is_finite() && scale > 0.0 { Ok(()) } else { Err(LstmError::InvalidScale { what, scale }) }
}

fn check_scales(q: &LstmQuantization) -> Result<(), LstmError> {
    check_scale("input", q.input.scale)?;
    check_scale("hidden state", q.hidden_state.scale)?;
    check_scale("cell state", q.cell_state.scale)?;
    check_scale("nonlinear activation input", q.nonlinear_activation_input_scale)?;
    check_scale("nonlinear activation output", q.nonlinear_activation_output_scale)?;
    for (name, g) in [
        ("forget gate", &q.forget_gate),
        ("input gate", &q.input_gate),
        ("cell gate", &q.cell_gate),
        ("output gate", &q.output_gate),
    ] {
        check_scale(name, g.activation_weight.scale)?;
        check_scale(name, g.recurrent_weight.scale)?;
    }
    Ok(())
}

impl OpDataLstm {
    /// Derives every fixed-point parameter the step needs. Pure: equal inputs
    /// give equal op data.
    pub fn derive(
        size_info: LstmSizeInfo,
        params: &LstmParams,
        q: &LstmQuantization,
        scheme: QuantScheme,
    ) -> Result<Self, LstmError> {
        match params.activation {
            FusedActivation::Sigmoid | FusedActivation::Tanh => {}
            other => return Err(LstmError::UnsupportedActivation(other)),
        }
        check_scales(q)?;
        let cell_state_scale_power = cell_state_scale_power(q.cell_state.scale)?;
        let nl_in = q.nonlinear_activation_input_scale;

        let op_data = Self {
            size_info,
            cell_gate_nonlinear_type: params.activation,
            forget_gate_parameters: create_gate_params(q.input, q.hidden_state, &q.forget_gate, nl_in),
            input_gate_parameters: create_gate_params(q.input, q.hidden_state, &q.input_gate, nl_in),
            cell_gate_parameters: create_gate_params(q.input, q.hidden_state, &q.cell_gate, nl_in),
            output_gate_parameters: create_gate_params(q.input, q.hidden_state, &q.output_gate, nl_in),
            inter_gate_parameters: create_inter_gate_params(q, scheme.activation_bounds()),
            cell_state_info: CellStateInfo {
                cell_clip: params.cell_clip,
                quantized_cell_clip: quantize_cell_clip(params.cell_clip, q.cell_state.scale),
                cell_state_scale_power,
            },
        };
        debug!(
            "integer LSTM op data: {:?}, cell power {}, clip {}",
            size_info, cell_state_scale_power, op_data.cell_state_info.quantized_cell_clip
        );
        Ok(op_data)
    }
}
