//! Operator entry points: preparation and invocation.

use log::debug;

use crate::error::{LstmError, Status};
use crate::lstm::eval::eval_lstm;
use crate::lstm::params::{LstmParams, LstmQuantization, LstmSizeInfo, OpDataLstm};
use crate::lstm::step::StepManager;
use crate::lstm::tensors::{Gate, LstmKernelContents, LstmTensor, ScratchBuffers, TensorSlots};
use crate::lstm::types::{CellType, Int16Activations, Int8Activations, LstmConfig, QuantScheme};
use crate::tensor::{ElementKind, EvalTensor, QuantElement};

/// Name under which the host runtime registers this operator.
pub const REGISTRATION_NAME: &str = "UNIDIRECTIONAL_SEQUENCE_LSTM";

/// A prepared integer LSTM operator instance.
#[derive(Debug, Clone)]
pub struct IntegerLstmOp {
    scheme: QuantScheme,
    op_data: OpDataLstm,
}

fn check_tensor(
    slot: LstmTensor,
    tensor: &EvalTensor<'_>,
    kind: ElementKind,
    shape: &[usize],
) -> Result<(), LstmError> {
    if tensor.kind() != kind {
        return Err(LstmError::WrongElementType { slot, expected: kind, found: tensor.kind() });
    }
    if tensor.shape.dims() != shape {
        return Err(LstmError::WrongShape { slot, expected: shape.to_vec(), found: tensor.shape.dims().to_vec() });
    }
    if tensor.data.len() != tensor.shape.flat_size() {
        return Err(LstmError::WrongLength { slot, expected: tensor.shape.flat_size(), found: tensor.data.len() });
    }
    Ok(())
}

impl IntegerLstmOp {
    /// Validates the tensor layout and derives the fixed-point parameters.
    ///
    /// Only the full four-gate variant is accepted: peephole, projection and
    /// layer-norm slots must be empty. Both state slots and `output` must be
    /// exclusive buffers.
    pub fn prepare(
        slots: &TensorSlots<'_>,
        output: &EvalTensor<'_>,
        params: &LstmParams,
        quantization: &LstmQuantization,
    ) -> Result<Self, LstmError> {
        if let Some((slot, _)) = slots.iter().find(|(slot, _)| slot.is_unsupported_variant()) {
            return Err(LstmError::UnsupportedVariant(slot));
        }

        let input = slots.require(LstmTensor::Input)?;
        let input_dims = input.shape.dims();
        let weight = slots.require(LstmTensor::InputToOutputWeights)?;
        if weight.shape.rank() != 2 {
            return Err(LstmError::WrongShape {
                slot: LstmTensor::InputToOutputWeights,
                expected: vec![0, input_dims.last().copied().unwrap_or(0)],
                found: weight.shape.dims().to_vec(),
            });
        }
        let state_dimension = weight.shape.dim(0);
        let size = LstmSizeInfo::from_input_shape(input_dims, state_dimension, params.time_major)?;
        let scheme = QuantScheme::detect(input.kind(), weight.kind())?;

        check_tensor(LstmTensor::Input, input, scheme.activation_kind(), input_dims)?;
        for gate in Gate::ALL {
            let (s, i) = (size.state_dimension, size.input_dimension);
            check_tensor(gate.input_weights(), slots.require(gate.input_weights())?, scheme.weight_kind(), &[s, i])?;
            check_tensor(gate.recurrent_weights(), slots.require(gate.recurrent_weights())?, scheme.weight_kind(), &[s, s])?;
            if let Some(bias) = slots.get(gate.bias()) {
                check_tensor(gate.bias(), bias, scheme.bias_kind(), &[s])?;
            }
        }

        let state_shape = [size.batch_size, size.state_dimension];
        for (slot, kind) in [
            (LstmTensor::OutputState, scheme.activation_kind()),
            (LstmTensor::CellState, CellType::KIND),
        ] {
            let state = slots.require(slot)?;
            check_tensor(slot, state, kind, &state_shape)?;
            if !state.data.is_exclusive() {
                return Err(LstmError::StateNotWritable(slot));
            }
        }

        let mut output_dims = input_dims.to_vec();
        output_dims[2] = size.state_dimension;
        if output.kind() != scheme.activation_kind() {
            return Err(LstmError::InvalidOutput(format!("{} data, expected {}", output.kind(), scheme.activation_kind())));
        }
        if output.shape.dims() != output_dims.as_slice() || output.data.len() != size.output_len() {
            return Err(LstmError::InvalidOutput(format!(
                "shape {:?} with {} elements, expected {:?}",
                output.shape,
                output.data.len(),
                output_dims
            )));
        }
        if !output.data.is_exclusive() {
            return Err(LstmError::InvalidOutput("buffer is not exclusive".into()));
        }

        let op_data = OpDataLstm::derive(size, params, quantization, scheme)?;
        debug!("prepared {} ({:?})", REGISTRATION_NAME, scheme);
        Ok(Self { scheme, op_data })
    }

    pub fn op_data(&self) -> &OpDataLstm { &self.op_data }

    pub fn scheme(&self) -> QuantScheme { self.scheme }

    /// Elements per scratch buffer one step needs.
    pub fn scratch_len(&self) -> usize { StepManager::new(self.op_data.size_info).state_len() }

    /// Scratch pool sized for this operator; reusable across invocations.
    pub fn scratch(&self) -> ScratchBuffers { ScratchBuffers::new(self.scratch_len()) }

    /// Runs the whole sequence, updating the state slots and writing `output`.
    pub fn invoke<'a>(&self, slots: TensorSlots<'a>, output: EvalTensor<'a>, scratch: &mut ScratchBuffers) -> Status {
        match self.scheme {
            QuantScheme::Int8Activations => self.invoke_with::<Int8Activations>(slots, output, scratch),
            QuantScheme::Int16Activations => self.invoke_with::<Int16Activations>(slots, output, scratch),
        }
    }

    fn invoke_with<'a, C: LstmConfig>(
        &self,
        slots: TensorSlots<'a>,
        output: EvalTensor<'a>,
        scratch: &mut ScratchBuffers,
    ) -> Status {
        if scratch.buffer_len() < self.scratch_len() {
            return Status::from(Err::<(), _>(LstmError::ScratchTooSmall {
                expected: self.scratch_len(),
                found: scratch.buffer_len(),
            }));
        }
        match LstmKernelContents::<C>::bind(slots, output, &self.op_data.size_info) {
            Ok(mut contents) => eval_lstm(&self.op_data, &mut contents, scratch),
            Err(e) => Status::from(Err::<(), _>(e)),
        }
    }
}
