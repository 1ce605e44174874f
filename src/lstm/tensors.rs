//! Tensor slot table and the typed views one evaluation works on.

use crate::error::LstmError;
use crate::lstm::params::LstmSizeInfo;
use crate::lstm::types::{CellType, LstmConfig};
use crate::tensor::{EvalTensor, QuantElement};

/// Input slots of the unidirectional sequence LSTM operator, in operator order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LstmTensor {
    Input,
    InputToInputWeights,
    InputToForgetWeights,
    InputToCellWeights,
    InputToOutputWeights,
    RecurrentToInputWeights,
    RecurrentToForgetWeights,
    RecurrentToCellWeights,
    RecurrentToOutputWeights,
    CellToInputWeights,
    CellToForgetWeights,
    CellToOutputWeights,
    InputGateBias,
    ForgetGateBias,
    CellGateBias,
    OutputGateBias,
    ProjectionWeights,
    ProjectionBias,
    OutputState,
    CellState,
    InputLayerNormCoefficients,
    ForgetLayerNormCoefficients,
    CellLayerNormCoefficients,
    OutputLayerNormCoefficients,
}

impl LstmTensor {
    pub const COUNT: usize = 24;

    pub const ALL: [LstmTensor; LstmTensor::COUNT] = [
        LstmTensor::Input,
        LstmTensor::InputToInputWeights,
        LstmTensor::InputToForgetWeights,
        LstmTensor::InputToCellWeights,
        LstmTensor::InputToOutputWeights,
        LstmTensor::RecurrentToInputWeights,
        LstmTensor::RecurrentToForgetWeights,
        LstmTensor::RecurrentToCellWeights,
        LstmTensor::RecurrentToOutputWeights,
        LstmTensor::CellToInputWeights,
        LstmTensor::CellToForgetWeights,
        LstmTensor::CellToOutputWeights,
        LstmTensor::InputGateBias,
        LstmTensor::ForgetGateBias,
        LstmTensor::CellGateBias,
        LstmTensor::OutputGateBias,
        LstmTensor::ProjectionWeights,
        LstmTensor::ProjectionBias,
        LstmTensor::OutputState,
        LstmTensor::CellState,
        LstmTensor::InputLayerNormCoefficients,
        LstmTensor::ForgetLayerNormCoefficients,
        LstmTensor::CellLayerNormCoefficients,
        LstmTensor::OutputLayerNormCoefficients,
    ];

    pub fn index(self) -> usize { self as usize }

    /// Peephole, projection and layer-norm slots; never set for this kernel.
    pub fn is_unsupported_variant(self) -> bool {
        matches!(
            self,
            LstmTensor::CellToInputWeights
                | LstmTensor::CellToForgetWeights
                | LstmTensor::CellToOutputWeights
                | LstmTensor::ProjectionWeights
                | LstmTensor::ProjectionBias
                | LstmTensor::InputLayerNormCoefficients
                | LstmTensor::ForgetLayerNormCoefficients
                | LstmTensor::CellLayerNormCoefficients
                | LstmTensor::OutputLayerNormCoefficients
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gate {
    Forget,
    Input,
    Cell,
    Output,
}

impl Gate {
    pub const ALL: [Gate; 4] = [Gate::Forget, Gate::Input, Gate::Cell, Gate::Output];

    pub fn input_weights(self) -> LstmTensor {
        match self {
            Gate::Forget => LstmTensor::InputToForgetWeights,
            Gate::Input => LstmTensor::InputToInputWeights,
            Gate::Cell => LstmTensor::InputToCellWeights,
            Gate::Output => LstmTensor::InputToOutputWeights,
        }
    }

    pub fn recurrent_weights(self) -> LstmTensor {
        match self {
            Gate::Forget => LstmTensor::RecurrentToForgetWeights,
            Gate::Input => LstmTensor::RecurrentToInputWeights,
            Gate::Cell => LstmTensor::RecurrentToCellWeights,
            Gate::Output => LstmTensor::RecurrentToOutputWeights,
        }
    }

    pub fn bias(self) -> LstmTensor {
        match self {
            Gate::Forget => LstmTensor::ForgetGateBias,
            Gate::Input => LstmTensor::InputGateBias,
            Gate::Cell => LstmTensor::CellGateBias,
            Gate::Output => LstmTensor::OutputGateBias,
        }
    }
}

/// Operator inputs keyed by [`LstmTensor`]; absent slots are `None`.
#[derive(Debug)]
pub struct TensorSlots<'a> {
    slots: [Option<EvalTensor<'a>>; LstmTensor::COUNT],
}

impl<'a> Default for TensorSlots<'a> {
    fn default() -> Self { Self { slots: std::array::from_fn(|_| None) } }
}

impl<'a> TensorSlots<'a> {
    pub fn new() -> Self { Self::default() }

    /// Binds `tensor` to `slot`, returning the previous binding.
    pub fn set(&mut self, slot: LstmTensor, tensor: EvalTensor<'a>) -> Option<EvalTensor<'a>> {
        self.slots[slot.index()].replace(tensor)
    }

    pub fn with(mut self, slot: LstmTensor, tensor: EvalTensor<'a>) -> Self {
        self.set(slot, tensor);
        self
    }

    pub fn get(&self, slot: LstmTensor) -> Option<&EvalTensor<'a>> { self.slots[slot.index()].as_ref() }

    pub fn require(&self, slot: LstmTensor) -> Result<&EvalTensor<'a>, LstmError> {
        self.get(slot).ok_or(LstmError::MissingTensor(slot))
    }

    pub fn take(&mut self, slot: LstmTensor) -> Option<EvalTensor<'a>> { self.slots[slot.index()].take() }

    pub fn is_set(&self, slot: LstmTensor) -> bool { self.slots[slot.index()].is_some() }

    /// Set slots in operator order.
    pub fn iter(&self) -> impl Iterator<Item = (LstmTensor, &EvalTensor<'a>)> + '_ {
        LstmTensor::ALL.iter().filter_map(move |&s| self.get(s).map(|t| (s, t)))
    }
}

fn take_shared<'a, T: QuantElement>(slots: &mut TensorSlots<'a>, slot: LstmTensor, len: usize) -> Result<&'a [T], LstmError> {
    let tensor = slots.take(slot).ok_or(LstmError::MissingTensor(slot))?;
    check_len(slot, len, tensor.data.len())?;
    let found = tensor.kind();
    tensor.into_shared::<T>().ok_or(LstmError::WrongElementType { slot, expected: T::KIND, found })
}

fn take_optional<'a, T: QuantElement>(slots: &mut TensorSlots<'a>, slot: LstmTensor, len: usize) -> Result<Option<&'a [T]>, LstmError> {
    if slots.is_set(slot) { take_shared(slots, slot, len).map(Some) } else { Ok(None) }
}

fn take_exclusive<'a, T: QuantElement>(slots: &mut TensorSlots<'a>, slot: LstmTensor, len: usize) -> Result<&'a mut [T], LstmError> {
    let tensor = slots.take(slot).ok_or(LstmError::MissingTensor(slot))?;
    check_len(slot, len, tensor.data.len())?;
    let found = tensor.kind();
    if found != T::KIND {
        return Err(LstmError::WrongElementType { slot, expected: T::KIND, found });
    }
    tensor.into_exclusive::<T>().ok_or(LstmError::StateNotWritable(slot))
}

fn check_len(slot: LstmTensor, expected: usize, found: usize) -> Result<(), LstmError> {
    if expected == found { Ok(()) } else { Err(LstmError::WrongLength { slot, expected, found }) }
}

/// Weights and biases of one gate.
pub struct GateTensors<'a, C: LstmConfig> {
    pub input_weight: &'a [C::Weight],
    pub recurrent_weight: &'a [C::Weight],
    pub bias: Option<&'a [C::Bias]>,
    /// No slot carries a recurrent bias; kept for kernels that provide one.
    pub recurrent_bias: Option<&'a [C::Bias]>,
}

impl<'a, C: LstmConfig> GateTensors<'a, C> {
    fn take(slots: &mut TensorSlots<'a>, gate: Gate, size: &LstmSizeInfo) -> Result<Self, LstmError> {
        let s = size.state_dimension;
        Ok(Self {
            input_weight: take_shared(slots, gate.input_weights(), s * size.input_dimension)?,
            recurrent_weight: take_shared(slots, gate.recurrent_weights(), s * s)?,
            bias: take_optional(slots, gate.bias(), s)?,
            recurrent_bias: None,
        })
    }
}

/// Typed, validated views over every tensor one sequence evaluation touches.
pub struct LstmKernelContents<'a, C: LstmConfig> {
    pub input: &'a [C::Activation],
    pub forget_gate: GateTensors<'a, C>,
    pub input_gate: GateTensors<'a, C>,
    pub cell_gate: GateTensors<'a, C>,
    pub output_gate: GateTensors<'a, C>,
    pub hidden_state: &'a mut [C::Activation],
    pub cell_state: &'a mut [CellType],
    pub output: &'a mut [C::Activation],
}

impl<'a, C: LstmConfig> LstmKernelContents<'a, C> {
    /// Consumes the slot table; the state slots and `output` must be exclusive buffers.
    pub fn bind(mut slots: TensorSlots<'a>, output: EvalTensor<'a>, size: &LstmSizeInfo) -> Result<Self, LstmError> {
        for (slot, _) in slots.iter() {
            if slot.is_unsupported_variant() { return Err(LstmError::UnsupportedVariant(slot)); }
        }
        let input = take_shared(&mut slots, LstmTensor::Input, size.input_len())?;
        let forget_gate = GateTensors::take(&mut slots, Gate::Forget, size)?;
        let input_gate = GateTensors::take(&mut slots, Gate::Input, size)?;
        let cell_gate = GateTensors::take(&mut slots, Gate::Cell, size)?;
        let output_gate = GateTensors::take(&mut slots, Gate::Output, size)?;
        let hidden_state = take_exclusive(&mut slots, LstmTensor::OutputState, size.state_len())?;
        let cell_state = take_exclusive(&mut slots, LstmTensor::CellState, size.state_len())?;

        if output.data.len() != size.output_len() {
            return Err(LstmError::InvalidOutput(format!("{} elements, expected {}", output.data.len(), size.output_len())));
        }
        let kind = output.kind();
        if kind != <C::Activation as QuantElement>::KIND {
            return Err(LstmError::InvalidOutput(format!("{} data, expected {}", kind, <C::Activation as QuantElement>::KIND)));
        }
        let output = output.into_exclusive().ok_or_else(|| LstmError::InvalidOutput("buffer is not exclusive".into()))?;

        Ok(Self { input, forget_gate, input_gate, cell_gate, output_gate, hidden_state, cell_state, output })
    }
}

/// Four int16 scratch buffers reused by every step.
///
/// Slot assignment inside one step (see `lstm::eval::lstm_step`):
///
/// | sub-step      | writes                              | reads             |
/// |---------------|-------------------------------------|-------------------|
/// | forget gate   | b0 (gate), b3 (recurrent FC)        | input, hidden     |
/// | input gate    | b1, b3                              | input, hidden     |
/// | cell gate     | b2, b3                              | input, hidden     |
/// | cell update   | cell state, b3 (input x cell)       | b0, b1, b2        |
/// | output gate   | b1, b3                              | input, hidden     |
/// | hidden update | b0 (tanh of cell), hidden, cell (*) | cell, b1          |
///
/// (*) only for cell scales finer than Q3.12, which are shifted in place.
#[derive(Debug, Clone)]
pub struct ScratchBuffers {
    data: Vec<CellType>,
    buffer_len: usize,
}

impl ScratchBuffers {
    pub const COUNT: usize = 4;

    pub fn new(buffer_len: usize) -> Self { Self { data: vec![0; buffer_len * Self::COUNT], buffer_len } }

    pub fn buffer_len(&self) -> usize { self.buffer_len }

    /// The four buffers, each truncated to `len` elements.
    pub fn split(&mut self, len: usize) -> [&mut [CellType]; 4] {
        assert!(len <= self.buffer_len, "scratch buffers hold {} elements, step needs {}", self.buffer_len, len);
        let n = self.buffer_len;
        let (b0, rest) = self.data.split_at_mut(n);
        let (b1, rest) = rest.split_at_mut(n);
        let (b2, b3) = rest.split_at_mut(n);
        [&mut b0[..len], &mut b1[..len], &mut b2[..len], &mut b3[..len]]
    }
}
