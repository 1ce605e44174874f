use thiserror::Error;

use crate::lstm::params::FusedActivation;
use crate::lstm::tensors::LstmTensor;
use crate::tensor::ElementKind;

/// Preparation-time failures. Evaluation itself has no failure path.
#[derive(Debug, Error)]
pub enum LstmError {
    #[error("required tensor {0:?} is not set")]
    MissingTensor(LstmTensor),
    #[error("tensor {slot:?} holds {found} data, expected {expected}")]
    WrongElementType { slot: LstmTensor, expected: ElementKind, found: ElementKind },
    #[error("tensor {slot:?} has shape {found:?}, expected {expected:?}")]
    WrongShape { slot: LstmTensor, expected: Vec<usize>, found: Vec<usize> },
    #[error("tensor {slot:?} has {found} elements but its shape needs {expected}")]
    WrongLength { slot: LstmTensor, expected: usize, found: usize },
    #[error("state tensor {0:?} must be bound to an exclusive buffer")]
    StateNotWritable(LstmTensor),
    #[error("tensor {0:?} belongs to an unsupported LSTM variant (peephole, projection or layer norm)")]
    UnsupportedVariant(LstmTensor),
    #[error("output tensor: {0}")]
    InvalidOutput(String),
    #[error("input tensor must be rank 3, got shape {0:?}")]
    InvalidInputRank(Vec<usize>),
    #[error("cell state scale {0} is not a power of two")]
    CellScaleNotPowerOfTwo(f32),
    #[error("cell gate activation {0:?} is not supported (expected sigmoid or tanh)")]
    UnsupportedActivation(FusedActivation),
    #[error("no integer LSTM kernel for {activation} activations with {weight} weights")]
    UnsupportedScheme { activation: ElementKind, weight: ElementKind },
    #[error("invalid quantization scale {scale} for {what}")]
    InvalidScale { what: &'static str, scale: f32 },
    #[error("scratch buffers hold {found} elements per slot, {expected} needed")]
    ScratchTooSmall { expected: usize, found: usize },
}

/// Failures of the JSON model layer.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model file: {0}")]
    Io(#[from] std::io::Error),
    #[error("model json: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Lstm(#[from] LstmError),
    #[error("{what} has {found} values, expected {expected}")]
    Length { what: String, expected: usize, found: usize },
    #[error("{what} value {value} does not fit {kind}")]
    OutOfRange { what: String, value: i64, kind: ElementKind },
    #[error("input of {len} values is not a whole number of {batch_size}x{input_dimension} steps")]
    InputShape { len: usize, batch_size: usize, input_dimension: usize },
    #[error("random weight distribution: {0}")]
    Distribution(#[from] rand_distr::NormalError),
    #[error("model dimensions must be positive")]
    EmptyDimension,
    #[error("LSTM evaluation failed")]
    Invoke,
}

/// Operator status reported to the host runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Error,
}

impl Status {
    pub fn is_ok(self) -> bool { self == Status::Ok }
}

impl<T> From<Result<T, LstmError>> for Status {
    fn from(r: Result<T, LstmError>) -> Self {
        match r {
            Ok(_) => Status::Ok,
            Err(e) => {
                log::error!("integer LSTM: {}", e);
                Status::Error
            }
        }
    }
}
