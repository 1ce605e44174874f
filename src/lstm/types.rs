use serde::{Deserialize, Serialize};

use crate::error::LstmError;
use crate::tensor::{ElementKind, QuantElement};

/// Cell state and every gate-internal buffer are int16 (Q3.12 before the
/// nonlinearity, Q0.15 after it) in both supported schemes.
pub type CellType = i16;

/// Integer widths of one LSTM kernel instantiation.
pub trait LstmConfig: 'static {
    type Activation: QuantElement;
    type Weight: QuantElement;
    type Bias: QuantElement;

    const SCHEME: QuantScheme;
}

/// int8 activations, int8 weights, int32 biases.
#[derive(Debug, Clone, Copy)]
pub struct Int8Activations;

/// int16 activations, int8 weights, int64 biases.
#[derive(Debug, Clone, Copy)]
pub struct Int16Activations;

impl LstmConfig for Int8Activations {
    type Activation = i8;
    type Weight = i8;
    type Bias = i32;
    const SCHEME: QuantScheme = QuantScheme::Int8Activations;
}

impl LstmConfig for Int16Activations {
    type Activation = i16;
    type Weight = i8;
    type Bias = i64;
    const SCHEME: QuantScheme = QuantScheme::Int16Activations;
}

/// Runtime tag for the closed set of [`LstmConfig`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantScheme {
    Int8Activations,
    Int16Activations,
}

impl QuantScheme {
    pub fn detect(activation: ElementKind, weight: ElementKind) -> Result<Self, LstmError> {
        match (activation, weight) {
            (ElementKind::Int8, ElementKind::Int8) => Ok(QuantScheme::Int8Activations),
            (ElementKind::Int16, ElementKind::Int8) => Ok(QuantScheme::Int16Activations),
            (activation, weight) => Err(LstmError::UnsupportedScheme { activation, weight }),
        }
    }

    pub fn activation_kind(self) -> ElementKind {
        match self {
            QuantScheme::Int8Activations => ElementKind::Int8,
            QuantScheme::Int16Activations => ElementKind::Int16,
        }
    }

    pub fn weight_kind(self) -> ElementKind { ElementKind::Int8 }

    pub fn bias_kind(self) -> ElementKind {
        match self {
            QuantScheme::Int8Activations => ElementKind::Int32,
            QuantScheme::Int16Activations => ElementKind::Int64,
        }
    }

    /// Representable range of the activation (hidden state / output) type.
    pub fn activation_bounds(self) -> (i32, i32) {
        match self {
            QuantScheme::Int8Activations => (i8::MIN as i32, i8::MAX as i32),
            QuantScheme::Int16Activations => (i16::MIN as i32, i16::MAX as i32),
        }
    }
}
